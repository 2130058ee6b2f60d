use crate::{Pa, Va};

/// An error that can occur while interpreting a memory image.
#[derive(thiserror::Error, Debug)]
pub enum KobjError {
    /// An OS-specific error occurred.
    #[error(transparent)]
    Os(Box<dyn std::error::Error>),

    /// The address is not readable in the address space.
    #[error("Page not present ({0:?})")]
    PageFault(Va),

    /// A derived address space could not be built for the given root.
    #[error("Root not present ({0:?})")]
    RootNotPresent(Pa),

    /// The profile has no layout for the requested type.
    #[error("No such type: {0}")]
    NoSuchType(String),

    /// The layout of a type has no such member.
    #[error("{type_name} has no member {member}")]
    NoSuchMember {
        /// The type that was queried.
        type_name: String,

        /// The missing member.
        member: String,
    },

    /// Resolving a member required its own value.
    #[error("Cyclic dependency while resolving {type_name}.{member}")]
    CyclicField {
        /// The type being resolved.
        type_name: String,

        /// The member whose resolution re-entered itself.
        member: String,
    },

    /// A masked pointer was dereferenced without a target type.
    #[error("No target specified for dereferencing a masked pointer")]
    MissingTarget,

    /// A structure failed a sanity check.
    #[error("Implausible structure: {0}")]
    Implausible(&'static str),

    /// Out of bounds.
    #[error("Out of bounds")]
    OutOfBounds,

    /// Other error.
    #[error("{0}")]
    Other(&'static str),
}

impl KobjError {
    /// Checks whether the error was caused by the contents of the memory
    /// image rather than by the caller or the profile.
    ///
    /// Such failures are recovered locally by substituting an absent value.
    pub fn is_absent(&self) -> bool {
        matches!(
            self,
            Self::PageFault(_) | Self::RootNotPresent(_) | Self::Implausible(_) | Self::OutOfBounds
        )
    }
}

/// Converts memory-derived failures into absent values.
///
/// # Examples
///
/// ```
/// # use kobj_core::{KobjError, Recover, Va};
/// let unreadable: Result<u64, KobjError> = Err(KobjError::PageFault(Va(0x1000)));
/// assert!(matches!(unreadable.recover(), Ok(None)));
///
/// let contract: Result<u64, KobjError> = Err(KobjError::MissingTarget);
/// assert!(contract.recover().is_err());
/// ```
pub trait Recover<T> {
    /// Maps `Ok(value)` to `Ok(Some(value))`, memory-derived errors to
    /// `Ok(None)` and propagates everything else.
    fn recover(self) -> Result<Option<T>, KobjError>;
}

impl<T> Recover<T> for Result<T, KobjError> {
    fn recover(self) -> Result<Option<T>, KobjError> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_absent() => {
                tracing::debug!(%err, "substituting absent value");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}
