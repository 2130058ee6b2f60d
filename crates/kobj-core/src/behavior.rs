use crate::{AddressSpace, KobjError, MemberValues, Object, Profile};

/// Type-specific behavior layered on top of a typed view.
///
/// Behaviors are registered on a [`Profile`] by type name and consulted by
/// every [`Object`] of that type. The default implementations leave the
/// layout-derived behavior untouched.
pub trait Behavior {
    /// Overrides the size of the structure.
    ///
    /// Returns `Ok(None)` to keep the size declared by the layout.
    fn size(&self, profile: &Profile, type_name: &str) -> Result<Option<u64>, KobjError> {
        let _ = (profile, type_name);
        Ok(None)
    }

    /// Additional validity checks, applied after the structure was found to
    /// be readable.
    fn is_valid(&self, view: &dyn MemberValues) -> Result<bool, KobjError> {
        let _ = view;
        Ok(true)
    }
}

/// A typed wrapper bound to a structure type name.
///
/// Wrappers give a kernel structure its Rust-level operations (a process
/// knows how to find its token, a handle table how to enumerate its
/// handles) while the underlying [`Object`] keeps field access generic.
pub trait Class<'a, A>: Sized
where
    A: AddressSpace,
{
    /// The structure type the wrapper interprets.
    const TYPE_NAME: &'static str;

    /// Wraps a view. The view is assumed to be of [`Self::TYPE_NAME`].
    fn from_object(object: Object<'a, A>) -> Self;

    /// Returns the underlying view.
    fn object(&self) -> &Object<'a, A>;
}
