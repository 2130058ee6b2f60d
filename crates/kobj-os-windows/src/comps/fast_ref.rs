use kobj_core::{AddressSpace, KobjError, Object, tagged};

use super::macros::impl_class;
use crate::WindowsError;

/// A fast reference.
///
/// A pointer whose low bits hold a cached reference count. The number of
/// bits depends on the architecture and is given by the `MAX_FAST_REF`
/// profile constant.
///
/// # Implementation Details
///
/// Corresponds to `_EX_FAST_REF`.
pub struct WindowsFastRef<'a, A>
where
    A: AddressSpace,
{
    object: Object<'a, A>,
}

impl_class!(WindowsFastRef, "_EX_FAST_REF");

impl<'a, A> WindowsFastRef<'a, A>
where
    A: AddressSpace,
{
    /// Returns the raw value, including the reference count bits.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_EX_FAST_REF.Object`.
    pub fn value(&self) -> Result<u64, KobjError> {
        self.object.member_u64("Object")
    }

    /// Returns the reference count mask.
    pub fn mask(&self) -> Result<u64, KobjError> {
        match self.object.profile().constant("MAX_FAST_REF") {
            Some(mask) => Ok(mask),
            None => Err(WindowsError::MissingConstant("MAX_FAST_REF").into()),
        }
    }

    /// Dereferences the reference as `target`.
    ///
    /// The resulting view has the fast reference as its parent. Fails with
    /// [`KobjError::MissingTarget`] if no target is given.
    pub fn dereference(&self, target: Option<&str>) -> Result<Option<Object<'a, A>>, KobjError> {
        self.dereference_with_parent(target, &self.object)
    }

    /// Dereferences the reference as `target`, with an explicit parent.
    pub fn dereference_with_parent(
        &self,
        target: Option<&str>,
        parent: &Object<'a, A>,
    ) -> Result<Option<Object<'a, A>>, KobjError> {
        tagged::dereference_masked(parent, self.value()?, self.mask()?, target)
    }
}
