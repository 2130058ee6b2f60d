use kobj_core::{AddressSpace, Class as _, KobjError, Object, Recover as _};

use super::macros::impl_class;

/// A Windows registry key control block.
///
/// A registry key in the kernel mode registry cache. It helps the Configuration
/// Manager manage registry keys efficiently by avoiding redundant registry
/// lookups.
///
/// # Implementation Details
///
/// Corresponds to `_CM_KEY_CONTROL_BLOCK`.
pub struct WindowsKeyControlBlock<'a, A>
where
    A: AddressSpace,
{
    object: Object<'a, A>,
}

impl_class!(WindowsKeyControlBlock, "_CM_KEY_CONTROL_BLOCK");

impl<'a, A> WindowsKeyControlBlock<'a, A>
where
    A: AddressSpace,
{
    /// Returns the parent key control block.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_CM_KEY_CONTROL_BLOCK.ParentKcb`.
    pub fn parent(&self) -> Result<Option<WindowsKeyControlBlock<'a, A>>, KobjError> {
        Ok(self
            .object
            .member_pointer("ParentKcb")?
            .dereference_as(Self::TYPE_NAME)?
            .map(Self::from_object))
    }

    /// Checks whether the key has no parent, i.e. `ParentKcb` is null.
    ///
    /// A control block that cannot be read has no parent either.
    pub fn parent_is_null(&self) -> Result<bool, KobjError> {
        Ok(self
            .object
            .member_pointer("ParentKcb")
            .recover()?
            .is_none_or(|parent| parent.is_null()))
    }

    /// Returns the name of the key.
    ///
    /// Returns `Ok(None)` if the name block cannot be read.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_CM_NAME_CONTROL_BLOCK.Name` of
    /// `_CM_KEY_CONTROL_BLOCK.NameBlock`.
    pub fn name(&self) -> Result<Option<String>, KobjError> {
        let name_block = match self
            .object
            .member_pointer("NameBlock")?
            .dereference_as("_CM_NAME_CONTROL_BLOCK")?
        {
            Some(name_block) => name_block,
            None => return Ok(None),
        };

        name_block.member_string("Name").recover()
    }
}
