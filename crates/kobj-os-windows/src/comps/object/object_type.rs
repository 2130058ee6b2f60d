use kobj_core::{AddressSpace, Class as _, KobjError, Object};

use super::super::{WindowsUnicodeString, macros::impl_class};

/// A Windows object type object.
///
/// A type of kernel object managed by the Windows Object Manager.
///
/// # Implementation Details
///
/// Corresponds to `_OBJECT_TYPE`.
pub struct WindowsObjectType<'a, A>
where
    A: AddressSpace,
{
    object: Object<'a, A>,
}

impl_class!(WindowsObjectType, "_OBJECT_TYPE");

impl<A> WindowsObjectType<'_, A>
where
    A: AddressSpace,
{
    /// Returns the name of the object type (e.g., `Process`, `File`).
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_OBJECT_TYPE.Name`.
    pub fn name(&self) -> Result<Option<String>, KobjError> {
        WindowsUnicodeString::from_object(self.object.member_object("Name")?).value()
    }

    /// Returns the index of the type in the type table.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_OBJECT_TYPE.Index`.
    pub fn index(&self) -> Result<u64, KobjError> {
        self.object.member_u64("Index")
    }
}
