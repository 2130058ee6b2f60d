use kobj_core::{AddressSpace, Class as _, KobjError, Object};

use super::{WindowsUnicodeString, macros::impl_class};

/// A name information for a Windows object.
///
/// This structure stores the name and directory information
/// associated with a named kernel object.
///
/// # Implementation Details
///
/// Corresponds to `_OBJECT_HEADER_NAME_INFO`.
pub struct WindowsObjectHeaderNameInfo<'a, A>
where
    A: AddressSpace,
{
    object: Object<'a, A>,
}

impl_class!(WindowsObjectHeaderNameInfo, "_OBJECT_HEADER_NAME_INFO");

impl<'a, A> WindowsObjectHeaderNameInfo<'a, A>
where
    A: AddressSpace,
{
    /// Returns the directory object the name lives in.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_OBJECT_HEADER_NAME_INFO.Directory`.
    pub fn directory(&self) -> Result<Option<Object<'a, A>>, KobjError> {
        self.object.dereference_member("Directory")
    }

    /// Returns the name of the object.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_OBJECT_HEADER_NAME_INFO.Name`.
    pub fn name(&self) -> Result<Option<String>, KobjError> {
        WindowsUnicodeString::from_object(self.object.member_object("Name")?).value()
    }
}
