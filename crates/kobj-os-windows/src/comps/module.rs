use kobj_core::{AddressSpace, Class as _, KobjError, Object, Va};

use super::{WindowsUnicodeString, macros::impl_class};

/// A Windows loader module.
///
/// An executable or library loaded into a process, tracked in the loader
/// lists of its PEB.
///
/// # Implementation Details
///
/// Corresponds to `_LDR_DATA_TABLE_ENTRY`.
pub struct WindowsModule<'a, A>
where
    A: AddressSpace,
{
    object: Object<'a, A>,
}

impl_class!(WindowsModule, "_LDR_DATA_TABLE_ENTRY");

impl<A> WindowsModule<'_, A>
where
    A: AddressSpace,
{
    /// Returns the base address of the module.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_LDR_DATA_TABLE_ENTRY.DllBase`.
    pub fn base(&self) -> Result<Va, KobjError> {
        self.object.member_va("DllBase")
    }

    /// Returns the size of the module.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_LDR_DATA_TABLE_ENTRY.SizeOfImage`.
    pub fn size(&self) -> Result<u64, KobjError> {
        self.object.member_u64("SizeOfImage")
    }

    /// Returns the name of the module.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_LDR_DATA_TABLE_ENTRY.BaseDllName`.
    pub fn base_name(&self) -> Result<Option<String>, KobjError> {
        WindowsUnicodeString::from_object(self.object.member_object("BaseDllName")?).value()
    }

    /// Returns the full path of the module.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_LDR_DATA_TABLE_ENTRY.FullDllName`.
    pub fn full_name(&self) -> Result<Option<String>, KobjError> {
        WindowsUnicodeString::from_object(self.object.member_object("FullDllName")?).value()
    }
}
