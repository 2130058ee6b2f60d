use kobj_core::{AddressSpace, Class as _, KobjError, Object, Recover as _};

use super::{
    super::{WindowsUnicodeString, macros::impl_class},
    WindowsObjectHeader,
};

/// Access flags of a file object and the character each one renders as.
const ACCESS_FLAGS: [(&str, char); 6] = [
    ("ReadAccess", 'R'),
    ("WriteAccess", 'W'),
    ("DeleteAccess", 'D'),
    ("SharedRead", 'r'),
    ("SharedWrite", 'w'),
    ("SharedDelete", 'd'),
];

/// A Windows file object.
///
/// # Implementation Details
///
/// Corresponds to `_FILE_OBJECT`.
pub struct WindowsFileObject<'a, A>
where
    A: AddressSpace,
{
    object: Object<'a, A>,
}

impl_class!(WindowsFileObject, "_FILE_OBJECT");

impl<A> WindowsFileObject<'_, A>
where
    A: AddressSpace,
{
    /// Returns the file name, relative to its device.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_FILE_OBJECT.FileName`.
    pub fn file_name(&self) -> Result<Option<String>, KobjError> {
        WindowsUnicodeString::from_object(self.object.member_object("FileName")?).value()
    }

    /// Renders the access the file was opened with, e.g. `RW-r--`.
    ///
    /// Each position is either the flag character or `-`, in the order
    /// read, write, delete, shared read, shared write, shared delete.
    pub fn access_string(&self) -> Result<String, KobjError> {
        let mut access = String::with_capacity(ACCESS_FLAGS.len());

        for (name, flag) in ACCESS_FLAGS {
            match self.object.member_u64(name)? {
                0 => access.push('-'),
                _ => access.push(flag),
            }
        }

        Ok(access)
    }

    /// Returns the file name prefixed with the name of its device, e.g.
    /// `\Device\HarddiskVolume1\Windows\notepad.exe`.
    ///
    /// # Implementation Details
    ///
    /// The device name is the name of the object header preceding
    /// `_FILE_OBJECT.DeviceObject`.
    pub fn file_name_with_device(&self) -> Result<String, KobjError> {
        let mut name = String::new();

        let device = self.object.member_va("DeviceObject")?;
        if !device.is_null() {
            let profile = self.object.profile();
            let body = profile.field_offset(WindowsObjectHeader::<A>::TYPE_NAME, "Body")?;

            let header = WindowsObjectHeader::from_object(
                self.object
                    .child(device.offset(-body), WindowsObjectHeader::<A>::TYPE_NAME),
            );

            if let Some(device_name) = header.name().recover()?.flatten() {
                name.push_str("\\Device\\");
                name.push_str(&device_name);
            }
        }

        if let Some(file_name) = self.file_name()? {
            name.push_str(&file_name);
        }

        Ok(name)
    }
}
