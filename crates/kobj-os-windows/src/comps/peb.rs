use kobj_core::{AddressSpace, Class as _, KobjError, Object, Va};

use super::{WindowsUnicodeString, macros::impl_class};

/// A Windows process environment block (PEB).
///
/// The PEB is a user-mode structure that stores process-wide information,
/// such as loaded modules, heap data, and environment settings. It lives
/// in the address space of its process.
///
/// # Implementation Details
///
/// Corresponds to `_PEB`.
pub struct WindowsPeb<'a, A>
where
    A: AddressSpace,
{
    object: Object<'a, A>,
}

impl_class!(WindowsPeb, "_PEB");

impl<'a, A> WindowsPeb<'a, A>
where
    A: AddressSpace,
{
    /// Returns the base address of the process image.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_PEB.ImageBaseAddress`.
    pub fn image_base_address(&self) -> Result<Va, KobjError> {
        self.object.member_va("ImageBaseAddress")
    }

    /// Returns the loader data, heading the module lists.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_PEB.Ldr`.
    pub fn ldr(&self) -> Result<Option<Object<'a, A>>, KobjError> {
        self.object
            .member_pointer("Ldr")?
            .dereference_as("_PEB_LDR_DATA")
    }

    /// Returns the process parameters.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_PEB.ProcessParameters`.
    pub fn process_parameters(&self) -> Result<Option<Object<'a, A>>, KobjError> {
        self.object
            .member_pointer("ProcessParameters")?
            .dereference_as("_RTL_USER_PROCESS_PARAMETERS")
    }

    /// Returns the command line of the process.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_RTL_USER_PROCESS_PARAMETERS.CommandLine`.
    pub fn command_line(&self) -> Result<Option<String>, KobjError> {
        self.process_parameter("CommandLine")
    }

    /// Returns the full path of the process image.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_RTL_USER_PROCESS_PARAMETERS.ImagePathName`.
    pub fn image_path_name(&self) -> Result<Option<String>, KobjError> {
        self.process_parameter("ImagePathName")
    }

    fn process_parameter(&self, name: &str) -> Result<Option<String>, KobjError> {
        match self.process_parameters()? {
            Some(parameters) => {
                WindowsUnicodeString::from_object(parameters.member_object(name)?).value()
            }
            None => Ok(None),
        }
    }
}
