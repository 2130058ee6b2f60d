use kobj_core::{AddressSpace, KobjError, Length, Object, Type, Value, Va};

use super::macros::impl_class;

/// Upper bound of a plausible string length, in bytes.
const MAX_LENGTH: u64 = 1024;

/// A counted UTF-16 string.
///
/// # Implementation Details
///
/// Corresponds to `_UNICODE_STRING`.
pub struct WindowsUnicodeString<'a, A>
where
    A: AddressSpace,
{
    object: Object<'a, A>,
}

impl_class!(WindowsUnicodeString, "_UNICODE_STRING");

impl<'a, A> WindowsUnicodeString<'a, A>
where
    A: AddressSpace,
{
    /// Returns the length of the string in bytes.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_UNICODE_STRING.Length`.
    pub fn length(&self) -> Result<u64, KobjError> {
        self.object.member_u64("Length")
    }

    /// Returns the address of the character buffer.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_UNICODE_STRING.Buffer`.
    pub fn buffer(&self) -> Result<Va, KobjError> {
        self.object.member_va("Buffer")
    }

    /// Returns the string.
    ///
    /// Strings with a length of zero or above 1024 bytes are treated as
    /// empty. Returns `Ok(None)` if the buffer cannot be read.
    pub fn value(&self) -> Result<Option<String>, KobjError> {
        let length = self.length()?;

        if length == 0 || length > MAX_LENGTH {
            return Ok(Some(String::new()));
        }

        let buffer = self.object.member_pointer("Buffer")?;
        let target = Type::UnicodeString {
            length: Length::Fixed(length),
        };

        match buffer.dereference_with(&target)? {
            Some(Value::String(value)) => Ok(Some(value)),
            _ => Ok(None),
        }
    }
}
