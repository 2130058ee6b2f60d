mod file;
mod key;
mod object_type;
mod process;
mod thread;
mod token;

use kobj_core::{AddressSpace, Class, KobjError, Object, Recover as _, tagged};

pub use self::{
    file::WindowsFileObject,
    key::WindowsKeyBody,
    object_type::WindowsObjectType,
    process::WindowsProcess,
    thread::WindowsThread,
    token::{WindowsSid, WindowsToken},
};
use super::WindowsObjectHeaderNameInfo;
use crate::WindowsError;

bitflags::bitflags! {
    /// Optional headers present before an object header.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_OBJECT_HEADER.InfoMask`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WindowsObjectHeaderInfo: u8 {
        /// `_OBJECT_HEADER_CREATOR_INFO`
        const CREATOR_INFO = 0x01;
        /// `_OBJECT_HEADER_NAME_INFO`
        const NAME_INFO = 0x02;
        /// `_OBJECT_HEADER_HANDLE_INFO`
        const HANDLE_INFO = 0x04;
        /// `_OBJECT_HEADER_QUOTA_INFO`
        const QUOTA_INFO = 0x08;
        /// `_OBJECT_HEADER_PROCESS_INFO`
        const PROCESS_INFO = 0x10;
    }
}

/// Optional headers in the order they are stacked before the object
/// header, with the legacy field holding their distance from the header.
const OPTIONAL_HEADERS: [(WindowsObjectHeaderInfo, &str, Option<&str>); 5] = [
    (
        WindowsObjectHeaderInfo::CREATOR_INFO,
        "_OBJECT_HEADER_CREATOR_INFO",
        None,
    ),
    (
        WindowsObjectHeaderInfo::NAME_INFO,
        "_OBJECT_HEADER_NAME_INFO",
        Some("NameInfoOffset"),
    ),
    (
        WindowsObjectHeaderInfo::HANDLE_INFO,
        "_OBJECT_HEADER_HANDLE_INFO",
        Some("HandleInfoOffset"),
    ),
    (
        WindowsObjectHeaderInfo::QUOTA_INFO,
        "_OBJECT_HEADER_QUOTA_INFO",
        Some("QuotaInfoOffset"),
    ),
    (
        WindowsObjectHeaderInfo::PROCESS_INFO,
        "_OBJECT_HEADER_PROCESS_INFO",
        None,
    ),
];

/// A Windows object header.
///
/// Every object managed by the Object Manager is preceded by an object
/// header, which is in turn preceded by a variable set of optional headers.
/// An object header reached through a handle table carries the handle value
/// it was found under, and its parent is the handle table entry.
///
/// # Implementation Details
///
/// Corresponds to `_OBJECT_HEADER`.
pub struct WindowsObjectHeader<'a, A>
where
    A: AddressSpace,
{
    object: Object<'a, A>,
    handle_value: Option<u64>,
}

impl<'a, A> Class<'a, A> for WindowsObjectHeader<'a, A>
where
    A: AddressSpace,
{
    const TYPE_NAME: &'static str = "_OBJECT_HEADER";

    fn from_object(object: Object<'a, A>) -> Self {
        Self {
            object,
            handle_value: None,
        }
    }

    fn object(&self) -> &Object<'a, A> {
        &self.object
    }
}

impl<'a, A> From<WindowsObjectHeader<'a, A>> for Object<'a, A>
where
    A: AddressSpace,
{
    fn from(value: WindowsObjectHeader<'a, A>) -> Self {
        value.object
    }
}

impl<A> Clone for WindowsObjectHeader<'_, A>
where
    A: AddressSpace,
{
    fn clone(&self) -> Self {
        Self {
            object: self.object.clone(),
            handle_value: self.handle_value,
        }
    }
}

impl<A> std::fmt::Debug for WindowsObjectHeader<'_, A>
where
    A: AddressSpace,
{
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("WindowsObjectHeader")
            .field("offset", &self.object.offset())
            .field("handle_value", &self.handle_value)
            .finish()
    }
}

impl<'a, A> WindowsObjectHeader<'a, A>
where
    A: AddressSpace,
{
    /// Wraps an object header found under a handle value.
    pub fn with_handle_value(object: Object<'a, A>, handle_value: u64) -> Self {
        Self {
            object,
            handle_value: Some(handle_value),
        }
    }

    /// Returns the handle value the header was found under.
    pub fn handle_value(&self) -> Option<u64> {
        self.handle_value
    }

    /// Returns the access rights granted to the handle the header was found
    /// under.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_HANDLE_TABLE_ENTRY.GrantedAccess` of the parent
    /// entry.
    pub fn granted_access(&self) -> Result<Option<u64>, KobjError> {
        match self.object.parent() {
            Some(entry) if entry.type_name() == "_HANDLE_TABLE_ENTRY" => {
                entry.member_u64("GrantedAccess").recover()
            }
            _ => Ok(None),
        }
    }

    /// Returns the size of the header, which is the offset of the body.
    pub fn size(&self) -> Result<u64, KobjError> {
        self.object.size()
    }

    /// Returns a view of the object body as `type_name`.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_OBJECT_HEADER.Body`.
    pub fn body_as(&self, type_name: &str) -> Result<Object<'a, A>, KobjError> {
        tagged::cast_body(&self.object, type_name)
    }

    /// Returns the index of the object type, if the header has one.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_OBJECT_HEADER.TypeIndex`.
    pub fn type_index(&self) -> Result<Option<u64>, KobjError> {
        if !self.object.has_member("TypeIndex") {
            return Ok(None);
        }

        Ok(Some(self.object.member_u64("TypeIndex")?))
    }

    /// Checks whether the header refers to an object type.
    ///
    /// Free entries of a handle table point at headers without a type.
    pub fn is_typed(&self) -> Result<bool, KobjError> {
        match self.type_index()? {
            Some(index) => Ok(index != 0),
            None => Ok(!self.object.member_va("Type")?.is_null()),
        }
    }

    /// Returns the object type.
    ///
    /// # Implementation Details
    ///
    /// The type is either referenced directly by `_OBJECT_HEADER.Type`, or
    /// `_OBJECT_HEADER.TypeIndex` selects it from the `ObTypeIndexTable`
    /// array.
    pub fn object_type(&self) -> Result<Option<WindowsObjectType<'a, A>>, KobjError> {
        let index = match self.type_index()? {
            Some(index) => index,
            None => {
                let object_type = self
                    .object
                    .member_pointer("Type")?
                    .dereference_as(WindowsObjectType::<A>::TYPE_NAME)?;

                return Ok(object_type.map(WindowsObjectType::from_object));
            }
        };

        let profile = self.object.profile();
        let table = match profile.constant("ObTypeIndexTable") {
            Some(table) => kobj_core::Va(table),
            None => return Err(WindowsError::MissingConstant("ObTypeIndexTable").into()),
        };

        let pointer_width = profile.pointer_width();
        let entry = table + index * pointer_width;

        let object_type = match self
            .object
            .space()
            .read_address(entry, pointer_width as usize)
            .recover()?
        {
            Some(object_type) if !object_type.is_null() => object_type,
            _ => return Ok(None),
        };

        let object_type = self
            .object
            .child(object_type, WindowsObjectType::<A>::TYPE_NAME);

        if !object_type.check_valid()? {
            return Ok(None);
        }

        Ok(Some(WindowsObjectType::from_object(object_type)))
    }

    /// Returns the name of the object type.
    pub fn object_type_name(&self) -> Result<Option<String>, KobjError> {
        match self.object_type()? {
            Some(object_type) => object_type.name(),
            None => Ok(None),
        }
    }

    /// Returns the optional header selected by `info`.
    ///
    /// # Implementation Details
    ///
    /// With `_OBJECT_HEADER.InfoMask`, the distance of an optional header
    /// is the summed size of the present optional headers whose bit is at
    /// or below its own. Older systems store the distance in the
    /// `*InfoOffset` fields.
    pub fn optional_header(
        &self,
        info: WindowsObjectHeaderInfo,
    ) -> Result<Option<Object<'a, A>>, KobjError> {
        let profile = self.object.profile();

        let (type_name, legacy_field) = match OPTIONAL_HEADERS
            .iter()
            .find(|(flag, _, _)| *flag == info)
        {
            Some((_, type_name, legacy_field)) => (*type_name, *legacy_field),
            None => return Ok(None),
        };

        if !profile.has_type(type_name) {
            return Ok(None);
        }

        let distance = if self.object.has_member("InfoMask") {
            let mask = self.object.member_u64("InfoMask")?;
            let mask = WindowsObjectHeaderInfo::from_bits_truncate(mask as u8);

            if !mask.contains(info) {
                return Ok(None);
            }

            let mut distance = 0;
            for (flag, type_name, _) in &OPTIONAL_HEADERS {
                if flag.bits() <= info.bits()
                    && mask.contains(*flag)
                    && profile.has_type(type_name)
                {
                    distance += profile.type_size(type_name)?;
                }
            }

            distance
        }
        else {
            match legacy_field {
                Some(field) if self.object.has_member(field) => {
                    match self.object.member_u64(field)? {
                        0 => return Ok(None),
                        distance => distance,
                    }
                }
                _ => return Ok(None),
            }
        };

        Ok(Some(
            self.object.child(self.object.offset() - distance, type_name),
        ))
    }

    /// Returns the name information header.
    pub fn name_info(&self) -> Result<Option<WindowsObjectHeaderNameInfo<'a, A>>, KobjError> {
        Ok(self
            .optional_header(WindowsObjectHeaderInfo::NAME_INFO)?
            .map(WindowsObjectHeaderNameInfo::from_object))
    }

    /// Returns the handle information header.
    pub fn handle_info(&self) -> Result<Option<Object<'a, A>>, KobjError> {
        self.optional_header(WindowsObjectHeaderInfo::HANDLE_INFO)
    }

    /// Returns the quota information header.
    pub fn quota_info(&self) -> Result<Option<Object<'a, A>>, KobjError> {
        self.optional_header(WindowsObjectHeaderInfo::QUOTA_INFO)
    }

    /// Returns the total size of the optional headers stacked before the
    /// object header.
    pub fn preamble_size(&self) -> Result<u64, KobjError> {
        let mut size = 0;

        for (flag, _, _) in &OPTIONAL_HEADERS {
            if let Some(header) = self.optional_header(*flag)? {
                size += header.size()?;
            }
        }

        Ok(size)
    }

    /// Returns the name of the object.
    ///
    /// Shortcut for [`self.name_info()?.name()`].
    ///
    /// [`self.name_info()?.name()`]: WindowsObjectHeaderNameInfo::name
    pub fn name(&self) -> Result<Option<String>, KobjError> {
        match self.name_info()? {
            Some(name_info) => name_info.name(),
            None => Ok(None),
        }
    }
}
