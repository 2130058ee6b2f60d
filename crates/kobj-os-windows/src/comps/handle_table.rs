use kobj_core::{AddressSpace, Class as _, KobjError, Object, Va};

use super::{WindowsFastRef, WindowsObjectHeader, macros::impl_class};
use crate::HandleTableIterator;

/// The low bits of `_HANDLE_TABLE.TableCode` holding the number of
/// indirection levels.
const LEVEL_CODE_MASK: u64 = 7;

/// A Windows handle table.
///
/// A handle table in Windows tracks handles to kernel objects
/// for a specific process, allowing access control and management.
///
/// # Implementation Details
///
/// Corresponds to `_HANDLE_TABLE`.
pub struct WindowsHandleTable<'a, A>
where
    A: AddressSpace,
{
    object: Object<'a, A>,
}

impl_class!(WindowsHandleTable, "_HANDLE_TABLE");

impl<'a, A> WindowsHandleTable<'a, A>
where
    A: AddressSpace,
{
    /// Returns the table code of the handle table.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_HANDLE_TABLE.TableCode`.
    pub fn table_code(&self) -> Result<u64, KobjError> {
        self.object.member_u64("TableCode")
    }

    /// Returns the number of indirection levels above the entry tables.
    pub fn levels(&self) -> Result<u64, KobjError> {
        Ok(self.table_code()? & LEVEL_CODE_MASK)
    }

    /// Returns the address of the top-level table.
    pub fn base(&self) -> Result<Va, KobjError> {
        Ok(Va(self.table_code()? & !LEVEL_CODE_MASK))
    }

    /// Enumerates the object headers referenced by the table.
    ///
    /// Free entries are skipped.
    pub fn handles(&self) -> Result<HandleTableIterator<'a, A>, KobjError> {
        HandleTableIterator::new(self)
    }

    /// Finds the object header referenced by a handle value.
    pub fn lookup(&self, handle_value: u64) -> Result<Option<WindowsObjectHeader<'a, A>>, KobjError> {
        for header in self.handles()? {
            let header = header?;

            if header.handle_value() == Some(handle_value) {
                return Ok(Some(header));
            }
        }

        Ok(None)
    }
}

/// A Windows handle table entry.
///
/// # Implementation Details
///
/// Corresponds to `_HANDLE_TABLE_ENTRY`.
pub struct WindowsHandleTableEntry<'a, A>
where
    A: AddressSpace,
{
    object: Object<'a, A>,
}

impl_class!(WindowsHandleTableEntry, "_HANDLE_TABLE_ENTRY");

impl<'a, A> WindowsHandleTableEntry<'a, A>
where
    A: AddressSpace,
{
    /// Returns the access rights granted to the handle.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_HANDLE_TABLE_ENTRY.GrantedAccess`.
    pub fn granted_access(&self) -> Result<u64, KobjError> {
        self.object.member_u64("GrantedAccess")
    }

    /// Returns the object header the entry refers to.
    ///
    /// The header has the entry as its parent and carries `handle_value`.
    /// Returns `Ok(None)` for a free entry or an unreadable header.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_HANDLE_TABLE_ENTRY.Object`, a fast reference.
    pub fn object_header(
        &self,
        handle_value: u64,
    ) -> Result<Option<WindowsObjectHeader<'a, A>>, KobjError> {
        let fast_ref = WindowsFastRef::from_object(self.object.member_object("Object")?);
        let header = fast_ref
            .dereference_with_parent(Some(WindowsObjectHeader::<A>::TYPE_NAME), &self.object)?;

        Ok(header.map(|header| WindowsObjectHeader::with_handle_value(header, handle_value)))
    }
}
