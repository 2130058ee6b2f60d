use std::rc::Rc;

use kobj_core::{AddressSpace, Class as _, KobjError, Object, Pa, Value, WinTimeStamp};

use super::{
    super::{
        WindowsFastRef, WindowsHandleTable, WindowsModule, WindowsPeb, WindowsSession, WindowsVad,
        macros::impl_class, timestamp,
    },
    WindowsObjectHeader, WindowsThread, WindowsToken,
};
use crate::{ListEntryIterator, VadIterator};

/// A Windows process.
///
/// The process is represented by the `_EPROCESS` structure in the kernel
/// address space. User-mode structures of the process (the PEB, the loader
/// lists) are read through an address space derived from the directory
/// table base of the process.
///
/// # Implementation Details
///
/// Corresponds to `_EPROCESS`.
pub struct WindowsProcess<'a, A>
where
    A: AddressSpace,
{
    object: Object<'a, A>,
}

impl_class!(WindowsProcess, "_EPROCESS");

impl<'a, A> WindowsProcess<'a, A>
where
    A: AddressSpace,
{
    /// Returns the process ID.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_EPROCESS.UniqueProcessId`.
    pub fn pid(&self) -> Result<u64, KobjError> {
        self.object.member_u64("UniqueProcessId")
    }

    /// Returns the ID of the process this one was created by.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_EPROCESS.InheritedFromUniqueProcessId`.
    pub fn parent_pid(&self) -> Result<u64, KobjError> {
        self.object.member_u64("InheritedFromUniqueProcessId")
    }

    /// Returns the short name of the process image.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_EPROCESS.ImageFileName`.
    pub fn image_file_name(&self) -> Result<String, KobjError> {
        self.object.member_string("ImageFileName")
    }

    /// Returns the creation time of the process.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_EPROCESS.CreateTime`.
    pub fn create_time(&self) -> Result<WinTimeStamp, KobjError> {
        timestamp(&self.object, "CreateTime")
    }

    /// Returns the exit time of the process, zero while it runs.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_EPROCESS.ExitTime`.
    pub fn exit_time(&self) -> Result<WinTimeStamp, KobjError> {
        timestamp(&self.object, "ExitTime")
    }

    /// Checks whether the process is a 32-bit process on a 64-bit system.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_EPROCESS.Wow64Process != NULL`.
    pub fn is_wow64(&self) -> Result<bool, KobjError> {
        for name in ["Wow64Process", "WoW64Process"] {
            if self.object.has_member(name) {
                return Ok(!self.object.member_va(name)?.is_null());
            }
        }

        Ok(false)
    }

    /// Returns the root of the page tables of the process.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_KPROCESS.DirectoryTableBase`.
    pub fn directory_table_base(&self) -> Result<Pa, KobjError> {
        match self.object.member_path("Pcb.DirectoryTableBase")?.as_u64() {
            Some(root) => Ok(Pa(root)),
            None => Err(KobjError::Other("directory table base is not a scalar")),
        }
    }

    /// Returns the address space of the process.
    ///
    /// Returns `Ok(None)` if the page tables of the process are not
    /// available.
    pub fn process_address_space(&self) -> Result<Option<Rc<A>>, KobjError> {
        let root = self.directory_table_base()?;

        match self.object.space().derive(root) {
            Ok(space) => Ok(Some(Rc::new(space))),
            Err(err) if err.is_absent() => {
                tracing::debug!(
                    process = %self.object.offset(),
                    %root,
                    %err,
                    "process address space is not available"
                );
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Returns the process environment block.
    ///
    /// The PEB is read from the address space of the process. Returns
    /// `Ok(None)` if that space or the PEB is not available.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_EPROCESS.Peb`.
    pub fn peb(&self) -> Result<Option<WindowsPeb<'a, A>>, KobjError> {
        let address = self.object.member_va("Peb")?;
        if address.is_null() {
            return Ok(None);
        }

        let space = match self.process_address_space()? {
            Some(space) => space,
            None => return Ok(None),
        };

        let peb = self
            .object
            .child(address, WindowsPeb::<A>::TYPE_NAME)
            .in_space(space)
            .with_name("Peb");

        if !peb.check_valid()? {
            tracing::debug!(process = %self.object.offset(), peb = %address, "peb is not valid");
            return Ok(None);
        }

        Ok(Some(WindowsPeb::from_object(peb)))
    }

    /// Returns the session space of the process.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_EPROCESS.Session`.
    pub fn session(&self) -> Result<Option<WindowsSession<'a, A>>, KobjError> {
        let address = self.object.member_va("Session")?;
        if address.is_null() {
            return Ok(None);
        }

        let space = match self.process_address_space()? {
            Some(space) => space,
            None => return Ok(None),
        };

        let session = self
            .object
            .child(address, WindowsSession::<A>::TYPE_NAME)
            .in_space(space);

        if !session.check_valid()? {
            return Ok(None);
        }

        Ok(Some(WindowsSession::from_object(session)))
    }

    /// Returns the ID of the session the process runs in.
    pub fn session_id(&self) -> Result<Option<u64>, KobjError> {
        match self.session()? {
            Some(session) => Ok(Some(session.id()?)),
            None => Ok(None),
        }
    }

    /// Returns the modules of the process in load order.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_PEB_LDR_DATA.InLoadOrderModuleList`.
    pub fn load_order_modules(
        &self,
    ) -> Result<impl Iterator<Item = Result<WindowsModule<'a, A>, KobjError>> + use<'a, A>, KobjError>
    {
        self.modules("InLoadOrderModuleList", "InLoadOrderLinks")
    }

    /// Returns the modules of the process in memory order.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_PEB_LDR_DATA.InMemoryOrderModuleList`.
    pub fn memory_order_modules(
        &self,
    ) -> Result<impl Iterator<Item = Result<WindowsModule<'a, A>, KobjError>> + use<'a, A>, KobjError>
    {
        self.modules("InMemoryOrderModuleList", "InMemoryOrderLinks")
    }

    /// Returns the modules of the process in initialization order.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_PEB_LDR_DATA.InInitializationOrderModuleList`.
    pub fn init_order_modules(
        &self,
    ) -> Result<impl Iterator<Item = Result<WindowsModule<'a, A>, KobjError>> + use<'a, A>, KobjError>
    {
        self.modules(
            "InInitializationOrderModuleList",
            "InInitializationOrderLinks",
        )
    }

    /// Walks one of the loader lists.
    ///
    /// The list is empty for the idle process and for processes without a
    /// readable PEB or loader data.
    fn modules(
        &self,
        list: &str,
        link: &str,
    ) -> Result<impl Iterator<Item = Result<WindowsModule<'a, A>, KobjError>> + use<'a, A>, KobjError>
    {
        let entries = match self.module_list_head(list)? {
            Some(head) => Some(ListEntryIterator::new(
                head,
                WindowsModule::<A>::TYPE_NAME,
                link,
            )?),
            None => None,
        };

        Ok(entries
            .into_iter()
            .flatten()
            .map(|entry| entry.map(WindowsModule::from_object)))
    }

    fn module_list_head(&self, list: &str) -> Result<Option<Object<'a, A>>, KobjError> {
        if self.pid()? == 0 {
            return Ok(None);
        }

        let ldr = match self.peb()? {
            Some(peb) => peb.ldr()?,
            None => None,
        };

        match ldr {
            Some(ldr) => Ok(Some(ldr.member_object(list)?)),
            None => Ok(None),
        }
    }

    /// Returns the primary access token of the process.
    ///
    /// Returns `Ok(None)` if the token is not readable or not plausible.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_EPROCESS.Token`, a fast reference.
    pub fn token(&self) -> Result<Option<WindowsToken<'a, A>>, KobjError> {
        let token = WindowsFastRef::from_object(self.object.member_object("Token")?);

        Ok(token
            .dereference(Some(WindowsToken::<A>::TYPE_NAME))?
            .map(WindowsToken::from_object))
    }

    /// Returns the handle table of the process.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_EPROCESS.ObjectTable`.
    pub fn handle_table(&self) -> Result<Option<WindowsHandleTable<'a, A>>, KobjError> {
        Ok(self
            .object
            .member_pointer("ObjectTable")?
            .dereference_as(WindowsHandleTable::<A>::TYPE_NAME)?
            .map(WindowsHandleTable::from_object))
    }

    /// Enumerates the objects the process holds handles to.
    pub fn handles(
        &self,
    ) -> Result<
        impl Iterator<Item = Result<WindowsObjectHeader<'a, A>, KobjError>> + use<'a, A>,
        KobjError,
    > {
        let handles = match self.handle_table()? {
            Some(handle_table) => Some(handle_table.handles()?),
            None => None,
        };

        Ok(handles.into_iter().flatten())
    }

    /// Finds the object header a handle of the process refers to.
    pub fn lookup_handle(
        &self,
        handle_value: u64,
    ) -> Result<Option<WindowsObjectHeader<'a, A>>, KobjError> {
        match self.handle_table()? {
            Some(handle_table) => handle_table.lookup(handle_value),
            None => Ok(None),
        }
    }

    /// Finds the object a handle of the process refers to, viewed as
    /// `type_name`.
    pub fn lookup_handle_as(
        &self,
        handle_value: u64,
        type_name: &str,
    ) -> Result<Option<Object<'a, A>>, KobjError> {
        match self.lookup_handle(handle_value)? {
            Some(header) => Ok(Some(header.body_as(type_name)?)),
            None => Ok(None),
        }
    }

    /// Returns the root of the VAD tree.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_EPROCESS.VadRoot`, which is either a pointer to the
    /// root node, an `_MM_AVL_TABLE` whose `BalancedRoot.RightChild` is the
    /// root node (Windows 7), or an `_RTL_AVL_TREE` whose `Root` is the root
    /// node (Windows 8.1+).
    pub fn vad_root(&self) -> Result<Option<WindowsVad<'a, A>>, KobjError> {
        let root = match self.object.member("VadRoot")? {
            Value::Pointer(root) => root.dereference_as(WindowsVad::<A>::TYPE_NAME)?,
            Value::Struct(table) if table.has_member("BalancedRoot") => table
                .member_object("BalancedRoot")?
                .member_pointer("RightChild")?
                .dereference_as(WindowsVad::<A>::TYPE_NAME)?,
            Value::Struct(table) => table
                .member_pointer("Root")?
                .dereference_as(WindowsVad::<A>::TYPE_NAME)?,
            Value::Unsigned(0) => None,
            Value::Unsigned(root) => {
                let root = self
                    .object
                    .child(root.into(), WindowsVad::<A>::TYPE_NAME);

                if root.check_valid()? {
                    Some(root)
                }
                else {
                    None
                }
            }
            _ => return Err(KobjError::Other("unsupported VadRoot type")),
        };

        Ok(root.map(WindowsVad::from_object))
    }

    /// Enumerates the VAD tree of the process in pre-order.
    ///
    /// Each call starts a new walk from the root.
    pub fn vads(&self) -> Result<VadIterator<'a, A>, KobjError> {
        Ok(VadIterator::new(self.vad_root()?.map(Object::from)))
    }

    /// Enumerates the threads of the process.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_EPROCESS.ThreadListHead`.
    pub fn threads(
        &self,
    ) -> Result<impl Iterator<Item = Result<WindowsThread<'a, A>, KobjError>> + use<'a, A>, KobjError>
    {
        let head = self.object.member_object("ThreadListHead")?;

        Ok(
            ListEntryIterator::new(head, WindowsThread::<A>::TYPE_NAME, "ThreadListEntry")?
                .map(|entry| entry.map(WindowsThread::from_object)),
        )
    }
}
