use kobj_core::{AddressSpace, Class as _, KobjError, Object, Value, WinTimeStamp};

use super::{
    super::{macros::impl_class, timestamp},
    WindowsProcess,
};

/// A Windows thread.
///
/// # Implementation Details
///
/// Corresponds to `_ETHREAD`.
pub struct WindowsThread<'a, A>
where
    A: AddressSpace,
{
    object: Object<'a, A>,
}

impl_class!(WindowsThread, "_ETHREAD");

impl<'a, A> WindowsThread<'a, A>
where
    A: AddressSpace,
{
    /// Returns the process the thread belongs to.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_ETHREAD.ThreadsProcess`.
    pub fn owning_process(&self) -> Result<Option<WindowsProcess<'a, A>>, KobjError> {
        Ok(self
            .object
            .member_pointer("ThreadsProcess")?
            .dereference_as(WindowsProcess::<A>::TYPE_NAME)?
            .map(WindowsProcess::from_object))
    }

    /// Returns the process whose address space the thread is attached to.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_ETHREAD.Tcb.ApcState.Process`.
    pub fn attached_process(&self) -> Result<Option<WindowsProcess<'a, A>>, KobjError> {
        let process = match self.object.member_path("Tcb.ApcState.Process")? {
            Value::Pointer(process) => process,
            _ => return Err(KobjError::Other("attached process is not a pointer")),
        };

        Ok(process
            .dereference_as(WindowsProcess::<A>::TYPE_NAME)?
            .map(WindowsProcess::from_object))
    }

    /// Returns the creation time of the thread.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_ETHREAD.CreateTime`, whose low bits are flags.
    pub fn create_time(&self) -> Result<WinTimeStamp, KobjError> {
        timestamp(&self.object, "CreateTime")
    }

    /// Returns the exit time of the thread, zero while it runs.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_ETHREAD.ExitTime`.
    pub fn exit_time(&self) -> Result<WinTimeStamp, KobjError> {
        timestamp(&self.object, "ExitTime")
    }

    /// Returns the process and thread IDs.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_ETHREAD.Cid`.
    pub fn cid(&self) -> Result<(u64, u64), KobjError> {
        let cid = self.object.member_object("Cid")?;
        Ok((
            cid.member_u64("UniqueProcess")?,
            cid.member_u64("UniqueThread")?,
        ))
    }
}
