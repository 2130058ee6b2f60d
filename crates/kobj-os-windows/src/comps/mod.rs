mod fast_ref;
mod handle_table;
mod key_control_block;
pub(crate) mod macros;
mod module;
mod name_info;
mod object;
mod peb;
mod session;
mod unicode_string;
mod vad;

use kobj_core::{AddressSpace, KobjError, Object, Value, WinTimeStamp};

pub use self::{
    fast_ref::WindowsFastRef,
    handle_table::{WindowsHandleTable, WindowsHandleTableEntry},
    key_control_block::WindowsKeyControlBlock,
    module::WindowsModule,
    name_info::WindowsObjectHeaderNameInfo,
    object::{
        WindowsFileObject, WindowsKeyBody, WindowsObjectHeader, WindowsObjectHeaderInfo,
        WindowsObjectType, WindowsProcess, WindowsSid, WindowsThread, WindowsToken,
    },
    peb::WindowsPeb,
    session::WindowsSession,
    unicode_string::WindowsUnicodeString,
    vad::{VAD_TAGS, VadKind, WindowsVad, WindowsVadFlags},
};

/// Reads a timestamp member.
pub(crate) fn timestamp<A>(object: &Object<'_, A>, name: &str) -> Result<WinTimeStamp, KobjError>
where
    A: AddressSpace,
{
    match object.member(name)? {
        Value::Timestamp(timestamp) => Ok(timestamp),
        _ => Err(KobjError::Other("member is not a timestamp")),
    }
}
