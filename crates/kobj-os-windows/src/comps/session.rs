use kobj_core::{AddressSpace, Object};

use super::macros::impl_class;

/// A Windows session space.
///
/// Each logon session (e.g., when a user connects via Remote Desktop) gets
/// a separate instance of `_MM_SESSION_SPACE`.
///
/// # Implementation Details
///
/// Corresponds to `_MM_SESSION_SPACE`.
pub struct WindowsSession<'a, A>
where
    A: AddressSpace,
{
    object: Object<'a, A>,
}

impl_class!(WindowsSession, "_MM_SESSION_SPACE");

impl<A> WindowsSession<'_, A>
where
    A: AddressSpace,
{
    /// Returns the session ID.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_MM_SESSION_SPACE.SessionId`.
    pub fn id(&self) -> Result<u64, kobj_core::KobjError> {
        self.object.member_u64("SessionId")
    }
}
