use std::collections::HashSet;

use kobj_core::{AddressSpace, Class as _, KobjError, Object};

use super::super::{WindowsKeyControlBlock, macros::impl_class};

/// A Windows registry key object.
///
/// # Implementation Details
///
/// Corresponds to `_CM_KEY_BODY`.
pub struct WindowsKeyBody<'a, A>
where
    A: AddressSpace,
{
    object: Object<'a, A>,
}

impl_class!(WindowsKeyBody, "_CM_KEY_BODY");

impl<'a, A> WindowsKeyBody<'a, A>
where
    A: AddressSpace,
{
    /// Returns the key control block of the key.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_CM_KEY_BODY.KeyControlBlock`.
    pub fn key_control_block(&self) -> Result<Option<WindowsKeyControlBlock<'a, A>>, KobjError> {
        Ok(self
            .object
            .member_pointer("KeyControlBlock")?
            .dereference_as(WindowsKeyControlBlock::<A>::TYPE_NAME)?
            .map(WindowsKeyControlBlock::from_object))
    }

    /// Returns the full path of the key, e.g. `REGISTRY\MACHINE\SOFTWARE`.
    ///
    /// The root control block, which has no parent, does not contribute to
    /// the path. A control block whose parent cannot be read still
    /// contributes its name and ends the walk. The walk also stops at a
    /// control block without a readable name or at one already visited.
    pub fn full_key_name(&self) -> Result<String, KobjError> {
        let mut names = Vec::new();
        let mut visited = HashSet::new();

        let mut current = self.key_control_block()?;
        while let Some(kcb) = current {
            if !visited.insert(kcb.object().offset()) {
                tracing::warn!(kcb = %kcb.object().offset(), "key control block cycle");
                break;
            }

            if kcb.parent_is_null()? {
                break;
            }

            match kcb.name()? {
                Some(name) => names.push(name),
                None => break,
            }

            current = kcb.parent()?;
        }

        names.reverse();
        Ok(names.join("\\"))
    }
}
