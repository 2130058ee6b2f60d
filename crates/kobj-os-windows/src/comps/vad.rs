use kobj_core::{AddressSpace, Class as _, KobjError, Object, Recover as _, Value, tagged::TagTable};

use super::macros::impl_class;

/// Maps the pool tag of a VAD to its concrete structure.
///
/// The tag is stored right before the structure.
pub const VAD_TAGS: TagTable = TagTable {
    offset: -4,
    length: 4,
    entries: &[
        (b"Vadl", "_MMVAD_LONG"),
        (b"Vad ", "_MMVAD_LONG"),
        (b"Vadm", "_MMVAD_LONG"),
        (b"VadS", "_MMVAD_SHORT"),
        (b"VadF", "_MMVAD_SHORT"),
    ],
};

/// The concrete structure of a VAD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadKind {
    /// `_MMVAD_SHORT`, describing private memory.
    Short,

    /// `_MMVAD_LONG`, describing mapped memory.
    Long,
}

/// A Windows virtual address descriptor.
///
/// A node of the tree describing the virtual memory regions of a process.
///
/// # Implementation Details
///
/// Corresponds to `_MMVAD`, `_MMVAD_SHORT` or `_MMVAD_LONG`.
pub struct WindowsVad<'a, A>
where
    A: AddressSpace,
{
    object: Object<'a, A>,
}

impl_class!(WindowsVad, "_MMVAD");

impl<'a, A> WindowsVad<'a, A>
where
    A: AddressSpace,
{
    /// Returns the concrete structure selected by the pool tag, if it was
    /// recognized.
    pub fn kind(&self) -> Option<VadKind> {
        match self.object.type_name() {
            "_MMVAD_SHORT" => Some(VadKind::Short),
            "_MMVAD_LONG" => Some(VadKind::Long),
            _ => None,
        }
    }

    /// Returns the pool tag.
    pub fn tag(&self) -> Result<Option<String>, KobjError> {
        self.object.member_string("Tag").recover()
    }

    /// Returns the first virtual page number of the region.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_MMVAD.StartingVpn`.
    pub fn starting_vpn(&self) -> Result<u64, KobjError> {
        self.object.member_u64("StartingVpn")
    }

    /// Returns the last virtual page number of the region.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_MMVAD.EndingVpn`.
    pub fn ending_vpn(&self) -> Result<u64, KobjError> {
        self.object.member_u64("EndingVpn")
    }

    /// Returns the first address of the region.
    ///
    /// A page number too large to be turned into an address is reported as
    /// [`KobjError::Implausible`].
    pub fn start(&self) -> Result<u64, KobjError> {
        self.starting_vpn()?
            .checked_mul(self.object.profile().page_size())
            .ok_or(KobjError::Implausible("vad range"))
    }

    /// Returns the last address of the region (inclusive).
    pub fn end(&self) -> Result<u64, KobjError> {
        let page_size = self.object.profile().page_size();

        self.ending_vpn()?
            .checked_add(1)
            .and_then(|pages| pages.checked_mul(page_size))
            .and_then(|end| end.checked_sub(1))
            .ok_or(KobjError::Implausible("vad range"))
    }

    /// Returns the parent node.
    ///
    /// Returns `Ok(None)` if the layout has no parent link.
    pub fn parent(&self) -> Result<Option<WindowsVad<'a, A>>, KobjError> {
        if !self.object.has_member("Parent") {
            return Ok(None);
        }

        self.link("Parent")
    }

    /// Returns the left child.
    pub fn left_child(&self) -> Result<Option<WindowsVad<'a, A>>, KobjError> {
        self.link("LeftChild")
    }

    /// Returns the right child.
    pub fn right_child(&self) -> Result<Option<WindowsVad<'a, A>>, KobjError> {
        self.link("RightChild")
    }

    fn link(&self, name: &str) -> Result<Option<WindowsVad<'a, A>>, KobjError> {
        let pointer = match self.object.member_pointer(name).recover()? {
            Some(pointer) => pointer,
            None => return Ok(None),
        };

        Ok(pointer
            .dereference_as(Self::TYPE_NAME)?
            .map(Self::from_object))
    }

    /// Returns the flags of the region.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_MMVAD.u.VadFlags`.
    pub fn flags(&self) -> Result<Option<WindowsVadFlags<'a, A>>, KobjError> {
        if !self.object.has_member("u") {
            return Ok(None);
        }

        match self.object.member_path("u.VadFlags").recover()? {
            Some(Value::Struct(flags)) => Ok(Some(WindowsVadFlags { object: flags })),
            _ => Ok(None),
        }
    }
}

/// The flags of a virtual address descriptor.
///
/// # Implementation Details
///
/// Corresponds to `_MMVAD_FLAGS`.
pub struct WindowsVadFlags<'a, A>
where
    A: AddressSpace,
{
    object: Object<'a, A>,
}

impl_class!(WindowsVadFlags, "_MMVAD_FLAGS");

impl<A> WindowsVadFlags<'_, A>
where
    A: AddressSpace,
{
    /// Returns the value of a single flag.
    pub fn get(&self, name: &str) -> Result<u64, KobjError> {
        self.object.member_u64(name)
    }

    /// Returns the set flags as `name: value` pairs, sorted by name.
    pub fn describe(&self) -> Result<String, KobjError> {
        let layout = self.object.layout()?;

        let mut flags = Vec::new();
        for name in layout.fields.keys() {
            let value = self.object.member_u64(name)?;
            if value != 0 {
                flags.push((name.as_str(), value));
            }
        }

        flags.sort_unstable_by_key(|(name, _)| *name);

        Ok(flags
            .iter()
            .map(|(name, value)| format!("{name}: {value}"))
            .collect::<Vec<_>>()
            .join(", "))
    }
}
