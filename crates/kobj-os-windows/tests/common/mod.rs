#![allow(dead_code)]

use kobj_core::{
    KobjError, Length, NativeType, Pa, Profile, ProfileMetadata, SparseMemory, SparseMemoryBuilder,
    StructLayout, Type, memory::KERNEL_ROOT,
};
use kobj_os_windows::WindowsProfile;

///////////////////////////////////////////////////////////////////////////////
// Addresses
///////////////////////////////////////////////////////////////////////////////

/// Page-table root of the test process.
pub const PROCESS_ROOT: Pa = Pa(0x1aa000);

/// Address of the `ObTypeIndexTable` array.
pub const TYPE_INDEX_TABLE: u64 = 0x80_0000;

/// `_EPROCESS` of the test process.
pub const EPROCESS: u64 = 0x10_0000;

///////////////////////////////////////////////////////////////////////////////
// Memory image
///////////////////////////////////////////////////////////////////////////////

/// Builds a sparse memory image one value at a time.
///
/// Writes go to the kernel space unless another root was selected with
/// [`ImageBuilder::space`].
pub struct ImageBuilder {
    builder: SparseMemoryBuilder,
    root: Pa,
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self {
            builder: SparseMemory::builder(),
            root: KERNEL_ROOT,
        }
    }

    /// Selects the space subsequent writes go to, registering it.
    pub fn space(&mut self, root: Pa) -> &mut Self {
        self.builder = std::mem::take(&mut self.builder).root(root);
        self.root = root;
        self
    }

    /// Selects the kernel space for subsequent writes.
    pub fn kernel(&mut self) -> &mut Self {
        self.root = KERNEL_ROOT;
        self
    }

    pub fn bytes(&mut self, va: u64, data: &[u8]) -> &mut Self {
        self.builder = std::mem::take(&mut self.builder).write_in(self.root, va.into(), data);
        self
    }

    pub fn u8(&mut self, va: u64, value: u8) -> &mut Self {
        self.bytes(va, &[value])
    }

    pub fn u16(&mut self, va: u64, value: u16) -> &mut Self {
        self.bytes(va, &value.to_le_bytes())
    }

    pub fn u32(&mut self, va: u64, value: u32) -> &mut Self {
        self.bytes(va, &value.to_le_bytes())
    }

    pub fn u64(&mut self, va: u64, value: u64) -> &mut Self {
        self.bytes(va, &value.to_le_bytes())
    }

    /// Writes a `_UNICODE_STRING` at `va` whose characters live at
    /// `buffer`.
    pub fn unicode_string(&mut self, va: u64, buffer: u64, value: &str) -> &mut Self {
        let data = value
            .encode_utf16()
            .flat_map(u16::to_le_bytes)
            .collect::<Vec<_>>();

        self.u16(va, data.len() as u16)
            .u16(va + 2, data.len() as u16)
            .u64(va + 8, buffer)
            .bytes(buffer, &data)
    }

    /// Writes a `_LIST_ENTRY` at `va`.
    pub fn list_entry(&mut self, va: u64, flink: u64, blink: u64) -> &mut Self {
        self.u64(va, flink).u64(va + 8, blink)
    }

    pub fn build(&mut self) -> SparseMemory {
        std::mem::take(&mut self.builder).build()
    }
}

///////////////////////////////////////////////////////////////////////////////
// Profile
///////////////////////////////////////////////////////////////////////////////

fn native(native: NativeType) -> Type {
    Type::native(native)
}

fn uchar() -> Type {
    native(NativeType::UnsignedChar)
}

fn ushort() -> Type {
    native(NativeType::UnsignedShort)
}

fn ulong() -> Type {
    native(NativeType::UnsignedLong)
}

fn ulonglong() -> Type {
    native(NativeType::UnsignedLongLong)
}

fn void_ptr() -> Type {
    Type::pointer(Type::Void)
}

fn bits(start_bit: u32, end_bit: u32) -> Type {
    Type::BitField {
        start_bit,
        end_bit,
        native: NativeType::UnsignedLongLong,
    }
}

fn vad(size: u64) -> StructLayout {
    StructLayout::new(size)
        .field("StartingVpn", 0x00, ulonglong())
        .field("EndingVpn", 0x08, ulonglong())
        .field("Parent", 0x10, Type::pointer_to("_MMVAD"))
        .field("LeftChild", 0x18, Type::pointer_to("_MMVAD"))
        .field("RightChild", 0x20, Type::pointer_to("_MMVAD"))
        .field("u", 0x28, Type::structure("__unnamed_vad_u"))
}

/// Base layouts shaped like the 64-bit Windows 7 ones, reduced to the
/// members the tests touch.
pub fn types() -> Vec<(String, StructLayout)> {
    vec![
        (
            "_LIST_ENTRY".into(),
            StructLayout::new(0x10)
                .field("Flink", 0x00, Type::pointer_to("_LIST_ENTRY"))
                .field("Blink", 0x08, Type::pointer_to("_LIST_ENTRY")),
        ),
        (
            "_UNICODE_STRING".into(),
            StructLayout::new(0x10)
                .field("Length", 0x00, ushort())
                .field("MaximumLength", 0x02, ushort())
                .field("Buffer", 0x08, Type::pointer(ushort())),
        ),
        (
            "_LARGE_INTEGER".into(),
            StructLayout::new(0x08).field("QuadPart", 0x00, native(NativeType::LongLong)),
        ),
        (
            "_EX_FAST_REF".into(),
            StructLayout::new(0x08)
                .field("Object", 0x00, void_ptr())
                .field("RefCnt", 0x00, bits(0, 4)),
        ),
        (
            "_KPROCESS".into(),
            StructLayout::new(0x40).field(
                "DirectoryTableBase",
                0x28,
                Type::array(Length::Fixed(2), ulonglong()),
            ),
        ),
        (
            "_EPROCESS".into(),
            StructLayout::new(0x100)
                .field("Pcb", 0x00, Type::structure("_KPROCESS"))
                .field("CreateTime", 0x40, Type::structure("_LARGE_INTEGER"))
                .field("ExitTime", 0x48, Type::structure("_LARGE_INTEGER"))
                .field("UniqueProcessId", 0x50, void_ptr())
                .field("ActiveProcessLinks", 0x58, Type::structure("_LIST_ENTRY"))
                .field("InheritedFromUniqueProcessId", 0x68, void_ptr())
                .field("Token", 0x70, Type::structure("_EX_FAST_REF"))
                .field("ObjectTable", 0x78, Type::pointer_to("_HANDLE_TABLE"))
                .field("Session", 0x80, void_ptr())
                .field("Peb", 0x88, Type::pointer_to("_PEB"))
                .field("Wow64Process", 0x90, void_ptr())
                .field("ThreadListHead", 0x98, Type::structure("_LIST_ENTRY"))
                .field("ImageFileName", 0xa8, Type::array(Length::Fixed(15), uchar()))
                .field("VadRoot", 0xc0, Type::structure("_MM_AVL_TABLE")),
        ),
        (
            "_MMADDRESS_NODE".into(),
            StructLayout::new(0x28)
                .field("Parent", 0x10, Type::pointer_to("_MMADDRESS_NODE"))
                .field("LeftChild", 0x18, Type::pointer_to("_MMADDRESS_NODE"))
                .field("RightChild", 0x20, Type::pointer_to("_MMADDRESS_NODE")),
        ),
        (
            "_MM_AVL_TABLE".into(),
            StructLayout::new(0x40).field("BalancedRoot", 0x00, Type::structure("_MMADDRESS_NODE")),
        ),
        ("_MMVAD".into(), vad(0x40)),
        ("_MMVAD_SHORT".into(), vad(0x30)),
        (
            "_MMVAD_LONG".into(),
            vad(0x50).field("ControlArea", 0x40, void_ptr()),
        ),
        (
            "__unnamed_vad_u".into(),
            StructLayout::new(0x08).field("VadFlags", 0x00, Type::structure("_MMVAD_FLAGS")),
        ),
        (
            "_MMVAD_FLAGS".into(),
            StructLayout::new(0x08)
                .field("CommitCharge", 0x00, bits(0, 51))
                .field("NoChange", 0x00, bits(51, 52))
                .field("VadType", 0x00, bits(52, 55))
                .field("MemCommit", 0x00, bits(55, 56))
                .field("Protection", 0x00, bits(56, 61))
                .field("Spare", 0x00, bits(61, 63))
                .field("PrivateMemory", 0x00, bits(63, 64)),
        ),
        (
            "_HANDLE_TABLE".into(),
            StructLayout::new(0x68).field("TableCode", 0x00, ulonglong()),
        ),
        (
            "_HANDLE_TABLE_ENTRY".into(),
            StructLayout::new(0x10)
                .field("Object", 0x00, void_ptr())
                .field("GrantedAccess", 0x08, ulong()),
        ),
        (
            "_OBJECT_HEADER".into(),
            StructLayout::new(0x38)
                .field("PointerCount", 0x00, native(NativeType::LongLong))
                .field("HandleCount", 0x08, native(NativeType::LongLong))
                .field("TypeIndex", 0x18, uchar())
                .field("InfoMask", 0x1a, uchar())
                .field("Body", 0x30, Type::structure("_QUAD")),
        ),
        (
            "_QUAD".into(),
            StructLayout::new(0x08).field("UseThisFieldToCopy", 0x00, native(NativeType::LongLong)),
        ),
        ("_OBJECT_HEADER_CREATOR_INFO".into(), StructLayout::new(0x20)),
        (
            "_OBJECT_HEADER_NAME_INFO".into(),
            StructLayout::new(0x20)
                .field("Directory", 0x00, void_ptr())
                .field("Name", 0x08, Type::structure("_UNICODE_STRING")),
        ),
        ("_OBJECT_HEADER_HANDLE_INFO".into(), StructLayout::new(0x10)),
        ("_OBJECT_HEADER_QUOTA_INFO".into(), StructLayout::new(0x20)),
        (
            "_OBJECT_TYPE".into(),
            StructLayout::new(0x40)
                .field("TypeList", 0x00, Type::structure("_LIST_ENTRY"))
                .field("Name", 0x10, Type::structure("_UNICODE_STRING"))
                .field("Index", 0x28, uchar()),
        ),
        (
            "_TOKEN".into(),
            StructLayout::new(0xc8)
                .field("SessionId", 0x78, ulong())
                .field("UserAndGroupCount", 0x7c, ulong())
                .field("UserAndGroups", 0x90, Type::pointer_to("_SID_AND_ATTRIBUTES"))
                .field("TokenInUse", 0xc0, uchar()),
        ),
        (
            "_SID_AND_ATTRIBUTES".into(),
            StructLayout::new(0x10)
                .field("Sid", 0x00, void_ptr())
                .field("Attributes", 0x08, ulong()),
        ),
        (
            "_SID".into(),
            StructLayout::new(0x0c)
                .field("Revision", 0x00, uchar())
                .field("SubAuthorityCount", 0x01, uchar())
                .field("IdentifierAuthority", 0x02, Type::structure("_SID_IDENTIFIER_AUTHORITY"))
                .field("SubAuthority", 0x08, Type::array(Length::Fixed(1), ulong())),
        ),
        (
            "_SID_IDENTIFIER_AUTHORITY".into(),
            StructLayout::new(0x06).field("Value", 0x00, Type::array(Length::Fixed(6), uchar())),
        ),
        (
            "_PEB".into(),
            StructLayout::new(0x40)
                .field("ImageBaseAddress", 0x10, void_ptr())
                .field("Ldr", 0x18, Type::pointer_to("_PEB_LDR_DATA"))
                .field(
                    "ProcessParameters",
                    0x20,
                    Type::pointer_to("_RTL_USER_PROCESS_PARAMETERS"),
                ),
        ),
        (
            "_PEB_LDR_DATA".into(),
            StructLayout::new(0x58)
                .field("InLoadOrderModuleList", 0x10, Type::structure("_LIST_ENTRY"))
                .field("InMemoryOrderModuleList", 0x20, Type::structure("_LIST_ENTRY"))
                .field(
                    "InInitializationOrderModuleList",
                    0x30,
                    Type::structure("_LIST_ENTRY"),
                ),
        ),
        (
            "_LDR_DATA_TABLE_ENTRY".into(),
            StructLayout::new(0x68)
                .field("InLoadOrderLinks", 0x00, Type::structure("_LIST_ENTRY"))
                .field("InMemoryOrderLinks", 0x10, Type::structure("_LIST_ENTRY"))
                .field("InInitializationOrderLinks", 0x20, Type::structure("_LIST_ENTRY"))
                .field("DllBase", 0x30, void_ptr())
                .field("SizeOfImage", 0x40, ulong())
                .field("FullDllName", 0x48, Type::structure("_UNICODE_STRING"))
                .field("BaseDllName", 0x58, Type::structure("_UNICODE_STRING")),
        ),
        (
            "_RTL_USER_PROCESS_PARAMETERS".into(),
            StructLayout::new(0x80)
                .field("ImagePathName", 0x60, Type::structure("_UNICODE_STRING"))
                .field("CommandLine", 0x70, Type::structure("_UNICODE_STRING")),
        ),
        (
            "_MM_SESSION_SPACE".into(),
            StructLayout::new(0x10).field("SessionId", 0x08, ulong()),
        ),
        (
            "_KAPC_STATE".into(),
            StructLayout::new(0x30).field("Process", 0x20, Type::pointer_to("_KPROCESS")),
        ),
        (
            "_KTHREAD".into(),
            StructLayout::new(0x40).field("ApcState", 0x00, Type::structure("_KAPC_STATE")),
        ),
        (
            "_CLIENT_ID".into(),
            StructLayout::new(0x10)
                .field("UniqueProcess", 0x00, void_ptr())
                .field("UniqueThread", 0x08, void_ptr()),
        ),
        (
            "_ETHREAD".into(),
            StructLayout::new(0x80)
                .field("Tcb", 0x00, Type::structure("_KTHREAD"))
                .field("CreateTime", 0x40, Type::structure("_LARGE_INTEGER"))
                .field("ExitTime", 0x48, Type::structure("_LARGE_INTEGER"))
                .field("Cid", 0x50, Type::structure("_CLIENT_ID"))
                .field("ThreadsProcess", 0x60, Type::pointer_to("_EPROCESS"))
                .field("ThreadListEntry", 0x68, Type::structure("_LIST_ENTRY")),
        ),
        (
            "_FILE_OBJECT".into(),
            StructLayout::new(0x80)
                .field("DeviceObject", 0x08, void_ptr())
                .field("ReadAccess", 0x4a, uchar())
                .field("WriteAccess", 0x4b, uchar())
                .field("DeleteAccess", 0x4c, uchar())
                .field("SharedRead", 0x4d, uchar())
                .field("SharedWrite", 0x4e, uchar())
                .field("SharedDelete", 0x4f, uchar())
                .field("FileName", 0x58, Type::structure("_UNICODE_STRING")),
        ),
        (
            "_CM_KEY_BODY".into(),
            StructLayout::new(0x30)
                .field("Type", 0x00, ulong())
                .field("KeyControlBlock", 0x08, Type::pointer_to("_CM_KEY_CONTROL_BLOCK")),
        ),
        (
            "_CM_KEY_CONTROL_BLOCK".into(),
            StructLayout::new(0x40)
                .field("ParentKcb", 0x20, Type::pointer_to("_CM_KEY_CONTROL_BLOCK"))
                .field("NameBlock", 0x28, Type::pointer_to("_CM_NAME_CONTROL_BLOCK")),
        ),
        (
            "_CM_NAME_CONTROL_BLOCK".into(),
            StructLayout::new(0x18)
                .field("Compressed", 0x00, uchar())
                .field("NameLength", 0x10, ushort())
                .field("Name", 0x12, Type::array(Length::Fixed(1), ushort())),
        ),
    ]
}

/// A 64-bit Windows profile over [`types`].
pub fn profile() -> Result<WindowsProfile, KobjError> {
    let mut profile = Profile::new(ProfileMetadata::AMD64);
    profile.add_types(types());
    profile.add_constants([("ObTypeIndexTable", TYPE_INDEX_TABLE)]);

    WindowsProfile::from_profile(profile)
}
