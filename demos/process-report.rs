//! Builds a small synthetic 64-bit Windows memory image and prints a report
//! of the process found in it: identity, token, VADs and handles.

use std::rc::Rc;

use kobj::{
    Class as _, Length, NativeType, Profile, ProfileMetadata, SparseMemory, StructLayout, Type,
    Va,
    os::windows::{WindowsFileObject, WindowsProcess, WindowsProfile},
};

const EPROCESS: u64 = 0xfffffa80_00c0_e000;
const TOKEN: u64 = 0xfffff8a0_0010_0000;
const SID: u64 = 0xfffff8a0_0010_1000;
const HANDLE_TABLE: u64 = 0xfffff8a0_0020_0000;
const HANDLE_ENTRIES: u64 = 0xfffff8a0_0020_1000;
const FILE_HEADER: u64 = 0xfffffa80_00d0_0000;
const FILE_TYPE: u64 = 0xfffffa80_0000_1000;
const TYPE_INDEX_TABLE: u64 = 0xfffff800_0280_0000;
const VAD_ROOT: u64 = 0xfffffa80_00e0_0010;
const VAD_RIGHT: u64 = 0xfffffa80_00e0_0110;

fn pointer() -> Type {
    Type::pointer(Type::Void)
}

fn native(native: NativeType) -> Type {
    Type::native(native)
}

fn types() -> Vec<(String, StructLayout)> {
    let vad = |size| {
        StructLayout::new(size)
            .field("StartingVpn", 0x00, native(NativeType::UnsignedLongLong))
            .field("EndingVpn", 0x08, native(NativeType::UnsignedLongLong))
            .field("LeftChild", 0x18, Type::pointer_to("_MMVAD"))
            .field("RightChild", 0x20, Type::pointer_to("_MMVAD"))
    };

    vec![
        (
            "_UNICODE_STRING".into(),
            StructLayout::new(0x10)
                .field("Length", 0x00, native(NativeType::UnsignedShort))
                .field("Buffer", 0x08, Type::pointer(native(NativeType::UnsignedShort))),
        ),
        ("_EX_FAST_REF".into(), StructLayout::new(0x08).field("Object", 0x00, pointer())),
        (
            "_EPROCESS".into(),
            StructLayout::new(0x100)
                .field("CreateTime", 0x40, Type::structure("_LARGE_INTEGER"))
                .field("UniqueProcessId", 0x50, pointer())
                .field("InheritedFromUniqueProcessId", 0x68, pointer())
                .field("Token", 0x70, Type::structure("_EX_FAST_REF"))
                .field("ObjectTable", 0x78, Type::pointer_to("_HANDLE_TABLE"))
                .field(
                    "ImageFileName",
                    0xa8,
                    Type::array(Length::Fixed(15), native(NativeType::UnsignedChar)),
                )
                .field("VadRoot", 0xc0, pointer()),
        ),
        (
            "_LARGE_INTEGER".into(),
            StructLayout::new(0x08).field("QuadPart", 0x00, native(NativeType::LongLong)),
        ),
        (
            "_TOKEN".into(),
            StructLayout::new(0xc8)
                .field("SessionId", 0x78, native(NativeType::UnsignedLong))
                .field("UserAndGroupCount", 0x7c, native(NativeType::UnsignedLong))
                .field("UserAndGroups", 0x90, Type::pointer_to("_SID_AND_ATTRIBUTES"))
                .field("TokenInUse", 0xc0, native(NativeType::UnsignedChar)),
        ),
        (
            "_SID_AND_ATTRIBUTES".into(),
            StructLayout::new(0x10).field("Sid", 0x00, pointer()),
        ),
        (
            "_SID".into(),
            StructLayout::new(0x0c)
                .field("Revision", 0x00, native(NativeType::UnsignedChar))
                .field("SubAuthorityCount", 0x01, native(NativeType::UnsignedChar))
                .field(
                    "IdentifierAuthority",
                    0x02,
                    Type::array(Length::Fixed(6), native(NativeType::UnsignedChar)),
                )
                .field(
                    "SubAuthority",
                    0x08,
                    Type::array(Length::Fixed(1), native(NativeType::UnsignedLong)),
                ),
        ),
        ("_MMVAD".into(), vad(0x40)),
        ("_MMVAD_SHORT".into(), vad(0x30)),
        ("_MMVAD_LONG".into(), vad(0x50)),
        (
            "_HANDLE_TABLE".into(),
            StructLayout::new(0x68).field("TableCode", 0x00, native(NativeType::UnsignedLongLong)),
        ),
        (
            "_HANDLE_TABLE_ENTRY".into(),
            StructLayout::new(0x10)
                .field("Object", 0x00, pointer())
                .field("GrantedAccess", 0x08, native(NativeType::UnsignedLong)),
        ),
        (
            "_OBJECT_HEADER".into(),
            StructLayout::new(0x38)
                .field("TypeIndex", 0x18, native(NativeType::UnsignedChar))
                .field("InfoMask", 0x1a, native(NativeType::UnsignedChar))
                .field("Body", 0x30, native(NativeType::LongLong)),
        ),
        (
            "_OBJECT_TYPE".into(),
            StructLayout::new(0x40).field("Name", 0x10, Type::structure("_UNICODE_STRING")),
        ),
        (
            "_FILE_OBJECT".into(),
            StructLayout::new(0x80)
                .field("DeviceObject", 0x08, pointer())
                .field("ReadAccess", 0x4a, native(NativeType::UnsignedChar))
                .field("WriteAccess", 0x4b, native(NativeType::UnsignedChar))
                .field("DeleteAccess", 0x4c, native(NativeType::UnsignedChar))
                .field("SharedRead", 0x4d, native(NativeType::UnsignedChar))
                .field("SharedWrite", 0x4e, native(NativeType::UnsignedChar))
                .field("SharedDelete", 0x4f, native(NativeType::UnsignedChar))
                .field("FileName", 0x58, Type::structure("_UNICODE_STRING")),
        ),
    ]
}

fn utf16(value: &str) -> Vec<u8> {
    value.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

fn unicode_string(va: u64, buffer: u64, value: &str) -> [(u64, Vec<u8>); 3] {
    let data = utf16(value);
    [
        (va, (data.len() as u16).to_le_bytes().to_vec()),
        (va + 8, buffer.to_le_bytes().to_vec()),
        (buffer, data),
    ]
}

fn image() -> SparseMemory {
    let mut writes: Vec<(u64, Vec<u8>)> = vec![
        // _EPROCESS
        (EPROCESS + 0x40, 132_000_000_000_000_000u64.to_le_bytes().to_vec()),
        (EPROCESS + 0x50, 1234u64.to_le_bytes().to_vec()),
        (EPROCESS + 0x68, 4u64.to_le_bytes().to_vec()),
        (EPROCESS + 0x70, (TOKEN | 0x7).to_le_bytes().to_vec()),
        (EPROCESS + 0x78, HANDLE_TABLE.to_le_bytes().to_vec()),
        (EPROCESS + 0xa8, b"notepad.exe\0".to_vec()),
        (EPROCESS + 0xc0, VAD_ROOT.to_le_bytes().to_vec()),
        // _TOKEN with a single S-1-5-18 SID
        (TOKEN + 0x78, 1u32.to_le_bytes().to_vec()),
        (TOKEN + 0x7c, 1u32.to_le_bytes().to_vec()),
        (TOKEN + 0x90, (TOKEN + 0x200).to_le_bytes().to_vec()),
        (TOKEN + 0xc0, vec![1]),
        (TOKEN + 0x200, SID.to_le_bytes().to_vec()),
        (SID, vec![1, 1, 0, 0, 0, 0, 0, 5, 18, 0, 0, 0]),
        // VAD tree: a long root with a short right child
        (VAD_ROOT - 4, b"Vadl".to_vec()),
        (VAD_ROOT, 0x400u64.to_le_bytes().to_vec()),
        (VAD_ROOT + 0x08, 0x40fu64.to_le_bytes().to_vec()),
        (VAD_ROOT + 0x20, VAD_RIGHT.to_le_bytes().to_vec()),
        (VAD_RIGHT - 4, b"VadS".to_vec()),
        (VAD_RIGHT, 0x7ffe0u64.to_le_bytes().to_vec()),
        (VAD_RIGHT + 0x08, 0x7ffe0u64.to_le_bytes().to_vec()),
        // Single-level handle table with handle 4 referring to a file
        (HANDLE_TABLE, HANDLE_ENTRIES.to_le_bytes().to_vec()),
        (HANDLE_ENTRIES + 0x10, (FILE_HEADER | 0x3).to_le_bytes().to_vec()),
        (HANDLE_ENTRIES + 0x18, 0x0012_019fu32.to_le_bytes().to_vec()),
        (FILE_HEADER + 0x18, vec![0x1c]),
        (FILE_HEADER + 0x30 + 0x4a, vec![1, 0, 0, 1, 1, 0]),
        (TYPE_INDEX_TABLE + 0x1c * 8, FILE_TYPE.to_le_bytes().to_vec()),
    ];

    writes.extend(unicode_string(FILE_TYPE + 0x10, FILE_TYPE + 0x100, "File"));
    writes.extend(unicode_string(
        FILE_HEADER + 0x30 + 0x58,
        FILE_HEADER + 0x200,
        "\\Windows\\notepad.exe",
    ));

    writes
        .into_iter()
        .fold(SparseMemory::builder(), |builder, (va, data)| {
            builder.write(Va(va), &data)
        })
        .build()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .init();

    let mut profile = Profile::new(ProfileMetadata::AMD64);
    profile.add_types(types());
    profile.add_constants([("ObTypeIndexTable", TYPE_INDEX_TABLE)]);
    let profile = WindowsProfile::from_profile(profile)?;

    let process = profile
        .object(Rc::new(image()), Va(EPROCESS), "_EPROCESS")
        .cast_into::<WindowsProcess<_>>();

    println!("Process @ {}", process.object().offset());
    println!("  PID:      {}", process.pid()?);
    println!("  PPID:     {}", process.parent_pid()?);
    println!("  Name:     {}", process.image_file_name()?);
    println!("  Created:  {}", process.create_time()?);

    if let Some(token) = process.token()? {
        println!("  Session:  {}", token.session_id()?);
        for sid in token.sids()? {
            println!("  SID:      {sid}");
        }
    }

    println!("VADs:");
    for vad in process.vads()? {
        let vad = vad?;
        println!(
            "  {:#014x}-{:#014x} {:?}",
            vad.start()?,
            vad.end()?,
            vad.kind()
        );
    }

    println!("Handles:");
    for header in process.handles()? {
        let header = header?;
        let type_name = header.object_type_name()?.unwrap_or_default();

        print!(
            "  {:#06x} {:#010x} {:<8}",
            header.handle_value().unwrap_or_default(),
            header.granted_access()?.unwrap_or_default(),
            type_name
        );

        if type_name == "File" {
            let file = header
                .body_as("_FILE_OBJECT")?
                .cast_into::<WindowsFileObject<_>>();

            print!(" {} {}", file.access_string()?, file.file_name_with_device()?);
        }

        println!();
    }

    Ok(())
}
