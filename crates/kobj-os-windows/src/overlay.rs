//! Corrections to the layouts generated from Windows debugging symbols.
//!
//! The symbols describe many fields by their storage type only: timestamps
//! are `_LARGE_INTEGER`s, names are single-element character arrays and
//! counted arrays have a length of one. The overlays below give them their
//! real meaning.

use std::collections::BTreeMap;

use kobj_core::{Length, NativeType, Overlay, Type};

fn uint() -> Type {
    Type::native(NativeType::UnsignedInt)
}

fn string(length: u64) -> Type {
    Type::string(Length::Fixed(length))
}

fn named_string() -> Type {
    Type::string(Length::member("NameLength"))
}

/// Returns the overlays for the Windows kernel structures.
pub fn windows_overlays() -> Vec<(&'static str, Overlay)> {
    vec![
        (
            "_EPROCESS",
            Overlay::new()
                .ty("CreateTime", Type::timestamp())
                .ty("ExitTime", Type::timestamp())
                .ty("InheritedFromUniqueProcessId", uint())
                .ty("ImageFileName", string(16))
                .ty("UniqueProcessId", uint()),
        ),
        (
            "_ETHREAD",
            Overlay::new()
                .ty("CreateTime", Type::ThreadCreateTimeStamp)
                .ty("ExitTime", Type::timestamp()),
        ),
        (
            "_OBJECT_SYMBOLIC_LINK",
            Overlay::new().ty("CreationTime", Type::timestamp()),
        ),
        (
            "_KUSER_SHARED_DATA",
            Overlay::new()
                .ty("SystemTime", Type::WinTimeStamp { is_utc: true })
                .ty("TimeZoneBias", Type::timestamp()),
        ),
        // Only the first entry of the DirectoryTableBase array is loaded
        // into CR3.
        (
            "_KPROCESS",
            Overlay::new().ty("DirectoryTableBase", Type::native(NativeType::Address)),
        ),
        (
            "_HANDLE_TABLE_ENTRY",
            Overlay::new().ty("Object", Type::structure("_EX_FAST_REF")),
        ),
        (
            "_IMAGE_SECTION_HEADER",
            Overlay::new().field("Name", 0, string(8)),
        ),
        (
            "PO_MEMORY_IMAGE",
            Overlay::new()
                .ty("Signature", string(4))
                .ty("SystemTime", Type::timestamp()),
        ),
        (
            "_DBGKD_GET_VERSION64",
            Overlay::new().ty(
                "DebuggerDataList",
                Type::pointer(Type::native(NativeType::UnsignedLong)),
            ),
        ),
        (
            "_CM_KEY_NODE",
            Overlay::new()
                .ty("Signature", string(2))
                .ty("LastWriteTime", Type::timestamp())
                .ty("Name", named_string()),
        ),
        (
            "_CM_NAME_CONTROL_BLOCK",
            Overlay::new().ty("Name", named_string()),
        ),
        (
            "_CHILD_LIST",
            Overlay::new().ty(
                "List",
                Type::pointer(Type::array(
                    Length::member("Count"),
                    Type::pointer_to("_CM_KEY_VALUE"),
                )),
            ),
        ),
        (
            "_CM_KEY_VALUE",
            Overlay::new()
                .ty("Signature", string(2))
                .ty("Name", named_string()),
        ),
        (
            "_CM_KEY_INDEX",
            Overlay::new().ty("Signature", string(2)).ty(
                "List",
                Type::array(Length::scaled("Count", 2), Type::pointer_to("_CM_KEY_NODE")),
            ),
        ),
        (
            "_PHYSICAL_MEMORY_DESCRIPTOR",
            Overlay::new().ty(
                "Run",
                Type::array(
                    Length::member("NumberOfRuns"),
                    Type::structure("_PHYSICAL_MEMORY_RUN"),
                ),
            ),
        ),
        (
            "_TOKEN",
            Overlay::new().ty(
                "UserAndGroups",
                Type::pointer(Type::array(
                    Length::member("UserAndGroupCount"),
                    Type::structure("_SID_AND_ATTRIBUTES"),
                )),
            ),
        ),
        (
            "_SID",
            Overlay::new().ty(
                "SubAuthority",
                Type::array(
                    Length::member("SubAuthorityCount"),
                    Type::native(NativeType::UnsignedLong),
                ),
            ),
        ),
        (
            "_CLIENT_ID",
            Overlay::new()
                .ty("UniqueProcess", uint())
                .ty("UniqueThread", uint()),
        ),
        // The tag selecting the concrete VAD type is the pool tag, stored
        // right before the structure.
        ("_MMVAD", Overlay::new().field("Tag", -4, string(4))),
        ("_MMVAD_SHORT", Overlay::new().field("Tag", -4, string(4))),
        ("_MMVAD_LONG", Overlay::new().field("Tag", -4, string(4))),
    ]
}

/// Returns the overlays for the crash dump headers.
pub fn crash_overlays() -> Vec<(&'static str, Overlay)> {
    let header = || {
        Overlay::new()
            .ty("Signature", string(4))
            .ty("ValidDump", string(4))
            .ty("SystemTime", Type::timestamp())
            .ty(
                "DumpType",
                Type::Enumeration {
                    target: NativeType::UnsignedInt,
                    choices: BTreeMap::from([
                        (1, String::from("Full Dump")),
                        (2, String::from("Kernel Dump")),
                    ]),
                },
            )
    };

    vec![("_DMP_HEADER", header()), ("_DMP_HEADER64", header())]
}
