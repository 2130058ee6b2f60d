mod common;

use std::rc::Rc;

use kobj_core::{Class as _, KobjError, Profile, ProfileMetadata, Va};
use kobj_os_windows::{WindowsHandleTable, WindowsObjectHeaderInfo, WindowsProcess};

use self::common::{EPROCESS, ImageBuilder, TYPE_INDEX_TABLE};

const HANDLE_TABLE: u64 = 0x30_0000;
const HEADERS: u64 = 0x40_0000;
const FILE_TYPE: u64 = 0x81_0000;

/// Index of the `File` type in `ObTypeIndexTable`.
const FILE_TYPE_INDEX: u8 = 7;

/// Writes an object header with the given type index and info mask.
fn header(image: &mut ImageBuilder, va: u64, type_index: u8, info_mask: u8) {
    image.u8(va + 0x18, type_index).u8(va + 0x1a, info_mask);
}

/// Writes a handle table entry referring to `header`, with reference count
/// bits set.
fn entry(image: &mut ImageBuilder, va: u64, header: u64, granted_access: u32) {
    let object = match header {
        0 => 0,
        header => header | 0b101,
    };

    image.u64(va, object).u32(va + 0x08, granted_access);
}

fn object_types(image: &mut ImageBuilder) {
    image
        .u64(TYPE_INDEX_TABLE + u64::from(FILE_TYPE_INDEX) * 8, FILE_TYPE)
        .unicode_string(FILE_TYPE + 0x10, FILE_TYPE + 0x100, "File");
}

/// A single level table: entry 0 is free, entry 4 refers to an untyped
/// header.
fn single_level(image: &mut ImageBuilder) {
    let table = 0x31_0000;
    image.u64(HANDLE_TABLE, table);

    for index in [1, 2, 3, 4, 5] {
        let va = HEADERS + index * 0x100;
        let type_index = if index == 4 { 0 } else { FILE_TYPE_INDEX };

        header(image, va, type_index, 0);
        entry(image, table + index * 0x10, va, 0x100 + index as u32);
    }

    object_types(image);
}

#[test]
fn single_level_handles() -> Result<(), KobjError> {
    let mut image = ImageBuilder::new();
    single_level(&mut image);

    let profile = common::profile()?;
    let handle_table = profile
        .object(Rc::new(image.build()), Va(HANDLE_TABLE), "_HANDLE_TABLE")
        .cast_into::<WindowsHandleTable<_>>();

    assert_eq!(handle_table.levels()?, 0);

    let handles = handle_table
        .handles()?
        .map(|header| {
            let header = header?;
            Ok((header.handle_value(), header.object().offset().0))
        })
        .collect::<Result<Vec<_>, KobjError>>()?;

    assert_eq!(
        handles,
        [
            (Some(4), HEADERS + 0x100),
            (Some(8), HEADERS + 0x200),
            (Some(12), HEADERS + 0x300),
            (Some(20), HEADERS + 0x500),
        ]
    );
    Ok(())
}

#[test]
fn lookup_returns_the_entry_of_the_handle() -> Result<(), KobjError> {
    let mut image = ImageBuilder::new();
    single_level(&mut image);

    let profile = common::profile()?;
    let handle_table = profile
        .object(Rc::new(image.build()), Va(HANDLE_TABLE), "_HANDLE_TABLE")
        .cast_into::<WindowsHandleTable<_>>();

    let header = handle_table.lookup(8)?.expect("handle 8");
    assert_eq!(header.object().offset(), Va(HEADERS + 0x200));
    assert_eq!(header.granted_access()?, Some(0x102));
    assert_eq!(header.object_type_name()?.as_deref(), Some("File"));

    // Free and untyped entries cannot be looked up.
    assert!(handle_table.lookup(0)?.is_none());
    assert!(handle_table.lookup(16)?.is_none());
    Ok(())
}

#[test]
fn multi_level_handles_are_increasing() -> Result<(), KobjError> {
    let top = 0x32_0000;
    let first = 0x33_0000;
    let second = 0x34_0000;

    let mut image = ImageBuilder::new();
    image
        .u64(HANDLE_TABLE, top | 1)
        .u64(top, first)
        .u64(top + 8, second);

    let entries = [(first, 1), (second, 0), (second, 3)];
    for (number, (table, index)) in entries.into_iter().enumerate() {
        let va = HEADERS + (number as u64 + 1) * 0x100;
        header(&mut image, va, FILE_TYPE_INDEX, 0);
        entry(&mut image, table + index * 0x10, va, 0);
    }

    let profile = common::profile()?;
    let handle_table = profile
        .object(Rc::new(image.build()), Va(HANDLE_TABLE), "_HANDLE_TABLE")
        .cast_into::<WindowsHandleTable<_>>();

    assert_eq!(handle_table.levels()?, 1);
    assert_eq!(handle_table.base()?, Va(top));

    let handles = handle_table
        .handles()?
        .map(|header| Ok(header?.handle_value().unwrap_or_default()))
        .collect::<Result<Vec<_>, KobjError>>()?;

    // The second table starts after the 256 entries of the first one.
    assert_eq!(handles, [4, 1024, 1036]);
    assert!(handles.windows(2).all(|pair| pair[0] < pair[1]));
    assert!(handles.iter().all(|handle| handle % 4 == 0));
    Ok(())
}

#[test]
fn unreadable_table_ends_after_its_first_entry() -> Result<(), KobjError> {
    let top = 0x32_0000;
    let first = 0x33_0000;

    let mut image = ImageBuilder::new();
    image
        .u64(HANDLE_TABLE, top | 1)
        .u64(top, first)
        .u64(top + 8, 0x7777_0000);

    header(&mut image, HEADERS + 0x100, FILE_TYPE_INDEX, 0);
    entry(&mut image, first + 0x10, HEADERS + 0x100, 0);

    let profile = common::profile()?;
    let handle_table = profile
        .object(Rc::new(image.build()), Va(HANDLE_TABLE), "_HANDLE_TABLE")
        .cast_into::<WindowsHandleTable<_>>();

    assert_eq!(handle_table.handles()?.count(), 1);
    Ok(())
}

#[test]
fn null_slot_is_an_empty_subtree() -> Result<(), KobjError> {
    let top = 0x32_0000;
    let first = 0x33_0000;
    let third = 0x35_0000;

    let mut image = ImageBuilder::new();
    image
        .u64(HANDLE_TABLE, top | 1)
        .u64(top, first)
        .u64(top + 8, 0)
        .u64(top + 16, third);

    for (number, table) in [first, third].into_iter().enumerate() {
        let va = HEADERS + (number as u64 + 1) * 0x100;
        header(&mut image, va, FILE_TYPE_INDEX, 0);
        entry(&mut image, table + 0x10, va, 0);
    }

    let profile = common::profile()?;
    let handle_table = profile
        .object(Rc::new(image.build()), Va(HANDLE_TABLE), "_HANDLE_TABLE")
        .cast_into::<WindowsHandleTable<_>>();

    let handles = handle_table
        .handles()?
        .map(|header| Ok(header?.handle_value().unwrap_or_default()))
        .collect::<Result<Vec<_>, KobjError>>()?;

    // The third table keeps its position: two tables of 256 entries precede it.
    assert_eq!(handles, [4, 2052]);
    Ok(())
}

#[test]
fn zero_pointer_width_is_implausible() -> Result<(), KobjError> {
    let mut image = ImageBuilder::new();
    single_level(&mut image);

    let mut profile = Profile::new(ProfileMetadata {
        pointer_width: 0,
        page_size: 0x1000,
    });
    profile.add_types(common::types());

    let handle_table = profile
        .object(Rc::new(image.build()), Va(HANDLE_TABLE), "_HANDLE_TABLE")
        .cast_into::<WindowsHandleTable<_>>();

    assert!(matches!(
        handle_table.handles(),
        Err(KobjError::Implausible("pointer width"))
    ));
    Ok(())
}

#[test]
fn optional_headers_follow_the_info_mask() -> Result<(), KobjError> {
    let mut image = ImageBuilder::new();
    single_level(&mut image);

    // Entry 3: a named object with creator information.
    let va = HEADERS + 0x300;
    let info = WindowsObjectHeaderInfo::CREATOR_INFO | WindowsObjectHeaderInfo::NAME_INFO;
    header(&mut image, va, FILE_TYPE_INDEX, info.bits());

    // The name information sits below the creator information.
    let name_info = va - 0x20 - 0x20;
    image.unicode_string(name_info + 0x08, HEADERS + 0x8000, "notepad.exe");

    let profile = common::profile()?;
    let handle_table = profile
        .object(Rc::new(image.build()), Va(HANDLE_TABLE), "_HANDLE_TABLE")
        .cast_into::<WindowsHandleTable<_>>();

    let header = handle_table.lookup(12)?.expect("handle 12");
    assert_eq!(header.name()?.as_deref(), Some("notepad.exe"));
    assert_eq!(
        header.name_info()?.expect("name info").object().offset(),
        Va(name_info)
    );
    assert_eq!(header.preamble_size()?, 0x40);
    assert!(header.quota_info()?.is_none());
    assert!(header.handle_info()?.is_none());

    assert_eq!(header.size()?, 0x30);
    let body = header.body_as("_FILE_OBJECT")?;
    assert_eq!(body.offset(), Va(va + 0x30));
    assert_eq!(
        body.parent().map(|parent| parent.offset()),
        Some(Va(va))
    );
    Ok(())
}

#[test]
fn process_handles() -> Result<(), KobjError> {
    let mut image = ImageBuilder::new();
    single_level(&mut image);
    image.u64(EPROCESS + 0x78, HANDLE_TABLE);

    let profile = common::profile()?;
    let process = profile
        .object(Rc::new(image.build()), Va(EPROCESS), "_EPROCESS")
        .cast_into::<WindowsProcess<_>>();

    assert_eq!(process.handles()?.count(), 4);

    let file = process.lookup_handle_as(20, "_FILE_OBJECT")?.expect("handle 20");
    assert_eq!(file.offset(), Va(HEADERS + 0x500 + 0x30));
    assert_eq!(file.type_name(), "_FILE_OBJECT");

    assert!(process.lookup_handle(0x400)?.is_none());
    Ok(())
}
