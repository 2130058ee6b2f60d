use std::rc::Rc;

use super::*;
use crate::{Length, NativeType, Overlay, ProfileMetadata, SparseMemory};

fn profile() -> Profile {
    let mut profile = Profile::new(ProfileMetadata::AMD64);

    profile.add_types([
        (
            "_KEY".into(),
            StructLayout::new(0x30)
                .field("NameLength", 0x00, Type::native(NativeType::UnsignedShort))
                .field(
                    "Flags",
                    0x02,
                    Type::BitField {
                        start_bit: 4,
                        end_bit: 8,
                        native: NativeType::UnsignedShort,
                    },
                )
                .field("Delta", 0x04, Type::native(NativeType::Short))
                .field("LastWriteTime", 0x08, Type::timestamp())
                .field("Link", 0x10, Type::pointer_to("_KEY"))
                .field("Count", 0x18, Type::native(NativeType::UnsignedLong))
                .field("Values", 0x20, Type::native(NativeType::Address))
                .field("Name", 0x28, Type::array(Length::Fixed(1), Type::native(NativeType::Char))),
        ),
        (
            "_WIDE".into(),
            StructLayout::new(0x10).field(
                "Buffer",
                0x00,
                Type::UnicodeString {
                    length: Length::Fixed(0x10),
                },
            ),
        ),
    ]);

    profile.register_overlay(
        "_KEY",
        Overlay::new()
            .ty("Name", Type::string(Length::member("NameLength")))
            .ty(
                "Values",
                Type::pointer(Type::array(
                    Length::member("Count"),
                    Type::native(NativeType::UnsignedLong),
                )),
            ),
    );

    profile
}

fn key(name: &[u8], link: u64) -> Vec<u8> {
    let mut data = vec![0u8; 0x30];
    data[0x00..0x02].copy_from_slice(&(name.len() as u16).to_le_bytes());
    data[0x02..0x04].copy_from_slice(&0x00a0u16.to_le_bytes());
    data[0x04..0x06].copy_from_slice(&(-2i16).to_le_bytes());
    data[0x08..0x10].copy_from_slice(&129_743_837_420_000_000u64.to_le_bytes());
    data[0x10..0x18].copy_from_slice(&link.to_le_bytes());
    data[0x28..0x28 + name.len()].copy_from_slice(name);
    data
}

#[test]
fn string_length_comes_from_sibling_member() -> Result<(), KobjError> {
    let profile = profile();
    let memory = Rc::new(
        SparseMemory::builder()
            .write(Va(0x1000), &key(b"SOFTWARE", 0))
            .build(),
    );

    let key = profile.object(memory, Va(0x1000), "_KEY");
    assert_eq!(key.member_u64("NameLength")?, 8);
    assert_eq!(key.member_string("Name")?, "SOFTWARE");
    assert_eq!(key.field_offset_and_size("Name")?, (0x28, 8));
    Ok(())
}

#[test]
fn scalars_are_decoded() -> Result<(), KobjError> {
    let profile = profile();
    let memory = Rc::new(SparseMemory::builder().write(Va(0x1000), &key(b"A", 0)).build());

    let key = profile.object(memory, Va(0x1000), "_KEY");
    assert_eq!(key.member_u64("Flags")?, 0xa);
    assert_eq!(key.member_i64("Delta")?, -2);

    match key.member("LastWriteTime")? {
        Value::Timestamp(timestamp) => {
            assert_eq!(timestamp.to_string(), "2012-02-22 11:29:02");
        }
        value => panic!("unexpected {value:?}"),
    }
    Ok(())
}

#[test]
fn self_referencing_length_is_cyclic() {
    let mut profile = profile();
    profile.register_overlay(
        "_KEY",
        Overlay::new().ty("NameLength", Type::string(Length::member("NameLength"))),
    );

    let memory = Rc::new(SparseMemory::builder().write(Va(0x1000), &key(b"A", 0)).build());
    let key = profile.object(memory, Va(0x1000), "_KEY");

    assert!(matches!(
        key.member("NameLength"),
        Err(KobjError::CyclicField { .. })
    ));
    assert!(matches!(
        profile.check_acyclic("_KEY"),
        Err(KobjError::CyclicField { .. })
    ));
}

#[test]
fn pointer_dereference() -> Result<(), KobjError> {
    let profile = profile();
    let memory = Rc::new(
        SparseMemory::builder()
            .write(Va(0x1000), &key(b"Outer", 0x2000))
            .write(Va(0x2000), &key(b"Inner", 0x9000))
            .build(),
    );

    let outer = profile.object(memory, Va(0x1000), "_KEY");

    let inner = outer
        .dereference_member("Link")?
        .ok_or(KobjError::Other("inner"))?;
    assert_eq!(inner.offset(), Va(0x2000));
    assert_eq!(inner.member_string("Name")?, "Inner");
    assert_eq!(inner.parent().map(|parent| parent.offset()), Some(Va(0x1000)));

    // Unmapped target.
    assert!(inner.dereference_member("Link")?.is_none());

    match outer.member_path("Link.Name")? {
        Value::String(name) => assert_eq!(name, "Inner"),
        value => panic!("unexpected {value:?}"),
    }
    Ok(())
}

#[test]
fn null_pointer_is_absent() -> Result<(), KobjError> {
    let profile = profile();
    let memory = Rc::new(SparseMemory::builder().write(Va(0x1000), &key(b"A", 0)).build());

    let key = profile.object(memory, Va(0x1000), "_KEY");
    let link = key.member_pointer("Link")?;
    assert!(link.is_null());
    assert!(link.dereference()?.is_none());
    Ok(())
}

#[test]
fn pointer_to_array_is_sized_by_owner() -> Result<(), KobjError> {
    let profile = profile();

    let mut data = key(b"A", 0);
    data[0x18..0x1c].copy_from_slice(&3u32.to_le_bytes());
    data[0x20..0x28].copy_from_slice(&0x3000u64.to_le_bytes());

    let values = [7u32, 8, 9, 10]
        .iter()
        .flat_map(|value| value.to_le_bytes())
        .collect::<Vec<_>>();

    let memory = Rc::new(
        SparseMemory::builder()
            .write(Va(0x1000), &data)
            .write(Va(0x3000), &values)
            .build(),
    );

    let key = profile.object(memory, Va(0x1000), "_KEY");
    let array = match key.member_pointer("Values")?.dereference()? {
        Some(Value::Array(array)) => array,
        value => panic!("unexpected {value:?}"),
    };

    assert_eq!(array.len(), 3);
    assert!(array.is_valid());

    let values = array
        .iter()
        .map(|value| value.map(|value| value.as_u64()))
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(values, [Some(7), Some(8), Some(9)]);
    assert!(matches!(array.get(3), Err(KobjError::OutOfBounds)));
    Ok(())
}

#[test]
fn unicode_string_stops_at_nul() -> Result<(), KobjError> {
    let profile = profile();

    let bytes = "lsass"
        .encode_utf16()
        .flat_map(|unit| unit.to_le_bytes())
        .collect::<Vec<_>>();

    let memory = Rc::new(SparseMemory::builder().write(Va(0x1000), &bytes).build());
    let wide = profile.object(memory, Va(0x1000), "_WIDE");
    assert_eq!(wide.member_string("Buffer")?, "lsass");
    Ok(())
}

#[test]
fn validity_requires_readable_range() -> Result<(), KobjError> {
    let profile = profile();
    let memory = Rc::new(SparseMemory::builder().write(Va(0x1ff0), &[0u8; 0x10]).build());

    let key = profile.object(Rc::clone(&memory), Va(0x1ff0), "_KEY");
    assert!(!key.is_valid());

    let unknown = profile.object(memory, Va(0x1ff0), "_UNKNOWN");
    assert!(!unknown.is_valid());
    assert!(matches!(
        unknown.check_valid(),
        Err(KobjError::NoSuchType(_))
    ));
    Ok(())
}

#[test]
fn unknown_member() {
    let profile = profile();
    let memory = Rc::new(SparseMemory::builder().build());
    let key = profile.object(memory, Va(0x1000), "_KEY");

    assert!(!key.has_member("Missing"));
    assert!(matches!(
        key.member("Missing"),
        Err(KobjError::NoSuchMember { .. })
    ));
}

#[test]
fn unmapped_member_is_recoverable() -> Result<(), KobjError> {
    let profile = profile();
    let memory = Rc::new(SparseMemory::builder().build());
    let key = profile.object(memory, Va(0x1000), "_KEY");

    assert_eq!(key.member_u64("Count").recover()?, None);
    Ok(())
}

#[test]
fn cast_keeps_offset_and_parent() {
    let profile = profile();
    let memory = Rc::new(SparseMemory::builder().build());

    let parent = profile.object(Rc::clone(&memory), Va(0x1000), "_KEY");
    let child = parent.child(Va(0x2000), "_KEY").with_name("Link");
    let cast = child.cast("_WIDE");

    assert_eq!(cast.offset(), Va(0x2000));
    assert_eq!(cast.type_name(), "_WIDE");
    assert_eq!(cast.name(), Some("Link"));
    assert_eq!(cast.parent().map(|parent| parent.offset()), Some(Va(0x1000)));
}
