use std::rc::Rc;

use super::*;
use crate::{Behavior, KobjError, SparseMemory, Va};

fn base() -> Profile {
    let mut profile = Profile::new(ProfileMetadata::X86);

    profile.add_types([(
        "_CM_KEY_VALUE".into(),
        StructLayout::new(0x18)
            .field("Signature", 0x00, Type::native(NativeType::UnsignedShort))
            .field("NameLength", 0x02, Type::native(NativeType::UnsignedShort))
            .field("DataLength", 0x04, Type::native(NativeType::UnsignedLong))
            .field("Data", 0x08, Type::native(NativeType::UnsignedLong))
            .field("Type", 0x0c, Type::native(NativeType::UnsignedLong))
            .field(
                "Name",
                0x14,
                Type::array(Length::Fixed(1), Type::native(NativeType::UnsignedShort)),
            ),
    )]);

    profile
}

#[test]
fn overlay_replaces_type_and_keeps_offset() -> Result<(), KobjError> {
    let mut profile = base();
    profile.register_overlay(
        "_CM_KEY_VALUE",
        Overlay::new().ty("Name", Type::string(Length::member("NameLength"))),
    );

    let layout = profile.resolve("_CM_KEY_VALUE")?;
    let name = &layout.fields["Name"];
    assert_eq!(name.offset.fixed(), Some(0x14));
    assert!(matches!(name.ty, Type::String { .. }));

    // Untouched fields keep their base definition and order.
    assert_eq!(
        layout.fields.keys().collect::<Vec<_>>(),
        ["Signature", "NameLength", "DataLength", "Data", "Type", "Name"]
    );
    assert_eq!(profile.field_offset("_CM_KEY_VALUE", "Type")?, 0x0c);
    Ok(())
}

#[test]
fn overlay_adds_fields_before_structure() -> Result<(), KobjError> {
    let mut profile = base();
    profile.register_overlay(
        "_CM_KEY_VALUE",
        Overlay::new()
            .field("Tag", -4, Type::string(Length::Fixed(4)))
            .ty("NotInBase", Type::native(NativeType::Char)),
    );

    assert_eq!(profile.field_offset("_CM_KEY_VALUE", "Tag")?, -4);
    assert!(!profile.has_field("_CM_KEY_VALUE", "NotInBase"));
    Ok(())
}

#[test]
fn resolution_is_idempotent() -> Result<(), KobjError> {
    let mut profile = base();
    profile.register_overlay(
        "_CM_KEY_VALUE",
        Overlay::new().ty("Name", Type::string(Length::member("NameLength"))),
    );

    let first = profile.resolve("_CM_KEY_VALUE")?;
    let second = profile.resolve("_CM_KEY_VALUE")?;
    assert!(Rc::ptr_eq(&first, &second));

    // Re-registering the same overlay yields the same merged layout.
    profile.register_overlay(
        "_CM_KEY_VALUE",
        Overlay::new().ty("Name", Type::string(Length::member("NameLength"))),
    );
    let third = profile.resolve("_CM_KEY_VALUE")?;
    assert_eq!(format!("{:?}", third.fields), format!("{:?}", first.fields));
    Ok(())
}

#[test]
fn later_overlay_wins() -> Result<(), KobjError> {
    let mut profile = base();
    profile.add_overlays([
        ("_CM_KEY_VALUE", Overlay::new().ty("Type", Type::native(NativeType::Long))),
        ("_CM_KEY_VALUE", Overlay::new().ty("Type", Type::native(NativeType::Short)).size(0x20)),
    ]);

    let layout = profile.resolve("_CM_KEY_VALUE")?;
    assert!(matches!(
        layout.fields["Type"].ty,
        Type::Native {
            native: NativeType::Short
        }
    ));
    assert_eq!(layout.size, 0x20);
    Ok(())
}

#[test]
fn unknown_type() {
    let profile = base();
    assert!(matches!(
        profile.resolve("_EPROCESS"),
        Err(KobjError::NoSuchType(_))
    ));
    assert!(matches!(
        profile.field_offset("_CM_KEY_VALUE", "Missing"),
        Err(KobjError::NoSuchMember { .. })
    ));
}

#[test]
fn dynamic_size_follows_instance() -> Result<(), KobjError> {
    let mut profile = base();
    profile.register_overlay(
        "_CM_KEY_VALUE",
        Overlay::new().ty("Name", Type::string(Length::member("NameLength"))),
    );

    let memory = Rc::new(
        SparseMemory::builder()
            .write(Va(0x1000), &[0x6b, 0x76, 0x03, 0x00])
            .write(Va(0x1014), b"Run")
            .write(Va(0x2000), &[0x6b, 0x76, 0x07, 0x00])
            .write(Va(0x2014), b"Startup")
            .build(),
    );

    let short = profile.object(Rc::clone(&memory), Va(0x1000), "_CM_KEY_VALUE");
    let long = profile.object(memory, Va(0x2000), "_CM_KEY_VALUE");

    assert_eq!(profile.field_offset_and_size(&short, "Name")?, (0x14, 3));
    assert_eq!(profile.field_offset_and_size(&long, "Name")?, (0x14, 7));
    assert_eq!(long.member_string("Name")?, "Startup");
    Ok(())
}

#[test]
fn computed_length() -> Result<(), KobjError> {
    let mut profile = base();
    profile.register_overlay(
        "_CM_KEY_VALUE",
        Overlay::new().ty(
            "Name",
            Type::string(Length::Computed(Expr::new(|view| {
                Ok(view.member_u64("NameLength")? / 2)
            }))),
        ),
    );

    let memory = Rc::new(
        SparseMemory::builder()
            .write(Va(0x1000), &[0x6b, 0x76, 0x08, 0x00])
            .write(Va(0x1014), b"Software")
            .build(),
    );

    let value = profile.object(memory, Va(0x1000), "_CM_KEY_VALUE");
    assert_eq!(value.member_string("Name")?, "Soft");
    assert!(profile.check_acyclic("_CM_KEY_VALUE").is_ok());
    Ok(())
}

#[test]
fn behaviors_override_size_and_validity() -> Result<(), KobjError> {
    struct Signed;

    impl Behavior for Signed {
        fn size(&self, profile: &Profile, _type_name: &str) -> Result<Option<u64>, KobjError> {
            Ok(Some(profile.pointer_width() * 2))
        }

        fn is_valid(&self, view: &dyn MemberValues) -> Result<bool, KobjError> {
            Ok(view.member_u64("Signature")? == 0x766b)
        }
    }

    let mut profile = base();
    profile.register_behavior("_CM_KEY_VALUE", Rc::new(Signed));

    let memory = Rc::new(
        SparseMemory::builder()
            .write(Va(0x1000), &[0x6b, 0x76])
            .write(Va(0x2000), &[0x00, 0x00])
            .build(),
    );

    let good = profile.object(Rc::clone(&memory), Va(0x1000), "_CM_KEY_VALUE");
    let bad = profile.object(memory, Va(0x2000), "_CM_KEY_VALUE");

    assert_eq!(good.size()?, 8);
    assert!(good.is_valid());
    assert!(!bad.is_valid());
    Ok(())
}

#[test]
fn layouts_load_from_json() -> Result<(), Box<dyn std::error::Error>> {
    let json = r#"{
        "_LIST_ENTRY": {
            "size": 16,
            "fields": {
                "Flink": { "offset": 0, "type": { "kind": "pointer", "target": { "kind": "struct", "name": "_LIST_ENTRY" } } },
                "Blink": { "offset": 8, "type": { "kind": "pointer", "target": { "kind": "struct", "name": "_LIST_ENTRY" } } }
            }
        },
        "_SID": {
            "size": 12,
            "fields": {
                "Revision": { "offset": 0, "type": { "kind": "native", "native": "unsigned char" } },
                "SubAuthorityCount": { "offset": 1, "type": { "kind": "native", "native": "unsigned char" } },
                "SubAuthority": {
                    "offset": 8,
                    "type": {
                        "kind": "array",
                        "count": { "member": { "name": "SubAuthorityCount" } },
                        "target": { "kind": "native", "native": "unsigned long" }
                    }
                }
            }
        }
    }"#;

    let types: indexmap::IndexMap<String, StructLayout> = serde_json::from_str(json)?;

    let mut profile = Profile::new(ProfileMetadata::AMD64);
    profile.add_types(types);

    assert_eq!(profile.type_size("_LIST_ENTRY")?, 16);
    assert_eq!(profile.field_offset("_LIST_ENTRY", "Blink")?, 8);

    let layout = profile.resolve("_SID")?;
    match &layout.fields["SubAuthority"].ty {
        Type::Array {
            count: Length::Member { name, scale },
            ..
        } => {
            assert_eq!(name, "SubAuthorityCount");
            assert_eq!(*scale, 1);
        }
        ty => panic!("unexpected {ty:?}"),
    }
    Ok(())
}
