use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    rc::Rc,
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{MemberValues, Overlay, StructLayout, Type};
use crate::{AddressSpace, Behavior, KobjError, Object, Va};

/// Parameters of the memory image a profile describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileMetadata {
    /// Width of a pointer in bytes (4 or 8).
    pub pointer_width: u64,

    /// Size of a page in bytes.
    #[serde(default = "default_page_size")]
    pub page_size: u64,
}

fn default_page_size() -> u64 {
    0x1000
}

impl ProfileMetadata {
    /// Metadata for a 32-bit image.
    pub const X86: Self = Self {
        pointer_width: 4,
        page_size: 0x1000,
    };

    /// Metadata for a 64-bit image.
    pub const AMD64: Self = Self {
        pointer_width: 8,
        page_size: 0x1000,
    };
}

/// The layout registry.
///
/// A profile owns the base structure layouts (typically generated from
/// debugging symbols), the overlays correcting them, named constants and
/// the behaviors attached to type names. Layouts are merged lazily: the
/// first [`resolve`] of a type applies its overlays in registration order
/// and caches the result until the next registration.
///
/// [`resolve`]: Self::resolve
pub struct Profile {
    metadata: ProfileMetadata,
    types: IndexMap<String, StructLayout>,
    overlays: IndexMap<String, Vec<Overlay>>,
    constants: IndexMap<String, u64>,
    behaviors: HashMap<String, Rc<dyn Behavior>>,
    resolved: RefCell<HashMap<String, Rc<StructLayout>>>,
}

impl Profile {
    /// Creates an empty profile.
    pub fn new(metadata: ProfileMetadata) -> Self {
        Self {
            metadata,
            types: IndexMap::new(),
            overlays: IndexMap::new(),
            constants: IndexMap::new(),
            behaviors: HashMap::new(),
            resolved: RefCell::new(HashMap::new()),
        }
    }

    /// Returns the profile metadata.
    pub fn metadata(&self) -> ProfileMetadata {
        self.metadata
    }

    /// Returns the pointer width in bytes.
    pub fn pointer_width(&self) -> u64 {
        self.metadata.pointer_width
    }

    /// Returns the page size in bytes.
    pub fn page_size(&self) -> u64 {
        self.metadata.page_size
    }

    /// Adds base layouts. A base layout replaces any earlier base layout of
    /// the same name; overlays are kept.
    pub fn add_types(&mut self, types: impl IntoIterator<Item = (String, StructLayout)>) {
        for (name, layout) in types {
            self.resolved.get_mut().remove(&name);
            self.types.insert(name, layout);
        }
    }

    /// Registers an overlay for a type.
    ///
    /// Overlays are merged field by field on top of the base layout; later
    /// registrations win on conflicting field names.
    pub fn register_overlay(&mut self, type_name: impl Into<String>, overlay: Overlay) {
        let type_name = type_name.into();
        self.resolved.get_mut().remove(&type_name);
        self.overlays.entry(type_name).or_default().push(overlay);
    }

    /// Registers a named set of overlays.
    pub fn add_overlays<S>(&mut self, overlays: impl IntoIterator<Item = (S, Overlay)>)
    where
        S: Into<String>,
    {
        for (type_name, overlay) in overlays {
            self.register_overlay(type_name, overlay);
        }
    }

    /// Adds named constants. Later values win.
    pub fn add_constants<S>(&mut self, constants: impl IntoIterator<Item = (S, u64)>)
    where
        S: Into<String>,
    {
        for (name, value) in constants {
            self.constants.insert(name.into(), value);
        }
    }

    /// Returns a named constant.
    pub fn constant(&self, name: &str) -> Option<u64> {
        self.constants.get(name).copied()
    }

    /// Attaches a behavior to a type name, replacing any previous one.
    pub fn register_behavior(&mut self, type_name: impl Into<String>, behavior: Rc<dyn Behavior>) {
        self.behaviors.insert(type_name.into(), behavior);
    }

    /// Returns the behavior attached to a type name.
    pub fn behavior(&self, type_name: &str) -> Option<&Rc<dyn Behavior>> {
        self.behaviors.get(type_name)
    }

    /// Checks whether a layout exists for the type.
    pub fn has_type(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Returns the merged layout of a type.
    pub fn resolve(&self, type_name: &str) -> Result<Rc<StructLayout>, KobjError> {
        if let Some(layout) = self.resolved.borrow().get(type_name) {
            return Ok(Rc::clone(layout));
        }

        let mut layout = match self.types.get(type_name) {
            Some(layout) => layout.clone(),
            None => return Err(KobjError::NoSuchType(type_name.into())),
        };

        if let Some(overlays) = self.overlays.get(type_name) {
            for overlay in overlays {
                overlay.apply(type_name, &mut layout);
            }
        }

        let layout = Rc::new(layout);
        self.resolved
            .borrow_mut()
            .insert(type_name.into(), Rc::clone(&layout));

        Ok(layout)
    }

    /// Returns the declared size of a structure type.
    pub fn type_size(&self, type_name: &str) -> Result<u64, KobjError> {
        Ok(self.resolve(type_name)?.size)
    }

    /// Returns the fixed offset of a field.
    ///
    /// Fails for fields whose offset depends on the instance.
    pub fn field_offset(&self, type_name: &str, field: &str) -> Result<i64, KobjError> {
        let layout = self.resolve(type_name)?;

        layout
            .fields
            .get(field)
            .and_then(|field| field.offset.fixed())
            .ok_or_else(|| KobjError::NoSuchMember {
                type_name: type_name.into(),
                member: field.into(),
            })
    }

    /// Checks whether a type has the named field.
    pub fn has_field(&self, type_name: &str, field: &str) -> bool {
        self.resolve(type_name)
            .map(|layout| layout.fields.contains_key(field))
            .unwrap_or(false)
    }

    /// Returns the size of a field type.
    ///
    /// Data-dependent lengths are evaluated against `view`, the structure
    /// instance the type belongs to.
    pub fn size_of(&self, ty: &Type, view: &dyn MemberValues) -> Result<u64, KobjError> {
        match ty {
            Type::Native { native } => Ok(native.size(self.pointer_width())),
            Type::Pointer { .. } => Ok(self.pointer_width()),
            Type::Array { count, target } => {
                let count = count.evaluate(view)?;
                let size = self.size_of(target, view)?;

                count.checked_mul(size).ok_or(KobjError::OutOfBounds)
            }
            Type::Struct { name } => self.type_size(name),
            Type::String { length } | Type::UnicodeString { length } => length.evaluate(view),
            Type::BitField { native, .. } => Ok(native.size(self.pointer_width())),
            Type::Enumeration { target, .. } => Ok(target.size(self.pointer_width())),
            Type::WinTimeStamp { .. } | Type::ThreadCreateTimeStamp => Ok(8),
            Type::Void => Ok(0),
        }
    }

    /// Returns the offset and the size of a field of `view`.
    pub fn field_offset_and_size(
        &self,
        view: &dyn MemberValues,
        field: &str,
    ) -> Result<(i64, u64), KobjError> {
        let layout = self.resolve(view.type_name())?;

        let entry = match layout.fields.get(field) {
            Some(entry) => entry,
            None => {
                return Err(KobjError::NoSuchMember {
                    type_name: view.type_name().into(),
                    member: field.into(),
                });
            }
        };

        let offset = entry.offset.evaluate(view)?;
        let size = self.size_of(&entry.ty, view)?;

        Ok((offset, size))
    }

    /// Checks that no field of a type needs its own value to be sized.
    ///
    /// Only declarative dependencies ([`Length::Member`]) are visible here;
    /// computed lengths are checked when they are evaluated.
    ///
    /// [`Length::Member`]: super::Length::Member
    pub fn check_acyclic(&self, type_name: &str) -> Result<(), KobjError> {
        let layout = self.resolve(type_name)?;

        let mut edges: HashMap<&str, Vec<String>> = HashMap::new();
        for (name, field) in &layout.fields {
            let mut dependencies = Vec::new();
            field
                .ty
                .for_each_dependency(&mut |member| dependencies.push(member.to_owned()));
            edges.insert(name.as_str(), dependencies);
        }

        fn visit<'e>(
            node: &'e str,
            edges: &'e HashMap<&str, Vec<String>>,
            stack: &mut Vec<&'e str>,
            done: &mut HashSet<&'e str>,
        ) -> Result<(), &'e str> {
            if done.contains(node) {
                return Ok(());
            }

            if stack.contains(&node) {
                return Err(node);
            }

            stack.push(node);
            if let Some(dependencies) = edges.get(node) {
                for dependency in dependencies {
                    visit(dependency, edges, stack, done)?;
                }
            }
            stack.pop();

            done.insert(node);
            Ok(())
        }

        let mut done = HashSet::new();
        for name in layout.fields.keys() {
            let mut stack = Vec::new();
            if let Err(member) = visit(name, &edges, &mut stack, &mut done) {
                return Err(KobjError::CyclicField {
                    type_name: type_name.into(),
                    member: member.into(),
                });
            }
        }

        Ok(())
    }

    /// Creates a typed view of `type_name` at `offset`.
    pub fn object<A>(&self, space: Rc<A>, offset: Va, type_name: &str) -> Object<'_, A>
    where
        A: AddressSpace,
    {
        Object::new(self, space, offset, type_name)
    }
}
