use std::{collections::BTreeMap, fmt, rc::Rc};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{KobjError, Va};

/// Read access to the scalar members of a single structure instance.
///
/// Computed offsets and lengths are evaluated against this interface, so
/// they can only observe the instance they belong to.
pub trait MemberValues {
    /// The name of the structure type.
    fn type_name(&self) -> &str;

    /// The absolute address of the structure.
    fn offset(&self) -> Va;

    /// Returns the value of a scalar member.
    fn member_u64(&self, name: &str) -> Result<u64, KobjError>;
}

/// A function computing an offset or a length from a structure instance.
#[derive(Clone)]
pub struct Expr(Rc<dyn Fn(&dyn MemberValues) -> Result<u64, KobjError>>);

impl Expr {
    /// Wraps a function.
    pub fn new(f: impl Fn(&dyn MemberValues) -> Result<u64, KobjError> + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// Evaluates the function against a structure instance.
    pub fn evaluate(&self, view: &dyn MemberValues) -> Result<u64, KobjError> {
        (self.0)(view)
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Expr(..)")
    }
}

/// The offset of a field relative to the start of its structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Offset {
    /// A constant offset. Negative values address memory before the
    /// nominal start of the structure.
    Fixed(i64),

    /// An offset computed from the structure instance.
    #[serde(skip)]
    Computed(Expr),
}

impl Offset {
    /// Evaluates the offset against a structure instance.
    pub fn evaluate(&self, view: &dyn MemberValues) -> Result<i64, KobjError> {
        match self {
            Self::Fixed(offset) => Ok(*offset),
            Self::Computed(expr) => Ok(expr.evaluate(view)? as i64),
        }
    }

    /// Returns the offset if it does not depend on the instance.
    pub fn fixed(&self) -> Option<i64> {
        match self {
            Self::Fixed(offset) => Some(*offset),
            Self::Computed(_) => None,
        }
    }
}

impl From<i64> for Offset {
    fn from(value: i64) -> Self {
        Self::Fixed(value)
    }
}

/// The length of an array (in elements) or a string (in bytes).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Length {
    /// A constant length.
    Fixed(u64),

    /// The value of a sibling member, multiplied by `scale`.
    Member {
        /// The sibling member holding the count.
        name: String,

        /// Multiplier applied to the member value.
        #[serde(default = "default_scale")]
        scale: u64,
    },

    /// A length computed from the structure instance.
    #[serde(skip)]
    Computed(Expr),
}

fn default_scale() -> u64 {
    1
}

impl Length {
    /// Length equal to the value of a sibling member.
    pub fn member(name: impl Into<String>) -> Self {
        Self::Member {
            name: name.into(),
            scale: 1,
        }
    }

    /// Length equal to the value of a sibling member times `scale`.
    pub fn scaled(name: impl Into<String>, scale: u64) -> Self {
        Self::Member {
            name: name.into(),
            scale,
        }
    }

    /// Evaluates the length against a structure instance.
    pub fn evaluate(&self, view: &dyn MemberValues) -> Result<u64, KobjError> {
        match self {
            Self::Fixed(length) => Ok(*length),
            Self::Member { name, scale } => view
                .member_u64(name)?
                .checked_mul(*scale)
                .ok_or(KobjError::OutOfBounds),
            Self::Computed(expr) => expr.evaluate(view),
        }
    }
}

/// Native scalar types.
///
/// Sizes follow the Windows (LLP64 / ILP32) data model: `long` is always
/// 32 bits wide, `address` is as wide as a pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NativeType {
    /// `char`
    #[serde(rename = "char")]
    Char,

    /// `unsigned char`
    #[serde(rename = "unsigned char")]
    UnsignedChar,

    /// `short`
    #[serde(rename = "short")]
    Short,

    /// `unsigned short`
    #[serde(rename = "unsigned short")]
    UnsignedShort,

    /// `int`
    #[serde(rename = "int")]
    Int,

    /// `unsigned int`
    #[serde(rename = "unsigned int")]
    UnsignedInt,

    /// `long`
    #[serde(rename = "long")]
    Long,

    /// `unsigned long`
    #[serde(rename = "unsigned long")]
    UnsignedLong,

    /// `long long`
    #[serde(rename = "long long")]
    LongLong,

    /// `unsigned long long`
    #[serde(rename = "unsigned long long")]
    UnsignedLongLong,

    /// A pointer-sized unsigned integer.
    #[serde(rename = "address")]
    Address,
}

impl NativeType {
    /// Returns the size of the type in bytes.
    pub fn size(self, pointer_width: u64) -> u64 {
        match self {
            Self::Char | Self::UnsignedChar => 1,
            Self::Short | Self::UnsignedShort => 2,
            Self::Int | Self::UnsignedInt | Self::Long | Self::UnsignedLong => 4,
            Self::LongLong | Self::UnsignedLongLong => 8,
            Self::Address => pointer_width,
        }
    }

    /// Checks whether the type is signed.
    pub fn is_signed(self) -> bool {
        matches!(
            self,
            Self::Char | Self::Short | Self::Int | Self::Long | Self::LongLong
        )
    }
}

/// Describes how the bytes of a field are interpreted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Type {
    /// A native scalar.
    Native {
        /// The scalar type.
        native: NativeType,
    },

    /// A pointer to a target type.
    Pointer {
        /// The type of the pointee.
        target: Box<Type>,
    },

    /// A contiguous array.
    Array {
        /// Number of elements.
        count: Length,

        /// The element type.
        target: Box<Type>,
    },

    /// An embedded structure.
    Struct {
        /// The name of the structure type.
        name: String,
    },

    /// A single-byte character string, terminated by the first NUL within
    /// `length` bytes.
    String {
        /// Maximum length in bytes.
        length: Length,
    },

    /// A UTF-16LE string of `length` bytes.
    UnicodeString {
        /// Length in bytes.
        length: Length,
    },

    /// A range of bits `[start_bit, end_bit)` of a native scalar.
    BitField {
        /// First bit (inclusive).
        start_bit: u32,

        /// Last bit (exclusive).
        end_bit: u32,

        /// The scalar holding the bits.
        native: NativeType,
    },

    /// A native scalar with named values.
    Enumeration {
        /// The scalar holding the value.
        target: NativeType,

        /// Value names.
        choices: BTreeMap<u64, String>,
    },

    /// A Windows `FILETIME` (100ns intervals since 1601-01-01).
    WinTimeStamp {
        /// Whether the value is known to be expressed in UTC.
        #[serde(default)]
        is_utc: bool,
    },

    /// A `FILETIME` stored shifted left by 3 bits (thread creation time).
    ThreadCreateTimeStamp,

    /// No data.
    Void,
}

impl Type {
    /// A native scalar.
    pub fn native(native: NativeType) -> Self {
        Self::Native { native }
    }

    /// A pointer to `target`.
    pub fn pointer(target: Type) -> Self {
        Self::Pointer {
            target: Box::new(target),
        }
    }

    /// A pointer to the named structure.
    pub fn pointer_to(name: impl Into<String>) -> Self {
        Self::pointer(Self::structure(name))
    }

    /// An array of `target`.
    pub fn array(count: Length, target: Type) -> Self {
        Self::Array {
            count,
            target: Box::new(target),
        }
    }

    /// An embedded structure.
    pub fn structure(name: impl Into<String>) -> Self {
        Self::Struct { name: name.into() }
    }

    /// A single-byte character string.
    pub fn string(length: Length) -> Self {
        Self::String { length }
    }

    /// A Windows `FILETIME`.
    pub fn timestamp() -> Self {
        Self::WinTimeStamp { is_utc: false }
    }

    /// Visits every member name this type reads to size itself.
    pub(crate) fn for_each_dependency(&self, f: &mut impl FnMut(&str)) {
        match self {
            Self::Array { count, target } => {
                if let Length::Member { name, .. } = count {
                    f(name);
                }

                target.for_each_dependency(f);
            }
            Self::Pointer { target } => target.for_each_dependency(f),
            Self::String { length } | Self::UnicodeString { length } => {
                if let Length::Member { name, .. } = length {
                    f(name);
                }
            }
            _ => {}
        }
    }
}

/// A field of a structure layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    /// Offset relative to the structure start.
    pub offset: Offset,

    /// How the field's bytes are interpreted.
    #[serde(rename = "type")]
    pub ty: Type,
}

/// The layout of a structure: its size and ordered fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructLayout {
    /// Declared size in bytes.
    pub size: u64,

    /// Fields in declaration order.
    pub fields: IndexMap<String, Field>,
}

impl StructLayout {
    /// Creates an empty layout of the given size.
    pub fn new(size: u64) -> Self {
        Self {
            size,
            fields: IndexMap::new(),
        }
    }

    /// Adds a field at a fixed offset.
    pub fn field(mut self, name: impl Into<String>, offset: i64, ty: Type) -> Self {
        self.fields.insert(
            name.into(),
            Field {
                offset: Offset::Fixed(offset),
                ty,
            },
        );
        self
    }
}

/// A correction to a single field. `None` keeps the base value.
#[derive(Debug, Clone, Default)]
pub struct FieldOverlay {
    /// Replacement offset.
    pub offset: Option<Offset>,

    /// Replacement type.
    pub ty: Option<Type>,
}

/// A set of field corrections and additions for one structure type.
#[derive(Debug, Clone, Default)]
pub struct Overlay {
    /// Replacement structure size.
    pub size: Option<u64>,

    /// Field corrections, in registration order.
    pub fields: IndexMap<String, FieldOverlay>,
}

impl Overlay {
    /// Creates an empty overlay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the type of a field, keeping its base offset.
    pub fn ty(mut self, name: impl Into<String>, ty: Type) -> Self {
        self.fields.insert(
            name.into(),
            FieldOverlay {
                offset: None,
                ty: Some(ty),
            },
        );
        self
    }

    /// Places a field at an explicit offset with an explicit type.
    pub fn field(mut self, name: impl Into<String>, offset: impl Into<Offset>, ty: Type) -> Self {
        self.fields.insert(
            name.into(),
            FieldOverlay {
                offset: Some(offset.into()),
                ty: Some(ty),
            },
        );
        self
    }

    /// Replaces the size of the structure.
    pub fn size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Applies the overlay on top of `layout`.
    ///
    /// Fields are merged one by one; the overlay wins on conflicts. A field
    /// unknown to the base layout is added only if the overlay provides both
    /// its offset and its type.
    pub(crate) fn apply(&self, type_name: &str, layout: &mut StructLayout) {
        if let Some(size) = self.size {
            layout.size = size;
        }

        for (name, correction) in &self.fields {
            match layout.fields.get_mut(name) {
                Some(field) => {
                    if let Some(offset) = &correction.offset {
                        field.offset = offset.clone();
                    }

                    if let Some(ty) = &correction.ty {
                        field.ty = ty.clone();
                    }
                }
                None => match (&correction.offset, &correction.ty) {
                    (Some(offset), Some(ty)) => {
                        layout.fields.insert(
                            name.clone(),
                            Field {
                                offset: offset.clone(),
                                ty: ty.clone(),
                            },
                        );
                    }
                    _ => {
                        tracing::trace!(type_name, field = %name, "overlay field has no base");
                    }
                },
            }
        }
    }
}
