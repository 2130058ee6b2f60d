//! Typed memory views.

mod value;

use std::{cell::RefCell, collections::HashMap, fmt, rc::Rc};

use once_cell::unsync::OnceCell;
use zerocopy::{FromBytes, byteorder::little_endian::U16};

pub use self::value::{Array, Pointer, Value, WinTimeStamp};
use crate::{
    AddressSpace, Class, KobjError, MemberValues, NativeType, Profile, Recover, StructLayout,
    Type, Va,
};

/// Upper bound for string fields. Longer strings are treated as corrupted.
const MAX_STRING_LENGTH: u64 = 0x10000;

/// A typed view of a structure in an address space.
///
/// An object is a read-only window: an address space, an absolute offset,
/// a type name resolved through a [`Profile`], and an optional parent (the
/// view this one was reached from). Objects are cheap to clone and are
/// never written to.
///
/// Readability is not checked at construction. Use [`is_valid`] before
/// trusting a view built from an untrusted pointer.
///
/// [`is_valid`]: Self::is_valid
pub struct Object<'a, A>
where
    A: AddressSpace,
{
    inner: Rc<Inner<'a, A>>,
}

struct Inner<'a, A>
where
    A: AddressSpace,
{
    profile: &'a Profile,
    space: Rc<A>,
    offset: Va,
    type_name: String,
    parent: Option<Object<'a, A>>,
    name: Option<String>,

    /// Merged layout, resolved on first use.
    layout: OnceCell<Rc<StructLayout>>,

    /// Scalar member values read so far.
    values: RefCell<HashMap<String, u64>>,

    /// Members currently being resolved, innermost last.
    resolving: RefCell<Vec<String>>,
}

impl<A> Clone for Object<'_, A>
where
    A: AddressSpace,
{
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<A> fmt::Debug for Object<'_, A>
where
    A: AddressSpace,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Object")
            .field("type_name", &self.inner.type_name)
            .field("offset", &self.inner.offset)
            .field("name", &self.inner.name)
            .finish()
    }
}

impl<A> MemberValues for Object<'_, A>
where
    A: AddressSpace,
{
    fn type_name(&self) -> &str {
        &self.inner.type_name
    }

    fn offset(&self) -> Va {
        self.inner.offset
    }

    fn member_u64(&self, name: &str) -> Result<u64, KobjError> {
        Object::member_u64(self, name)
    }
}

struct ResolveGuard<'g> {
    stack: &'g RefCell<Vec<String>>,
}

impl Drop for ResolveGuard<'_> {
    fn drop(&mut self) {
        self.stack.borrow_mut().pop();
    }
}

impl<'a, A> Object<'a, A>
where
    A: AddressSpace,
{
    /// Creates a new view of `type_name` at `offset`.
    pub fn new(profile: &'a Profile, space: Rc<A>, offset: Va, type_name: &str) -> Self {
        Self::build(profile, space, offset, type_name.into(), None, None)
    }

    fn build(
        profile: &'a Profile,
        space: Rc<A>,
        offset: Va,
        type_name: String,
        parent: Option<Object<'a, A>>,
        name: Option<String>,
    ) -> Self {
        Self {
            inner: Rc::new(Inner {
                profile,
                space,
                offset,
                type_name,
                parent,
                name,
                layout: OnceCell::new(),
                values: RefCell::new(HashMap::new()),
                resolving: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Returns a copy of this view with the given parent.
    pub fn with_parent(&self, parent: &Object<'a, A>) -> Self {
        Self::build(
            self.inner.profile,
            Rc::clone(&self.inner.space),
            self.inner.offset,
            self.inner.type_name.clone(),
            Some(parent.clone()),
            self.inner.name.clone(),
        )
    }

    /// Returns a copy of this view with the given name.
    pub fn with_name(&self, name: &str) -> Self {
        Self::build(
            self.inner.profile,
            Rc::clone(&self.inner.space),
            self.inner.offset,
            self.inner.type_name.clone(),
            self.inner.parent.clone(),
            Some(name.into()),
        )
    }

    /// Reinterprets the same memory as another type.
    pub fn cast(&self, type_name: &str) -> Self {
        Self::build(
            self.inner.profile,
            Rc::clone(&self.inner.space),
            self.inner.offset,
            type_name.into(),
            self.inner.parent.clone(),
            self.inner.name.clone(),
        )
    }

    /// Reinterprets the view as a typed wrapper.
    pub fn cast_into<T>(&self) -> T
    where
        T: Class<'a, A>,
    {
        T::from_object(self.cast(T::TYPE_NAME))
    }

    /// Rebinds the view to another address space.
    pub fn in_space(&self, space: Rc<A>) -> Self {
        Self::build(
            self.inner.profile,
            space,
            self.inner.offset,
            self.inner.type_name.clone(),
            self.inner.parent.clone(),
            self.inner.name.clone(),
        )
    }

    /// Creates a view in the same address space whose parent is `self`.
    pub fn child(&self, offset: Va, type_name: &str) -> Self {
        Self::build(
            self.inner.profile,
            Rc::clone(&self.inner.space),
            offset,
            type_name.into(),
            Some(self.clone()),
            None,
        )
    }

    /// Returns the profile.
    pub fn profile(&self) -> &'a Profile {
        self.inner.profile
    }

    /// Returns the address space.
    pub fn space(&self) -> &Rc<A> {
        &self.inner.space
    }

    /// Returns the absolute offset of the structure.
    pub fn offset(&self) -> Va {
        self.inner.offset
    }

    /// Returns the type name.
    pub fn type_name(&self) -> &str {
        &self.inner.type_name
    }

    /// Returns the view this one was reached from.
    pub fn parent(&self) -> Option<&Object<'a, A>> {
        self.inner.parent.as_ref()
    }

    /// Returns the member name under which the view was reached.
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Returns the merged layout of the type.
    pub fn layout(&self) -> Result<Rc<StructLayout>, KobjError> {
        self.inner
            .layout
            .get_or_try_init(|| self.inner.profile.resolve(&self.inner.type_name))
            .cloned()
    }

    /// Checks whether the layout has a member.
    pub fn has_member(&self, name: &str) -> bool {
        self.layout()
            .map(|layout| layout.fields.contains_key(name))
            .unwrap_or(false)
    }

    /// Returns the size of the structure.
    ///
    /// A registered [`Behavior`] may override the size declared by the
    /// layout.
    ///
    /// [`Behavior`]: crate::Behavior
    pub fn size(&self) -> Result<u64, KobjError> {
        let profile = self.inner.profile;

        if let Some(behavior) = profile.behavior(&self.inner.type_name)
            && let Some(size) = behavior.size(profile, &self.inner.type_name)?
        {
            return Ok(size);
        }

        Ok(self.layout()?.size)
    }

    /// Checks whether the view can be trusted.
    ///
    /// The whole declared range must be readable, and any type-specific
    /// checks must pass.
    pub fn is_valid(&self) -> bool {
        match self.check_valid() {
            Ok(valid) => valid,
            Err(err) => {
                tracing::debug!(%err, type_name = %self.inner.type_name, "invalid view");
                false
            }
        }
    }

    /// Like [`is_valid`], but propagates errors not caused by the memory
    /// contents, such as an unknown type.
    ///
    /// [`is_valid`]: Self::is_valid
    pub fn check_valid(&self) -> Result<bool, KobjError> {
        let size = self.size()?;

        if !self.inner.space.is_valid_range(self.inner.offset, size) {
            return Ok(false);
        }

        let behavior = match self.inner.profile.behavior(&self.inner.type_name) {
            Some(behavior) => behavior,
            None => return Ok(true),
        };

        Ok(behavior.is_valid(self).recover()?.unwrap_or(false))
    }

    /// Returns the offset (relative to the structure) and the size of a
    /// member.
    pub fn field_offset_and_size(&self, name: &str) -> Result<(i64, u64), KobjError> {
        self.inner.profile.field_offset_and_size(self, name)
    }

    /// Returns the absolute address of a member.
    pub fn member_offset(&self, name: &str) -> Result<Va, KobjError> {
        let layout = self.layout()?;
        let field = self.field(&layout, name)?;
        Ok(self.inner.offset.offset(field.offset.evaluate(self)?))
    }

    fn field<'l>(
        &self,
        layout: &'l StructLayout,
        name: &str,
    ) -> Result<&'l crate::Field, KobjError> {
        layout
            .fields
            .get(name)
            .ok_or_else(|| KobjError::NoSuchMember {
                type_name: self.inner.type_name.clone(),
                member: name.into(),
            })
    }

    fn enter(&self, name: &str) -> Result<ResolveGuard<'_>, KobjError> {
        let mut stack = self.inner.resolving.borrow_mut();

        if stack.iter().any(|member| member == name) {
            return Err(KobjError::CyclicField {
                type_name: self.inner.type_name.clone(),
                member: name.into(),
            });
        }

        stack.push(name.into());

        Ok(ResolveGuard {
            stack: &self.inner.resolving,
        })
    }

    /// Reads a member.
    pub fn member(&self, name: &str) -> Result<Value<'a, A>, KobjError> {
        let _guard = self.enter(name)?;

        let layout = self.layout()?;
        let field = self.field(&layout, name)?;
        let address = self.inner.offset.offset(field.offset.evaluate(self)?);

        self.decode(&field.ty, address, Some(name))
    }

    /// Reads a scalar member.
    ///
    /// Pointers, enumerations and timestamps yield their raw value. Values
    /// are memoized per view.
    pub fn member_u64(&self, name: &str) -> Result<u64, KobjError> {
        if let Some(value) = self.inner.values.borrow().get(name) {
            return Ok(*value);
        }

        let value = match self.member(name)?.as_u64() {
            Some(value) => value,
            None => return Err(KobjError::Other("member is not a scalar")),
        };

        self.inner.values.borrow_mut().insert(name.into(), value);
        Ok(value)
    }

    /// Reads a signed scalar member.
    pub fn member_i64(&self, name: &str) -> Result<i64, KobjError> {
        match self.member(name)? {
            Value::Signed(value) => Ok(value),
            value => value
                .as_u64()
                .map(|value| value as i64)
                .ok_or(KobjError::Other("member is not a scalar")),
        }
    }

    /// Reads a member holding an address (a pointer or a scalar).
    pub fn member_va(&self, name: &str) -> Result<Va, KobjError> {
        self.member_u64(name).map(Va)
    }

    /// Reads an embedded structure member.
    pub fn member_object(&self, name: &str) -> Result<Object<'a, A>, KobjError> {
        match self.member(name)? {
            Value::Struct(object) => Ok(object),
            _ => Err(KobjError::Other("member is not a structure")),
        }
    }

    /// Reads a pointer member.
    pub fn member_pointer(&self, name: &str) -> Result<Pointer<'a, A>, KobjError> {
        match self.member(name)? {
            Value::Pointer(pointer) => Ok(pointer),
            _ => Err(KobjError::Other("member is not a pointer")),
        }
    }

    /// Reads a string member.
    pub fn member_string(&self, name: &str) -> Result<String, KobjError> {
        match self.member(name)? {
            Value::String(value) => Ok(value),
            _ => Err(KobjError::Other("member is not a string")),
        }
    }

    /// Reads an array member.
    pub fn member_array(&self, name: &str) -> Result<Array<'a, A>, KobjError> {
        match self.member(name)? {
            Value::Array(array) => Ok(array),
            _ => Err(KobjError::Other("member is not an array")),
        }
    }

    /// Follows a pointer member to the structure it targets.
    ///
    /// Returns `Ok(None)` if the pointer is null or the target is not
    /// readable.
    pub fn dereference_member(&self, name: &str) -> Result<Option<Object<'a, A>>, KobjError> {
        self.member_pointer(name)?.dereference_object()
    }

    /// Reads a member through a dotted path, e.g. `Tcb.ApcState.Process`.
    ///
    /// Intermediate pointers to structures are followed.
    pub fn member_path(&self, path: &str) -> Result<Value<'a, A>, KobjError> {
        let mut segments = path.split('.');

        let mut value = match segments.next() {
            Some(first) => self.member(first)?,
            None => return Err(KobjError::Other("empty member path")),
        };

        for segment in segments {
            let object = match value {
                Value::Struct(object) => object,
                Value::Pointer(pointer) => match pointer.dereference_object()? {
                    Some(object) => object,
                    None => return Err(KobjError::PageFault(pointer.value())),
                },
                _ => {
                    return Err(KobjError::NoSuchMember {
                        type_name: self.inner.type_name.clone(),
                        member: path.into(),
                    });
                }
            };

            value = object.member(segment)?;
        }

        Ok(value)
    }

    /// Decodes `ty` at `address`, with `self` as the owning structure.
    ///
    /// Data-dependent lengths are evaluated against `self`.
    pub(crate) fn decode(
        &self,
        ty: &Type,
        address: Va,
        name: Option<&str>,
    ) -> Result<Value<'a, A>, KobjError> {
        let profile = self.inner.profile;
        let space = &self.inner.space;

        match ty {
            Type::Native { native } => {
                let raw = self.read_native(*native, address)?;

                if native.is_signed() {
                    Ok(Value::Signed(sign_extend(
                        raw,
                        native.size(profile.pointer_width()),
                    )))
                }
                else {
                    Ok(Value::Unsigned(raw))
                }
            }

            Type::Pointer { target } => {
                let value = space.read_address(address, profile.pointer_width() as usize)?;

                Ok(Value::Pointer(Pointer::new(
                    self.clone(),
                    address,
                    value,
                    (**target).clone(),
                )))
            }

            Type::Array { count, target } => {
                let count = count.evaluate(self)?;
                let stride = profile.size_of(target, self)?;

                Ok(Value::Array(Array::new(
                    self.clone(),
                    address,
                    count,
                    stride,
                    (**target).clone(),
                )))
            }

            Type::Struct { name: type_name } => Ok(Value::Struct(Self::build(
                profile,
                Rc::clone(space),
                address,
                type_name.clone(),
                Some(self.clone()),
                name.map(Into::into),
            ))),

            Type::String { length } => {
                let bytes = self.read_string_bytes(length.evaluate(self)?, address)?;
                let end = memchr::memchr(0, &bytes).unwrap_or(bytes.len());

                Ok(Value::String(
                    String::from_utf8_lossy(&bytes[..end]).into_owned(),
                ))
            }

            Type::UnicodeString { length } => {
                let bytes = self.read_string_bytes(length.evaluate(self)?, address)?;
                let bytes = &bytes[..bytes.len() & !1];

                let units = match <[U16]>::ref_from_bytes(bytes) {
                    Ok(units) => units,
                    Err(_) => return Err(KobjError::OutOfBounds),
                };

                let units = units
                    .iter()
                    .map(|unit| unit.get())
                    .take_while(|&unit| unit != 0)
                    .collect::<Vec<_>>();

                Ok(Value::String(String::from_utf16_lossy(&units)))
            }

            Type::BitField {
                start_bit,
                end_bit,
                native,
            } => {
                if start_bit >= end_bit || *end_bit > 64 {
                    return Err(KobjError::OutOfBounds);
                }

                let raw = self.read_native(*native, address)?;
                let width = end_bit - start_bit;
                let mask = if width == 64 {
                    u64::MAX
                }
                else {
                    (1u64 << width) - 1
                };

                Ok(Value::Unsigned((raw >> start_bit) & mask))
            }

            Type::Enumeration { target, choices } => {
                let value = self.read_native(*target, address)?;

                Ok(Value::Enumeration {
                    value,
                    name: choices.get(&value).cloned(),
                })
            }

            Type::WinTimeStamp { is_utc } => Ok(Value::Timestamp(WinTimeStamp::new(
                space.read_u64(address)?,
                *is_utc,
            ))),

            Type::ThreadCreateTimeStamp => Ok(Value::Timestamp(WinTimeStamp::new(
                space.read_u64(address)? >> 3,
                false,
            ))),

            Type::Void => Ok(Value::Void),
        }
    }

    fn read_native(&self, native: NativeType, address: Va) -> Result<u64, KobjError> {
        let size = native.size(self.inner.profile.pointer_width());
        self.inner.space.read_uint(address, size as usize)
    }

    fn read_string_bytes(&self, length: u64, address: Va) -> Result<Vec<u8>, KobjError> {
        if length > MAX_STRING_LENGTH {
            return Err(KobjError::Implausible("string length"));
        }

        self.inner.space.read_bytes(address, length as usize)
    }
}

fn sign_extend(value: u64, size: u64) -> i64 {
    let shift = 64 - (size * 8).min(64);
    ((value << shift) as i64) >> shift
}

#[cfg(test)]
mod tests;
