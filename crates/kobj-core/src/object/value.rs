use std::fmt;

use super::Object;
use crate::{AddressSpace, KobjError, Recover, Type, Va};

/// A decoded member value.
pub enum Value<'a, A>
where
    A: AddressSpace,
{
    /// An unsigned scalar or a bit field.
    Unsigned(u64),

    /// A sign-extended scalar.
    Signed(i64),

    /// A pointer.
    Pointer(Pointer<'a, A>),

    /// An embedded structure.
    Struct(Object<'a, A>),

    /// An array.
    Array(Array<'a, A>),

    /// A decoded string.
    String(String),

    /// A timestamp.
    Timestamp(WinTimeStamp),

    /// An enumeration value and its name, if known.
    Enumeration {
        /// The raw value.
        value: u64,

        /// The name of the value.
        name: Option<String>,
    },

    /// No data.
    Void,
}

impl<'a, A> Value<'a, A>
where
    A: AddressSpace,
{
    /// Returns the raw integer behind a scalar-like value.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Unsigned(value) => Some(*value),
            Self::Signed(value) => Some(*value as u64),
            Self::Pointer(pointer) => Some(pointer.value().0),
            Self::Enumeration { value, .. } => Some(*value),
            Self::Timestamp(timestamp) => Some(timestamp.filetime),
            _ => None,
        }
    }

    /// Returns the string, if the value is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the structure, if the value is one.
    pub fn into_object(self) -> Option<Object<'a, A>> {
        match self {
            Self::Struct(object) => Some(object),
            _ => None,
        }
    }

    /// Returns the pointer, if the value is one.
    pub fn into_pointer(self) -> Option<Pointer<'a, A>> {
        match self {
            Self::Pointer(pointer) => Some(pointer),
            _ => None,
        }
    }

    /// Returns the array, if the value is one.
    pub fn into_array(self) -> Option<Array<'a, A>> {
        match self {
            Self::Array(array) => Some(array),
            _ => None,
        }
    }
}

impl<A> fmt::Debug for Value<'_, A>
where
    A: AddressSpace,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Unsigned(value) => write!(f, "{value:#x}"),
            Self::Signed(value) => write!(f, "{value}"),
            Self::Pointer(pointer) => write!(f, "<pointer {}>", pointer.value()),
            Self::Struct(object) => write!(f, "[{} {}]", object.type_name(), object.offset()),
            Self::Array(array) => write!(f, "<array {} x {}>", array.len(), array.offset()),
            Self::String(value) => write!(f, "{value:?}"),
            Self::Timestamp(timestamp) => write!(f, "{timestamp}"),
            Self::Enumeration { value, name } => match name {
                Some(name) => write!(f, "{name}"),
                None => write!(f, "{value:#x}"),
            },
            Self::Void => f.write_str("void"),
        }
    }
}

/// A pointer member.
///
/// The pointer remembers the structure it was read from, so that lengths of
/// the target type are evaluated against that structure.
pub struct Pointer<'a, A>
where
    A: AddressSpace,
{
    owner: Object<'a, A>,
    address: Va,
    value: Va,
    target: Type,
}

impl<A> Clone for Pointer<'_, A>
where
    A: AddressSpace,
{
    fn clone(&self) -> Self {
        Self {
            owner: self.owner.clone(),
            address: self.address,
            value: self.value,
            target: self.target.clone(),
        }
    }
}

impl<'a, A> Pointer<'a, A>
where
    A: AddressSpace,
{
    pub(super) fn new(owner: Object<'a, A>, address: Va, value: Va, target: Type) -> Self {
        Self {
            owner,
            address,
            value,
            target,
        }
    }

    /// Returns the address the pointer was read from.
    pub fn address(&self) -> Va {
        self.address
    }

    /// Returns the pointer value.
    pub fn value(&self) -> Va {
        self.value
    }

    /// Returns the pointee type.
    pub fn target(&self) -> &Type {
        &self.target
    }

    /// Checks whether the pointer is null.
    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    /// Reads the pointee.
    ///
    /// Returns `Ok(None)` if the pointer is null or the pointee cannot be
    /// read.
    pub fn dereference(&self) -> Result<Option<Value<'a, A>>, KobjError> {
        if self.is_null() {
            return Ok(None);
        }

        match &self.target {
            Type::Struct { name } => Ok(self.dereference_as(name)?.map(Value::Struct)),
            Type::Void => Ok(None),
            target => self.dereference_with(target),
        }
    }

    /// Reads the pointee as an arbitrary type, regardless of the declared
    /// target type.
    ///
    /// Lengths of `target` are evaluated against the structure the pointer
    /// was read from.
    pub fn dereference_with(&self, target: &Type) -> Result<Option<Value<'a, A>>, KobjError> {
        if self.is_null() {
            return Ok(None);
        }

        if let Type::Struct { name } = target {
            return Ok(self.dereference_as(name)?.map(Value::Struct));
        }

        // Arrays are decoded lazily.
        if !self.owner.space().is_valid_address(self.value) {
            return Ok(None);
        }

        self.owner.decode(target, self.value, None).recover()
    }

    /// Reads the pointee as the named structure, regardless of the declared
    /// target type.
    ///
    /// Returns `Ok(None)` if the pointer is null or the structure is not
    /// valid.
    pub fn dereference_as(&self, type_name: &str) -> Result<Option<Object<'a, A>>, KobjError> {
        if self.is_null() {
            return Ok(None);
        }

        let object = self.owner.child(self.value, type_name);
        if !object.check_valid()? {
            tracing::debug!(
                type_name,
                address = %self.value,
                "pointer target is not valid"
            );
            return Ok(None);
        }

        Ok(Some(object))
    }

    /// Reads the pointee, which must be a structure.
    pub fn dereference_object(&self) -> Result<Option<Object<'a, A>>, KobjError> {
        match &self.target {
            Type::Struct { name } => self.dereference_as(name),
            _ => Err(KobjError::Other("pointer does not target a structure")),
        }
    }
}

/// An array member.
pub struct Array<'a, A>
where
    A: AddressSpace,
{
    owner: Object<'a, A>,
    offset: Va,
    count: u64,
    stride: u64,
    target: Type,
}

impl<'a, A> Array<'a, A>
where
    A: AddressSpace,
{
    pub(super) fn new(
        owner: Object<'a, A>,
        offset: Va,
        count: u64,
        stride: u64,
        target: Type,
    ) -> Self {
        Self {
            owner,
            offset,
            count,
            stride,
            target,
        }
    }

    /// Returns the address of the first element.
    pub fn offset(&self) -> Va {
        self.offset
    }

    /// Returns the number of elements.
    pub fn len(&self) -> u64 {
        self.count
    }

    /// Checks whether the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns the element type.
    pub fn target(&self) -> &Type {
        &self.target
    }

    /// Checks whether every element is readable.
    pub fn is_valid(&self) -> bool {
        match self.count.checked_mul(self.stride) {
            Some(size) => self.owner.space().is_valid_range(self.offset, size),
            None => false,
        }
    }

    /// Reads an element.
    pub fn get(&self, index: u64) -> Result<Value<'a, A>, KobjError> {
        if index >= self.count {
            return Err(KobjError::OutOfBounds);
        }

        let address = self.offset + index * self.stride;
        self.owner.decode(&self.target, address, None)
    }

    /// Iterates over the elements.
    pub fn iter(&self) -> impl Iterator<Item = Result<Value<'a, A>, KobjError>> + '_ {
        (0..self.count).map(move |index| self.get(index))
    }
}

/// Seconds between 1601-01-01 and 1970-01-01.
const EPOCH_DIFFERENCE: i64 = 11_644_473_600;

/// A Windows `FILETIME`: 100ns intervals since 1601-01-01.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WinTimeStamp {
    /// The raw value.
    pub filetime: u64,

    /// Whether the value is known to be in UTC.
    pub is_utc: bool,
}

impl WinTimeStamp {
    /// Creates a new timestamp.
    pub fn new(filetime: u64, is_utc: bool) -> Self {
        Self { filetime, is_utc }
    }

    /// Checks whether the timestamp is unset.
    pub fn is_zero(&self) -> bool {
        self.filetime == 0
    }

    /// Returns the number of seconds since the Unix epoch, or `None` if the
    /// timestamp is unset.
    pub fn unix_seconds(&self) -> Option<i64> {
        if self.is_zero() {
            return None;
        }

        Some((self.filetime / 10_000_000) as i64 - EPOCH_DIFFERENCE)
    }
}

impl fmt::Display for WinTimeStamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let seconds = match self.unix_seconds() {
            Some(seconds) => seconds,
            None => return f.write_str("-"),
        };

        let days = seconds.div_euclid(86_400);
        let time = seconds.rem_euclid(86_400);
        let (year, month, day) = civil_from_days(days);

        write!(
            f,
            "{year:04}-{month:02}-{day:02} {:02}:{:02}:{:02}",
            time / 3600,
            (time / 60) % 60,
            time % 60
        )?;

        if self.is_utc {
            f.write_str(" UTC")?;
        }

        Ok(())
    }
}

/// Converts days since 1970-01-01 to a proleptic Gregorian date.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = yoe + era * 400;

    (if month <= 2 { year + 1 } else { year }, month, day)
}
