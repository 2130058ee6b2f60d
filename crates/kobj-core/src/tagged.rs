//! Tagged references.
//!
//! Some references cannot be followed by reading a pointer field. A fast
//! reference carries a reference count in its low bits, which must be
//! masked off first. A node in a polymorphic structure only reveals its
//! concrete type through a tag stored in memory, usually the pool tag
//! placed right before the structure.
//!
//! All bit masking and header arithmetic lives here; the rest of the crate
//! passes typed views around.

use smallvec::SmallVec;

use crate::{AddressSpace, KobjError, Object, Va};

/// Strips the tag bits from a masked pointer.
///
/// # Examples
///
/// ```
/// # use kobj_core::{tagged::mask_pointer, Va};
/// assert_eq!(mask_pointer(0x1003, 0x7), Va(0x1000));
/// ```
pub fn mask_pointer(raw: u64, mask: u64) -> Va {
    Va(raw & !mask)
}

/// Dereferences a masked pointer as `target`.
///
/// The resulting view has `source` as its parent. Fails with
/// [`KobjError::MissingTarget`] if no target type was given, and returns
/// `Ok(None)` if the target is not valid.
pub fn dereference_masked<'a, A>(
    source: &Object<'a, A>,
    raw: u64,
    mask: u64,
    target: Option<&str>,
) -> Result<Option<Object<'a, A>>, KobjError>
where
    A: AddressSpace,
{
    let target = match target {
        Some(target) => target,
        None => return Err(KobjError::MissingTarget),
    };

    let offset = mask_pointer(raw, mask);
    if offset.is_null() {
        return Ok(None);
    }

    let object = source.child(offset, target);
    if !object.check_valid()? {
        tracing::debug!(%offset, target, "masked pointer target is not valid");
        return Ok(None);
    }

    Ok(Some(object))
}

/// A tag-to-type lookup table.
#[derive(Debug, Clone, Copy)]
pub struct TagTable {
    /// Offset of the tag relative to the nominal structure start.
    pub offset: i64,

    /// Length of the tag in bytes.
    pub length: usize,

    /// Known tags and the structure types they select.
    pub entries: &'static [(&'static [u8], &'static str)],
}

impl TagTable {
    /// Returns the type selected by a tag.
    pub fn lookup(&self, tag: &[u8]) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(known, _)| *known == tag)
            .map(|(_, type_name)| *type_name)
    }
}

/// The outcome of a tag dispatch.
#[derive(Debug)]
pub enum Dispatch<'a, A>
where
    A: AddressSpace,
{
    /// The tag selected a concrete type.
    Resolved(Object<'a, A>),

    /// The tag is unknown or unreadable. The view should be treated as its
    /// generic type.
    Unresolvable {
        /// The tag that was read, empty if it could not be read.
        tag: SmallVec<[u8; 4]>,
    },
}

impl<'a, A> Dispatch<'a, A>
where
    A: AddressSpace,
{
    /// Returns the specialized view, if any.
    pub fn resolved(self) -> Option<Object<'a, A>> {
        match self {
            Self::Resolved(object) => Some(object),
            Self::Unresolvable { .. } => None,
        }
    }
}

/// Reads the tag of `view` and casts it to the type the tag selects.
///
/// The specialized view keeps the parent of `view`.
pub fn dispatch<'a, A>(view: &Object<'a, A>, table: &TagTable) -> Dispatch<'a, A>
where
    A: AddressSpace,
{
    let address = view.offset().offset(table.offset);

    let mut tag = SmallVec::<[u8; 4]>::from_elem(0, table.length);
    if let Err(err) = view.space().read(address, &mut tag) {
        tracing::debug!(%err, %address, "tag is not readable");
        return Dispatch::Unresolvable {
            tag: SmallVec::new(),
        };
    }

    match table.lookup(&tag) {
        Some(type_name) => Dispatch::Resolved(view.cast(type_name)),
        None => {
            tracing::trace!(tag = ?tag, %address, "unknown tag");
            Dispatch::Unresolvable { tag }
        }
    }
}

/// Casts a structure header to the body that follows it.
///
/// The body starts right after the header, whose size may be overridden by
/// a behavior. The resulting view has the header as its parent.
pub fn cast_body<'a, A>(header: &Object<'a, A>, target: &str) -> Result<Object<'a, A>, KobjError>
where
    A: AddressSpace,
{
    let offset = header.offset() + header.size()?;
    Ok(header.child(offset, target))
}
