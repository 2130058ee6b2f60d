use std::{collections::HashSet, iter::FusedIterator};

use kobj_core::{AddressSpace, KobjError, Object, Recover as _, Va};

/// An iterator for traversing list entries.
///
/// Iterate over entries in a linked list structure, specifically `LIST_ENTRY`,
/// yielding a view of the structure containing each entry.
///
/// The walk ends when it returns to the list head, at a null or unreadable
/// link, or at an entry that was already visited.
pub struct ListEntryIterator<'a, A>
where
    A: AddressSpace,
{
    /// The list head. Containing structures are its children.
    head: Object<'a, A>,

    /// The next link to visit.
    current: Option<Va>,

    /// Type of the containing structure.
    type_name: String,

    /// Offset of the link inside the containing structure.
    ///
    /// The offset is subtracted from the entry address to get the containing
    /// structure, similar to the `CONTAINING_RECORD` macro in the Windows
    /// kernel.
    link_offset: i64,

    /// Offset to the forward link pointer (`LIST_ENTRY.Flink`).
    flink_offset: i64,

    /// Links already visited.
    visited: HashSet<Va>,
}

impl<'a, A> ListEntryIterator<'a, A>
where
    A: AddressSpace,
{
    /// Creates a new list entry iterator.
    ///
    /// `head` is the `_LIST_ENTRY` heading the list, and `link_field` the
    /// member of `type_name` linking the entries together.
    pub fn new(head: Object<'a, A>, type_name: &str, link_field: &str) -> Result<Self, KobjError> {
        let profile = head.profile();
        let flink_offset = profile.field_offset("_LIST_ENTRY", "Flink")?;
        let link_offset = profile.field_offset(type_name, link_field)?;

        let current = head
            .space()
            .read_address(
                head.offset().offset(flink_offset),
                profile.pointer_width() as usize,
            )
            .recover()?;

        Ok(Self {
            head,
            current,
            type_name: type_name.into(),
            link_offset,
            flink_offset,
            visited: HashSet::new(),
        })
    }

    fn walk_next(&mut self) -> Result<Option<Object<'a, A>>, KobjError> {
        let link = match self.current.take() {
            Some(link) => link,
            None => return Ok(None),
        };

        if link.is_null() || link == self.head.offset() {
            return Ok(None);
        }

        if !self.visited.insert(link) {
            tracing::trace!(%link, "list entry already visited");
            return Ok(None);
        }

        self.current = self
            .head
            .space()
            .read_address(
                link.offset(self.flink_offset),
                self.head.profile().pointer_width() as usize,
            )
            .recover()?;

        Ok(Some(
            self.head
                .child(link.offset(-self.link_offset), &self.type_name),
        ))
    }
}

impl<'a, A> Iterator for ListEntryIterator<'a, A>
where
    A: AddressSpace,
{
    type Item = Result<Object<'a, A>, KobjError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.walk_next().transpose()
    }
}

impl<A> FusedIterator for ListEntryIterator<'_, A> where A: AddressSpace {}
