use std::iter::FusedIterator;

use kobj_core::{AddressSpace, Class as _, KobjError, Object, Recover as _, Va};

use crate::{WindowsHandleTable, WindowsHandleTableEntry, WindowsObjectHeader};

/// Handle values are multiples of four.
const HANDLE_VALUE_INC: u64 = 4;

/// A table of the handle table tree still being walked.
#[derive(Debug, Clone, Copy)]
struct Frame {
    table: Va,
    level: u64,
    index: u64,
}

/// An iterator over the object headers referenced by a Windows handle
/// table.
///
/// Tables above level 0 hold pointers to the tables below them; level 0
/// tables hold `_HANDLE_TABLE_ENTRY` structures. An unreadable slot or
/// entry ends the table it belongs to. A null slot is an empty subtree.
/// Entries without a typed object header are skipped.
///
/// # Implementation Details
///
/// The handle value of an entry is its index in the level 0 table plus the
/// capacity of the level 0 tables already walked or skipped, times four.
pub struct HandleTableIterator<'a, A>
where
    A: AddressSpace,
{
    /// The `_HANDLE_TABLE`, parent of every entry.
    handle_table: Object<'a, A>,

    /// Tables being walked, innermost last.
    stack: Vec<Frame>,

    /// Number of level 0 tables already walked or skipped.
    depth: u64,

    /// Number of pointer slots in a table above level 0.
    slot_count: u64,

    /// Number of entries in a level 0 table.
    entry_count: u64,

    /// Size of a `_HANDLE_TABLE_ENTRY`.
    entry_size: u64,
}

impl<'a, A> HandleTableIterator<'a, A>
where
    A: AddressSpace,
{
    /// Creates a new handle table iterator.
    pub fn new(handle_table: &WindowsHandleTable<'a, A>) -> Result<Self, KobjError> {
        let object = handle_table.object().clone();
        let profile = object.profile();

        let entry_size = profile.type_size(WindowsHandleTableEntry::<A>::TYPE_NAME)?;
        if entry_size == 0 {
            return Err(KobjError::Implausible("handle table entry size"));
        }

        let pointer_width = profile.pointer_width();
        if pointer_width == 0 {
            return Err(KobjError::Implausible("pointer width"));
        }

        let page_size = profile.page_size();
        let slot_count = page_size / pointer_width;
        let entry_count = page_size / entry_size;

        let base = handle_table.base()?;
        let level = handle_table.levels()?;

        tracing::trace!(%base, level, "walking handle table");

        let mut stack = Vec::new();
        if !base.is_null() {
            stack.push(Frame {
                table: base,
                level,
                index: 0,
            });
        }

        Ok(Self {
            handle_table: object,
            stack,
            depth: 0,
            slot_count,
            entry_count,
            entry_size,
        })
    }

    /// Ends the innermost table.
    fn leave(&mut self) {
        if let Some(frame) = self.stack.pop()
            && frame.level == 0
        {
            self.depth = self.depth.saturating_add(1);
        }
    }

    /// Walks to the next object header.
    fn walk_next(&mut self) -> Result<Option<WindowsObjectHeader<'a, A>>, KobjError> {
        let pointer_width = self.handle_table.profile().pointer_width();

        while let Some(frame) = self.stack.last_mut() {
            let Frame {
                table,
                level,
                index,
            } = *frame;

            frame.index += 1;

            if level > 0 {
                if index >= self.slot_count {
                    self.leave();
                    continue;
                }

                let slot = table + index * pointer_width;
                let next = self
                    .handle_table
                    .space()
                    .read_address(slot, pointer_width as usize)
                    .recover()?;

                match next {
                    Some(next) if next.is_null() => {
                        tracing::trace!(%slot, "empty slot");
                        let skipped = self.slot_count.saturating_pow((level - 1) as u32);
                        self.depth = self.depth.saturating_add(skipped);
                    }
                    Some(next) => {
                        tracing::trace!(%slot, %next, level = level - 1, "descending");
                        self.stack.push(Frame {
                            table: next,
                            level: level - 1,
                            index: 0,
                        });
                    }
                    None => {
                        tracing::trace!(%slot, "end of table");
                        self.leave();
                    }
                }

                continue;
            }

            if index >= self.entry_count {
                self.leave();
                continue;
            }

            let entry = self.handle_table.child(
                table + index * self.entry_size,
                WindowsHandleTableEntry::<A>::TYPE_NAME,
            );

            if !entry.check_valid()? {
                tracing::trace!(entry = %entry.offset(), "end of table");
                self.leave();
                continue;
            }

            let handle_value = self
                .depth
                .saturating_mul(self.entry_count)
                .saturating_add(index)
                .saturating_mul(HANDLE_VALUE_INC);

            let entry = WindowsHandleTableEntry::from_object(entry);
            let header = match entry.object_header(handle_value)? {
                Some(header) => header,
                None => continue,
            };

            if !header.is_typed().recover()?.unwrap_or(false) {
                continue;
            }

            return Ok(Some(header));
        }

        Ok(None)
    }
}

impl<'a, A> Iterator for HandleTableIterator<'a, A>
where
    A: AddressSpace,
{
    type Item = Result<WindowsObjectHeader<'a, A>, KobjError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.walk_next().transpose()
    }
}

impl<A> FusedIterator for HandleTableIterator<'_, A> where A: AddressSpace {}
