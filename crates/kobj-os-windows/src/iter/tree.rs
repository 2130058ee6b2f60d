use std::{collections::HashSet, iter::FusedIterator};

use kobj_core::{
    AddressSpace, Class as _, KobjError, Object, Va,
    tagged::{self, Dispatch},
};

use crate::{VAD_TAGS, WindowsVad};

/// An iterator over a tree of virtual address descriptors.
///
/// Nodes are yielded in pre-order (the node, then its left subtree, then
/// its right subtree). Each node is specialized by its pool tag before its
/// children are read; a node with an unknown tag is yielded as a generic
/// `_MMVAD`. Null or unreadable children are empty subtrees, and a node
/// reachable twice is yielded only once.
pub struct VadIterator<'a, A>
where
    A: AddressSpace,
{
    /// Nodes still to visit, next last.
    stack: Vec<Object<'a, A>>,

    /// Offsets of the nodes already yielded.
    visited: HashSet<Va>,
}

impl<'a, A> VadIterator<'a, A>
where
    A: AddressSpace,
{
    /// Creates a new iterator starting at `root`.
    pub fn new(root: Option<Object<'a, A>>) -> Self {
        Self {
            stack: root.into_iter().collect(),
            visited: HashSet::new(),
        }
    }

    fn walk_next(&mut self) -> Result<Option<WindowsVad<'a, A>>, KobjError> {
        while let Some(node) = self.stack.pop() {
            if !self.visited.insert(node.offset()) {
                tracing::trace!(node = %node.offset(), "vad already visited");
                continue;
            }

            let node = match tagged::dispatch(&node, &VAD_TAGS) {
                Dispatch::Resolved(node) => node,
                Dispatch::Unresolvable { tag } => {
                    tracing::trace!(node = %node.offset(), ?tag, "unknown vad tag");
                    node
                }
            };

            let vad = WindowsVad::from_object(node);

            // Right first, so that the left subtree is walked first.
            for child in [vad.right_child()?, vad.left_child()?] {
                match child {
                    Some(child) if !self.visited.contains(&child.object().offset()) => {
                        self.stack.push(child.into());
                    }
                    _ => {}
                }
            }

            return Ok(Some(vad));
        }

        Ok(None)
    }
}

impl<'a, A> Iterator for VadIterator<'a, A>
where
    A: AddressSpace,
{
    type Item = Result<WindowsVad<'a, A>, KobjError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.walk_next().transpose()
    }
}

impl<A> FusedIterator for VadIterator<'_, A> where A: AddressSpace {}
