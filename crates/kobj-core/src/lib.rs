//! Core kernel object overlay functionality.
//!
//! This crate interprets raw kernel memory as typed structures. A
//! [`Profile`] holds the structure layouts of one kernel build, corrected by
//! [`Overlay`]s. An [`Object`] binds a layout to an [`AddressSpace`] and an
//! offset and exposes its members as [`Value`]s. The [`tagged`] module turns
//! opaque references (masked pointers, tag-selected unions, headers
//! preceding a body) into concrete views.
//!
//! Errors caused by the memory contents (unmapped pages, implausible
//! counts) are recoverable; see [`Recover`].

mod behavior;
mod core;
mod error;
pub mod layout;
pub mod memory;
mod object;
mod space;
pub mod tagged;

pub use self::{
    behavior::{Behavior, Class},
    core::{Pa, Va},
    error::{KobjError, Recover},
    layout::{
        Expr, Field, FieldOverlay, Length, MemberValues, NativeType, Offset, Overlay, Profile,
        ProfileMetadata, StructLayout, Type,
    },
    memory::{SparseMemory, SparseMemoryBuilder},
    object::{Array, Object, Pointer, Value, WinTimeStamp},
    space::AddressSpace,
};
