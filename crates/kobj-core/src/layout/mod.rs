//! The layout registry.
//!
//! Base layouts describe structures the way the debugging symbols do.
//! Overlays correct them (a string instead of a byte array, a masked
//! pointer instead of a raw integer) and add fields the symbols lack, such
//! as a pool tag stored before the structure. Some field sizes cannot be
//! known statically and are evaluated against the structure instance at
//! access time.

mod profile;
mod types;

pub use self::{
    profile::{Profile, ProfileMetadata},
    types::{
        Expr, Field, FieldOverlay, Length, MemberValues, NativeType, Offset, Overlay,
        StructLayout, Type,
    },
};

#[cfg(test)]
mod tests;
