//! # Windows kernel object overlays
//!
//! This crate layers Windows knowledge on top of `kobj-core`: overlays that
//! give the fields described by Windows debugging symbols their real
//! meaning, typed wrappers around the kernel structures, and walkers for
//! the structures that need more than a pointer chase to follow.
//!
//! ## Features
//!
//! - Overlays for the Windows kernel and crash dump structures
//! - Process introspection (PEB, loader lists, tokens, sessions, threads)
//! - Handle table enumeration down to the object headers
//! - VAD tree traversal with tag-based node specialization
//! - Object header decoding (optional headers, type names, bodies)
//!
//! ## Example
//!
//! ```no_run
//! # use std::rc::Rc;
//! # use kobj_core::{Class as _, KobjError, SparseMemory, Va};
//! # use kobj_os_windows::{WindowsProcess, WindowsProfile};
//! #
//! # fn example(profile: &WindowsProfile, memory: SparseMemory) -> Result<(), KobjError> {
//! let process = profile
//!     .object(Rc::new(memory), Va(0xfffffa8000c0e040), "_EPROCESS")
//!     .cast_into::<WindowsProcess<_>>();
//!
//! println!("{} {}", process.pid()?, process.image_file_name()?);
//!
//! for module in process.load_order_modules()? {
//!     println!("{:?}", module?.full_name()?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Memory images are read as they are: every structure reached through a
//! pointer is checked before use, and values that cannot be read are
//! reported as absent rather than as errors.

mod comps;
mod error;
mod iter;
mod overlay;
mod profile;

pub use self::{
    comps::*,
    error::WindowsError,
    iter::{HandleTableIterator, ListEntryIterator, VadIterator},
    overlay::{crash_overlays, windows_overlays},
    profile::WindowsProfile,
};
