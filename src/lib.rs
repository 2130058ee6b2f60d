//! Kernel object overlays and introspection over raw memory images.
//!
//! The core types live in [`kobj_core`] and are re-exported at the crate
//! root. Operating-system specific overlays and walkers are available under
//! [`os`], gated by features.

pub use kobj_core::*;

/// Operating-system specific overlays.
pub mod os {
    #[cfg(feature = "os-windows")]
    pub use kobj_os_windows as windows;
}
