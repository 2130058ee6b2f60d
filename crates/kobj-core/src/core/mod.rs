mod address;
pub(crate) mod macros;

pub use self::address::{Pa, Va};
