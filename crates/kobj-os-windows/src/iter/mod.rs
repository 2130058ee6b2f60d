mod handle;
mod list;
mod tree;

pub use self::{handle::HandleTableIterator, list::ListEntryIterator, tree::VadIterator};
