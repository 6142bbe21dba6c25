//! Data model — the entry record, the immutable output tree, and
//! formatting helpers.

pub mod entry;
pub mod size;
pub mod tree_node;

pub use entry::{filetime_from_system_time, Entry, FileAttributes};
pub use tree_node::TreeNode;
