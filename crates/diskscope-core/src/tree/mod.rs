//! Streaming tree construction from the entry stream.

pub mod builder;

pub use builder::{BuiltTree, TreeBuilder, MAX_TREE_DEPTH, NTFS_ROOT_FILE_ID};
