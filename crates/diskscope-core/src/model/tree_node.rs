//! The immutable output tree.

use compact_str::CompactString;

/// One node of the finished scan tree.
///
/// Constructed once by the tree builder after the entry stream is
/// exhausted and never mutated afterwards, so it can be handed across
/// threads without synchronisation. Children own their subtrees outright;
/// there are no parent pointers and no aliasing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    /// Final path component.
    pub name: CompactString,
    /// Full path from the scan root.
    pub full_path: String,
    /// `true` for directories.
    pub is_directory: bool,
    /// For files: the file's own logical size. For directories: the
    /// recursive aggregate of all descendant file sizes.
    pub size_bytes: u64,
    /// Direct children, sorted by `size_bytes` descending (stable by name
    /// on ties). Empty for files.
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Total number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> u64 {
        1 + self.children.iter().map(TreeNode::node_count).sum::<u64>()
    }

    /// Number of file (non-directory) nodes in this subtree.
    pub fn file_count(&self) -> u64 {
        let own = u64::from(!self.is_directory);
        own + self.children.iter().map(TreeNode::file_count).sum::<u64>()
    }
}
