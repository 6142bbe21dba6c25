//! Largest-files analysis.

use crate::model::TreeNode;

/// One entry in the "largest files" list. Directories are excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopItem {
    /// File name.
    pub name: String,
    /// Full path from the scan root.
    pub full_path: String,
    /// Logical size in bytes.
    pub size_bytes: u64,
    /// Always `false` — kept for symmetry with tree nodes.
    pub is_directory: bool,
}

/// Collect the `n` largest files in the tree.
///
/// The tree's children are already sorted by aggregated size, so a
/// depth-first walk that visits big subtrees first finds the heavy files
/// early; collecting `3n` candidates before sorting keeps the walk from
/// touching every node on large trees while still being safe against a
/// few big files hiding under small-looking directories.
pub fn top_files(root: &TreeNode, n: usize) -> Vec<TopItem> {
    if n == 0 {
        return Vec::new();
    }
    let mut candidates: Vec<&TreeNode> = Vec::with_capacity(n * 3);
    collect(root, n * 3, &mut candidates);

    candidates.sort_by(|a, b| {
        b.size_bytes
            .cmp(&a.size_bytes)
            .then_with(|| a.name.cmp(&b.name))
    });
    candidates
        .into_iter()
        .take(n)
        .map(|f| TopItem {
            name: f.name.to_string(),
            full_path: f.full_path.clone(),
            size_bytes: f.size_bytes,
            is_directory: false,
        })
        .collect()
}

fn collect<'t>(node: &'t TreeNode, cap: usize, out: &mut Vec<&'t TreeNode>) {
    for child in &node.children {
        if out.len() >= cap {
            return;
        }
        if child.is_directory {
            collect(child, cap, out);
        } else {
            out.push(child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compact_str::CompactString;

    fn file(name: &str, size: u64) -> TreeNode {
        TreeNode {
            name: CompactString::new(name),
            full_path: format!("/scan/{name}"),
            is_directory: false,
            size_bytes: size,
            children: Vec::new(),
        }
    }

    fn dir(name: &str, mut children: Vec<TreeNode>) -> TreeNode {
        children.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes));
        let size = children.iter().map(|c| c.size_bytes).sum();
        TreeNode {
            name: CompactString::new(name),
            full_path: format!("/scan/{name}"),
            is_directory: true,
            size_bytes: size,
            children,
        }
    }

    #[test]
    fn largest_files_come_first() {
        let root = dir(
            "",
            vec![
                file("small.txt", 100),
                file("big.bin", 9_000),
                file("medium.dat", 500),
            ],
        );
        let top = top_files(&root, 10);
        assert_eq!(top.len(), 3);
        assert_eq!(top[0].size_bytes, 9_000);
        assert_eq!(top[1].size_bytes, 500);
        assert_eq!(top[2].size_bytes, 100);
    }

    #[test]
    fn directories_are_excluded() {
        let root = dir(
            "",
            vec![dir("sub", vec![file("inner.bin", 4_000)]), file("top.bin", 1_000)],
        );
        let top = top_files(&root, 10);
        assert_eq!(top.len(), 2);
        assert!(top.iter().all(|t| !t.is_directory));
        assert_eq!(top[0].name, "inner.bin");
    }

    #[test]
    fn respects_n() {
        let files: Vec<TreeNode> = (0..10).map(|i| file(&format!("f{i}"), i * 10 + 10)).collect();
        let root = dir("", files);
        let top = top_files(&root, 3);
        assert_eq!(top.len(), 3);
        assert!(top[0].size_bytes >= top[1].size_bytes);
        assert!(top[1].size_bytes >= top[2].size_bytes);
    }

    #[test]
    fn ties_break_lexicographically() {
        let root = dir("", vec![file("zeta", 100), file("alpha", 100)]);
        let top = top_files(&root, 2);
        assert_eq!(top[0].name, "alpha");
        assert_eq!(top[1].name, "zeta");
    }

    #[test]
    fn empty_tree_and_n_zero() {
        let root = dir("", vec![]);
        assert!(top_files(&root, 5).is_empty());
        let root = dir("", vec![file("x", 10)]);
        assert!(top_files(&root, 0).is_empty());
    }
}
