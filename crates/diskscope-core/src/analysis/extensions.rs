//! Per-extension size summaries.

use crate::model::TreeNode;
use std::collections::HashMap;

/// Number of extension groups kept in the final summary.
const MAX_GROUPS: usize = 15;

/// Bucket for files with no usable extension; dropped from the summary.
const NO_EXTENSION: &str = "<none>";

/// Aggregated totals for one file extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionGroup {
    /// Lower-cased extension without the dot.
    pub extension: String,
    /// Sum of logical sizes of all files with this extension.
    pub total_size: u64,
    /// Number of files with this extension.
    pub file_count: u64,
}

/// Group all files in the tree by extension, largest total first.
///
/// The extension is the lower-cased suffix after the final `.` in the
/// name, provided that dot is neither the first nor the last character
/// (so dotfiles and trailing dots don't count). Extensionless files are
/// bucketed as `<none>` and excluded from the returned summary, which
/// keeps the top 15 groups by total size.
pub fn extension_groups(root: &TreeNode) -> Vec<ExtensionGroup> {
    let mut buckets: HashMap<String, (u64, u64)> = HashMap::new();
    accumulate(root, &mut buckets);
    buckets.remove(NO_EXTENSION);

    let mut groups: Vec<ExtensionGroup> = buckets
        .into_iter()
        .map(|(extension, (total_size, file_count))| ExtensionGroup {
            extension,
            total_size,
            file_count,
        })
        .collect();
    groups.sort_by(|a, b| {
        b.total_size
            .cmp(&a.total_size)
            .then_with(|| a.extension.cmp(&b.extension))
    });
    groups.truncate(MAX_GROUPS);
    groups
}

fn accumulate(node: &TreeNode, buckets: &mut HashMap<String, (u64, u64)>) {
    for child in &node.children {
        if child.is_directory {
            accumulate(child, buckets);
        } else {
            let key = extension_of(&child.name)
                .map(str::to_ascii_lowercase)
                .unwrap_or_else(|| NO_EXTENSION.to_string());
            let slot = buckets.entry(key).or_insert((0, 0));
            slot.0 += child.size_bytes;
            slot.1 += 1;
        }
    }
}

/// The suffix after the final `.`, when that dot is neither the first nor
/// the last character of the name.
fn extension_of(name: &str) -> Option<&str> {
    let dot = name.rfind('.')?;
    if dot == 0 || dot + 1 == name.len() {
        return None;
    }
    Some(&name[dot + 1..])
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

    fn root_with(children: Vec<TreeNode>) -> TreeNode {
        let size = children.iter().map(|c| c.size_bytes).sum();
        TreeNode {
            name: CompactString::new(""),
            full_path: "/scan".to_string(),
            is_directory: true,
            size_bytes: size,
            children,
        }
    }

    #[test]
    fn extension_extraction_rules() {
        assert_eq!(extension_of("report.pdf"), Some("pdf"));
        assert_eq!(extension_of("archive.tar.gz"), Some("gz"));
        assert_eq!(extension_of(".bashrc"), None, "leading dot is not an extension");
        assert_eq!(extension_of("trailing."), None, "trailing dot is not an extension");
        assert_eq!(extension_of("Makefile"), None);
    }

    #[test]
    fn groups_aggregate_size_and_count() {
        let root = root_with(vec![
            file("a.rs", 100),
            file("b.rs", 150),
            file("logo.png", 300),
        ]);
        let groups = extension_groups(&root);

        let rs = groups.iter().find(|g| g.extension == "rs").unwrap();
        assert_eq!(rs.total_size, 250);
        assert_eq!(rs.file_count, 2);

        let png = groups.iter().find(|g| g.extension == "png").unwrap();
        assert_eq!(png.total_size, 300);
        assert_eq!(png.file_count, 1);
    }

    #[test]
    fn case_folds_extensions() {
        let root = root_with(vec![file("A.TXT", 10), file("b.txt", 20)]);
        let groups = extension_groups(&root);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].extension, "txt");
        assert_eq!(groups[0].file_count, 2);
    }

    #[test]
    fn extensionless_files_are_dropped() {
        let root = root_with(vec![file("Makefile", 500), file(".hidden", 40), file("x.c", 10)]);
        let groups = extension_groups(&root);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].extension, "c");
    }

    #[test]
    fn sorted_by_total_size_and_capped() {
        let mut files = Vec::new();
        for i in 0..20 {
            files.push(file(&format!("f.e{i:02}"), (i as u64 + 1) * 10));
        }
        let root = root_with(files);
        let groups = extension_groups(&root);
        assert_eq!(groups.len(), 15, "summary keeps the top 15 groups");
        assert!(groups.windows(2).all(|w| w[0].total_size >= w[1].total_size));
        assert_eq!(groups[0].extension, "e19");
    }

    #[test]
    fn empty_tree_yields_no_groups() {
        let root = root_with(vec![]);
        assert!(extension_groups(&root).is_empty());
    }
}
