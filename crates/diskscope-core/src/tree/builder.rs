//! Streaming tree construction.
//!
//! The builder ingests entries in whatever order the source produces them,
//! reconstructs the hierarchy by id, and materialises the immutable
//! [`TreeNode`] tree once the stream is exhausted. It stores ids only —
//! no parent/child pointers — so out-of-order arrival costs nothing and
//! the finished tree is aliasing-free.

use crate::error::ScanError;
use crate::model::{Entry, TreeNode};
use compact_str::CompactString;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use tracing::{debug, warn};

/// Bound on parent-chain walks and tree depth. Chains deeper than this are
/// truncated (and the result flagged incomplete) instead of looping on
/// malformed linkage.
pub const MAX_TREE_DEPTH: usize = 100;

/// The NTFS root directory's fixed MFT record number — one of the root
/// detection sentinels.
pub const NTFS_ROOT_FILE_ID: u128 = 5;

/// Id given to a synthesized root when no entry ever claimed root.
const SYNTHETIC_ROOT_ID: u128 = u128::MAX;

/// Per-id bookkeeping. Lives only during construction.
struct NodeBuilder {
    name: CompactString,
    parent: u128,
    is_dir: bool,
    size: u64,
}

/// The finished tree plus the counters accumulated while building it.
#[derive(Debug)]
pub struct BuiltTree {
    pub root: TreeNode,
    pub total_files: u64,
    pub total_directories: u64,
    pub error_count: u64,
    /// Set when linkage was impossible somewhere (depth cap exceeded,
    /// cyclic parent references). The tree is still usable.
    pub incomplete: bool,
}

/// Streaming consumer of the entry stream.
///
/// State machine: accumulating until [`build_tree`](Self::build_tree),
/// which consumes the builder — building twice is unrepresentable.
pub struct TreeBuilder {
    root_path: PathBuf,
    root_segment: CompactString,
    nodes: FxHashMap<u128, NodeBuilder>,
    children: FxHashMap<u128, Vec<u128>>,
    visited: FxHashSet<u128>,
    root_file_id: Option<u128>,
    total_files: u64,
    total_directories: u64,
    error_count: u64,
    incomplete: bool,
}

impl TreeBuilder {
    /// Create a builder bound to the normalized scan root.
    pub fn new(root_path: &Path) -> Self {
        let root_segment: CompactString = root_path
            .file_name()
            .map(|n| n.to_string_lossy().as_ref().into())
            .unwrap_or_default();
        Self {
            root_path: root_path.to_path_buf(),
            root_segment,
            nodes: FxHashMap::default(),
            children: FxHashMap::default(),
            visited: FxHashSet::default(),
            root_file_id: None,
            total_files: 0,
            total_directories: 0,
            error_count: 0,
            incomplete: false,
        }
    }

    /// Ingest one entry.
    ///
    /// Duplicate ids are dropped silently: hard links, repeated records,
    /// and cyclic references all collapse to the first sighting, so each
    /// unique inode counts exactly once.
    pub fn on_entry(&mut self, entry: Entry) {
        if !self.visited.insert(entry.file_id) {
            return;
        }

        if entry.is_directory() {
            self.total_directories += 1;
        } else {
            self.total_files += 1;
        }

        let is_root = self.root_file_id.is_none() && self.is_root_entry(&entry);
        if is_root {
            self.root_file_id = Some(entry.file_id);
        }

        let is_dir = entry.is_directory();
        self.nodes.insert(
            entry.file_id,
            NodeBuilder {
                name: entry.name,
                parent: entry.parent_file_id,
                is_dir,
                size: if is_dir { 0 } else { entry.size },
            },
        );

        if !is_root {
            self.children
                .entry(entry.parent_file_id)
                .or_default()
                .push(entry.file_id);
        }
    }

    /// Record a recoverable fault from the source. Never aborts the scan.
    pub fn on_issue(&mut self, err: &ScanError) {
        self.error_count += 1;
        warn!("scan issue: {err}");
    }

    /// Fill in sizes for file entries that arrived without one (the MFT
    /// source — USN records carry no sizes).
    ///
    /// Reconstructs each file's full path and stats it; the stat syscalls
    /// run on the rayon pool since they dominate and parallelise well on
    /// SSDs. Stat failures count as errors and leave the size at 0.
    pub fn hydrate_file_sizes(&mut self) {
        let targets: Vec<(u128, PathBuf)> = self
            .nodes
            .iter()
            .filter(|(_, nb)| !nb.is_dir && nb.size == 0)
            .filter_map(|(&id, _)| self.reconstruct_path(id).map(|p| (id, p)))
            .collect();

        if targets.is_empty() {
            return;
        }
        debug!("hydrating sizes for {} files", targets.len());

        let stats: Vec<(u128, u64, bool)> = targets
            .par_iter()
            .map(|(id, path)| match std::fs::symlink_metadata(path) {
                Ok(meta) => (*id, meta.len(), false),
                Err(_) => (*id, 0, true),
            })
            .collect();

        let mut failures: u64 = 0;
        for (id, size, failed) in stats {
            if failed {
                failures += 1;
                continue;
            }
            if let Some(nb) = self.nodes.get_mut(&id) {
                nb.size = size;
            }
        }
        self.error_count += failures;
        if failures > 0 {
            debug!("{failures} files could not be statted during hydration");
        }
    }

    /// Materialise the tree. Called exactly once, after the stream ends.
    ///
    /// Synthesizes a root when none was observed, re-parents orphans under
    /// the root, and builds bottom-up with children sorted by aggregated
    /// size (name-ascending on ties). Nodes unreachable from the root
    /// (cyclic linkage) are attached under the root and flag the result
    /// incomplete, so every ingested id appears exactly once.
    pub fn build_tree(mut self) -> BuiltTree {
        let root_id = match self.root_file_id {
            Some(id) => id,
            None => {
                debug!(
                    "no root entry observed — synthesizing root for {}",
                    self.root_path.display()
                );
                self.nodes.insert(
                    SYNTHETIC_ROOT_ID,
                    NodeBuilder {
                        name: self.root_segment.clone(),
                        parent: SYNTHETIC_ROOT_ID,
                        is_dir: true,
                        size: 0,
                    },
                );
                SYNTHETIC_ROOT_ID
            }
        };

        // Entries whose parent never arrived hang off the root instead of
        // being lost.
        let orphans: Vec<u128> = self
            .nodes
            .iter()
            .filter(|&(&id, nb)| id != root_id && !self.nodes.contains_key(&nb.parent))
            .map(|(&id, _)| id)
            .collect();
        if !orphans.is_empty() {
            debug!("{} orphan entries re-parented under the scan root", orphans.len());
            self.children.entry(root_id).or_default().extend(orphans);
        }

        let root_path_str = self.root_path.to_string_lossy().into_owned();
        let mut incomplete = self.incomplete;

        let mut root = build_node(
            &mut self.nodes,
            &self.children,
            root_id,
            root_path_str.clone(),
            0,
            &mut incomplete,
        )
        .unwrap_or_else(|| TreeNode {
            name: self.root_segment.clone(),
            full_path: root_path_str.clone(),
            is_directory: true,
            size_bytes: 0,
            children: Vec::new(),
        });

        // Anything still in the map is unreachable from the root — cyclic
        // parent chains or children severed by the depth cap. Attach each
        // remnant under the root so no observed id is dropped.
        if !self.nodes.is_empty() {
            incomplete = true;
            warn!(
                "{} entries unreachable from the root — attaching under {}",
                self.nodes.len(),
                root_path_str
            );
            while let Some(id) = self.nodes.keys().next().copied() {
                let leaf_path = match self.nodes.get(&id) {
                    Some(nb) => join_path(&root_path_str, &nb.name),
                    None => root_path_str.clone(),
                };
                if let Some(node) = build_node(
                    &mut self.nodes,
                    &self.children,
                    id,
                    leaf_path,
                    1,
                    &mut incomplete,
                ) {
                    root.size_bytes += node.size_bytes;
                    root.children.push(node);
                }
            }
            sort_children(&mut root.children);
        }

        BuiltTree {
            root,
            total_files: self.total_files,
            total_directories: self.total_directories,
            error_count: self.error_count,
            incomplete,
        }
    }

    /// Root detection: empty name, self-parenting, the NTFS sentinel, or a
    /// directory named like the scan root's final segment.
    fn is_root_entry(&self, e: &Entry) -> bool {
        e.name.is_empty()
            || e.parent_file_id == e.file_id
            || e.file_id == NTFS_ROOT_FILE_ID
            || (e.is_directory() && e.name.eq_ignore_ascii_case(&self.root_segment))
    }

    /// Walk the parent chain to rebuild a node's full path, bounded at
    /// [`MAX_TREE_DEPTH`]. Orphan chains resolve to a synthetic path under
    /// the scan root; cyclic chains return `None`.
    fn reconstruct_path(&self, id: u128) -> Option<PathBuf> {
        let mut segments: Vec<&str> = Vec::new();
        let mut current = id;

        for _ in 0..=MAX_TREE_DEPTH {
            let nb = self.nodes.get(&current)?;
            if Some(current) == self.root_file_id {
                break;
            }
            segments.push(nb.name.as_str());
            if nb.parent == current || !self.nodes.contains_key(&nb.parent) {
                break;
            }
            current = nb.parent;
        }
        if segments.len() > MAX_TREE_DEPTH {
            return None;
        }

        let mut path = self.root_path.clone();
        for seg in segments.iter().rev() {
            path.push(seg);
        }
        Some(path)
    }
}

/// Post-order construction of one subtree. Each id is *taken* out of the
/// map as it is built, so duplicate linkage and cycles terminate naturally
/// — a second visit finds nothing.
fn build_node(
    nodes: &mut FxHashMap<u128, NodeBuilder>,
    children: &FxHashMap<u128, Vec<u128>>,
    id: u128,
    full_path: String,
    depth: usize,
    incomplete: &mut bool,
) -> Option<TreeNode> {
    let nb = nodes.remove(&id)?;
    let mut aggregate = if nb.is_dir { 0 } else { nb.size };
    let mut child_nodes: Vec<TreeNode> = Vec::new();

    if let Some(child_ids) = children.get(&id) {
        if depth >= MAX_TREE_DEPTH {
            if !child_ids.is_empty() {
                warn!("depth cap reached at {full_path} — children truncated");
                *incomplete = true;
            }
        } else {
            child_nodes.reserve(child_ids.len());
            for &child_id in child_ids {
                let child_name = match nodes.get(&child_id) {
                    Some(c) => c.name.clone(),
                    None => continue, // already built elsewhere (duplicate linkage)
                };
                let child_path = join_path(&full_path, &child_name);
                if let Some(node) =
                    build_node(nodes, children, child_id, child_path, depth + 1, incomplete)
                {
                    aggregate += node.size_bytes;
                    child_nodes.push(node);
                }
            }
        }
    }

    sort_children(&mut child_nodes);
    Some(TreeNode {
        name: nb.name,
        full_path,
        is_directory: nb.is_dir,
        size_bytes: aggregate,
        children: child_nodes,
    })
}

/// Aggregated size descending, name ascending on ties (stable).
fn sort_children(children: &mut [TreeNode]) {
    children.sort_by(|a, b| {
        b.size_bytes
            .cmp(&a.size_bytes)
            .then_with(|| a.name.cmp(&b.name))
    });
}

fn join_path(parent: &str, name: &str) -> String {
    if name.is_empty() {
        return parent.to_string();
    }
    if parent.ends_with(MAIN_SEPARATOR) {
        format!("{parent}{name}")
    } else {
        format!("{parent}{MAIN_SEPARATOR}{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Entry;

    fn builder() -> TreeBuilder {
        TreeBuilder::new(Path::new("/scan"))
    }

    fn dir(id: u128, parent: u128, name: &str) -> Entry {
        Entry::directory(id, parent, CompactString::new(name))
    }

    fn file(id: u128, parent: u128, name: &str, size: u64) -> Entry {
        Entry::file(id, parent, CompactString::new(name), size)
    }

    fn build(entries: Vec<Entry>) -> BuiltTree {
        let mut b = builder();
        for e in entries {
            b.on_entry(e);
        }
        b.build_tree()
    }

    // ── Concrete end-to-end scenarios ────────────────────────────────────

    /// Only a root entry: a single node with no children and zero size.
    #[test]
    fn root_only() {
        let t = build(vec![dir(1, 1, "")]);
        assert_eq!(t.root.name, "");
        assert_eq!(t.root.size_bytes, 0);
        assert!(t.root.children.is_empty());
        assert!(!t.incomplete);
    }

    /// A single file under the root aggregates into the root size.
    #[test]
    fn single_file() {
        let t = build(vec![dir(1, 1, ""), file(2, 1, "a.txt", 1024)]);
        assert_eq!(t.root.size_bytes, 1024);
        assert_eq!(t.root.children.len(), 1);
        assert_eq!(t.root.children[0].name, "a.txt");
        assert_eq!(t.root.children[0].size_bytes, 1024);
        assert_eq!(t.root.children[0].full_path, "/scan/a.txt");
    }

    /// Nested directories aggregate bottom-up, children sorted by size.
    #[test]
    fn nested_aggregation() {
        let t = build(vec![
            dir(1, 1, ""),
            dir(2, 1, "folder1"),
            dir(3, 2, "folder2"),
            file(4, 3, "deep.txt", 2048),
            file(5, 2, "another.txt", 1024),
        ]);
        assert_eq!(t.root.size_bytes, 3072);
        assert_eq!(t.root.children.len(), 1);

        let folder1 = &t.root.children[0];
        assert_eq!(folder1.name, "folder1");
        assert_eq!(folder1.size_bytes, 3072);
        assert_eq!(folder1.children.len(), 2);
        // folder2 (2048) sorts before another.txt (1024).
        assert_eq!(folder1.children[0].name, "folder2");
        assert_eq!(folder1.children[0].size_bytes, 2048);
        assert_eq!(folder1.children[1].name, "another.txt");
        assert_eq!(folder1.children[1].size_bytes, 1024);
    }

    /// A duplicate file id is absorbed — no duplication, no double count.
    #[test]
    fn duplicate_id_absorbed() {
        let t = build(vec![
            dir(1, 1, ""),
            file(2, 1, "t.txt", 1024),
            file(2, 1, "dup.txt", 2048),
        ]);
        assert_eq!(t.root.size_bytes, 1024);
        assert_eq!(t.root.children.len(), 1);
        assert_eq!(t.root.children[0].name, "t.txt");
        assert_eq!(t.total_files, 1);
    }

    /// An entry whose parent never arrives is attached under the root.
    #[test]
    fn orphan_attaches_under_root() {
        let t = build(vec![dir(1, 1, ""), dir(3, 2, "orphan_child")]);
        assert_eq!(t.root.size_bytes, 0);
        assert_eq!(t.root.children.len(), 1);
        assert_eq!(t.root.children[0].name, "orphan_child");
        assert_eq!(t.root.children[0].full_path, "/scan/orphan_child");
    }

    /// 10 000 flat files all present exactly once, sizes summed.
    #[test]
    fn flat_ten_thousand_files() {
        let mut entries = vec![dir(1, 1, "")];
        for i in 0..10_000u128 {
            entries.push(file(10 + i, 1, &format!("f{i}.bin"), 1024));
        }
        let t = build(entries);
        assert_eq!(t.root.size_bytes, 10_485_760);
        assert_eq!(t.root.children.len(), 10_000);
        assert_eq!(t.root.file_count(), 10_000);
    }

    // ── Ordering and arrival-order robustness ────────────────────────────

    /// Children arriving before their parents still link correctly.
    #[test]
    fn out_of_order_arrival() {
        let t = build(vec![
            file(4, 3, "deep.txt", 2048),
            dir(3, 2, "inner"),
            dir(2, 1, "outer"),
            dir(1, 1, ""),
        ]);
        assert_eq!(t.root.size_bytes, 2048);
        let outer = &t.root.children[0];
        let inner = &outer.children[0];
        assert_eq!(inner.children[0].full_path, "/scan/outer/inner/deep.txt");
    }

    /// Same entry sequence twice produces identical trees.
    #[test]
    fn building_is_deterministic() {
        let entries = || {
            vec![
                dir(1, 1, ""),
                dir(2, 1, "b"),
                dir(3, 1, "a"),
                file(4, 2, "x.bin", 512),
                file(5, 3, "y.bin", 512),
            ]
        };
        let t1 = build(entries());
        let t2 = build(entries());
        assert_eq!(t1.root, t2.root);
    }

    /// Equal sizes tie-break by name ascending.
    #[test]
    fn size_ties_sorted_by_name() {
        let t = build(vec![
            dir(1, 1, ""),
            file(2, 1, "zeta.bin", 100),
            file(3, 1, "alpha.bin", 100),
            file(4, 1, "mid.bin", 200),
        ]);
        let names: Vec<&str> = t.root.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["mid.bin", "alpha.bin", "zeta.bin"]);
    }

    // ── Depth bounds and malformed linkage ───────────────────────────────

    /// A 100-deep chain resolves completely.
    #[test]
    fn deep_chain_resolves() {
        let mut entries = vec![dir(1, 1, "")];
        for i in 0..100u128 {
            // ids 2..=101, each nested in the previous
            let id = 2 + i;
            let parent = if i == 0 { 1 } else { 1 + i };
            entries.push(dir(id, parent, &format!("d{i}")));
        }
        let t = build(entries);
        assert!(!t.incomplete);
        assert_eq!(t.root.node_count(), 101);
    }

    /// Chains past the depth cap are truncated without crashing, and the
    /// severed nodes still appear (under the root) rather than vanishing.
    #[test]
    fn over_deep_chain_truncates() {
        let mut entries = vec![dir(1, 1, "")];
        for i in 0..150u128 {
            let id = 2 + i;
            let parent = if i == 0 { 1 } else { 1 + i };
            entries.push(dir(id, parent, &format!("d{i}")));
        }
        let t = build(entries);
        assert!(t.incomplete);
        // Every observed id is somewhere in the output exactly once.
        assert_eq!(t.root.node_count(), 151);
    }

    /// Cyclic parent references terminate and flag the tree incomplete.
    #[test]
    fn cycle_does_not_hang() {
        let t = build(vec![
            dir(1, 1, ""),
            dir(10, 11, "a"),
            dir(11, 10, "b"),
            file(12, 10, "trapped.bin", 64),
        ]);
        assert!(t.incomplete);
        // All four ids appear exactly once.
        assert_eq!(t.root.node_count(), 4);
        assert_eq!(t.root.size_bytes, 64);
    }

    /// Aggregation invariant: every directory's size equals the sum of its
    /// children's sizes (files contribute their own size).
    #[test]
    fn aggregation_invariant_holds() {
        fn check(node: &TreeNode) {
            if node.is_directory {
                let sum: u64 = node.children.iter().map(|c| c.size_bytes).sum();
                assert_eq!(node.size_bytes, sum, "at {}", node.full_path);
            }
            for c in &node.children {
                check(c);
            }
        }
        let t = build(vec![
            dir(1, 1, ""),
            dir(2, 1, "a"),
            dir(3, 2, "b"),
            file(4, 3, "x", 10),
            file(5, 2, "y", 20),
            file(6, 1, "z", 30),
        ]);
        check(&t.root);
        assert_eq!(t.root.size_bytes, 60);
    }

    /// A synthesized root appears when no entry claims root.
    #[test]
    fn missing_root_is_synthesized() {
        let t = build(vec![file(7, 42, "stray.bin", 128)]);
        assert_eq!(t.root.name, "scan");
        assert!(t.root.is_directory);
        assert_eq!(t.root.size_bytes, 128);
        assert_eq!(t.root.children.len(), 1);
    }

    /// Issue recording increments the error count and never aborts.
    #[test]
    fn issues_are_counted() {
        let mut b = builder();
        b.on_entry(dir(1, 1, ""));
        b.on_issue(&ScanError::AccessDenied {
            path: PathBuf::from("/scan/locked"),
        });
        b.on_issue(&ScanError::corrupt_record("short record"));
        let t = b.build_tree();
        assert_eq!(t.error_count, 2);
    }

    /// NTFS sentinel id 5 is recognised as root.
    #[test]
    fn ntfs_sentinel_root() {
        let t = build(vec![
            dir(5, 5, ""),
            dir(30, 5, "Windows"),
            file(31, 30, "notepad.exe", 2_000),
        ]);
        assert_eq!(t.root.size_bytes, 2_000);
        assert_eq!(t.root.children[0].name, "Windows");
    }
}
