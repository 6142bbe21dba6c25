//! Progress snapshots and the final scan result.

use crate::analysis::{ExtensionGroup, TopItem};
use crate::model::TreeNode;
use crate::platform::DriveStats;
use std::time::Duration;

/// Which stage of the scan a progress snapshot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    /// Ingesting the entry stream.
    Scanning,
    /// Stream exhausted; materialising the tree.
    BuildingTree,
    /// Running post-scan analyzers.
    Analyzing,
    /// Final snapshot; the result is about to be returned.
    Complete,
}

/// A progress snapshot, emitted only by the coordinator.
///
/// `percent` is non-decreasing across a successful scan and reaches
/// exactly 100 on the final snapshot. The host callback must not block;
/// snapshots can arrive at up to 10 Hz.
#[derive(Debug, Clone)]
pub struct ScanProgress {
    /// Estimated completion, 0–100.
    pub percent: f32,
    /// Entries handed to the builder so far.
    pub files_processed: u64,
    /// Wall-clock time since the scan started.
    pub elapsed: Duration,
    /// Name of the most recently processed entry, when one is available.
    pub current_path: Option<String>,
    /// Current stage.
    pub phase: ScanPhase,
}

/// Counters describing the finished scan.
#[derive(Debug, Clone)]
pub struct ScanStats {
    /// Unique files ingested.
    pub files: u64,
    /// Unique directories ingested.
    pub directories: u64,
    /// Total scan duration.
    pub elapsed: Duration,
    /// Which source produced the stream (`"ntfs-mft"` / `"directory-walk"`).
    pub strategy: &'static str,
    /// Recoverable faults encountered (access denied, corrupt records,
    /// failed stats).
    pub error_count: u64,
    /// Set when tree linkage was imperfect (depth cap, cycles); the tree
    /// is still complete in the sense that every observed id is present.
    pub incomplete: bool,
}

/// Everything a scan produces.
#[derive(Debug, Clone)]
pub struct ScanResult {
    /// Volume capacity, sampled before scanning began.
    pub drive: DriveStats,
    /// Root of the aggregated tree.
    pub root: TreeNode,
    /// The largest individual files, size-descending.
    pub top_files: Vec<TopItem>,
    /// Per-extension totals, size-descending.
    pub by_extension: Vec<ExtensionGroup>,
    /// Scan counters.
    pub stats: ScanStats,
}
