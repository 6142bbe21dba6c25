//! Diskscope core — volume scanning, tree building, and analysis.
//!
//! This crate contains all scanning logic with zero UI dependencies. It is
//! designed to be reusable across different frontends (CLI, GUI, services).
//!
//! # Modules
//!
//! - [`model`] — the entry record and the immutable output tree.
//! - [`source`] — scan strategies: NTFS MFT fast path and portable
//!   directory enumeration, behind one sealed contract.
//! - [`tree`] — streaming tree builder (arbitrary-order ingestion,
//!   id-based linkage, bottom-up aggregation).
//! - [`scan`] — the coordinator: progress, cancellation, fallback, and
//!   the public entry points [`scan::scan`] / [`scan::start_scan`].
//! - [`analysis`] — post-scan analyzers (largest files, extension groups).
//! - [`platform`] — volume capacity queries and privilege checks.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::atomic::AtomicBool;
//! use std::sync::Arc;
//!
//! let cancel = Arc::new(AtomicBool::new(false));
//! let mut on_progress = |p: diskscope_core::ScanProgress| {
//!     eprintln!("{:.0}% ({} entries)", p.percent, p.files_processed);
//! };
//! let result = diskscope_core::scan(Path::new("/var"), &mut on_progress, &cancel)?;
//! println!("total: {} bytes", result.root.size_bytes);
//! # Ok::<(), diskscope_core::ScanError>(())
//! ```

pub mod analysis;
pub mod error;
pub mod model;
pub mod platform;
pub mod scan;
pub mod source;
pub mod tree;

pub use analysis::{ExtensionGroup, TopItem};
pub use error::ScanError;
pub use model::{Entry, FileAttributes, TreeNode};
pub use platform::DriveStats;
pub use scan::{
    scan, start_scan, ScanHandle, ScanPhase, ScanProgress, ScanResult, ScanStats,
};
