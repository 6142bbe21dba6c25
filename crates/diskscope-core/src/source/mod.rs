//! Scan sources — producers of the entry stream.
//!
//! Two strategies share one contract:
//! - **MFT** (Windows, NTFS, elevated): streams USN records straight out of
//!   the Master File Table, bypassing directory walking entirely.
//! - **Directory** (portable): parallel single-pass directory enumeration.
//!
//! The factory in [`select_source`] is the only place a strategy is picked;
//! everything downstream is parameterised by [`ScanSource`].

pub mod directory;
#[cfg(windows)]
pub mod mft;

use crate::error::ScanError;
use crate::model::Entry;
use crossbeam_channel::Sender;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::OnceLock;
use tracing::info;

/// Environment variable that forces the portable directory source.
pub const FORCE_DIRECTORY_SCAN_ENV: &str = "FORCE_DIRECTORY_SCAN";

/// Environment variable enabling verbose per-batch logging in the sources.
pub const SCANNER_DEBUG_ENV: &str = "SCANNER_DEBUG";

/// What a source pushes down the stream: entries, or recoverable issues
/// destined for the builder's error sink.
#[derive(Debug)]
pub enum SourceItem {
    /// One filesystem record.
    Entry(Entry),
    /// A recoverable fault (access denied, corrupt record). The scan
    /// continues; the builder counts and logs it.
    Issue(ScanError),
}

/// A scan strategy bound to one volume root.
///
/// The stream a source produces is finite, not restartable, and carries no
/// ordering guarantee. `run` consumes the source; terminal states are
/// final.
pub enum ScanSource {
    /// NTFS Master File Table fast path.
    #[cfg(windows)]
    Mft(mft::MftSource),
    /// Portable directory enumeration.
    Directory(directory::DirectorySource),
}

impl ScanSource {
    /// Human-readable strategy name.
    pub fn description(&self) -> &'static str {
        match self {
            #[cfg(windows)]
            Self::Mft(_) => "ntfs-mft",
            Self::Directory(_) => "directory-walk",
        }
    }

    /// Best-effort upper bound on the entry count, for progress
    /// estimation. 0 means unknown.
    pub fn estimate_entry_count(&self) -> u64 {
        match self {
            #[cfg(windows)]
            Self::Mft(s) => s.estimate_entry_count(),
            Self::Directory(_) => 0,
        }
    }

    /// Whether emitted entries carry real sizes. USN records do not, so
    /// the MFT path needs the builder's size-hydration pass afterwards.
    pub fn populates_sizes(&self) -> bool {
        match self {
            #[cfg(windows)]
            Self::Mft(_) => false,
            Self::Directory(_) => true,
        }
    }

    /// Drive the stream to completion, pushing items into `tx`.
    ///
    /// Returns early with `Ok` when the receiver hangs up, and checks
    /// `cancel` throughout. A mid-stream volume-control failure on the MFT
    /// path surfaces as `SourceUnavailable` so the coordinator can fall
    /// back.
    pub fn run(self, tx: &Sender<SourceItem>, cancel: &AtomicBool) -> Result<(), ScanError> {
        match self {
            #[cfg(windows)]
            Self::Mft(s) => s.run(tx, cancel),
            Self::Directory(s) => s.run(tx, cancel),
        }
    }
}

/// Pick the optimal source for `root`.
///
/// MFT is selected only when the host is Windows, the volume is NTFS, the
/// process is elevated, and a probe volume-open succeeds; every probe
/// failure is consumed here (logged, fall back). `FORCE_DIRECTORY_SCAN=1`
/// skips the probe entirely.
pub fn select_source(root: &Path) -> ScanSource {
    if force_directory_scan() {
        info!("{FORCE_DIRECTORY_SCAN_ENV}=1 — using directory source");
        return ScanSource::Directory(directory::DirectorySource::new(root.to_path_buf()));
    }

    #[cfg(windows)]
    match mft::MftSource::probe(root) {
        Ok(source) => {
            info!(
                "MFT source selected for {} (~{} records)",
                root.display(),
                source.estimate_entry_count()
            );
            return ScanSource::Mft(source);
        }
        Err(e) => {
            info!("MFT source unavailable ({e}) — falling back to directory walk");
        }
    }

    ScanSource::Directory(directory::DirectorySource::new(root.to_path_buf()))
}

fn force_directory_scan() -> bool {
    std::env::var(FORCE_DIRECTORY_SCAN_ENV).as_deref() == Ok("1")
}

/// `true` when `SCANNER_DEBUG=1`. Read once per process.
pub(crate) fn debug_batches() -> bool {
    static FLAG: OnceLock<bool> = OnceLock::new();
    *FLAG.get_or_init(|| std::env::var(SCANNER_DEBUG_ENV).as_deref() == Ok("1"))
}
