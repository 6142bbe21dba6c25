//! The scan coordinator.
//!
//! Owns both ends of the pipeline: it picks a source, spawns the producer
//! thread, feeds the entry stream into the tree builder, reports progress
//! at a steady cadence, honours cancellation at every step, and runs the
//! post-scan analyzers before handing back one [`ScanResult`].
//!
//! Entry-point styles:
//! - [`scan`] — blocking call with a progress callback, for hosts that
//!   already run it on a worker.
//! - [`start_scan`] — spawns the coordinator on a named background thread
//!   and returns a [`ScanHandle`] with progress/result channels.

pub mod progress;

pub use progress::{ScanPhase, ScanProgress, ScanResult, ScanStats};

use crate::analysis;
use crate::error::ScanError;
use crate::platform;
use crate::source::{self, ScanSource, SourceItem};
use crate::tree::{BuiltTree, TreeBuilder};
use compact_str::CompactString;
use crossbeam_channel::{bounded, Receiver};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Capacity of the entry channel between producer and consumer. Bounded
/// so a fast source cannot outrun the builder without back-pressure.
pub const ENTRY_CHANNEL_CAPACITY: usize = 8_192;

/// Maximum progress messages queued by [`start_scan`]'s bridge.
///
/// A host draining once per frame (~60 fps) gets over a minute of headroom
/// at this capacity before the scanner stalls on `send` rather than
/// consuming unbounded heap.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 4_096;

/// How many of the largest files the result carries.
pub const TOP_FILES_COUNT: usize = 20;

/// Progress cadence.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Cooperative yield interval, in entries.
const YIELD_EVERY_ENTRIES: u64 = 10_000;

/// Scan `root` to completion.
///
/// `report` receives progress snapshots (≤ 10 Hz) from this thread only.
/// `cancel` is a single-shot signal checked at every entry and progress
/// tick; once observed the call returns [`ScanError::Aborted`] with no
/// further reports and all partial state dropped.
///
/// Fails with [`ScanError::HostIo`] when the root or volume is
/// inaccessible. An MFT source failing mid-stream falls back to the
/// directory source transparently.
pub fn scan(
    root: &Path,
    report: &mut dyn FnMut(ScanProgress),
    cancel: &Arc<AtomicBool>,
) -> Result<ScanResult, ScanError> {
    let start = Instant::now();
    let root = normalize_root(root)?;

    // Capacity is sampled before the walk: scanning itself touches
    // metadata and can perturb access times.
    let drive = platform::drive_stats(&root)?;
    info!(
        "scanning {} (volume {}, {} bytes total)",
        root.display(),
        drive.letter_or_label,
        drive.total_bytes
    );

    let mut source = source::select_source(&root);
    let mut attempted_fallback = false;

    let (builder, processed, populates_sizes, strategy) = loop {
        let estimate = source.estimate_entry_count();
        let populates_sizes = source.populates_sizes();
        let strategy = source.description();
        info!("using {strategy} source, estimated entries: {estimate}");

        let mut builder = TreeBuilder::new(&root);
        match ingest_stream(source, &root, &mut builder, report, cancel, estimate, start) {
            Ok(processed) => break (builder, processed, populates_sizes, strategy),
            Err(ScanError::SourceUnavailable { reason }) if !attempted_fallback => {
                warn!("{strategy} source failed ({reason}) — falling back to directory walk");
                attempted_fallback = true;
                source =
                    ScanSource::Directory(source::directory::DirectorySource::new(root.clone()));
            }
            Err(e) => return Err(e),
        }
    };

    if cancel.load(Ordering::Relaxed) {
        return Err(ScanError::Aborted);
    }
    report(ScanProgress {
        percent: 95.0,
        files_processed: processed,
        elapsed: start.elapsed(),
        current_path: None,
        phase: ScanPhase::BuildingTree,
    });

    let mut builder = builder;
    if !populates_sizes {
        builder.hydrate_file_sizes();
    }
    let built: BuiltTree = builder.build_tree();

    if cancel.load(Ordering::Relaxed) {
        return Err(ScanError::Aborted);
    }
    report(ScanProgress {
        percent: 98.0,
        files_processed: processed,
        elapsed: start.elapsed(),
        current_path: None,
        phase: ScanPhase::Analyzing,
    });

    let top_files = analysis::top_files(&built.root, TOP_FILES_COUNT);
    let by_extension = analysis::extension_groups(&built.root);

    let elapsed = start.elapsed();
    info!(
        "scan complete: {} files, {} directories, {} errors in {:.1?}",
        built.total_files, built.total_directories, built.error_count, elapsed
    );
    report(ScanProgress {
        percent: 100.0,
        files_processed: processed,
        elapsed,
        current_path: None,
        phase: ScanPhase::Complete,
    });

    Ok(ScanResult {
        drive,
        root: built.root,
        top_files,
        by_extension,
        stats: ScanStats {
            files: built.total_files,
            directories: built.total_directories,
            elapsed,
            strategy,
            error_count: built.error_count,
            incomplete: built.incomplete,
        },
    })
}

/// Drive one source to exhaustion, feeding the builder.
///
/// Returns the number of stream items processed. Progress is reported
/// every 100 ms; the consumer yields every 10 000 entries so the host
/// scheduler stays fair.
#[allow(clippy::too_many_arguments)]
fn ingest_stream(
    src: ScanSource,
    root: &Path,
    builder: &mut TreeBuilder,
    report: &mut dyn FnMut(ScanProgress),
    cancel: &Arc<AtomicBool>,
    estimate: u64,
    start: Instant,
) -> Result<u64, ScanError> {
    let (tx, rx) = bounded::<SourceItem>(ENTRY_CHANNEL_CAPACITY);
    let producer_cancel = Arc::clone(cancel);
    let producer = thread::Builder::new()
        .name("diskscope-source".into())
        .spawn(move || src.run(&tx, &producer_cancel))
        .map_err(|e| ScanError::host_io(root, e))?;

    let mut processed: u64 = 0;
    let mut max_percent: f32 = 0.0;
    let mut current_name: Option<CompactString> = None;
    let mut last_report = Instant::now();
    let mut cancelled = false;

    while let Ok(item) = rx.recv() {
        if cancel.load(Ordering::Relaxed) {
            cancelled = true;
            break;
        }

        match item {
            SourceItem::Entry(entry) => {
                processed += 1;
                current_name = Some(entry.name.clone());
                builder.on_entry(entry);
                if processed % YIELD_EVERY_ENTRIES == 0 {
                    thread::yield_now();
                }
            }
            SourceItem::Issue(err) => builder.on_issue(&err),
        }

        if last_report.elapsed() >= PROGRESS_INTERVAL {
            let elapsed = start.elapsed();
            max_percent = max_percent.max(scan_percent(processed, estimate, elapsed));
            report(ScanProgress {
                percent: max_percent,
                files_processed: processed,
                elapsed,
                current_path: current_name.as_ref().map(|n| n.to_string()),
                phase: ScanPhase::Scanning,
            });
            last_report = Instant::now();
        }
    }

    // Dropping the receiver unblocks a producer stuck on a full channel.
    drop(rx);
    let produced = producer
        .join()
        .map_err(|_| ScanError::invariant("source thread panicked"))?;

    if cancelled || cancel.load(Ordering::Relaxed) {
        return Err(ScanError::Aborted);
    }
    produced?;
    Ok(processed)
}

/// Percent estimate: entry-count based when the source could estimate,
/// otherwise a slow time-based crawl. Capped at 95 until the tree phases.
fn scan_percent(processed: u64, estimate: u64, elapsed: Duration) -> f32 {
    if estimate > 0 {
        ((processed as f64 / estimate as f64) * 100.0).min(95.0) as f32
    } else {
        (2.0 * elapsed.as_secs_f32()).min(95.0)
    }
}

/// Canonicalise the scan root: resolve relative components, strip
/// trailing separators and (on Windows) the `\\?\` verbatim prefix.
pub(crate) fn normalize_root(root: &Path) -> Result<PathBuf, ScanError> {
    let canonical = std::fs::canonicalize(root).map_err(|e| ScanError::host_io(root, e))?;
    Ok(strip_verbatim_prefix(canonical))
}

#[cfg(windows)]
fn strip_verbatim_prefix(path: PathBuf) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix(r"\\?\UNC\") {
        PathBuf::from(format!(r"\\{rest}"))
    } else if let Some(rest) = s.strip_prefix(r"\\?\") {
        PathBuf::from(rest.to_string())
    } else {
        path
    }
}

#[cfg(not(windows))]
fn strip_verbatim_prefix(path: PathBuf) -> PathBuf {
    path
}

/// Handle to a scan running on a background thread.
///
/// Dropping the handle detaches the scan; use [`cancel`](Self::cancel) to
/// stop it.
pub struct ScanHandle {
    /// Progress snapshots, bounded at [`PROGRESS_CHANNEL_CAPACITY`].
    pub progress_rx: Receiver<ScanProgress>,
    /// Delivers the single terminal outcome.
    pub result_rx: Receiver<Result<ScanResult, ScanError>>,
    cancel_flag: Arc<AtomicBool>,
    _thread: Option<thread::JoinHandle<()>>,
}

impl ScanHandle {
    /// Request cancellation. The scan aborts at its next check point.
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::Relaxed)
    }
}

/// Run [`scan`] on a named background thread, bridging progress into a
/// bounded channel.
pub fn start_scan(root: PathBuf) -> ScanHandle {
    let (progress_tx, progress_rx) = bounded::<ScanProgress>(PROGRESS_CHANNEL_CAPACITY);
    let (result_tx, result_rx) = bounded::<Result<ScanResult, ScanError>>(1);
    let cancel_flag = Arc::new(AtomicBool::new(false));
    let cancel = Arc::clone(&cancel_flag);

    let thread = thread::Builder::new()
        .name("diskscope-scanner".into())
        .spawn(move || {
            let mut report = |p: ScanProgress| {
                let _ = progress_tx.send(p);
            };
            let outcome = scan(&root, &mut report, &cancel);
            let _ = result_tx.send(outcome);
        })
        .expect("failed to spawn scanner thread");

    ScanHandle {
        progress_rx,
        result_rx,
        cancel_flag,
        _thread: Some(thread),
    }
}
