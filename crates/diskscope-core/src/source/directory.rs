//! Portable directory enumeration — the fallback scan source.
//!
//! Works on any filesystem and needs no privileges. Uses `jwalk`'s
//! rayon-backed traversal so directory listing keeps up with fast disks,
//! while the entry stream itself stays single-producer.
//!
//! File ids are synthesized as SHA-256-based 128-bit digests of the
//! normalized absolute path (case-folded on case-insensitive hosts); the
//! parent id is the digest of the parent path. Deterministic ids make the
//! tree builder's algorithm identical across sources.
//!
//! Hard links cannot be distinguished on this path: two links to the same
//! inode hash to different ids and each counts once. Reparse points and
//! symlinks are yielded as entries but never descended into.

use crate::error::ScanError;
use crate::model::{filetime_from_system_time, Entry, FileAttributes};
use crate::source::{debug_batches, SourceItem};
use compact_str::CompactString;
use crossbeam_channel::Sender;
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Entries between cooperative yields, to keep the host runtime fair.
const YIELD_EVERY: u64 = 100;

/// Entries between verbose batch log lines (`SCANNER_DEBUG=1` only).
const DEBUG_BATCH: u64 = 10_000;

/// Cluster size assumed when the platform does not report allocation
/// cheaply.
const ASSUMED_CLUSTER: u64 = 4096;

/// Single-pass recursive enumeration of one volume root.
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Drive the walk, emitting one entry per filesystem object.
    ///
    /// Each directory is listed exactly once; `.`/`..` never surface.
    /// Unreadable directories are reported as issues and their subtrees
    /// skipped — the scan never aborts on them.
    pub(crate) fn run(
        self,
        tx: &Sender<SourceItem>,
        cancel: &AtomicBool,
    ) -> Result<(), ScanError> {
        let root_meta = std::fs::metadata(&self.root)
            .map_err(|e| ScanError::host_io(&self.root, e))?;

        let root_id = path_digest(&self.root);
        let root_name: CompactString = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().as_ref().into())
            .unwrap_or_default();

        let mut root_entry = Entry::directory(root_id, root_id, root_name);
        root_entry.creation_time = root_meta
            .created()
            .map(filetime_from_system_time)
            .unwrap_or(0);
        root_entry.last_write_time = root_meta
            .modified()
            .map(filetime_from_system_time)
            .unwrap_or(0);
        if tx.send(SourceItem::Entry(root_entry)).is_err() {
            return Ok(());
        }

        let walker = jwalk::WalkDir::new(&self.root)
            .skip_hidden(false)
            .follow_links(false)
            .sort(true)
            .parallelism(jwalk::Parallelism::RayonNewPool(num_cpus::get()));

        let mut emitted: u64 = 0;
        for entry_result in walker {
            if cancel.load(Ordering::Relaxed) {
                return Ok(());
            }

            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    let path = err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.root.clone());
                    warn!("walk error at {}: {err}", path.display());
                    let issue = classify_walk_error(path, err.io_error());
                    if tx.send(SourceItem::Issue(issue)).is_err() {
                        return Ok(());
                    }
                    continue;
                }
            };

            let path = entry.path();
            if path == self.root {
                continue;
            }

            let item = match self.entry_for(&path, &entry) {
                Ok(e) => SourceItem::Entry(e),
                Err(issue) => SourceItem::Issue(issue),
            };
            if tx.send(item).is_err() {
                return Ok(());
            }

            emitted += 1;
            if emitted % YIELD_EVERY == 0 {
                std::thread::yield_now();
            }
            if debug_batches() && emitted % DEBUG_BATCH == 0 {
                debug!("directory walk: {emitted} entries, at {}", path.display());
            }
        }

        debug!("directory walk complete: {emitted} entries under {}", self.root.display());
        Ok(())
    }

    /// Build the entry for one walked object.
    fn entry_for(
        &self,
        path: &Path,
        dirent: &jwalk::DirEntry<((), ())>,
    ) -> Result<Entry, ScanError> {
        let file_id = path_digest(path);
        let parent_id = path.parent().map_or(file_id, path_digest);
        let name: CompactString = dirent.file_name().to_string_lossy().as_ref().into();
        let file_type = dirent.file_type();

        if file_type.is_dir() {
            return Ok(Entry::directory(file_id, parent_id, name));
        }

        // Symlinks (and on Windows, junctions) surface as reparse points;
        // jwalk does not descend into them with follow_links(false).
        let meta = std::fs::symlink_metadata(path).map_err(|e| classify_walk_error(path.to_path_buf(), Some(&e)))?;

        let size = if file_type.is_symlink() { 0 } else { meta.len() };
        let mut entry = Entry::file(file_id, parent_id, name, size);
        entry.allocation_size = size.div_ceil(ASSUMED_CLUSTER) * ASSUMED_CLUSTER;
        entry.creation_time = meta.created().map(filetime_from_system_time).unwrap_or(0);
        entry.last_write_time = meta.modified().map(filetime_from_system_time).unwrap_or(0);
        if file_type.is_symlink() {
            entry.attributes |= FileAttributes::REPARSE_POINT;
        }
        Ok(entry)
    }
}

/// Map a walk-time I/O error to the recoverable taxonomy.
fn classify_walk_error(path: PathBuf, io_err: Option<&io::Error>) -> ScanError {
    match io_err.map(io::Error::kind) {
        Some(io::ErrorKind::PermissionDenied) => ScanError::AccessDenied { path },
        kind => ScanError::corrupt_record(format!(
            "unreadable entry {} ({kind:?})",
            path.display()
        )),
    }
}

/// 128-bit id for a path: the first 16 bytes of
/// `SHA-256(normalized path)`, case-folded where the host filesystem is
/// case-insensitive.
pub fn path_digest(path: &Path) -> u128 {
    let raw = path.to_string_lossy();
    let trimmed = if raw.len() > 1 {
        raw.trim_end_matches(std::path::MAIN_SEPARATOR)
    } else {
        raw.as_ref()
    };

    #[cfg(any(windows, target_os = "macos"))]
    let key = trimmed.to_lowercase();
    #[cfg(not(any(windows, target_os = "macos")))]
    let key = trimmed;

    let digest = Sha256::digest(key.as_bytes());
    let mut low = [0u8; 16];
    low.copy_from_slice(&digest[..16]);
    u128::from_le_bytes(low)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    /// Drive a real walk over a tempdir and collect the emitted entries.
    fn run_over(root: &Path) -> Vec<Entry> {
        let source = DirectorySource::new(root.to_path_buf());
        let (tx, rx) = crossbeam_channel::unbounded();
        let cancel = AtomicBool::new(false);
        source.run(&tx, &cancel).expect("walk failed");
        drop(tx);
        rx.iter()
            .filter_map(|item| match item {
                SourceItem::Entry(e) => Some(e),
                SourceItem::Issue(_) => None,
            })
            .collect()
    }

    #[test]
    fn emits_root_first_with_self_parent() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("x.bin"), vec![0u8; 10]).unwrap();

        let entries = run_over(&tmp.path().canonicalize().unwrap());
        let root = &entries[0];
        assert!(root.is_directory());
        assert_eq!(root.parent_file_id, root.file_id);
    }

    #[test]
    fn child_parent_ids_link_to_their_directory() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        std::fs::create_dir(root.join("sub")).unwrap();
        std::fs::write(root.join("sub").join("f.dat"), vec![0u8; 300]).unwrap();

        let entries = run_over(&root);
        assert_eq!(entries.len(), 3, "root, sub, f.dat");

        let sub = entries.iter().find(|e| e.name == "sub").unwrap();
        let f = entries.iter().find(|e| e.name == "f.dat").unwrap();
        assert_eq!(sub.parent_file_id, entries[0].file_id);
        assert_eq!(f.parent_file_id, sub.file_id);
        assert_eq!(f.size, 300);
        // 300 bytes occupy one assumed 4 KiB cluster.
        assert_eq!(f.allocation_size, 4096);
        assert!(f.last_write_time > 0);
    }

    #[test]
    fn cancellation_stops_the_walk() {
        let tmp = tempfile::TempDir::new().unwrap();
        for i in 0..50 {
            std::fs::write(tmp.path().join(format!("f{i}.bin")), b"x").unwrap();
        }
        let source = DirectorySource::new(tmp.path().to_path_buf());
        let (tx, rx) = crossbeam_channel::unbounded();
        let cancel = AtomicBool::new(true);
        source.run(&tx, &cancel).expect("run failed");
        drop(tx);
        // Only the root entry (sent before the walk loop) may slip out.
        assert!(rx.iter().count() <= 1);
    }

    #[test]
    fn digest_is_deterministic() {
        let a = path_digest(Path::new("/var/log"));
        let b = path_digest(Path::new("/var/log"));
        assert_eq!(a, b);
    }

    #[test]
    fn digest_distinguishes_paths() {
        assert_ne!(
            path_digest(Path::new("/var/log")),
            path_digest(Path::new("/var/lib"))
        );
    }

    #[test]
    fn trailing_separator_does_not_change_identity() {
        assert_eq!(
            path_digest(Path::new("/var/log/")),
            path_digest(Path::new("/var/log"))
        );
    }

    #[test]
    fn parent_digest_matches_child_parent_id() {
        let parent = path_digest(Path::new("/data"));
        let from_child = Path::new("/data/file.bin")
            .parent()
            .map(path_digest)
            .unwrap();
        assert_eq!(parent, from_child);
    }
}
