//! The record type each scan source emits.
//!
//! An [`Entry`] is a flat, source-agnostic snapshot of one filesystem
//! object. Identifiers are 128-bit so that NTFS V3 file references fit
//! natively; the portable source synthesizes ids by hashing paths, which
//! makes the tree builder's algorithm uniform across sources.

use bitflags::bitflags;
use compact_str::CompactString;
use std::time::{SystemTime, UNIX_EPOCH};

bitflags! {
    /// Windows-compatible file attribute bits.
    ///
    /// Values match the `FILE_ATTRIBUTE_*` constants so USN records map
    /// bit-for-bit. `DIRECTORY` and `REPARSE_POINT` are load-bearing;
    /// the rest are carried through for downstream consumers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FileAttributes: u32 {
        const READONLY            = 0x0000_0001;
        const HIDDEN              = 0x0000_0002;
        const SYSTEM              = 0x0000_0004;
        const DIRECTORY           = 0x0000_0010;
        const ARCHIVE             = 0x0000_0020;
        const DEVICE              = 0x0000_0040;
        const NORMAL              = 0x0000_0080;
        const TEMPORARY           = 0x0000_0100;
        const SPARSE_FILE         = 0x0000_0200;
        const REPARSE_POINT       = 0x0000_0400;
        const COMPRESSED          = 0x0000_0800;
        const OFFLINE             = 0x0000_1000;
        const NOT_CONTENT_INDEXED = 0x0000_2000;
        const ENCRYPTED           = 0x0000_4000;
    }
}

/// Seconds between 1601-01-01 (FILETIME epoch) and 1970-01-01 (Unix epoch).
const FILETIME_UNIX_EPOCH_SECS: i64 = 11_644_473_600;

/// Convert a [`SystemTime`] into a Windows FILETIME-compatible integer
/// (100-nanosecond ticks since 1601-01-01). Pre-1601 times saturate to 0.
pub fn filetime_from_system_time(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => (d.as_secs() as i64 + FILETIME_UNIX_EPOCH_SECS)
            .saturating_mul(10_000_000)
            .saturating_add((d.subsec_nanos() / 100) as i64),
        Err(e) => {
            let before = e.duration().as_secs() as i64;
            (FILETIME_UNIX_EPOCH_SECS - before)
                .max(0)
                .saturating_mul(10_000_000)
        }
    }
}

/// One filesystem record observed by a scan source.
///
/// Entries are transient: created by a source, consumed once by the tree
/// builder, then discarded. `name` is the final path component only and
/// never contains separators.
#[derive(Debug, Clone)]
pub struct Entry {
    /// 128-bit identifier, unique within one scan (NTFS file reference
    /// number, or a path-digest on the portable source).
    pub file_id: u128,
    /// Identifier of the containing directory. Equals `file_id` for the
    /// volume root.
    pub parent_file_id: u128,
    /// Attribute bit-set.
    pub attributes: FileAttributes,
    /// Logical byte length. Always 0 for directories.
    pub size: u64,
    /// On-disk footprint including cluster slack.
    pub allocation_size: u64,
    /// Creation time, FILETIME units. 0 when the source does not report it.
    pub creation_time: i64,
    /// Last-write time, FILETIME units. 0 when the source does not report it.
    pub last_write_time: i64,
    /// Final path component. Empty only for the volume root.
    pub name: CompactString,
    /// Hard-link count; at least 1.
    pub link_count: u32,
}

impl Entry {
    /// Create a file entry.
    pub fn file(file_id: u128, parent_file_id: u128, name: CompactString, size: u64) -> Self {
        Self {
            file_id,
            parent_file_id,
            attributes: FileAttributes::empty(),
            size,
            allocation_size: size,
            creation_time: 0,
            last_write_time: 0,
            name,
            link_count: 1,
        }
    }

    /// Create a directory entry. Directories carry `size == 0`.
    pub fn directory(file_id: u128, parent_file_id: u128, name: CompactString) -> Self {
        Self {
            file_id,
            parent_file_id,
            attributes: FileAttributes::DIRECTORY,
            size: 0,
            allocation_size: 0,
            creation_time: 0,
            last_write_time: 0,
            name,
            link_count: 1,
        }
    }

    /// `true` if the directory attribute bit is set.
    #[inline]
    pub fn is_directory(&self) -> bool {
        self.attributes.contains(FileAttributes::DIRECTORY)
    }

    /// `true` if this entry is a reparse point (symlink, junction, mount
    /// point, cloud stub). Reparse points are never descended into.
    #[inline]
    pub fn is_reparse_point(&self) -> bool {
        self.attributes.contains(FileAttributes::REPARSE_POINT)
    }
}
