//! Error types for the scanning core.
//!
//! Every failure in the core maps to exactly one [`ScanError`] kind. The
//! recoverable kinds (`SourceUnavailable`, `AccessDenied`, `CorruptRecord`)
//! are consumed internally — the source factory falls back, the builder
//! counts and logs — and never escape [`crate::scan::scan`]. Only `HostIo`,
//! `Aborted`, and `Invariant` propagate to the host.

use std::path::PathBuf;

/// Errors that can occur while scanning a volume.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// The MFT fast path could not be used (wrong OS, non-NTFS volume,
    /// missing privileges, or a failed volume control). The coordinator
    /// falls back to the directory source.
    #[error("scan source unavailable: {reason}")]
    SourceUnavailable {
        /// Why the source could not be opened or driven.
        reason: String,
    },

    /// The volume or scan root itself could not be accessed (not ready,
    /// path does not exist, out of handles). Fatal.
    #[error("volume I/O failure at {}: {source}", path.display())]
    HostIo {
        /// The path that failed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A single directory or file could not be opened. The subtree is
    /// skipped and the scan continues.
    #[error("access denied: {}", path.display())]
    AccessDenied {
        /// The path that was refused.
        path: PathBuf,
    },

    /// A malformed USN record or unreadable directory entry. The record is
    /// skipped and the scan continues.
    #[error("corrupt record: {detail}")]
    CorruptRecord {
        /// What was wrong with the record.
        detail: String,
    },

    /// Cancellation was signalled. No result is constructed.
    #[error("scan aborted by cancellation")]
    Aborted,

    /// Tree linkage was impossible or a depth bound was exceeded. The scan
    /// still returns a tree, flagged incomplete.
    #[error("internal invariant violated: {detail}")]
    Invariant {
        /// Description of the violated invariant.
        detail: String,
    },
}

impl ScanError {
    /// Creates a new [`ScanError::SourceUnavailable`].
    #[inline]
    pub fn source_unavailable(reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            reason: reason.into(),
        }
    }

    /// Creates a new [`ScanError::HostIo`] with path context.
    #[inline]
    pub fn host_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::HostIo {
            path: path.into(),
            source,
        }
    }

    /// Creates a new [`ScanError::CorruptRecord`].
    #[inline]
    pub fn corrupt_record(detail: impl Into<String>) -> Self {
        Self::CorruptRecord {
            detail: detail.into(),
        }
    }

    /// Creates a new [`ScanError::Invariant`].
    #[inline]
    pub fn invariant(detail: impl Into<String>) -> Self {
        Self::Invariant {
            detail: detail.into(),
        }
    }

    /// Returns `true` if scanning can continue past this error.
    ///
    /// Recoverable errors are consumed by the factory, source, or builder;
    /// fatal ones propagate out of `scan()`.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable { .. } | Self::AccessDenied { .. } | Self::CorruptRecord { .. }
        )
    }

    /// Returns the file path associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::HostIo { path, .. } | Self::AccessDenied { path } => Some(path),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn host_io_is_fatal() {
        let err = ScanError::host_io("/dev/null", io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(!err.is_recoverable());
        assert_eq!(err.path().map(|p| p.to_string_lossy().into_owned()).as_deref(), Some("/dev/null"));
        assert!(err.to_string().contains("/dev/null"));
    }

    #[test]
    fn access_denied_is_recoverable() {
        let err = ScanError::AccessDenied {
            path: PathBuf::from("/root/secret"),
        };
        assert!(err.is_recoverable());
        assert!(err.path().is_some());
    }

    #[test]
    fn corrupt_record_is_recoverable() {
        let err = ScanError::corrupt_record("record length 0");
        assert!(err.is_recoverable());
        assert!(err.path().is_none());
        assert_eq!(err.to_string(), "corrupt record: record length 0");
    }

    #[test]
    fn aborted_and_invariant_propagate() {
        assert!(!ScanError::Aborted.is_recoverable());
        assert!(!ScanError::invariant("cycle").is_recoverable());
    }

    #[test]
    fn source_unavailable_display() {
        let err = ScanError::source_unavailable("filesystem is FAT32, not NTFS");
        assert!(err.is_recoverable());
        assert_eq!(
            err.to_string(),
            "scan source unavailable: filesystem is FAT32, not NTFS"
        );
    }
}
