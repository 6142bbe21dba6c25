//! Volume capacity sampling.
//!
//! Drive statistics are captured by the coordinator *before* scanning
//! begins, because the scan itself touches metadata and can perturb access
//! times. On Windows this queries the volume directly; elsewhere it walks
//! the mounted-disk list and picks the longest mount-point prefix.

use crate::error::ScanError;
use std::path::Path;

/// Capacity snapshot of the volume containing the scan root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveStats {
    /// Drive letter (`"C:"`) on Windows, otherwise the mount-point path.
    pub letter_or_label: String,
    /// Total capacity in bytes.
    pub total_bytes: u64,
    /// Bytes in use.
    pub used_bytes: u64,
    /// Bytes free.
    pub free_bytes: u64,
}

/// Sample total/used/free bytes for the volume containing `path`.
#[cfg(windows)]
pub fn drive_stats(path: &Path) -> Result<DriveStats, ScanError> {
    use windows::core::PCWSTR;
    use windows::Win32::Storage::FileSystem::GetDiskFreeSpaceExW;

    let root = volume_root_of(path);
    let root_wide: Vec<u16> = root.encode_utf16().chain(std::iter::once(0)).collect();

    let mut free_caller: u64 = 0;
    let mut total: u64 = 0;
    let mut free_total: u64 = 0;
    unsafe {
        GetDiskFreeSpaceExW(
            PCWSTR(root_wide.as_ptr()),
            Some(&mut free_caller as *mut u64),
            Some(&mut total as *mut u64),
            Some(&mut free_total as *mut u64),
        )
    }
    .map_err(|e| {
        ScanError::host_io(
            path,
            std::io::Error::other(format!("GetDiskFreeSpaceExW failed: {e}")),
        )
    })?;

    let used = total.saturating_sub(free_caller);
    Ok(DriveStats {
        letter_or_label: root.trim_end_matches('\\').to_string(),
        total_bytes: total,
        used_bytes: used,
        free_bytes: free_caller,
    })
}

/// Sample total/used/free bytes for the volume containing `path`.
#[cfg(not(windows))]
pub fn drive_stats(path: &Path) -> Result<DriveStats, ScanError> {
    use sysinfo::Disks;

    let disks = Disks::new_with_refreshed_list();

    // The disk whose mount point is the longest prefix of the scan root
    // is the volume the root lives on.
    let best = disks
        .list()
        .iter()
        .filter(|d| path.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len());

    match best {
        Some(disk) => {
            let total = disk.total_space();
            let free = disk.available_space();
            Ok(DriveStats {
                letter_or_label: disk.mount_point().to_string_lossy().into_owned(),
                total_bytes: total,
                used_bytes: total.saturating_sub(free),
                free_bytes: free,
            })
        }
        // Pseudo-filesystems (tmpfs test dirs, containers) may not appear
        // in the disk list; report zeros rather than failing the scan.
        None => Ok(DriveStats {
            letter_or_label: path.to_string_lossy().into_owned(),
            total_bytes: 0,
            used_bytes: 0,
            free_bytes: 0,
        }),
    }
}

/// The filesystem name of the volume containing `path` (e.g. `"NTFS"`).
///
/// Used by the source factory to gate the MFT fast path.
#[cfg(windows)]
pub fn filesystem_name(path: &Path) -> Option<String> {
    use windows::core::PCWSTR;
    use windows::Win32::Storage::FileSystem::GetVolumeInformationW;

    let root = volume_root_of(path);
    let root_wide: Vec<u16> = root.encode_utf16().chain(std::iter::once(0)).collect();
    let mut fs_buf = [0u16; 64];

    let ok = unsafe {
        GetVolumeInformationW(
            PCWSTR(root_wide.as_ptr()),
            None,
            None,
            None,
            None,
            Some(&mut fs_buf),
        )
        .is_ok()
    };
    if !ok {
        return None;
    }

    let end = fs_buf.iter().position(|&c| c == 0).unwrap_or(0);
    Some(String::from_utf16_lossy(&fs_buf[..end]))
}

/// Reduce a path to its drive root, e.g. `C:\Users\x` -> `C:\`.
///
/// Non-drive paths (UNC shares) are returned unchanged; the MFT probe will
/// reject them anyway.
#[cfg(windows)]
pub(crate) fn volume_root_of(path: &Path) -> String {
    let s = path.to_string_lossy();
    let bytes = s.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        format!("{}\\", &s[..2])
    } else {
        s.into_owned()
    }
}

#[cfg(all(test, not(windows)))]
mod tests {
    use super::*;

    #[test]
    fn drive_stats_never_fails_for_existing_paths() {
        let stats = drive_stats(Path::new("/")).expect("stats for /");
        assert!(stats.total_bytes >= stats.free_bytes);
        assert_eq!(
            stats.used_bytes,
            stats.total_bytes.saturating_sub(stats.free_bytes)
        );
    }
}
