//! Platform-specific functionality — volume capacity queries and
//! privilege checks.

pub mod drives;
#[cfg(windows)]
pub mod permissions;

pub use drives::{drive_stats, DriveStats};
#[cfg(windows)]
pub use permissions::is_elevated;
