//! Post-scan analysis — algorithms that derive summaries from the
//! finished tree.

pub mod extensions;
pub mod top_files;

pub use extensions::{extension_groups, ExtensionGroup};
pub use top_files::{top_files, TopItem};
