//! Static asset collection phase.
//!
//! Output is rebuilt from scratch on every run: files that no source provides
//! any more do not survive a collection.

pub mod collect;
pub mod framework;

use std::path::PathBuf;

use serde::Serialize;

pub use collect::{collect_static, paths_overlap, CollectRequest};
pub use framework::{
    parse_collected_count, parse_collected_destination, run_framework_collectstatic,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetReport {
    pub backend: &'static str,
    /// Collection root. Framework runs only know it when `collectstatic` prints it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    pub copied: usize,
    /// Files hidden by an earlier source providing the same relative path.
    pub shadowed: usize,
    pub missing_sources: Vec<PathBuf>,
    pub commands: Vec<String>,
    pub warnings: Vec<String>,
}
