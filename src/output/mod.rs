//! Output writers for human-readable reports.
//!
//! Fold files live with the flamegraph module; this module handles the
//! per-archive HTML reports and the path checks shared by every writer.

pub mod report;

// Re-export main functions
pub use report::{
    build_report, compact_comments, escape_text, report_path, write_archive_report, CommentLine,
    ReportOutcome,
};

use crate::utils::error::OutputError;
use std::path::Path;

/// Common path validation for output files
pub fn validate_path(path: &Path) -> Result<(), OutputError> {
    if path.as_os_str().is_empty() {
        return Err(OutputError::InvalidPath("Path is empty".to_string()));
    }

    if path.exists() && path.is_dir() {
        return Err(OutputError::InvalidPath(format!(
            "Path is a directory: {}",
            path.display()
        )));
    }

    Ok(())
}
