//! CLI command implementations.
//!
//! Each command is implemented in its own module.
//! Commands orchestrate the various library components to perform user tasks.

pub mod import;
pub mod utils;

// Re-export main command functions
pub use import::{
    execute_import, ingest_archive, list_archives, run_import, validate_args, ArchiveIngest,
    ImportArgs, ImportSummary,
};
pub use utils::{display_version, normalize_stack_file};
