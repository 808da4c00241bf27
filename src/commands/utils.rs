use crate::aggregator::fold_stack;
use anyhow::{Context, Result};
use std::path::Path;

/// Fold the stack trace stored in a text file
pub fn normalize_stack_file(file_path: &Path) -> Result<String> {
    let stack = std::fs::read_to_string(file_path)
        .with_context(|| format!("Failed to read {}", file_path.display()))?;

    Ok(fold_stack(&stack))
}

/// Display version information
pub fn display_version() {
    println!("crashfold v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Crash archive ingestion, stack deduplication and flamegraph folding.");
}
