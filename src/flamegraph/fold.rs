//! Fold file generation.
//!
//! A fold file is the plain-text input of flamegraph renderers:
//!
//! ```text
//! a.py:foo;b.py:bar 2
//! c.py:baz 1
//! ```
//!
//! One line per distinct raw stack, most frequent first, frames as
//! `path:function`, no trailing whitespace and no blank lines. Fold files
//! are written once per partition (a date or a client version) and never
//! regenerated: an existing file means the partition is done.

use crate::aggregator::stack_builder::{fold_stack, CollapsedStack};
use crate::aggregator::Deduplicator;
use crate::output::validate_path;
use crate::sink::CrashReport;
use crate::utils::error::FoldError;
use chrono::NaiveDate;
use log::{debug, info};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// File name prefix for fold files
pub const FOLD_PREFIX: &str = "fg_";

/// Grouping value selecting which reports feed one fold file
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PartitionKey {
    Date(NaiveDate),
    Version(String),
}

/// Which field of a report to partition on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionKind {
    Date,
    Version,
}

impl PartitionKey {
    /// Stem shared by the fold file and its rendered image
    ///
    /// `fg_d2014-05-01` for dates, `fg_v6_2_0` for versions.
    pub fn file_stem(&self) -> String {
        match self {
            Self::Date(date) => format!("{}d{}", FOLD_PREFIX, date.format("%Y-%m-%d")),
            Self::Version(version) => {
                let safe: String = version
                    .chars()
                    .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
                    .collect();
                format!("{}v{}", FOLD_PREFIX, safe)
            }
        }
    }

    /// Fold file path inside `output_dir`
    pub fn fold_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(format!("{}.txt", self.file_stem()))
    }

    /// Rendered image path inside `output_dir`
    pub fn image_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(format!("{}.svg", self.file_stem()))
    }

    /// Key of a report for the given kind, if it has one
    pub fn of(report: &CrashReport, kind: PartitionKind) -> Option<Self> {
        match kind {
            PartitionKind::Date => report.date.map(Self::Date),
            PartitionKind::Version => Some(Self::Version(report.version.clone())),
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Date(date) => write!(f, "date {}", date),
            Self::Version(version) => write!(f, "version {}", version),
        }
    }
}

/// Result of a partition fold request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FoldOutcome {
    /// A fold file already existed; nothing was written
    Skipped(PathBuf),

    /// A new fold file was written with `lines` stacks
    Written { path: PathBuf, lines: usize },
}

/// Fold every group, most frequent first
///
/// **Public** - main entry point for fold generation
///
/// Groups whose stack contains no frame line fold to an empty chain and
/// are left out, so a fold file can hold fewer lines than there are groups.
pub fn fold_groups(dedup: &Deduplicator) -> Vec<CollapsedStack> {
    let mut stacks = Vec::with_capacity(dedup.len());

    for group in dedup.ranked() {
        let folded = fold_stack(&group.representative_stack);
        if folded.is_empty() {
            debug!("Group {} has no frame lines, not folded", group.fingerprint);
            continue;
        }
        stacks.push(CollapsedStack::new(folded, group.count));
    }

    stacks
}

/// Render collapsed stacks as fold file text
pub fn render_fold(stacks: &[CollapsedStack]) -> String {
    let mut out = String::new();
    for stack in stacks {
        out.push_str(&stack.to_line());
        out.push('\n');
    }
    out
}

/// Write the fold file for one partition unless it already exists
///
/// # Arguments
/// * `output_dir` - Directory holding fold files
/// * `key` - Partition the reports belong to
/// * `reports` - Only this partition's reports
///
/// # Errors
/// * `FoldError::InvalidPath` - Output path is unusable
/// * `FoldError::IoError` - Write failed
pub fn write_for_partition<'a, I>(
    output_dir: &Path,
    key: &PartitionKey,
    reports: I,
) -> Result<FoldOutcome, FoldError>
where
    I: IntoIterator<Item = &'a CrashReport>,
{
    let path = key.fold_path(output_dir);

    if path.exists() {
        debug!("Fold for {} already exists: {}", key, path.display());
        return Ok(FoldOutcome::Skipped(path));
    }

    let mut dedup = Deduplicator::new();
    for (i, report) in reports.into_iter().enumerate() {
        dedup.add_stack(report.stack.as_deref(), i as u64, None);
    }

    let stacks = fold_groups(&dedup);
    write_fold(&path, &stacks)?;

    info!("Wrote fold for {} ({} stacks) to {}", key, stacks.len(), path.display());

    Ok(FoldOutcome::Written {
        path,
        lines: stacks.len(),
    })
}

/// Write collapsed stacks to a fold file
///
/// **Private** - callers go through `write_for_partition`
fn write_fold(path: &Path, stacks: &[CollapsedStack]) -> Result<(), FoldError> {
    validate_path(path).map_err(|e| FoldError::InvalidPath(e.to_string()))?;

    if let Some(parent) = path.parent() {
        if !parent.exists() {
            debug!("Creating parent directories: {}", parent.display());
            std::fs::create_dir_all(parent)?;
        }
    }

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(render_fold(stacks).as_bytes())?;
    writer.flush()?;

    Ok(())
}

/// Group reports by partition key, keys in first-seen order
///
/// Reports without a key for `kind` (no archive date) are left out.
pub fn partition_reports(
    reports: &[CrashReport],
    kind: PartitionKind,
) -> Vec<(PartitionKey, Vec<&CrashReport>)> {
    let mut partitions: Vec<(PartitionKey, Vec<&CrashReport>)> = Vec::new();

    for report in reports {
        let Some(key) = PartitionKey::of(report, kind) else {
            continue;
        };
        match partitions.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(report),
            None => partitions.push((key, vec![report])),
        }
    }

    partitions
}
