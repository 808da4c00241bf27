//! Import command implementation.
//!
//! The import command:
//! 1. Lists crash archives in the input directory
//! 2. Decodes each archive and streams its records
//! 3. Groups records by stack and writes a per-archive report
//! 4. Hands every record to the report sink
//! 5. Writes a fold file per date and per version partition
//! 6. Renders each newly written fold file
//!
//! Nothing short of an unusable input/output directory stops the run: a
//! broken archive, a rejected record, a failed write or a failed render
//! only affects that one archive, record or partition.

use crate::aggregator::Deduplicator;
use crate::flamegraph::{
    partition_reports, renderer_from_settings, write_for_partition, FlamegraphRenderer,
    FoldOutcome, PartitionKind,
};
use crate::output::{write_archive_report, ReportOutcome};
use crate::parser::{decode_archive, RawRecord, RecordStream, StreamEnd};
use crate::sink::{archive_date, CrashReport, JsonLinesSink, ReportSink};
use crate::utils::config::{load_config, PipelineConfig};
use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Name of the JSON-lines sink file inside the output directory
pub const SINK_FILE_NAME: &str = "reports.jsonl";

/// Arguments for the import command
///
/// **Public** - used by main.rs to construct from CLI args
#[derive(Debug, Clone, Default)]
pub struct ImportArgs {
    /// Directory containing `exception*` archives
    pub input_dir: PathBuf,

    /// Directory for reports, fold files and images
    pub output_dir: PathBuf,

    /// Optional TOML config
    pub config_path: Option<PathBuf>,

    /// Overwrite existing per-archive reports
    pub force: bool,

    /// Write fold files but skip the render step
    pub no_render: bool,
}

/// Everything extracted from one archive
#[derive(Debug)]
pub struct ArchiveIngest {
    pub records: Vec<RawRecord>,
    pub dedup: Deduplicator,
    pub end: StreamEnd,
}

/// Counters for one import run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub archives_processed: usize,
    pub archives_failed: usize,
    pub records: u64,
    pub records_rejected: u64,
    pub groups: usize,
    pub reports_written: usize,
    pub folds_written: usize,
    pub folds_skipped: usize,
    pub renders_failed: usize,
}

impl ImportSummary {
    /// Get human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "Archives: {} ({} failed) | Records: {} ({} rejected) | Stack groups: {} | Reports: {} | Folds: {} new, {} existing | Renders failed: {}",
            self.archives_processed,
            self.archives_failed,
            self.records,
            self.records_rejected,
            self.groups,
            self.reports_written,
            self.folds_written,
            self.folds_skipped,
            self.renders_failed
        )
    }
}

/// Execute the import command
///
/// **Public** - main entry point called from main.rs
///
/// # Errors
/// * Input or output directory missing
/// * Config file unreadable or invalid
/// * Sink file cannot be opened
pub fn execute_import(args: ImportArgs) -> Result<ImportSummary> {
    validate_args(&args)?;

    let mut config = match &args.config_path {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    config.force |= args.force;

    let sink_path = args.output_dir.join(SINK_FILE_NAME);
    let mut sink = JsonLinesSink::open(&sink_path)
        .with_context(|| format!("Failed to open report sink {}", sink_path.display()))?;

    let renderer = if args.no_render {
        None
    } else {
        Some(renderer_from_settings(&config.flamegraph))
    };

    let summary = run_import(
        &args.input_dir,
        &args.output_dir,
        &config,
        &mut sink,
        renderer.as_deref(),
    )?;

    sink.flush().context("Failed to flush report sink")?;
    Ok(summary)
}

/// Run the pipeline against any sink and renderer
///
/// **Public** - the testable core of `execute_import`
pub fn run_import(
    input_dir: &Path,
    output_dir: &Path,
    config: &PipelineConfig,
    sink: &mut dyn ReportSink,
    renderer: Option<&dyn FlamegraphRenderer>,
) -> Result<ImportSummary> {
    let start_time = Instant::now();
    let mut summary = ImportSummary::default();

    info!("Step 1/3: Listing archives in {}", input_dir.display());
    let archives = list_archives(input_dir, &config.archive_prefix)?;
    info!("Found {} archives", archives.len());

    info!("Step 2/3: Ingesting archives...");
    for archive in &archives {
        import_archive(archive, output_dir, config, sink, &mut summary);
    }

    info!("Step 3/3: Writing flamegraph folds...");
    for kind in [PartitionKind::Date, PartitionKind::Version] {
        write_partition_folds(output_dir, kind, sink.reports(), renderer, &mut summary);
    }

    info!("{}", summary.summary());
    info!("Import completed in {:.2}s", start_time.elapsed().as_secs_f64());

    Ok(summary)
}

/// Decode one archive and group its records
///
/// **Public** - returns `None` when the archive cannot be decoded
pub fn ingest_archive(path: &Path, config: &PipelineConfig) -> Option<ArchiveIngest> {
    let content = decode_archive(path)?;

    let mut stream = RecordStream::new(&content, &config.compulsory_fields);
    let mut dedup = Deduplicator::new();
    let mut records = Vec::new();

    for record in stream.by_ref() {
        dedup.add_record(&record);
        records.push(record);
    }

    let end = stream.termination().cloned().unwrap_or(StreamEnd::Exhausted {
        records: records.len() as u64,
    });

    Some(ArchiveIngest {
        records,
        dedup,
        end,
    })
}

/// Ingest, report and sink one archive
///
/// **Private** - failures are logged and counted, never propagated
fn import_archive(
    archive: &Path,
    output_dir: &Path,
    config: &PipelineConfig,
    sink: &mut dyn ReportSink,
    summary: &mut ImportSummary,
) {
    info!("Processing {}...", archive.display());

    let Some(ingest) = ingest_archive(archive, config) else {
        summary.archives_failed += 1;
        return;
    };
    summary.archives_processed += 1;
    summary.records += ingest.records.len() as u64;
    summary.groups += ingest.dedup.len();

    if let StreamEnd::Truncated { records, .. } = &ingest.end {
        warn!("{}: kept {} records before a corrupt unit", archive.display(), records);
    }

    match write_archive_report(output_dir, archive, &ingest.records, &ingest.dedup, config) {
        Ok(ReportOutcome::Written(_)) => summary.reports_written += 1,
        Ok(ReportOutcome::Skipped(_)) => {}
        Err(e) => error!("Failed to write report for {}: {}", archive.display(), e),
    }

    let date = archive_date(archive);
    if date.is_none() {
        debug!("No date in archive name {}", archive.display());
    }

    for record in &ingest.records {
        let report = CrashReport::from_record(record, date, config);
        if let Err(e) = sink.accept(&report) {
            summary.records_rejected += 1;
            debug!("Sink rejected record {}: {}", record.sequence_id, e);
        }
    }
}

/// Write (and render) the fold of every partition of one kind
///
/// **Private** - failures are logged and counted, never propagated
fn write_partition_folds(
    output_dir: &Path,
    kind: PartitionKind,
    reports: &[CrashReport],
    renderer: Option<&dyn FlamegraphRenderer>,
    summary: &mut ImportSummary,
) {
    for (key, members) in partition_reports(reports, kind) {
        match write_for_partition(output_dir, &key, members) {
            Ok(FoldOutcome::Skipped(_)) => summary.folds_skipped += 1,
            Ok(FoldOutcome::Written { path, lines }) => {
                summary.folds_written += 1;
                if lines == 0 {
                    debug!("Fold for {} is empty, not rendering", key);
                    continue;
                }
                if let Some(renderer) = renderer {
                    if let Err(e) = renderer.render(&path, &key.image_path(output_dir)) {
                        summary.renders_failed += 1;
                        error!("Failed to render flamegraph for {}: {}", key, e);
                    }
                }
            }
            Err(e) => error!("Failed to write fold for {}: {}", key, e),
        }
    }
}

/// Archive files in a directory, sorted by name
///
/// **Public** - only regular files whose name starts with `prefix`
pub fn list_archives(input_dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(input_dir)
        .with_context(|| format!("Failed to list {}", input_dir.display()))?;

    let mut archives = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to list {}", input_dir.display()))?;
        let path = entry.path();
        let name = entry.file_name();

        if !name.to_string_lossy().starts_with(prefix) {
            debug!("Skip {}, not an exception report", path.display());
            continue;
        }
        if !path.is_file() {
            debug!("Skip {}, not a file", path.display());
            continue;
        }
        archives.push(path);
    }

    archives.sort();
    Ok(archives)
}

/// Validate import arguments
///
/// **Public** - can be called before execute_import for early validation
pub fn validate_args(args: &ImportArgs) -> Result<()> {
    if !args.input_dir.is_dir() {
        anyhow::bail!(
            "input-dir doesn't exist or is not a dir: {}",
            args.input_dir.display()
        );
    }

    if !args.output_dir.is_dir() {
        anyhow::bail!(
            "output-dir doesn't exist or is not a dir: {}",
            args.output_dir.display()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_args_missing_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let args = ImportArgs {
            input_dir: dir.path().join("missing"),
            output_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        assert!(validate_args(&args).is_err());

        let args = ImportArgs {
            input_dir: dir.path().to_path_buf(),
            output_dir: dir.path().join("missing"),
            ..Default::default()
        };
        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn test_list_archives_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("exception_20140502.bz2"), b"").unwrap();
        std::fs::write(dir.path().join("exception_20140501.bz2"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();
        std::fs::create_dir(dir.path().join("exception_dir")).unwrap();

        let archives = list_archives(dir.path(), "exception").unwrap();
        let names: Vec<String> = archives
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["exception_20140501.bz2", "exception_20140502.bz2"]);
    }

    #[test]
    fn test_summary_line() {
        let summary = ImportSummary {
            archives_processed: 2,
            records: 5,
            renders_failed: 1,
            ..Default::default()
        };
        assert!(summary.summary().starts_with("Archives: 2 (0 failed) | Records: 5"));
        assert!(summary.summary().ends_with("| Renders failed: 1"));
    }
}
