//! In-process report sinks.

use super::{CrashReport, ReportSink};
use crate::utils::error::SinkError;
use log::{debug, warn};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Keeps accepted reports in memory, unique by timestamp
#[derive(Debug, Default)]
pub struct MemorySink {
    reports: Vec<CrashReport>,
    timestamps: HashSet<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check the uniqueness rule without storing anything
    fn admit(&self, report: &CrashReport) -> Result<(), SinkError> {
        let timestamp = report
            .timestamp
            .as_deref()
            .ok_or(SinkError::MissingTimestamp)?;

        if self.timestamps.contains(timestamp) {
            return Err(SinkError::DuplicateTimestamp(timestamp.to_string()));
        }
        Ok(())
    }

    /// Mark a timestamp as taken without storing a report
    fn remember(&mut self, timestamp: String) {
        self.timestamps.insert(timestamp);
    }

    fn store(&mut self, report: &CrashReport) {
        if let Some(ts) = &report.timestamp {
            self.timestamps.insert(ts.clone());
        }
        self.reports.push(report.clone());
    }
}

impl ReportSink for MemorySink {
    fn accept(&mut self, report: &CrashReport) -> Result<(), SinkError> {
        self.admit(report)?;
        self.store(report);
        Ok(())
    }

    fn reports(&self) -> &[CrashReport] {
        &self.reports
    }
}

/// Appends accepted reports to a JSON-lines file
///
/// Timestamps already in the file count as taken, so re-importing the same
/// archives appends nothing.
pub struct JsonLinesSink {
    inner: MemorySink,
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonLinesSink {
    /// Open (or create) the file in append mode
    ///
    /// Existing lines seed the uniqueness check; lines that do not parse
    /// are logged and ignored.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();

        let mut inner = MemorySink::new();
        let known = read_timestamps(&path)?;
        let seeded = known.len();
        for timestamp in known {
            inner.remember(timestamp);
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!(
            "Appending reports to {} ({} timestamps already stored)",
            path.display(),
            seeded
        );

        Ok(Self {
            inner,
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush buffered lines to disk
    pub fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

impl ReportSink for JsonLinesSink {
    fn accept(&mut self, report: &CrashReport) -> Result<(), SinkError> {
        self.inner.admit(report)?;

        let line = serde_json::to_string(report)?;
        writeln!(self.writer, "{}", line)?;

        self.inner.store(report);
        Ok(())
    }

    fn reports(&self) -> &[CrashReport] {
        self.inner.reports()
    }
}

/// Timestamps of the reports already stored in a JSON-lines file
///
/// **Private** - a missing file holds no timestamps
fn read_timestamps(path: &Path) -> Result<Vec<String>, SinkError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let reader = BufReader::new(File::open(path)?);
    let mut timestamps = Vec::new();

    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<CrashReport>(&line) {
            Ok(report) => timestamps.extend(report.timestamp),
            Err(e) => warn!("Skipping line {} of {}: {}", n + 1, path.display(), e),
        }
    }

    Ok(timestamps)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(timestamp: Option<&str>) -> CrashReport {
        CrashReport {
            timestamp: timestamp.map(str::to_string),
            sysinfo: None,
            comment: "Not provided".to_string(),
            stack: Some("File \"a.py\", line 1, in foo".to_string()),
            version: "6.2.0".to_string(),
            date: None,
            os: String::new(),
            machine: String::new(),
        }
    }

    #[test]
    fn test_memory_sink_rejects_duplicate_timestamp() {
        let mut sink = MemorySink::new();
        sink.accept(&report(Some("1"))).unwrap();

        let err = sink.accept(&report(Some("1"))).unwrap_err();
        assert!(matches!(err, SinkError::DuplicateTimestamp(ts) if ts == "1"));
        sink.accept(&report(Some("2"))).unwrap();
        assert_eq!(sink.reports().len(), 2);
    }

    #[test]
    fn test_memory_sink_rejects_missing_timestamp() {
        let mut sink = MemorySink::new();
        assert!(matches!(
            sink.accept(&report(None)),
            Err(SinkError::MissingTimestamp)
        ));
        assert!(sink.reports().is_empty());
    }

    #[test]
    fn test_json_lines_sink_writes_one_line_per_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports.jsonl");

        let mut sink = JsonLinesSink::open(&path).unwrap();
        sink.accept(&report(Some("1"))).unwrap();
        assert!(sink.accept(&report(Some("1"))).is_err());
        sink.accept(&report(Some("2"))).unwrap();
        sink.flush().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: CrashReport = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed, report(Some("2")));
    }

    #[test]
    fn test_json_lines_sink_remembers_previous_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports.jsonl");

        let mut first = JsonLinesSink::open(&path).unwrap();
        first.accept(&report(Some("1"))).unwrap();
        first.flush().unwrap();
        drop(first);
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"not json\n")
            .unwrap();

        let mut second = JsonLinesSink::open(&path).unwrap();
        assert!(matches!(
            second.accept(&report(Some("1"))),
            Err(SinkError::DuplicateTimestamp(ts)) if ts == "1"
        ));
        second.accept(&report(Some("2"))).unwrap();
        second.flush().unwrap();

        assert_eq!(second.reports().len(), 1);
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3);
    }
}
