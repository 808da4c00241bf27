//! Report sink boundary.
//!
//! The pipeline hands every accepted record to a sink as a `CrashReport`
//! tuple. Storage itself lives outside this crate; a sink only has to
//! accept or reject each report. Rejections (duplicate timestamps above
//! all) drop that one report and never stop the run.

pub mod store;

pub use store::{JsonLinesSink, MemorySink};

use crate::parser::RawRecord;
use crate::utils::config::{PipelineConfig, COMPRESSED_SUFFIX};
use crate::utils::error::SinkError;
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;

static OS_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)platform.details(.*?)\n").ok());
static MACHINE_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)platform.machine(.*?)\n").ok());

/// The tuple a sink receives for each record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashReport {
    pub timestamp: Option<String>,
    pub sysinfo: Option<String>,
    pub comment: String,
    /// Stack text with any leading version line removed
    pub stack: Option<String>,
    pub version: String,
    pub date: Option<NaiveDate>,
    pub os: String,
    pub machine: String,
}

impl CrashReport {
    /// Derive the sink tuple from an extracted record
    ///
    /// # Arguments
    /// * `record` - Record from the stream
    /// * `date` - Archive date (see `archive_date`)
    /// * `config` - Supplies the version prefix and sentinels
    pub fn from_record(record: &RawRecord, date: Option<NaiveDate>, config: &PipelineConfig) -> Self {
        let (version, stack) = split_version(record.stack(), config);
        let sysinfo = record.sysinfo();

        Self {
            timestamp: record.timestamp.clone(),
            sysinfo: sysinfo.map(str::to_string),
            comment: record
                .comment()
                .unwrap_or(config.not_provided.as_str())
                .to_string(),
            stack,
            version,
            date,
            os: sysinfo_value(&OS_PATTERN, sysinfo),
            machine: sysinfo_value(&MACHINE_PATTERN, sysinfo),
        }
    }
}

/// Split a leading `<prefix><version>` line off the stack
///
/// **Private** - returns (version, remaining stack)
fn split_version(stack: Option<&str>, config: &PipelineConfig) -> (String, Option<String>) {
    let Some(stack) = stack else {
        return (config.default_version.clone(), None);
    };

    if !stack.starts_with(&config.version_prefix) {
        return (config.default_version.clone(), Some(stack.to_string()));
    }

    match stack.split_once('\n') {
        Some((first, rest)) => (
            first[config.version_prefix.len()..].to_string(),
            Some(rest.to_string()),
        ),
        None => (
            stack[config.version_prefix.len()..].to_string(),
            Some(stack.to_string()),
        ),
    }
}

/// Trimmed text after a `platform.*` key in sysinfo, empty when absent
fn sysinfo_value(pattern: &LazyLock<Option<Regex>>, sysinfo: Option<&str>) -> String {
    let (Some(pattern), Some(sysinfo)) = (pattern.as_ref(), sysinfo) else {
        return String::new();
    };

    pattern
        .captures(sysinfo)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

/// Date encoded in an archive's file name
///
/// `exception_20140501.bz2` -> 2014-05-01. The last eight characters of the
/// name (after dropping the prefix and compression suffix) are read as
/// `YYYYMMDD`; anything else yields `None`.
pub fn archive_date(path: &Path) -> Option<NaiveDate> {
    let name = path.file_name()?.to_string_lossy();
    let stem = name
        .replace("exception_", "")
        .replace(COMPRESSED_SUFFIX, "");

    let chars: Vec<char> = stem.chars().collect();
    if chars.len() < 8 {
        return None;
    }
    let digits: String = chars[chars.len() - 8..].iter().collect();

    NaiveDate::parse_from_str(&digits, "%Y%m%d").ok()
}

/// Capability the pipeline needs from storage
pub trait ReportSink {
    /// Accept a report, or reject it without affecting its siblings
    fn accept(&mut self, report: &CrashReport) -> Result<(), SinkError>;

    /// Reports accepted so far, in arrival order
    fn reports(&self) -> &[CrashReport];
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn record(stack: Option<&str>, sysinfo: Option<&str>) -> RawRecord {
        RawRecord::new(0, Some("1400000000.5".to_string()))
            .with_field("sysinfo", sysinfo.map(str::to_string))
            .with_field("comments", None)
            .with_field("stack", stack.map(str::to_string))
    }

    #[test]
    fn test_version_line_is_split_off() {
        let config = PipelineConfig::default();
        let report = CrashReport::from_record(
            &record(Some("Tribler version: 6.2.0\nFile \"a.py\", line 1, in foo"), None),
            None,
            &config,
        );

        assert_eq!(report.version, "6.2.0");
        assert_eq!(report.stack.as_deref(), Some("File \"a.py\", line 1, in foo"));
        assert_eq!(report.comment, "Not provided");
    }

    #[test]
    fn test_stack_without_version_line() {
        let config = PipelineConfig::default();
        let report = CrashReport::from_record(&record(Some("File \"a.py\", line 1, in foo"), None), None, &config);

        assert_eq!(report.version, "x.x.x");
        assert_eq!(report.stack.as_deref(), Some("File \"a.py\", line 1, in foo"));
    }

    #[test]
    fn test_os_and_machine_from_sysinfo() {
        let config = PipelineConfig::default();
        let sysinfo = "platform\tlinux2\nplatform.details\t Linux-3.13-x86_64 \nplatform.machine\tx86_64\n";
        let report = CrashReport::from_record(&record(None, Some(sysinfo)), None, &config);

        assert_eq!(report.os, "Linux-3.13-x86_64");
        assert_eq!(report.machine, "x86_64");
        assert_eq!(report.stack, None);
    }

    #[test]
    fn test_archive_date() {
        assert_eq!(
            archive_date(&PathBuf::from("/in/exception_20140501.bz2")),
            NaiveDate::from_ymd_opt(2014, 5, 1)
        );
        assert_eq!(
            archive_date(&PathBuf::from("exception_20131231")),
            NaiveDate::from_ymd_opt(2013, 12, 31)
        );
        assert_eq!(archive_date(&PathBuf::from("exception_x.bz2")), None);
    }
}
