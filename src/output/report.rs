//! Aggregate HTML report for one archive.
//!
//! The document has two parts:
//! - stack groups, most frequent first, each with its comments compacted
//!   to one line per distinct text (all "not provided" comments share a
//!   single line) listing the contributing record ids
//! - one detail table per record in stream order, every compulsory field
//!   except `sysinfo`
//!
//! All free text is HTML-escaped and newlines become `<br/>`.

use super::validate_path;
use crate::aggregator::{Deduplicator, FingerprintedGroup};
use crate::parser::RawRecord;
use crate::utils::config::{PipelineConfig, FIELD_SYSINFO};
use crate::utils::error::OutputError;
use log::{debug, info};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// One compacted comment line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentLine {
    pub text: String,
    pub ids: Vec<u64>,
}

/// Result of a per-archive report request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    Skipped(PathBuf),
    Written(PathBuf),
}

/// Merge a group's comments by text
///
/// Explicit comments keep first-seen order (by sequence id); absent
/// comments and the `not_provided` sentinel are merged into one trailing
/// line.
pub fn compact_comments(group: &FingerprintedGroup, not_provided: &str) -> Vec<CommentLine> {
    let mut lines: Vec<CommentLine> = Vec::new();
    let mut missing: Vec<u64> = Vec::new();

    for (&id, comment) in &group.comments {
        match comment.as_deref() {
            None => missing.push(id),
            Some(text) if text == not_provided => missing.push(id),
            Some(text) => match lines.iter_mut().find(|l| l.text == text) {
                Some(line) => line.ids.push(id),
                None => lines.push(CommentLine {
                    text: text.to_string(),
                    ids: vec![id],
                }),
            },
        }
    }

    if !missing.is_empty() {
        lines.push(CommentLine {
            text: not_provided.to_string(),
            ids: missing,
        });
    }

    lines
}

/// Escape markup characters and turn newlines into `<br/>`
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.replace("\r\n", "\n").chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '\n' => out.push_str("<br/>"),
            c => out.push(c),
        }
    }
    out
}

fn format_ids(ids: &[u64]) -> String {
    let ids: Vec<String> = ids.iter().map(u64::to_string).collect();
    format!("[{}]", ids.join(", "))
}

/// Render the report document
///
/// **Public** - pure rendering, no I/O
///
/// # Arguments
/// * `title` - Report title (the archive stem)
/// * `records` - Every record of the archive, in stream order
/// * `dedup` - Groups built from those records
/// * `config` - Supplies the not-provided sentinel
pub fn build_report(
    title: &str,
    records: &[RawRecord],
    dedup: &Deduplicator,
    config: &PipelineConfig,
) -> String {
    let title = escape_text(&format!("Report-{}", title));
    let mut html = String::new();

    html.push_str("<html>\n<head>\n");
    html.push_str(&format!("  <title>{}</title>\n", title));
    html.push_str("</head>\n<body>\n");
    html.push_str(&format!("  <h1>{}</h1>\n", title));
    html.push_str(&format!("  <p>Total records: {}</p>\n", records.len()));
    html.push_str(&format!("  <p>Distinct stacks: {}</p>\n", dedup.len()));

    html.push_str("  <h2>Stacks</h2>\n  <table border=\"1\">\n");
    html.push_str("  <tr>\n    <th>count</th>\n    <th>stack</th>\n    <th>comments</th>\n  </tr>\n");
    for group in dedup.ranked() {
        let comments: Vec<String> = compact_comments(group, &config.not_provided)
            .iter()
            .map(|line| format!("{} {}", escape_text(&line.text), format_ids(&line.ids)))
            .collect();

        html.push_str("  <tr>\n");
        html.push_str(&format!("    <td>{}</td>\n", group.count));
        html.push_str(&format!("    <td>{}</td>\n", escape_text(&group.representative_stack)));
        html.push_str(&format!("    <td>{}</td>\n", comments.join("<br/>")));
        html.push_str("  </tr>\n");
    }
    html.push_str("  </table>\n");

    html.push_str("  <h2>Records</h2>\n");
    for record in records {
        html.push_str("  <table border=\"1\">\n");
        push_row(&mut html, "id", &record.sequence_id.to_string());
        push_row(&mut html, "timestamp", record.timestamp.as_deref().unwrap_or("None"));
        for (key, value) in &record.fields {
            if key == FIELD_SYSINFO {
                continue;
            }
            push_row(&mut html, key, value.as_deref().unwrap_or("None"));
        }
        html.push_str("  </table>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn push_row(html: &mut String, key: &str, value: &str) {
    html.push_str("  <tr>\n");
    html.push_str(&format!("    <th>{}</th>\n", escape_text(key)));
    html.push_str(&format!("    <td>{}</td>\n", escape_text(value)));
    html.push_str("  </tr>\n");
}

/// Report path for an archive: `<output_dir>/<archive stem>.html`
pub fn report_path(output_dir: &Path, archive_path: &Path) -> PathBuf {
    let stem = archive_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".to_string());
    output_dir.join(format!("{}.html", stem))
}

/// Write the report for one archive
///
/// An existing report is left alone unless `config.force` is set.
///
/// # Errors
/// * `OutputError::InvalidPath` - Path is invalid
/// * `OutputError::WriteFailed` - I/O error during write
pub fn write_archive_report(
    output_dir: &Path,
    archive_path: &Path,
    records: &[RawRecord],
    dedup: &Deduplicator,
    config: &PipelineConfig,
) -> Result<ReportOutcome, OutputError> {
    let path = report_path(output_dir, archive_path);

    if path.exists() && !config.force {
        debug!("Report exists, skipping: {}", path.display());
        return Ok(ReportOutcome::Skipped(path));
    }

    validate_path(&path)?;

    let title = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let html = build_report(&title, records, dedup, config);

    let mut writer = BufWriter::new(File::create(&path)?);
    writer.write_all(html.as_bytes())?;
    writer.flush()?;

    info!("Report written to {} ({} bytes)", path.display(), html.len());
    Ok(ReportOutcome::Written(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(id: u64, stack: Option<&str>, comment: Option<&str>) -> RawRecord {
        RawRecord::new(id, Some(format!("ts-{}", id)))
            .with_field("sysinfo", Some("platform.machine\tx86_64\n".to_string()))
            .with_field("comments", comment.map(str::to_string))
            .with_field("stack", stack.map(str::to_string))
    }

    #[test]
    fn test_escape_text() {
        assert_eq!(
            escape_text("<b>\"x\" & 'y'</b>\nnext"),
            "&lt;b&gt;&quot;x&quot; &amp; &#39;y&#39;&lt;/b&gt;<br/>next"
        );
    }

    #[test]
    fn test_compact_comments_merges_not_provided() {
        let mut dedup = Deduplicator::new();
        dedup.add_record(&record(0, Some("s"), Some("crashed on start")));
        dedup.add_record(&record(1, Some("s"), None));
        dedup.add_record(&record(2, Some("s"), Some("Not provided")));
        dedup.add_record(&record(3, Some("s"), Some("crashed on start")));
        dedup.add_record(&record(4, Some("s"), Some("other")));

        let lines = compact_comments(&dedup.groups()[0], "Not provided");
        assert_eq!(
            lines,
            vec![
                CommentLine { text: "crashed on start".to_string(), ids: vec![0, 3] },
                CommentLine { text: "other".to_string(), ids: vec![4] },
                CommentLine { text: "Not provided".to_string(), ids: vec![1, 2] },
            ]
        );
    }

    #[test]
    fn test_report_excludes_sysinfo_and_escapes() {
        let records = vec![
            record(0, Some("File \"<a>.py\", line 1, in foo\nValueError"), Some("a & b")),
            record(1, None, None),
        ];
        let mut dedup = Deduplicator::new();
        records.iter().for_each(|r| dedup.add_record(r));

        let html = build_report("exception_20140501", &records, &dedup, &PipelineConfig::default());

        assert!(html.contains("<title>Report-exception_20140501</title>"));
        assert!(html.contains("Total records: 2"));
        assert!(html.contains("Distinct stacks: 1"));
        assert!(html.contains("File &quot;&lt;a&gt;.py&quot;, line 1, in foo<br/>ValueError"));
        assert!(html.contains("a &amp; b [0]"));
        assert!(!html.contains("sysinfo"));
        assert!(!html.contains("x86_64"));
    }

    #[test]
    fn test_write_archive_report_respects_force() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Path::new("/in/exception_20140501.bz2");
        let records = vec![record(0, Some("s"), None)];
        let mut dedup = Deduplicator::new();
        dedup.add_record(&records[0]);

        let mut config = PipelineConfig::default();
        let path = dir.path().join("exception_20140501.html");
        assert_eq!(
            write_archive_report(dir.path(), archive, &records, &dedup, &config).unwrap(),
            ReportOutcome::Written(path.clone())
        );
        assert_eq!(
            write_archive_report(dir.path(), archive, &records, &dedup, &config).unwrap(),
            ReportOutcome::Skipped(path.clone())
        );

        config.force = true;
        assert_eq!(
            write_archive_report(dir.path(), archive, &records, &dedup, &config).unwrap(),
            ReportOutcome::Written(path)
        );
    }
}
