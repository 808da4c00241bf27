//! Configuration and constants for the pipeline.

use super::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Keys kept from a record's `post` list when no config overrides them
pub const DEFAULT_COMPULSORY_FIELDS: &[&str] = &["sysinfo", "comments", "stack", "remote_host"];

// Well-known post keys the pipeline reads back out of a record
pub const FIELD_SYSINFO: &str = "sysinfo";
pub const FIELD_COMMENTS: &str = "comments";
pub const FIELD_STACK: &str = "stack";
pub const FIELD_REMOTE_HOST: &str = "remote_host";

/// File name prefix shared by all crash archives
pub const ARCHIVE_PREFIX: &str = "exception";

/// Suffix of the compressed archive form
pub const COMPRESSED_SUFFIX: &str = ".bz2";

/// Comment value clients send when the user typed nothing
pub const NOT_PROVIDED: &str = "Not provided";

/// First line some clients prepend to the stack text
pub const VERSION_PREFIX: &str = "Tribler version: ";

/// Version recorded when the stack carries no version line
pub const DEFAULT_VERSION: &str = "x.x.x";

/// Read size used when inflating archives
pub const DECODE_CHUNK_SIZE: usize = 64 * 1024;

/// Default flamegraph title and width
pub const DEFAULT_FLAMEGRAPH_TITLE: &str = "Crash Stacks";
pub const DEFAULT_FLAMEGRAPH_WIDTH: usize = 1200;

/// Complete pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Post keys copied into every record (missing ones become null)
    pub compulsory_fields: Vec<String>,

    /// Only files starting with this prefix are treated as archives
    pub archive_prefix: String,

    /// Sentinel comment merged into a single report line
    pub not_provided: String,

    /// Stack prefix carrying the client version
    pub version_prefix: String,

    /// Version used when no version line is present
    pub default_version: String,

    /// Overwrite per-archive reports that already exist
    pub force: bool,

    /// Flamegraph rendering settings
    pub flamegraph: FlamegraphSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            compulsory_fields: DEFAULT_COMPULSORY_FIELDS
                .iter()
                .map(|f| f.to_string())
                .collect(),
            archive_prefix: ARCHIVE_PREFIX.to_string(),
            not_provided: NOT_PROVIDED.to_string(),
            version_prefix: VERSION_PREFIX.to_string(),
            default_version: DEFAULT_VERSION.to_string(),
            force: false,
            flamegraph: FlamegraphSettings::default(),
        }
    }
}

/// `[flamegraph]` table
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FlamegraphSettings {
    pub title: String,
    pub width: usize,

    /// External renderer (e.g. flamegraph.pl). In-process inferno when unset.
    pub command: Option<PathBuf>,
}

impl Default for FlamegraphSettings {
    fn default() -> Self {
        Self {
            title: DEFAULT_FLAMEGRAPH_TITLE.to_string(),
            width: DEFAULT_FLAMEGRAPH_WIDTH,
            command: None,
        }
    }
}

impl PipelineConfig {
    /// Check the invariants serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.compulsory_fields.iter().any(|f| f == FIELD_STACK) {
            return Err(ConfigError::Invalid(format!(
                "compulsory_fields must include `{}`",
                FIELD_STACK
            )));
        }
        if self.archive_prefix.is_empty() {
            return Err(ConfigError::Invalid("archive_prefix is empty".to_string()));
        }
        if self.flamegraph.width == 0 {
            return Err(ConfigError::Invalid("flamegraph width must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Load pipeline configuration from a TOML file
///
/// # Errors
/// * `ConfigError::Io` - If file cannot be read
/// * `ConfigError::Parse` - If TOML is invalid
/// * `ConfigError::Invalid` - If values break an invariant
///
/// # Example
/// ```ignore
/// let config = load_config("crashfold.toml")?;
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<PipelineConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    let config: PipelineConfig = toml::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_fields_include_remote_host() {
        let config = PipelineConfig::default();
        assert_eq!(
            config.compulsory_fields,
            vec!["sysinfo", "comments", "stack", "remote_host"]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_config() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "compulsory_fields = [\"sysinfo\", \"comments\", \"stack\"]\n\n[flamegraph]\ncommand = \"/opt/FlameGraph/flamegraph.pl\""
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.compulsory_fields.len(), 3);
        assert_eq!(config.not_provided, NOT_PROVIDED);
        assert_eq!(config.flamegraph.width, DEFAULT_FLAMEGRAPH_WIDTH);
        assert_eq!(
            config.flamegraph.command,
            Some(PathBuf::from("/opt/FlameGraph/flamegraph.pl"))
        );
    }

    #[test]
    fn test_config_without_stack_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "compulsory_fields = [\"comments\"]").unwrap();

        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
