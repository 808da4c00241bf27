//! Render step: fold file in, flamegraph image out.
//!
//! Two renderers share one contract (`fold_path` -> `image_path`):
//! - in-process with inferno (the default)
//! - an external program such as Brendan Gregg's `flamegraph.pl`, given the
//!   fold path as its argument with stdout redirected to the image
//!
//! A render failure never invalidates the fold file; callers log it and
//! carry on.

use crate::utils::config::{FlamegraphSettings, DEFAULT_FLAMEGRAPH_TITLE, DEFAULT_FLAMEGRAPH_WIDTH};
use crate::utils::error::RenderError;
use inferno::flamegraph::{self, Options};
use log::{debug, info};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Flamegraph configuration
#[derive(Debug, Clone)]
pub struct FlamegraphConfig {
    pub title: String,
    pub width: usize,
}

impl Default for FlamegraphConfig {
    fn default() -> Self {
        Self {
            title: DEFAULT_FLAMEGRAPH_TITLE.to_string(),
            width: DEFAULT_FLAMEGRAPH_WIDTH,
        }
    }
}

impl FlamegraphConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }
}

/// Turns a fold file into an image
pub trait FlamegraphRenderer {
    fn render(&self, fold_path: &Path, image_path: &Path) -> Result<(), RenderError>;
}

/// Renders SVG in-process with inferno
#[derive(Debug, Clone, Default)]
pub struct InfernoRenderer {
    config: FlamegraphConfig,
}

impl InfernoRenderer {
    pub fn new(config: FlamegraphConfig) -> Self {
        Self { config }
    }
}

impl FlamegraphRenderer for InfernoRenderer {
    fn render(&self, fold_path: &Path, image_path: &Path) -> Result<(), RenderError> {
        let content = std::fs::read_to_string(fold_path)?;

        let mut options = Options::default();
        options.title = self.config.title.clone();
        options.image_width = Some(self.config.width);

        let writer = BufWriter::new(File::create(image_path)?);
        flamegraph::from_lines(&mut options, content.lines(), writer)
            .map_err(|e| RenderError::Svg(e.to_string()))?;

        info!("Rendered {} -> {}", fold_path.display(), image_path.display());
        Ok(())
    }
}

/// Runs an external renderer: `<program> <fold_path> > <image_path>`
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: PathBuf,
}

impl CommandRenderer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl FlamegraphRenderer for CommandRenderer {
    fn render(&self, fold_path: &Path, image_path: &Path) -> Result<(), RenderError> {
        let image = File::create(image_path)?;

        debug!(
            "Running {} {} > {}",
            self.program.display(),
            fold_path.display(),
            image_path.display()
        );

        let status = Command::new(&self.program)
            .arg(fold_path)
            .stdin(Stdio::null())
            .stdout(image)
            .status()?;

        if !status.success() {
            return Err(RenderError::ToolFailed {
                command: self.program.display().to_string(),
                status: status.to_string(),
            });
        }

        info!("Rendered {} -> {}", fold_path.display(), image_path.display());
        Ok(())
    }
}

/// Pick the renderer the settings ask for
pub fn renderer_from_settings(settings: &FlamegraphSettings) -> Box<dyn FlamegraphRenderer> {
    match &settings.command {
        Some(program) => Box::new(CommandRenderer::new(program.clone())),
        None => Box::new(InfernoRenderer::new(
            FlamegraphConfig::new()
                .with_title(settings.title.clone())
                .with_width(settings.width),
        )),
    }
}
