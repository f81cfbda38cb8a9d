//! Run context injected into every analysis step.
//!
//! Carries the log target used by all library log lines and where
//! diagnostic plots go. Plot rendering never affects numeric results: a
//! failed plot is reported with `log::warn!` and otherwise ignored.

use std::fs;
use std::path::{Path, PathBuf};

use plotters::coord::Shift;
use plotters::prelude::*;
use serde::{Deserialize, Serialize};

/// Log target used when none is configured
pub const DEFAULT_LOG_TARGET: &str = "deblend_sim";

/// Result type of the plot drawing functions
pub type PlotResult = Result<(), Box<dyn std::error::Error>>;

/// Where diagnostic plots are written
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlotOutput {
    /// Headless: nothing is rendered
    #[default]
    Disabled,
    /// PNG files in this directory
    Directory(PathBuf),
}

#[derive(Debug, Clone)]
pub struct RunContext {
    log_target: String,
    plots: PlotOutput,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::headless()
    }
}

impl RunContext {
    pub fn new(log_target: impl Into<String>, plots: PlotOutput) -> Self {
        Self {
            log_target: log_target.into(),
            plots,
        }
    }

    /// Default log target, plots disabled
    pub fn headless() -> Self {
        Self::new(DEFAULT_LOG_TARGET, PlotOutput::Disabled)
    }

    /// Default log target, plots written under `dir`
    pub fn with_plot_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self::new(
            DEFAULT_LOG_TARGET,
            PlotOutput::Directory(dir.as_ref().to_path_buf()),
        )
    }

    pub fn target(&self) -> &str {
        &self.log_target
    }

    pub fn plots(&self) -> &PlotOutput {
        &self.plots
    }

    pub fn plots_enabled(&self) -> bool {
        matches!(self.plots, PlotOutput::Directory(_))
    }

    /// Render one PNG named `<name>.png` in the plot directory.
    ///
    /// Returns the written path, or `None` when plots are disabled or
    /// drawing failed.
    pub fn render<F>(&self, name: &str, size: (u32, u32), draw: F) -> Option<PathBuf>
    where
        F: FnOnce(&DrawingArea<BitMapBackend, Shift>) -> PlotResult,
    {
        let PlotOutput::Directory(dir) = &self.plots else {
            return None;
        };
        let path = dir.join(format!("{}.png", sanitize(name)));

        match render_png(&path, size, draw) {
            Ok(()) => {
                log::debug!(target: self.target(), "Plot saved to: {}", path.display());
                Some(path)
            }
            Err(e) => {
                log::warn!(target: self.target(), "Failed to render plot '{name}': {e}");
                None
            }
        }
    }
}

fn render_png<F>(path: &Path, size: (u32, u32), draw: F) -> PlotResult
where
    F: FnOnce(&DrawingArea<BitMapBackend, Shift>) -> PlotResult,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;
    draw(&root)?;
    root.present()?;
    Ok(())
}

/// File-name safe version of a plot name
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
