//! One module per analysis subcommand.
//!
//! Each command pulls data through the [`LogAggregator`], derives its
//! statistics, prints a report and renders its charts.

pub mod breakdown;
pub mod cdf;
pub mod overview;
pub mod requests;
pub mod turns;
pub mod workers;

use crate::analysis::{AggregatorConfig, LogAggregator};
use crate::cli::{Command, OutputFormat};
use crate::config::Config;
use crate::report::{generate_json_report, TextReport};
use crate::scanner::ScanConfig;
use anyhow::{Context as _, Result};
use std::path::PathBuf;
use tracing::debug;

/// Settings shared by every command run.
#[derive(Debug, Clone)]
pub struct Context {
    pub config: Config,
    pub format: OutputFormat,
    pub show_progress: bool,
}

impl Context {
    pub fn new(config: Config, format: OutputFormat, show_progress: bool) -> Self {
        Self {
            config,
            format,
            show_progress,
        }
    }

    pub fn aggregator(&self) -> LogAggregator {
        let mut config = AggregatorConfig::new(self.config.general.log_dir.clone());
        config.scan = ScanConfig::from(&self.config.scan);
        config.show_progress = self.show_progress;
        LogAggregator::new(config)
    }

    /// Where to write the chart `name`, creating the output directory.
    ///
    /// `None` when charts are disabled.
    pub fn chart_path(&self, name: &str) -> Result<Option<PathBuf>> {
        if !self.config.general.charts {
            return Ok(None);
        }

        let dir = &self.config.general.output_dir;
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;

        let path = dir.join(name);
        debug!("Chart path: {}", path.display());
        Ok(Some(path))
    }

    /// Print a report in the selected format.
    pub fn emit<R: TextReport>(&self, report: &R) -> Result<()> {
        let output = match self.format {
            OutputFormat::Json => generate_json_report(report)?,
            OutputFormat::Text => report.to_text(),
        };
        println!("{}", output);
        Ok(())
    }
}

/// Run one analysis command.
pub fn run(command: &Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Cdf { .. } => cdf::run(ctx),
        Command::Overview => overview::run(ctx),
        Command::Breakdown => breakdown::run(ctx),
        Command::Workers { .. } => workers::run(ctx),
        Command::Requests { .. } => requests::run(ctx),
        Command::Turns => turns::run_stages(ctx),
        Command::TurnDist => turns::run_distribution(ctx),
        Command::InitConfig { .. } => {
            anyhow::bail!("init-config is handled before any analysis runs")
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_chart_path_disabled() {
        let mut config = Config::default();
        config.general.charts = false;
        let ctx = Context::new(config, OutputFormat::Text, false);
        assert!(ctx.chart_path("x.svg").unwrap().is_none());
    }

    #[test]
    fn test_chart_path_creates_output_dir() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.general.output_dir = temp_dir.path().join("pics");
        let ctx = Context::new(config, OutputFormat::Text, false);

        let path = ctx.chart_path("x.svg").unwrap().unwrap();
        assert!(temp_dir.path().join("pics").is_dir());
        assert_eq!(path, temp_dir.path().join("pics").join("x.svg"));
    }
}
