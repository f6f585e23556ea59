//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::analysis::derive::RankSlice;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// rollout-profiler - timing analysis for rollout JSONL event logs
///
/// Reads `step_<n>/<worker>.jsonl` logs and prints duration statistics,
/// writing SVG charts alongside.
///
/// Examples:
///   rollout-profiler --log-dir ./logs cdf --step 31,32
///   rollout-profiler --log-dir ./logs overview --first-step 1 --last-step 80
///   rollout-profiler --log-dir ./logs requests --rank 50:60,-2:
///   rollout-profiler --log-dir ./logs --format json turns
///   rollout-profiler init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file
    ///
    /// If not specified, looks for .rollout-profiler.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Root directory holding the step_<n>/ log directories
    #[arg(short, long, value_name = "DIR", env = "ROLLOUT_LOG_DIR", global = true)]
    pub log_dir: Option<PathBuf>,

    /// Directory chart images are written to
    #[arg(short, long, value_name = "DIR", global = true)]
    pub output_dir: Option<PathBuf>,

    /// First step to include in all-steps analyses
    #[arg(long, value_name = "STEP", global = true)]
    pub first_step: Option<i64>,

    /// Last step to include in all-steps analyses
    #[arg(long, value_name = "STEP", global = true)]
    pub last_step: Option<i64>,

    /// Console output format (text, json)
    #[arg(long, default_value = "text", value_name = "FORMAT", global = true)]
    pub format: OutputFormat,

    /// Print statistics only, do not write chart images
    #[arg(long, global = true)]
    pub no_charts: bool,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output, no progress bar)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Analyses, one per subcommand.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Per-event duration summaries and a CDF chart per target step
    Cdf {
        /// Steps to analyze one by one (comma-separated); overrides [cdf] target_steps
        #[arg(long = "step", value_name = "STEPS", value_delimiter = ',')]
        steps: Vec<i64>,
    },

    /// Max step duration and step-to-step start intervals
    Overview,

    /// Phase events as a percentage of the step total
    Breakdown,

    /// Duration events of every worker in one step
    Workers {
        /// Step to chart; overrides [workers] step
        #[arg(long, value_name = "STEP")]
        step: Option<i64>,
    },

    /// Request duration CDF and phase breakdown of the slowest requests
    Requests {
        /// Only read this step directory; overrides [requests] step
        #[arg(long, value_name = "STEP")]
        step: Option<i64>,

        /// Rank slices of the slowest-first list (comma-separated), e.g. 0:10,-2:
        #[arg(long = "rank", value_name = "SLICES", value_delimiter = ',', allow_hyphen_values = true)]
        ranks: Vec<String>,
    },

    /// Mean stage duration per turn
    Turns,

    /// Mean request duration per turn count, per step
    TurnDist,

    /// Generate a default .rollout-profiler.toml configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Output format for console reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text (default)
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let (Some(first), Some(last)) = (self.first_step, self.last_step) {
            if first > last {
                return Err(format!(
                    "--first-step ({}) must not be greater than --last-step ({})",
                    first, last
                ));
            }
        }

        if let Command::Requests { ranks, .. } = &self.command {
            for rank in ranks {
                rank.parse::<RankSlice>().map_err(|e| e.to_string())?;
            }
        }

        // Validate log directory if provided
        if let Some(ref log_dir) = self.log_dir {
            if !log_dir.is_dir() {
                return Err(format!(
                    "Log directory does not exist or is not a directory: {}",
                    log_dir.display()
                ));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            command: Command::Overview,
            config: None,
            log_dir: None,
            output_dir: None,
            first_step: None,
            last_step: None,
            format: OutputFormat::Text,
            no_charts: false,
            verbose: false,
            quiet: false,
        }
    }

    #[test]
    fn test_parse_subcommand_with_global_flags() {
        let args = Args::try_parse_from([
            "rollout-profiler",
            "requests",
            "--rank",
            "50:60,-2:",
            "--format",
            "json",
            "--no-charts",
        ])
        .unwrap();

        assert_eq!(args.format, OutputFormat::Json);
        assert!(args.no_charts);
        assert_eq!(
            args.command,
            Command::Requests {
                step: None,
                ranks: vec!["50:60".to_string(), "-2:".to_string()],
            }
        );
    }

    #[test]
    fn test_parse_cdf_steps() {
        let args = Args::try_parse_from(["rollout-profiler", "cdf", "--step", "31,32"]).unwrap();
        assert_eq!(args.command, Command::Cdf { steps: vec![31, 32] });
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_step_range() {
        let mut args = make_args();
        args.first_step = Some(10);
        args.last_step = Some(2);
        assert!(args.validate().is_err());

        args.last_step = Some(10);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_bad_rank() {
        let mut args = make_args();
        args.command = Command::Requests {
            step: None,
            ranks: vec!["ten".to_string()],
        };
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_missing_log_dir() {
        let mut args = make_args();
        args.log_dir = Some(PathBuf::from("/definitely/not/here"));
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
