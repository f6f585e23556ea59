//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.rollout-profiler.toml` files. Every analysis reads its event names,
//! steps and chart settings from here rather than from constants.

use crate::cli::Command;
use crate::models::{REQUEST_COMPLETE_EVENT, TOTAL_STEP_EVENT};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name.
pub const CONFIG_FILE: &str = ".rollout-profiler.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Log discovery settings.
    #[serde(default)]
    pub scan: ScanSettings,

    /// Event duration CDF settings.
    #[serde(default)]
    pub cdf: CdfConfig,

    /// Step duration / interval overview settings.
    #[serde(default)]
    pub overview: OverviewConfig,

    /// Percentage-of-total breakdown settings.
    #[serde(default)]
    pub breakdown: BreakdownConfig,

    /// Per-worker timing chart settings.
    #[serde(default)]
    pub workers: WorkersConfig,

    /// Request timeline settings.
    #[serde(default)]
    pub requests: RequestsConfig,

    /// Per-turn settings.
    #[serde(default)]
    pub turns: TurnsConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Root of the `step_<n>/` tree.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Directory chart images are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Write chart images (console output is always produced).
    #[serde(default = "default_true")]
    pub charts: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            output_dir: default_output_dir(),
            charts: true,
        }
    }
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("zpics")
}

fn default_true() -> bool {
    true
}

/// How step directories and worker files are recognized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSettings {
    #[serde(default = "default_step_prefix")]
    pub step_prefix: String,

    /// Worker file extension (without dot).
    #[serde(default = "default_extension")]
    pub extension: String,

    /// First step visited by all-steps analyses.
    #[serde(default)]
    pub first_step: Option<i64>,

    /// Last step visited by all-steps analyses.
    #[serde(default)]
    pub last_step: Option<i64>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            step_prefix: default_step_prefix(),
            extension: default_extension(),
            first_step: None,
            last_step: None,
        }
    }
}

fn default_step_prefix() -> String {
    "step_".to_string()
}

fn default_extension() -> String {
    "jsonl".to_string()
}

/// An event to chart, with its legend label and color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSpec {
    pub name: String,
    pub label: String,
    /// `#RRGGBB`.
    pub color: String,
}

impl EventSpec {
    fn new(name: &str, label: &str, color: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            color: color.to_string(),
        }
    }
}

/// Event duration CDF settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdfConfig {
    /// Steps to chart one by one. Empty means one chart over all steps.
    #[serde(default = "default_target_steps")]
    pub target_steps: Vec<i64>,

    /// Percentiles marked on the chart and printed.
    #[serde(default = "default_percentiles")]
    pub percentiles: Vec<f64>,

    /// Events to chart; percentile markers are drawn for the first.
    #[serde(default = "default_cdf_events")]
    pub events: Vec<EventSpec>,
}

impl Default for CdfConfig {
    fn default() -> Self {
        Self {
            target_steps: default_target_steps(),
            percentiles: default_percentiles(),
            events: default_cdf_events(),
        }
    }
}

fn default_target_steps() -> Vec<i64> {
    Vec::new()
}

fn default_cdf_events() -> Vec<EventSpec> {
    vec![EventSpec::new(REQUEST_COMPLETE_EVENT, "Total Request", "#C73E1D")]
}

fn default_percentiles() -> Vec<f64> {
    crate::analysis::stats::DEFAULT_PERCENTILES.to_vec()
}

/// Step duration / interval overview settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverviewConfig {
    /// Event whose per-worker maximum is a step's duration.
    #[serde(default = "default_total_event")]
    pub event: String,

    /// Values farther than this many standard deviations are outliers.
    #[serde(default = "default_outlier_sigmas")]
    pub outlier_sigmas: f64,
}

impl Default for OverviewConfig {
    fn default() -> Self {
        Self {
            event: default_total_event(),
            outlier_sigmas: default_outlier_sigmas(),
        }
    }
}

fn default_total_event() -> String {
    TOTAL_STEP_EVENT.to_string()
}

fn default_outlier_sigmas() -> f64 {
    2.0
}

/// Percentage-of-total breakdown settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakdownConfig {
    /// Denominator event.
    #[serde(default = "default_total_event")]
    pub total_event: String,

    /// Phase events expressed as a share of the total.
    #[serde(default = "default_phase_events")]
    pub phase_events: Vec<String>,
}

impl Default for BreakdownConfig {
    fn default() -> Self {
        Self {
            total_event: default_total_event(),
            phase_events: default_phase_events(),
        }
    }
}

fn default_phase_events() -> Vec<String> {
    to_strings(&[
        "async_generate_duration",
        "preprocessing_duration",
        "barrier_wait_duration",
    ])
}

/// Per-worker timing chart settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
    /// Step whose workers are charted.
    #[serde(default)]
    pub step: Option<i64>,

    /// Events shown first, in this order.
    #[serde(default = "default_key_events")]
    pub key_events: Vec<String>,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            step: None,
            key_events: default_key_events(),
        }
    }
}

fn default_key_events() -> Vec<String> {
    to_strings(&[
        "preprocessing_duration",
        "async_generate_duration",
        "sorting_duration",
        "barrier_wait_duration",
        "broadcast_duration",
        "data_extraction_duration",
        "padding_duration",
        "concatenation_duration",
        "batch_construction_duration",
        "cache_flush_duration",
        "final_construction_duration",
        TOTAL_STEP_EVENT,
    ])
}

/// Request timeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestsConfig {
    /// Event closing a request's timeline.
    #[serde(default = "default_completion_event")]
    pub completion_event: String,

    /// Restrict to one step directory; all steps when unset.
    #[serde(default)]
    pub step: Option<i64>,

    /// Rank slices of the slowest-first list to break down, e.g. `50:60`.
    #[serde(default = "default_ranks")]
    pub ranks: Vec<String>,

    /// Phase events summed per request.
    #[serde(default = "default_request_phases")]
    pub phases: Vec<String>,

    /// Phase rows printed per request.
    #[serde(default = "default_phase_rows")]
    pub phase_rows: usize,
}

impl Default for RequestsConfig {
    fn default() -> Self {
        Self {
            completion_event: default_completion_event(),
            step: None,
            ranks: default_ranks(),
            phases: default_request_phases(),
            phase_rows: default_phase_rows(),
        }
    }
}

fn default_completion_event() -> String {
    REQUEST_COMPLETE_EVENT.to_string()
}

fn default_ranks() -> Vec<String> {
    vec!["0:10".to_string()]
}

fn default_request_phases() -> Vec<String> {
    to_strings(&[
        "request_start",
        "main_loop",
        "pending_state_handling",
        "tool_calling_state",
        "tool_execution",
        "tool_response_processing",
        "tool_parsing",
        "running_state",
        "engine_call",
        "interacting_state",
        "interaction_response",
        "reward_calculation",
        "finalization",
        REQUEST_COMPLETE_EVENT,
    ])
}

fn default_phase_rows() -> usize {
    5
}

/// Per-turn settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnsConfig {
    /// Stage keys read from each `extra.turn_timings` entry.
    #[serde(default = "default_stages")]
    pub stages: Vec<String>,

    /// Stage charted per turn.
    #[serde(default = "default_chart_stage")]
    pub chart_stage: String,
}

impl Default for TurnsConfig {
    fn default() -> Self {
        Self {
            stages: default_stages(),
            chart_stage: default_chart_stage(),
        }
    }
}

fn default_stages() -> Vec<String> {
    to_strings(&[
        "pre_process_duration",
        "engine_call_duration",
        "post_process_duration",
        "tool_parsing_duration",
    ])
}

fn default_chart_stage() -> String {
    "engine_call_duration".to_string()
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, and only
    /// when they were given explicitly.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref log_dir) = args.log_dir {
            self.general.log_dir = log_dir.clone();
        }
        if let Some(ref output_dir) = args.output_dir {
            self.general.output_dir = output_dir.clone();
        }
        if args.first_step.is_some() {
            self.scan.first_step = args.first_step;
        }
        if args.last_step.is_some() {
            self.scan.last_step = args.last_step;
        }
        if args.no_charts {
            self.general.charts = false;
        }

        match &args.command {
            Command::Cdf { steps } if !steps.is_empty() => {
                self.cdf.target_steps = steps.clone();
            }
            Command::Workers { step: Some(step) } => {
                self.workers.step = Some(*step);
            }
            Command::Requests { step, ranks } => {
                if step.is_some() {
                    self.requests.step = *step;
                }
                if !ranks.is_empty() {
                    self.requests.ranks = ranks.clone();
                }
            }
            _ => {}
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> Result<String> {
        toml::to_string_pretty(&Config::default()).context("Failed to serialize default config")
    }
}
