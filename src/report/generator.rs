//! Console report generation.
//!
//! Every analysis produces one report value. It renders as human-readable
//! text for the terminal or as pretty JSON for scripting.

use crate::analysis::derive::{CoordinationGap, TurnStageMeans};
use crate::analysis::stats::Summary;
use crate::models::{Outlier, RequestPhases, StepBreakdown, StepSeries, WorkerTimings};
use crate::scanner::ScanStats;
use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A report that can be printed as text.
pub trait TextReport: Serialize {
    fn to_text(&self) -> String;
}

/// Generate a JSON report.
pub fn generate_json_report<R: Serialize>(report: &R) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Summary of one event's samples, or `None` when nothing was logged.
#[derive(Debug, Clone, Serialize)]
pub struct EventSummary {
    pub event: String,
    pub label: String,
    pub summary: Option<Summary>,
}

/// Event summaries for one step (or all steps when `step` is `None`).
#[derive(Debug, Clone, Serialize)]
pub struct CdfSection {
    pub step: Option<i64>,
    pub events: Vec<EventSummary>,
    pub chart: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CdfReport {
    pub sections: Vec<CdfSection>,
    pub stats: ScanStats,
}

impl TextReport for CdfReport {
    fn to_text(&self) -> String {
        let mut output = String::new();

        output.push_str("📊 Event Duration Distributions\n");
        for section in &self.sections {
            match section.step {
                Some(step) => output.push_str(&format!("\n  Step {}\n", step)),
                None => output.push_str("\n  All steps\n"),
            }
            for event in &section.events {
                output.push_str(&event_summary_block(&event.label, event.summary.as_ref()));
            }
            output.push_str(&chart_line(section.chart.as_ref()));
        }
        output.push_str(&scan_stats_line(&self.stats));

        output
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OverviewReport {
    pub event: String,
    pub durations: StepSeries,
    pub duration_summary: Option<Summary>,
    pub duration_outliers: Vec<Outlier>,
    pub intervals: StepSeries,
    pub interval_summary: Option<Summary>,
    pub interval_outliers: Vec<Outlier>,
    pub coordination: Option<CoordinationGap>,
    pub chart: Option<PathBuf>,
    pub stats: ScanStats,
}

impl TextReport for OverviewReport {
    fn to_text(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("📈 Step Overview (max `{}` per step)\n\n", self.event));

        output.push_str("  Step duration:\n");
        output.push_str(&series_rows(&self.durations));
        output.push_str(&event_summary_block("Step duration", self.duration_summary.as_ref()));
        output.push_str(&outlier_line(&self.duration_outliers));

        output.push_str("\n  Step-to-next-step start interval:\n");
        output.push_str(&series_rows(&self.intervals));
        output.push_str(&event_summary_block("Interval", self.interval_summary.as_ref()));
        output.push_str(&outlier_line(&self.interval_outliers));

        if let Some(gap) = &self.coordination {
            output.push_str("\n  Coordination:\n");
            output.push_str(&format!(
                "    Mean duration {:.2}s vs mean interval {:.2}s (gap {:.2}s, ratio {:.2}x)\n",
                gap.mean_duration, gap.mean_interval, gap.gap, gap.ratio
            ));
            if gap.interval_dominates {
                output.push_str("    ⚠️  Steps start later than the previous step finishes: time is lost between steps\n");
            }
        }

        output.push_str(&chart_line(self.chart.as_ref()));
        output.push_str(&scan_stats_line(&self.stats));

        output
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BreakdownReport {
    pub total_event: String,
    pub phase_events: Vec<String>,
    pub steps: Vec<StepBreakdown>,
    pub chart: Option<PathBuf>,
    pub stats: ScanStats,
}

impl TextReport for BreakdownReport {
    fn to_text(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("🧮 Share of `{}` per step\n\n", self.total_event));

        if self.steps.is_empty() {
            output.push_str("  No steps found.\n");
        } else {
            output.push_str(&format!("  {:>6}  {:>10}", "step", "total (s)"));
            for phase in &self.phase_events {
                output.push_str(&format!("  {:>16}", abbreviate(phase, 16)));
            }
            output.push('\n');

            for step in &self.steps {
                output.push_str(&format!("  {:>6}  {:>10.2}", step.step, step.total));
                for phase in &self.phase_events {
                    match step.shares.iter().find(|(name, _)| name == phase) {
                        Some((_, pct)) => output.push_str(&format!("  {:>15.1}%", pct)),
                        None => output.push_str(&format!("  {:>16}", "-")),
                    }
                }
                output.push('\n');
            }
        }

        output.push_str(&chart_line(self.chart.as_ref()));
        output.push_str(&scan_stats_line(&self.stats));

        output
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkersReport {
    pub step: i64,
    pub total_event: String,
    pub workers: Vec<WorkerTimings>,
    pub charts: Vec<PathBuf>,
    pub stats: ScanStats,
}

impl TextReport for WorkersReport {
    fn to_text(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("👷 Worker timings for step {}\n", self.step));

        if self.workers.is_empty() {
            output.push_str("\n  No worker files found.\n");
        }

        for worker in &self.workers {
            output.push_str(&format!("\n  {}\n", worker.worker));
            match worker.get(&self.total_event) {
                Some(total) => output.push_str(&format!("    Total duration: {:.3}s\n", total)),
                None => output.push_str("    Total duration: N/A\n"),
            }
            if let Some((event, d)) = worker.longest() {
                output.push_str(&format!("    Longest: {} ({:.3}s)\n", event, d));
            }
            if let Some((event, d)) = worker.shortest() {
                output.push_str(&format!("    Shortest: {} ({:.6}s)\n", event, d));
            }
        }

        for chart in &self.charts {
            output.push_str(&chart_line(Some(chart)));
        }
        output.push_str(&scan_stats_line(&self.stats));

        output
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestsReport {
    pub step: Option<i64>,
    pub requests: usize,
    pub duration_summary: Option<Summary>,
    pub selected: Vec<RequestPhases>,
    /// Phase rows printed per selected request.
    #[serde(skip)]
    pub phase_rows: usize,
    pub charts: Vec<PathBuf>,
    pub stats: ScanStats,
}

impl TextReport for RequestsReport {
    fn to_text(&self) -> String {
        let mut output = String::new();

        match self.step {
            Some(step) => output.push_str(&format!("🔎 Requests in step {}\n\n", step)),
            None => output.push_str("🔎 Requests across all steps\n\n"),
        }
        output.push_str(&format!("  Found {} completed requests\n", self.requests));
        output.push_str(&event_summary_block("Request duration", self.duration_summary.as_ref()));

        if !self.selected.is_empty() {
            output.push_str(&format!(
                "\n  Analyzing {} selected slow requests:\n",
                self.selected.len()
            ));
        }

        for (i, request) in self.selected.iter().enumerate() {
            output.push_str(&request_block(i + 1, request, self.phase_rows));
        }

        for chart in &self.charts {
            output.push_str(&chart_line(Some(chart)));
        }
        output.push_str(&scan_stats_line(&self.stats));

        output
    }
}

fn request_block(index: usize, request: &RequestPhases, rows: usize) -> String {
    let mut block = String::new();

    let Some(summary) = &request.summary else {
        block.push_str(&format!("\n  Request {}: no completion record\n", index));
        return block;
    };

    block.push_str(&format!(
        "\n  Request {}: {}... ({:.2}s)\n",
        index,
        summary.short_id(),
        summary.duration
    ));
    block.push_str(&format!("    - Turns: {}\n", summary.turns));
    block.push_str(&format!(
        "    - Response Length: {} tokens\n",
        summary.response_length
    ));
    block.push_str(&format!("    - Finish Reason: {}\n", summary.finish_reason_short()));
    block.push_str(&format!("    - Batch Data ID: {}\n", summary.batch_data_id));

    if request.table.is_empty() {
        block.push_str("    - No detailed phase data available\n");
    } else {
        block.push_str("    - Phase breakdown:\n");
        for share in request.table.iter().take(rows) {
            block.push_str(&format!(
                "        {}: {:.3}s ({:.1}%)\n",
                share.phase, share.duration, share.percentage
            ));
        }
    }

    block
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnsReport {
    pub stages: Vec<String>,
    pub turns: Vec<TurnStageMeans>,
    pub chart: Option<PathBuf>,
    pub stats: ScanStats,
}

impl TextReport for TurnsReport {
    fn to_text(&self) -> String {
        let mut output = String::new();

        output.push_str("🔁 Mean stage duration per turn (s)\n\n");

        if self.turns.is_empty() {
            output.push_str("  No turn timings found.\n");
        } else {
            output.push_str(&format!("  {:>5}", "turn"));
            for stage in &self.stages {
                output.push_str(&format!("  {:>14}", abbreviate(stage, 14)));
            }
            output.push_str(&format!("  {:>8}\n", "samples"));

            for turn in &self.turns {
                output.push_str(&format!("  {:>5}", turn.turn));
                for stage in &self.stages {
                    match turn.means.get(stage) {
                        Some(mean) => output.push_str(&format!("  {:>14.4}", mean)),
                        None => output.push_str(&format!("  {:>14}", "-")),
                    }
                }
                output.push_str(&format!("  {:>8}\n", turn.samples));
            }
        }

        output.push_str(&chart_line(self.chart.as_ref()));
        output.push_str(&scan_stats_line(&self.stats));

        output
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnDistReport {
    /// Turn count → mean completion duration per step.
    pub by_turns: BTreeMap<i64, StepSeries>,
    pub chart: Option<PathBuf>,
    pub stats: ScanStats,
}

impl TextReport for TurnDistReport {
    fn to_text(&self) -> String {
        let mut output = String::new();

        output.push_str("📉 Mean request duration by turn count\n");

        if self.by_turns.is_empty() {
            output.push_str("\n  No completed requests found.\n");
        }

        for (turns, series) in &self.by_turns {
            output.push_str(&format!(
                "\n  {} turn{} ({} steps):\n",
                turns,
                if *turns == 1 { "" } else { "s" },
                series.len()
            ));
            output.push_str(&series_rows(series));
        }

        output.push_str(&chart_line(self.chart.as_ref()));
        output.push_str(&scan_stats_line(&self.stats));

        output
    }
}

/// Summary block for one labelled sample set.
fn event_summary_block(label: &str, summary: Option<&Summary>) -> String {
    let Some(summary) = summary else {
        return format!("    {}: no data\n", label);
    };

    let mut block = String::new();
    block.push_str(&format!(
        "    {}: {} samples (mean: {:.2}s, median: {:.2}s, std: {:.2}s)\n",
        label,
        format_count(summary.count),
        summary.mean,
        summary.median,
        summary.std
    ));
    block.push_str(&format!(
        "      min {:.3}s, max {:.3}s\n",
        summary.min, summary.max
    ));

    let percentiles: Vec<String> = summary
        .percentiles
        .iter()
        .map(|pv| format!("P{}: {:.2}s", pv.percentile, pv.value))
        .collect();
    if !percentiles.is_empty() {
        block.push_str(&format!("      {}\n", percentiles.join(", ")));
    }

    block
}

fn series_rows(series: &StepSeries) -> String {
    if series.is_empty() {
        return "    (none)\n".to_string();
    }
    series
        .steps
        .iter()
        .zip(&series.values)
        .map(|(step, value)| format!("    step {:>5}: {:>10.2}s\n", step, value))
        .collect()
}

fn outlier_line(outliers: &[Outlier]) -> String {
    if outliers.is_empty() {
        return String::new();
    }
    let listed: Vec<String> = outliers.iter().map(ToString::to_string).collect();
    format!("    ⚠️  Outliers: {}\n", listed.join(", "))
}

fn chart_line(chart: Option<&PathBuf>) -> String {
    match chart {
        Some(path) => format!("\n  📁 Chart saved to: {}\n", path.display()),
        None => String::new(),
    }
}

/// Trailing line describing how much input was consumed.
pub fn scan_stats_line(stats: &ScanStats) -> String {
    let mut line = format!(
        "\n  Read {} records from {} files",
        format_count(stats.records),
        stats.files_read
    );
    if stats.skipped_lines > 0 {
        line.push_str(&format!(", skipped {} malformed lines", stats.skipped_lines));
    }
    if stats.unreadable_files > 0 {
        line.push_str(&format!(", {} unreadable files", stats.unreadable_files));
    }
    line.push('\n');
    line
}

/// `1234567` → `1,234,567`.
fn format_count(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Shorten an event name to a column width, keeping its start.
fn abbreviate(name: &str, width: usize) -> String {
    let name = name.strip_suffix("_duration").unwrap_or(name);
    if name.chars().count() <= width {
        name.to_string()
    } else {
        name.chars().take(width).collect()
    }
}
