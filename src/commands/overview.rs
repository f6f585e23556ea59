//! `overview`: step durations against step-to-step start intervals.

use super::Context;
use crate::analysis::derive;
use crate::analysis::stats;
use crate::models::StepSeries;
use crate::report::charts::{self, LineChart, Series, SeriesStyle};
use crate::report::OverviewReport;
use anyhow::Result;
use tracing::info;

const DURATION_COLOR: &str = "#C73E1D";
const INTERVAL_COLOR: &str = "#2E86AB";

pub fn run(ctx: &Context) -> Result<()> {
    let report = analyze(ctx)?;
    ctx.emit(&report)
}

pub fn analyze(ctx: &Context) -> Result<OverviewReport> {
    let config = &ctx.config.overview;
    let aggregator = ctx.aggregator();

    let durations = aggregator.collect_max_per_step(&config.event)?;
    info!("Found {} steps reporting `{}`", durations.data.len(), config.event);

    let starts = aggregator.collect_step_start_times()?;
    let intervals = derive::step_intervals(&starts.data);
    info!("Derived {} step-to-step intervals", intervals.len());

    let mut scan_stats = durations.stats;
    scan_stats += starts.stats;

    let chart = if durations.data.is_empty() && intervals.is_empty() {
        None
    } else {
        match ctx.chart_path("overview_duration.svg")? {
            Some(path) => {
                charts::render_line_chart(&overview_chart(&durations.data, &intervals)?, &path)?;
                Some(path)
            }
            None => None,
        }
    };

    Ok(OverviewReport {
        event: config.event.clone(),
        duration_summary: stats::summarize(&durations.data.values).ok(),
        duration_outliers: derive::flag_outliers(&durations.data, config.outlier_sigmas)
            .unwrap_or_default(),
        interval_summary: stats::summarize(&intervals.values).ok(),
        interval_outliers: derive::flag_outliers(&intervals, config.outlier_sigmas)
            .unwrap_or_default(),
        coordination: derive::coordination_gap(&durations.data.values, &intervals.values).ok(),
        durations: durations.data,
        intervals,
        chart,
        stats: scan_stats,
    })
}

fn overview_chart(
    durations: &StepSeries,
    intervals: &StepSeries,
) -> crate::error::AnalysisResult<LineChart> {
    let mut chart = LineChart::new(
        "Step Duration vs Step-to-Next-Step Start Interval",
        "Step",
        "Seconds",
    );
    chart.series.push(
        Series::new(
            "Step Duration (max across workers)",
            charts::parse_color(DURATION_COLOR)?,
            SeriesStyle::LinePoints,
        )
        .with_points(durations.points()),
    );
    if !intervals.is_empty() {
        chart.series.push(
            Series::new(
                "Step Start Interval",
                charts::parse_color(INTERVAL_COLOR)?,
                SeriesStyle::LinePoints,
            )
            .with_points(intervals.points()),
        );
    }
    Ok(chart)
}
