//! `turns` and `turn-dist`: multi-turn request timing.

use super::Context;
use crate::analysis::derive::{self, TurnStageMeans};
use crate::models::StepSeries;
use crate::report::charts::{self, Bar, BarChart, LineChart, Series, SeriesStyle};
use crate::report::{TurnDistReport, TurnsReport};
use anyhow::Result;
use std::collections::BTreeMap;
use tracing::{info, warn};

pub fn run_stages(ctx: &Context) -> Result<()> {
    let report = analyze_stages(ctx)?;
    ctx.emit(&report)
}

pub fn run_distribution(ctx: &Context) -> Result<()> {
    let report = analyze_distribution(ctx)?;
    ctx.emit(&report)
}

/// Per turn, the mean of every configured stage.
pub fn analyze_stages(ctx: &Context) -> Result<TurnsReport> {
    let config = &ctx.config.turns;
    let completion_event = &ctx.config.requests.completion_event;

    let samples = ctx
        .aggregator()
        .collect_turn_stage_samples(completion_event, &config.stages)?;
    let turns = derive::turn_stage_means(&samples.data);
    info!("Found timings for {} turns", turns.len());

    let chart = match stage_chart(&turns, &config.chart_stage) {
        Some(chart) => match ctx.chart_path("turn_stage_means.svg")? {
            Some(path) => {
                charts::render_bar_chart(&chart, &path)?;
                Some(path)
            }
            None => None,
        },
        None => {
            warn!("No `{}` samples, skipping chart", config.chart_stage);
            None
        }
    };

    Ok(TurnsReport {
        stages: config.stages.clone(),
        turns,
        chart,
        stats: samples.stats,
    })
}

/// Per step, the mean completion duration of requests with each turn count.
pub fn analyze_distribution(ctx: &Context) -> Result<TurnDistReport> {
    let completion_event = &ctx.config.requests.completion_event;

    let durations = ctx.aggregator().collect_turn_count_durations(completion_event)?;
    let by_turns = derive::turn_count_means(&durations.data);
    info!(
        "Found {} distinct turn counts over {} steps",
        by_turns.len(),
        durations.data.len()
    );

    let chart = if by_turns.is_empty() {
        None
    } else {
        match ctx.chart_path("turn_distribution.svg")? {
            Some(path) => {
                charts::render_line_chart(&distribution_chart(&by_turns), &path)?;
                Some(path)
            }
            None => None,
        }
    };

    Ok(TurnDistReport {
        by_turns,
        chart,
        stats: durations.stats,
    })
}

fn stage_chart(turns: &[TurnStageMeans], stage: &str) -> Option<BarChart> {
    let bars: Vec<Bar> = turns
        .iter()
        .filter_map(|t| {
            t.means.get(stage).map(|mean| Bar {
                label: format!("Turn {}", t.turn),
                value: *mean,
                color: charts::palette(0),
            })
        })
        .collect();

    if bars.is_empty() {
        return None;
    }

    Some(BarChart {
        title: format!("Mean {} per Turn", stage),
        y_desc: "Duration (seconds)".to_string(),
        bars,
    })
}

fn distribution_chart(by_turns: &BTreeMap<i64, StepSeries>) -> LineChart {
    let mut chart = LineChart::new(
        "Mean Request Duration by Turn Count",
        "Step",
        "Duration (seconds)",
    );
    for (i, (turns, series)) in by_turns.iter().enumerate() {
        chart.series.push(
            Series::new(
                format!("{} turns", turns),
                charts::palette(i),
                SeriesStyle::LinePoints,
            )
            .with_points(series.points()),
        );
    }
    chart
}
