//! `workers`: duration events of every worker in one step.

use super::Context;
use crate::error::AnalysisError;
use crate::models::{WorkerTimings, TOTAL_STEP_EVENT};
use crate::report::charts::{self, Bar, BarChart};
use crate::report::WorkersReport;
use anyhow::{Context as _, Result};
use tracing::info;

pub fn run(ctx: &Context) -> Result<()> {
    let report = analyze(ctx)?;
    ctx.emit(&report)
}

pub fn analyze(ctx: &Context) -> Result<WorkersReport> {
    let config = &ctx.config.workers;
    let step = config
        .step
        .context("No step selected: pass `workers --step <N>` or set [workers] step")?;

    let collected = ctx.aggregator().collect_worker_timings(step, &config.key_events)?;
    if collected.data.is_empty() {
        return Err(AnalysisError::UnknownStep(step).into());
    }
    info!("Found {} workers in step {}", collected.data.len(), step);

    let mut charts_written = Vec::new();
    for worker in collected.data.iter().filter(|w| !w.events.is_empty()) {
        if let Some(path) = ctx.chart_path(&format!("step_{}_{}.svg", step, worker.worker))? {
            charts::render_bar_chart(&worker_chart(step, worker), &path)?;
            charts_written.push(path);
        }
    }

    Ok(WorkersReport {
        step,
        total_event: TOTAL_STEP_EVENT.to_string(),
        workers: collected.data,
        charts: charts_written,
        stats: collected.stats,
    })
}

fn worker_chart(step: i64, worker: &WorkerTimings) -> BarChart {
    BarChart {
        title: format!("Step {} Timing Breakdown - {}", step, worker.worker),
        y_desc: "Duration (seconds)".to_string(),
        bars: worker
            .events
            .iter()
            .enumerate()
            .map(|(i, (event, duration))| Bar {
                label: event.clone(),
                value: *duration,
                color: charts::palette(i),
            })
            .collect(),
    }
}
