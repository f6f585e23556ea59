//! `cdf`: per-event duration distributions for selected steps.

use super::Context;
use crate::analysis::stats::{self, Summary};
use crate::config::EventSpec;
use crate::error::AnalysisResult;
use crate::report::charts::{self, LineChart, Marker, Series, SeriesStyle};
use crate::report::{CdfReport, CdfSection, EventSummary};
use crate::scanner::ScanStats;
use anyhow::Result;
use std::collections::BTreeMap;
use tracing::{info, warn};

pub fn run(ctx: &Context) -> Result<()> {
    let report = analyze(ctx)?;
    ctx.emit(&report)
}

pub fn analyze(ctx: &Context) -> Result<CdfReport> {
    let config = &ctx.config.cdf;
    let names: Vec<String> = config.events.iter().map(|e| e.name.clone()).collect();
    let aggregator = ctx.aggregator();

    let targets: Vec<Option<i64>> = if config.target_steps.is_empty() {
        vec![None]
    } else {
        config.target_steps.iter().copied().map(Some).collect()
    };

    let mut scan_stats = ScanStats::default();
    let mut sections = Vec::with_capacity(targets.len());

    for target in targets {
        match target {
            Some(step) => info!("Analyzing step {}...", step),
            None => info!("Analyzing all steps..."),
        }

        let collected = aggregator.collect_by_step(target, &names)?;
        scan_stats += collected.stats;

        let events: Vec<EventSummary> = config
            .events
            .iter()
            .map(|spec| EventSummary {
                event: spec.name.clone(),
                label: spec.label.clone(),
                summary: collected
                    .data
                    .get(&spec.name)
                    .and_then(|samples| stats::summarize_with(samples, &config.percentiles).ok()),
            })
            .collect();

        let has_data = events.iter().any(|e| e.summary.is_some());
        let chart = if has_data {
            let file_name = match target {
                Some(step) => format!("cdf_step_{}.svg", step),
                None => "cdf_all_steps.svg".to_string(),
            };
            match ctx.chart_path(&file_name)? {
                Some(path) => {
                    let title = match target {
                        Some(step) => format!("Event Duration CDF - Step {}", step),
                        None => "Event Duration CDF - All Steps".to_string(),
                    };
                    let chart = cdf_chart(&title, &config.events, &collected.data, &events)?;
                    charts::render_line_chart(&chart, &path)?;
                    Some(path)
                }
                None => None,
            }
        } else {
            warn!("No samples for any configured event, skipping chart");
            None
        };

        sections.push(CdfSection {
            step: target,
            events,
            chart,
        });
    }

    Ok(CdfReport {
        sections,
        stats: scan_stats,
    })
}

/// One CDF line per event with samples; percentile markers for the first
/// configured event, when it has samples.
fn cdf_chart(
    title: &str,
    specs: &[EventSpec],
    samples: &BTreeMap<String, Vec<f64>>,
    summaries: &[EventSummary],
) -> AnalysisResult<LineChart> {
    let mut chart = LineChart::new(title, "Duration (seconds)", "Cumulative Probability");
    chart.y_range = Some((0.0, 1.0));

    for spec in specs {
        let Some(values) = samples.get(&spec.name).filter(|v| !v.is_empty()) else {
            continue;
        };
        let color = charts::parse_color(&spec.color)?;
        chart.series.push(
            Series::new(
                format!("{} (n={})", spec.label, values.len()),
                color,
                SeriesStyle::Line,
            )
            .with_points(stats::cdf_points(values)),
        );
    }

    if let Some(primary) = summaries.first().and_then(|e| e.summary.as_ref()) {
        chart.markers = percentile_markers(primary);
    }

    Ok(chart)
}

/// Vertical markers at each reported percentile of `summary`.
pub fn percentile_markers(summary: &Summary) -> Vec<Marker> {
    summary
        .percentiles
        .iter()
        .enumerate()
        .map(|(i, pv)| Marker {
            label: format!("P{}: {:.2}s", pv.percentile, pv.value),
            x: pv.value,
            color: charts::palette(i + 2),
        })
        .collect()
}
