//! `requests`: request duration CDF and the phase breakdown of selected
//! slow requests.

use super::cdf::percentile_markers;
use super::Context;
use crate::analysis::derive::{self, RankSlice};
use crate::analysis::{stats, StepSelection};
use crate::error::AnalysisResult;
use crate::models::{RequestPhases, RequestSummary};
use crate::report::charts::{self, Bar, BarChart, LineChart, Series, SeriesStyle};
use crate::report::RequestsReport;
use anyhow::Result;
use tracing::{debug, info};

pub fn run(ctx: &Context) -> Result<()> {
    let report = analyze(ctx)?;
    ctx.emit(&report)
}

pub fn analyze(ctx: &Context) -> Result<RequestsReport> {
    let config = &ctx.config.requests;
    let slices = config
        .ranks
        .iter()
        .map(|r| r.parse::<RankSlice>())
        .collect::<AnalysisResult<Vec<_>>>()?;

    let timelines = ctx.aggregator().collect_request_timelines(
        StepSelection::from(config.step),
        Some(config.completion_event.as_str()),
    )?;

    let ranked = derive::rank_requests(&timelines.data, &config.completion_event);
    info!("Found {} requests with a completion record", ranked.len());

    let durations: Vec<f64> = ranked.iter().map(|r| r.duration).collect();
    let duration_summary = stats::summarize(&durations).ok();

    let mut charts_written = Vec::new();
    if let Some(summary) = &duration_summary {
        if let Some(path) = ctx.chart_path("request_duration_cdf.svg")? {
            let mut chart = LineChart::new(
                format!("Request Duration CDF (n={})", durations.len()),
                "Duration (seconds)",
                "Cumulative Probability",
            );
            chart.y_range = Some((0.0, 1.0));
            chart.series.push(
                Series::new("Request duration", charts::palette(0), SeriesStyle::Line)
                    .with_points(stats::cdf_points(&durations)),
            );
            chart.markers = percentile_markers(summary);
            charts::render_line_chart(&chart, &path)?;
            charts_written.push(path);
        }
    }

    let selected: Vec<RequestSummary> = derive::select_ranks(&ranked, &slices);
    debug!("Selected {} requests from {} rank slices", selected.len(), slices.len());

    let mut phases = Vec::with_capacity(selected.len());
    for (i, request) in selected.iter().enumerate() {
        let Some(timeline) = timelines.data.get(&request.request_id) else {
            continue;
        };
        let analysis = derive::request_phases(timeline, &config.phases, &config.completion_event);

        if !analysis.table.is_empty() {
            let name = format!("request_{}_{}.svg", i + 1, request.short_id());
            if let Some(path) = ctx.chart_path(&name)? {
                charts::render_bar_chart(&phase_chart(request, &analysis), &path)?;
                charts_written.push(path);
            }
        }
        phases.push(analysis);
    }

    Ok(RequestsReport {
        step: config.step,
        requests: ranked.len(),
        duration_summary,
        selected: phases,
        phase_rows: config.phase_rows,
        charts: charts_written,
        stats: timelines.stats,
    })
}

fn phase_chart(request: &RequestSummary, analysis: &RequestPhases) -> BarChart {
    BarChart {
        title: format!(
            "Request {}... ({:.2}s, {} turns, {})",
            request.short_id(),
            request.duration,
            request.turns,
            request.finish_reason_short()
        ),
        y_desc: "Duration (seconds)".to_string(),
        bars: analysis
            .table
            .iter()
            .enumerate()
            .map(|(i, share)| Bar {
                label: format!("{} ({:.1}%)", share.phase, share.percentage),
                value: share.duration,
                color: charts::palette(i),
            })
            .collect(),
    }
}
