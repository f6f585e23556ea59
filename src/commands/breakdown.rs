//! `breakdown`: phase events as a share of the step total.

use super::Context;
use crate::analysis::derive;
use crate::models::StepBreakdown;
use crate::report::charts::{self, LineChart, Series, SeriesStyle};
use crate::report::BreakdownReport;
use anyhow::Result;
use tracing::{info, warn};

pub fn run(ctx: &Context) -> Result<()> {
    let report = analyze(ctx)?;
    ctx.emit(&report)
}

pub fn analyze(ctx: &Context) -> Result<BreakdownReport> {
    let config = &ctx.config.breakdown;

    let mut events = config.phase_events.clone();
    events.push(config.total_event.clone());

    let means = ctx.aggregator().collect_step_event_means(&events)?;
    info!("Computing breakdown for {} steps", means.data.len());

    let steps = derive::percentage_breakdown(&means.data, &config.phase_events, &config.total_event)?;

    let chart = if steps.iter().all(|s| s.shares.is_empty()) {
        if !steps.is_empty() {
            warn!("No phase events logged alongside `{}`, skipping chart", config.total_event);
        }
        None
    } else {
        match ctx.chart_path("event_percentage_per_step.svg")? {
            Some(path) => {
                let chart = breakdown_chart(&steps, &config.phase_events, &config.total_event);
                charts::render_line_chart(&chart, &path)?;
                Some(path)
            }
            None => None,
        }
    };

    Ok(BreakdownReport {
        total_event: config.total_event.clone(),
        phase_events: config.phase_events.clone(),
        steps,
        chart,
        stats: means.stats,
    })
}

fn breakdown_chart(steps: &[StepBreakdown], phases: &[String], total_event: &str) -> LineChart {
    let mut chart = LineChart::new(
        format!("Event Duration as Percentage of {}", total_event),
        "Step",
        "Percentage (%)",
    );

    for (i, phase) in phases.iter().enumerate() {
        let points: Vec<(f64, f64)> = steps
            .iter()
            .filter_map(|step| {
                step.shares
                    .iter()
                    .find(|(name, _)| name == phase)
                    .map(|(_, pct)| (step.step as f64, *pct))
            })
            .collect();
        if points.is_empty() {
            continue;
        }
        chart
            .series
            .push(Series::new(phase.as_str(), charts::palette(i), SeriesStyle::LinePoints).with_points(points));
    }

    chart
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::OutputFormat;
    use crate::commands::fixtures::{event, write_worker};
    use crate::config::Config;
    use crate::error::AnalysisError;
    use tempfile::TempDir;

    fn context(root: &std::path::Path) -> Context {
        let mut config = Config::default();
        config.general.log_dir = root.to_path_buf();
        config.general.output_dir = root.join("out");
        config.breakdown.phase_events = vec![
            "async_generate_duration".to_string(),
            "preprocessing_duration".to_string(),
        ];
        Context::new(config, OutputFormat::Text, false)
    }

    #[test]
    fn test_breakdown_percentages() {
        let temp_dir = TempDir::new().unwrap();
        write_worker(
            temp_dir.path(),
            1,
            "worker_0",
            &[
                event("async_generate_duration", 6.0),
                event("preprocessing_duration", 1.0),
                event("total_step_duration", 10.0),
            ],
        );
        write_worker(
            temp_dir.path(),
            2,
            "worker_0",
            &[
                event("async_generate_duration", 3.0),
                event("total_step_duration", 12.0),
            ],
        );

        let report = analyze(&context(temp_dir.path())).unwrap();

        assert_eq!(report.steps.len(), 2);
        assert_eq!(
            report.steps[0].shares,
            vec![
                ("async_generate_duration".to_string(), 60.0),
                ("preprocessing_duration".to_string(), 10.0),
            ]
        );
        assert_eq!(report.steps[1].shares, vec![("async_generate_duration".to_string(), 25.0)]);
        assert!(report.chart.unwrap().exists());
    }

    #[test]
    fn test_breakdown_totals_only_skips_chart() {
        let temp_dir = TempDir::new().unwrap();
        write_worker(temp_dir.path(), 1, "worker_0", &[event("total_step_duration", 10.0)]);
        write_worker(temp_dir.path(), 2, "worker_0", &[event("total_step_duration", 12.0)]);

        let report = analyze(&context(temp_dir.path())).unwrap();

        assert_eq!(report.steps.len(), 2);
        assert!(report.steps.iter().all(|s| s.shares.is_empty()));
        assert!(report.chart.is_none());
        assert!(!temp_dir.path().join("out").exists());
    }

    #[test]
    fn test_breakdown_missing_denominator_fails() {
        let temp_dir = TempDir::new().unwrap();
        write_worker(
            temp_dir.path(),
            1,
            "worker_0",
            &[event("async_generate_duration", 6.0)],
        );

        let err = analyze(&context(temp_dir.path())).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::MissingDenominator { step: 1, .. })
        ));
    }
}
