//! Analyses derived from aggregated step and request data.

use crate::analysis::stats;
use crate::error::{AnalysisError, AnalysisResult};
use crate::models::{
    Outlier, PhaseShare, RequestPhases, RequestSummary, RequestTimeline, StepBreakdown,
    StepSeries, StepStartTimes,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Phases shorter than this are left out of a request's phase table.
pub const PHASE_DISPLAY_THRESHOLD_SEC: f64 = 0.001;

/// Time from each step's start to the next step's start.
///
/// The interval of step `i` is `start[i + 1] - start[i]`; the last step has
/// none, so the result is one shorter than the input.
pub fn step_intervals(starts: &StepStartTimes) -> StepSeries {
    let mut series = StepSeries::default();
    for (pair, step) in starts.times.windows(2).zip(&starts.steps) {
        let delta = pair[1] - pair[0];
        series.steps.push(*step);
        series
            .values
            .push(delta.num_microseconds().unwrap_or(i64::MAX) as f64 / 1_000_000.0);
    }
    series
}

/// Each phase's mean duration as a percentage of `total_event`'s mean, per
/// step.
///
/// Fails on the first step whose total is absent or zero. Phases absent for
/// a step are omitted from that step.
pub fn percentage_breakdown(
    step_means: &BTreeMap<i64, BTreeMap<String, f64>>,
    phase_events: &[String],
    total_event: &str,
) -> AnalysisResult<Vec<StepBreakdown>> {
    step_means
        .iter()
        .map(|(&step, means)| {
            let total = means
                .get(total_event)
                .copied()
                .filter(|t| *t != 0.0)
                .ok_or_else(|| AnalysisError::MissingDenominator {
                    step,
                    event: total_event.to_string(),
                })?;

            let shares = phase_events
                .iter()
                .filter_map(|phase| {
                    means
                        .get(phase)
                        .map(|mean| (phase.clone(), mean / total * 100.0))
                })
                .collect();

            Ok(StepBreakdown {
                step,
                total,
                shares,
            })
        })
        .collect()
}

/// Points of `series` deviating from its mean by more than `sigmas` std.
pub fn flag_outliers(series: &StepSeries, sigmas: f64) -> AnalysisResult<Vec<Outlier>> {
    Ok(stats::outlier_indices(&series.values, sigmas)?
        .into_iter()
        .map(|i| Outlier {
            step: series.steps[i],
            value: series.values[i],
        })
        .collect())
}

/// Mean step duration against mean step-to-step interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CoordinationGap {
    pub mean_duration: f64,
    pub mean_interval: f64,
    /// Absolute difference between the two means.
    pub gap: f64,
    /// Larger mean over the smaller one.
    pub ratio: f64,
    /// Intervals exceed durations: time is lost between steps.
    pub interval_dominates: bool,
}

pub fn coordination_gap(durations: &[f64], intervals: &[f64]) -> AnalysisResult<CoordinationGap> {
    let mean_duration = stats::mean(durations)?;
    let mean_interval = stats::mean(intervals)?;
    let interval_dominates = mean_interval > mean_duration;
    let (hi, lo) = if interval_dominates {
        (mean_interval, mean_duration)
    } else {
        (mean_duration, mean_interval)
    };

    Ok(CoordinationGap {
        mean_duration,
        mean_interval,
        gap: hi - lo,
        ratio: if lo != 0.0 { hi / lo } else { f64::INFINITY },
        interval_dominates,
    })
}

/// A Python-style slice over a ranking, e.g. `50:60` or `-2:`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RankSlice {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl RankSlice {
    /// Resolve against a list of `len` items into a half-open index range.
    pub fn resolve(&self, len: usize) -> std::ops::Range<usize> {
        let len_i = len as i64;
        let clamp = |idx: i64| -> usize {
            let idx = if idx < 0 { idx + len_i } else { idx };
            idx.clamp(0, len_i) as usize
        };
        let start = self.start.map_or(0, clamp);
        let end = self.end.map_or(len, clamp);
        start..end.max(start)
    }
}

impl FromStr for RankSlice {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AnalysisError::InvalidRankSlice(s.to_string());
        let (start, end) = s.trim().split_once(':').ok_or_else(invalid)?;

        let bound = |raw: &str| -> Result<Option<i64>, AnalysisError> {
            let raw = raw.trim();
            if raw.is_empty() {
                Ok(None)
            } else {
                raw.parse().map(Some).map_err(|_| invalid())
            }
        };

        Ok(Self {
            start: bound(start)?,
            end: bound(end)?,
        })
    }
}

/// Completion summaries of every request, slowest first.
pub fn rank_requests(
    timelines: &BTreeMap<String, RequestTimeline>,
    completion_event: &str,
) -> Vec<RequestSummary> {
    let mut ranked: Vec<RequestSummary> = timelines
        .iter()
        .filter_map(|(id, timeline)| {
            timeline
                .completion(completion_event)
                .map(|record| RequestSummary::from_completion(id, record))
        })
        .collect();

    ranked.sort_by(|a, b| b.duration.total_cmp(&a.duration));
    ranked
}

/// Concatenate the given slices of an already-ranked list.
pub fn select_ranks<T: Clone>(ranked: &[T], slices: &[RankSlice]) -> Vec<T> {
    slices
        .iter()
        .flat_map(|slice| ranked[slice.resolve(ranked.len())].iter().cloned())
        .collect()
}

/// Sum each known phase's durations over a request's timeline.
pub fn request_phases(
    timeline: &RequestTimeline,
    phase_events: &[String],
    completion_event: &str,
) -> RequestPhases {
    let phases: Vec<(String, f64)> = phase_events
        .iter()
        .map(|phase| {
            let total = timeline
                .records
                .iter()
                .filter(|r| &r.event == phase)
                .map(|r| r.duration_sec)
                .sum::<f64>();
            (phase.clone(), total)
        })
        .collect();

    let summary = timeline
        .completion(completion_event)
        .map(|record| RequestSummary::from_completion(&timeline.request_id, record));
    let total = summary.as_ref().map_or(0.0, |s| s.duration);

    let mut table: Vec<PhaseShare> = phases
        .iter()
        .filter(|(_, duration)| *duration > PHASE_DISPLAY_THRESHOLD_SEC)
        .map(|(phase, duration)| PhaseShare {
            phase: phase.clone(),
            duration: *duration,
            percentage: if total > 0.0 {
                duration / total * 100.0
            } else {
                0.0
            },
        })
        .collect();
    table.sort_by(|a, b| b.duration.total_cmp(&a.duration));

    RequestPhases {
        summary,
        phases,
        table,
    }
}

/// Mean of every stage, and the sample count, for one turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnStageMeans {
    pub turn: i64,
    pub means: BTreeMap<String, f64>,
    pub samples: usize,
}

/// Reduce per-turn stage samples to means.
///
/// The sample count of a turn is the largest sample count among its stages.
pub fn turn_stage_means(samples: &BTreeMap<i64, BTreeMap<String, Vec<f64>>>) -> Vec<TurnStageMeans> {
    samples
        .iter()
        .map(|(&turn, stages)| TurnStageMeans {
            turn,
            means: stages
                .iter()
                .filter_map(|(stage, values)| stats::mean(values).ok().map(|m| (stage.clone(), m)))
                .collect(),
            samples: stages.values().map(Vec::len).max().unwrap_or(0),
        })
        .collect()
}

/// Mean completion duration per turn count, one series per turn count.
///
/// Steps where a turn count did not occur are absent from that series.
pub fn turn_count_means(by_step: &BTreeMap<i64, BTreeMap<i64, Vec<f64>>>) -> BTreeMap<i64, StepSeries> {
    let mut series: BTreeMap<i64, StepSeries> = BTreeMap::new();
    for (&step, by_turns) in by_step {
        for (&turns, values) in by_turns {
            if let Ok(mean) = stats::mean(values) {
                let entry = series.entry(turns).or_default();
                entry.steps.push(step);
                entry.values.push(mean);
            }
        }
    }
    series
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LogRecord;
    use chrono::{Duration, NaiveDate};

    fn names(events: &[&str]) -> Vec<String> {
        events.iter().map(|e| e.to_string()).collect()
    }

    #[test]
    fn test_step_intervals() {
        let t0 = NaiveDate::from_ymd_opt(2025, 7, 13)
            .unwrap()
            .and_hms_opt(11, 0, 0)
            .unwrap();
        let starts = StepStartTimes {
            steps: vec![1, 2, 3],
            times: vec![t0, t0 + Duration::seconds(10), t0 + Duration::seconds(25)],
        };

        let intervals = step_intervals(&starts);
        assert_eq!(intervals.steps, vec![1, 2]);
        assert_eq!(intervals.values, vec![10.0, 15.0]);

        let single = StepStartTimes {
            steps: vec![1],
            times: vec![t0],
        };
        assert!(step_intervals(&single).is_empty());
    }

    #[test]
    fn test_percentage_breakdown() {
        let mut means = BTreeMap::new();
        means.insert(
            1,
            BTreeMap::from([
                ("async_generate".to_string(), 6.0),
                ("preprocessing".to_string(), 1.0),
                ("total_step_duration".to_string(), 10.0),
            ]),
        );

        let rows = percentage_breakdown(
            &means,
            &names(&["async_generate", "preprocessing", "barrier_wait"]),
            "total_step_duration",
        )
        .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].shares[0], ("async_generate".to_string(), 60.0));
        assert_eq!(rows[0].shares[1], ("preprocessing".to_string(), 10.0));
        assert_eq!(rows[0].shares.len(), 2);
    }

    #[test]
    fn test_percentage_breakdown_missing_denominator() {
        let mut means = BTreeMap::new();
        means.insert(4, BTreeMap::from([("async_generate".to_string(), 6.0)]));

        let err = percentage_breakdown(&means, &names(&["async_generate"]), "total_step_duration")
            .unwrap_err();
        assert!(matches!(err, AnalysisError::MissingDenominator { step: 4, .. }));
    }

    #[test]
    fn test_flag_outliers() {
        let mut series = StepSeries::default();
        for step in 0..20 {
            series.steps.push(step);
            series.values.push(10.0);
        }
        series.steps.push(20);
        series.values.push(80.0);

        let outliers = flag_outliers(&series, 2.0).unwrap();
        assert_eq!(outliers, vec![Outlier { step: 20, value: 80.0 }]);
    }

    #[test]
    fn test_coordination_gap() {
        let gap = coordination_gap(&[10.0, 10.0], &[12.0, 14.0]).unwrap();
        assert!(gap.interval_dominates);
        assert_eq!(gap.gap, 3.0);
        assert_eq!(gap.ratio, 1.3);
        assert!(coordination_gap(&[1.0], &[]).is_err());
    }

    #[test]
    fn test_rank_slice_parse_and_resolve() {
        let slice: RankSlice = "50:60".parse().unwrap();
        assert_eq!(slice.resolve(100), 50..60);
        assert_eq!(slice.resolve(55), 50..55);
        assert_eq!(slice.resolve(10), 10..10);

        let tail: RankSlice = "-2:".parse().unwrap();
        assert_eq!(tail.resolve(10), 8..10);

        let head: RankSlice = ":3".parse().unwrap();
        assert_eq!(head.resolve(2), 0..2);

        assert!("50".parse::<RankSlice>().is_err());
        assert!("a:b".parse::<RankSlice>().is_err());
    }

    #[test]
    fn test_select_ranks() {
        let ranked: Vec<i32> = (0..10).collect();
        let slices = vec!["1:3".parse().unwrap(), "-2:".parse().unwrap()];
        assert_eq!(select_ranks(&ranked, &slices), vec![1, 2, 8, 9]);
    }

    fn timeline(id: &str, lines: &[&str]) -> RequestTimeline {
        RequestTimeline {
            request_id: id.to_string(),
            records: lines
                .iter()
                .map(|l| LogRecord::parse_line(l.as_bytes()).unwrap())
                .collect(),
        }
    }

    #[test]
    fn test_rank_requests_slowest_first() {
        let mut timelines = BTreeMap::new();
        for (id, d) in [("a", 1.0), ("b", 3.0), ("c", 2.0)] {
            let line = format!(
                "{{\"event\": \"async_rollout_request_complete\", \"duration_sec\": {}}}",
                d
            );
            timelines.insert(id.to_string(), timeline(id, &[line.as_str()]));
        }
        timelines.insert("d".to_string(), timeline("d", &["{\"event\": \"engine_call\"}"]));

        let ranked = rank_requests(&timelines, "async_rollout_request_complete");
        let ids: Vec<_> = ranked.iter().map(|r| r.request_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_request_phases() {
        let t = timeline(
            "req-1",
            &[
                "{\"event\": \"engine_call\", \"duration_sec\": 2.0}",
                "{\"event\": \"engine_call\", \"duration_sec\": 3.0}",
                "{\"event\": \"tool_execution\", \"duration_sec\": 0.0005}",
                "{\"event\": \"async_rollout_request_complete\", \"duration_sec\": 10.0, \"extra\": {\"turns\": 2}}",
            ],
        );
        let phases = names(&["engine_call", "tool_execution", "async_rollout_request_complete"]);

        let analysis = request_phases(&t, &phases, "async_rollout_request_complete");

        assert_eq!(analysis.phases[0], ("engine_call".to_string(), 5.0));
        assert_eq!(analysis.table.len(), 2);
        assert_eq!(analysis.table[0].phase, "async_rollout_request_complete");
        assert_eq!(analysis.table[1].percentage, 50.0);
        assert_eq!(analysis.summary.unwrap().turns, 2);
    }

    #[test]
    fn test_turn_stage_means() {
        let samples = BTreeMap::from([(
            1,
            BTreeMap::from([
                ("engine_call_duration".to_string(), vec![1.0, 3.0]),
                ("tool_parsing_duration".to_string(), vec![0.5]),
            ]),
        )]);

        let rows = turn_stage_means(&samples);
        assert_eq!(rows[0].means["engine_call_duration"], 2.0);
        assert_eq!(rows[0].samples, 2);
    }

    #[test]
    fn test_turn_count_means() {
        let by_step = BTreeMap::from([
            (1, BTreeMap::from([(1, vec![2.0, 4.0]), (2, vec![8.0])])),
            (2, BTreeMap::from([(1, vec![5.0])])),
        ]);

        let series = turn_count_means(&by_step);
        assert_eq!(series[&1].steps, vec![1, 2]);
        assert_eq!(series[&1].values, vec![3.0, 5.0]);
        assert_eq!(series[&2].steps, vec![1]);
    }
}
