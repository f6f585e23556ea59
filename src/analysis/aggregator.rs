//! Duration aggregation over step-indexed worker logs.
//!
//! Every collector walks the selected step directories, feeds each record
//! through a keying function, and returns the grouped values together with
//! the [`ScanStats`] of the walk.

use crate::analysis::stats;
use crate::models::{
    LogRecord, RequestTimeline, StepSeries, StepStartTimes, WorkerTimings,
};
use crate::scanner::{LogScanner, ScanConfig, ScanStats, StepDirectory, WorkerFile};
use anyhow::Result;
use chrono::{Duration, NaiveDateTime};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Aggregated data plus the counters of the walk that produced it.
#[derive(Debug, Clone)]
pub struct Collected<T> {
    pub data: T,
    pub stats: ScanStats,
}

/// Which step directories a collection visits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepSelection {
    /// Every step directory in the configured range.
    All,
    /// Only `root/step_<n>`; a missing directory yields nothing.
    Only(i64),
}

impl From<Option<i64>> for StepSelection {
    fn from(step: Option<i64>) -> Self {
        step.map_or(StepSelection::All, StepSelection::Only)
    }
}

/// Settings for a [`LogAggregator`].
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub root: PathBuf,
    pub scan: ScanConfig,
    /// Draw a progress bar over worker files.
    pub show_progress: bool,
}

impl AggregatorConfig {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            scan: ScanConfig::default(),
            show_progress: false,
        }
    }
}

/// Context handed to keying functions alongside each record.
#[derive(Debug, Clone, Copy)]
pub struct RecordSource<'a> {
    pub step: i64,
    pub worker: &'a str,
}

/// Groups durations from a log tree.
pub struct LogAggregator {
    scanner: LogScanner,
    show_progress: bool,
}

impl LogAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self {
            scanner: LogScanner::new(config.root, config.scan),
            show_progress: config.show_progress,
        }
    }

    fn select(&self, selection: StepSelection) -> Result<Vec<StepDirectory>> {
        match selection {
            StepSelection::All => self.scanner.step_dirs(),
            StepSelection::Only(step) => Ok(self.scanner.step_dir(step)?.into_iter().collect()),
        }
    }

    fn progress(&self, files: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(files as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} Loading logs [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }

    /// Visit every record of every selected worker file in encounter order
    /// (steps ascending, files by name, lines in order).
    pub fn for_each_record<F>(&self, selection: StepSelection, mut visit: F) -> Result<ScanStats>
    where
        F: FnMut(&RecordSource<'_>, LogRecord),
    {
        let dirs = self.select(selection)?;
        let total_files = dirs.iter().map(|d| d.files.len()).sum();
        let pb = self.progress(total_files);
        let mut stats = ScanStats::default();

        for file in dirs.iter().flat_map(|d| &d.files) {
            let source = RecordSource {
                step: file.step,
                worker: &file.worker,
            };
            self.scanner
                .read_records(file, &mut stats, |record| visit(&source, record));
            pb.inc(1);
        }

        pb.finish_and_clear();
        debug!(
            "Scanned {} files: {} records, {} skipped lines",
            stats.files_read, stats.records, stats.skipped_lines
        );
        if stats.skipped_lines > 0 {
            info!("Skipped {} malformed log lines", stats.skipped_lines);
        }

        Ok(stats)
    }

    /// Group sample values by the keys produced for each record.
    ///
    /// `key_fn` returns any number of `(key, value)` pairs per record; an
    /// `Option` works for the common zero-or-one case.
    pub fn group_samples<K, I, F>(
        &self,
        selection: StepSelection,
        mut key_fn: F,
    ) -> Result<Collected<HashMap<K, Vec<f64>>>>
    where
        K: Eq + Hash,
        I: IntoIterator<Item = (K, f64)>,
        F: FnMut(&RecordSource<'_>, &LogRecord) -> I,
    {
        let mut grouped: HashMap<K, Vec<f64>> = HashMap::new();

        let stats = self.for_each_record(selection, |source, record| {
            for (key, value) in key_fn(source, &record) {
                grouped.entry(key).or_default().push(value);
            }
        })?;

        Ok(Collected {
            data: grouped,
            stats,
        })
    }

    /// Durations of the named events, for one step or the whole tree.
    ///
    /// Every requested event is present in the result, with an empty
    /// sequence when nothing matched.
    pub fn collect_by_step(
        &self,
        target_step: Option<i64>,
        event_names: &[String],
    ) -> Result<Collected<BTreeMap<String, Vec<f64>>>> {
        let collected = self.group_samples(target_step.into(), |_, record| {
            event_names
                .contains(&record.event)
                .then(|| (record.event.clone(), record.duration_sec))
        })?;

        let mut data: BTreeMap<String, Vec<f64>> =
            event_names.iter().map(|e| (e.clone(), Vec::new())).collect();
        data.extend(collected.data);

        Ok(Collected {
            data,
            stats: collected.stats,
        })
    }

    /// Per step, the maximum of `event_name` across the workers reporting it.
    ///
    /// Within one worker file the last occurrence of the event wins. Workers
    /// that never report the event are excluded, and a step with no
    /// reporting worker is absent from the result.
    pub fn collect_max_per_step(&self, event_name: &str) -> Result<Collected<StepSeries>> {
        let mut per_worker: BTreeMap<i64, HashMap<String, f64>> = BTreeMap::new();

        let stats = self.for_each_record(StepSelection::All, |source, record| {
            if record.event == event_name {
                per_worker
                    .entry(source.step)
                    .or_default()
                    .insert(source.worker.to_string(), record.duration_sec);
            }
        })?;

        let mut series = StepSeries::default();
        for (step, workers) in per_worker {
            let max = workers.values().copied().fold(f64::NEG_INFINITY, f64::max);
            series.steps.push(step);
            series.values.push(max);
        }

        Ok(Collected {
            data: series,
            stats,
        })
    }

    /// Estimated start time of every step.
    ///
    /// For each worker file only the first line is read and its
    /// `timestamp - duration_sec` taken as the moment the worker began the
    /// step; the earliest such estimate across workers is the step start.
    /// This assumes the first logged event started with the step, so the
    /// result is an approximation rather than a measurement.
    pub fn collect_step_start_times(&self) -> Result<Collected<StepStartTimes>> {
        let dirs = self.scanner.step_dirs()?;
        let mut stats = ScanStats::default();
        let mut starts = StepStartTimes::default();

        for dir in &dirs {
            let earliest = dir
                .files
                .iter()
                .filter_map(|file| self.first_record_start(file, &mut stats))
                .min();

            if let Some(start) = earliest {
                starts.steps.push(dir.step);
                starts.times.push(start);
            }
        }

        if let (Some(first), Some(last)) = (starts.times.first(), starts.times.last()) {
            debug!(
                "Found {} step start times, {} .. {}",
                starts.steps.len(),
                first,
                last
            );
        }

        Ok(Collected { data: starts, stats })
    }

    fn first_record_start(&self, file: &WorkerFile, stats: &mut ScanStats) -> Option<NaiveDateTime> {
        let record = self.scanner.read_first_record(file, stats)?;
        let timestamp = record.timestamp?;
        let start = start_from_completion(timestamp, record.duration_sec);
        if start.is_none() {
            warn!(
                "Skipping {}: duration {} before {} is out of range",
                file.path.display(),
                record.duration_sec,
                timestamp
            );
        }
        start
    }

    /// Records grouped by `extra.request_id`, regardless of step.
    ///
    /// With `filter_event` set, only requests whose timeline contains that
    /// event are kept. Each timeline is sorted by timestamp.
    pub fn collect_request_timelines(
        &self,
        selection: StepSelection,
        filter_event: Option<&str>,
    ) -> Result<Collected<BTreeMap<String, RequestTimeline>>> {
        let mut timelines: BTreeMap<String, RequestTimeline> = BTreeMap::new();

        let stats = self.for_each_record(selection, |_, record| {
            if let Some(request_id) = record.request_id() {
                timelines
                    .entry(request_id.clone())
                    .or_insert_with(|| RequestTimeline {
                        request_id,
                        records: Vec::new(),
                    })
                    .records
                    .push(record);
            }
        })?;

        if let Some(event) = filter_event {
            timelines.retain(|_, timeline| timeline.completion(event).is_some());
        }
        for timeline in timelines.values_mut() {
            timeline.sort_by_time();
        }

        Ok(Collected {
            data: timelines,
            stats,
        })
    }

    /// Duration events of every worker file in one step.
    ///
    /// `key_events` come first in the given order, followed by any other
    /// event whose name contains `duration` in first-seen order. Within a
    /// file the last occurrence of an event wins.
    pub fn collect_worker_timings(
        &self,
        step: i64,
        key_events: &[String],
    ) -> Result<Collected<Vec<WorkerTimings>>> {
        let mut workers: Vec<WorkerTimings> = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();

        let stats = self.for_each_record(StepSelection::Only(step), |source, record| {
            let idx = *seen.entry(source.worker.to_string()).or_insert_with(|| {
                workers.push(WorkerTimings {
                    worker: source.worker.to_string(),
                    events: Vec::new(),
                });
                workers.len() - 1
            });

            let is_timing = key_events.contains(&record.event) || record.event.contains("duration");
            if !is_timing {
                return;
            }

            let events = &mut workers[idx].events;
            match events.iter_mut().find(|(name, _)| *name == record.event) {
                Some(slot) => slot.1 = record.duration_sec,
                None => events.push((record.event, record.duration_sec)),
            }
        })?;

        for worker in &mut workers {
            worker.events.sort_by_key(|(name, _)| {
                key_events
                    .iter()
                    .position(|k| k == name)
                    .unwrap_or(key_events.len())
            });
        }

        Ok(Collected {
            data: workers,
            stats,
        })
    }

    /// Per step, the mean of each named event over all of its occurrences.
    pub fn collect_step_event_means(
        &self,
        event_names: &[String],
    ) -> Result<Collected<BTreeMap<i64, BTreeMap<String, f64>>>> {
        let collected = self.group_samples(StepSelection::All, |source, record| {
            event_names
                .contains(&record.event)
                .then(|| ((source.step, record.event.clone()), record.duration_sec))
        })?;

        let mut means: BTreeMap<i64, BTreeMap<String, f64>> = BTreeMap::new();
        for ((step, event), values) in collected.data {
            if let Ok(mean) = stats::mean(&values) {
                means.entry(step).or_default().insert(event, mean);
            }
        }

        Ok(Collected {
            data: means,
            stats: collected.stats,
        })
    }

    /// Per turn id, per stage, the values found in `extra.turn_timings` of
    /// completion records.
    pub fn collect_turn_stage_samples(
        &self,
        completion_event: &str,
        stages: &[String],
    ) -> Result<Collected<BTreeMap<i64, BTreeMap<String, Vec<f64>>>>> {
        let collected = self.group_samples(StepSelection::All, |_, record| {
            let mut samples = Vec::new();
            if record.event != completion_event {
                return samples;
            }
            for turn in record.turn_timings() {
                let Some(turn_id) = turn.get("turn").and_then(Value::as_i64) else {
                    continue;
                };
                for stage in stages {
                    if let Some(value) = turn.get(stage).and_then(Value::as_f64) {
                        samples.push(((turn_id, stage.clone()), value));
                    }
                }
            }
            samples
        })?;

        let mut by_turn: BTreeMap<i64, BTreeMap<String, Vec<f64>>> = BTreeMap::new();
        for ((turn, stage), values) in collected.data {
            by_turn.entry(turn).or_default().insert(stage, values);
        }

        Ok(Collected {
            data: by_turn,
            stats: collected.stats,
        })
    }

    /// Per step, completion durations grouped by the request's turn count.
    pub fn collect_turn_count_durations(
        &self,
        completion_event: &str,
    ) -> Result<Collected<BTreeMap<i64, BTreeMap<i64, Vec<f64>>>>> {
        let collected = self.group_samples(StepSelection::All, |source, record| {
            if record.event != completion_event {
                return None;
            }
            record
                .extra_i64("turns")
                .map(|turns| ((source.step, turns), record.duration_sec))
        })?;

        let mut by_step: BTreeMap<i64, BTreeMap<i64, Vec<f64>>> = BTreeMap::new();
        for ((step, turns), values) in collected.data {
            by_step.entry(step).or_default().insert(turns, values);
        }

        Ok(Collected {
            data: by_step,
            stats: collected.stats,
        })
    }
}

/// Convert fractional seconds to a chrono duration at microsecond precision.
///
/// `None` for non-finite values and for values beyond the `i64` microsecond range.
pub fn seconds(secs: f64) -> Option<Duration> {
    let micros = (secs * 1_000_000.0).round();
    if !micros.is_finite() || micros < i64::MIN as f64 || micros >= i64::MAX as f64 {
        return None;
    }
    Some(Duration::microseconds(micros as i64))
}

/// Back-compute when an event began from its completion time and duration.
///
/// `None` when the result falls outside the representable date range.
pub fn start_from_completion(timestamp: NaiveDateTime, duration_sec: f64) -> Option<NaiveDateTime> {
    timestamp.checked_sub_signed(seconds(duration_sec)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TOTAL_STEP_EVENT;
    use chrono::NaiveDate;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, lines: &[&str]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, lines.join("\n")).unwrap();
    }

    fn aggregator(root: &Path) -> LogAggregator {
        LogAggregator::new(AggregatorConfig::new(root.to_path_buf()))
    }

    fn total(d: f64) -> String {
        format!("{{\"event\": \"total_step_duration\", \"duration_sec\": {}}}", d)
    }

    fn names(events: &[&str]) -> Vec<String> {
        events.iter().map(|e| e.to_string()).collect()
    }

    #[test]
    fn test_collect_max_per_step() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "step_5/worker_0.jsonl", &[total(12.3).as_str()]);
        write(root, "step_5/worker_1.jsonl", &[total(9.8).as_str()]);
        write(root, "step_5/worker_2.jsonl", &[total(15.1).as_str()]);
        write(root, "step_5/worker_3.jsonl", &["{\"event\": \"other\", \"duration_sec\": 99.0}"]);
        fs::create_dir_all(root.join("step_6")).unwrap();
        write(root, "step_x/worker_0.jsonl", &[total(100.0).as_str()]);

        let series = aggregator(root).collect_max_per_step(TOTAL_STEP_EVENT).unwrap().data;

        assert_eq!(series.steps, vec![5]);
        assert_eq!(series.values, vec![15.1]);
    }

    #[test]
    fn test_collect_max_last_occurrence_wins() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "step_1/worker_0.jsonl", &[total(50.0).as_str(), total(4.0).as_str()]);
        write(root, "step_1/worker_1.jsonl", &[total(3.0).as_str()]);

        let series = aggregator(root).collect_max_per_step(TOTAL_STEP_EVENT).unwrap().data;
        assert_eq!(series.values, vec![4.0]);
    }

    #[test]
    fn test_collect_by_step_target_and_all() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(
            root,
            "step_1/worker_0.jsonl",
            &[
                "{\"event\": \"a\", \"duration_sec\": 1.0}",
                "{\"event\": \"b\", \"duration_sec\": 2.0}",
                "garbage",
            ],
        );
        write(root, "step_2/worker_0.jsonl", &["{\"event\": \"a\", \"duration_sec\": 3.0}"]);
        write(root, "step_bad/worker_0.jsonl", &["{\"event\": \"a\", \"duration_sec\": 7.0}"]);

        let agg = aggregator(root);
        let events = names(&["a", "c"]);

        let one = agg.collect_by_step(Some(1), &events).unwrap();
        assert_eq!(one.data["a"], vec![1.0]);
        assert!(one.data["c"].is_empty());
        assert!(!one.data.contains_key("b"));
        assert_eq!(one.stats.skipped_lines, 1);

        let all = agg.collect_by_step(None, &events).unwrap();
        assert_eq!(all.data["a"], vec![1.0, 3.0]);

        let missing = agg.collect_by_step(Some(9), &events).unwrap();
        assert!(missing.data.values().all(Vec::is_empty));
        assert_eq!(missing.data.len(), 2);
    }

    #[test]
    fn test_missing_duration_counts_as_zero() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "step_1/w.jsonl", &["{\"event\": \"a\"}"]);

        let data = aggregator(temp_dir.path())
            .collect_by_step(None, &names(&["a"]))
            .unwrap()
            .data;
        assert_eq!(data["a"], vec![0.0]);
    }

    #[test]
    fn test_collect_step_start_times() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(
            root,
            "step_1/worker_0.jsonl",
            &[
                "{\"timestamp\": \"2025-07-13T11:00:10\", \"event\": \"preprocessing_duration\", \"duration_sec\": 4.0}",
                "{\"timestamp\": \"2025-07-13T10:00:00\", \"event\": \"later\", \"duration_sec\": 0.0}",
            ],
        );
        write(
            root,
            "step_1/worker_1.jsonl",
            &["{\"timestamp\": \"2025-07-13T11:00:08\", \"event\": \"preprocessing_duration\", \"duration_sec\": 1.0}"],
        );
        write(root, "step_2/worker_0.jsonl", &["{\"event\": \"no_timestamp\"}"]);

        let starts = aggregator(root).collect_step_start_times().unwrap().data;

        assert_eq!(starts.steps, vec![1]);
        let expected = NaiveDate::from_ymd_opt(2025, 7, 13)
            .unwrap()
            .and_hms_opt(11, 0, 6)
            .unwrap();
        assert_eq!(starts.times, vec![expected]);
    }

    #[test]
    fn test_step_start_skips_out_of_range_duration() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(
            root,
            "step_1/worker_0.jsonl",
            &["{\"timestamp\": \"2025-07-13T11:00:10\", \"event\": \"preprocessing_duration\", \"duration_sec\": 1e15}"],
        );
        write(
            root,
            "step_1/worker_1.jsonl",
            &["{\"timestamp\": \"2025-07-13T11:00:10\", \"event\": \"preprocessing_duration\", \"duration_sec\": 2.0}"],
        );
        write(
            root,
            "step_2/worker_0.jsonl",
            &["{\"timestamp\": \"2025-07-13T11:05:00\", \"event\": \"preprocessing_duration\", \"duration_sec\": 1e15}"],
        );

        let starts = aggregator(root).collect_step_start_times().unwrap().data;

        assert_eq!(starts.steps, vec![1]);
        let expected = NaiveDate::from_ymd_opt(2025, 7, 13)
            .unwrap()
            .and_hms_opt(11, 0, 8)
            .unwrap();
        assert_eq!(starts.times, vec![expected]);
    }

    #[test]
    fn test_seconds_rejects_unrepresentable() {
        assert!(seconds(f64::NAN).is_none());
        assert!(seconds(f64::INFINITY).is_none());
        assert!(seconds(1e15).is_none());
        assert_eq!(seconds(1.5), Some(Duration::milliseconds(1500)));
    }

    #[test]
    fn test_start_time_round_trip() {
        let timestamp = NaiveDate::from_ymd_opt(2025, 7, 13)
            .unwrap()
            .and_hms_micro_opt(11, 4, 25, 706_221)
            .unwrap();
        let duration = 13.30946397781372;

        let start = start_from_completion(timestamp, duration).unwrap();
        let restored = start + seconds(duration).unwrap();

        assert_eq!(restored, timestamp);
    }

    #[test]
    fn test_collect_request_timelines() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(
            root,
            "step_1/worker_0.jsonl",
            &[
                "{\"timestamp\": \"2025-01-01T00:00:05\", \"event\": \"async_rollout_request_complete\", \"duration_sec\": 5.0, \"extra\": {\"request_id\": \"r1\"}}",
                "{\"timestamp\": \"2025-01-01T00:00:01\", \"event\": \"engine_call\", \"duration_sec\": 1.0, \"extra\": {\"request_id\": \"r1\"}}",
                "{\"timestamp\": \"2025-01-01T00:00:02\", \"event\": \"engine_call\", \"duration_sec\": 1.0, \"extra\": {\"request_id\": \"r2\"}}",
                "{\"event\": \"no_request\", \"duration_sec\": 1.0}",
            ],
        );

        let agg = aggregator(root);
        let filtered = agg
            .collect_request_timelines(StepSelection::All, Some("async_rollout_request_complete"))
            .unwrap()
            .data;
        assert_eq!(filtered.len(), 1);
        let events: Vec<_> = filtered["r1"].records.iter().map(|r| r.event.as_str()).collect();
        assert_eq!(events, vec!["engine_call", "async_rollout_request_complete"]);

        let all = agg
            .collect_request_timelines(StepSelection::All, None)
            .unwrap()
            .data;
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_collect_worker_timings() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(
            root,
            "step_3/worker_0.jsonl",
            &[
                "{\"event\": \"custom_duration\", \"duration_sec\": 0.5}",
                "{\"event\": \"total_step_duration\", \"duration_sec\": 9.0}",
                "{\"event\": \"preprocessing_duration\", \"duration_sec\": 1.0}",
                "{\"event\": \"preprocessing_duration\", \"duration_sec\": 2.0}",
                "{\"event\": \"heartbeat\", \"duration_sec\": 0.1}",
            ],
        );
        write(root, "step_3/worker_1.jsonl", &["{\"event\": \"heartbeat\"}"]);

        let key_events = names(&["preprocessing_duration", "total_step_duration"]);
        let workers = aggregator(root)
            .collect_worker_timings(3, &key_events)
            .unwrap()
            .data;

        assert_eq!(workers.len(), 2);
        assert_eq!(
            workers[0].events,
            vec![
                ("preprocessing_duration".to_string(), 2.0),
                ("total_step_duration".to_string(), 9.0),
                ("custom_duration".to_string(), 0.5),
            ]
        );
        assert!(workers[1].events.is_empty());
    }

    #[test]
    fn test_collect_step_event_means() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(
            root,
            "step_1/worker_0.jsonl",
            &[
                "{\"event\": \"async_generate_duration\", \"duration_sec\": 5.0}",
                total(10.0).as_str(),
            ],
        );
        write(
            root,
            "step_1/worker_1.jsonl",
            &[
                "{\"event\": \"async_generate_duration\", \"duration_sec\": 7.0}",
                total(10.0).as_str(),
            ],
        );

        let events = names(&["async_generate_duration", "total_step_duration"]);
        let means = aggregator(root).collect_step_event_means(&events).unwrap().data;

        assert_eq!(means[&1]["async_generate_duration"], 6.0);
        assert_eq!(means[&1]["total_step_duration"], 10.0);
    }

    #[test]
    fn test_collect_turn_stage_samples() {
        let temp_dir = TempDir::new().unwrap();
        write(
            temp_dir.path(),
            "step_1/worker_0.jsonl",
            &[
                "{\"event\": \"async_rollout_request_complete\", \"extra\": {\"turn_timings\": [{\"turn\": 1, \"engine_call_duration\": 0.5}, {\"turn\": 2, \"engine_call_duration\": 1.5, \"tool_parsing_duration\": 0.1}]}}",
                "{\"event\": \"async_rollout_request_complete\", \"extra\": {\"turn_timings\": [{\"turn\": 1, \"engine_call_duration\": 0.7}]}}",
                "{\"event\": \"other\", \"extra\": {\"turn_timings\": [{\"turn\": 1, \"engine_call_duration\": 100.0}]}}",
            ],
        );

        let stages = names(&["engine_call_duration", "tool_parsing_duration"]);
        let by_turn = aggregator(temp_dir.path())
            .collect_turn_stage_samples("async_rollout_request_complete", &stages)
            .unwrap()
            .data;

        let mut turn_one = by_turn[&1]["engine_call_duration"].clone();
        turn_one.sort_by(f64::total_cmp);
        assert_eq!(turn_one, vec![0.5, 0.7]);
        assert_eq!(by_turn[&2]["tool_parsing_duration"], vec![0.1]);
        assert!(!by_turn[&1].contains_key("tool_parsing_duration"));
    }

    #[test]
    fn test_collect_turn_count_durations() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(
            root,
            "step_2/worker_0.jsonl",
            &[
                "{\"event\": \"async_rollout_request_complete\", \"duration_sec\": 4.0, \"extra\": {\"turns\": 2}}",
                "{\"event\": \"async_rollout_request_complete\", \"duration_sec\": 6.0, \"extra\": {\"turns\": 2}}",
                "{\"event\": \"async_rollout_request_complete\", \"duration_sec\": 1.0, \"extra\": {\"turns\": \"many\"}}",
            ],
        );

        let by_step = aggregator(root)
            .collect_turn_count_durations("async_rollout_request_complete")
            .unwrap()
            .data;

        assert_eq!(by_step[&2][&2], vec![4.0, 6.0]);
        assert_eq!(by_step[&2].len(), 1);
    }
}
