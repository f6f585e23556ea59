//! Data models for rollout event logs.
//!
//! This module contains the parsed log record, the per-step series produced
//! by the aggregator, and the request-level views built on top of them.

use chrono::{DateTime, NaiveDateTime};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// Event name emitted once per finished rollout request.
pub const REQUEST_COMPLETE_EVENT: &str = "async_rollout_request_complete";

/// Event name carrying a worker's total duration for one step.
pub const TOTAL_STEP_EVENT: &str = "total_step_duration";

/// One parsed JSONL line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    /// Name of the measured operation.
    pub event: String,
    /// Duration in seconds. Missing or non-numeric values are 0.
    pub duration_sec: f64,
    /// Completion time of the event, normalized to a naive UTC value when an
    /// offset is present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<NaiveDateTime>,
    /// Auxiliary fields (`request_id`, `turns`, `turn_timings`, ...).
    pub extra: Map<String, Value>,
    /// Step index as logged by the producer, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<i64>,
    /// Worker id as logged by the producer, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workid: Option<String>,
}

impl LogRecord {
    /// Parse one raw line. Returns `None` for anything that is not a JSON
    /// object with a string `event`.
    pub fn parse_line(line: &[u8]) -> Option<Self> {
        let value: Value = serde_json::from_slice(line).ok()?;
        Self::from_value(value)
    }

    /// Build a record from an already-parsed JSON value.
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut obj) = value else {
            return None;
        };

        let event = match obj.remove("event") {
            Some(Value::String(event)) => event,
            _ => return None,
        };

        let duration_sec = obj
            .get("duration_sec")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);

        let timestamp = obj
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(parse_timestamp);

        let extra = match obj.remove("extra") {
            Some(Value::Object(extra)) => extra,
            _ => Map::new(),
        };

        let step = obj.get("step").and_then(Value::as_i64);
        let workid = obj.get("workid").and_then(scalar_to_string);

        Some(Self {
            event,
            duration_sec,
            timestamp,
            extra,
            step,
            workid,
        })
    }

    /// The request this record belongs to, if it carries `extra.request_id`.
    pub fn request_id(&self) -> Option<String> {
        self.extra.get("request_id").and_then(scalar_to_string)
    }

    /// An `extra` field rendered as a string (strings and numbers only).
    pub fn extra_str(&self, key: &str) -> Option<String> {
        self.extra.get(key).and_then(scalar_to_string)
    }

    /// An integer `extra` field. Floats and strings are not coerced.
    pub fn extra_i64(&self, key: &str) -> Option<i64> {
        self.extra.get(key).and_then(Value::as_i64)
    }

    /// Per-turn sub-records from `extra.turn_timings`.
    pub fn turn_timings(&self) -> impl Iterator<Item = &Map<String, Value>> {
        self.extra
            .get("turn_timings")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_object)
    }
}

/// Parse an ISO-8601 timestamp as written by the rollout system.
///
/// Values with an offset (`Z`, `+08:00`) are converted to UTC; naive values
/// are returned unchanged.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }

    const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Per-step values, steps ascending.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StepSeries {
    pub steps: Vec<i64>,
    pub values: Vec<f64>,
}

impl StepSeries {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// (step, value) pairs as chart points.
    pub fn points(&self) -> Vec<(f64, f64)> {
        self.steps
            .iter()
            .zip(&self.values)
            .map(|(&step, &value)| (step as f64, value))
            .collect()
    }
}

/// Estimated wall-clock start of each step, steps ascending.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StepStartTimes {
    pub steps: Vec<i64>,
    pub times: Vec<NaiveDateTime>,
}

/// All records of one rollout request, ordered by timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestTimeline {
    pub request_id: String,
    pub records: Vec<LogRecord>,
}

impl RequestTimeline {
    /// The first record with the given completion event.
    pub fn completion(&self, event: &str) -> Option<&LogRecord> {
        self.records.iter().find(|r| r.event == event)
    }

    /// Sort records by timestamp; records without one keep their relative
    /// order and go last.
    pub fn sort_by_time(&mut self) {
        self.records
            .sort_by_key(|r| (r.timestamp.is_none(), r.timestamp));
    }
}

/// Summary fields carried by a request's completion record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestSummary {
    pub request_id: String,
    pub duration: f64,
    pub turns: i64,
    pub response_length: i64,
    pub actual_response_tokens: i64,
    pub total_sequence_length: i64,
    pub finish_reason: String,
    pub batch_data_id: String,
}

impl RequestSummary {
    pub fn from_completion(request_id: &str, record: &LogRecord) -> Self {
        Self {
            request_id: request_id.to_string(),
            duration: record.duration_sec,
            turns: record.extra_i64("turns").unwrap_or(0),
            response_length: record.extra_i64("response_length").unwrap_or(0),
            actual_response_tokens: record.extra_i64("actual_response_tokens").unwrap_or(0),
            total_sequence_length: record.extra_i64("total_sequence_length").unwrap_or(0),
            finish_reason: record
                .extra_str("finish_reason")
                .unwrap_or_else(|| "unknown".to_string()),
            batch_data_id: record
                .extra_str("batch_data_id")
                .unwrap_or_else(|| "unknown".to_string()),
        }
    }

    /// First eight characters of the request id, for titles and file names.
    pub fn short_id(&self) -> &str {
        short_id(&self.request_id)
    }

    /// `FinishReasonTypeEnum.STOP` → `STOP`.
    pub fn finish_reason_short(&self) -> &str {
        self.finish_reason
            .rsplit('.')
            .next()
            .unwrap_or(&self.finish_reason)
    }
}

/// First eight characters of an id.
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// One phase's share of a request's total duration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseShare {
    pub phase: String,
    pub duration: f64,
    pub percentage: f64,
}

/// Phase breakdown of one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestPhases {
    pub summary: Option<RequestSummary>,
    /// Summed duration per known phase, in phase-list order (zeros kept).
    pub phases: Vec<(String, f64)>,
    /// Phases above the display threshold, longest first.
    pub table: Vec<PhaseShare>,
}

/// How the rollout stage of one step was spent, as a share of its total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepBreakdown {
    pub step: i64,
    pub total: f64,
    /// (phase event, percentage of total), only phases present for the step.
    pub shares: Vec<(String, f64)>,
}

/// Duration events reported by one worker file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerTimings {
    pub worker: String,
    /// (event, seconds) in display order.
    pub events: Vec<(String, f64)>,
}

impl WorkerTimings {
    pub fn get(&self, event: &str) -> Option<f64> {
        self.events
            .iter()
            .find(|(name, _)| name == event)
            .map(|(_, d)| *d)
    }

    pub fn longest(&self) -> Option<&(String, f64)> {
        self.events.iter().max_by(|a, b| a.1.total_cmp(&b.1))
    }

    pub fn shortest(&self) -> Option<&(String, f64)> {
        self.events.iter().min_by(|a, b| a.1.total_cmp(&b.1))
    }
}

/// A step whose value deviates from the series mean.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Outlier {
    pub step: i64,
    pub value: f64,
}

impl fmt::Display for Outlier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {} ({:.2}s)", self.step, self.value)
    }
}
