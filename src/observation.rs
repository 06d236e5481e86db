//! `Observation`: a filter/transform/buffer tap in the routing graph.
//!
//! On push, a sample runs a seven-step pipeline: JSON extraction,
//! min-period, range, change-by, buffer insertion, transform (or
//! pass-through), and forwarding. Filters reject silently — a dropped
//! sample is not an error.

use std::collections::VecDeque;
use std::fmt;

use crate::backup::BufferBackupStore;
use crate::error::Result;
use crate::resource::ResourceState;
use crate::sample::{DataType, Sample, Value};

/// A transform computed over the ring buffer's current contents,
/// published in place of the raw accepted sample when configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    None,
    Mean,
    StdDev,
    Max,
    Min,
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Mean => "mean",
            Self::StdDev => "stddev",
            Self::Max => "max",
            Self::Min => "min",
        };
        write!(f, "{s}")
    }
}

/// `startTime` values below this threshold (seconds) are interpreted
/// as a relative "seconds before now" offset rather than an absolute
/// epoch time. 30 years.
pub const RELATIVE_TIME_THRESHOLD: f64 = 30.0 * 365.0 * 86400.0;

#[derive(Default)]
struct Filter {
    min_period: f64,
    high_limit: f64,
    low_limit: f64,
    change_by: f64,
    json_extraction: Option<String>,
}

impl Filter {
    fn new() -> Self {
        Self {
            min_period: 0.0,
            high_limit: f64::NAN,
            low_limit: f64::NAN,
            change_by: 0.0,
            json_extraction: None,
        }
    }
}

pub struct Observation {
    pub base: ResourceState,
    filter: Filter,
    transform: TransformKind,
    transform_params: Vec<f64>,
    buffer: VecDeque<Sample>,
    buffer_max_count: usize,
    buffer_backup_period: f64,
    last_backup_at: Option<f64>,
    last_accepted_timestamp: Option<f64>,
    last_accepted: Option<Sample>,
    destination: Option<String>,
    is_config: bool,
}

impl Default for Observation {
    fn default() -> Self {
        Self::new()
    }
}

impl Observation {
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: ResourceState::new(),
            filter: Filter::new(),
            transform: TransformKind::None,
            transform_params: Vec::new(),
            buffer: VecDeque::new(),
            buffer_max_count: 0,
            buffer_backup_period: 0.0,
            last_backup_at: None,
            last_accepted_timestamp: None,
            last_accepted: None,
            destination: None,
            is_config: false,
        }
    }

    // --- admin settings -------------------------------------------------

    pub fn set_min_period(&mut self, seconds: f64) {
        self.filter.min_period = seconds;
    }

    #[must_use]
    pub fn min_period(&self) -> f64 {
        self.filter.min_period
    }

    pub fn set_high_limit(&mut self, limit: f64) {
        self.filter.high_limit = limit;
    }

    #[must_use]
    pub fn high_limit(&self) -> f64 {
        self.filter.high_limit
    }

    pub fn set_low_limit(&mut self, limit: f64) {
        self.filter.low_limit = limit;
    }

    #[must_use]
    pub fn low_limit(&self) -> f64 {
        self.filter.low_limit
    }

    pub fn set_change_by(&mut self, magnitude: f64) {
        self.filter.change_by = magnitude;
    }

    #[must_use]
    pub fn change_by(&self) -> f64 {
        self.filter.change_by
    }

    pub fn set_json_extraction(&mut self, spec: Option<String>) {
        self.filter.json_extraction = spec;
    }

    #[must_use]
    pub fn json_extraction(&self) -> Option<&str> {
        self.filter.json_extraction.as_deref()
    }

    pub fn set_transform(&mut self, kind: TransformKind, params: Vec<f64>) {
        self.transform = kind;
        self.transform_params = params;
    }

    #[must_use]
    pub fn transform(&self) -> TransformKind {
        self.transform
    }

    #[must_use]
    pub fn transform_params(&self) -> &[f64] {
        &self.transform_params
    }

    pub fn set_buffer_max_count(&mut self, max: usize) {
        self.buffer_max_count = max;
        while self.buffer.len() > max && max > 0 {
            self.buffer.pop_front();
        }
        if max == 0 {
            self.buffer.clear();
        }
    }

    #[must_use]
    pub fn buffer_max_count(&self) -> usize {
        self.buffer_max_count
    }

    pub fn set_buffer_backup_period(&mut self, seconds: f64) {
        self.buffer_backup_period = seconds;
    }

    #[must_use]
    pub fn buffer_backup_period(&self) -> f64 {
        self.buffer_backup_period
    }

    pub fn set_destination(&mut self, destination: Option<String>) {
        self.destination = destination;
    }

    #[must_use]
    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    pub fn set_is_config(&mut self, is_config: bool) {
        self.is_config = is_config;
    }

    #[must_use]
    pub fn is_config(&self) -> bool {
        self.is_config
    }

    #[must_use]
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn buffer(&self) -> &VecDeque<Sample> {
        &self.buffer
    }

    /// Whether this observation carries admin settings that should
    /// survive a delete (any filter, transform, buffer, or routing
    /// configuration, in addition to the shared base settings).
    #[must_use]
    pub fn has_admin_settings(&self) -> bool {
        self.base.has_local_admin_settings()
            || self.filter.min_period != 0.0
            || !self.filter.high_limit.is_nan()
            || !self.filter.low_limit.is_nan()
            || self.filter.change_by != 0.0
            || self.filter.json_extraction.is_some()
            || self.transform != TransformKind::None
            || self.buffer_max_count != 0
            || self.buffer_backup_period != 0.0
            || self.destination.is_some()
    }

    // --- push pipeline ---------------------------------------------------

    /// Run the filter/buffer/transform pipeline over `incoming`.
    /// Returns the sample to forward downstream, or `None` if the
    /// sample was silently rejected by a filter.
    pub fn process(
        &mut self,
        incoming: &Sample,
        backup: &dyn BufferBackupStore,
        obs_path: &str,
    ) -> Option<Sample> {
        let accepted = self.run_filters(incoming)?;

        self.last_accepted_timestamp = Some(accepted.timestamp());
        self.last_accepted = Some(accepted.clone());

        let buffer_changed = self.buffer_max_count > 0;
        if buffer_changed {
            if self.buffer.len() >= self.buffer_max_count {
                self.buffer.pop_front();
            }
            self.buffer.push_back(accepted.clone());
            self.maybe_backup(backup, obs_path, accepted.timestamp());
        }

        let published = if self.transform == TransformKind::None {
            accepted
        } else {
            let value = self.compute_transform(self.transform);
            Sample::numeric(incoming.timestamp(), value)
        };

        self.base.store_current(published.clone());
        Some(published)
    }

    fn run_filters(&self, incoming: &Sample) -> Option<Sample> {
        let extracted = self.apply_extraction(incoming)?;
        if !self.passes_min_period(extracted.timestamp()) {
            return None;
        }
        if !self.passes_range(&extracted) {
            return None;
        }
        if !self.passes_change_by(&extracted) {
            return None;
        }
        Some(extracted)
    }

    fn apply_extraction(&self, incoming: &Sample) -> Option<Sample> {
        match &self.filter.json_extraction {
            None => Some(incoming.clone()),
            Some(spec) => {
                if incoming.data_type() != DataType::Json {
                    return None;
                }
                incoming.extract_json(incoming.timestamp(), spec).ok()
            }
        }
    }

    fn passes_min_period(&self, candidate_ts: f64) -> bool {
        match self.last_accepted_timestamp {
            None => true,
            Some(last_ts) => {
                self.filter.min_period == 0.0 || (candidate_ts - last_ts) >= self.filter.min_period
            }
        }
    }

    fn passes_range(&self, candidate: &Sample) -> bool {
        let v = match candidate.value() {
            Value::Numeric(n) => *n,
            Value::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            _ => return true,
        };
        if !self.filter.low_limit.is_nan() && v < self.filter.low_limit {
            return false;
        }
        if !self.filter.high_limit.is_nan() && v > self.filter.high_limit {
            return false;
        }
        true
    }

    fn passes_change_by(&self, candidate: &Sample) -> bool {
        if self.filter.change_by == 0.0 {
            return true;
        }
        let Some(last) = &self.last_accepted else {
            return true;
        };
        match candidate.value() {
            Value::Trigger => true,
            Value::Numeric(n) => match last.as_numeric() {
                Some(prev) => (n - prev).abs() >= self.filter.change_by,
                None => true,
            },
            _ => candidate != last,
        }
    }

    fn compute_transform(&self, kind: TransformKind) -> f64 {
        let values: Vec<f64> = self.buffer.iter().filter_map(Sample::as_numeric).collect();
        transform_over(kind, &values)
    }

    fn maybe_backup(&mut self, backup: &dyn BufferBackupStore, obs_path: &str, now: f64) {
        if self.buffer_max_count == 0 || self.buffer_backup_period <= 0.0 {
            return;
        }
        let due = match self.last_backup_at {
            None => true,
            Some(last) => now - last >= self.buffer_backup_period,
        };
        if !due {
            return;
        }
        if backup.write_buffer(obs_path, &self.buffer_to_json()).is_ok() {
            self.last_backup_at = Some(now);
        }
    }

    /// Serialize the buffer in the documented export format: a JSON
    /// array of `{"t": <number>, "v": <value>}` objects, trigger
    /// samples omitting `v`. No trailing newline, no pretty-printing.
    #[must_use]
    pub fn buffer_to_json(&self) -> String {
        let mut out = String::from("[");
        for (i, sample) in self.buffer.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str("{\"t\":");
            out.push_str(&format_timestamp(sample.timestamp()));
            if sample.data_type() != DataType::Trigger {
                out.push_str(",\"v\":");
                out.push_str(&sample.convert_to_json(usize::MAX).unwrap_or_default());
            }
            out.push('}');
        }
        out.push(']');
        out
    }

    /// Restore the buffer from a previously backed-up JSON array, as
    /// requested at observation (re)creation.
    ///
    /// # Errors
    ///
    /// Returns `HubError::BadParameter` if `json` is not a valid
    /// buffer export document.
    pub fn restore_from_backup(&mut self, json: &str) -> Result<()> {
        let restored = parse_buffer_json(json)?;
        self.buffer.clear();
        for sample in restored {
            if self.buffer_max_count > 0 && self.buffer.len() >= self.buffer_max_count {
                self.buffer.pop_front();
            }
            self.buffer.push_back(sample);
        }
        self.last_accepted = self.buffer.back().cloned();
        self.last_accepted_timestamp = self.last_accepted.as_ref().map(Sample::timestamp);
        Ok(())
    }

    /// Time-windowed statistics query. `start_time` below
    /// `RELATIVE_TIME_THRESHOLD` is a "seconds before `now`" offset;
    /// otherwise an absolute epoch bound. Returns `NaN` if no samples
    /// fall in the window or the buffer holds no numeric data.
    #[must_use]
    pub fn query_stat(&self, kind: TransformKind, start_time: f64, now: f64) -> f64 {
        let bound = if start_time < RELATIVE_TIME_THRESHOLD {
            now - start_time
        } else {
            start_time
        };
        let values: Vec<f64> = self
            .buffer
            .iter()
            .filter(|s| s.timestamp() >= bound)
            .filter_map(Sample::as_numeric)
            .collect();
        transform_over(kind, &values)
    }
}

fn transform_over(kind: TransformKind, values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    match kind {
        TransformKind::None => f64::NAN,
        TransformKind::Mean => values.iter().sum::<f64>() / values.len() as f64,
        TransformKind::StdDev => {
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            let variance =
                values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
            variance.sqrt()
        }
        TransformKind::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        TransformKind::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
    }
}

fn format_timestamp(ts: f64) -> String {
    format!("{ts}")
}

fn parse_buffer_json(json: &str) -> Result<Vec<Sample>> {
    use crate::error::HubError;
    let parsed: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| HubError::bad_parameter(format!("invalid buffer backup JSON: {e}")))?;
    let array = parsed
        .as_array()
        .ok_or_else(|| HubError::bad_parameter("buffer backup is not a JSON array"))?;
    let mut samples = Vec::with_capacity(array.len());
    for entry in array {
        let obj = entry
            .as_object()
            .ok_or_else(|| HubError::bad_parameter("buffer entry is not an object"))?;
        let t = obj
            .get("t")
            .and_then(serde_json::Value::as_f64)
            .ok_or_else(|| HubError::bad_parameter("buffer entry missing numeric 't'"))?;
        let sample = match obj.get("v") {
            None => Sample::trigger(t),
            Some(serde_json::Value::Bool(b)) => Sample::boolean(t, *b),
            Some(serde_json::Value::Number(n)) => Sample::numeric(t, n.as_f64().unwrap_or(f64::NAN)),
            Some(serde_json::Value::String(s)) => Sample::string(t, s.clone()),
            Some(other) => Sample::from_value(
                t,
                Value::Json(serde_json::to_string(other).unwrap_or_default()),
            ),
        };
        samples.push(sample);
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::NullBackupStore;

    #[test]
    fn min_period_and_range_filter_scenario() {
        let mut obs = Observation::new();
        obs.set_min_period(10.0);
        obs.set_low_limit(-50.0);
        obs.set_high_limit(50.0);
        let store = NullBackupStore;
        let push = |obs: &mut Observation, ts: f64, v: f64| {
            obs.process(&Sample::numeric(ts, v), &store, "/obs/t")
        };
        assert!(push(&mut obs, 0.0, 20.0).is_some());
        assert!(push(&mut obs, 1.0, 21.0).is_none());
        assert!(push(&mut obs, 11.0, 22.0).is_some());
        assert!(push(&mut obs, 12.0, 100.0).is_none());
    }

    #[test]
    fn change_by_rejects_small_moves() {
        let mut obs = Observation::new();
        obs.set_change_by(5.0);
        let store = NullBackupStore;
        assert!(obs.process(&Sample::numeric(0.0, 10.0), &store, "/obs/x").is_some());
        assert!(obs.process(&Sample::numeric(1.0, 12.0), &store, "/obs/x").is_none());
        assert!(obs.process(&Sample::numeric(2.0, 20.0), &store, "/obs/x").is_some());
    }

    #[test]
    fn trigger_ignores_change_by() {
        let mut obs = Observation::new();
        obs.set_change_by(5.0);
        let store = NullBackupStore;
        assert!(obs.process(&Sample::trigger(0.0), &store, "/obs/x").is_some());
        assert!(obs.process(&Sample::trigger(1.0), &store, "/obs/x").is_some());
    }

    #[test]
    fn buffer_evicts_oldest_fifo() {
        let mut obs = Observation::new();
        obs.set_buffer_max_count(2);
        let store = NullBackupStore;
        obs.process(&Sample::numeric(0.0, 1.0), &store, "/obs/x");
        obs.process(&Sample::numeric(1.0, 2.0), &store, "/obs/x");
        obs.process(&Sample::numeric(2.0, 3.0), &store, "/obs/x");
        assert_eq!(obs.buffer_len(), 2);
        assert_eq!(obs.buffer().front().unwrap().as_numeric(), Some(2.0));
    }

    #[test]
    fn mean_transform_publishes_synthetic_numeric_sample() {
        let mut obs = Observation::new();
        obs.set_buffer_max_count(10);
        obs.set_transform(TransformKind::Mean, vec![]);
        let store = NullBackupStore;
        obs.process(&Sample::numeric(0.0, 10.0), &store, "/obs/x");
        let out = obs
            .process(&Sample::numeric(1.0, 20.0), &store, "/obs/x")
            .unwrap();
        assert_eq!(out.data_type(), DataType::Numeric);
        assert_eq!(out.as_numeric(), Some(15.0));
    }

    #[test]
    fn non_numeric_buffer_transform_yields_nan() {
        let mut obs = Observation::new();
        obs.set_buffer_max_count(10);
        obs.set_transform(TransformKind::Mean, vec![]);
        let store = NullBackupStore;
        let out = obs
            .process(&Sample::string(0.0, "hi"), &store, "/obs/x")
            .unwrap();
        assert!(out.as_numeric().unwrap().is_nan());
    }

    #[test]
    fn buffer_json_round_trip() {
        let mut obs = Observation::new();
        obs.set_buffer_max_count(10);
        let store = NullBackupStore;
        obs.process(&Sample::trigger(0.0), &store, "/obs/x");
        obs.process(&Sample::numeric(1.0, 2.5), &store, "/obs/x");
        let json = obs.buffer_to_json();
        assert_eq!(json, r#"[{"t":0},{"t":1,"v":2.5}]"#);

        let mut restored = Observation::new();
        restored.set_buffer_max_count(10);
        restored.restore_from_backup(&json).unwrap();
        assert_eq!(restored.buffer_len(), 2);
    }

    #[test]
    fn query_stat_relative_window() {
        let mut obs = Observation::new();
        obs.set_buffer_max_count(10);
        let store = NullBackupStore;
        obs.process(&Sample::numeric(0.0, 1.0), &store, "/obs/x");
        obs.process(&Sample::numeric(50.0, 2.0), &store, "/obs/x");
        obs.process(&Sample::numeric(100.0, 3.0), &store, "/obs/x");
        // now=100, startTime=30 (relative, well below threshold) -> bound=70
        let mean = obs.query_stat(TransformKind::Mean, 30.0, 100.0);
        assert_eq!(mean, 3.0);
    }
}
