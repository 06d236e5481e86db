//! `IoPoint`: the Input/Output specialization — a declared data type,
//! units, the mandatory flag, and the type-coercion table that every
//! push to an Input or Output passes through.

use crate::resource::ResourceState;
use crate::sample::{DataType, Sample, Value};

/// Which side of the routing edge this point represents. Inputs ignore
/// pushes arriving via a source route; Outputs do not have that
/// restriction but default to `mandatory`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoKind {
    Input,
    Output,
}

pub struct IoPoint {
    pub base: ResourceState,
    pub kind: IoKind,
    pub data_type: DataType,
    pub units: String,
    mandatory: bool,
    /// JSON inputs only: a documentation-tooling example value.
    pub example: Option<Sample>,
}

impl IoPoint {
    #[must_use]
    pub fn new(kind: IoKind, data_type: DataType, units: impl Into<String>) -> Self {
        Self {
            base: ResourceState::new(),
            kind,
            data_type,
            units: units.into(),
            mandatory: matches!(kind, IoKind::Output),
            example: None,
        }
    }

    #[must_use]
    pub fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    pub fn mark_optional(&mut self) {
        self.mandatory = false;
    }

    /// Whether a mandatory output has never received a first value.
    #[must_use]
    pub fn is_missing_mandatory_value(&self) -> bool {
        self.mandatory
            && matches!(self.kind, IoKind::Output)
            && self.base.raw_current().is_none()
    }

    /// Coerce `sample` to this point's declared type via the 2-D
    /// dispatch table below. Identity transitions clone the `Arc`
    /// inside `Sample` rather than reconstruct.
    #[must_use]
    pub fn coerce(&self, sample: &Sample) -> Sample {
        coerce(sample, self.data_type)
    }
}

/// The coercion table, implemented as a single match over
/// `(from, to)`. Two branches are deliberately left as-is rather than
/// "corrected": string→boolean treats any non-empty string (including
/// `"false"`) as `true`, and string→numeric yields `1.0` for any
/// non-empty string rather than parsing it.
#[must_use]
pub fn coerce(sample: &Sample, to: DataType) -> Sample {
    let ts = sample.timestamp();
    if sample.data_type() == to {
        return sample.clone();
    }
    match to {
        DataType::Trigger => Sample::trigger(ts),
        DataType::Boolean => Sample::boolean(ts, to_boolean(sample)),
        DataType::Numeric => Sample::numeric(ts, to_numeric(sample)),
        DataType::String => Sample::string(ts, to_display_string(sample)),
        DataType::Json => {
            Sample::from_value(ts, Value::Json(to_json_text(sample)))
        }
    }
}

fn to_boolean(sample: &Sample) -> bool {
    match sample.value() {
        Value::Trigger => false,
        Value::Boolean(b) => *b,
        Value::Numeric(n) => *n != 0.0,
        // Any non-empty string, including "false", coerces to `true`.
        Value::String(s) => !s.is_empty(),
        Value::Json(j) => json_truthy(j),
    }
}

fn to_numeric(sample: &Sample) -> f64 {
    match sample.value() {
        Value::Trigger => f64::NAN,
        Value::Boolean(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::Numeric(n) => *n,
        // Non-empty strings yield 1.0 regardless of content; this is
        // not a numeric parse.
        Value::String(s) => {
            if s.is_empty() {
                0.0
            } else {
                1.0
            }
        }
        Value::Json(j) => json_to_numeric(j),
    }
}

fn to_display_string(sample: &Sample) -> String {
    match sample.value() {
        Value::Trigger => String::new(),
        Value::Boolean(b) => b.to_string(),
        Value::Numeric(n) => format!("{n}"),
        Value::String(s) => s.clone(),
        Value::Json(j) => j.clone(),
    }
}

fn to_json_text(sample: &Sample) -> String {
    match sample.value() {
        Value::Trigger => "null".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Numeric(n) => {
            if n.is_finite() {
                format!("{n}")
            } else {
                format!("\"{n}\"")
            }
        }
        Value::String(s) => serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string()),
        Value::Json(j) => j.clone(),
    }
}

fn json_truthy(text: &str) -> bool {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(serde_json::Value::Bool(b)) => b,
        Ok(serde_json::Value::Null) => false,
        Ok(serde_json::Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Ok(serde_json::Value::String(s)) => !s.is_empty(),
        Ok(serde_json::Value::Array(a)) => !a.is_empty(),
        Ok(serde_json::Value::Object(o)) => !o.is_empty(),
        Err(_) => false,
    }
}

fn json_to_numeric(text: &str) -> f64 {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Ok(serde_json::Value::Bool(true)) => 1.0,
        Ok(serde_json::Value::Bool(false)) => 0.0,
        _ => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_to_numeric_does_not_parse() {
        let s = Sample::string(2.0, "cold");
        let coerced = coerce(&s, DataType::Numeric);
        assert_eq!(coerced.as_numeric(), Some(1.0));
        assert_eq!(coerced.timestamp(), 2.0);
    }

    #[test]
    fn string_false_coerces_to_boolean_true() {
        let s = Sample::string(0.0, "false");
        let coerced = coerce(&s, DataType::Boolean);
        assert_eq!(coerced.as_boolean(), Some(true));
    }

    #[test]
    fn empty_string_coerces_to_false_and_zero() {
        let s = Sample::string(0.0, "");
        assert_eq!(coerce(&s, DataType::Boolean).as_boolean(), Some(false));
        assert_eq!(coerce(&s, DataType::Numeric).as_numeric(), Some(0.0));
    }

    #[test]
    fn numeric_to_boolean_nonzero_is_true() {
        let s = Sample::numeric(0.0, -3.5);
        assert_eq!(coerce(&s, DataType::Boolean).as_boolean(), Some(true));
    }

    #[test]
    fn identity_transition_clones_cheaply() {
        let s = Sample::numeric(1.0, 1.0);
        let coerced = coerce(&s, DataType::Numeric);
        assert_eq!(coerced, s);
    }

    #[test]
    fn mandatory_output_tracks_first_value() {
        let mut p = IoPoint::new(IoKind::Output, DataType::Numeric, "degC");
        assert!(p.is_missing_mandatory_value());
        p.base.store_current(Sample::numeric(1.0, 1.0));
        assert!(!p.is_missing_mandatory_value());
    }

    #[test]
    fn mark_optional_clears_mandatory() {
        let mut p = IoPoint::new(IoKind::Output, DataType::Numeric, "degC");
        p.mark_optional();
        assert!(!p.is_missing_mandatory_value());
    }
}
