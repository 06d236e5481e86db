//! The `DataSample` type: a reference-counted, immutable, timestamped
//! value carried through the hub.
//!
//! A sample is constructed once (by ingress or by coercion) and shared
//! by every holder — current-value slot, ring buffer entries, the
//! pending-update slot, handler arguments — via cheap `Arc` clones.
//! The only "mutation" the core performs on an existing sample is
//! re-stamping its timestamp, which is implemented by building a new
//! sample rather than touching the shared one in place.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;

use crate::error::{HubError, Result};

/// The declared or adopted type of a resource's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Trigger,
    Boolean,
    Numeric,
    String,
    Json,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Trigger => "trigger",
            Self::Boolean => "boolean",
            Self::Numeric => "numeric",
            Self::String => "string",
            Self::Json => "json",
        };
        write!(f, "{s}")
    }
}

/// The typed payload of a sample.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Trigger,
    Boolean(bool),
    Numeric(f64),
    String(String),
    Json(String),
}

impl Value {
    #[must_use]
    pub const fn data_type(&self) -> DataType {
        match self {
            Self::Trigger => DataType::Trigger,
            Self::Boolean(_) => DataType::Boolean,
            Self::Numeric(_) => DataType::Numeric,
            Self::String(_) => DataType::String,
            Self::Json(_) => DataType::Json,
        }
    }
}

#[derive(Debug, PartialEq)]
struct SampleInner {
    timestamp: f64,
    value: Value,
}

/// An immutable, shared, timestamped value.
///
/// Clones are cheap (`Arc` bump); equality compares timestamp and
/// value, not identity.
#[derive(Debug, Clone)]
pub struct Sample(Arc<SampleInner>);

impl PartialEq for Sample {
    fn eq(&self, other: &Self) -> bool {
        self.0.timestamp == other.0.timestamp && self.0.value == other.0.value
    }
}

impl Sample {
    fn new(timestamp: f64, value: Value) -> Self {
        Self(Arc::new(SampleInner { timestamp, value }))
    }

    #[must_use]
    pub fn trigger(timestamp: f64) -> Self {
        Self::new(timestamp, Value::Trigger)
    }

    #[must_use]
    pub fn boolean(timestamp: f64, value: bool) -> Self {
        Self::new(timestamp, Value::Boolean(value))
    }

    #[must_use]
    pub fn numeric(timestamp: f64, value: f64) -> Self {
        Self::new(timestamp, Value::Numeric(value))
    }

    #[must_use]
    pub fn string(timestamp: f64, value: impl Into<String>) -> Self {
        Self::new(timestamp, Value::String(value.into()))
    }

    /// Construct a JSON sample. The text is validated at ingress: a
    /// malformed document is rejected here, before any sample exists,
    /// per the crate's propagation policy for JSON validation.
    pub fn json(timestamp: f64, text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        serde_json::from_str::<JsonValue>(&text)
            .map_err(|e| HubError::bad_parameter(format!("invalid JSON: {e}")))?;
        Ok(Self::new(timestamp, Value::Json(text)))
    }

    #[must_use]
    pub fn from_value(timestamp: f64, value: Value) -> Self {
        Self::new(timestamp, value)
    }

    #[must_use]
    pub fn timestamp(&self) -> f64 {
        self.0.timestamp
    }

    #[must_use]
    pub fn value(&self) -> &Value {
        &self.0.value
    }

    #[must_use]
    pub fn data_type(&self) -> DataType {
        self.0.value.data_type()
    }

    /// Rebuild this sample with a new timestamp, keeping the value.
    /// Used by the ingress layer to stamp "now" onto a client sample
    /// created with `timestamp == 0`.
    #[must_use]
    pub fn with_timestamp(&self, timestamp: f64) -> Self {
        Self::new(timestamp, self.0.value.clone())
    }

    #[must_use]
    pub fn as_boolean(&self) -> Option<bool> {
        match &self.0.value {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_numeric(&self) -> Option<f64> {
        match &self.0.value {
            Value::Numeric(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match &self.0.value {
            Value::String(s) | Value::Json(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Render this sample as a bounded, human-readable string.
    ///
    /// # Errors
    ///
    /// Returns `HubError::Overflow` if `bound` is too small to hold
    /// the rendered text.
    pub fn convert_to_string(&self, bound: usize) -> Result<String> {
        let rendered = match &self.0.value {
            Value::Trigger => String::new(),
            Value::Boolean(b) => b.to_string(),
            Value::Numeric(n) => format_numeric(*n),
            Value::String(s) => s.clone(),
            Value::Json(j) => j.clone(),
        };
        if rendered.len() >= bound {
            return Err(HubError::Overflow);
        }
        Ok(rendered)
    }

    /// Render this sample as a JSON value.
    ///
    /// String values are quoted and escaped; `Trigger` renders as
    /// `null`; non-finite numbers render as the quoted tokens `"NaN"`,
    /// `"Infinity"`, `"-Infinity"` (JSON has no literal for them).
    ///
    /// # Errors
    ///
    /// Returns `HubError::Overflow` if `bound` is too small; a JSON
    /// sample whose text exceeds `bound` is truncated with a trailing
    /// `"` instead, matching the legacy truncation contract (fixed to
    /// reserve exactly two bytes for the closing quote, not one).
    pub fn convert_to_json(&self, bound: usize) -> Result<String> {
        let rendered = match &self.0.value {
            Value::Trigger => "null".to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Numeric(n) => format_numeric_json(*n),
            Value::String(s) => {
                let quoted = serde_json::to_string(s)
                    .map_err(|e| HubError::fault(format!("string JSON encode: {e}")))?;
                if quoted.len() > bound {
                    let truncated = quoted.as_str();
                    let mut keep = bound.saturating_sub(2).min(truncated.len());
                    while keep > 0 && !truncated.is_char_boundary(keep) {
                        keep -= 1;
                    }
                    let mut out = truncated[..keep].to_string();
                    out.push('"');
                    return Ok(out);
                }
                quoted
            }
            Value::Json(j) => j.clone(),
        };
        if rendered.len() > bound {
            return Err(HubError::Overflow);
        }
        Ok(rendered)
    }

    /// Extract a JSON fragment from this sample using a `member`,
    /// `.member`, or `[index]` path grammar, returning a new sample
    /// whose type is inferred from the extracted fragment.
    ///
    /// # Errors
    ///
    /// Returns `HubError::BadParameter` if this sample is not JSON, or
    /// if `spec` is malformed; `HubError::NotFound` if the path does
    /// not resolve within the document.
    pub fn extract_json(&self, timestamp: f64, spec: &str) -> Result<Self> {
        let Value::Json(text) = &self.0.value else {
            return Err(HubError::bad_parameter("extract_json on non-JSON sample"));
        };
        let root: JsonValue = serde_json::from_str(text)
            .map_err(|e| HubError::bad_parameter(format!("invalid JSON: {e}")))?;
        let mut cursor = &root;
        for step in parse_extraction_spec(spec)? {
            cursor = match step {
                ExtractStep::Member(name) => cursor
                    .as_object()
                    .and_then(|o| o.get(&name))
                    .ok_or_else(|| HubError::not_found(format!("member '{name}' not found")))?,
                ExtractStep::Index(idx) => cursor
                    .as_array()
                    .and_then(|a| a.get(idx))
                    .ok_or_else(|| HubError::not_found(format!("index [{idx}] out of range")))?,
            };
        }
        json_fragment_to_sample(timestamp, cursor)
    }
}

enum ExtractStep {
    Member(String),
    Index(usize),
}

/// Parse `member ( . member | [ index ] )*` into a step list.
fn parse_extraction_spec(spec: &str) -> Result<Vec<ExtractStep>> {
    if spec.is_empty() {
        return Err(HubError::bad_parameter("empty extraction spec"));
    }
    let mut steps = Vec::new();
    let bytes = spec.as_bytes();
    let mut i = 0;
    let mut current = String::new();
    let flush = |current: &mut String, steps: &mut Vec<ExtractStep>| {
        if !current.is_empty() {
            steps.push(ExtractStep::Member(std::mem::take(current)));
        }
    };
    while i < bytes.len() {
        match bytes[i] {
            b'.' => {
                flush(&mut current, &mut steps);
                i += 1;
            }
            b'[' => {
                flush(&mut current, &mut steps);
                let close = spec[i..]
                    .find(']')
                    .ok_or_else(|| HubError::bad_parameter("unterminated '[' in extraction spec"))?
                    + i;
                let idx_str = &spec[i + 1..close];
                let idx = idx_str
                    .parse::<usize>()
                    .map_err(|_| HubError::bad_parameter(format!("bad index '{idx_str}'")))?;
                steps.push(ExtractStep::Index(idx));
                i = close + 1;
            }
            _ => {
                current.push(spec[i..].chars().next().unwrap());
                i += spec[i..].chars().next().unwrap().len_utf8();
            }
        }
    }
    flush(&mut current, &mut steps);
    if steps.is_empty() {
        return Err(HubError::bad_parameter("malformed extraction spec"));
    }
    Ok(steps)
}

fn json_fragment_to_sample(timestamp: f64, fragment: &JsonValue) -> Result<Sample> {
    let value = match fragment {
        JsonValue::Null => Value::Trigger,
        JsonValue::Bool(b) => Value::Boolean(*b),
        JsonValue::Number(n) => Value::Numeric(n.as_f64().unwrap_or(f64::NAN)),
        JsonValue::String(s) => Value::String(s.clone()),
        JsonValue::Array(_) | JsonValue::Object(_) => Value::Json(
            serde_json::to_string(fragment)
                .map_err(|e| HubError::fault(format!("re-encode fragment: {e}")))?,
        ),
    };
    Ok(Sample::from_value(timestamp, value))
}

/// `%lf`-style numeric formatting used for string/JSON rendering.
fn format_numeric(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() }
    } else {
        format!("{n}")
    }
}

fn format_numeric_json(n: f64) -> String {
    if n.is_finite() {
        format_numeric(n)
    } else {
        format!("\"{}\"", format_numeric(n))
    }
}
