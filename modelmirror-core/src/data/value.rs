//! Scalar cell values, label keys and column kinds.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Strings treated as missing when parsing delimited text.
const MISSING_TOKENS: &[&str] = &[
    "", "na", "n/a", "nan", "-nan", "null", "none", "<na>", "#n/a",
];

/// A single cell of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    /// Parse a raw text cell, inferring booleans, numbers and missing values.
    pub fn parse_cell(raw: &str) -> Self {
        let s = raw.trim();
        let lower = s.to_ascii_lowercase();
        if MISSING_TOKENS.contains(&lower.as_str()) {
            return Value::Null;
        }
        match lower.as_str() {
            "true" => return Value::Bool(true),
            "false" => return Value::Bool(false),
            _ => {}
        }
        match s.parse::<f64>() {
            Ok(n) if !n.is_nan() => Value::Number(n),
            _ => Value::Text(s.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view used for correlation and linear models; booleans map to 0/1.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Null | Value::Text(_) => None,
        }
    }

    /// Convert to a JSON value for model adapters.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
        }
    }

    /// Build a value from a JSON scalar. Arrays and objects become text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Inferred type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Boolean,
    Categorical,
}

impl ColumnKind {
    /// Infer the kind from the column's values. An all-null column is numeric.
    pub fn infer(values: &[Value]) -> Self {
        let mut has_number = false;
        let mut has_bool = false;
        for v in values {
            match v {
                Value::Null => {}
                Value::Number(_) => has_number = true,
                Value::Bool(_) => has_bool = true,
                Value::Text(_) => return ColumnKind::Categorical,
            }
        }
        match (has_number, has_bool) {
            (true, true) => ColumnKind::Categorical,
            (false, true) => ColumnKind::Boolean,
            _ => ColumnKind::Numeric,
        }
    }

    /// Numeric and boolean columns take part in correlation.
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnKind::Numeric | ColumnKind::Boolean)
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ColumnKind::Numeric => "numeric",
            ColumnKind::Boolean => "boolean",
            ColumnKind::Categorical => "categorical",
        };
        write!(f, "{s}")
    }
}

/// Float wrapper with total ordering and bitwise equality, so that
/// non-integral labels can be used as map keys.
#[derive(Debug, Clone, Copy)]
pub struct FloatKey(f64);

impl FloatKey {
    pub fn new(v: f64) -> Self {
        // -0.0 and 0.0 are the same label; all NaNs collapse to one.
        if v == 0.0 {
            Self(0.0)
        } else if v.is_nan() {
            Self(f64::NAN)
        } else {
            Self(v)
        }
    }

    pub fn get(self) -> f64 {
        self.0
    }
}

impl PartialEq for FloatKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for FloatKey {}

impl Hash for FloatKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl PartialOrd for FloatKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloatKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// A class label or group value. Hashable and totally ordered so it can key
/// per-group maps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Label {
    Missing,
    Bool(bool),
    Int(i64),
    Float(FloatKey),
    Text(String),
}

impl Label {
    /// Parse a label from user input (CLI flag or config) with the same
    /// inference rules as dataset cells.
    pub fn parse(raw: &str) -> Self {
        Label::from(&Value::parse_cell(raw))
    }

    pub fn from_number(n: f64) -> Self {
        if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
            Label::Int(n as i64)
        } else {
            Label::Float(FloatKey::new(n))
        }
    }

    /// Build a label from a JSON scalar returned by an external model.
    pub fn from_json(value: &serde_json::Value) -> Self {
        Label::from(&Value::from_json(value))
    }
}

impl From<&Value> for Label {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Label::Missing,
            Value::Bool(b) => Label::Bool(*b),
            Value::Number(n) => Label::from_number(*n),
            Value::Text(s) => Label::Text(s.clone()),
        }
    }
}

impl From<i64> for Label {
    fn from(v: i64) -> Self {
        Label::Int(v)
    }
}

impl From<bool> for Label {
    fn from(v: bool) -> Self {
        Label::Bool(v)
    }
}

impl From<&str> for Label {
    fn from(v: &str) -> Self {
        Label::Text(v.to_string())
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Missing => write!(f, "null"),
            Label::Bool(b) => write!(f, "{b}"),
            Label::Int(i) => write!(f, "{i}"),
            Label::Float(x) => write!(f, "{}", x.get()),
            Label::Text(s) => write!(f, "{s}"),
        }
    }
}

impl Serialize for Label {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Label {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(match &value {
            serde_json::Value::String(s) => Label::parse(s),
            other => Label::from_json(other),
        })
    }
}
