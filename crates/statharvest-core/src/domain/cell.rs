use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Target type for deterministic column coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Bool,
    Int,
    Float,
    Text,
}

/// A single scalar in a [`RecordBatch`](super::RecordBatch).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Parses scraped text into the narrowest scalar: empty to `Null`, then
    /// integer, then float, otherwise text.
    pub fn infer(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::Null;
        }
        if let Ok(value) = trimmed.parse::<i64>() {
            return Self::Int(value);
        }
        // Rejects "inf" and "NaN", which f64 parsing would otherwise accept.
        if trimmed.bytes().any(|b| b.is_ascii_digit()) {
            if let Ok(value) = trimmed.parse::<f64>() {
                if value.is_finite() {
                    return Self::Float(value);
                }
            }
        }
        Self::Text(trimmed.to_string())
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Converts to `dtype`. Values that cannot be represented become `Null`;
    /// floats are truncated toward zero when cast to integers.
    pub fn coerce(&self, dtype: DType) -> Self {
        match (dtype, self) {
            (_, Self::Null) => Self::Null,
            (DType::Int, Self::Int(_)) | (DType::Float, Self::Float(_)) => self.clone(),
            (DType::Bool, Self::Bool(_)) | (DType::Text, Self::Text(_)) => self.clone(),
            (DType::Int, Self::Float(value)) => float_to_int(*value),
            (DType::Int, Self::Bool(value)) => Self::Int(i64::from(*value)),
            (DType::Int, Self::Text(value)) => match Self::infer(value) {
                Self::Int(parsed) => Self::Int(parsed),
                Self::Float(parsed) => float_to_int(parsed),
                _ => Self::Null,
            },
            (DType::Float, Self::Int(value)) => Self::Float(*value as f64),
            (DType::Float, Self::Bool(value)) => Self::Float(if *value { 1.0 } else { 0.0 }),
            (DType::Float, Self::Text(value)) => match Self::infer(value) {
                Self::Int(parsed) => Self::Float(parsed as f64),
                Self::Float(parsed) => Self::Float(parsed),
                _ => Self::Null,
            },
            (DType::Bool, Self::Int(value)) => Self::Bool(*value != 0),
            (DType::Bool, Self::Float(value)) => Self::Bool(*value != 0.0),
            (DType::Bool, Self::Text(value)) => match value.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "y" | "1" => Self::Bool(true),
                "false" | "no" | "n" | "0" => Self::Bool(false),
                _ => Self::Null,
            },
            (DType::Text, other) => Self::Text(other.to_string()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(value) => Value::Bool(*value),
            Self::Int(value) => Value::Number(Number::from(*value)),
            Self::Float(value) => Number::from_f64(*value)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Text(value) => Value::String(value.clone()),
        }
    }

    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(value) => Self::Bool(*value),
            Value::Number(number) => number
                .as_i64()
                .map(Self::Int)
                .or_else(|| number.as_f64().map(Self::Float))
                .unwrap_or(Self::Null),
            Value::String(value) => Self::Text(value.clone()),
            other => Self::Text(other.to_string()),
        }
    }
}

fn float_to_int(value: f64) -> Cell {
    if value.is_finite() {
        Cell::Int(value.trunc() as i64)
    } else {
        Cell::Null
    }
}

impl Display for Cell {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_narrowest_scalar() {
        assert_eq!(Cell::infer(" 12 "), Cell::Int(12));
        assert_eq!(Cell::infer("4.5"), Cell::Float(4.5));
        assert_eq!(Cell::infer(""), Cell::Null);
        assert_eq!(Cell::infer("QB"), Cell::text("QB"));
        assert_eq!(Cell::infer("inf"), Cell::text("inf"));
        assert_eq!(Cell::infer("NaN"), Cell::text("NaN"));
    }

    #[test]
    fn test_coerce_is_deterministic() {
        assert_eq!(Cell::Float(7.9).coerce(DType::Int), Cell::Int(7));
        assert_eq!(Cell::text("12").coerce(DType::Int), Cell::Int(12));
        assert_eq!(Cell::text("-").coerce(DType::Int), Cell::Null);
        assert_eq!(Cell::Int(3).coerce(DType::Text), Cell::text("3"));
        assert_eq!(Cell::Null.coerce(DType::Float), Cell::Null);
    }

    #[test]
    fn test_json_round_trip_preserves_integers() {
        let value = Cell::Int(2023).to_json();
        assert_eq!(value, serde_json::json!(2023));
        assert_eq!(Cell::from_json(&value), Cell::Int(2023));
    }
}
