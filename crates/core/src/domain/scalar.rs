use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A field the model may emit as a number, a string (ranges such as
/// `"60-65"` or `"7-8%"`) or `null`. Exactly one representation is active.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum FlexibleScalar {
    Numeric(f64),
    Text(String),
    #[default]
    Null,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("could not decode scalar as number, string or null: {raw}")]
pub struct MalformedScalar {
    pub raw: String,
}

impl FlexibleScalar {
    /// Decodes a raw JSON token. The null literal wins, then a numeric
    /// literal, then a JSON string.
    pub fn from_raw(raw: &str) -> Result<Self, MalformedScalar> {
        let token = raw.trim();
        if token == "null" {
            return Ok(Self::Null);
        }
        if let Ok(n) = serde_json::from_str::<f64>(token) {
            return Ok(Self::Numeric(n));
        }
        if let Ok(s) = serde_json::from_str::<String>(token) {
            return Ok(Self::Text(s));
        }
        Err(MalformedScalar {
            raw: raw.to_string(),
        })
    }

    fn from_value(value: Value) -> Result<Self, MalformedScalar> {
        match value {
            Value::Null => Ok(Self::Null),
            Value::Number(n) => n.as_f64().map(Self::Numeric).ok_or_else(|| MalformedScalar {
                raw: n.to_string(),
            }),
            Value::String(s) => Ok(Self::Text(s)),
            other => Err(MalformedScalar {
                raw: other.to_string(),
            }),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Numeric(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Display form for a nullable text column; `Null` maps to SQL NULL.
    pub fn to_column(&self) -> Option<String> {
        match self {
            Self::Null => None,
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for FlexibleScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "{n:.2}"),
            Self::Text(s) => f.write_str(s),
            Self::Null => Ok(()),
        }
    }
}

impl<'de> Deserialize<'de> for FlexibleScalar {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(de::Error::custom)
    }
}

impl Serialize for FlexibleScalar {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Numeric(n) => serializer.serialize_f64(*n),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Null => serializer.serialize_none(),
        }
    }
}
