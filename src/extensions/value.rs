//! Engine-independent representation of guest values.
//!
//! Every value crossing the host/guest boundary is first converted into a
//! [`GuestValue`]. Guest `null` and `undefined` both collapse into
//! [`GuestValue::Null`], and looking up a missing key also yields `Null`, so
//! "absent" has exactly one shape on the host side.

use std::collections::BTreeMap;
use std::fmt;

static NULL: GuestValue = GuestValue::Null;

/// A value produced by or destined for guest code.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum GuestValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Sequence(Vec<GuestValue>),
    Mapping(BTreeMap<String, GuestValue>),
}

impl GuestValue {
    /// Empty mapping, for building records field by field.
    pub fn mapping() -> Self {
        Self::Mapping(BTreeMap::new())
    }

    /// Short name of the variant, used in decode errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Sequence(_) => "sequence",
            Self::Mapping(_) => "mapping",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[GuestValue]> {
        match self {
            Self::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&BTreeMap<String, GuestValue>> {
        match self {
            Self::Mapping(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a key. Missing keys and non-mapping values yield `Null`.
    pub fn get(&self, key: &str) -> &GuestValue {
        match self {
            Self::Mapping(map) => map.get(key).unwrap_or(&NULL),
            _ => &NULL,
        }
    }

    /// Whether the key is present with a non-null value.
    pub fn has(&self, key: &str) -> bool {
        !self.get(key).is_null()
    }

    /// Insert a field, skipping `Null` so encoded records stay sparse.
    ///
    /// Has no effect on non-mapping values.
    pub fn insert(&mut self, key: &str, value: impl Into<GuestValue>) {
        if let Self::Mapping(map) = self {
            let value = value.into();
            if !value.is_null() {
                map.insert(key.to_string(), value);
            }
        }
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, key: &str, value: impl Into<GuestValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Render a scalar the way guest code would print it.
    ///
    /// Integral numbers lose their trailing `.0`; sequences and mappings
    /// have no scalar form.
    pub fn to_scalar_string(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Number(n) => Some(format_number(*n)),
            Self::Bool(b) => Some(b.to_string()),
            Self::Null | Self::Sequence(_) | Self::Mapping(_) => None,
        }
    }

    /// Truthiness as guest code would evaluate it.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => !s.is_empty(),
            Self::Sequence(_) | Self::Mapping(_) => true,
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 9.007_199_254_740_992e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl fmt::Display for GuestValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_scalar_string() {
            Some(s) => f.write_str(&s),
            None => write!(f, "{}", serde_json::Value::from(self.clone())),
        }
    }
}

impl From<bool> for GuestValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for GuestValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<f32> for GuestValue {
    fn from(value: f32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<i64> for GuestValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<u32> for GuestValue {
    fn from(value: u32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<&str> for GuestValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for GuestValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&String> for GuestValue {
    fn from(value: &String) -> Self {
        Self::String(value.clone())
    }
}

impl<T: Into<GuestValue>> From<Option<T>> for GuestValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<GuestValue>> From<Vec<T>> for GuestValue {
    fn from(value: Vec<T>) -> Self {
        Self::Sequence(value.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, GuestValue>> for GuestValue {
    fn from(value: BTreeMap<String, GuestValue>) -> Self {
        Self::Mapping(value)
    }
}

impl From<serde_json::Value> for GuestValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map_or(Self::Null, Self::Number),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Sequence(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(map) => Self::Mapping(
                map.into_iter()
                    .map(|(key, value)| (key, Self::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<GuestValue> for serde_json::Value {
    fn from(value: GuestValue) -> Self {
        match value {
            GuestValue::Null => Self::Null,
            GuestValue::Bool(b) => Self::Bool(b),
            GuestValue::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 9.007_199_254_740_992e15 {
                    Self::from(n as i64)
                } else {
                    serde_json::Number::from_f64(n).map_or(Self::Null, Self::Number)
                }
            }
            GuestValue::String(s) => Self::String(s),
            GuestValue::Sequence(items) => {
                Self::Array(items.into_iter().map(Self::from).collect())
            }
            GuestValue::Mapping(map) => Self::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Self::from(value)))
                    .collect(),
            ),
        }
    }
}
