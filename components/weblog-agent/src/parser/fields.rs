// External crates
use std::borrow::Cow;
use std::collections::HashMap;
use std::time::Duration;

/// Canonical names of the fields the aggregation stages understand.
pub mod field {
    pub const REMOTE_ADDR: &str = "remote_addr";
    pub const REMOTE_USER: &str = "remote_user";
    pub const REQUEST: &str = "request";
    pub const METHOD: &str = "method";
    pub const URI: &str = "uri";
    pub const PROTOCOL: &str = "protocol";
    pub const STATUS: &str = "status";
    pub const BYTES_SENT: &str = "bytes_sent";
    pub const REQUEST_LENGTH: &str = "request_length";
    pub const REQUEST_TIME: &str = "request_time";
    pub const UPSTREAM_RESPONSE_TIME: &str = "upstream_response_time";
    pub const VHOST: &str = "vhost";
    pub const USER_DEFINED: &str = "user_defined";
}

/// Typed value captured from a single log line.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Float(f64),
    Duration(Duration),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            FieldValue::Duration(d) => Some(*d),
            _ => None,
        }
    }

    /// Numeric view of the value. Durations are expressed in seconds so
    /// filter expressions can be written the way nginx logs them.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            FieldValue::Duration(d) => Some(d.as_secs_f64()),
            FieldValue::Str(_) => None,
        }
    }

    /// Textual view used by string matchers.
    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            FieldValue::Str(s) => Cow::Borrowed(s),
            FieldValue::Int(v) => Cow::Owned(v.to_string()),
            FieldValue::Float(v) => Cow::Owned(v.to_string()),
            FieldValue::Duration(d) => Cow::Owned(d.as_secs_f64().to_string()),
        }
    }
}

/// Field mapping produced for one line. Never retained past aggregation.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParsedFields {
    values: HashMap<String, FieldValue>,
}

impl ParsedFields {
    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_str)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(FieldValue::as_i64)
    }

    pub fn duration(&self, name: &str) -> Option<Duration> {
        self.get(name).and_then(FieldValue::as_duration)
    }
}
