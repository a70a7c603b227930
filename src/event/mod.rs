use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// An event shared read-only between every destination it is routed to.
pub type SharedEvent = Arc<Event>;

/// A single telemetry record.
///
/// The timestamp is assigned when the beacon is received, never when the
/// event is persisted. Events are not mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub created_at: DateTime<Utc>,

    /// Event category; empty means unnamed
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    String(String),
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(b) => write!(f, "{}", b),
            AttributeValue::Int(i) => write!(f, "{}", i),
            AttributeValue::String(s) => f.write_str(s),
        }
    }
}

impl Event {
    pub fn new(name: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            created_at,
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style attribute setter, used while the event is being assembled
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    /// Remote address recorded by the ingestion boundary, if any
    pub fn remote_ip(&self) -> Option<&str> {
        match self.attributes.get(REMOTE_IP) {
            Some(AttributeValue::String(ip)) => Some(ip.as_str()),
            _ => None,
        }
    }

    pub fn is_unnamed(&self) -> bool {
        self.name.is_empty()
    }

    pub fn into_shared(self) -> SharedEvent {
        Arc::new(self)
    }
}

/// Attribute key holding the forwarded-for address of the sender
pub const REMOTE_IP: &str = "remote_ip";
