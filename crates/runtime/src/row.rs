//! Row - the unit of data moving through a data-flow chain

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use serde_json::Value;

/// A single record, or the end-of-stream sentinel.
///
/// A terminator row carries no payload. Exactly one terminator is sent per
/// output stream, as the final send of the producing worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    id: String,
    #[serde(default)]
    payload: BTreeMap<String, Value>,
    #[serde(default)]
    is_terminator: bool,
}

impl Row {
    /// Create an empty data row with a fresh id
    pub fn new() -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string())
    }

    /// Create an empty data row with an explicit id
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            payload: BTreeMap::new(),
            is_terminator: false,
        }
    }

    /// Create the end-of-stream sentinel
    pub fn terminator() -> Self {
        Self {
            id: "terminator".to_string(),
            payload: BTreeMap::new(),
            is_terminator: true,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_terminator(&self) -> bool {
        self.is_terminator
    }

    /// Set a column value, returning the row for chaining
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.payload.insert(column.into(), value.into());
        self
    }

    /// Builder-style variant of [`Row::set`]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.payload.get(column)
    }

    pub fn payload(&self) -> &BTreeMap<String, Value> {
        &self.payload
    }

    /// Replace the payload, keeping the row id
    pub fn replace_payload(&mut self, payload: BTreeMap<String, Value>) {
        self.payload = payload;
    }
}

impl Default for Row {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a value the way it appears in text outputs (no quotes around strings)
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
