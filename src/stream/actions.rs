use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::repair::repair_json;

/// One (possibly partial) action as it arrives from the model.
///
/// Wire shape: the action object itself extended with `complete` and `time`
/// (milliseconds since the stream started).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingAction {
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub complete: bool,
    #[serde(rename = "time", default)]
    pub elapsed_ms: u64,
}

impl StreamingAction {
    #[must_use]
    pub fn new(fields: Map<String, Value>, complete: bool, elapsed_ms: u64) -> Self {
        Self {
            fields,
            complete,
            elapsed_ms,
        }
    }

    /// Reads a frame; `None` unless it is an object with a string `_type`.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        let action: Self = serde_json::from_value(value).ok()?;
        action.kind()?;
        Some(action)
    }

    #[must_use]
    pub fn kind(&self) -> Option<&str> {
        self.fields.get("_type").and_then(Value::as_str)
    }

    #[must_use]
    pub fn intent(&self) -> Option<&str> {
        self.fields.get("intent").and_then(Value::as_str)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// Accumulates raw model text shaped like `{"actions": [...]}` and yields
/// each action as it grows.
///
/// Every action but the last in the repaired document is complete. The last
/// one stays incomplete until [`ActionStreamer::finish`].
#[derive(Debug)]
pub struct ActionStreamer {
    buffer: String,
    completed: usize,
    last_partial: Option<Map<String, Value>>,
    started: Instant,
}

impl Default for ActionStreamer {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionStreamer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            completed: 0,
            last_partial: None,
            started: Instant::now(),
        }
    }

    #[must_use]
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn push(&mut self, chunk: &str) -> Vec<StreamingAction> {
        self.buffer.push_str(chunk);
        self.drain(false)
    }

    /// Flushes the trailing action as complete.
    pub fn finish(&mut self) -> Vec<StreamingAction> {
        self.drain(true)
    }

    fn drain(&mut self, finished: bool) -> Vec<StreamingAction> {
        let Some(document) = repair_json(&self.buffer) else {
            return Vec::new();
        };
        let actions = actions_of(document);
        let elapsed_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let settled = if finished {
            actions.len()
        } else {
            actions.len().saturating_sub(1)
        };

        let mut out = Vec::new();
        while self.completed < settled {
            if let Some(fields) = actions.get(self.completed).and_then(as_action) {
                out.push(StreamingAction::new(fields, true, elapsed_ms));
            }
            self.completed += 1;
            self.last_partial = None;
        }

        if !finished && actions.len() > self.completed {
            if let Some(fields) = actions.last().and_then(as_action) {
                if self.last_partial.as_ref() != Some(&fields) {
                    self.last_partial = Some(fields.clone());
                    out.push(StreamingAction::new(fields, false, elapsed_ms));
                }
            }
        }

        out
    }
}

fn actions_of(document: Value) -> Vec<Value> {
    match document {
        Value::Object(mut root) => match root.remove("actions") {
            Some(Value::Array(actions)) => actions,
            _ => Vec::new(),
        },
        Value::Array(actions) => actions,
        _ => Vec::new(),
    }
}

fn as_action(value: &Value) -> Option<Map<String, Value>> {
    let fields = value.as_object()?;
    fields.get("_type")?.as_str()?;
    Some(fields.clone())
}
