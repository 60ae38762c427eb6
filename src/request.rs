use serde::{Deserialize, Serialize};

use crate::context::{ContextItem, ContextItems};
use crate::geometry::BoxModel;
use crate::shape::ShapeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestSource {
    #[default]
    User,
    /// Follow-up the agent queued for itself.
    Agent,
}

/// Immutable snapshot handed to the prompt builder for one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub messages: Vec<String>,
    pub context_items: ContextItems,
    pub selected_shapes: Vec<ShapeId>,
    /// Agent viewport in page space.
    pub bounds: BoxModel,
    pub model: String,
    pub source: RequestSource,
    /// Screenshot of the agent viewport as a data URL, when the host has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Request {
    #[must_use]
    pub fn new(message: impl Into<String>, bounds: BoxModel, model: impl Into<String>) -> Self {
        Self {
            messages: vec![message.into()],
            context_items: ContextItems::new(),
            selected_shapes: Vec::new(),
            bounds,
            model: model.into(),
            source: RequestSource::User,
            image: None,
        }
    }

    #[must_use]
    pub fn with_context(mut self, items: impl IntoIterator<Item = ContextItem>) -> Self {
        self.context_items.extend(items);
        self
    }

    #[must_use]
    pub fn with_selection(mut self, selected: Vec<ShapeId>) -> Self {
        self.selected_shapes = selected;
        self
    }

    #[must_use]
    pub fn message(&self) -> String {
        self.messages.join("\n")
    }
}

/// A follow-up turn queued to run right after the current one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduledRequest {
    pub messages: Vec<String>,
    pub context_items: ContextItems,
    /// Overrides the agent viewport for the follow-up.
    pub bounds: Option<BoxModel>,
}

impl ScheduledRequest {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            messages: vec![message.into()],
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_bounds(mut self, bounds: BoxModel) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Folds `other` into this request instead of queueing a second one.
    pub fn merge(&mut self, other: ScheduledRequest) {
        for message in other.messages {
            if !self.messages.contains(&message) {
                self.messages.push(message);
            }
        }
        self.context_items.extend(other.context_items.items().iter().cloned());
        if other.bounds.is_some() {
            self.bounds = other.bounds;
        }
    }

    #[must_use]
    pub fn into_request(self, default_bounds: BoxModel, model: impl Into<String>) -> Request {
        Request {
            messages: self.messages,
            context_items: self.context_items,
            selected_shapes: Vec::new(),
            bounds: self.bounds.unwrap_or(default_bounds),
            model: model.into(),
            source: RequestSource::Agent,
            image: None,
        }
    }
}
