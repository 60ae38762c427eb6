use serde::{Deserialize, Serialize};

use crate::action::ActionInfo;
use crate::canvas::Diff;
use crate::context::ContextItem;
use crate::shape::ShapeId;
use crate::stream::StreamingAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Acceptance {
    #[default]
    Pending,
    Accepted,
    Rejected,
}

/// Append-only chat record. Action items keep the diff they produced so a
/// rejection can reverse it later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ChatHistoryItem {
    Prompt {
        message: String,
        #[serde(default)]
        context_items: Vec<ContextItem>,
        #[serde(default)]
        selected_shapes: Vec<ShapeId>,
    },
    Action {
        action: StreamingAction,
        info: ActionInfo,
        #[serde(default)]
        diff: Diff,
        #[serde(default)]
        acceptance: Acceptance,
    },
    Continuation {
        message: String,
    },
}

impl ChatHistoryItem {
    #[must_use]
    pub fn prompt(message: impl Into<String>) -> Self {
        Self::Prompt {
            message: message.into(),
            context_items: Vec::new(),
            selected_shapes: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_action(&self) -> bool {
        matches!(self, Self::Action { .. })
    }
}
