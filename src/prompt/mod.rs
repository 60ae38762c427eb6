//! Outbound request assembly from independent, priority-ordered parts.

mod parts;
mod simple;
mod system;

use serde::{Deserialize, Serialize};

use crate::canvas::{Canvas, Diff};
use crate::geometry::BoxModel;
use crate::history::ChatHistoryItem;
use crate::request::Request;
use crate::sanitize::Sanitizer;
use crate::todo::TodoList;

pub use parts::{
    AgentViewportPart, ContextItemsPart, HistoryPart, PeripheralShapesPart, ScreenshotPart,
    SelectedShapesPart, TimePart, TodoListPart, UserEditsPart, UserMessagePart, UserViewportPart,
    ViewShapesPart,
};
pub use simple::simple_shape;
pub use system::system_instruction;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PromptContent {
    Text { text: String },
    /// Image as a data URL.
    Image { url: String },
}

impl PromptContent {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub system: String,
    pub content: Vec<PromptContent>,
}

impl Prompt {
    /// Text content only, joined by blank lines.
    #[must_use]
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                PromptContent::Text { text } => Some(text.as_str()),
                PromptContent::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Read-only view of everything a part may describe.
pub struct PromptInput<'a> {
    pub request: &'a Request,
    pub canvas: &'a dyn Canvas,
    pub history: &'a [ChatHistoryItem],
    pub todos: &'a TodoList,
    pub user_viewport: BoxModel,
    pub user_edits: &'a Diff,
    /// Wall-clock label supplied by the host, e.g. an RFC 3339 timestamp.
    pub time: Option<String>,
}

pub trait PromptPart: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lower goes earlier.
    fn priority(&self) -> i32;

    /// Content to contribute; empty when the part has nothing to say.
    /// Coordinates go through `sanitizer` so they are origin-relative and
    /// rounded.
    fn build(&self, input: &PromptInput<'_>, sanitizer: &mut Sanitizer) -> Vec<PromptContent>;
}

pub struct PromptBuilder {
    parts: Vec<Box<dyn PromptPart>>,
    base_instructions: Option<String>,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(default_parts())
    }
}

impl PromptBuilder {
    #[must_use]
    pub fn new(parts: Vec<Box<dyn PromptPart>>) -> Self {
        Self {
            parts,
            base_instructions: None,
        }
    }

    /// Replaces the built-in opening block of the system instruction.
    #[must_use]
    pub fn with_base_instructions(mut self, base: Option<String>) -> Self {
        self.base_instructions = base;
        self
    }

    pub fn push(&mut self, part: Box<dyn PromptPart>) {
        self.parts.push(part);
    }

    #[must_use]
    pub fn part_names(&self) -> Vec<&'static str> {
        self.ordered().map(|part| part.name()).collect()
    }

    pub fn build(&self, input: &PromptInput<'_>, sanitizer: &mut Sanitizer) -> Prompt {
        let content = self
            .ordered()
            .flat_map(|part| part.build(input, sanitizer))
            .collect();
        Prompt {
            system: system_instruction(self.base_instructions.as_deref()),
            content,
        }
    }

    fn ordered(&self) -> impl Iterator<Item = &dyn PromptPart> {
        let mut parts: Vec<&dyn PromptPart> = self.parts.iter().map(|part| part.as_ref()).collect();
        parts.sort_by_key(|part| part.priority());
        parts.into_iter()
    }
}

#[must_use]
pub fn default_parts() -> Vec<Box<dyn PromptPart>> {
    vec![
        Box::new(HistoryPart::default()),
        Box::new(TodoListPart),
        Box::new(ContextItemsPart),
        Box::new(PeripheralShapesPart),
        Box::new(ViewShapesPart),
        Box::new(SelectedShapesPart),
        Box::new(UserEditsPart),
        Box::new(UserViewportPart),
        Box::new(AgentViewportPart),
        Box::new(TimePart),
        Box::new(ScreenshotPart),
        Box::new(UserMessagePart),
    ]
}
