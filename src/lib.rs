//! Streaming action core for an agent that edits a vector canvas.
//!
//! Model output arrives as a growing, often truncated JSON document. The
//! [`stream`] decoder turns it into partial actions, the [`sanitize`] layer
//! normalizes them against live document state, [`action`] executors apply
//! them to a [`canvas::Canvas`], and [`placement`] keeps new content from
//! landing on top of old content. [`prompt`] assembles the outbound request.
//!
//! # Public API Overview
//! - Canvas boundary: [`Canvas`], [`MemoryCanvas`], [`Diff`], [`capture`].
//! - Decoding: [`repair_json`], [`extract_values`], [`ActionStreamer`].
//! - Execution: [`ExecutionContext`], [`Action`], [`AgentEffects`].
//! - Prompting: [`PromptBuilder`], [`PromptPart`].

#![allow(clippy::too_many_arguments, clippy::type_complexity)]

pub mod action;
pub mod canvas;
pub mod context;
pub mod geometry;
pub mod history;
pub mod placement;
pub mod prompt;
pub mod request;
pub mod sanitize;
pub mod shape;
pub mod stream;
pub mod text;
pub mod todo;

pub use crate::action::{
    Action, ActionFailure, ActionInfo, ActionKind, AgentEffects, ExecutionContext, RecordedEffects,
};
pub use crate::canvas::{capture, Canvas, CanvasError, CaptureOptions, Diff, MarkId, MemoryCanvas};
pub use crate::context::{ContextItem, ContextItems, ContextSource};
pub use crate::geometry::{BoxModel, Vec2};
pub use crate::history::{Acceptance, ChatHistoryItem};
pub use crate::placement::{Placement, PlacementConfig, PlacementSolver, PlacementStrategy};
pub use crate::prompt::{Prompt, PromptBuilder, PromptContent, PromptInput, PromptPart};
pub use crate::request::{Request, RequestSource, ScheduledRequest};
pub use crate::sanitize::Sanitizer;
pub use crate::shape::{Binding, BindingId, Shape, ShapeId, ShapeKind};
pub use crate::stream::{extract_values, repair_json, strip_wrappers, ActionStreamer, StreamingAction};
pub use crate::todo::{TodoItem, TodoList, TodoStatus};
