//! Typed actions, their executors and the discriminator lookup table.
//!
//! Every action kind goes through the same three steps: `sanitize` turns a
//! raw (possibly partial) frame into a typed value with resolved ids and
//! page-space coordinates, `apply` mutates the canvas or the agent state,
//! and `info` describes the result for the chat history. Failures are
//! values so one bad action never aborts its siblings.

mod agent;
mod arrange;
mod create;
mod edit;
mod fields;
mod registry;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::canvas::{Canvas, CanvasError};
use crate::geometry::BoxModel;
use crate::placement::PlacementSolver;
use crate::request::ScheduledRequest;
use crate::sanitize::Sanitizer;
use crate::stream::StreamingAction;
use crate::todo::TodoItem;

pub use agent::{AddDetail, Message, Review, SetMyView, Think, UpdateTodoList};
pub use arrange::{
    Align, AlignEdge, BringToFront, Distribute, Place, PlaceAlign, PlaceSide, SendToBack, Stack,
    StackDirection,
};
pub use create::{Create, Pen};
pub use edit::{Clear, Delete, Label, Move, Resize, Rotate, Update};
pub use registry::{definition, definitions, ActionDefinition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    Message,
    Think,
    Review,
    AddDetail,
    UpdateTodoList,
    SetMyView,
    Create,
    Update,
    Label,
    Delete,
    Move,
    Resize,
    Rotate,
    Pen,
    Align,
    Distribute,
    Stack,
    Place,
    BringToFront,
    SendToBack,
    Clear,
}

impl ActionKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Think => "think",
            Self::Review => "review",
            Self::AddDetail => "add-detail",
            Self::UpdateTodoList => "update-todo-list",
            Self::SetMyView => "set-my-view",
            Self::Create => "create",
            Self::Update => "update",
            Self::Label => "label",
            Self::Delete => "delete",
            Self::Move => "move",
            Self::Resize => "resize",
            Self::Rotate => "rotate",
            Self::Pen => "pen",
            Self::Align => "align",
            Self::Distribute => "distribute",
            Self::Stack => "stack",
            Self::Place => "place",
            Self::BringToFront => "bring-to-front",
            Self::SendToBack => "send-to-back",
            Self::Clear => "clear",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionIcon {
    Message,
    Brain,
    Search,
    Note,
    Eye,
    Pencil,
    Cursor,
    Trash,
    Resize,
    Rotate,
    Align,
    Layers,
    Eraser,
}

/// History-display hint for one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionInfo {
    pub icon: ActionIcon,
    pub description: String,
}

impl ActionInfo {
    #[must_use]
    pub fn new(icon: ActionIcon, description: impl Into<String>) -> Self {
        Self {
            icon,
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionFailure {
    #[error("missing or unknown action type `{0}`")]
    UnknownKind(String),
    #[error("shape not found: {0}")]
    ShapeNotFound(String),
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("insufficient shapes: need at least {needed}, got {got}")]
    InsufficientShapes { needed: usize, got: usize },
    #[error(transparent)]
    Canvas(#[from] CanvasError),
}

impl ActionFailure {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidParameters(reason.into())
    }
}

/// Agent state an action may touch besides the canvas.
pub trait AgentEffects {
    /// Queues a follow-up, merging into one already queued.
    fn schedule_request(&mut self, request: ScheduledRequest);

    fn upsert_todo(&mut self, item: TodoItem);

    fn next_todo_id(&self) -> u32;

    fn agent_viewport(&self) -> BoxModel;

    fn set_agent_viewport(&mut self, bounds: BoxModel);
}

/// Everything an executor may read or mutate while handling one action.
pub struct ExecutionContext<'a> {
    pub canvas: &'a mut dyn Canvas,
    pub sanitizer: &'a mut Sanitizer,
    pub solver: &'a mut PlacementSolver,
    pub effects: &'a mut dyn AgentEffects,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        canvas: &'a mut dyn Canvas,
        sanitizer: &'a mut Sanitizer,
        solver: &'a mut PlacementSolver,
        effects: &'a mut dyn AgentEffects,
    ) -> Self {
        Self {
            canvas,
            sanitizer,
            solver,
            effects,
        }
    }

    /// Sanitizes `raw` and applies it. Incomplete frames are applied only
    /// for kinds that support a speculative preview.
    pub fn execute(&mut self, raw: &StreamingAction) -> Result<Option<Action>, ActionFailure> {
        let kind = raw.kind().unwrap_or_default();
        let definition =
            definition(kind).ok_or_else(|| ActionFailure::UnknownKind(kind.to_string()))?;
        if !raw.complete && !definition.previews {
            return Ok(None);
        }

        let action = (definition.sanitize)(raw, self)?;
        action.apply(self)?;
        Ok(Some(action))
    }
}

/// Closed set of sanitized actions.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Message(Message),
    Think(Think),
    Review(Review),
    AddDetail(AddDetail),
    UpdateTodoList(UpdateTodoList),
    SetMyView(SetMyView),
    Create(Create),
    Update(Update),
    Label(Label),
    Delete(Delete),
    Move(Move),
    Resize(Resize),
    Rotate(Rotate),
    Pen(Pen),
    Align(Align),
    Distribute(Distribute),
    Stack(Stack),
    Place(Place),
    BringToFront(BringToFront),
    SendToBack(SendToBack),
    Clear(Clear),
}

/// Behavior shared by every typed action.
pub trait Executor: Sized + Into<Action> {
    const KIND: ActionKind;
    const SAVES_TO_HISTORY: bool = true;
    const PREVIEWS: bool = false;
    /// One-line description for the system instruction.
    const SUMMARY: &'static str;
    /// Example frame for the system instruction.
    const EXAMPLE: &'static str;

    fn sanitize(raw: &StreamingAction, cx: &mut ExecutionContext<'_>) -> Result<Self, ActionFailure>;

    fn info(&self) -> ActionInfo;

    fn apply(&self, cx: &mut ExecutionContext<'_>) -> Result<(), ActionFailure>;
}

macro_rules! each_action {
    ($action:expr, $inner:ident => $body:expr) => {
        match $action {
            Action::Message($inner) => $body,
            Action::Think($inner) => $body,
            Action::Review($inner) => $body,
            Action::AddDetail($inner) => $body,
            Action::UpdateTodoList($inner) => $body,
            Action::SetMyView($inner) => $body,
            Action::Create($inner) => $body,
            Action::Update($inner) => $body,
            Action::Label($inner) => $body,
            Action::Delete($inner) => $body,
            Action::Move($inner) => $body,
            Action::Resize($inner) => $body,
            Action::Rotate($inner) => $body,
            Action::Pen($inner) => $body,
            Action::Align($inner) => $body,
            Action::Distribute($inner) => $body,
            Action::Stack($inner) => $body,
            Action::Place($inner) => $body,
            Action::BringToFront($inner) => $body,
            Action::SendToBack($inner) => $body,
            Action::Clear($inner) => $body,
        }
    };
}

macro_rules! impl_from_action {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Action {
                fn from(value: $variant) -> Self {
                    Action::$variant(value)
                }
            }
        )*
    };
}

impl_from_action!(
    Message,
    Think,
    Review,
    AddDetail,
    UpdateTodoList,
    SetMyView,
    Create,
    Update,
    Label,
    Delete,
    Move,
    Resize,
    Rotate,
    Pen,
    Align,
    Distribute,
    Stack,
    Place,
    BringToFront,
    SendToBack,
    Clear,
);

fn kind_of<E: Executor>(_: &E) -> ActionKind {
    E::KIND
}

fn saves_of<E: Executor>(_: &E) -> bool {
    E::SAVES_TO_HISTORY
}

impl Action {
    #[must_use]
    pub fn kind(&self) -> ActionKind {
        each_action!(self, inner => kind_of(inner))
    }

    #[must_use]
    pub fn info(&self) -> ActionInfo {
        each_action!(self, inner => inner.info())
    }

    #[must_use]
    pub fn saves_to_history(&self) -> bool {
        each_action!(self, inner => saves_of(inner))
    }

    pub fn apply(&self, cx: &mut ExecutionContext<'_>) -> Result<(), ActionFailure> {
        each_action!(self, inner => inner.apply(cx))
    }
}

/// [`AgentEffects`] that only records what was asked of it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordedEffects {
    pub scheduled: Option<ScheduledRequest>,
    pub todos: Vec<TodoItem>,
    pub viewport: BoxModel,
}

impl RecordedEffects {
    #[must_use]
    pub fn with_viewport(viewport: BoxModel) -> Self {
        Self {
            viewport,
            ..Self::default()
        }
    }
}

impl AgentEffects for RecordedEffects {
    fn schedule_request(&mut self, request: ScheduledRequest) {
        match self.scheduled.as_mut() {
            Some(existing) => existing.merge(request),
            None => self.scheduled = Some(request),
        }
    }

    fn upsert_todo(&mut self, item: TodoItem) {
        match self.todos.iter_mut().find(|existing| existing.id == item.id) {
            Some(existing) => *existing = item,
            None => self.todos.push(item),
        }
    }

    fn next_todo_id(&self) -> u32 {
        self.todos.iter().map(|item| item.id).max().map_or(0, |id| id + 1)
    }

    fn agent_viewport(&self) -> BoxModel {
        self.viewport
    }

    fn set_agent_viewport(&mut self, bounds: BoxModel) {
        self.viewport = bounds;
    }
}
