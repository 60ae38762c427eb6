//! Actions that talk to the user or steer the agent itself.

use serde_json::Value;

use super::fields;
use super::{ActionFailure, ActionIcon, ActionInfo, ActionKind, ExecutionContext, Executor};
use crate::geometry::BoxModel;
use crate::request::ScheduledRequest;
use crate::stream::StreamingAction;
use crate::todo::{TodoItem, TodoStatus};

const REVIEW_PROMPT: &str = "Examine the actions you just took. If the work is incomplete, continue. If something is wrong, correct it. If everything is already right, say nothing and stop.";
const ADD_DETAIL_PROMPT: &str = "Add more detail to what you just drew.";
const SET_VIEW_PROMPT: &str = "You moved your view. Look at what is in it now and carry on with the task.";

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub text: String,
}

impl Executor for Message {
    const KIND: ActionKind = ActionKind::Message;
    const SUMMARY: &'static str = "Send a message to the user.";
    const EXAMPLE: &'static str = r#"{"_type":"message","text":"I drew a house with a red roof."}"#;

    fn sanitize(raw: &StreamingAction, _cx: &mut ExecutionContext<'_>) -> Result<Self, ActionFailure> {
        Ok(Self {
            text: fields::require_string(&raw.fields, "text")?,
        })
    }

    fn info(&self) -> ActionInfo {
        ActionInfo::new(ActionIcon::Message, self.text.clone())
    }

    fn apply(&self, _cx: &mut ExecutionContext<'_>) -> Result<(), ActionFailure> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Think {
    pub text: String,
}

impl Executor for Think {
    const KIND: ActionKind = ActionKind::Think;
    const SUMMARY: &'static str = "Think out loud before acting. The user sees a summary only.";
    const EXAMPLE: &'static str = r#"{"_type":"think","text":"The roof should sit on top of the walls, so I will place it above them."}"#;

    fn sanitize(raw: &StreamingAction, _cx: &mut ExecutionContext<'_>) -> Result<Self, ActionFailure> {
        Ok(Self {
            text: fields::require_string(&raw.fields, "text")?,
        })
    }

    fn info(&self) -> ActionInfo {
        ActionInfo::new(ActionIcon::Brain, self.text.clone())
    }

    fn apply(&self, _cx: &mut ExecutionContext<'_>) -> Result<(), ActionFailure> {
        Ok(())
    }
}

/// Asks for a follow-up turn in which the agent checks its own work.
#[derive(Debug, Clone, PartialEq)]
pub struct Review {
    pub intent: Option<String>,
    /// Area to look at, page space; the current view when absent.
    pub bounds: Option<BoxModel>,
}

impl Executor for Review {
    const KIND: ActionKind = ActionKind::Review;
    const SAVES_TO_HISTORY: bool = false;
    const SUMMARY: &'static str = "Schedule a follow-up turn to review your work in an area (x, y, w, h) before finishing.";
    const EXAMPLE: &'static str = r#"{"_type":"review","intent":"Check the diagram labels","x":0,"y":0,"w":600,"h":400}"#;

    fn sanitize(raw: &StreamingAction, cx: &mut ExecutionContext<'_>) -> Result<Self, ActionFailure> {
        let fields = &raw.fields;
        let bounds = if fields.contains_key("x") {
            Some(fields::page_box(fields, cx)?)
        } else {
            None
        };
        Ok(Self {
            intent: fields::intent(fields),
            bounds,
        })
    }

    fn info(&self) -> ActionInfo {
        ActionInfo::new(
            ActionIcon::Search,
            fields::describe(&self.intent, || "Reviewing".to_string()),
        )
    }

    fn apply(&self, cx: &mut ExecutionContext<'_>) -> Result<(), ActionFailure> {
        let message = match &self.intent {
            Some(intent) => format!("{REVIEW_PROMPT}\nFocus: {intent}"),
            None => REVIEW_PROMPT.to_string(),
        };
        let mut request = ScheduledRequest::message(message);
        request.bounds = self.bounds;
        cx.effects.schedule_request(request);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddDetail {
    pub intent: Option<String>,
}

impl Executor for AddDetail {
    const KIND: ActionKind = ActionKind::AddDetail;
    const SAVES_TO_HISTORY: bool = false;
    const SUMMARY: &'static str = "Schedule a follow-up turn to add detail to your work.";
    const EXAMPLE: &'static str = r#"{"_type":"add-detail","intent":"Add windows and a door to the house"}"#;

    fn sanitize(raw: &StreamingAction, _cx: &mut ExecutionContext<'_>) -> Result<Self, ActionFailure> {
        Ok(Self {
            intent: fields::intent(&raw.fields),
        })
    }

    fn info(&self) -> ActionInfo {
        ActionInfo::new(
            ActionIcon::Pencil,
            fields::describe(&self.intent, || "Adding detail".to_string()),
        )
    }

    fn apply(&self, cx: &mut ExecutionContext<'_>) -> Result<(), ActionFailure> {
        let message = match &self.intent {
            Some(intent) => format!("{ADD_DETAIL_PROMPT}\n{intent}"),
            None => ADD_DETAIL_PROMPT.to_string(),
        };
        cx.effects.schedule_request(ScheduledRequest::message(message));
        Ok(())
    }
}

/// Creates or updates one todo item.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateTodoList {
    pub id: Option<u32>,
    pub status: TodoStatus,
    pub text: String,
}

impl Executor for UpdateTodoList {
    const KIND: ActionKind = ActionKind::UpdateTodoList;
    const SUMMARY: &'static str = "Add a todo item, or change the status (todo, in-progress, done) of an existing one by id.";
    const EXAMPLE: &'static str = r#"{"_type":"update-todo-list","id":0,"status":"in-progress","text":"Draw the roof"}"#;

    fn sanitize(raw: &StreamingAction, _cx: &mut ExecutionContext<'_>) -> Result<Self, ActionFailure> {
        let fields = &raw.fields;
        let id = fields::number(fields, "id")
            .filter(|id| *id >= 0.0 && id.fract() == 0.0 && *id <= f64::from(u32::MAX))
            .map(|id| id as u32);
        let status = match fields.get("status") {
            None | Some(Value::Null) => TodoStatus::Todo,
            Some(value) => value
                .as_str()
                .and_then(TodoStatus::parse)
                .ok_or_else(|| ActionFailure::invalid("unknown todo `status`"))?,
        };
        Ok(Self {
            id,
            status,
            text: fields::require_string(fields, "text")?,
        })
    }

    fn info(&self) -> ActionInfo {
        ActionInfo::new(
            ActionIcon::Note,
            format!("{} ({})", self.text, self.status.as_str()),
        )
    }

    fn apply(&self, cx: &mut ExecutionContext<'_>) -> Result<(), ActionFailure> {
        let id = self.id.unwrap_or_else(|| cx.effects.next_todo_id());
        cx.effects.upsert_todo(TodoItem {
            id,
            status: self.status,
            text: self.text.clone(),
        });
        Ok(())
    }
}

/// Moves the agent viewport and asks for a turn that sees the new view.
#[derive(Debug, Clone, PartialEq)]
pub struct SetMyView {
    pub intent: Option<String>,
    pub bounds: BoxModel,
}

impl Executor for SetMyView {
    const KIND: ActionKind = ActionKind::SetMyView;
    const SUMMARY: &'static str = "Move your view to the area x, y, w, h. You get a follow-up turn that sees it.";
    const EXAMPLE: &'static str = r#"{"_type":"set-my-view","intent":"Look at the right side","x":800,"y":0,"w":1000,"h":600}"#;

    fn sanitize(raw: &StreamingAction, cx: &mut ExecutionContext<'_>) -> Result<Self, ActionFailure> {
        let fields = &raw.fields;
        let bounds = fields::page_box(fields, cx)?;
        if bounds.w <= 0.0 || bounds.h <= 0.0 {
            return Err(ActionFailure::invalid("view must have a positive size"));
        }
        Ok(Self {
            intent: fields::intent(fields),
            bounds,
        })
    }

    fn info(&self) -> ActionInfo {
        ActionInfo::new(
            ActionIcon::Eye,
            fields::describe(&self.intent, || "Changed view".to_string()),
        )
    }

    fn apply(&self, cx: &mut ExecutionContext<'_>) -> Result<(), ActionFailure> {
        cx.effects.set_agent_viewport(self.bounds);
        cx.effects
            .schedule_request(ScheduledRequest::message(SET_VIEW_PROMPT).with_bounds(self.bounds));
        Ok(())
    }
}
