use std::collections::BTreeMap;

use serde_json::{json, Value};

use super::{simple_shape, PromptContent, PromptInput, PromptPart};
use crate::context::ContextItem;
use crate::geometry::BoxModel;
use crate::history::ChatHistoryItem;
use crate::request::RequestSource;
use crate::sanitize::Sanitizer;
use crate::shape::Shape;

fn rounded_box(bounds: &BoxModel, sanitizer: &Sanitizer) -> Value {
    let relative = sanitizer.apply_offset(bounds);
    json!({
        "x": relative.x.round(),
        "y": relative.y.round(),
        "w": relative.w.round(),
        "h": relative.h.round(),
    })
}

fn json_block(label: &str, value: &Value) -> PromptContent {
    PromptContent::text(format!("{label}\n{value}"))
}

/// Past prompts and actions, oldest first.
pub struct HistoryPart {
    pub limit: usize,
}

impl Default for HistoryPart {
    fn default() -> Self {
        Self { limit: 60 }
    }
}

impl PromptPart for HistoryPart {
    fn name(&self) -> &'static str {
        "history"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn build(&self, input: &PromptInput<'_>, _sanitizer: &mut Sanitizer) -> Vec<PromptContent> {
        let skip = input.history.len().saturating_sub(self.limit);
        let lines: Vec<String> = input
            .history
            .iter()
            .skip(skip)
            .map(|item| match item {
                ChatHistoryItem::Prompt { message, .. } => format!("User: {message}"),
                ChatHistoryItem::Action { action, .. } => {
                    let value = Value::Object(action.fields.clone());
                    format!("You: {value}")
                }
                ChatHistoryItem::Continuation { message } => format!("Follow-up: {message}"),
            })
            .collect();
        if lines.is_empty() {
            return Vec::new();
        }
        vec![PromptContent::text(format!(
            "Conversation so far:\n{}",
            lines.join("\n")
        ))]
    }
}

pub struct TodoListPart;

impl PromptPart for TodoListPart {
    fn name(&self) -> &'static str {
        "todo-list"
    }

    fn priority(&self) -> i32 {
        20
    }

    fn build(&self, input: &PromptInput<'_>, _sanitizer: &mut Sanitizer) -> Vec<PromptContent> {
        if input.todos.is_empty() {
            return Vec::new();
        }
        let lines: Vec<String> = input
            .todos
            .items()
            .iter()
            .map(|item| format!("[{}] ({}) {}", item.id, item.status.as_str(), item.text))
            .collect();
        vec![PromptContent::text(format!("Your todo list:\n{}", lines.join("\n")))]
    }
}

pub struct ContextItemsPart;

impl PromptPart for ContextItemsPart {
    fn name(&self) -> &'static str {
        "context-items"
    }

    fn priority(&self) -> i32 {
        30
    }

    fn build(&self, input: &PromptInput<'_>, sanitizer: &mut Sanitizer) -> Vec<PromptContent> {
        let mut out = Vec::new();
        for item in input.request.context_items.items() {
            let who = match item.source() {
                crate::context::ContextSource::User => "The user",
                crate::context::ContextSource::Agent => "You",
            };
            match item {
                ContextItem::Shape { shape_id, .. } => {
                    if let Some(shape) = input.canvas.shape(shape_id) {
                        let value = simple_shape(shape, input.canvas, sanitizer);
                        out.push(json_block(&format!("{who} pointed at this shape:"), &value));
                    }
                }
                ContextItem::Shapes { shape_ids, .. } => {
                    let values: Vec<Value> = shape_ids
                        .iter()
                        .filter_map(|id| input.canvas.shape(id))
                        .map(|shape| simple_shape(shape, input.canvas, sanitizer))
                        .collect();
                    if !values.is_empty() {
                        out.push(json_block(
                            &format!("{who} pointed at these shapes:"),
                            &Value::Array(values),
                        ));
                    }
                }
                ContextItem::Area { bounds, .. } => {
                    out.push(json_block(
                        &format!("{who} pointed at this area:"),
                        &rounded_box(bounds, sanitizer),
                    ));
                }
                ContextItem::Point { point, .. } => {
                    let relative = sanitizer.apply_offset(point);
                    out.push(json_block(
                        &format!("{who} pointed at this point:"),
                        &json!({"x": relative.x.round(), "y": relative.y.round()}),
                    ));
                }
            }
        }
        out
    }
}

/// Coarse clusters of shapes outside the agent view, one per view-sized
/// grid cell.
pub struct PeripheralShapesPart;

impl PromptPart for PeripheralShapesPart {
    fn name(&self) -> &'static str {
        "peripheral-shapes"
    }

    fn priority(&self) -> i32 {
        40
    }

    fn build(&self, input: &PromptInput<'_>, sanitizer: &mut Sanitizer) -> Vec<PromptContent> {
        let view = input.request.bounds;
        if view.w <= 0.0 || view.h <= 0.0 {
            return Vec::new();
        }

        let mut cells: BTreeMap<(i64, i64), (BoxModel, usize)> = BTreeMap::new();
        for shape in input.canvas.page_shapes() {
            let bounds = shape.bounds();
            if bounds.intersects(&view) || view.contains(&bounds) {
                continue;
            }
            let center = bounds.center();
            let cell = (
                ((center.x - view.x) / view.w).floor() as i64,
                ((center.y - view.y) / view.h).floor() as i64,
            );
            cells
                .entry(cell)
                .and_modify(|(area, count)| {
                    *area = area.union(bounds);
                    *count += 1;
                })
                .or_insert((bounds, 1));
        }
        if cells.is_empty() {
            return Vec::new();
        }

        let clusters: Vec<Value> = cells
            .values()
            .map(|(area, count)| {
                let mut value = rounded_box(area, sanitizer);
                value["count"] = json!(count);
                value
            })
            .collect();
        vec![json_block(
            "Groups of shapes outside your view:",
            &Value::Array(clusters),
        )]
    }
}

pub struct ViewShapesPart;

impl PromptPart for ViewShapesPart {
    fn name(&self) -> &'static str {
        "view-shapes"
    }

    fn priority(&self) -> i32 {
        50
    }

    fn build(&self, input: &PromptInput<'_>, sanitizer: &mut Sanitizer) -> Vec<PromptContent> {
        let shapes: Vec<&Shape> = input.canvas.shapes_in(&input.request.bounds);
        if shapes.is_empty() {
            return vec![PromptContent::text("There are no shapes in your view.")];
        }
        let values: Vec<Value> = shapes
            .into_iter()
            .map(|shape| simple_shape(shape, input.canvas, sanitizer))
            .collect();
        vec![json_block(
            "Shapes in your view, back to front:",
            &Value::Array(values),
        )]
    }
}

pub struct SelectedShapesPart;

impl PromptPart for SelectedShapesPart {
    fn name(&self) -> &'static str {
        "selected-shapes"
    }

    fn priority(&self) -> i32 {
        55
    }

    fn build(&self, input: &PromptInput<'_>, _sanitizer: &mut Sanitizer) -> Vec<PromptContent> {
        let ids: Vec<&str> = input
            .request
            .selected_shapes
            .iter()
            .filter(|id| input.canvas.has_shape(id))
            .map(|id| id.simple())
            .collect();
        if ids.is_empty() {
            return Vec::new();
        }
        vec![PromptContent::text(format!(
            "The user has selected: {}",
            ids.join(", ")
        ))]
    }
}

/// What the user changed on the canvas since the agent last looked.
pub struct UserEditsPart;

impl PromptPart for UserEditsPart {
    fn name(&self) -> &'static str {
        "user-edits"
    }

    fn priority(&self) -> i32 {
        60
    }

    fn build(&self, input: &PromptInput<'_>, _sanitizer: &mut Sanitizer) -> Vec<PromptContent> {
        let lines: Vec<String> = input
            .user_edits
            .shapes
            .iter()
            .map(|(id, change)| {
                let verb = match (&change.before, &change.after) {
                    (None, Some(_)) => "created",
                    (Some(_), None) => "deleted",
                    _ => "changed",
                };
                format!("- {verb} {}", id.simple())
            })
            .collect();
        if lines.is_empty() {
            return Vec::new();
        }
        vec![PromptContent::text(format!(
            "Since your last turn the user:\n{}",
            lines.join("\n")
        ))]
    }
}

pub struct UserViewportPart;

impl PromptPart for UserViewportPart {
    fn name(&self) -> &'static str {
        "user-viewport"
    }

    fn priority(&self) -> i32 {
        70
    }

    fn build(&self, input: &PromptInput<'_>, sanitizer: &mut Sanitizer) -> Vec<PromptContent> {
        vec![json_block(
            "The user's view:",
            &rounded_box(&input.user_viewport, sanitizer),
        )]
    }
}

pub struct AgentViewportPart;

impl PromptPart for AgentViewportPart {
    fn name(&self) -> &'static str {
        "agent-viewport"
    }

    fn priority(&self) -> i32 {
        75
    }

    fn build(&self, input: &PromptInput<'_>, sanitizer: &mut Sanitizer) -> Vec<PromptContent> {
        vec![json_block(
            "Your view:",
            &rounded_box(&input.request.bounds, sanitizer),
        )]
    }
}

pub struct TimePart;

impl PromptPart for TimePart {
    fn name(&self) -> &'static str {
        "time"
    }

    fn priority(&self) -> i32 {
        80
    }

    fn build(&self, input: &PromptInput<'_>, _sanitizer: &mut Sanitizer) -> Vec<PromptContent> {
        input
            .time
            .as_ref()
            .map(|time| PromptContent::text(format!("Current time: {time}")))
            .into_iter()
            .collect()
    }
}

pub struct ScreenshotPart;

impl PromptPart for ScreenshotPart {
    fn name(&self) -> &'static str {
        "screenshot"
    }

    fn priority(&self) -> i32 {
        85
    }

    fn build(&self, input: &PromptInput<'_>, _sanitizer: &mut Sanitizer) -> Vec<PromptContent> {
        input
            .request
            .image
            .as_ref()
            .map(|url| PromptContent::Image { url: url.clone() })
            .into_iter()
            .collect()
    }
}

pub struct UserMessagePart;

impl PromptPart for UserMessagePart {
    fn name(&self) -> &'static str {
        "user-message"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn build(&self, input: &PromptInput<'_>, _sanitizer: &mut Sanitizer) -> Vec<PromptContent> {
        let message = input.request.message();
        if message.trim().is_empty() {
            return Vec::new();
        }
        let text = match input.request.source {
            RequestSource::User => format!("User message: {message}"),
            RequestSource::Agent => format!("Follow-up you scheduled: {message}"),
        };
        vec![PromptContent::text(text)]
    }
}
