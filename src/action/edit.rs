use serde_json::Value;

use super::fields;
use super::{ActionFailure, ActionIcon, ActionInfo, ActionKind, ExecutionContext, Executor};
use crate::geometry::{BoxModel, Vec2};
use crate::shape::{Align, Color, Fill, GeoKind, ShapeId, ShapeKind, Size};
use crate::stream::StreamingAction;

/// Restyle or retext an existing shape. Absent fields stay untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub intent: Option<String>,
    pub id: ShapeId,
    pub color: Option<Color>,
    pub fill: Option<Fill>,
    pub size: Option<Size>,
    pub align: Option<Align>,
    pub geo: Option<GeoKind>,
    pub text: Option<String>,
    pub note: Option<String>,
    pub w: Option<f64>,
    pub h: Option<f64>,
}

impl Executor for Update {
    const KIND: ActionKind = ActionKind::Update;
    const PREVIEWS: bool = true;
    const SUMMARY: &'static str = "Change the style, text, note or size of an existing shape.";
    const EXAMPLE: &'static str = r#"{"_type":"update","intent":"Make the sun orange","shapeId":"sun","color":"orange"}"#;

    fn sanitize(raw: &StreamingAction, cx: &mut ExecutionContext<'_>) -> Result<Self, ActionFailure> {
        let fields = &raw.fields;
        let id = fields::resolve_key(fields, cx, "shapeId")?;
        Ok(Self {
            intent: fields::intent(fields),
            color: fields::color(fields),
            fill: fields::fill(fields),
            size: fields::size(fields),
            align: fields
                .get("textAlign")
                .and_then(Value::as_str)
                .and_then(Align::parse),
            geo: fields
                .get("geo")
                .and_then(Value::as_str)
                .and_then(GeoKind::parse),
            text: fields::string(fields, "text"),
            note: fields::string(fields, "note"),
            w: fields::number(fields, "w").map(f64::abs),
            h: fields::number(fields, "h").map(f64::abs),
            id,
        })
    }

    fn info(&self) -> ActionInfo {
        ActionInfo::new(
            ActionIcon::Pencil,
            fields::describe(&self.intent, || format!("Updated {}", self.id.simple())),
        )
    }

    fn apply(&self, cx: &mut ExecutionContext<'_>) -> Result<(), ActionFailure> {
        let mut shape = cx
            .canvas
            .shape(&self.id)
            .cloned()
            .ok_or_else(|| ActionFailure::ShapeNotFound(self.id.simple().to_string()))?;

        if let Some(color) = self.color {
            shape.style.color = color;
        }
        if let Some(fill) = self.fill {
            shape.style.fill = fill;
        }
        if let Some(size) = self.size {
            shape.style.size = size;
        }
        if let Some(align) = self.align {
            shape.style.align = align;
        }
        if let Some(note) = &self.note {
            shape.note = note.clone();
        }
        if let Some(text) = &self.text {
            shape.set_text(text.clone());
        }
        if let ShapeKind::Geo { geo, w, h, .. } = &mut shape.kind {
            if let Some(kind) = self.geo {
                *geo = kind;
            }
            if let Some(width) = self.w {
                *w = width;
            }
            if let Some(height) = self.h {
                *h = height;
            }
        }

        cx.canvas.update_shape(shape)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub intent: Option<String>,
    pub id: ShapeId,
    pub text: String,
}

impl Executor for Label {
    const KIND: ActionKind = ActionKind::Label;
    const PREVIEWS: bool = true;
    const SUMMARY: &'static str = "Set the text of a shape that can hold text.";
    const EXAMPLE: &'static str = r#"{"_type":"label","intent":"Name the box","shapeId":"box1","text":"Database"}"#;

    fn sanitize(raw: &StreamingAction, cx: &mut ExecutionContext<'_>) -> Result<Self, ActionFailure> {
        let fields = &raw.fields;
        Ok(Self {
            intent: fields::intent(fields),
            id: fields::resolve_key(fields, cx, "shapeId")?,
            text: fields::require_string(fields, "text")?,
        })
    }

    fn info(&self) -> ActionInfo {
        ActionInfo::new(
            ActionIcon::Pencil,
            fields::describe(&self.intent, || format!("Labeled {}", self.id.simple())),
        )
    }

    fn apply(&self, cx: &mut ExecutionContext<'_>) -> Result<(), ActionFailure> {
        let mut shape = cx
            .canvas
            .shape(&self.id)
            .cloned()
            .ok_or_else(|| ActionFailure::ShapeNotFound(self.id.simple().to_string()))?;
        if !shape.set_text(self.text.clone()) {
            return Err(ActionFailure::invalid(format!(
                "{} cannot hold text",
                shape.type_name()
            )));
        }
        cx.canvas.update_shape(shape)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub intent: Option<String>,
    pub ids: Vec<ShapeId>,
}

impl Executor for Delete {
    const KIND: ActionKind = ActionKind::Delete;
    const SUMMARY: &'static str = "Delete one or more shapes.";
    const EXAMPLE: &'static str = r#"{"_type":"delete","intent":"Remove the draft","shapeIds":["draft"]}"#;

    fn sanitize(raw: &StreamingAction, cx: &mut ExecutionContext<'_>) -> Result<Self, ActionFailure> {
        Ok(Self {
            intent: fields::intent(&raw.fields),
            ids: fields::resolve_all(&raw.fields, cx, 1)?,
        })
    }

    fn info(&self) -> ActionInfo {
        ActionInfo::new(
            ActionIcon::Trash,
            fields::describe(&self.intent, || format!("Deleted {} shape(s)", self.ids.len())),
        )
    }

    fn apply(&self, cx: &mut ExecutionContext<'_>) -> Result<(), ActionFailure> {
        for id in &self.ids {
            cx.canvas.delete_shape(id)?;
        }
        Ok(())
    }
}

/// Moves a shape so its position lands on `position` (page space).
#[derive(Debug, Clone, PartialEq)]
pub struct Move {
    pub intent: Option<String>,
    pub id: ShapeId,
    pub position: Vec2,
}

impl Executor for Move {
    const KIND: ActionKind = ActionKind::Move;
    const SUMMARY: &'static str = "Move a shape so its top-left corner sits at x, y.";
    const EXAMPLE: &'static str = r#"{"_type":"move","intent":"Shift the legend down","shapeId":"legend","x":40,"y":320}"#;

    fn sanitize(raw: &StreamingAction, cx: &mut ExecutionContext<'_>) -> Result<Self, ActionFailure> {
        let fields = &raw.fields;
        let id = fields::resolve_key(fields, cx, "shapeId")?;
        // Coordinates echoed back from the prompt regain their exact value.
        let x = cx
            .sanitizer
            .unround(&format!("{}.x", id.simple()), fields::require_number(fields, "x")?);
        let y = cx
            .sanitizer
            .unround(&format!("{}.y", id.simple()), fields::require_number(fields, "y")?);
        Ok(Self {
            intent: fields::intent(fields),
            position: cx.sanitizer.remove_offset(&Vec2::new(x, y)),
            id,
        })
    }

    fn info(&self) -> ActionInfo {
        ActionInfo::new(
            ActionIcon::Cursor,
            fields::describe(&self.intent, || format!("Moved {}", self.id.simple())),
        )
    }

    fn apply(&self, cx: &mut ExecutionContext<'_>) -> Result<(), ActionFailure> {
        let current = cx
            .canvas
            .shape(&self.id)
            .map(|shape| shape.position())
            .ok_or_else(|| ActionFailure::ShapeNotFound(self.id.simple().to_string()))?;
        fields::translate(cx, &self.id, self.position.sub(current))
    }
}

/// Scales shapes about an explicit origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Resize {
    pub intent: Option<String>,
    pub ids: Vec<ShapeId>,
    pub origin: Vec2,
    pub scale: Vec2,
}

impl Executor for Resize {
    const KIND: ActionKind = ActionKind::Resize;
    const SUMMARY: &'static str = "Scale shapes by scaleX/scaleY about the point originX, originY.";
    const EXAMPLE: &'static str = r#"{"_type":"resize","intent":"Double the house","shapeIds":["walls","roof"],"originX":0,"originY":0,"scaleX":2,"scaleY":2}"#;

    fn sanitize(raw: &StreamingAction, cx: &mut ExecutionContext<'_>) -> Result<Self, ActionFailure> {
        let fields = &raw.fields;
        let ids = fields::resolve_all(fields, cx, 1)?;
        let origin = fields::page_point(fields, cx, "originX", "originY")?;
        let scale = Vec2::new(
            fields::require_number(fields, "scaleX")?,
            fields::require_number(fields, "scaleY")?,
        );
        if scale.x == 0.0 || scale.y == 0.0 {
            return Err(ActionFailure::invalid("scale factors must be non-zero"));
        }
        Ok(Self {
            intent: fields::intent(fields),
            ids,
            origin,
            scale,
        })
    }

    fn info(&self) -> ActionInfo {
        ActionInfo::new(
            ActionIcon::Resize,
            fields::describe(&self.intent, || format!("Resized {} shape(s)", self.ids.len())),
        )
    }

    fn apply(&self, cx: &mut ExecutionContext<'_>) -> Result<(), ActionFailure> {
        let scale_point = |point: Vec2| {
            Vec2::new(
                self.origin.x + (point.x - self.origin.x) * self.scale.x,
                self.origin.y + (point.y - self.origin.y) * self.scale.y,
            )
        };
        let scale_relative =
            |point: &Vec2| Vec2::new(point.x * self.scale.x, point.y * self.scale.y);

        for id in &self.ids {
            let mut shape = cx
                .canvas
                .shape(id)
                .cloned()
                .ok_or_else(|| ActionFailure::ShapeNotFound(id.simple().to_string()))?;
            let local = shape.local_bounds().translated(shape.position());
            let scaled = BoxModel::from_points(local.corners().into_iter().map(scale_point))
                .unwrap_or(local);

            match &mut shape.kind {
                ShapeKind::Geo { w, h, .. } => {
                    *w = scaled.w;
                    *h = scaled.h;
                    shape.x = scaled.x;
                    shape.y = scaled.y;
                }
                ShapeKind::Text { width, .. } => {
                    *width = Some(scaled.w);
                    shape.x = scaled.x;
                    shape.y = scaled.y;
                }
                ShapeKind::Note { .. } => {
                    shape.style.scale *= self.scale.x.abs().min(self.scale.y.abs());
                    shape.x = scaled.x;
                    shape.y = scaled.y;
                }
                ShapeKind::Arrow { start, end, .. } => {
                    *start = scale_relative(start);
                    *end = scale_relative(end);
                    let position = scale_point(shape.position());
                    shape.x = position.x;
                    shape.y = position.y;
                }
                ShapeKind::Line { points } | ShapeKind::Draw { points, .. } => {
                    for point in points.iter_mut() {
                        *point = scale_relative(point);
                    }
                    let position = scale_point(shape.position());
                    shape.x = position.x;
                    shape.y = position.y;
                }
            }
            cx.canvas.update_shape(shape)?;
        }
        Ok(())
    }
}

/// Rotates shapes about an explicit origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Rotate {
    pub intent: Option<String>,
    pub ids: Vec<ShapeId>,
    pub origin: Vec2,
    pub degrees: f64,
}

impl Executor for Rotate {
    const KIND: ActionKind = ActionKind::Rotate;
    const SUMMARY: &'static str = "Rotate shapes by a number of degrees (clockwise) about originX, originY.";
    const EXAMPLE: &'static str = r#"{"_type":"rotate","intent":"Tilt the sign","shapeIds":["sign"],"originX":50,"originY":25,"degrees":15}"#;

    fn sanitize(raw: &StreamingAction, cx: &mut ExecutionContext<'_>) -> Result<Self, ActionFailure> {
        let fields = &raw.fields;
        Ok(Self {
            intent: fields::intent(fields),
            ids: fields::resolve_all(fields, cx, 1)?,
            origin: fields::page_point(fields, cx, "originX", "originY")?,
            degrees: fields::require_number(fields, "degrees")?,
        })
    }

    fn info(&self) -> ActionInfo {
        ActionInfo::new(
            ActionIcon::Rotate,
            fields::describe(&self.intent, || format!("Rotated {} shape(s)", self.ids.len())),
        )
    }

    fn apply(&self, cx: &mut ExecutionContext<'_>) -> Result<(), ActionFailure> {
        let radians = self.degrees.to_radians();
        for id in &self.ids {
            let mut shape = cx
                .canvas
                .shape(id)
                .cloned()
                .ok_or_else(|| ActionFailure::ShapeNotFound(id.simple().to_string()))?;
            let position = shape.position().rotate_around(self.origin, radians);
            shape.x = position.x;
            shape.y = position.y;
            shape.rotation += radians;
            cx.canvas.update_shape(shape)?;
        }
        Ok(())
    }
}

/// Deletes every shape on the page.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Clear {
    pub intent: Option<String>,
}

impl Executor for Clear {
    const KIND: ActionKind = ActionKind::Clear;
    const SUMMARY: &'static str = "Delete every shape on the canvas. Only use when asked to start over.";
    const EXAMPLE: &'static str = r#"{"_type":"clear","intent":"Start over"}"#;

    fn sanitize(raw: &StreamingAction, _cx: &mut ExecutionContext<'_>) -> Result<Self, ActionFailure> {
        Ok(Self {
            intent: fields::intent(&raw.fields),
        })
    }

    fn info(&self) -> ActionInfo {
        ActionInfo::new(
            ActionIcon::Eraser,
            fields::describe(&self.intent, || "Cleared the canvas".to_string()),
        )
    }

    fn apply(&self, cx: &mut ExecutionContext<'_>) -> Result<(), ActionFailure> {
        let ids: Vec<ShapeId> = cx
            .canvas
            .page_shapes()
            .into_iter()
            .map(|shape| shape.id.clone())
            .collect();
        for id in ids {
            // Deleting an arrow's target never deletes the arrow, so every id
            // is still present here.
            cx.canvas.delete_shape(&id)?;
        }
        Ok(())
    }
}
