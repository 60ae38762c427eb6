//! Permissive field readers shared by the executors.

use serde_json::{Map, Value};

use super::{ActionFailure, ExecutionContext};
use crate::geometry::{BoxModel, Vec2};
use crate::sanitize::{ensure_boolean, ensure_fill, ensure_number, ensure_string, ensure_vector};
use crate::shape::{Color, Fill, ShapeId, Size};

pub(crate) type Fields = Map<String, Value>;

pub(crate) fn intent(fields: &Fields) -> Option<String> {
    fields
        .get("intent")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

pub(crate) fn string(fields: &Fields, key: &str) -> Option<String> {
    fields.get(key).and_then(ensure_string)
}

pub(crate) fn require_string(fields: &Fields, key: &str) -> Result<String, ActionFailure> {
    string(fields, key).ok_or_else(|| ActionFailure::invalid(format!("`{key}` must be a string")))
}

pub(crate) fn number(fields: &Fields, key: &str) -> Option<f64> {
    fields.get(key).and_then(ensure_number)
}

pub(crate) fn require_number(fields: &Fields, key: &str) -> Result<f64, ActionFailure> {
    number(fields, key).ok_or_else(|| ActionFailure::invalid(format!("`{key}` must be a number")))
}

pub(crate) fn boolean(fields: &Fields, key: &str) -> Option<bool> {
    fields.get(key).and_then(ensure_boolean)
}

pub(crate) fn color(fields: &Fields) -> Option<Color> {
    fields.get("color").and_then(Value::as_str).and_then(Color::parse)
}

pub(crate) fn fill(fields: &Fields) -> Option<Fill> {
    fields.get("fill").and_then(ensure_fill)
}

pub(crate) fn size(fields: &Fields) -> Option<Size> {
    fields.get("size").and_then(Value::as_str).and_then(Size::parse)
}

/// Reads `x`/`y` (or the given keys) as a point in chat-origin space and
/// returns it in page space.
pub(crate) fn page_point(
    fields: &Fields,
    cx: &ExecutionContext<'_>,
    x_key: &str,
    y_key: &str,
) -> Result<Vec2, ActionFailure> {
    let point = Vec2::new(require_number(fields, x_key)?, require_number(fields, y_key)?);
    Ok(cx.sanitizer.remove_offset(&point))
}

/// Reads `x, y, w, h` as a box in chat-origin space and returns it in page
/// space.
pub(crate) fn page_box(fields: &Fields, cx: &ExecutionContext<'_>) -> Result<BoxModel, ActionFailure> {
    let area = BoxModel::new(
        require_number(fields, "x")?,
        require_number(fields, "y")?,
        require_number(fields, "w")?.abs(),
        require_number(fields, "h")?.abs(),
    );
    Ok(cx.sanitizer.remove_offset(&area))
}

pub(crate) fn points(fields: &Fields, key: &str) -> Result<Vec<Vec2>, ActionFailure> {
    let Some(Value::Array(items)) = fields.get(key) else {
        return Err(ActionFailure::invalid(format!("`{key}` must be a list of points")));
    };
    items
        .iter()
        .map(|item| {
            ensure_vector(item)
                .ok_or_else(|| ActionFailure::invalid(format!("`{key}` holds a malformed point")))
        })
        .collect()
}

/// Agent-given ids from `shapeIds` (list) or `shapeId` (single).
pub(crate) fn id_candidates(fields: &Fields) -> Vec<String> {
    match fields.get("shapeIds") {
        Some(Value::Array(items)) => items.iter().filter_map(ensure_string).collect(),
        _ => string(fields, "shapeId").into_iter().collect(),
    }
}

pub(crate) fn resolve(cx: &ExecutionContext<'_>, candidate: &str) -> Result<ShapeId, ActionFailure> {
    cx.sanitizer
        .ensure_id_exists(&*cx.canvas, candidate)
        .ok_or_else(|| ActionFailure::ShapeNotFound(candidate.to_string()))
}

pub(crate) fn resolve_key(
    fields: &Fields,
    cx: &ExecutionContext<'_>,
    key: &str,
) -> Result<ShapeId, ActionFailure> {
    let candidate = require_string(fields, key)?;
    resolve(cx, &candidate)
}

/// Resolves every referenced id; one unknown id rejects the whole list.
pub(crate) fn resolve_all(
    fields: &Fields,
    cx: &ExecutionContext<'_>,
    needed: usize,
) -> Result<Vec<ShapeId>, ActionFailure> {
    let candidates = id_candidates(fields);
    let mut ids = cx
        .sanitizer
        .ensure_ids_exist(&*cx.canvas, candidates.iter().map(String::as_str))
        .map_err(ActionFailure::ShapeNotFound)?;
    let mut seen = std::collections::HashSet::new();
    ids.retain(|id| seen.insert(id.clone()));

    if ids.len() < needed {
        return Err(ActionFailure::InsufficientShapes {
            needed,
            got: ids.len(),
        });
    }
    Ok(ids)
}

/// Moves a shape by `delta` in page space.
pub(crate) fn translate(
    cx: &mut ExecutionContext<'_>,
    id: &ShapeId,
    delta: Vec2,
) -> Result<(), ActionFailure> {
    if delta.x == 0.0 && delta.y == 0.0 {
        return Ok(());
    }
    let mut shape = cx
        .canvas
        .shape(id)
        .cloned()
        .ok_or_else(|| ActionFailure::ShapeNotFound(id.simple().to_string()))?;
    shape.x += delta.x;
    shape.y += delta.y;
    cx.canvas.update_shape(shape)?;
    Ok(())
}

pub(crate) fn bounds_of(cx: &ExecutionContext<'_>, id: &ShapeId) -> Result<BoxModel, ActionFailure> {
    cx.canvas
        .shape_bounds(id)
        .ok_or_else(|| ActionFailure::ShapeNotFound(id.simple().to_string()))
}

/// Text shown in history for actions that touch a list of shapes.
pub(crate) fn describe(intent: &Option<String>, fallback: impl FnOnce() -> String) -> String {
    intent.clone().unwrap_or_else(fallback)
}
