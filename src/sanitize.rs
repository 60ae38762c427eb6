//! Per-request normalization of model input and output.
//!
//! A [`Sanitizer`] lives exactly as long as one request. It owns the
//! agent-id → shape-id mapping and the rounding side table, so nothing it
//! records can leak into the next request.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::canvas::Canvas;
use crate::geometry::{BoxModel, Vec2};
use crate::shape::{Fill, Shape, ShapeId};

/// Types that can be translated between page and chat-origin space.
pub trait Offset {
    #[must_use]
    fn translated(&self, delta: Vec2) -> Self;
}

impl Offset for Vec2 {
    fn translated(&self, delta: Vec2) -> Self {
        self.add(delta)
    }
}

impl Offset for BoxModel {
    fn translated(&self, delta: Vec2) -> Self {
        BoxModel::translated(self, delta)
    }
}

impl Offset for Shape {
    fn translated(&self, delta: Vec2) -> Self {
        let mut shape = self.clone();
        shape.x += delta.x;
        shape.y += delta.y;
        shape
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Rounded {
    rounded: f64,
    exact: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Sanitizer {
    origin: Vec2,
    id_map: HashMap<String, ShapeId>,
    reserved: HashSet<ShapeId>,
    rounding: HashMap<String, Rounded>,
}

impl Sanitizer {
    #[must_use]
    pub fn new(origin: Vec2) -> Self {
        Self {
            origin,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    /// Page space → chat-origin space.
    #[must_use]
    pub fn apply_offset<T: Offset>(&self, value: &T) -> T {
        value.translated(Vec2::new(-self.origin.x, -self.origin.y))
    }

    /// Chat-origin space → page space.
    #[must_use]
    pub fn remove_offset<T: Offset>(&self, value: &T) -> T {
        value.translated(self.origin)
    }

    /// Rounds `value` for model-facing output, remembering the exact value
    /// under `key` so [`Sanitizer::unround`] can restore it.
    pub fn round(&mut self, key: &str, value: f64) -> f64 {
        if !value.is_finite() {
            return value;
        }
        let rounded = value.round();
        self.rounding.insert(
            key.to_string(),
            Rounded {
                rounded,
                exact: value,
            },
        );
        rounded
    }

    /// Restores the exact value when the model echoed the rounded one back.
    #[must_use]
    pub fn unround(&self, key: &str, value: f64) -> f64 {
        match self.rounding.get(key) {
            Some(entry) if entry.rounded == value => entry.exact,
            _ => value,
        }
    }

    /// Returns a free id for `candidate`, bumping a trailing integer (or
    /// appending `-1`) until nothing on the canvas or reserved in this
    /// request uses it. The mapping is kept for the request's lifetime.
    pub fn ensure_id_is_unique(&mut self, canvas: &dyn Canvas, candidate: &str) -> ShapeId {
        let simple = simple_id(candidate);
        let mut attempt = if simple.is_empty() {
            "shape".to_string()
        } else {
            simple.to_string()
        };

        let mut bumps = 0;
        while self.is_taken(canvas, &ShapeId::new(&attempt)) {
            attempt = if bumps < MAX_ID_BUMPS {
                bump_id(&attempt)
            } else {
                format!("{attempt}-{}", bumps + 1)
            };
            bumps += 1;
        }

        let id = ShapeId::new(&attempt);
        self.reserved.insert(id.clone());
        self.id_map.insert(simple.to_string(), id.clone());
        id
    }

    /// Resolves an agent-given id through this request's mapping, then by
    /// direct existence. A mapping whose target is gone resolves to `None`
    /// rather than the unmapped shape. `None` means the referencing action
    /// must be rejected.
    #[must_use]
    pub fn ensure_id_exists(&self, canvas: &dyn Canvas, candidate: &str) -> Option<ShapeId> {
        let simple = simple_id(candidate);
        if let Some(mapped) = self.id_map.get(simple) {
            return canvas.has_shape(mapped).then(|| mapped.clone());
        }

        let direct = ShapeId::new(simple);
        canvas.has_shape(&direct).then_some(direct)
    }

    /// Resolves a list, failing as a whole if any id is unknown.
    pub fn ensure_ids_exist<'a>(
        &self,
        canvas: &dyn Canvas,
        candidates: impl IntoIterator<Item = &'a str>,
    ) -> Result<Vec<ShapeId>, String> {
        candidates
            .into_iter()
            .map(|candidate| {
                self.ensure_id_exists(canvas, candidate)
                    .ok_or_else(|| candidate.to_string())
            })
            .collect()
    }

    fn is_taken(&self, canvas: &dyn Canvas, id: &ShapeId) -> bool {
        canvas.has_shape(id) || self.reserved.contains(id)
    }
}

const MAX_ID_BUMPS: usize = 10_000;

fn simple_id(candidate: &str) -> &str {
    let trimmed = candidate.trim();
    trimmed.strip_prefix(ShapeId::PREFIX).unwrap_or(trimmed)
}

fn bump_id(id: &str) -> String {
    let digits = id.len() - id.trim_end_matches(|ch: char| ch.is_ascii_digit()).len();
    if digits == 0 {
        return format!("{id}-1");
    }

    let (stem, number) = id.split_at(id.len() - digits);
    match number.parse::<u64>() {
        Ok(value) => match value.checked_add(1) {
            Some(next) => format!("{stem}{next}"),
            None => format!("{id}-1"),
        },
        Err(_) => format!("{id}-1"),
    }
}

/// Accepts numbers and numeric strings (optionally suffixed with `px`).
#[must_use]
pub fn ensure_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => {
            let text = text.trim();
            let text = text.strip_suffix("px").unwrap_or(text).trim();
            text.parse::<f64>().ok()?
        }
        _ => return None,
    };
    number.is_finite().then_some(number)
}

/// Accepts `{x, y}` objects and `[x, y]` pairs.
#[must_use]
pub fn ensure_vector(value: &Value) -> Option<Vec2> {
    match value {
        Value::Object(fields) => Some(Vec2::new(
            ensure_number(fields.get("x")?)?,
            ensure_number(fields.get("y")?)?,
        )),
        Value::Array(items) if items.len() == 2 => {
            Some(Vec2::new(ensure_number(&items[0])?, ensure_number(&items[1])?))
        }
        _ => None,
    }
}

#[must_use]
pub fn ensure_boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => match number.as_f64() {
            Some(n) if n == 0.0 => Some(false),
            Some(n) if n == 1.0 => Some(true),
            _ => None,
        },
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[must_use]
pub fn ensure_fill(value: &Value) -> Option<Fill> {
    let text = value.as_str()?.trim().to_ascii_lowercase();
    match text.as_str() {
        "none" | "transparent" => Some(Fill::None),
        "tint" | "semi" => Some(Fill::Tint),
        "background" | "fill" => Some(Fill::Background),
        "solid" => Some(Fill::Solid),
        "pattern" | "lined-fill" | "hatch" => Some(Fill::Pattern),
        _ => None,
    }
}

#[must_use]
pub fn ensure_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::canvas::MemoryCanvas;
    use crate::shape::ShapeKind;

    fn canvas_with(ids: &[&str]) -> MemoryCanvas {
        let mut canvas = MemoryCanvas::new();
        for id in ids {
            canvas
                .create_shape(Shape::new(
                    ShapeId::new(id),
                    Vec2::default(),
                    ShapeKind::Note {
                        text: String::new(),
                    },
                ))
                .expect("seed shape");
        }
        canvas
    }

    #[test]
    fn colliding_id_gets_a_free_name_and_resolves_later() {
        let canvas = canvas_with(&["foo", "foo1"]);
        let mut sanitizer = Sanitizer::default();

        let id = sanitizer.ensure_id_is_unique(&canvas, "foo");
        assert!(!canvas.has_shape(&id));
        assert_eq!(id.simple(), "foo-1");

        let mut canvas = canvas;
        canvas
            .create_shape(Shape::new(
                id.clone(),
                Vec2::default(),
                ShapeKind::Note {
                    text: String::new(),
                },
            ))
            .expect("create mapped shape");
        assert_eq!(sanitizer.ensure_id_exists(&canvas, "foo"), Some(id));
    }

    #[test]
    fn trailing_integer_is_incremented() {
        let canvas = canvas_with(&["box2", "box3"]);
        let mut sanitizer = Sanitizer::default();
        assert_eq!(sanitizer.ensure_id_is_unique(&canvas, "box2").simple(), "box4");
        assert_eq!(sanitizer.ensure_id_is_unique(&canvas, "box2").simple(), "box5");
    }

    #[test]
    fn largest_trailing_integer_does_not_stall_allocation() {
        let canvas = canvas_with(&["a18446744073709551615"]);
        let mut sanitizer = Sanitizer::default();

        let id = sanitizer.ensure_id_is_unique(&canvas, "a18446744073709551615");
        assert_eq!(id.simple(), "a18446744073709551615-1");
        let next = sanitizer.ensure_id_is_unique(&canvas, "a18446744073709551615");
        assert_eq!(next.simple(), "a18446744073709551615-2");
    }

    #[test]
    fn mapping_to_a_deleted_shape_does_not_fall_back_to_the_original() {
        let mut canvas = canvas_with(&["foo"]);
        let mut sanitizer = Sanitizer::default();
        let mapped = sanitizer.ensure_id_is_unique(&canvas, "foo");
        assert_eq!(mapped.simple(), "foo-1");
        canvas
            .create_shape(Shape::new(
                mapped.clone(),
                Vec2::default(),
                ShapeKind::Note {
                    text: String::new(),
                },
            ))
            .expect("create mapped shape");
        canvas.delete_shape(&mapped).expect("delete mapped shape");

        assert_eq!(sanitizer.ensure_id_exists(&canvas, "foo"), None);
    }

    #[test]
    fn unknown_id_is_not_guessed() {
        let canvas = canvas_with(&["a"]);
        let sanitizer = Sanitizer::default();
        assert_eq!(sanitizer.ensure_id_exists(&canvas, "shape:a"), Some(ShapeId::new("a")));
        assert_eq!(sanitizer.ensure_id_exists(&canvas, "b"), None);
        assert_eq!(
            sanitizer.ensure_ids_exist(&canvas, ["a", "zz"]),
            Err("zz".to_string())
        );
    }

    #[test]
    fn rounding_restores_exact_value_only_for_echoed_number() {
        let mut sanitizer = Sanitizer::default();
        assert_eq!(sanitizer.round("a.x", 10.37), 10.0);
        assert_eq!(sanitizer.unround("a.x", 10.0), 10.37);
        assert_eq!(sanitizer.unround("a.x", 12.0), 12.0);
        assert_eq!(sanitizer.unround("b.x", 10.0), 10.0);
    }

    #[test]
    fn offsets_translate_both_ways() {
        let sanitizer = Sanitizer::new(Vec2::new(1000.0, -500.0));
        let page = BoxModel::new(1010.0, -490.0, 5.0, 5.0);
        let relative = sanitizer.apply_offset(&page);
        assert_eq!(relative, BoxModel::new(10.0, 10.0, 5.0, 5.0));
        assert_eq!(sanitizer.remove_offset(&relative), page);
    }

    #[test]
    fn permissive_coercions() {
        assert_eq!(ensure_number(&json!("12px")), Some(12.0));
        assert_eq!(ensure_number(&json!("abc")), None);
        assert_eq!(ensure_number(&json!(null)), None);
        assert_eq!(ensure_vector(&json!([1, "2"])), Some(Vec2::new(1.0, 2.0)));
        assert_eq!(ensure_vector(&json!({"x": 1})), None);
        assert_eq!(ensure_boolean(&json!("Yes")), Some(true));
        assert_eq!(ensure_boolean(&json!(2)), None);
        assert_eq!(ensure_fill(&json!("semi")), Some(Fill::Tint));
        assert_eq!(ensure_fill(&json!("plaid")), None);
    }
}
