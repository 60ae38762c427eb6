use serde_json::{json, Map, Value};

use crate::canvas::Canvas;
use crate::geometry::Vec2;
use crate::sanitize::Sanitizer;
use crate::shape::{Shape, ShapeKind, Terminal};

/// Model-facing description of a shape: origin-relative, rounded numbers,
/// the same field names the create action accepts.
pub fn simple_shape(shape: &Shape, canvas: &dyn Canvas, sanitizer: &mut Sanitizer) -> Value {
    let id = shape.id.simple().to_string();
    let position = sanitizer.apply_offset(&shape.position());
    let mut fields = Map::new();
    fields.insert("_type".into(), json!(shape.type_name()));
    fields.insert("shapeId".into(), json!(id));

    let mut coordinate = |fields: &mut Map<String, Value>, key: &str, value: f64| {
        let rounded = sanitizer.round(&format!("{id}.{key}"), value);
        fields.insert(key.to_string(), json!(rounded));
    };

    match &shape.kind {
        ShapeKind::Arrow { start, end, bend, text } => {
            let a = position.add(*start);
            let b = position.add(*end);
            coordinate(&mut fields, "x1", a.x);
            coordinate(&mut fields, "y1", a.y);
            coordinate(&mut fields, "x2", b.x);
            coordinate(&mut fields, "y2", b.y);
            if *bend != 0.0 {
                fields.insert("bend".into(), json!(bend.round()));
            }
            if !text.is_empty() {
                fields.insert("text".into(), json!(text));
            }
            for binding in canvas.bindings() {
                if binding.arrow != shape.id {
                    continue;
                }
                let key = match binding.terminal {
                    Terminal::Start => "fromId",
                    Terminal::End => "toId",
                };
                fields.insert(key.into(), json!(binding.target.simple()));
            }
        }
        ShapeKind::Line { points } => {
            let first = points.first().copied().unwrap_or_default();
            let last = points.last().copied().unwrap_or_default();
            let (a, b): (Vec2, Vec2) = (position.add(first), position.add(last));
            coordinate(&mut fields, "x1", a.x);
            coordinate(&mut fields, "y1", a.y);
            coordinate(&mut fields, "x2", b.x);
            coordinate(&mut fields, "y2", b.y);
        }
        _ => {
            let bounds = shape.local_bounds();
            coordinate(&mut fields, "x", position.x);
            coordinate(&mut fields, "y", position.y);
            fields.insert("w".into(), json!(bounds.w.round()));
            fields.insert("h".into(), json!(bounds.h.round()));
            if let Some(text) = shape.text().filter(|text| !text.is_empty()) {
                fields.insert("text".into(), json!(text));
            }
            if let ShapeKind::Text { .. } = shape.kind {
                fields.insert("size".into(), json!(shape.style.size));
            }
        }
    }

    fields.insert("color".into(), json!(shape.style.color));
    if matches!(shape.kind, ShapeKind::Geo { .. } | ShapeKind::Draw { .. }) {
        fields.insert("fill".into(), json!(shape.style.fill));
    }
    if shape.rotation != 0.0 {
        fields.insert(
            "rotation".into(),
            json!(shape.rotation.to_degrees().round()),
        );
    }
    if !shape.note.is_empty() {
        fields.insert("note".into(), json!(shape.note));
    }
    Value::Object(fields)
}
