use serde_json::Value;
use tracing::debug;

use super::fields::{self, Fields};
use super::{ActionFailure, ActionIcon, ActionInfo, ActionKind, ExecutionContext, Executor};
use crate::geometry::{BoxModel, Vec2};
use crate::placement::PlacementStrategy;
use crate::shape::{
    Align, Binding, Fill, GeoKind, PenStyle, Shape, ShapeId, ShapeKind, ShapeStyle, Terminal,
};
use crate::stream::StreamingAction;
use crate::text::measure_text;

/// Anchors never sit closer than this (as a fraction) to a target's edge.
const ANCHOR_MARGIN: f64 = 0.1;

/// Arrow terminal attached to an existing shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrowBinding {
    pub terminal: Terminal,
    pub target: ShapeId,
    /// Normalized position inside the target bounds.
    pub anchor: Vec2,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Create {
    pub intent: Option<String>,
    /// Fully resolved shape in page space.
    pub shape: Shape,
    pub bindings: Vec<ArrowBinding>,
    /// Whether the placement solver may move the shape off its requested spot.
    pub placeable: bool,
}

impl Executor for Create {
    const KIND: ActionKind = ActionKind::Create;
    const PREVIEWS: bool = true;
    const SUMMARY: &'static str = "Create a shape: a geo primitive (rectangle, ellipse, triangle, ...), text, note, arrow or line.";
    const EXAMPLE: &'static str = r#"{"_type":"create","intent":"Draw the sun","shape":{"_type":"ellipse","shapeId":"sun","x":100,"y":100,"w":50,"h":50,"color":"yellow","fill":"solid"}}"#;

    fn sanitize(raw: &StreamingAction, cx: &mut ExecutionContext<'_>) -> Result<Self, ActionFailure> {
        let Some(Value::Object(spec)) = raw.get("shape") else {
            return Err(ActionFailure::invalid("`shape` must be an object"));
        };
        let type_name = fields::require_string(spec, "_type")?;

        let mut style = ShapeStyle::default();
        if let Some(color) = fields::color(spec) {
            style.color = color;
        }
        if let Some(fill) = fields::fill(spec) {
            style.fill = fill;
        }
        if let Some(size) = fields::size(spec) {
            style.size = size;
        }

        let text = fields::string(spec, "text").unwrap_or_default();
        let (position, kind, bindings, placeable) = match type_name.to_ascii_lowercase().as_str() {
            "text" => {
                let requested = fields::page_point(spec, cx, "x", "y")?;
                let align = spec
                    .get("textAlign")
                    .and_then(Value::as_str)
                    .and_then(Align::parse)
                    .unwrap_or_default();
                style.align = align;
                let width = fields::number(spec, "maxWidth").filter(|width| *width > 0.0);
                let (measured, _) = measure_text(&text, style.size, style.scale, width);
                let left = match align {
                    Align::Start => requested.x,
                    Align::Middle => requested.x - measured / 2.0,
                    Align::End => requested.x - measured,
                };
                (
                    Vec2::new(left, requested.y),
                    ShapeKind::Text { text, width },
                    Vec::new(),
                    true,
                )
            }
            "note" => (
                fields::page_point(spec, cx, "x", "y")?,
                ShapeKind::Note { text },
                Vec::new(),
                true,
            ),
            "arrow" => {
                let (origin, start, end, bindings) = arrow_geometry(spec, cx)?;
                let bend = fields::number(spec, "bend").unwrap_or(0.0);
                (
                    origin,
                    ShapeKind::Arrow {
                        start,
                        end,
                        bend,
                        text,
                    },
                    bindings,
                    false,
                )
            }
            "line" => {
                let a = fields::page_point(spec, cx, "x1", "y1")?;
                let b = fields::page_point(spec, cx, "x2", "y2")?;
                let origin = Vec2::new(a.x.min(b.x), a.y.min(b.y));
                (
                    origin,
                    ShapeKind::Line {
                        points: vec![a.sub(origin), b.sub(origin)],
                    },
                    Vec::new(),
                    false,
                )
            }
            other => {
                let geo = GeoKind::parse(other)
                    .ok_or_else(|| ActionFailure::invalid(format!("unknown shape type `{other}`")))?;
                let area = fields::page_box(spec, cx)?;
                (
                    area.origin(),
                    ShapeKind::Geo {
                        geo,
                        w: area.w,
                        h: area.h,
                        text,
                    },
                    Vec::new(),
                    true,
                )
            }
        };

        let candidate = fields::string(spec, "shapeId").unwrap_or_else(|| type_name.clone());
        let id = cx.sanitizer.ensure_id_is_unique(&*cx.canvas, &candidate);
        let mut shape = Shape::new(id, position, kind).with_style(style);
        if let Some(note) = fields::string(spec, "note") {
            shape.note = note;
        }

        Ok(Self {
            intent: fields::intent(&raw.fields),
            shape,
            bindings,
            placeable,
        })
    }

    fn info(&self) -> ActionInfo {
        ActionInfo::new(
            ActionIcon::Pencil,
            fields::describe(&self.intent, || format!("Created {}", self.shape.type_name())),
        )
    }

    fn apply(&self, cx: &mut ExecutionContext<'_>) -> Result<(), ActionFailure> {
        let mut shape = self.shape.clone();
        shape.index = cx.canvas.max_index() + 1;

        if self.placeable {
            let desired = shape.bounds();
            let existing: Vec<BoxModel> = cx
                .canvas
                .page_shapes()
                .into_iter()
                .map(Shape::bounds)
                .collect();
            let viewport = cx.effects.agent_viewport();
            let placement = cx.solver.place(desired, &existing, viewport);
            if placement.strategy != PlacementStrategy::Desired {
                debug!(
                    shape_id = %shape.id,
                    strategy = ?placement.strategy,
                    "moved new shape to avoid overlap"
                );
                let delta = placement.bounds.origin().sub(desired.origin());
                shape.x += delta.x;
                shape.y += delta.y;
            }
        }

        let arrow = shape.id.clone();
        cx.canvas.create_shape(shape)?;
        for binding in &self.bindings {
            cx.canvas.create_binding(Binding::new(
                arrow.clone(),
                binding.target.clone(),
                binding.terminal,
                binding.anchor,
            ))?;
        }
        Ok(())
    }
}

/// Endpoints of an arrow in page space, snapped onto bound targets, plus
/// the origin derived from them.
fn arrow_geometry(
    spec: &Fields,
    cx: &ExecutionContext<'_>,
) -> Result<(Vec2, Vec2, Vec2, Vec<ArrowBinding>), ActionFailure> {
    let mut start = fields::page_point(spec, cx, "x1", "y1")?;
    let mut end = fields::page_point(spec, cx, "x2", "y2")?;
    let mut bindings = Vec::new();

    for (key, terminal) in [("fromId", Terminal::Start), ("toId", Terminal::End)] {
        let Some(candidate) = fields::string(spec, key) else {
            continue;
        };
        let target = fields::resolve(cx, &candidate)?;
        let bounds = fields::bounds_of(cx, &target)?;
        let point = match terminal {
            Terminal::Start => &mut start,
            Terminal::End => &mut end,
        };
        let anchor = normalized_anchor(&bounds, *point);
        *point = Vec2::new(bounds.x + anchor.x * bounds.w, bounds.y + anchor.y * bounds.h);
        bindings.push(ArrowBinding {
            terminal,
            target,
            anchor,
        });
    }

    let origin = Vec2::new(start.x.min(end.x), start.y.min(end.y));
    Ok((origin, start.sub(origin), end.sub(origin), bindings))
}

/// Position of `point` inside `bounds` as fractions, pulled off the edges.
fn normalized_anchor(bounds: &BoxModel, point: Vec2) -> Vec2 {
    let axis = |offset: f64, extent: f64| {
        if extent <= 0.0 {
            0.5
        } else {
            (offset / extent).clamp(ANCHOR_MARGIN, 1.0 - ANCHOR_MARGIN)
        }
    };
    Vec2::new(
        axis(point.x - bounds.x, bounds.w),
        axis(point.y - bounds.y, bounds.h),
    )
}

/// Freehand stroke.
#[derive(Debug, Clone, PartialEq)]
pub struct Pen {
    pub intent: Option<String>,
    pub shape: Shape,
}

impl Executor for Pen {
    const KIND: ActionKind = ActionKind::Pen;
    const PREVIEWS: bool = true;
    const SUMMARY: &'static str = "Draw a freehand stroke through a list of points.";
    const EXAMPLE: &'static str = r#"{"_type":"pen","intent":"Underline the title","shapeId":"underline","points":[{"x":0,"y":60},{"x":200,"y":62}],"style":"smooth","closed":false,"color":"blue"}"#;

    fn sanitize(raw: &StreamingAction, cx: &mut ExecutionContext<'_>) -> Result<Self, ActionFailure> {
        let fields = &raw.fields;
        let points: Vec<Vec2> = fields::points(fields, "points")?
            .into_iter()
            .map(|point| cx.sanitizer.remove_offset(&point))
            .collect();
        if points.len() < 2 {
            return Err(ActionFailure::invalid("a stroke needs at least two points"));
        }

        let origin = BoxModel::from_points(points.iter().copied())
            .map(|bounds| bounds.origin())
            .unwrap_or_default();
        let style = match fields.get("style").and_then(Value::as_str) {
            Some("straight") => PenStyle::Straight,
            _ => PenStyle::Smooth,
        };
        let closed = fields::boolean(fields, "closed").unwrap_or(false);

        let mut shape_style = ShapeStyle {
            fill: Fill::None,
            ..ShapeStyle::default()
        };
        if let Some(color) = fields::color(fields) {
            shape_style.color = color;
        }
        if let Some(fill) = fields::fill(fields) {
            shape_style.fill = fill;
        }

        let candidate = fields::string(fields, "shapeId").unwrap_or_else(|| "pen".to_string());
        let id = cx.sanitizer.ensure_id_is_unique(&*cx.canvas, &candidate);
        let kind = ShapeKind::Draw {
            points: points.iter().map(|point| point.sub(origin)).collect(),
            closed,
            style,
        };

        Ok(Self {
            intent: fields::intent(fields),
            shape: Shape::new(id, origin, kind).with_style(shape_style),
        })
    }

    fn info(&self) -> ActionInfo {
        ActionInfo::new(
            ActionIcon::Pencil,
            fields::describe(&self.intent, || "Drew a stroke".to_string()),
        )
    }

    fn apply(&self, cx: &mut ExecutionContext<'_>) -> Result<(), ActionFailure> {
        let mut shape = self.shape.clone();
        shape.index = cx.canvas.max_index() + 1;
        cx.canvas.create_shape(shape)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::action::RecordedEffects;
    use crate::canvas::{Canvas, MemoryCanvas};
    use crate::placement::PlacementSolver;
    use crate::sanitize::Sanitizer;
    use crate::shape::Color;

    fn frame(value: serde_json::Value) -> StreamingAction {
        StreamingAction::from_value(value).expect("valid frame")
    }

    struct Fixture {
        canvas: MemoryCanvas,
        sanitizer: Sanitizer,
        solver: PlacementSolver,
        effects: RecordedEffects,
    }

    impl Fixture {
        fn new() -> Self {
            let canvas = MemoryCanvas::new();
            let viewport = canvas.viewport();
            Self {
                canvas,
                sanitizer: Sanitizer::default(),
                solver: PlacementSolver::default(),
                effects: RecordedEffects::with_viewport(viewport),
            }
        }

        fn run(&mut self, value: serde_json::Value) -> Result<(), ActionFailure> {
            let mut cx = ExecutionContext::new(
                &mut self.canvas,
                &mut self.sanitizer,
                &mut self.solver,
                &mut self.effects,
            );
            cx.execute(&frame(value)).map(|_| ())
        }
    }

    #[test]
    fn red_circle_lands_exactly_where_requested() {
        let mut fixture = Fixture::new();
        fixture
            .run(json!({
                "_type": "create",
                "complete": true,
                "shape": {"_type": "circle", "shapeId": "c", "x": 100, "y": 100, "w": 50, "h": 50, "color": "red"}
            }))
            .expect("create");

        let shape = fixture.canvas.shape(&ShapeId::new("c")).expect("created");
        assert_eq!(shape.position(), Vec2::new(100.0, 100.0));
        assert_eq!(shape.style.color, Color::Red);
        assert!(matches!(
            shape.kind,
            ShapeKind::Geo { geo: GeoKind::Ellipse, w, h, .. } if w == 50.0 && h == 50.0
        ));
    }

    #[test]
    fn middle_aligned_text_is_anchored_on_its_center() {
        let mut fixture = Fixture::new();
        fixture
            .run(json!({
                "_type": "create",
                "complete": true,
                "shape": {"_type": "text", "shapeId": "t", "x": 400, "y": 300, "text": "Hello", "textAlign": "center"}
            }))
            .expect("create");

        let bounds = fixture.canvas.shape_bounds(&ShapeId::new("t")).expect("bounds");
        assert!((bounds.mid_x() - 400.0).abs() < 1e-9);
        assert_eq!(bounds.y, 300.0);
    }

    #[test]
    fn arrow_binds_to_targets_with_anchors_off_the_edges() {
        let mut fixture = Fixture::new();
        for (id, x) in [("a", 0.0), ("b", 300.0)] {
            fixture
                .run(json!({
                    "_type": "create",
                    "complete": true,
                    "shape": {"_type": "rectangle", "shapeId": id, "x": x, "y": 0, "w": 100, "h": 100}
                }))
                .expect("create target");
        }

        fixture
            .run(json!({
                "_type": "create",
                "complete": true,
                "shape": {"_type": "arrow", "shapeId": "link", "x1": 100, "y1": 50, "x2": 300, "y2": 50, "fromId": "a", "toId": "b"}
            }))
            .expect("create arrow");

        let bindings = fixture.canvas.bindings();
        assert_eq!(bindings.len(), 2);
        let start = bindings
            .iter()
            .find(|binding| binding.terminal == Terminal::Start)
            .expect("start binding");
        assert_eq!(start.target, ShapeId::new("a"));
        assert_eq!(start.anchor, Vec2::new(0.9, 0.5));

        let arrow = fixture.canvas.shape(&ShapeId::new("link")).expect("arrow");
        assert_eq!(arrow.position(), Vec2::new(90.0, 50.0));
    }

    #[test]
    fn arrow_to_unknown_shape_is_rejected() {
        let mut fixture = Fixture::new();
        let result = fixture.run(json!({
            "_type": "create",
            "complete": true,
            "shape": {"_type": "arrow", "x1": 0, "y1": 0, "x2": 10, "y2": 10, "toId": "ghost"}
        }));
        assert_eq!(result, Err(ActionFailure::ShapeNotFound("ghost".to_string())));
        assert_eq!(fixture.canvas.shape_count(), 0);
    }

    #[test]
    fn pen_stroke_is_stored_relative_to_its_origin() {
        let mut fixture = Fixture::new();
        fixture
            .run(json!({
                "_type": "pen",
                "complete": true,
                "shapeId": "s",
                "points": [{"x": 10, "y": 20}, [30, 5]]
            }))
            .expect("pen");

        let shape = fixture.canvas.shape(&ShapeId::new("s")).expect("stroke");
        assert_eq!(shape.position(), Vec2::new(10.0, 5.0));
        assert!(matches!(
            &shape.kind,
            ShapeKind::Draw { points, .. } if points == &vec![Vec2::new(0.0, 15.0), Vec2::new(20.0, 0.0)]
        ));
    }
}
