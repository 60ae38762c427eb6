use serde_json::Value;

use super::fields;
use super::{ActionFailure, ActionIcon, ActionInfo, ActionKind, ExecutionContext, Executor};
use crate::geometry::{BoxModel, Vec2};
use crate::shape::ShapeId;
use crate::stream::StreamingAction;

const DEFAULT_STACK_GAP: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignEdge {
    Top,
    Bottom,
    Left,
    Right,
    CenterHorizontal,
    CenterVertical,
}

impl AlignEdge {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "top" => Some(Self::Top),
            "bottom" => Some(Self::Bottom),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            "center-horizontal" => Some(Self::CenterHorizontal),
            "center-vertical" => Some(Self::CenterVertical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Align {
    pub intent: Option<String>,
    pub ids: Vec<ShapeId>,
    pub edge: AlignEdge,
}

impl Executor for Align {
    const KIND: ActionKind = ActionKind::Align;
    const SUMMARY: &'static str = "Align two or more shapes on an edge or center line: top, bottom, left, right, center-horizontal, center-vertical.";
    const EXAMPLE: &'static str = r#"{"_type":"align","intent":"Line up the boxes","shapeIds":["a","b","c"],"alignment":"top"}"#;

    fn sanitize(raw: &StreamingAction, cx: &mut ExecutionContext<'_>) -> Result<Self, ActionFailure> {
        let fields = &raw.fields;
        let edge = fields
            .get("alignment")
            .and_then(Value::as_str)
            .and_then(AlignEdge::parse)
            .ok_or_else(|| ActionFailure::invalid("unknown `alignment`"))?;
        Ok(Self {
            intent: fields::intent(fields),
            ids: fields::resolve_all(fields, cx, 2)?,
            edge,
        })
    }

    fn info(&self) -> ActionInfo {
        ActionInfo::new(
            ActionIcon::Align,
            fields::describe(&self.intent, || format!("Aligned {} shapes", self.ids.len())),
        )
    }

    fn apply(&self, cx: &mut ExecutionContext<'_>) -> Result<(), ActionFailure> {
        let bounds = collect_bounds(cx, &self.ids)?;
        let Some(common) = BoxModel::union_all(bounds.iter().map(|(_, b)| *b)) else {
            return Ok(());
        };

        for (id, b) in &bounds {
            let delta = match self.edge {
                AlignEdge::Top => Vec2::new(0.0, common.min_y() - b.min_y()),
                AlignEdge::Bottom => Vec2::new(0.0, common.max_y() - b.max_y()),
                AlignEdge::Left => Vec2::new(common.min_x() - b.min_x(), 0.0),
                AlignEdge::Right => Vec2::new(common.max_x() - b.max_x(), 0.0),
                AlignEdge::CenterHorizontal => Vec2::new(common.mid_x() - b.mid_x(), 0.0),
                AlignEdge::CenterVertical => Vec2::new(0.0, common.mid_y() - b.mid_y()),
            };
            fields::translate(cx, id, delta)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackDirection {
    Horizontal,
    Vertical,
}

impl StackDirection {
    fn read(fields: &fields::Fields) -> Result<Self, ActionFailure> {
        match fields.get("direction").and_then(Value::as_str) {
            Some("horizontal") => Ok(Self::Horizontal),
            Some("vertical") => Ok(Self::Vertical),
            _ => Err(ActionFailure::invalid(
                "`direction` must be horizontal or vertical",
            )),
        }
    }
}

/// Spreads shapes so the gaps between neighbours are equal. The outermost
/// shapes stay put.
#[derive(Debug, Clone, PartialEq)]
pub struct Distribute {
    pub intent: Option<String>,
    pub ids: Vec<ShapeId>,
    pub direction: StackDirection,
}

impl Executor for Distribute {
    const KIND: ActionKind = ActionKind::Distribute;
    const SUMMARY: &'static str = "Space three or more shapes evenly, horizontally or vertically.";
    const EXAMPLE: &'static str = r#"{"_type":"distribute","intent":"Even out the columns","shapeIds":["a","b","c"],"direction":"horizontal"}"#;

    fn sanitize(raw: &StreamingAction, cx: &mut ExecutionContext<'_>) -> Result<Self, ActionFailure> {
        let fields = &raw.fields;
        Ok(Self {
            intent: fields::intent(fields),
            direction: StackDirection::read(fields)?,
            ids: fields::resolve_all(fields, cx, 3)?,
        })
    }

    fn info(&self) -> ActionInfo {
        ActionInfo::new(
            ActionIcon::Align,
            fields::describe(&self.intent, || format!("Distributed {} shapes", self.ids.len())),
        )
    }

    fn apply(&self, cx: &mut ExecutionContext<'_>) -> Result<(), ActionFailure> {
        let mut bounds = collect_bounds(cx, &self.ids)?;
        let horizontal = self.direction == StackDirection::Horizontal;
        let start = |b: &BoxModel| if horizontal { b.min_x() } else { b.min_y() };
        let extent = |b: &BoxModel| if horizontal { b.w } else { b.h };
        bounds.sort_by(|(_, a), (_, b)| start(a).total_cmp(&start(b)));

        let (Some((_, first)), Some((_, last))) = (bounds.first(), bounds.last()) else {
            return Ok(());
        };
        let span = (start(last) + extent(last)) - start(first);
        let occupied: f64 = bounds.iter().map(|(_, b)| extent(b)).sum();
        let gap = (span - occupied) / (bounds.len() - 1) as f64;

        let mut cursor = start(first);
        for (id, b) in &bounds {
            let shift = cursor - start(b);
            let delta = if horizontal {
                Vec2::new(shift, 0.0)
            } else {
                Vec2::new(0.0, shift)
            };
            fields::translate(cx, id, delta)?;
            cursor += extent(b) + gap;
        }
        Ok(())
    }
}

/// Lines shapes up one after another with a fixed gap.
#[derive(Debug, Clone, PartialEq)]
pub struct Stack {
    pub intent: Option<String>,
    pub ids: Vec<ShapeId>,
    pub direction: StackDirection,
    pub gap: f64,
}

impl Executor for Stack {
    const KIND: ActionKind = ActionKind::Stack;
    const SUMMARY: &'static str = "Stack two or more shapes in a row or column with a fixed gap.";
    const EXAMPLE: &'static str = r#"{"_type":"stack","intent":"Stack the cards","shapeIds":["c1","c2","c3"],"direction":"vertical","gap":20}"#;

    fn sanitize(raw: &StreamingAction, cx: &mut ExecutionContext<'_>) -> Result<Self, ActionFailure> {
        let fields = &raw.fields;
        Ok(Self {
            intent: fields::intent(fields),
            direction: StackDirection::read(fields)?,
            gap: fields::number(fields, "gap").unwrap_or(DEFAULT_STACK_GAP),
            ids: fields::resolve_all(fields, cx, 2)?,
        })
    }

    fn info(&self) -> ActionInfo {
        ActionInfo::new(
            ActionIcon::Align,
            fields::describe(&self.intent, || format!("Stacked {} shapes", self.ids.len())),
        )
    }

    fn apply(&self, cx: &mut ExecutionContext<'_>) -> Result<(), ActionFailure> {
        let mut bounds = collect_bounds(cx, &self.ids)?;
        let horizontal = self.direction == StackDirection::Horizontal;
        let start = |b: &BoxModel| if horizontal { b.min_x() } else { b.min_y() };
        bounds.sort_by(|(_, a), (_, b)| start(a).total_cmp(&start(b)));

        let mut cursor: Option<f64> = None;
        for (id, b) in &bounds {
            let Some(next) = cursor else {
                cursor = Some(if horizontal { b.max_x() } else { b.max_y() } + self.gap);
                continue;
            };
            let delta = if horizontal {
                Vec2::new(next - b.min_x(), 0.0)
            } else {
                Vec2::new(0.0, next - b.min_y())
            };
            fields::translate(cx, id, delta)?;
            cursor = Some(next + if horizontal { b.w } else { b.h } + self.gap);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceSide {
    Top,
    Bottom,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceAlign {
    Start,
    Center,
    End,
}

/// Positions a shape next to a reference shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub intent: Option<String>,
    pub id: ShapeId,
    pub reference: ShapeId,
    pub side: PlaceSide,
    pub align: PlaceAlign,
    /// Gap between the reference and the shape along the side's normal.
    pub side_offset: f64,
    /// Shift along the side, away from the aligned edge.
    pub align_offset: f64,
}

impl Place {
    /// Top-left corner for a shape of `size` next to `reference`.
    #[must_use]
    pub fn target(&self, reference: &BoxModel, size: Vec2) -> Vec2 {
        let along = |min: f64, mid: f64, max: f64, extent: f64| match self.align {
            PlaceAlign::Start => min + self.align_offset,
            PlaceAlign::Center => mid - extent / 2.0 + self.align_offset,
            PlaceAlign::End => max - extent - self.align_offset,
        };
        let horizontal = || along(reference.min_x(), reference.mid_x(), reference.max_x(), size.x);
        let vertical = || along(reference.min_y(), reference.mid_y(), reference.max_y(), size.y);

        match self.side {
            PlaceSide::Top => Vec2::new(horizontal(), reference.min_y() - size.y - self.side_offset),
            PlaceSide::Bottom => Vec2::new(horizontal(), reference.max_y() + self.side_offset),
            PlaceSide::Left => Vec2::new(reference.min_x() - size.x - self.side_offset, vertical()),
            PlaceSide::Right => Vec2::new(reference.max_x() + self.side_offset, vertical()),
        }
    }
}

impl Executor for Place {
    const KIND: ActionKind = ActionKind::Place;
    const SUMMARY: &'static str = "Place a shape on one side (top, bottom, left, right) of a reference shape, aligned start, center or end.";
    const EXAMPLE: &'static str = r#"{"_type":"place","intent":"Put the caption under the photo","shapeId":"caption","referenceShapeId":"photo","side":"bottom","align":"center","sideOffset":20,"alignOffset":0}"#;

    fn sanitize(raw: &StreamingAction, cx: &mut ExecutionContext<'_>) -> Result<Self, ActionFailure> {
        let fields = &raw.fields;
        let side = match fields.get("side").and_then(Value::as_str) {
            Some("top") => PlaceSide::Top,
            Some("bottom") => PlaceSide::Bottom,
            Some("left") => PlaceSide::Left,
            Some("right") => PlaceSide::Right,
            _ => return Err(ActionFailure::invalid("unknown `side`")),
        };
        let align = match fields.get("align").and_then(Value::as_str) {
            Some("start") => PlaceAlign::Start,
            Some("center") | Some("middle") | None => PlaceAlign::Center,
            Some("end") => PlaceAlign::End,
            Some(_) => return Err(ActionFailure::invalid("unknown `align`")),
        };
        let id = fields::resolve_key(fields, cx, "shapeId")?;
        let reference = fields::resolve_key(fields, cx, "referenceShapeId")?;
        if id == reference {
            return Err(ActionFailure::invalid("a shape cannot be placed relative to itself"));
        }

        Ok(Self {
            intent: fields::intent(fields),
            id,
            reference,
            side,
            align,
            side_offset: fields::number(fields, "sideOffset").unwrap_or(0.0),
            align_offset: fields::number(fields, "alignOffset").unwrap_or(0.0),
        })
    }

    fn info(&self) -> ActionInfo {
        ActionInfo::new(
            ActionIcon::Cursor,
            fields::describe(&self.intent, || {
                format!("Placed {} next to {}", self.id.simple(), self.reference.simple())
            }),
        )
    }

    fn apply(&self, cx: &mut ExecutionContext<'_>) -> Result<(), ActionFailure> {
        let reference = fields::bounds_of(cx, &self.reference)?;
        let bounds = fields::bounds_of(cx, &self.id)?;
        let target = self.target(&reference, Vec2::new(bounds.w, bounds.h));
        fields::translate(cx, &self.id, target.sub(bounds.origin()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BringToFront {
    pub intent: Option<String>,
    pub ids: Vec<ShapeId>,
}

impl Executor for BringToFront {
    const KIND: ActionKind = ActionKind::BringToFront;
    const SUMMARY: &'static str = "Move shapes above every other shape.";
    const EXAMPLE: &'static str = r#"{"_type":"bring-to-front","intent":"Show the label over the box","shapeIds":["label"]}"#;

    fn sanitize(raw: &StreamingAction, cx: &mut ExecutionContext<'_>) -> Result<Self, ActionFailure> {
        Ok(Self {
            intent: fields::intent(&raw.fields),
            ids: fields::resolve_all(&raw.fields, cx, 1)?,
        })
    }

    fn info(&self) -> ActionInfo {
        ActionInfo::new(
            ActionIcon::Layers,
            fields::describe(&self.intent, || "Brought shapes to front".to_string()),
        )
    }

    fn apply(&self, cx: &mut ExecutionContext<'_>) -> Result<(), ActionFailure> {
        let top = cx.canvas.max_index();
        reorder(cx, &self.ids, |rank| top + 1 + rank)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SendToBack {
    pub intent: Option<String>,
    pub ids: Vec<ShapeId>,
}

impl Executor for SendToBack {
    const KIND: ActionKind = ActionKind::SendToBack;
    const SUMMARY: &'static str = "Move shapes below every other shape.";
    const EXAMPLE: &'static str = r#"{"_type":"send-to-back","intent":"Put the background behind","shapeIds":["background"]}"#;

    fn sanitize(raw: &StreamingAction, cx: &mut ExecutionContext<'_>) -> Result<Self, ActionFailure> {
        Ok(Self {
            intent: fields::intent(&raw.fields),
            ids: fields::resolve_all(&raw.fields, cx, 1)?,
        })
    }

    fn info(&self) -> ActionInfo {
        ActionInfo::new(
            ActionIcon::Layers,
            fields::describe(&self.intent, || "Sent shapes to back".to_string()),
        )
    }

    fn apply(&self, cx: &mut ExecutionContext<'_>) -> Result<(), ActionFailure> {
        let bottom = cx.canvas.min_index();
        let count = self.ids.len() as i64;
        reorder(cx, &self.ids, |rank| bottom - count + rank)
    }
}

/// Reassigns z-indices keeping the shapes' current relative order.
fn reorder(
    cx: &mut ExecutionContext<'_>,
    ids: &[ShapeId],
    index_for_rank: impl Fn(i64) -> i64,
) -> Result<(), ActionFailure> {
    let mut shapes = ids
        .iter()
        .map(|id| {
            cx.canvas
                .shape(id)
                .cloned()
                .ok_or_else(|| ActionFailure::ShapeNotFound(id.simple().to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    shapes.sort_by(|a, b| a.index.cmp(&b.index).then_with(|| a.id.cmp(&b.id)));

    for (rank, mut shape) in shapes.into_iter().enumerate() {
        shape.index = index_for_rank(rank as i64);
        cx.canvas.update_shape(shape)?;
    }
    Ok(())
}

fn collect_bounds(
    cx: &ExecutionContext<'_>,
    ids: &[ShapeId],
) -> Result<Vec<(ShapeId, BoxModel)>, ActionFailure> {
    ids.iter()
        .map(|id| fields::bounds_of(cx, id).map(|bounds| (id.clone(), bounds)))
        .collect()
}
