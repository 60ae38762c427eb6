use std::collections::BTreeMap;

use tracing::debug;

use super::{Canvas, CanvasError, CaptureOptions, Diff, MarkId, ReverseReport};
use crate::geometry::BoxModel;
use crate::shape::{Binding, BindingId, Shape, ShapeId, ShapeKind, Terminal};

const DEFAULT_VIEWPORT: BoxModel = BoxModel::new(0.0, 0.0, 1280.0, 800.0);

#[derive(Debug, Clone)]
struct ActiveCapture {
    options: CaptureOptions,
    diff: Diff,
}

#[derive(Debug, Clone)]
enum UndoEntry {
    Mark(MarkId),
    Changes(Diff),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteLog {
    /// Into the active capture, or the user log when none is active.
    Tracked,
    /// Reversals and undo replay: no user log, still captured if active.
    Replay,
}

/// In-process canvas engine with capture, undo marks and a user-edit log.
#[derive(Debug, Clone)]
pub struct MemoryCanvas {
    shapes: BTreeMap<ShapeId, Shape>,
    bindings: BTreeMap<BindingId, Binding>,
    selection: Vec<ShapeId>,
    viewport: BoxModel,
    capture: Option<ActiveCapture>,
    undo: Vec<UndoEntry>,
    user_changes: Diff,
    next_mark: u64,
}

impl Default for MemoryCanvas {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCanvas {
    #[must_use]
    pub fn new() -> Self {
        Self {
            shapes: BTreeMap::new(),
            bindings: BTreeMap::new(),
            selection: Vec::new(),
            viewport: DEFAULT_VIEWPORT,
            capture: None,
            undo: Vec::new(),
            user_changes: Diff::default(),
            next_mark: 1,
        }
    }

    #[must_use]
    pub fn with_viewport(mut self, viewport: BoxModel) -> Self {
        self.viewport = viewport;
        self
    }

    #[must_use]
    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }

    /// Snapshot of every shape, for comparisons in tests and persistence.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Shape> {
        self.shapes.values().cloned().collect()
    }

    fn write_shape(&mut self, id: ShapeId, after: Option<Shape>, log: WriteLog) {
        let before = match &after {
            Some(shape) => self.shapes.insert(id.clone(), shape.clone()),
            None => self.shapes.remove(&id),
        };
        self.selection.retain(|selected| self.shapes.contains_key(selected));

        if let Some(active) = self.capture.as_mut() {
            active.diff.record_shape(id, before, after);
        } else if log == WriteLog::Tracked {
            let mut single = Diff::default();
            single.record_shape(id.clone(), before.clone(), after.clone());
            self.user_changes.record_shape(id, before, after);
            self.undo.push(UndoEntry::Changes(single));
        }
    }

    fn write_binding(&mut self, id: BindingId, after: Option<Binding>, log: WriteLog) {
        let before = match &after {
            Some(binding) => self.bindings.insert(id.clone(), binding.clone()),
            None => self.bindings.remove(&id),
        };

        if let Some(active) = self.capture.as_mut() {
            active.diff.record_binding(id, before, after);
        } else if log == WriteLog::Tracked {
            let mut single = Diff::default();
            single.record_binding(id.clone(), before.clone(), after.clone());
            self.user_changes.record_binding(id, before, after);
            self.undo.push(UndoEntry::Changes(single));
        }
    }

    /// Applies every record of `diff` regardless of current state.
    fn force_apply(&mut self, diff: &Diff) {
        for (id, change) in &diff.shapes {
            self.write_shape(id.clone(), change.after.clone(), WriteLog::Replay);
        }
        for (id, change) in &diff.bindings {
            self.write_binding(id.clone(), change.after.clone(), WriteLog::Replay);
        }
    }

    /// Moves bound arrow terminals so they keep pointing at their anchors.
    fn follow_bindings(&mut self, target: &ShapeId) {
        let Some(target_bounds) = self.shapes.get(target).map(Shape::bounds) else {
            return;
        };

        let attached: Vec<Binding> = self
            .bindings
            .values()
            .filter(|binding| &binding.target == target)
            .cloned()
            .collect();

        for binding in attached {
            let Some(mut arrow) = self.shapes.get(&binding.arrow).cloned() else {
                continue;
            };
            let point = binding.page_point(&target_bounds).sub(arrow.position());
            if let ShapeKind::Arrow { start, end, .. } = &mut arrow.kind {
                match binding.terminal {
                    Terminal::Start => *start = point,
                    Terminal::End => *end = point,
                }
                self.write_shape(binding.arrow.clone(), Some(arrow), WriteLog::Tracked);
            }
        }
    }
}

impl Canvas for MemoryCanvas {
    fn shape(&self, id: &ShapeId) -> Option<&Shape> {
        self.shapes.get(id)
    }

    fn page_shapes(&self) -> Vec<&Shape> {
        let mut shapes: Vec<&Shape> = self.shapes.values().collect();
        shapes.sort_by(|a, b| a.index.cmp(&b.index).then_with(|| a.id.cmp(&b.id)));
        shapes
    }

    fn bindings(&self) -> Vec<&Binding> {
        self.bindings.values().collect()
    }

    fn binding(&self, id: &BindingId) -> Option<&Binding> {
        self.bindings.get(id)
    }

    fn create_shape(&mut self, shape: Shape) -> Result<(), CanvasError> {
        if self.shapes.contains_key(&shape.id) {
            return Err(CanvasError::DuplicateShape(shape.id));
        }
        if !shape.bounds().is_finite() {
            return Err(CanvasError::InvalidShape {
                id: shape.id,
                reason: "non-finite geometry".to_string(),
            });
        }

        self.write_shape(shape.id.clone(), Some(shape), WriteLog::Tracked);
        Ok(())
    }

    fn update_shape(&mut self, shape: Shape) -> Result<(), CanvasError> {
        if !self.shapes.contains_key(&shape.id) {
            return Err(CanvasError::ShapeNotFound(shape.id));
        }
        if !shape.bounds().is_finite() {
            return Err(CanvasError::InvalidShape {
                id: shape.id,
                reason: "non-finite geometry".to_string(),
            });
        }

        let id = shape.id.clone();
        self.write_shape(id.clone(), Some(shape), WriteLog::Tracked);
        self.follow_bindings(&id);
        Ok(())
    }

    fn delete_shape(&mut self, id: &ShapeId) -> Result<Shape, CanvasError> {
        let Some(existing) = self.shapes.get(id).cloned() else {
            return Err(CanvasError::ShapeNotFound(id.clone()));
        };

        let dangling: Vec<BindingId> = self
            .bindings
            .values()
            .filter(|binding| &binding.arrow == id || &binding.target == id)
            .map(|binding| binding.id.clone())
            .collect();
        for binding_id in dangling {
            self.write_binding(binding_id, None, WriteLog::Tracked);
        }

        self.write_shape(id.clone(), None, WriteLog::Tracked);
        Ok(existing)
    }

    fn create_binding(&mut self, binding: Binding) -> Result<(), CanvasError> {
        let is_arrow = matches!(
            self.shapes.get(&binding.arrow).map(|shape| &shape.kind),
            Some(ShapeKind::Arrow { .. })
        );
        if !is_arrow {
            return Err(CanvasError::InvalidBinding {
                id: binding.id,
                reason: format!("{} is not an arrow", binding.arrow),
            });
        }
        if !self.shapes.contains_key(&binding.target) {
            return Err(CanvasError::ShapeNotFound(binding.target));
        }
        if binding.arrow == binding.target {
            return Err(CanvasError::InvalidBinding {
                id: binding.id,
                reason: "arrow cannot bind to itself".to_string(),
            });
        }

        self.write_binding(binding.id.clone(), Some(binding), WriteLog::Tracked);
        Ok(())
    }

    fn delete_binding(&mut self, id: &BindingId) -> Result<Binding, CanvasError> {
        let Some(existing) = self.bindings.get(id).cloned() else {
            return Err(CanvasError::BindingNotFound(id.clone()));
        };
        self.write_binding(id.clone(), None, WriteLog::Tracked);
        Ok(existing)
    }

    fn selection(&self) -> Vec<ShapeId> {
        self.selection.clone()
    }

    fn set_selection(&mut self, ids: Vec<ShapeId>) {
        self.selection = ids
            .into_iter()
            .filter(|id| self.shapes.contains_key(id))
            .collect();
    }

    fn viewport(&self) -> BoxModel {
        self.viewport
    }

    fn set_viewport(&mut self, viewport: BoxModel) {
        if viewport.is_finite() && viewport.w > 0.0 && viewport.h > 0.0 {
            self.viewport = viewport;
        }
    }

    fn begin_capture(&mut self, options: CaptureOptions) {
        if self.capture.is_some() {
            debug!("capture already active, folding nested block into it");
            return;
        }
        self.capture = Some(ActiveCapture {
            options,
            diff: Diff::default(),
        });
    }

    fn end_capture(&mut self) -> Diff {
        let Some(active) = self.capture.take() else {
            return Diff::default();
        };

        if active.options.history && !active.diff.is_empty() {
            self.undo.push(UndoEntry::Changes(active.diff.clone()));
        }
        active.diff
    }

    fn reverse_diff(&mut self, diff: &Diff) -> ReverseReport {
        let mut report = ReverseReport::default();

        for (id, change) in &diff.shapes {
            if self.shapes.get(id) == change.after.as_ref() {
                self.write_shape(id.clone(), change.before.clone(), WriteLog::Replay);
                report.reverted += 1;
            } else {
                report.skipped.push(id.clone());
            }
        }

        for (id, change) in &diff.bindings {
            let endpoints_present = change.before.as_ref().map_or(true, |binding| {
                self.shapes.contains_key(&binding.arrow) && self.shapes.contains_key(&binding.target)
            });
            if self.bindings.get(id) == change.after.as_ref() && endpoints_present {
                self.write_binding(id.clone(), change.before.clone(), WriteLog::Replay);
            }
        }

        if !report.skipped.is_empty() {
            debug!(skipped = report.skipped.len(), "left shapes edited since capture untouched");
        }
        report
    }

    fn undo(&mut self) -> bool {
        while let Some(entry) = self.undo.pop() {
            if let UndoEntry::Changes(diff) = entry {
                self.force_apply(&diff.inverted());
                return true;
            }
        }
        false
    }

    fn record_undo(&mut self, diff: Diff) {
        if !diff.is_empty() {
            self.undo.push(UndoEntry::Changes(diff));
        }
    }

    fn mark(&mut self, name: &str) -> MarkId {
        let mark = MarkId {
            seq: self.next_mark,
            name: name.to_string(),
        };
        self.next_mark += 1;
        self.undo.push(UndoEntry::Mark(mark.clone()));
        mark
    }

    fn bail_to_mark(&mut self, mark: &MarkId) -> Result<(), CanvasError> {
        let position = self
            .undo
            .iter()
            .rposition(|entry| matches!(entry, UndoEntry::Mark(existing) if existing == mark))
            .ok_or_else(|| CanvasError::MarkNotFound(mark.name.clone()))?;

        let later = self.undo.split_off(position + 1);
        for entry in later.into_iter().rev() {
            if let UndoEntry::Changes(diff) = entry {
                self.force_apply(&diff.inverted());
            }
        }
        Ok(())
    }

    fn take_user_changes(&mut self) -> Diff {
        std::mem::take(&mut self.user_changes)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::canvas::capture;
    use crate::geometry::Vec2;
    use crate::shape::GeoKind;

    fn rect(id: &str, x: f64, y: f64) -> Shape {
        Shape::new(
            ShapeId::new(id),
            Vec2::new(x, y),
            ShapeKind::Geo {
                geo: GeoKind::Rectangle,
                w: 100.0,
                h: 100.0,
                text: String::new(),
            },
        )
    }

    fn arrow(id: &str) -> Shape {
        Shape::new(
            ShapeId::new(id),
            Vec2::new(0.0, 0.0),
            ShapeKind::Arrow {
                start: Vec2::new(0.0, 0.0),
                end: Vec2::new(50.0, 50.0),
                bend: 0.0,
                text: String::new(),
            },
        )
    }

    #[test]
    fn capture_then_reverse_restores_previous_state() {
        let mut canvas = MemoryCanvas::new();
        canvas.create_shape(rect("a", 0.0, 0.0)).expect("create a");
        let baseline = canvas.snapshot();
        canvas.take_user_changes();

        let (_, diff) = capture(&mut canvas, CaptureOptions::EPHEMERAL, |canvas| {
            canvas.create_shape(rect("b", 200.0, 0.0)).expect("create b");
            canvas
                .update_shape(rect("a", 10.0, 10.0))
                .expect("move a");
        });
        assert_eq!(diff.summary().added, 1);
        assert_eq!(diff.summary().updated, 1);

        let report = canvas.reverse_diff(&diff);
        assert_eq!(report.reverted, 2);
        assert_eq!(canvas.snapshot(), baseline);
        assert!(canvas.take_user_changes().is_empty());
    }

    #[test]
    fn reverse_skips_shapes_the_user_edited_afterwards() {
        let mut canvas = MemoryCanvas::new();
        let (_, diff) = capture(&mut canvas, CaptureOptions::RECORDED, |canvas| {
            canvas.create_shape(rect("a", 0.0, 0.0)).expect("create a");
        });

        canvas.update_shape(rect("a", 300.0, 300.0)).expect("user move");
        let report = canvas.reverse_diff(&diff);

        assert_eq!(report.reverted, 0);
        assert_eq!(report.skipped, vec![ShapeId::new("a")]);
        assert_eq!(canvas.shape(&ShapeId::new("a")).map(|s| s.x), Some(300.0));
    }

    #[test]
    fn bail_to_mark_reverts_later_changes_only() {
        let mut canvas = MemoryCanvas::new();
        canvas.create_shape(rect("keep", 0.0, 0.0)).expect("create keep");
        let mark = canvas.mark("before-batch");

        let _ = capture(&mut canvas, CaptureOptions::RECORDED, |canvas| {
            canvas.create_shape(rect("gone", 0.0, 0.0)).expect("create gone");
            canvas.delete_shape(&ShapeId::new("keep")).expect("delete keep");
        });

        canvas.bail_to_mark(&mark).expect("mark exists");
        assert!(canvas.has_shape(&ShapeId::new("keep")));
        assert!(!canvas.has_shape(&ShapeId::new("gone")));
        assert!(canvas.bail_to_mark(&MarkId { seq: 99, name: "x".into() }).is_err());
    }

    #[test]
    fn ephemeral_capture_is_not_undoable() {
        let mut canvas = MemoryCanvas::new();
        let _ = capture(&mut canvas, CaptureOptions::EPHEMERAL, |canvas| {
            canvas.create_shape(rect("a", 0.0, 0.0)).expect("create a");
        });
        assert!(!canvas.undo());
        assert!(canvas.has_shape(&ShapeId::new("a")));
    }

    #[test]
    fn ephemeral_diff_recorded_later_is_undoable() {
        let mut canvas = MemoryCanvas::new();
        let mark = canvas.mark("turn");
        let ((), diff) = capture(&mut canvas, CaptureOptions::EPHEMERAL, |canvas| {
            canvas.create_shape(rect("a", 0.0, 0.0)).expect("create a");
        });
        canvas.record_undo(diff);
        canvas.record_undo(Diff::default());

        canvas.bail_to_mark(&mark).expect("mark exists");
        assert!(!canvas.has_shape(&ShapeId::new("a")));
        assert!(!canvas.undo());
    }

    #[test]
    fn deleting_target_removes_binding_and_moving_target_drags_arrow() {
        let mut canvas = MemoryCanvas::new();
        canvas.create_shape(rect("t", 100.0, 100.0)).expect("target");
        canvas.create_shape(arrow("arr")).expect("arrow");
        canvas
            .create_binding(Binding::new(
                ShapeId::new("arr"),
                ShapeId::new("t"),
                Terminal::End,
                Vec2::new(0.5, 0.5),
            ))
            .expect("binding");

        canvas.update_shape(rect("t", 200.0, 100.0)).expect("move target");
        let moved = canvas.shape(&ShapeId::new("arr")).expect("arrow exists");
        assert!(matches!(moved.kind, ShapeKind::Arrow { end, .. } if end == Vec2::new(250.0, 150.0)));

        canvas.delete_shape(&ShapeId::new("t")).expect("delete target");
        assert!(canvas.bindings().is_empty());
    }

    #[test]
    fn binding_requires_an_arrow() {
        let mut canvas = MemoryCanvas::new();
        canvas.create_shape(rect("a", 0.0, 0.0)).expect("a");
        canvas.create_shape(rect("b", 0.0, 0.0)).expect("b");
        let error = canvas
            .create_binding(Binding::new(
                ShapeId::new("a"),
                ShapeId::new("b"),
                Terminal::Start,
                Vec2::new(0.5, 0.5),
            ))
            .expect_err("rectangles cannot bind");
        assert!(matches!(error, CanvasError::InvalidBinding { .. }));
    }
}
