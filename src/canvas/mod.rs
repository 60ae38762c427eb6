//! Canvas-engine boundary.
//!
//! The agent never owns shape state. It talks to an engine through
//! [`Canvas`], which must be able to capture a block of mutations as one
//! reversible [`Diff`] and to reverse such a diff later. [`MemoryCanvas`] is
//! the in-process engine used by the runtime and the tests.

mod diff;
mod memory;

use thiserror::Error;

use crate::geometry::BoxModel;
use crate::shape::{Binding, BindingId, Shape, ShapeId};

pub use diff::{Change, Diff, DiffSummary};
pub use memory::MemoryCanvas;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CanvasError {
    #[error("shape not found: {0}")]
    ShapeNotFound(ShapeId),
    #[error("shape already exists: {0}")]
    DuplicateShape(ShapeId),
    #[error("binding not found: {}", .0.as_str())]
    BindingNotFound(BindingId),
    #[error("invalid binding {}: {reason}", .id.as_str())]
    InvalidBinding { id: BindingId, reason: String },
    #[error("invalid shape {id}: {reason}")]
    InvalidShape { id: ShapeId, reason: String },
    #[error("history mark not found: {0}")]
    MarkNotFound(String),
}

/// Options for one captured mutation block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureOptions {
    /// When false the block is invisible to undo history.
    pub history: bool,
}

impl CaptureOptions {
    pub const RECORDED: Self = Self { history: true };
    pub const EPHEMERAL: Self = Self { history: false };
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self::RECORDED
    }
}

/// Named point in undo history.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MarkId {
    pub seq: u64,
    pub name: String,
}

/// Outcome of reversing a diff. Entries changed since by someone else are
/// left alone and listed in `skipped`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReverseReport {
    pub reverted: usize,
    pub skipped: Vec<ShapeId>,
}

pub trait Canvas {
    fn shape(&self, id: &ShapeId) -> Option<&Shape>;

    /// Shapes on the active page in ascending z-order.
    fn page_shapes(&self) -> Vec<&Shape>;

    fn bindings(&self) -> Vec<&Binding>;

    fn binding(&self, id: &BindingId) -> Option<&Binding>;

    fn create_shape(&mut self, shape: Shape) -> Result<(), CanvasError>;

    fn update_shape(&mut self, shape: Shape) -> Result<(), CanvasError>;

    /// Removes a shape and every binding that references it.
    fn delete_shape(&mut self, id: &ShapeId) -> Result<Shape, CanvasError>;

    fn create_binding(&mut self, binding: Binding) -> Result<(), CanvasError>;

    fn delete_binding(&mut self, id: &BindingId) -> Result<Binding, CanvasError>;

    fn selection(&self) -> Vec<ShapeId>;

    fn set_selection(&mut self, ids: Vec<ShapeId>);

    fn viewport(&self) -> BoxModel;

    fn set_viewport(&mut self, viewport: BoxModel);

    /// Starts recording mutations. Captures do not nest.
    fn begin_capture(&mut self, options: CaptureOptions);

    /// Stops recording and returns everything changed since `begin_capture`.
    fn end_capture(&mut self) -> Diff;

    /// Applies the inverse of `diff`, skipping records whose current value no
    /// longer matches the diff's `after`.
    fn reverse_diff(&mut self, diff: &Diff) -> ReverseReport;

    /// Reverts the most recent recorded change set. Returns false when there
    /// is nothing to undo.
    fn undo(&mut self) -> bool;

    /// Pushes an already captured diff onto undo history as one step.
    fn record_undo(&mut self, diff: Diff);

    fn mark(&mut self, name: &str) -> MarkId;

    /// Reverts every recorded change made after `mark`.
    fn bail_to_mark(&mut self, mark: &MarkId) -> Result<(), CanvasError>;

    /// Drains changes made outside of any capture (user edits).
    fn take_user_changes(&mut self) -> Diff;

    fn shape_bounds(&self, id: &ShapeId) -> Option<BoxModel> {
        self.shape(id).map(Shape::bounds)
    }

    fn has_shape(&self, id: &ShapeId) -> bool {
        self.shape(id).is_some()
    }

    fn max_index(&self) -> i64 {
        self.page_shapes()
            .iter()
            .map(|shape| shape.index)
            .max()
            .unwrap_or(0)
    }

    fn min_index(&self) -> i64 {
        self.page_shapes()
            .iter()
            .map(|shape| shape.index)
            .min()
            .unwrap_or(0)
    }

    /// Bounds of every shape that intersects `area`.
    fn shapes_in(&self, area: &BoxModel) -> Vec<&Shape> {
        self.page_shapes()
            .into_iter()
            .filter(|shape| shape.bounds().intersects(area) || area.contains(&shape.bounds()))
            .collect()
    }
}

/// Runs `block` inside a capture and returns its result with the diff.
pub fn capture<R>(
    canvas: &mut dyn Canvas,
    options: CaptureOptions,
    block: impl FnOnce(&mut dyn Canvas) -> R,
) -> (R, Diff) {
    canvas.begin_capture(options);
    let result = block(&mut *canvas);
    let diff = canvas.end_capture();
    (result, diff)
}
