use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::shape::{Binding, BindingId, Shape, ShapeId};

/// Before/after pair for one record. `None` means absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change<T> {
    pub before: Option<T>,
    pub after: Option<T>,
}

impl<T: Clone + PartialEq> Change<T> {
    #[must_use]
    pub fn inverted(&self) -> Self {
        Self {
            before: self.after.clone(),
            after: self.before.clone(),
        }
    }

    fn is_noop(&self) -> bool {
        self.before == self.after
    }
}

/// Everything a block of mutations added, changed or removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    #[serde(default)]
    pub shapes: BTreeMap<ShapeId, Change<Shape>>,
    #[serde(default)]
    pub bindings: BTreeMap<BindingId, Change<Binding>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

impl Diff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty() && self.bindings.is_empty()
    }

    /// Folds a shape change in, keeping the earliest `before`.
    pub fn record_shape(&mut self, id: ShapeId, before: Option<Shape>, after: Option<Shape>) {
        record(&mut self.shapes, id, before, after);
    }

    pub fn record_binding(&mut self, id: BindingId, before: Option<Binding>, after: Option<Binding>) {
        record(&mut self.bindings, id, before, after);
    }

    /// Appends a later diff onto this one.
    pub fn squash(&mut self, later: Diff) {
        for (id, change) in later.shapes {
            record(&mut self.shapes, id, change.before, change.after);
        }
        for (id, change) in later.bindings {
            record(&mut self.bindings, id, change.before, change.after);
        }
    }

    #[must_use]
    pub fn inverted(&self) -> Self {
        Self {
            shapes: self
                .shapes
                .iter()
                .map(|(id, change)| (id.clone(), change.inverted()))
                .collect(),
            bindings: self
                .bindings
                .iter()
                .map(|(id, change)| (id.clone(), change.inverted()))
                .collect(),
        }
    }

    #[must_use]
    pub fn summary(&self) -> DiffSummary {
        let mut summary = DiffSummary::default();
        for change in self.shapes.values() {
            match (&change.before, &change.after) {
                (None, Some(_)) => summary.added += 1,
                (Some(_), Some(_)) => summary.updated += 1,
                (Some(_), None) => summary.removed += 1,
                (None, None) => {}
            }
        }
        summary
    }

    pub fn added_shapes(&self) -> impl Iterator<Item = &Shape> {
        self.shapes
            .values()
            .filter(|change| change.before.is_none())
            .filter_map(|change| change.after.as_ref())
    }

    pub fn touched_shape_ids(&self) -> impl Iterator<Item = &ShapeId> {
        self.shapes.keys()
    }
}

fn record<K: Ord, T: Clone + PartialEq>(
    map: &mut BTreeMap<K, Change<T>>,
    key: K,
    before: Option<T>,
    after: Option<T>,
) {
    let merged = match map.remove(&key) {
        Some(existing) => Change {
            before: existing.before,
            after,
        },
        None => Change { before, after },
    };

    if !merged.is_noop() {
        map.insert(key, merged);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Vec2;
    use crate::shape::ShapeKind;

    fn note(id: &str, x: f64) -> Shape {
        Shape::new(
            ShapeId::new(id),
            Vec2::new(x, 0.0),
            ShapeKind::Note {
                text: String::new(),
            },
        )
    }

    #[test]
    fn squashing_keeps_earliest_before_and_latest_after() {
        let mut diff = Diff::default();
        diff.record_shape(ShapeId::new("a"), Some(note("a", 0.0)), Some(note("a", 10.0)));
        diff.record_shape(ShapeId::new("a"), Some(note("a", 10.0)), Some(note("a", 20.0)));

        let change = &diff.shapes[&ShapeId::new("a")];
        assert_eq!(change.before, Some(note("a", 0.0)));
        assert_eq!(change.after, Some(note("a", 20.0)));
    }

    #[test]
    fn create_then_delete_cancels_out() {
        let mut diff = Diff::default();
        diff.record_shape(ShapeId::new("a"), None, Some(note("a", 0.0)));
        diff.record_shape(ShapeId::new("a"), Some(note("a", 0.0)), None);
        assert!(diff.is_empty());
    }

    #[test]
    fn summary_counts_by_change_kind() {
        let mut diff = Diff::default();
        diff.record_shape(ShapeId::new("a"), None, Some(note("a", 0.0)));
        diff.record_shape(ShapeId::new("b"), Some(note("b", 0.0)), Some(note("b", 1.0)));
        diff.record_shape(ShapeId::new("c"), Some(note("c", 0.0)), None);
        assert_eq!(
            diff.summary(),
            DiffSummary {
                added: 1,
                updated: 1,
                removed: 1
            }
        );
        assert_eq!(diff.inverted().summary().added, 1);
    }
}
