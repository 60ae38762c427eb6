//! Canvas content attached to a request for the model's attention.

use serde::{Deserialize, Serialize};

use crate::geometry::{BoxModel, Vec2};
use crate::shape::ShapeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextSource {
    User,
    Agent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ContextItem {
    Shape {
        shape_id: ShapeId,
        source: ContextSource,
    },
    Shapes {
        shape_ids: Vec<ShapeId>,
        source: ContextSource,
    },
    Area {
        bounds: BoxModel,
        source: ContextSource,
    },
    Point {
        point: Vec2,
        source: ContextSource,
    },
}

impl ContextItem {
    #[must_use]
    pub fn source(&self) -> ContextSource {
        match self {
            Self::Shape { source, .. }
            | Self::Shapes { source, .. }
            | Self::Area { source, .. }
            | Self::Point { source, .. } => *source,
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Shape { .. } => "shape",
            Self::Shapes { .. } => "shapes",
            Self::Area { .. } => "area",
            Self::Point { .. } => "point",
        }
    }

    /// Equality on kind and payload; the source does not participate.
    #[must_use]
    pub fn same_target(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Shape { shape_id: a, .. }, Self::Shape { shape_id: b, .. }) => a == b,
            (Self::Shapes { shape_ids: a, .. }, Self::Shapes { shape_ids: b, .. }) => a == b,
            (Self::Area { bounds: a, .. }, Self::Area { bounds: b, .. }) => a == b,
            (Self::Point { point: a, .. }, Self::Point { point: b, .. }) => a == b,
            _ => false,
        }
    }
}

/// Ordered, deduplicated set of context items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextItems(Vec<ContextItem>);

impl ContextItems {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn items(&self) -> &[ContextItem] {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Inserts `item` unless an equal item is present. Shape groups drop
    /// members already referenced individually; a group left empty is not
    /// inserted. Returns whether anything was added.
    pub fn insert(&mut self, item: ContextItem) -> bool {
        let item = match item {
            ContextItem::Shapes { shape_ids, source } => {
                let mut remaining: Vec<ShapeId> = Vec::with_capacity(shape_ids.len());
                for id in shape_ids {
                    if !self.references_shape(&id) && !remaining.contains(&id) {
                        remaining.push(id);
                    }
                }
                match remaining.len() {
                    0 => return false,
                    1 => ContextItem::Shape {
                        shape_id: remaining.remove(0),
                        source,
                    },
                    _ => ContextItem::Shapes {
                        shape_ids: remaining,
                        source,
                    },
                }
            }
            other => other,
        };

        if self.0.iter().any(|existing| existing.same_target(&item)) {
            return false;
        }
        self.0.push(item);
        true
    }

    pub fn remove(&mut self, item: &ContextItem) -> bool {
        let before = self.0.len();
        self.0.retain(|existing| !existing.same_target(item));
        self.0.len() != before
    }

    fn references_shape(&self, id: &ShapeId) -> bool {
        self.0
            .iter()
            .any(|item| matches!(item, ContextItem::Shape { shape_id, .. } if shape_id == id))
    }
}

impl Extend<ContextItem> for ContextItems {
    fn extend<T: IntoIterator<Item = ContextItem>>(&mut self, iter: T) {
        for item in iter {
            self.insert(item);
        }
    }
}

impl FromIterator<ContextItem> for ContextItems {
    fn from_iter<T: IntoIterator<Item = ContextItem>>(iter: T) -> Self {
        let mut items = Self::new();
        items.extend(iter);
        items
    }
}
