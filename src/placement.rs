//! Non-overlapping placement for newly created content.

use std::time::{Duration, Instant};

use crate::geometry::{BoxModel, Vec2};

pub const DEFAULT_PADDING: f64 = 10.0;
pub const DEFAULT_RESET_AFTER: Duration = Duration::from_millis(2000);

/// Coordinates beyond this magnitude are clamped before solving.
const COORD_LIMIT: f64 = 1.0e9;

/// Obstacle edges are clamped here, past anything a clamped box can reach.
const OBSTACLE_LIMIT: f64 = COORD_LIMIT * 4.0;

/// Relative nudges tried before giving up and dropping far below, in units
/// of the desired box size plus padding.
const FALLBACK_STEPS: [(f64, f64); 6] = [
    (0.0, 1.0),
    (1.0, 1.0),
    (-1.0, 0.0),
    (-1.0, 1.0),
    (0.0, -1.0),
    (1.0, -1.0),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementConfig {
    pub padding: f64,
    /// Idle time after which the recently placed list is forgotten.
    pub reset_after: Duration,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            padding: DEFAULT_PADDING,
            reset_after: DEFAULT_RESET_AFTER,
        }
    }
}

/// Which strategy produced a placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementStrategy {
    Desired,
    Right,
    Below,
    Fallback,
    FarBelow,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub bounds: BoxModel,
    pub strategy: PlacementStrategy,
}

#[derive(Debug, Clone)]
pub struct PlacementSolver {
    config: PlacementConfig,
    recent: Vec<BoxModel>,
    last_placed_at: Option<Instant>,
}

impl Default for PlacementSolver {
    fn default() -> Self {
        Self::new(PlacementConfig::default())
    }
}

impl PlacementSolver {
    #[must_use]
    pub fn new(config: PlacementConfig) -> Self {
        Self {
            config,
            recent: Vec::new(),
            last_placed_at: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> PlacementConfig {
        self.config
    }

    #[must_use]
    pub fn recent(&self) -> &[BoxModel] {
        &self.recent
    }

    pub fn reset(&mut self) {
        self.recent.clear();
        self.last_placed_at = None;
    }

    pub fn place(&mut self, desired: BoxModel, existing: &[BoxModel], viewport: BoxModel) -> Placement {
        self.place_at(desired, existing, viewport, Instant::now())
    }

    /// Finds a box near `desired` that clears every existing and recently
    /// placed box by at least the padding, then remembers it.
    pub fn place_at(
        &mut self,
        desired: BoxModel,
        existing: &[BoxModel],
        viewport: BoxModel,
        now: Instant,
    ) -> Placement {
        if let Some(last) = self.last_placed_at {
            if now.saturating_duration_since(last) >= self.config.reset_after {
                self.recent.clear();
            }
        }

        let viewport = clamp_viewport(viewport);
        let desired = clamp_desired(desired, viewport);
        let obstacles: Vec<BoxModel> = existing
            .iter()
            .chain(self.recent.iter())
            .filter(|bounds| bounds.is_finite())
            .map(clamp_obstacle)
            .collect();

        let placement = self.solve(desired, &obstacles, viewport);
        self.recent.push(placement.bounds);
        self.last_placed_at = Some(now);
        placement
    }

    fn solve(&self, desired: BoxModel, obstacles: &[BoxModel], viewport: BoxModel) -> Placement {
        let pad = self.config.padding;
        let is_free = |candidate: &BoxModel| {
            let padded = candidate.expanded(pad);
            !obstacles.iter().any(|other| padded.intersects(other))
        };

        if is_free(&desired) {
            return Placement {
                bounds: desired,
                strategy: PlacementStrategy::Desired,
            };
        }

        let lowest_bottom = obstacles
            .iter()
            .map(BoxModel::max_y)
            .fold(f64::NEG_INFINITY, f64::max);
        let leftmost = obstacles
            .iter()
            .map(BoxModel::min_x)
            .fold(f64::INFINITY, f64::min);
        let rightmost_in_band = obstacles
            .iter()
            .filter(|other| other.min_y() < desired.max_y() + pad && other.max_y() > desired.min_y() - pad)
            .map(BoxModel::max_x)
            .fold(f64::NEG_INFINITY, f64::max);

        if rightmost_in_band.is_finite() {
            let right = BoxModel::new(rightmost_in_band + pad, desired.y, desired.w, desired.h);
            if right.max_x() <= viewport.max_x() && is_free(&right) {
                return Placement {
                    bounds: right,
                    strategy: PlacementStrategy::Right,
                };
            }
        }

        if lowest_bottom.is_finite() && leftmost.is_finite() {
            let below = BoxModel::new(leftmost, lowest_bottom + pad, desired.w, desired.h);
            if below.max_y() <= viewport.max_y() && is_free(&below) {
                return Placement {
                    bounds: below,
                    strategy: PlacementStrategy::Below,
                };
            }
        }

        let step = Vec2::new(desired.w + pad, desired.h + pad);
        for (dx, dy) in FALLBACK_STEPS {
            let candidate = desired.translated(Vec2::new(dx * step.x, dy * step.y));
            if is_free(&candidate) {
                return Placement {
                    bounds: candidate,
                    strategy: PlacementStrategy::Fallback,
                };
            }
        }

        // Nothing above lowest_bottom can reach this far down.
        let floor = if lowest_bottom.is_finite() {
            lowest_bottom
        } else {
            desired.max_y()
        };
        Placement {
            bounds: BoxModel::new(desired.x, floor + pad * 4.0, desired.w, desired.h),
            strategy: PlacementStrategy::FarBelow,
        }
    }
}

fn clamp_coord(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(-COORD_LIMIT, COORD_LIMIT)
    } else {
        fallback
    }
}

fn clamp_extent(value: f64) -> f64 {
    if value.is_finite() {
        value.abs().min(COORD_LIMIT)
    } else {
        0.0
    }
}

fn clamp_viewport(viewport: BoxModel) -> BoxModel {
    BoxModel::new(
        clamp_coord(viewport.x, 0.0),
        clamp_coord(viewport.y, 0.0),
        clamp_extent(viewport.w),
        clamp_extent(viewport.h),
    )
}

fn clamp_obstacle(bounds: &BoxModel) -> BoxModel {
    let clamp = |value: f64| value.clamp(-OBSTACLE_LIMIT, OBSTACLE_LIMIT);
    let (x0, x1) = (clamp(bounds.min_x()), clamp(bounds.max_x()));
    let (y0, y1) = (clamp(bounds.min_y()), clamp(bounds.max_y()));
    BoxModel::new(x0.min(x1), y0.min(y1), (x1 - x0).abs(), (y1 - y0).abs())
}

/// Non-finite coordinates center the box on the viewport.
fn clamp_desired(desired: BoxModel, viewport: BoxModel) -> BoxModel {
    let w = clamp_extent(desired.w);
    let h = clamp_extent(desired.h);
    let center = viewport.center();
    BoxModel::new(
        clamp_coord(desired.x, center.x - w / 2.0),
        clamp_coord(desired.y, center.y - h / 2.0),
        w,
        h,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIEWPORT: BoxModel = BoxModel::new(0.0, 0.0, 1000.0, 800.0);

    #[test]
    fn free_spot_is_accepted_as_is() {
        let mut solver = PlacementSolver::default();
        let desired = BoxModel::new(100.0, 100.0, 50.0, 50.0);
        let placement = solver.place(desired, &[], VIEWPORT);
        assert_eq!(placement.bounds, desired);
        assert_eq!(placement.strategy, PlacementStrategy::Desired);
        assert_eq!(solver.recent(), &[desired]);
    }

    #[test]
    fn huge_obstacles_are_clamped_before_dropping_below() {
        let mut solver = PlacementSolver::default();
        let pad = solver.config().padding;
        let existing = [
            BoxModel::new(-10.0, -10.0, 2000.0, 2000.0),
            BoxModel::new(0.0, 1.0e20, 100.0, 10.0),
        ];

        let placement = solver.place(BoxModel::new(0.0, 0.0, 100.0, 40.0), &existing, VIEWPORT);

        assert_eq!(placement.strategy, PlacementStrategy::FarBelow);
        assert_eq!(placement.bounds.y, OBSTACLE_LIMIT + pad * 4.0);
        for other in &existing {
            assert!(!placement.bounds.expanded(pad).intersects(other));
        }
    }

    #[test]
    fn blocked_spot_shifts_right_of_the_band() {
        let mut solver = PlacementSolver::default();
        let existing = [BoxModel::new(0.0, 0.0, 100.0, 40.0)];
        let placement = solver.place(BoxModel::new(0.0, 0.0, 100.0, 40.0), &existing, VIEWPORT);
        assert_eq!(placement.strategy, PlacementStrategy::Right);
        assert_eq!(placement.bounds, BoxModel::new(110.0, 0.0, 100.0, 40.0));
    }

    #[test]
    fn drops_below_when_right_leaves_the_viewport() {
        let mut solver = PlacementSolver::default();
        let existing = [BoxModel::new(0.0, 0.0, 950.0, 40.0)];
        let placement = solver.place(BoxModel::new(0.0, 0.0, 100.0, 40.0), &existing, VIEWPORT);
        assert_eq!(placement.strategy, PlacementStrategy::Below);
        assert_eq!(placement.bounds, BoxModel::new(0.0, 50.0, 100.0, 40.0));
    }

    #[test]
    fn recent_boxes_are_avoided_until_the_reset_window_passes() {
        let mut solver = PlacementSolver::default();
        let start = Instant::now();
        let desired = BoxModel::new(0.0, 0.0, 50.0, 20.0);

        let first = solver.place_at(desired, &[], VIEWPORT, start);
        let second = solver.place_at(desired, &[], VIEWPORT, start + Duration::from_millis(100));
        assert_eq!(first.bounds, desired);
        assert_ne!(second.bounds, desired);

        let later = start + Duration::from_millis(100) + DEFAULT_RESET_AFTER;
        let third = solver.place_at(desired, &[], VIEWPORT, later);
        assert_eq!(third.bounds, desired);
    }

    #[test]
    fn non_finite_desired_falls_back_to_viewport_center() {
        let mut solver = PlacementSolver::default();
        let placement = solver.place(BoxModel::new(f64::NAN, f64::INFINITY, 100.0, 50.0), &[], VIEWPORT);
        assert_eq!(placement.bounds, BoxModel::new(450.0, 375.0, 100.0, 50.0));
    }

    #[test]
    fn crowded_canvas_ends_far_below() {
        let mut solver = PlacementSolver::default();
        let existing = [BoxModel::new(-5000.0, -5000.0, 10_000.0, 10_000.0)];
        let placement = solver.place(BoxModel::new(0.0, 0.0, 10.0, 10.0), &existing, VIEWPORT);
        assert_eq!(placement.strategy, PlacementStrategy::FarBelow);
        assert_eq!(placement.bounds.y, 5000.0 + 40.0);
    }
}
