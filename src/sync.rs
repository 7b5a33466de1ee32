use crate::{
    build::{BuildEvent, BuildService},
    config::MprConfig,
    dicom_source::SeriesInfo,
    enums::{ViewKind, ViewStatus},
    plane::{PlaneBasis, PlaneGeometry, axis_vector},
    reconstructor::Slice,
    viewport::{Delta, Interaction, RenderedFrame, ViewId, Viewport},
};

use log::debug;
use nalgebra::Vector3;
use std::{collections::BTreeSet, sync::Arc, time::Duration};

const PARALLEL_EPSILON: f64 = 1e-9;
const AXIS_ALIGNED_EPSILON: f64 = 1e-6;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineOrientation {
    Horizontal,
    Vertical,
}

/// Where another view's plane cuts the consumer's raster, in the
/// consumer's pixel coordinates `(column, row)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CrossReferenceLine {
    Segment {
        source: ViewId,
        start: (f64, f64),
        end: (f64, f64),
        /// Screen angle of the line in `[0, 180)`, clockwise from the
        /// raster's column axis.
        angle_degrees: f64,
    },
    Axis {
        source: ViewId,
        orientation: LineOrientation,
        position: f64,
    },
}

/// Outcome of one dispatched interaction.
#[derive(Clone, Debug, PartialEq)]
pub struct Propagation {
    pub origin: ViewId,
    pub origin_applied: bool,
    /// Siblings the delta was re-applied to, in id order.
    pub applied_to: Vec<ViewId>,
}

/// Coordinates a set of views: the active set, delta propagation,
/// reconstruction requests and cross-reference geometry.
pub struct ViewportSyncController {
    config: MprConfig,
    views: Vec<Viewport>,
    active: BTreeSet<ViewId>,
    builds: BuildService,
}

impl ViewportSyncController {
    pub fn new(config: MprConfig, kinds: &[ViewKind]) -> Self {
        let views = kinds
            .iter()
            .enumerate()
            .map(|(id, kind)| Viewport::new(id, *kind, config.clone()))
            .collect::<Vec<_>>();
        let active = views.first().map(|view| view.id()).into_iter().collect();
        Self {
            builds: BuildService::new(config.clone()),
            config,
            views,
            active,
        }
    }

    pub fn config(&self) -> &MprConfig {
        &self.config
    }

    pub fn views(&self) -> &[Viewport] {
        &self.views
    }

    pub fn view(&self, id: ViewId) -> Option<&Viewport> {
        self.views.get(id)
    }

    pub fn view_mut(&mut self, id: ViewId) -> Option<&mut Viewport> {
        self.views.get_mut(id)
    }

    pub fn active(&self) -> &BTreeSet<ViewId> {
        &self.active
    }

    pub fn is_active(&self, id: ViewId) -> bool {
        self.active.contains(&id)
    }

    /// A plain click makes `id` the only active view; a modified click
    /// toggles it, never emptying the set.
    pub fn select(&mut self, id: ViewId, modified: bool) {
        if id >= self.views.len() {
            return;
        }
        if !modified {
            self.active.clear();
            self.active.insert(id);
        } else if self.active.contains(&id) {
            if self.active.len() > 1 {
                self.active.remove(&id);
            } else {
                debug!("view {id} is the last active view, keeping it");
            }
        } else {
            self.active.insert(id);
        }
    }

    /// Apply `interaction` on `origin`, then re-apply the same delta once to
    /// every other active view if `origin` is active and actually changed.
    pub fn dispatch(&mut self, origin: ViewId, interaction: Interaction) -> Propagation {
        let mut propagation = Propagation {
            origin,
            origin_applied: false,
            applied_to: Vec::new(),
        };
        let Some(view) = self.views.get_mut(origin) else {
            return propagation;
        };
        propagation.origin_applied = view.apply(interaction);

        if !propagation.origin_applied || !self.active.contains(&origin) {
            return propagation;
        }
        let delta = Delta {
            origin,
            interaction,
        };
        for &id in &self.active {
            if let Some(view) = self.views.get_mut(id)
                && view.apply_delta(&delta)
            {
                propagation.applied_to.push(id);
            }
        }
        propagation
    }

    /// Load a series into one view, abandoning any build in flight for it.
    pub fn load_series(&mut self, id: ViewId, slices: Vec<Slice>, info: SeriesInfo) {
        let Some(view) = self.views.get_mut(id) else {
            return;
        };
        self.builds.supersede(id);
        view.load_series(slices, info);
    }

    /// Start reconstructing the series shown in `id`. Returns the build
    /// generation, or `None` if the view has no plain stack to build from.
    pub fn request_mpr(&mut self, id: ViewId) -> Option<u64> {
        let view = self.views.get_mut(id)?;
        if view.status() != ViewStatus::Stack {
            return None;
        }
        let generation = self.builds.supersede(id);
        let slices = view.begin_build(generation)?;
        self.builds.start(id, generation, slices);
        Some(generation)
    }

    /// Apply every pending build event of current builds to its view.
    pub fn poll_builds(&mut self) -> Vec<BuildEvent> {
        let events = self.builds.drain();
        for event in &events {
            self.apply_build_event(event);
        }
        events
    }

    /// Block until the current build of `id` finishes or `timeout` passes.
    /// Returns whether the view ended up with a grid.
    pub fn wait_for_build(&mut self, id: ViewId, timeout: Duration) -> bool {
        while let Some(event) = self.builds.wait(timeout) {
            self.apply_build_event(&event);
            if event.view() == id && matches!(event, BuildEvent::Finished { .. }) {
                break;
            }
        }
        self.views.get(id).is_some_and(Viewport::is_mpr)
    }

    fn apply_build_event(&mut self, event: &BuildEvent) {
        let Some(view) = self.views.get_mut(event.view()) else {
            return;
        };
        match event {
            BuildEvent::Progress {
                generation,
                percent,
                ..
            } => {
                view.build_progress(*generation, *percent);
            }
            BuildEvent::Finished {
                generation, result, ..
            } => {
                view.finish_build(*generation, result.clone());
            }
        }
    }

    /// Bind the grid of `from` to `to` as well, so both views share it.
    pub fn share_grid(&mut self, from: ViewId, to: ViewId) -> bool {
        let Some(grid) = self.views.get(from).and_then(Viewport::grid).cloned() else {
            return false;
        };
        let Some(view) = self.views.get_mut(to) else {
            return false;
        };
        self.builds.supersede(to);
        view.bind_grid(grid);
        true
    }

    pub fn render(&mut self, id: ViewId) -> Option<RenderedFrame> {
        self.views.get_mut(id)?.render()
    }

    /// Lines showing where every other MPR view sharing `consumer`'s grid
    /// cuts `consumer`'s plane.
    pub fn cross_reference_lines(&self, consumer: ViewId) -> Vec<CrossReferenceLine> {
        let Some(view) = self.views.get(consumer) else {
            return Vec::new();
        };
        let (Some(grid), Some(target)) = (view.grid(), view.geometry()) else {
            return Vec::new();
        };
        self.views
            .iter()
            .filter(|source| source.id() != consumer)
            .filter(|source| source.grid().is_some_and(|other| Arc::ptr_eq(grid, other)))
            .filter_map(|source| {
                let geometry = source.geometry()?;
                cross_reference(source.id(), &geometry, &target)
            })
            .collect()
    }
}

/// Angle, around the shared rotation axis, between the unrotated right
/// direction of `kind` and that of `ViewKind::Primary`. Kinds whose right
/// vector is a quarter turn away carry a 90° offset.
///
/// Rotation deltas are never offset; this only shows up in absolute line
/// angles, pinned by `rotated_source_tilts_its_line_by_the_same_angle` in
/// `tests/sync_test.rs`.
pub fn rotation_family_offset(kind: ViewKind, config: &MprConfig) -> f64 {
    let reference = unrotated_right(ViewKind::Primary, config);
    let right = unrotated_right(kind, config);
    let axis = axis_vector(config.rotation_axis);
    let sin = axis.dot(&reference.cross(&right));
    let cos = reference.dot(&right);
    sin.atan2(cos).to_degrees().rem_euclid(360.0)
}

fn unrotated_right(kind: ViewKind, config: &MprConfig) -> Vector3<f64> {
    let basis = PlaneBasis::new(
        config.depth_axis(kind),
        config.rotation_axis,
        0.0,
        (1.0, 1.0, 1.0),
        1.0,
    );
    basis.right_direction()
}

/// Screen angle in `[0, 180)` of the line a view of `source_kind` rotated by
/// `source_degrees` draws in a `ViewKind::Primary` view rotated by
/// `consumer_degrees`.
pub fn expected_line_angle(
    source_kind: ViewKind,
    source_degrees: f64,
    consumer_degrees: f64,
    config: &MprConfig,
) -> f64 {
    (rotation_family_offset(source_kind, config) + source_degrees - consumer_degrees).rem_euclid(180.0)
}

fn cross_reference(
    source: ViewId,
    plane: &PlaneGeometry,
    target: &PlaneGeometry,
) -> Option<CrossReferenceLine> {
    let target_normal = target.basis.normal_direction();
    let source_normal = plane.basis.normal_direction();
    let direction = target_normal.cross(&source_normal);
    let norm_squared = direction.norm_squared();
    if norm_squared < PARALLEL_EPSILON {
        return None;
    }

    // point of the intersection line closest to the consumer's center, in
    // millimeters relative to that center
    let height = source_normal.dot(&target.offset_mm(&plane.center));
    let point = direction.cross(&target_normal) * (height / norm_squared);

    let pixel_mm = target.basis.pixel_mm;
    let column = point.dot(&target.basis.right_direction()) / pixel_mm + target.center_column();
    let row = point.dot(&target.basis.down_direction()) / pixel_mm + target.center_row();

    let dx = direction.dot(&target.basis.right_direction());
    let dy = direction.dot(&target.basis.down_direction());
    let length = dx.hypot(dy);
    let (dx, dy) = (dx / length, dy / length);

    if dy.abs() < AXIS_ALIGNED_EPSILON {
        return Some(CrossReferenceLine::Axis {
            source,
            orientation: LineOrientation::Horizontal,
            position: row,
        });
    }
    if dx.abs() < AXIS_ALIGNED_EPSILON {
        return Some(CrossReferenceLine::Axis {
            source,
            orientation: LineOrientation::Vertical,
            position: column,
        });
    }

    let (start, end) = clip_line(
        (column, row),
        (dx, dy),
        (target.width as f64, target.height as f64),
    )?;
    Some(CrossReferenceLine::Segment {
        source,
        start,
        end,
        angle_degrees: dy.atan2(dx).to_degrees().rem_euclid(180.0),
    })
}

/// Clip the infinite line through `point` along `direction` to the raster
/// rectangle `[0, width] x [0, height]`.
fn clip_line(
    point: (f64, f64),
    direction: (f64, f64),
    size: (f64, f64),
) -> Option<((f64, f64), (f64, f64))> {
    let mut t_min = f64::NEG_INFINITY;
    let mut t_max = f64::INFINITY;
    for (origin, delta, extent) in [
        (point.0, direction.0, size.0),
        (point.1, direction.1, size.1),
    ] {
        if delta.abs() < f64::EPSILON {
            if origin < 0.0 || origin > extent {
                return None;
            }
            continue;
        }
        let a = (0.0 - origin) / delta;
        let b = (extent - origin) / delta;
        t_min = t_min.max(a.min(b));
        t_max = t_max.min(a.max(b));
    }
    if t_min > t_max {
        return None;
    }
    let at = |t: f64| (point.0 + direction.0 * t, point.1 + direction.1 * t);
    Some((at(t_min), at(t_max)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_offsets_follow_right_vectors() {
        let config = MprConfig::default();
        assert_eq!(rotation_family_offset(ViewKind::Primary, &config), 0.0);
        assert_eq!(rotation_family_offset(ViewKind::SecondaryA, &config), 0.0);
        assert!((rotation_family_offset(ViewKind::SecondaryB, &config) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn clip_diagonal_through_center() {
        let diagonal = std::f64::consts::FRAC_1_SQRT_2;
        let (start, end) = clip_line((5.0, 5.0), (diagonal, diagonal), (10.0, 10.0)).expect("clipped");
        assert!((start.0).abs() < 1e-9 && (start.1).abs() < 1e-9);
        assert!((end.0 - 10.0).abs() < 1e-9 && (end.1 - 10.0).abs() < 1e-9);
    }

    #[test]
    fn line_outside_raster_is_dropped() {
        let diagonal = std::f64::consts::FRAC_1_SQRT_2;
        assert!(clip_line((50.0, -5.0), (diagonal, diagonal), (10.0, 10.0)).is_none());
    }

    #[test]
    fn toggle_never_empties_active_set() {
        let mut controller =
            ViewportSyncController::new(MprConfig::default(), &[ViewKind::Primary, ViewKind::SecondaryA]);
        controller.select(1, false);
        controller.select(1, true);
        assert_eq!(controller.active().iter().copied().collect::<Vec<_>>(), vec![1]);
        controller.select(0, true);
        controller.select(1, true);
        assert_eq!(controller.active().iter().copied().collect::<Vec<_>>(), vec![0]);
    }
}
