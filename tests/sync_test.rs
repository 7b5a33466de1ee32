use approx::assert_relative_eq;
use mpr_volume::sync::{CrossReferenceLine, LineOrientation, expected_line_angle};
use mpr_volume::{
    Interaction, MprConfig, SeriesInfo, Slice, ViewKind, ViewStatus, ViewportSyncController,
    VoxelGrid,
};
use nalgebra::{Matrix3, Vector3};
use ndarray::{Array2, Array3};
use std::{sync::Arc, time::Duration};

fn slices(count: usize) -> Vec<Slice> {
    (0..count)
        .map(|i| {
            Slice::new(Array2::from_elem((8, 8), i as f32 * 10.0))
                .with_position(Vector3::new(0.0, 0.0, i as f64))
        })
        .collect()
}

fn controller() -> ViewportSyncController {
    ViewportSyncController::new(MprConfig::default(), &ViewKind::ALL)
}

/// All three views bound to one shared 8x8x8 grid.
fn shared_grid_controller() -> ViewportSyncController {
    let mut controller = controller();
    let grid = Arc::new(VoxelGrid::new(
        Array3::from_shape_fn((8, 8, 8), |(z, y, x)| (z + y + x) as f32),
        (1.0, 1.0, 1.0),
        Matrix3::identity(),
    ));
    for id in 0..3 {
        controller
            .view_mut(id)
            .expect("view")
            .bind_grid(Arc::clone(&grid));
    }
    controller
}

fn line_from(lines: &[CrossReferenceLine], from: usize) -> CrossReferenceLine {
    *lines
        .iter()
        .find(|line| match line {
            CrossReferenceLine::Segment { source, .. } | CrossReferenceLine::Axis { source, .. } => {
                *source == from
            }
        })
        .expect("line from source")
}

#[test]
fn scroll_on_active_view_reaches_active_sibling_once() {
    let mut controller = controller();
    for id in 0..3 {
        controller.load_series(id, slices(10), SeriesInfo::default());
    }
    controller.select(0, false);
    controller.select(1, true);

    let propagation = controller.dispatch(0, Interaction::Scroll(3));
    assert!(propagation.origin_applied);
    assert_eq!(propagation.applied_to, vec![1]);
    assert_eq!(controller.view(0).expect("view").state().slice_index(), 3);
    assert_eq!(controller.view(1).expect("view").state().slice_index(), 3);
    assert_eq!(controller.view(2).expect("view").state().slice_index(), 0);
}

#[test]
fn inactive_origin_does_not_propagate() {
    let mut controller = controller();
    for id in 0..3 {
        controller.load_series(id, slices(10), SeriesInfo::default());
    }
    controller.select(1, false);
    controller.select(2, true);

    let propagation = controller.dispatch(0, Interaction::Zoom(0.5));
    assert!(propagation.applied_to.is_empty());
    assert_eq!(controller.view(0).expect("view").state().zoom_factor(), 1.5);
    assert_eq!(controller.view(1).expect("view").state().zoom_factor(), 1.0);
}

#[test]
fn active_set_never_empties() {
    let mut controller = controller();
    assert_eq!(controller.active().len(), 1);
    controller.select(0, true);
    assert!(controller.is_active(0));
    controller.select(2, true);
    controller.select(0, true);
    assert!(!controller.is_active(0));
    assert!(controller.is_active(2));
    controller.select(2, true);
    assert!(controller.is_active(2));
}

#[test]
fn failed_reconstruction_falls_back_to_stack() {
    let mut controller = controller();
    controller.load_series(0, slices(1), SeriesInfo::default());
    assert!(controller.request_mpr(0).is_some());
    assert!(!controller.wait_for_build(0, Duration::from_secs(10)));

    let view = controller.view(0).expect("view");
    assert_eq!(view.status(), ViewStatus::Stack);
    assert!(
        view.status_message()
            .is_some_and(|message| message.starts_with("MPR unavailable"))
    );
    assert!(controller.render(0).is_some());
}

#[test]
fn built_grid_is_shared_and_rendered() {
    let mut controller = controller();
    controller.load_series(0, slices(6), SeriesInfo::default());
    controller.request_mpr(0);
    assert!(controller.wait_for_build(0, Duration::from_secs(10)));
    assert!(controller.share_grid(0, 1));

    let first = controller.view(0).and_then(|view| view.grid()).expect("grid");
    let second = controller.view(1).and_then(|view| view.grid()).expect("grid");
    assert!(Arc::ptr_eq(first, second));

    let frame = controller.render(1).expect("frame");
    assert_eq!(frame.image.dimensions(), (8, 6));
    assert_eq!(frame.overlay.view_kind, Some(ViewKind::SecondaryA));
}

#[test]
fn reloading_discards_build_in_flight() {
    let mut controller = controller();
    controller.load_series(0, slices(6), SeriesInfo::default());
    controller.request_mpr(0);
    controller.load_series(0, slices(4), SeriesInfo::default());
    assert!(!controller.wait_for_build(0, Duration::from_millis(500)));
    assert_eq!(controller.view(0).expect("view").status(), ViewStatus::Stack);
    assert_eq!(controller.view(0).expect("view").index_len(), 4);
}

#[test]
fn unrotated_secondaries_cross_primary_along_axes() {
    let mut controller = shared_grid_controller();
    controller
        .view_mut(1)
        .expect("view")
        .apply(Interaction::Scroll(1));

    let lines = controller.cross_reference_lines(0);
    assert_eq!(lines.len(), 2);
    match line_from(&lines, 1) {
        CrossReferenceLine::Axis {
            orientation,
            position,
            ..
        } => {
            assert_eq!(orientation, LineOrientation::Horizontal);
            assert_relative_eq!(position, 5.0, epsilon = 1e-9);
        }
        other => panic!("unexpected line: {other:?}"),
    }
    match line_from(&lines, 2) {
        CrossReferenceLine::Axis {
            orientation,
            position,
            ..
        } => {
            assert_eq!(orientation, LineOrientation::Vertical);
            assert_relative_eq!(position, 4.0, epsilon = 1e-9);
        }
        other => panic!("unexpected line: {other:?}"),
    }
}

#[test]
fn rotated_source_tilts_its_line_by_the_same_angle() {
    let config = MprConfig::default();
    for theta in [30.0_f32, 75.0, 120.0] {
        let mut controller = shared_grid_controller();
        for id in [1, 2] {
            controller
                .view_mut(id)
                .expect("view")
                .apply(Interaction::Rotate(theta));
        }
        let lines = controller.cross_reference_lines(0);

        for (id, kind) in [(1, ViewKind::SecondaryA), (2, ViewKind::SecondaryB)] {
            let expected = expected_line_angle(kind, theta as f64, 0.0, &config);
            match line_from(&lines, id) {
                CrossReferenceLine::Segment { angle_degrees, .. } => {
                    assert_relative_eq!(angle_degrees, expected, epsilon = 1e-6);
                }
                other => panic!("unexpected line: {other:?}"),
            }
        }
    }
}

#[test]
fn rotated_consumer_sees_relative_angle() {
    let config = MprConfig::default();
    let mut controller = shared_grid_controller();
    controller
        .view_mut(1)
        .expect("view")
        .apply(Interaction::Rotate(50.0));
    controller
        .view_mut(0)
        .expect("view")
        .apply(Interaction::Rotate(20.0));

    let lines = controller.cross_reference_lines(0);
    match line_from(&lines, 1) {
        CrossReferenceLine::Segment { angle_degrees, .. } => {
            assert_relative_eq!(angle_degrees, 30.0, epsilon = 1e-6);
            assert_relative_eq!(
                angle_degrees,
                expected_line_angle(ViewKind::SecondaryA, 50.0, 20.0, &config),
                epsilon = 1e-6
            );
        }
        other => panic!("unexpected line: {other:?}"),
    }
}

#[test]
fn corotated_views_keep_axis_aligned_lines() {
    let mut controller = shared_grid_controller();
    controller.select(0, false);
    controller.select(1, true);
    controller.select(2, true);
    let propagation = controller.dispatch(0, Interaction::Rotate(15.0));
    assert_eq!(propagation.applied_to, vec![1, 2]);

    for id in 0..3 {
        assert_eq!(
            controller.view(id).expect("view").state().rotation_degrees(),
            15.0
        );
    }
    let lines = controller.cross_reference_lines(0);
    assert!(matches!(
        line_from(&lines, 1),
        CrossReferenceLine::Axis {
            orientation: LineOrientation::Horizontal,
            ..
        }
    ));
    assert!(matches!(
        line_from(&lines, 2),
        CrossReferenceLine::Axis {
            orientation: LineOrientation::Vertical,
            ..
        }
    ));
}

#[test]
fn views_on_other_grids_draw_nothing() {
    let mut controller = shared_grid_controller();
    let other = Arc::new(VoxelGrid::new(
        Array3::zeros((8, 8, 8)),
        (1.0, 1.0, 1.0),
        Matrix3::identity(),
    ));
    controller.view_mut(1).expect("view").bind_grid(other);
    let lines = controller.cross_reference_lines(0);
    assert_eq!(lines.len(), 1);
    assert!(matches!(
        lines[0],
        CrossReferenceLine::Axis { source: 2, .. }
    ));
}

#[test]
fn refused_rotation_is_not_propagated() {
    let mut controller = shared_grid_controller();
    controller.load_series(0, slices(10), SeriesInfo::default());
    controller.select(0, false);
    controller.select(1, true);

    let propagation = controller.dispatch(0, Interaction::Rotate(30.0));
    assert!(!propagation.origin_applied);
    assert!(propagation.applied_to.is_empty());
    assert_eq!(controller.view(0).expect("view").state().rotation_degrees(), 0.0);
    assert_eq!(controller.view(1).expect("view").state().rotation_degrees(), 0.0);
}

#[test]
fn scroll_clamped_at_origin_is_not_propagated() {
    let mut controller = controller();
    for id in 0..2 {
        controller.load_series(id, slices(10), SeriesInfo::default());
    }
    controller.view_mut(0).expect("view").apply(Interaction::Scroll(9));
    controller.view_mut(1).expect("view").apply(Interaction::Scroll(4));
    controller.select(0, false);
    controller.select(1, true);

    let propagation = controller.dispatch(0, Interaction::Scroll(3));
    assert!(!propagation.origin_applied);
    assert!(propagation.applied_to.is_empty());
    assert_eq!(controller.view(0).expect("view").state().slice_index(), 9);
    assert_eq!(controller.view(1).expect("view").state().slice_index(), 4);
}

#[test]
fn unloaded_sibling_ignores_scroll() {
    let mut controller = controller();
    controller.load_series(0, slices(10), SeriesInfo::default());
    controller.select(0, false);
    controller.select(2, true);

    let propagation = controller.dispatch(0, Interaction::Scroll(2));
    assert!(propagation.origin_applied);
    assert!(propagation.applied_to.is_empty());
    let sibling = controller.view(2).expect("view");
    assert_eq!(sibling.status(), ViewStatus::Unloaded);
    assert_eq!(sibling.state().slice_index(), 0);
    assert!(controller.render(2).is_none());
}
