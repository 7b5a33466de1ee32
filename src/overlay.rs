use crate::{
    dicom_source::SeriesInfo,
    enums::{ProjectionMode, ViewKind},
    plane::PlaneState,
};

use nalgebra::Vector3;

/// Single-letter anatomical tags shown at the four edges of a view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrientationMarkers {
    pub top: char,
    pub bottom: char,
    pub left: char,
    pub right: char,
}

impl OrientationMarkers {
    /// Markers for a raster whose columns advance along `right` and rows
    /// along `down`, both in patient space (+x left, +y posterior, +z
    /// superior).
    pub fn from_directions(right: &Vector3<f64>, down: &Vector3<f64>) -> Option<Self> {
        Some(Self {
            top: direction_label(&-down)?,
            bottom: direction_label(down)?,
            left: direction_label(&-right)?,
            right: direction_label(right)?,
        })
    }
}

/// Letter of the dominant patient axis of `direction`.
pub fn direction_label(direction: &Vector3<f64>) -> Option<char> {
    let (axis, value) = direction
        .iter()
        .enumerate()
        .filter(|(_, value)| value.is_finite())
        .max_by(|(_, a), (_, b)| a.abs().total_cmp(&b.abs()))?;
    if *value == 0.0 {
        return None;
    }
    let label = match (axis, *value > 0.0) {
        (0, true) => 'L',
        (0, false) => 'R',
        (1, true) => 'P',
        (1, false) => 'A',
        (_, true) => 'S',
        (_, false) => 'I',
    };
    Some(label)
}

/// Everything the presentation layer draws on top of a frame.
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayDescriptor {
    /// Zero-based index of the displayed slice.
    pub slice_index: usize,
    pub slice_count: usize,
    /// Reconstruction kind, `None` for a plain 2D stack.
    pub view_kind: Option<ViewKind>,
    /// Active projection and slab thickness, if a slab is shown.
    pub projection: Option<(ProjectionMode, f32)>,
    pub zoom_factor: f32,
    pub window_center: f32,
    pub window_width: f32,
    pub top_left: Vec<String>,
    pub top_right: Vec<String>,
    pub bottom_left: Vec<String>,
    pub bottom_right: Vec<String>,
    pub markers: Option<OrientationMarkers>,
}

impl OverlayDescriptor {
    pub fn new(
        info: &SeriesInfo,
        state: &PlaneState,
        slice_count: usize,
        view_kind: Option<ViewKind>,
        markers: Option<OrientationMarkers>,
    ) -> Self {
        let projection = (view_kind.is_some() && state.slab_thickness_mm() > 0.0)
            .then(|| (state.projection_mode(), state.slab_thickness_mm()));

        let top_left = vec![
            info.patient_name.clone().unwrap_or_else(|| "No Name".to_string()),
            info.patient_id.clone().unwrap_or_else(|| "No ID".to_string()),
            format!(
                "{} {}",
                info.patient_sex.as_deref().unwrap_or_default(),
                info.patient_age.as_deref().unwrap_or_default()
            )
            .trim()
            .to_string(),
        ];

        let date_time = [info.formatted_date(), info.formatted_time()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        let top_right = [
            info.institution.clone(),
            info.manufacturer.clone(),
            Some(date_time),
            info.series_description.clone(),
        ]
        .into_iter()
        .flatten()
        .filter(|line| !line.is_empty())
        .collect();

        let mut bottom_left = vec![format!("Slice: {} / {}", state.slice_index() + 1, slice_count)];
        match view_kind {
            Some(kind) => {
                bottom_left.push(format!("MPR: {kind}"));
                if let Some((mode, thickness)) = projection {
                    bottom_left.push(format!("{mode} {thickness:.1}mm"));
                }
            }
            None => {
                if let Some(thickness) = info.slice_thickness {
                    bottom_left.push(format!("Thk: {thickness:.1}mm"));
                }
            }
        }
        bottom_left.push(format!("Zoom: {:.1}x", state.zoom_factor()));

        let mut bottom_right = vec![format!(
            "WL: {} / WW: {}",
            state.window_center() as i64,
            state.window_width() as i64
        )];
        if view_kind.is_some() && state.display_rotation() != 0.0 {
            bottom_right.push(format!("Rot: {:.0}\u{b0}", state.display_rotation()));
        }

        Self {
            slice_index: state.slice_index(),
            slice_count,
            view_kind,
            projection,
            zoom_factor: state.zoom_factor(),
            window_center: state.window_center(),
            window_width: state.window_width(),
            top_left,
            top_right,
            bottom_left,
            bottom_right,
            markers,
        }
    }
}
