use crate::enums::{Axis, SortBy, ViewKind};

/// Tunables shared by the reconstructor and every view.
#[derive(Clone, Debug)]
pub struct MprConfig {
    /// Absolute per-component tolerance when comparing the acquisition
    /// direction cosines against identity.
    pub oblique_tolerance: f64,
    pub min_zoom: f32,
    pub max_zoom: f32,
    pub min_window_width: f32,
    pub default_window_center: f32,
    pub default_window_width: f32,
    /// Vertical drag distance (screen pixels) that makes up one scroll step.
    pub paging_threshold: f32,
    pub sort_by: SortBy,
    /// Depth axis looked along by each view kind.
    pub primary_axis: Axis,
    pub secondary_a_axis: Axis,
    pub secondary_b_axis: Axis,
    /// Axis every view rotates around.
    pub rotation_axis: Axis,
}

impl Default for MprConfig {
    fn default() -> Self {
        Self {
            oblique_tolerance: 1e-5,
            min_zoom: 0.1,
            max_zoom: 10.0,
            min_window_width: 1.0,
            default_window_center: 40.0,
            default_window_width: 400.0,
            paging_threshold: 15.0,
            sort_by: SortBy::default(),
            primary_axis: Axis::Z,
            secondary_a_axis: Axis::Y,
            secondary_b_axis: Axis::X,
            rotation_axis: Axis::Z,
        }
    }
}

impl MprConfig {
    pub fn depth_axis(&self, kind: ViewKind) -> Axis {
        match kind {
            ViewKind::Primary => self.primary_axis,
            ViewKind::SecondaryA => self.secondary_a_axis,
            ViewKind::SecondaryB => self.secondary_b_axis,
        }
    }

    pub fn clamp_zoom(&self, zoom: f32) -> f32 {
        zoom.clamp(self.min_zoom, self.max_zoom)
    }

    pub fn clamp_window_width(&self, width: f32) -> f32 {
        if width.is_nan() {
            return self.min_window_width;
        }
        width.max(self.min_window_width)
    }
}
