use crate::{
    config::MprConfig,
    enums::{Axis, ProjectionMode, ViewKind},
    interpolator::Interpolator,
    volume::VoxelGrid,
};

use log::debug;
use nalgebra::{Matrix3, Vector3};

/// Rotation matrix for `degrees` around one of the grid axes, acting on
/// `(x, y, z)` vectors.
pub fn rotation_matrix(axis: Axis, degrees: f64) -> Matrix3<f64> {
    let (s, c) = degrees.to_radians().sin_cos();
    match axis {
        Axis::Z => Matrix3::new(c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0),
        Axis::X => Matrix3::new(1.0, 0.0, 0.0, 0.0, c, -s, 0.0, s, c),
        Axis::Y => Matrix3::new(c, 0.0, s, 0.0, 1.0, 0.0, -s, 0.0, c),
    }
}

/// Unit vector of a grid axis in `(x, y, z)` order.
pub fn axis_vector(axis: Axis) -> Vector3<f64> {
    match axis {
        Axis::X => Vector3::x(),
        Axis::Y => Vector3::y(),
        Axis::Z => Vector3::z(),
    }
}

/// Unrotated (right, down) directions for a view looking along `depth`.
fn in_plane_axes(depth: Axis) -> (Axis, Axis) {
    match depth {
        Axis::Z => (Axis::X, Axis::Y),
        Axis::Y => (Axis::X, Axis::Z),
        Axis::X => (Axis::Y, Axis::Z),
    }
}

/// Per-view mutable state. Only the owning view changes it, through the
/// operations below.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaneState {
    view_kind: ViewKind,
    slice_index: usize,
    rotation_degrees: f32,
    projection_mode: ProjectionMode,
    slab_thickness_mm: f32,
    window_center: f32,
    window_width: f32,
    pan_offset: (f32, f32),
    zoom_factor: f32,
}

impl PlaneState {
    pub fn new(view_kind: ViewKind, config: &MprConfig) -> Self {
        Self {
            view_kind,
            slice_index: 0,
            rotation_degrees: 0.0,
            projection_mode: ProjectionMode::default(),
            slab_thickness_mm: 0.0,
            window_center: config.default_window_center,
            window_width: config.clamp_window_width(config.default_window_width),
            pan_offset: (0.0, 0.0),
            zoom_factor: 1.0,
        }
    }

    pub fn view_kind(&self) -> ViewKind {
        self.view_kind
    }

    pub fn slice_index(&self) -> usize {
        self.slice_index
    }

    /// Accumulated rotation, never wrapped.
    pub fn rotation_degrees(&self) -> f32 {
        self.rotation_degrees
    }

    /// Rotation folded into `[0, 360)` for display.
    pub fn display_rotation(&self) -> f32 {
        self.rotation_degrees.rem_euclid(360.0)
    }

    pub fn projection_mode(&self) -> ProjectionMode {
        self.projection_mode
    }

    pub fn slab_thickness_mm(&self) -> f32 {
        self.slab_thickness_mm
    }

    pub fn window_center(&self) -> f32 {
        self.window_center
    }

    pub fn window_width(&self) -> f32 {
        self.window_width
    }

    pub fn pan_offset(&self) -> (f32, f32) {
        self.pan_offset
    }

    pub fn zoom_factor(&self) -> f32 {
        self.zoom_factor
    }

    pub fn set_view_kind(&mut self, view_kind: ViewKind) {
        self.view_kind = view_kind;
    }

    /// Move by `steps`, clamped to `[0, len - 1]`. Returns whether the
    /// index changed.
    pub fn scroll(&mut self, steps: i32, len: usize) -> bool {
        if len == 0 {
            return false;
        }
        let target = (self.slice_index as i64 + steps as i64).clamp(0, len as i64 - 1) as usize;
        let changed = target != self.slice_index;
        self.slice_index = target;
        changed
    }

    pub fn clamp_index(&mut self, len: usize) {
        let clamped = self.slice_index.min(len.saturating_sub(1));
        if clamped != self.slice_index {
            debug!("slice index {} out of range, clamped to {clamped}", self.slice_index);
            self.slice_index = clamped;
        }
    }

    pub fn pan(&mut self, dx: f32, dy: f32) {
        self.pan_offset.0 += dx;
        self.pan_offset.1 += dy;
    }

    pub fn adjust_window(&mut self, d_width: f32, d_level: f32, config: &MprConfig) {
        self.window_width = config.clamp_window_width(self.window_width + d_width);
        self.window_center += d_level;
    }

    pub fn set_window(&mut self, center: f32, width: f32, config: &MprConfig) {
        self.window_center = center;
        self.window_width = config.clamp_window_width(width);
    }

    pub fn zoom(&mut self, delta: f32, config: &MprConfig) {
        self.zoom_factor = config.clamp_zoom(self.zoom_factor + delta);
    }

    pub fn rotate(&mut self, delta_degrees: f32) {
        self.rotation_degrees += delta_degrees;
    }

    pub fn set_projection_mode(&mut self, mode: ProjectionMode) {
        self.projection_mode = mode;
    }

    pub fn set_slab_thickness(&mut self, thickness_mm: f32) {
        self.slab_thickness_mm = if thickness_mm.is_finite() { thickness_mm.max(0.0) } else { 0.0 };
    }

    /// Re-seat on a newly bound stack or grid: mid-point index, identity
    /// pan and zoom.
    pub fn rebind(&mut self, len: usize) {
        self.slice_index = len / 2;
        self.pan_offset = (0.0, 0.0);
        self.zoom_factor = 1.0;
    }
}

/// Cutting-plane vectors.
///
/// `right`, `down` and `normal` are in voxel units `(x, y, z)`, scaled so
/// one unit is one output pixel (`pixel_mm` millimeters) physically.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaneBasis {
    pub right: Vector3<f64>,
    pub down: Vector3<f64>,
    pub normal: Vector3<f64>,
    /// Millimeter-space unit directions of right, down and normal, as
    /// columns.
    pub directions: Matrix3<f64>,
    pub pixel_mm: f64,
}

impl PlaneBasis {
    pub fn new(
        depth: Axis,
        rotation_axis: Axis,
        rotation_degrees: f64,
        spacing: (f32, f32, f32),
        pixel_mm: f64,
    ) -> Self {
        let (right_axis, down_axis) = in_plane_axes(depth);
        let rotation = rotation_matrix(rotation_axis, rotation_degrees);
        let directions = Matrix3::from_columns(&[
            rotation * axis_vector(right_axis),
            rotation * axis_vector(down_axis),
            rotation * axis_vector(depth),
        ]);
        let per_voxel = spacing_vector(spacing);
        let to_voxels = |direction: Vector3<f64>| (direction * pixel_mm).component_div(&per_voxel);
        Self {
            right: to_voxels(directions.column(0).into_owned()),
            down: to_voxels(directions.column(1).into_owned()),
            normal: to_voxels(directions.column(2).into_owned()),
            directions,
            pixel_mm,
        }
    }

    pub fn right_direction(&self) -> Vector3<f64> {
        self.directions.column(0).into_owned()
    }

    pub fn down_direction(&self) -> Vector3<f64> {
        self.directions.column(1).into_owned()
    }

    pub fn normal_direction(&self) -> Vector3<f64> {
        self.directions.column(2).into_owned()
    }
}

/// Grid spacing as an `(x, y, z)` vector.
pub fn spacing_vector(spacing: (f32, f32, f32)) -> Vector3<f64> {
    Vector3::new(spacing.2 as f64, spacing.1 as f64, spacing.0 as f64)
}

/// A fully resolved cutting plane of one view against one grid.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaneGeometry {
    /// Plane center in voxel coordinates `(x, y, z)`.
    pub center: Vector3<f64>,
    pub basis: PlaneBasis,
    pub width: usize,
    pub height: usize,
    spacing: Vector3<f64>,
}

impl PlaneGeometry {
    pub fn for_view(grid: &VoxelGrid, state: &PlaneState, config: &MprConfig) -> Self {
        let depth = config.depth_axis(state.view_kind());
        let pixel_mm = grid.min_spacing() as f64;
        let basis = PlaneBasis::new(
            depth,
            config.rotation_axis,
            state.rotation_degrees() as f64,
            grid.spacing(),
            pixel_mm,
        );
        let spacing = spacing_vector(grid.spacing());

        let anchor = grid.center();
        let offset_mm = (state.slice_index() as f64 - anchor[depth.vector_index()])
            * grid.spacing_along(depth) as f64;
        let center = anchor + (basis.normal_direction() * offset_mm).component_div(&spacing);

        let (width, height) = output_dimensions(grid, depth);
        Self {
            center,
            basis,
            width,
            height,
            spacing,
        }
    }

    /// Millimeter offset of a voxel coordinate from the plane center.
    pub fn offset_mm(&self, voxel: &Vector3<f64>) -> Vector3<f64> {
        (voxel - self.center).component_mul(&self.spacing)
    }

    /// Raster column of the plane center.
    pub fn center_column(&self) -> f64 {
        -first_offset(self.width) as f64
    }

    /// Raster row of the plane center.
    pub fn center_row(&self) -> f64 {
        -first_offset(self.height) as f64
    }

    /// Raster `(column, row)` of a voxel coordinate projected onto the plane.
    pub fn to_plane_coordinates(&self, voxel: &Vector3<f64>) -> (f64, f64) {
        let offset = self.offset_mm(voxel);
        let column = offset.dot(&self.basis.right_direction()) / self.basis.pixel_mm;
        let row = offset.dot(&self.basis.down_direction()) / self.basis.pixel_mm;
        (column + self.center_column(), row + self.center_row())
    }
}

/// Smallest pixel offset of a centered raster of `len` pixels, so that the
/// offsets run `first_offset(len) .. first_offset(len) + len`.
pub fn first_offset(len: usize) -> i64 {
    (-(len as i64)).div_euclid(2)
}

/// Output raster `(width, height)` for a view looking along `depth`, at the
/// grid's smallest spacing.
pub fn output_dimensions(grid: &VoxelGrid, depth: Axis) -> (usize, usize) {
    let (z, y, x) = Interpolator::get_isotropic_dimensions(grid.spacing(), grid.dim());
    let (z, y, x) = (z as usize, y as usize, x as usize);
    match depth {
        // Looking down Z-axis: X is width, Y is height
        Axis::Z => (x, y),
        // Looking down Y-axis: X is width, Z is height
        Axis::Y => (x, z),
        // Looking down X-axis: Y is width, Z is height
        Axis::X => (y, z),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn scroll_clamps_to_bounds() {
        let mut state = PlaneState::new(ViewKind::Primary, &MprConfig::default());
        assert!(state.scroll(5, 3));
        assert_eq!(state.slice_index(), 2);
        assert!(!state.scroll(1, 3));
        assert!(state.scroll(-10, 3));
        assert_eq!(state.slice_index(), 0);
    }

    #[test]
    fn window_width_never_drops_below_one() {
        let config = MprConfig::default();
        let mut state = PlaneState::new(ViewKind::Primary, &config);
        state.adjust_window(-1000.0, 10.0, &config);
        assert_eq!(state.window_width(), 1.0);
        assert_eq!(state.window_center(), 50.0);
    }

    #[test]
    fn zoom_is_clamped() {
        let config = MprConfig::default();
        let mut state = PlaneState::new(ViewKind::Primary, &config);
        state.zoom(100.0, &config);
        assert_eq!(state.zoom_factor(), 10.0);
        state.zoom(-100.0, &config);
        assert_eq!(state.zoom_factor(), 0.1);
    }

    #[test]
    fn rotation_accumulates_without_wrapping() {
        let mut state = PlaneState::new(ViewKind::Primary, &MprConfig::default());
        state.rotate(300.0);
        state.rotate(120.0);
        assert_eq!(state.rotation_degrees(), 420.0);
        assert_eq!(state.display_rotation(), 60.0);
        state.rotate(-480.0);
        assert_eq!(state.display_rotation(), 300.0);
    }

    #[test]
    fn rebind_resets_view_transform() {
        let config = MprConfig::default();
        let mut state = PlaneState::new(ViewKind::Primary, &config);
        state.pan(3.0, 4.0);
        state.zoom(1.0, &config);
        state.rebind(11);
        assert_eq!(state.slice_index(), 5);
        assert_eq!(state.pan_offset(), (0.0, 0.0));
        assert_eq!(state.zoom_factor(), 1.0);
    }

    #[test]
    fn negative_slab_thickness_is_zero() {
        let mut state = PlaneState::new(ViewKind::Primary, &MprConfig::default());
        state.set_slab_thickness(-2.0);
        assert_eq!(state.slab_thickness_mm(), 0.0);
    }

    #[test]
    fn basis_is_scaled_for_anisotropic_spacing() {
        // spacing (z, y, x): 2.0 mm slices, 0.5 mm pixels
        let basis = PlaneBasis::new(Axis::Y, Axis::Z, 0.0, (2.0, 0.5, 0.5), 0.5);
        assert_relative_eq!(basis.right, Vector3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(basis.down, Vector3::new(0.0, 0.0, 0.25));
        assert_relative_eq!(basis.normal, Vector3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn quarter_turn_maps_right_onto_down() {
        let basis = PlaneBasis::new(Axis::Z, Axis::Z, 90.0, (1.0, 1.0, 1.0), 1.0);
        assert_relative_eq!(basis.right, Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(basis.down, Vector3::new(-1.0, 0.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(basis.normal, Vector3::z(), epsilon = 1e-12);
    }

    #[test]
    fn first_offset_matches_centered_raster() {
        assert_eq!(first_offset(4), -2);
        assert_eq!(first_offset(5), -3);
        assert_eq!(first_offset(1), -1);
    }
}
