use crate::{
    interpolator::Interpolator,
    plane::{PlaneGeometry, first_offset, spacing_vector},
    volume::VoxelGrid,
};

use nalgebra::Vector3;
use ndarray::{Array3, Zip};

/// Samples arbitrary planes and slabs out of a [`VoxelGrid`].
pub struct ObliquePlaneSampler;

impl ObliquePlaneSampler {
    /// Sample a `(depth, height, width)` block around `center`.
    ///
    /// All vectors are in voxel units `(x, y, z)`. Output pixel `(r, c)` of
    /// depth layer `d` reads `center + c·right + r·down + d·normal`, with
    /// `c` running from `-ceil(width / 2)` and `r` from `-ceil(height / 2)`.
    /// Everything outside the grid reads the grid's background value.
    #[allow(clippy::too_many_arguments)]
    pub fn sample(
        grid: &VoxelGrid,
        center: &Vector3<f64>,
        right: &Vector3<f64>,
        down: &Vector3<f64>,
        normal: &Vector3<f64>,
        width: usize,
        height: usize,
        slab_thickness_mm: f32,
    ) -> Array3<f32> {
        let depth_offsets = Self::depth_offsets(grid, normal, slab_thickness_mm);
        let column_start = first_offset(width) as f64;
        let row_start = first_offset(height) as f64;
        let volume = grid.data().view();
        let fill = grid.background();

        let mut samples = Array3::<f32>::zeros((depth_offsets.len(), height, width));
        Zip::indexed(&mut samples).par_for_each(|(d, r, c), value| {
            let point = center
                + right * (column_start + c as f64)
                + down * (row_start + r as f64)
                + normal * depth_offsets[d];
            *value = Interpolator::trilinear_interpolate(&volume, point.z, point.y, point.x, fill);
        });
        samples
    }

    /// [`Self::sample`] for a resolved view plane.
    pub fn sample_plane(grid: &VoxelGrid, plane: &PlaneGeometry, slab_thickness_mm: f32) -> Array3<f32> {
        Self::sample(
            grid,
            &plane.center,
            &plane.basis.right,
            &plane.basis.down,
            &plane.basis.normal,
            plane.width,
            plane.height,
            slab_thickness_mm,
        )
    }

    /// Offsets along `normal` making up a slab.
    ///
    /// One step is the physical length of one `normal` unit. A thickness
    /// covering `n` whole steps yields offsets `-(n / 2)..=(n / 2)`; anything
    /// thinner than one step is the single plane at 0.
    pub fn depth_offsets(grid: &VoxelGrid, normal: &Vector3<f64>, slab_thickness_mm: f32) -> Vec<f64> {
        if !(slab_thickness_mm > 0.0) {
            return vec![0.0];
        }
        let step_mm = normal.component_mul(&spacing_vector(grid.spacing())).norm();
        if !(step_mm > 0.0) || !step_mm.is_finite() {
            return vec![0.0];
        }
        let steps = (slab_thickness_mm as f64 / step_mm).floor() as i64;
        let half = steps / 2;
        (-half..=half).map(|offset| offset as f64).collect()
    }
}
