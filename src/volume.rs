use crate::enums::Axis;

use nalgebra::{Matrix3, Vector3};
use ndarray::{Array3, ArrayView2, ArrayView3, s};
use rayon::prelude::*;

/// Reconstructed scalar field, immutable once built.
///
/// Samples are stored as (depth Z, row Y, column X). Views share a grid
/// through `Arc<VoxelGrid>`; loading a new series drops the old grid.
#[derive(Clone, Debug)]
pub struct VoxelGrid {
    data: Array3<f32>,
    spacing: (f32, f32, f32),
    orientation: Matrix3<f64>,
    background: f32,
}

impl VoxelGrid {
    /// `spacing` is `(z, y, x)` in millimeters. Non-positive or non-finite
    /// components fall back to 1.0.
    ///
    /// `orientation` holds the patient-space direction of the grid's X, Y
    /// and Z axes as its columns.
    pub fn new(data: Array3<f32>, spacing: (f32, f32, f32), orientation: Matrix3<f64>) -> Self {
        let background = background_value(&data.view());
        Self {
            data,
            spacing: (
                sanitize_spacing(spacing.0),
                sanitize_spacing(spacing.1),
                sanitize_spacing(spacing.2),
            ),
            orientation,
            background,
        }
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    /// Voxel size along (z, y, x) in millimeters.
    pub fn spacing(&self) -> (f32, f32, f32) {
        self.spacing
    }

    pub fn orientation(&self) -> &Matrix3<f64> {
        &self.orientation
    }

    /// Fill value for everything outside the sampled field.
    pub fn background(&self) -> f32 {
        self.background
    }

    pub fn len_along(&self, axis: Axis) -> usize {
        let (depth, height, width) = self.dim();
        match axis {
            Axis::Z => depth,
            Axis::Y => height,
            Axis::X => width,
        }
    }

    pub fn spacing_along(&self, axis: Axis) -> f32 {
        match axis {
            Axis::Z => self.spacing.0,
            Axis::Y => self.spacing.1,
            Axis::X => self.spacing.2,
        }
    }

    /// Smallest voxel edge, used as the isotropic display pixel size.
    pub fn min_spacing(&self) -> f32 {
        self.spacing.0.min(self.spacing.1).min(self.spacing.2)
    }

    /// Center voxel `(x, y, z)`. A raster of `len` pixels anchored here
    /// with offsets starting at `-ceil(len / 2)` covers every voxel.
    pub fn center(&self) -> Vector3<f64> {
        let (depth, height, width) = self.dim();
        let half = |len: usize| len.div_ceil(2) as f64;
        Vector3::new(half(width), half(height), half(depth))
    }

    /// Native slice along one of the storage axes, or `None` if `index` is
    /// out of range.
    pub fn slice_along(&self, axis: Axis, index: usize) -> Option<ArrayView2<'_, f32>> {
        if index >= self.len_along(axis) {
            return None;
        }
        let slice = match axis {
            Axis::Z => self.data.slice(s![index, .., ..]),
            Axis::Y => self.data.slice(s![.., index, ..]),
            Axis::X => self.data.slice(s![.., .., index]),
        };
        Some(slice)
    }
}

/// Background fill shared by obliqueness correction and plane sampling:
/// the global minimum sample, so rotated corners never come out brighter
/// than the darkest tissue. Non-finite samples are ignored; an empty or
/// all-NaN field yields 0.
pub fn background_value(data: &ArrayView3<'_, f32>) -> f32 {
    let min = data
        .as_slice()
        .map(|values| {
            values
                .par_iter()
                .copied()
                .filter(|v| v.is_finite())
                .reduce(|| f32::INFINITY, f32::min)
        })
        .unwrap_or_else(|| {
            data.iter()
                .copied()
                .filter(|v| v.is_finite())
                .fold(f32::INFINITY, f32::min)
        });
    if min.is_finite() { min } else { 0.0 }
}

fn sanitize_spacing(value: f32) -> f32 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_is_global_minimum() {
        let mut data = Array3::<f32>::zeros((2, 3, 4));
        data[[1, 2, 3]] = -1024.0;
        data[[0, 0, 0]] = 3000.0;
        let grid = VoxelGrid::new(data, (1.0, 1.0, 1.0), Matrix3::identity());
        assert_eq!(grid.background(), -1024.0);
    }

    #[test]
    fn background_ignores_non_finite_values() {
        let mut data = Array3::<f32>::from_elem((1, 2, 2), 5.0);
        data[[0, 0, 0]] = f32::NEG_INFINITY;
        data[[0, 0, 1]] = f32::NAN;
        assert_eq!(background_value(&data.view()), 5.0);
    }

    #[test]
    fn invalid_spacing_falls_back_to_unit() {
        let grid = VoxelGrid::new(Array3::zeros((2, 2, 2)), (0.0, -1.0, f32::NAN), Matrix3::identity());
        assert_eq!(grid.spacing(), (1.0, 1.0, 1.0));
    }

    #[test]
    fn slice_along_rejects_out_of_range_index() {
        let grid = VoxelGrid::new(Array3::zeros((2, 3, 4)), (1.0, 1.0, 1.0), Matrix3::identity());
        assert!(grid.slice_along(Axis::X, 4).is_none());
        assert_eq!(grid.slice_along(Axis::Y, 2).map(|s| s.dim()), Some((2, 4)));
    }
}
