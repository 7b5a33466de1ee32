use crate::{config::MprConfig, enums::SortBy, interpolator::Interpolator, volume::VoxelGrid};

use log::{debug, info, warn};
use nalgebra::{Matrix3, Vector3};
use ndarray::{Array2, Array3, Zip, s};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ReconstructionError {
    #[error("At least 2 usable slices are required, found {found}")]
    InsufficientSlices { found: usize },

    #[error("Inconsistent image dimensions")]
    InconsistentDimensions,

    #[error("Slice geometry cannot be mapped onto an axis-aligned grid")]
    DegenerateGeometry,

    #[error("Build worker could not be started")]
    WorkerUnavailable,
}

/// One decoded (or undecodable) cross-section handed over by the loader.
#[derive(Clone, Debug, Default)]
pub struct Slice {
    /// `None` marks a slice whose pixel data could not be decoded.
    pub pixels: Option<Array2<f32>>,
    /// Patient-space position of the first transmitted pixel, in mm.
    pub position: Option<Vector3<f64>>,
    /// Columns are the row direction, the column direction and the slice
    /// normal. Missing orientation is treated as identity.
    pub orientation: Option<Matrix3<f64>>,
    /// `(row spacing, column spacing)` in mm.
    pub pixel_spacing: Option<(f64, f64)>,
    pub slice_thickness: Option<f64>,
    pub instance_number: Option<i32>,
}

impl Slice {
    pub fn new(pixels: Array2<f32>) -> Self {
        Self {
            pixels: Some(pixels),
            ..Default::default()
        }
    }

    pub fn undecodable() -> Self {
        Self::default()
    }

    pub fn with_position(mut self, position: Vector3<f64>) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_orientation(mut self, orientation: Matrix3<f64>) -> Self {
        self.orientation = Some(orientation);
        self
    }

    /// Orientation from the row and column direction cosines; the normal is
    /// their cross product.
    pub fn with_direction_cosines(self, row: Vector3<f64>, column: Vector3<f64>) -> Self {
        let normal = row.cross(&column);
        self.with_orientation(Matrix3::from_columns(&[row, column, normal]))
    }

    pub fn with_pixel_spacing(mut self, row_spacing: f64, column_spacing: f64) -> Self {
        self.pixel_spacing = Some((row_spacing, column_spacing));
        self
    }

    pub fn with_slice_thickness(mut self, thickness: f64) -> Self {
        self.slice_thickness = Some(thickness);
        self
    }

    pub fn with_instance_number(mut self, number: i32) -> Self {
        self.instance_number = Some(number);
        self
    }
}

/// Whether a direction-cosine matrix deviates from identity by more than
/// `tolerance` in any component.
pub fn is_oblique(direction: &Matrix3<f64>, tolerance: f64) -> bool {
    let identity = Matrix3::<f64>::identity();
    direction
        .iter()
        .zip(identity.iter())
        .any(|(value, expected)| !((value - expected).abs() <= tolerance))
}

struct OrderedSlice<'a> {
    index: usize,
    key: f64,
    pixels: &'a Array2<f32>,
    position: Option<Vector3<f64>>,
}

/// Assembles an ordered stack of slices into one axis-aligned [`VoxelGrid`].
///
/// Holds no state between builds.
pub struct VolumeReconstructor {
    oblique_tolerance: f64,
    sort_by: SortBy,
}

impl Default for VolumeReconstructor {
    fn default() -> Self {
        Self::new(&MprConfig::default())
    }
}

impl VolumeReconstructor {
    pub fn new(config: &MprConfig) -> Self {
        Self {
            oblique_tolerance: config.oblique_tolerance,
            sort_by: config.sort_by,
        }
    }

    pub fn build(&self, slices: &[Slice]) -> Result<VoxelGrid, ReconstructionError> {
        self.build_with_progress(slices, &mut |_| {})
    }

    /// Indices of the decodable slices in reconstruction order.
    pub fn order(&self, slices: &[Slice]) -> Vec<usize> {
        let normal = Self::frame(slices).column(2).into_owned();
        let mut ordered = self.decodable_slices(slices, &normal);
        ordered.sort_by(|a, b| a.key.total_cmp(&b.key));
        Self::align_with_normal(&mut ordered, &normal);
        ordered.into_iter().map(|slice| slice.index).collect()
    }

    fn frame(slices: &[Slice]) -> Matrix3<f64> {
        slices
            .iter()
            .find_map(|slice| slice.orientation)
            .unwrap_or_else(Matrix3::identity)
    }

    /// Build a volume, reporting non-decreasing progress in `[0, 100]`.
    ///
    /// # Errors
    ///
    /// Returns error if fewer than two slices decode, the decoded slices
    /// differ in size, or the stack geometry is degenerate.
    pub fn build_with_progress(
        &self,
        slices: &[Slice],
        progress: &mut dyn FnMut(u8),
    ) -> Result<VoxelGrid, ReconstructionError> {
        progress(0);

        let frame = Self::frame(slices);
        let normal = frame.column(2).into_owned();
        let pixel_spacing = slices.iter().find_map(|slice| slice.pixel_spacing);
        let slice_thickness = slices.iter().find_map(|slice| slice.slice_thickness);

        let mut ordered = self.decodable_slices(slices, &normal);
        if ordered.len() < 2 {
            return Err(ReconstructionError::InsufficientSlices {
                found: ordered.len(),
            });
        }
        ordered.sort_by(|a, b| a.key.total_cmp(&b.key));
        Self::align_with_normal(&mut ordered, &normal);
        progress(10);

        Self::validate_dimensions(&ordered)?;
        let stacked = Self::build_volume_array(&ordered, progress);

        let (row_spacing, column_spacing) = pixel_spacing.unwrap_or((1.0, 1.0));
        let z_spacing = Self::stack_spacing(&ordered).or(slice_thickness).unwrap_or(1.0);
        let spacing = (z_spacing as f32, row_spacing as f32, column_spacing as f32);

        let direction = Self::direction_cosines(&ordered, &frame);
        let volume = if is_oblique(&direction, self.oblique_tolerance) {
            info!("oblique acquisition detected, resampling onto an axis-aligned grid");
            debug!("direction cosines: {direction:?}");
            let background = crate::volume::background_value(&stacked.view());
            Self::resample_axis_aligned(&stacked, spacing, &direction, background)?
        } else {
            stacked
        };
        progress(90);

        let grid = VoxelGrid::new(volume, spacing, frame);
        let (depth, height, width) = grid.dim();
        info!(
            "reconstructed volume: {depth}x{height}x{width}, spacing {:?}",
            grid.spacing()
        );
        progress(100);
        Ok(grid)
    }

    fn decodable_slices<'a>(
        &self,
        slices: &'a [Slice],
        normal: &Vector3<f64>,
    ) -> Vec<OrderedSlice<'a>> {
        slices
            .iter()
            .enumerate()
            .filter_map(|(index, slice)| {
                let Some(pixels) = slice.pixels.as_ref() else {
                    warn!("slice {index} could not be decoded, skipping");
                    return None;
                };
                let key = self
                    .sort_key(&slice.position, slice.instance_number, normal)
                    .unwrap_or(index as f64);
                Some(OrderedSlice {
                    index,
                    key,
                    pixels,
                    position: slice.position,
                })
            })
            .collect()
    }

    fn sort_key(
        &self,
        position: &Option<Vector3<f64>>,
        instance_number: Option<i32>,
        normal: &Vector3<f64>,
    ) -> Option<f64> {
        match self.sort_by {
            SortBy::ImagePositionPatient => position
                .map(|position| position.dot(normal))
                .filter(|key| key.is_finite()),
            SortBy::InstanceNumber => instance_number.map(f64::from),
            SortBy::None => None,
        }
    }

    /// Reverses stacks that run against the slice normal, so the grid's Z
    /// axis always points along it.
    fn align_with_normal(ordered: &mut [OrderedSlice], normal: &Vector3<f64>) {
        if let Some(direction) = Self::stack_direction(ordered)
            && direction.dot(normal) < 0.0
        {
            debug!("stack runs against the slice normal, reversing");
            ordered.reverse();
        }
    }

    fn validate_dimensions(ordered: &[OrderedSlice]) -> Result<(), ReconstructionError> {
        let first_dim = ordered[0].pixels.dim();
        if first_dim.0 == 0 || first_dim.1 == 0 {
            return Err(ReconstructionError::InconsistentDimensions);
        }
        if ordered.iter().any(|slice| slice.pixels.dim() != first_dim) {
            return Err(ReconstructionError::InconsistentDimensions);
        }
        Ok(())
    }

    fn build_volume_array(ordered: &[OrderedSlice], progress: &mut dyn FnMut(u8)) -> Array3<f32> {
        let (height, width) = ordered[0].pixels.dim();
        let depth = ordered.len();
        let mut volume = Array3::<f32>::zeros((depth, height, width));

        for (i, slice) in ordered.iter().enumerate() {
            volume.slice_mut(s![i, .., ..]).assign(slice.pixels);
            progress((10 + (i + 1) * 60 / depth) as u8);
        }

        volume
    }

    /// First-to-last positioned slice, if at least two slices carry a
    /// position and they do not coincide.
    fn positioned_extent(ordered: &[OrderedSlice]) -> Option<(usize, Vector3<f64>, usize, Vector3<f64>)> {
        let mut positioned = ordered
            .iter()
            .enumerate()
            .filter_map(|(index, slice)| slice.position.map(|position| (index, position)));
        let (first_index, first) = positioned.next()?;
        let (last_index, last) = positioned.last()?;
        Some((first_index, first, last_index, last))
    }

    fn stack_direction(ordered: &[OrderedSlice]) -> Option<Vector3<f64>> {
        let (_, first, _, last) = Self::positioned_extent(ordered)?;
        (last - first).try_normalize(f64::EPSILON)
    }

    fn stack_spacing(ordered: &[OrderedSlice]) -> Option<f64> {
        let (first_index, first, last_index, last) = Self::positioned_extent(ordered)?;
        let spacing = (last - first).norm() / (last_index - first_index) as f64;
        (spacing.is_finite() && spacing > 0.0).then_some(spacing)
    }

    /// Grid axes (row, column, stack direction) expressed in the slice frame.
    /// Identity for a stack that advances along the slice normal.
    fn direction_cosines(ordered: &[OrderedSlice], frame: &Matrix3<f64>) -> Matrix3<f64> {
        let row = frame.column(0).into_owned();
        let column = frame.column(1).into_owned();
        let normal = frame.column(2).into_owned();
        let stack = Self::stack_direction(ordered).unwrap_or(normal);
        let to_frame = frame.transpose();
        Matrix3::from_columns(&[to_frame * row, to_frame * column, to_frame * stack])
    }

    /// Resample a stack whose axes follow `direction` onto an axis-aligned
    /// grid of the same shape, spacing and origin.
    fn resample_axis_aligned(
        stacked: &Array3<f32>,
        spacing: (f32, f32, f32),
        direction: &Matrix3<f64>,
        background: f32,
    ) -> Result<Array3<f32>, ReconstructionError> {
        let (z_spacing, y_spacing, x_spacing) = (spacing.0 as f64, spacing.1 as f64, spacing.2 as f64);
        let voxel_to_frame = Matrix3::from_columns(&[
            direction.column(0) * x_spacing,
            direction.column(1) * y_spacing,
            direction.column(2) * z_spacing,
        ]);
        let frame_to_voxel = voxel_to_frame
            .try_inverse()
            .ok_or(ReconstructionError::DegenerateGeometry)?;

        let source = stacked.view();
        let mut resampled = Array3::<f32>::zeros(stacked.dim());
        Zip::indexed(&mut resampled).par_for_each(|(k, j, i), value| {
            let target = Vector3::new(i as f64 * x_spacing, j as f64 * y_spacing, k as f64 * z_spacing);
            let voxel = frame_to_voxel * target;
            *value = Interpolator::trilinear_interpolate(&source, voxel.z, voxel.y, voxel.x, background);
        });
        Ok(resampled)
    }
}
