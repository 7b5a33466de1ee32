use crate::enums::ProjectionMode;

use ndarray::{Array2, Array3, Axis};

/// Collapses a `(depth, height, width)` slab into one image.
pub struct SlabProjector;

impl SlabProjector {
    /// Reduce along depth. A single-layer slab is returned as-is regardless
    /// of `mode`; an empty one yields an empty image.
    pub fn project(samples: &Array3<f32>, mode: ProjectionMode) -> Array2<f32> {
        let (depth, height, width) = samples.dim();
        match depth {
            0 => Array2::zeros((height, width)),
            1 => samples.index_axis(Axis(0), 0).to_owned(),
            _ => Self::reduce(samples, mode),
        }
    }

    fn reduce(samples: &Array3<f32>, mode: ProjectionMode) -> Array2<f32> {
        let depth = samples.len_of(Axis(0));
        match mode {
            ProjectionMode::Maximum => {
                samples.fold_axis(Axis(0), f32::NEG_INFINITY, |acc, &value| acc.max(value))
            }
            ProjectionMode::Minimum => {
                samples.fold_axis(Axis(0), f32::INFINITY, |acc, &value| acc.min(value))
            }
            ProjectionMode::Average => samples.map_axis(Axis(0), |column| {
                let sum: f64 = column.iter().map(|&value| value as f64).sum();
                // bound by the extremes so rounding never escapes [min, max]
                let (low, high) = column
                    .iter()
                    .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
                let mean = (sum / depth as f64) as f32;
                if low <= high { mean.clamp(low, high) } else { mean }
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn single_layer_passes_through() {
        let samples = array![[[1.0_f32, 2.0], [3.0, 4.0]]];
        for mode in [ProjectionMode::Average, ProjectionMode::Maximum, ProjectionMode::Minimum] {
            assert_eq!(SlabProjector::project(&samples, mode), array![[1.0, 2.0], [3.0, 4.0]]);
        }
    }

    #[test]
    fn reducers_pick_expected_values() {
        let samples = array![[[1.0_f32, -5.0]], [[3.0, 5.0]], [[8.0, 0.0]]];
        assert_eq!(SlabProjector::project(&samples, ProjectionMode::Maximum), array![[8.0, 5.0]]);
        assert_eq!(SlabProjector::project(&samples, ProjectionMode::Minimum), array![[1.0, -5.0]]);
        assert_eq!(SlabProjector::project(&samples, ProjectionMode::Average), array![[4.0, 0.0]]);
    }
}
