use ndarray::ArrayView3;

pub(crate) struct Interpolator;

impl Interpolator {
    /// Output dimensions `(z, y, x)` that preserve physical aspect ratios
    /// when every axis is resampled at the smallest spacing.
    pub(crate) fn get_isotropic_dimensions(
        spacing: (f32, f32, f32),
        original_dim: (usize, usize, usize),
    ) -> (u32, u32, u32) {
        let (z_spacing, y_spacing, x_spacing) = spacing;
        let min_spacing = x_spacing.min(y_spacing).min(z_spacing);
        let inv_min_spacing = 1.0 / min_spacing;

        let new_x = (original_dim.2 as f32 * x_spacing * inv_min_spacing).round() as u32;
        let new_y = (original_dim.1 as f32 * y_spacing * inv_min_spacing).round() as u32;
        let new_z = (original_dim.0 as f32 * z_spacing * inv_min_spacing).round() as u32;

        (new_z.max(1), new_y.max(1), new_x.max(1))
    }

    /// Order-1 interpolation at voxel coordinate `(z, y, x)`.
    ///
    /// Coordinates outside `[0, dim - 1]` on any axis yield `fill`. On the
    /// upper boundary the neighbour is clamped, so sampling degrades to
    /// bilinear/linear there.
    #[inline]
    pub(crate) fn trilinear_interpolate(
        volume: &ArrayView3<f32>,
        z: f64,
        y: f64,
        x: f64,
        fill: f32,
    ) -> f32 {
        let (depth, height, width) = volume.dim();
        if !in_range(z, depth) || !in_range(y, height) || !in_range(x, width) {
            return fill;
        }

        let z0 = z.floor() as usize;
        let y0 = y.floor() as usize;
        let x0 = x.floor() as usize;
        let z1 = (z0 + 1).min(depth - 1);
        let y1 = (y0 + 1).min(height - 1);
        let x1 = (x0 + 1).min(width - 1);

        let dz = (z - z0 as f64) as f32;
        let dy = (y - y0 as f64) as f32;
        let dx = (x - x0 as f64) as f32;

        let lerp = |a: f32, b: f32, t: f32| if t == 0.0 { a } else { a.mul_add(1.0 - t, b * t) };

        let c00 = lerp(volume[[z0, y0, x0]], volume[[z0, y0, x1]], dx);
        let c01 = lerp(volume[[z0, y1, x0]], volume[[z0, y1, x1]], dx);
        let c10 = lerp(volume[[z1, y0, x0]], volume[[z1, y0, x1]], dx);
        let c11 = lerp(volume[[z1, y1, x0]], volume[[z1, y1, x1]], dx);

        let c0 = lerp(c00, c01, dy);
        let c1 = lerp(c10, c11, dy);

        lerp(c0, c1, dz)
    }
}

#[inline]
fn in_range(coordinate: f64, len: usize) -> bool {
    len > 0 && coordinate >= 0.0 && coordinate <= (len - 1) as f64
}
