use image::{GrayImage, ImageBuffer};
use ndarray::{Array2, ArrayView2, Zip};

/// Maps physical sample values onto 8-bit display gray levels.
pub struct WindowLevelMapper;

impl WindowLevelMapper {
    /// Clip to `[center - width/2, center + width/2]` and scale linearly onto
    /// `0..=255`, truncating.
    ///
    /// NaN maps to 0, infinities to the matching end of the range. A
    /// non-finite or collapsed window is widened to one unit.
    pub fn to_display(values: &ArrayView2<'_, f32>, center: f32, width: f32) -> Array2<u8> {
        let (low, high) = Self::bounds(center, width);
        let mut display = Array2::<u8>::zeros(values.dim());
        Zip::from(&mut display)
            .and(values)
            .par_for_each(|out, &value| *out = Self::map_value(value, low, high));
        display
    }

    fn bounds(center: f32, width: f32) -> (f32, f32) {
        let center = if center.is_finite() { center } else { 0.0 };
        let width = if width.is_finite() && width > 0.0 { width } else { 1.0 };
        let low = center - width / 2.0;
        let high = center + width / 2.0;
        if high > low { (low, high) } else { (low, low + 1.0) }
    }

    #[inline]
    fn map_value(value: f32, low: f32, high: f32) -> u8 {
        if value.is_nan() {
            return 0;
        }
        let clipped = value.clamp(low, high);
        let scaled = ((clipped - low) / (high - low) * 255.0).floor();
        scaled.clamp(0.0, 255.0) as u8
    }

    /// Wrap a display raster as an 8-bit grayscale image.
    pub fn to_image(raster: &Array2<u8>) -> Option<GrayImage> {
        let (height, width) = raster.dim();
        let pixel_data: Vec<u8> = match raster.as_slice() {
            Some(pixels) => pixels.to_vec(),
            None => raster.iter().copied().collect(),
        };
        ImageBuffer::from_raw(width as u32, height as u32, pixel_data)
    }

    /// Windowed image straight from a 2D field.
    pub fn render(values: &ArrayView2<'_, f32>, center: f32, width: f32) -> Option<GrayImage> {
        Self::to_image(&Self::to_display(values, center, width))
    }
}
