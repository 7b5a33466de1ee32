/// Maps between widget (screen) pixels and raster (image) pixels.
///
/// The raster is fitted into the widget preserving its display aspect
/// ratio, centered, then scaled by `zoom` and shifted by `pan`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayTransform {
    pub widget_size: (f32, f32),
    pub image_size: (f32, f32),
    /// Display height of one raster row relative to one column.
    pub aspect_ratio: f32,
    pub pan: (f32, f32),
    pub zoom: f32,
}

impl DisplayTransform {
    fn scale(&self) -> Option<f32> {
        let (widget_width, widget_height) = self.widget_size;
        let (image_width, image_height) = self.image_size;
        let display_height = image_height * self.aspect_ratio;
        if !(image_width > 0.0 && display_height > 0.0) {
            return None;
        }
        let scale = (widget_width / image_width).min(widget_height / display_height) * self.zoom;
        (scale.is_finite() && scale > 0.0).then_some(scale)
    }

    fn origin(&self, scale: f32) -> (f32, f32) {
        let draw_width = self.image_size.0 * scale;
        let draw_height = self.image_size.1 * self.aspect_ratio * scale;
        (
            (self.widget_size.0 - draw_width) / 2.0 + self.pan.0,
            (self.widget_size.1 - draw_height) / 2.0 + self.pan.1,
        )
    }

    pub fn screen_to_image(&self, screen: (f32, f32)) -> Option<(f32, f32)> {
        let scale = self.scale()?;
        let (offset_x, offset_y) = self.origin(scale);
        let image_x = (screen.0 - offset_x) / scale;
        let image_y = (screen.1 - offset_y) / scale / self.aspect_ratio;
        Some((image_x, image_y))
    }

    pub fn image_to_screen(&self, image: (f32, f32)) -> Option<(f32, f32)> {
        let scale = self.scale()?;
        let (offset_x, offset_y) = self.origin(scale);
        Some((
            image.0 * scale + offset_x,
            image.1 * self.aspect_ratio * scale + offset_y,
        ))
    }
}
