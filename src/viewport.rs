use crate::{
    config::MprConfig,
    dicom_source::SeriesInfo,
    enums::{ProjectionMode, ViewKind, ViewStatus},
    overlay::{OrientationMarkers, OverlayDescriptor},
    plane::{PlaneGeometry, PlaneState},
    projector::SlabProjector,
    reconstructor::{ReconstructionError, Slice, VolumeReconstructor},
    sampler::ObliquePlaneSampler,
    transform::DisplayTransform,
    volume::VoxelGrid,
    window_level::WindowLevelMapper,
};

use image::GrayImage;
use log::{debug, info, warn};
use nalgebra::Vector3;
use std::sync::Arc;

pub type ViewId = usize;

/// Interaction deltas, the only values exchanged between views.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Interaction {
    Scroll(i32),
    Pan { dx: f32, dy: f32 },
    WindowLevel { d_width: f32, d_level: f32 },
    Zoom(f32),
    Rotate(f32),
}

/// An interaction tagged with the view it originated from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Delta {
    pub origin: ViewId,
    pub interaction: Interaction,
}

/// One displayable frame plus its overlay.
#[derive(Clone, Debug)]
pub struct RenderedFrame {
    pub image: GrayImage,
    pub overlay: OverlayDescriptor,
    /// Display height of one raster row relative to one column.
    pub aspect_ratio: f32,
}

/// Decodable slices of a series in display order.
#[derive(Clone, Debug)]
pub struct SliceStack {
    slices: Arc<[Slice]>,
}

impl SliceStack {
    pub fn new(slices: Vec<Slice>, config: &MprConfig) -> Self {
        let order = VolumeReconstructor::new(config).order(&slices);
        let mut slices: Vec<Option<Slice>> = slices.into_iter().map(Some).collect();
        let ordered: Vec<Slice> = order
            .into_iter()
            .filter_map(|index| slices.get_mut(index).and_then(Option::take))
            .collect();
        Self {
            slices: ordered.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    pub fn slices(&self) -> Arc<[Slice]> {
        Arc::clone(&self.slices)
    }

    pub fn get(&self, index: usize) -> Option<&Slice> {
        self.slices.get(index)
    }
}

/// A single view: its status, plane state, bound data and last good frame.
pub struct Viewport {
    id: ViewId,
    config: MprConfig,
    status: ViewStatus,
    state: PlaneState,
    stack: Option<SliceStack>,
    grid: Option<Arc<VoxelGrid>>,
    info: SeriesInfo,
    status_message: Option<String>,
    last_frame: Option<RenderedFrame>,
    drag_accumulator: f32,
}

impl Viewport {
    pub fn new(id: ViewId, kind: ViewKind, config: MprConfig) -> Self {
        let state = PlaneState::new(kind, &config);
        Self {
            id,
            config,
            status: ViewStatus::Unloaded,
            state,
            stack: None,
            grid: None,
            info: SeriesInfo::default(),
            status_message: None,
            last_frame: None,
            drag_accumulator: 0.0,
        }
    }

    pub fn id(&self) -> ViewId {
        self.id
    }

    pub fn status(&self) -> ViewStatus {
        self.status
    }

    pub fn state(&self) -> &PlaneState {
        &self.state
    }

    pub fn grid(&self) -> Option<&Arc<VoxelGrid>> {
        self.grid.as_ref()
    }

    pub fn stack(&self) -> Option<&SliceStack> {
        self.stack.as_ref()
    }

    pub fn info(&self) -> &SeriesInfo {
        &self.info
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    pub fn is_mpr(&self) -> bool {
        matches!(self.status, ViewStatus::Mpr) && self.grid.is_some()
    }

    /// Replace whatever the view shows with a new series. Passes through
    /// `Unloaded`; ends in `Stack` when at least one slice decodes.
    pub fn load_series(&mut self, slices: Vec<Slice>, info: SeriesInfo) {
        self.unload();
        let stack = SliceStack::new(slices, &self.config);
        if stack.is_empty() {
            warn!("view {}: series has no decodable slices", self.id);
            self.status_message = Some("No decodable images".to_string());
            return;
        }

        self.state.set_window(
            info.window_center.unwrap_or(self.config.default_window_center),
            info.window_width.unwrap_or(self.config.default_window_width),
            &self.config,
        );
        self.state.rebind(0);
        self.info = info;
        self.stack = Some(stack);
        self.status = ViewStatus::Stack;
        debug!("view {}: loaded {} slices", self.id, self.index_len());
    }

    pub fn unload(&mut self) {
        self.status = ViewStatus::Unloaded;
        self.stack = None;
        self.grid = None;
        self.info = SeriesInfo::default();
        self.status_message = None;
        self.last_frame = None;
        self.drag_accumulator = 0.0;
    }

    /// Enter the building state. Only a view showing a plain stack can
    /// start a build; returns the slices to reconstruct from.
    pub fn begin_build(&mut self, generation: u64) -> Option<Arc<[Slice]>> {
        let slices = match (&self.status, &self.stack) {
            (ViewStatus::Stack, Some(stack)) => stack.slices(),
            _ => return None,
        };
        self.status = ViewStatus::Building {
            generation,
            progress: 0,
        };
        self.status_message = Some("Building MPR...".to_string());
        Some(slices)
    }

    /// Record build progress; ignored unless `generation` is the build this
    /// view is waiting for.
    pub fn build_progress(&mut self, generation: u64, percent: u8) -> bool {
        match &mut self.status {
            ViewStatus::Building {
                generation: current,
                progress,
            } if *current == generation => {
                *progress = (*progress).max(percent.min(100));
                true
            }
            _ => false,
        }
    }

    /// Apply a terminal build result. Stale generations are discarded; a
    /// failure falls back to the 2D stack untouched.
    pub fn finish_build(
        &mut self,
        generation: u64,
        result: Result<Arc<VoxelGrid>, ReconstructionError>,
    ) -> bool {
        match self.status {
            ViewStatus::Building {
                generation: current,
                ..
            } if current == generation => {}
            _ => {
                debug!("view {}: discarding stale build {generation}", self.id);
                return false;
            }
        }

        match result {
            Ok(grid) => {
                self.bind_grid(grid);
                self.status_message = None;
            }
            Err(err) => {
                warn!("view {}: MPR unavailable: {err}", self.id);
                self.status = ViewStatus::Stack;
                self.status_message = Some(format!("MPR unavailable: {err}"));
            }
        }
        true
    }

    /// Show a reconstructed grid, shared with any other view of the series.
    pub fn bind_grid(&mut self, grid: Arc<VoxelGrid>) {
        self.grid = Some(grid);
        self.status = ViewStatus::Mpr;
        self.last_frame = None;
        let len = self.index_len();
        self.state.rebind(len);
        info!("view {}: MPR ready ({} positions)", self.id, len);
    }

    /// Number of valid slice indices for the current binding.
    pub fn index_len(&self) -> usize {
        match (&self.grid, &self.stack) {
            (Some(grid), _) if self.is_mpr() => {
                grid.len_along(self.config.depth_axis(self.state.view_kind()))
            }
            (_, Some(stack)) => stack.len(),
            _ => 0,
        }
    }

    pub fn set_view_kind(&mut self, kind: ViewKind) {
        self.state.set_view_kind(kind);
        if self.is_mpr() {
            let len = self.index_len();
            self.state.rebind(len);
        }
    }

    pub fn set_projection_mode(&mut self, mode: ProjectionMode) {
        self.state.set_projection_mode(mode);
    }

    pub fn set_slab_thickness(&mut self, thickness_mm: f32) {
        self.state.set_slab_thickness(thickness_mm);
    }

    /// Apply an interaction to this view's own state. Returns whether the
    /// view accepted it; a scroll clamped in place counts as refused.
    pub fn apply(&mut self, interaction: Interaction) -> bool {
        match interaction {
            Interaction::Scroll(steps) => {
                let len = self.index_len();
                return self.state.scroll(steps, len);
            }
            Interaction::Pan { dx, dy } => self.state.pan(dx, dy),
            Interaction::WindowLevel { d_width, d_level } => {
                self.state.adjust_window(d_width, d_level, &self.config)
            }
            Interaction::Zoom(delta) => self.state.zoom(delta, &self.config),
            Interaction::Rotate(delta) => {
                if !self.is_mpr() {
                    return false;
                }
                self.state.rotate(delta);
            }
        }
        true
    }

    /// Apply a delta propagated from a sibling. A view never re-applies a
    /// delta it originated.
    pub fn apply_delta(&mut self, delta: &Delta) -> bool {
        if delta.origin == self.id {
            return false;
        }
        self.apply(delta.interaction)
    }

    /// One wheel notch: rolling towards the user moves forward.
    pub fn wheel(&self, angle_delta: f32) -> Option<Interaction> {
        if self.index_len() == 0 || angle_delta == 0.0 {
            return None;
        }
        Some(Interaction::Scroll(if angle_delta < 0.0 { 1 } else { -1 }))
    }

    /// Accumulate a vertical paging drag, emitting whole scroll steps once
    /// the threshold is exceeded.
    pub fn paging_drag(&mut self, dy: f32) -> Option<Interaction> {
        if self.index_len() == 0 || !dy.is_finite() {
            return None;
        }
        self.drag_accumulator += dy;
        let threshold = self.config.paging_threshold;
        if self.drag_accumulator.abs() <= threshold {
            return None;
        }
        let steps = (self.drag_accumulator / threshold).trunc();
        self.drag_accumulator -= steps * threshold;
        (steps != 0.0).then_some(Interaction::Scroll(steps as i32))
    }

    pub fn reset_drag(&mut self) {
        self.drag_accumulator = 0.0;
    }

    /// Current cutting plane, if a grid is bound.
    pub fn geometry(&self) -> Option<PlaneGeometry> {
        let grid = self.grid.as_ref().filter(|_| self.is_mpr())?;
        Some(PlaneGeometry::for_view(grid, &self.state, &self.config))
    }

    /// Render the current frame. Any per-frame failure reuses the last good
    /// frame; `None` only when nothing was ever renderable.
    pub fn render(&mut self) -> Option<RenderedFrame> {
        let frame = match self.status {
            ViewStatus::Unloaded => return None,
            ViewStatus::Mpr => self.render_mpr(),
            ViewStatus::Stack | ViewStatus::Building { .. } => self.render_stack(),
        };
        match frame {
            Some(frame) => {
                self.last_frame = Some(frame.clone());
                Some(frame)
            }
            None => {
                debug!("view {}: frame failed, reusing last good frame", self.id);
                self.last_frame.clone()
            }
        }
    }

    pub fn last_frame(&self) -> Option<&RenderedFrame> {
        self.last_frame.as_ref()
    }

    /// Screen/image mapping for the last rendered frame in a widget of
    /// `widget_size` pixels.
    pub fn display_transform(&self, widget_size: (f32, f32)) -> Option<DisplayTransform> {
        let frame = self.last_frame.as_ref()?;
        let (width, height) = frame.image.dimensions();
        Some(DisplayTransform {
            widget_size,
            image_size: (width as f32, height as f32),
            aspect_ratio: frame.aspect_ratio,
            pan: self.state.pan_offset(),
            zoom: self.state.zoom_factor(),
        })
    }

    fn render_mpr(&mut self) -> Option<RenderedFrame> {
        let grid = self.grid.as_ref()?;
        self.state.clamp_index(grid.len_along(self.config.depth_axis(self.state.view_kind())));
        let plane = PlaneGeometry::for_view(grid, &self.state, &self.config);
        if plane.width == 0 || plane.height == 0 {
            return None;
        }

        let slab = ObliquePlaneSampler::sample_plane(grid, &plane, self.state.slab_thickness_mm());
        let projected = SlabProjector::project(&slab, self.state.projection_mode());
        let image = WindowLevelMapper::render(
            &projected.view(),
            self.state.window_center(),
            self.state.window_width(),
        )?;

        let orientation = grid.orientation();
        let markers = OrientationMarkers::from_directions(
            &(orientation * plane.basis.right_direction()),
            &(orientation * plane.basis.down_direction()),
        );
        let overlay = OverlayDescriptor::new(
            &self.info,
            &self.state,
            self.index_len(),
            Some(self.state.view_kind()),
            markers,
        );
        Some(RenderedFrame {
            image,
            overlay,
            aspect_ratio: 1.0,
        })
    }

    fn render_stack(&mut self) -> Option<RenderedFrame> {
        let len = self.stack.as_ref()?.len();
        self.state.clamp_index(len);
        let stack = self.stack.as_ref()?;
        let slice = stack.get(self.state.slice_index())?;
        let pixels = slice.pixels.as_ref()?;
        if pixels.is_empty() {
            return None;
        }
        let image = WindowLevelMapper::render(
            &pixels.view(),
            self.state.window_center(),
            self.state.window_width(),
        )?;

        let markers = slice.orientation.and_then(|orientation| {
            let right: Vector3<f64> = orientation.column(0).into_owned();
            let down: Vector3<f64> = orientation.column(1).into_owned();
            OrientationMarkers::from_directions(&right, &down)
        });
        let aspect_ratio = slice
            .pixel_spacing
            .map(|(row, column)| (row / column) as f32)
            .filter(|ratio| ratio.is_finite() && *ratio > 0.0)
            .unwrap_or(1.0);
        let overlay = OverlayDescriptor::new(&self.info, &self.state, len, None, markers);
        Some(RenderedFrame {
            image,
            overlay,
            aspect_ratio,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn stack_slices(count: usize) -> Vec<Slice> {
        (0..count)
            .map(|i| {
                Slice::new(Array2::from_elem((4, 6), i as f32 * 10.0))
                    .with_position(Vector3::new(0.0, 0.0, i as f64))
            })
            .collect()
    }

    #[test]
    fn loading_resets_to_first_slice_and_series_window() {
        let mut view = Viewport::new(0, ViewKind::Primary, MprConfig::default());
        let info = SeriesInfo {
            window_center: Some(300.0),
            window_width: Some(1500.0),
            ..Default::default()
        };
        view.load_series(stack_slices(5), info);
        assert_eq!(view.status(), ViewStatus::Stack);
        assert_eq!(view.state().slice_index(), 0);
        assert_eq!(view.state().window_center(), 300.0);
        assert_eq!(view.state().window_width(), 1500.0);
    }

    #[test]
    fn undecodable_series_stays_unloaded() {
        let mut view = Viewport::new(0, ViewKind::Primary, MprConfig::default());
        view.load_series(vec![Slice::undecodable()], SeriesInfo::default());
        assert_eq!(view.status(), ViewStatus::Unloaded);
        assert!(view.render().is_none());
    }

    #[test]
    fn paging_drag_keeps_remainder() {
        let mut view = Viewport::new(0, ViewKind::Primary, MprConfig::default());
        view.load_series(stack_slices(10), SeriesInfo::default());
        assert_eq!(view.paging_drag(10.0), None);
        assert_eq!(view.paging_drag(25.0), Some(Interaction::Scroll(2)));
        assert_eq!(view.paging_drag(-9.0), None);
        assert_eq!(view.paging_drag(-20.0), Some(Interaction::Scroll(-1)));
    }

    #[test]
    fn wheel_down_moves_forward() {
        let mut view = Viewport::new(0, ViewKind::Primary, MprConfig::default());
        assert_eq!(view.wheel(-120.0), None);
        view.load_series(stack_slices(3), SeriesInfo::default());
        assert_eq!(view.wheel(-120.0), Some(Interaction::Scroll(1)));
        assert_eq!(view.wheel(120.0), Some(Interaction::Scroll(-1)));
    }

    #[test]
    fn scroll_clamped_in_place_is_refused() {
        let mut view = Viewport::new(0, ViewKind::Primary, MprConfig::default());
        assert!(!view.apply(Interaction::Scroll(1)));
        view.load_series(stack_slices(3), SeriesInfo::default());
        assert!(view.apply(Interaction::Scroll(5)));
        assert_eq!(view.state().slice_index(), 2);
        assert!(!view.apply(Interaction::Scroll(1)));
    }

    #[test]
    fn rotation_needs_a_grid() {
        let mut view = Viewport::new(0, ViewKind::Primary, MprConfig::default());
        view.load_series(stack_slices(3), SeriesInfo::default());
        assert!(!view.apply(Interaction::Rotate(15.0)));
        assert_eq!(view.state().rotation_degrees(), 0.0);
    }

    #[test]
    fn stale_build_result_is_discarded() {
        let mut view = Viewport::new(0, ViewKind::Primary, MprConfig::default());
        view.load_series(stack_slices(3), SeriesInfo::default());
        assert!(view.begin_build(1).is_some());
        assert!(!view.finish_build(0, Err(ReconstructionError::InconsistentDimensions)));
        assert_eq!(
            view.status(),
            ViewStatus::Building {
                generation: 1,
                progress: 0
            }
        );
    }

    #[test]
    fn progress_never_decreases() {
        let mut view = Viewport::new(0, ViewKind::Primary, MprConfig::default());
        view.load_series(stack_slices(3), SeriesInfo::default());
        view.begin_build(7);
        assert!(view.build_progress(7, 40));
        assert!(view.build_progress(7, 20));
        assert!(!view.build_progress(6, 90));
        assert_eq!(
            view.status(),
            ViewStatus::Building {
                generation: 7,
                progress: 40
            }
        );
    }
}
