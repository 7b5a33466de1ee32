//! # MPR-volume library
//!
//! This crate turns a series of DICOM slices into a voxel grid and renders
//! arbitrary cutting planes through it: multi-planar reconstruction (MPR).
//!
//! Slices are read with the dicom-rs ecosystem, ordered along the stack
//! normal and stacked into a [`VoxelGrid`]. Tilted acquisitions (gantry
//! tilt) are resampled onto an axis-aligned grid. Every view then looks
//! along one grid axis, may rotate around a shared rotation axis and may
//! project a slab of thickness `t` by average, maximum or minimum.
//!  - Primary (axial, looking down Z)
//!  - Secondary A (coronal, looking down Y)
//!  - Secondary B (sagittal, looking down X)
//!
//! Views are coordinated by a [`ViewportSyncController`]: interaction
//! deltas of one active view are re-applied to every other active view,
//! reconstruction runs on a worker thread and superseded builds are never
//! observed, and the plane of each view can be drawn as a cross-reference
//! line in the others.
//!
//! Sampling, projection and windowing run in parallel using rayon.
//!
//! # Examples
//!
//! ## Rendering a coronal MIP slab
//!
//! ```no_run
//! # use mpr_volume::{DicomSource, MprConfig, ProjectionMode, ViewKind, ViewportSyncController};
//! # use std::time::Duration;
//! let series = DicomSource::load_from_directory("dicom")
//!     .expect("should have loaded files from directory");
//! let mut controller = ViewportSyncController::new(
//!     MprConfig::default(),
//!     &[ViewKind::Primary, ViewKind::SecondaryA],
//! );
//! controller.load_series(0, series.slices, series.info);
//! controller.request_mpr(0);
//! assert!(controller.wait_for_build(0, Duration::from_secs(60)));
//! controller.share_grid(0, 1);
//!
//! let view = controller.view_mut(1).expect("view exists");
//! view.set_projection_mode(ProjectionMode::Maximum);
//! view.set_slab_thickness(10.0);
//! let frame = controller.render(1).expect("should have rendered a frame");
//! frame.image.save("coronal_mip.png").expect("should have saved image");
//! ```

pub mod build;
pub mod config;
pub mod dicom_source;
pub mod enums;
mod interpolator;
pub mod overlay;
pub mod plane;
pub mod projector;
pub mod reconstructor;
pub mod sampler;
pub mod sync;
pub mod transform;
pub mod viewport;
pub mod volume;
pub mod window_level;

pub use config::MprConfig;
pub use dicom_source::{DicomSource, LoadedSeries, SeriesInfo, SourceError};
pub use enums::{Axis, ProjectionMode, SortBy, ViewKind, ViewStatus};
pub use reconstructor::{ReconstructionError, Slice, VolumeReconstructor};
pub use sync::{CrossReferenceLine, ViewportSyncController};
pub use viewport::{Interaction, RenderedFrame, ViewId, Viewport};
pub use volume::VoxelGrid;
