use std::{error::Error, path::PathBuf, time::Duration};

use clap::Parser;
use log::{info, warn};
use mpr_volume::{DicomSource, MprConfig, ProjectionMode, ViewKind, ViewportSyncController};

#[derive(Debug, clap::ValueEnum, Clone, Copy)]
enum ArgMode {
    Avg,
    Mip,
    Minip,
}

impl From<ArgMode> for ProjectionMode {
    fn from(mode: ArgMode) -> Self {
        match mode {
            ArgMode::Avg => ProjectionMode::Average,
            ArgMode::Mip => ProjectionMode::Maximum,
            ArgMode::Minip => ProjectionMode::Minimum,
        }
    }
}

/// Reconstruct a DICOM series and write the primary and both secondary
/// planes as PNG files.
#[derive(Parser, Debug)]
struct Args {
    dicom_dir: PathBuf,
    dest_dir: PathBuf,
    /// Slab thickness in millimeters, 0 for a single plane.
    #[arg(long, default_value_t = 0.0)]
    slab: f32,
    #[arg(long, value_enum, default_value = "avg")]
    mode: ArgMode,
    /// Rotation around the shared axis, in degrees.
    #[arg(long, default_value_t = 0.0)]
    rotate: f32,
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,
}

fn main() -> Result<(), Box<dyn Error + Sync + Send>> {
    let env = env_logger::Env::default().filter_or("RUST_LOG", "info");
    env_logger::init_from_env(env);

    let args = Args::parse();

    let series = DicomSource::load_from_directory(&args.dicom_dir)?;
    let mut controller = ViewportSyncController::new(MprConfig::default(), &ViewKind::ALL);
    controller.load_series(0, series.slices, series.info);

    if controller.request_mpr(0).is_none() {
        return Err("series could not be shown".into());
    }
    if !controller.wait_for_build(0, Duration::from_secs(args.timeout_secs)) {
        let reason = controller
            .view(0)
            .and_then(|view| view.status_message())
            .unwrap_or("timed out")
            .to_string();
        warn!("no MPR: {reason}");
        return Err(reason.into());
    }

    for id in 1..ViewKind::ALL.len() {
        controller.share_grid(0, id);
    }
    for id in 0..ViewKind::ALL.len() {
        if let Some(view) = controller.view_mut(id) {
            view.set_projection_mode(args.mode.into());
            view.set_slab_thickness(args.slab);
        }
        if args.rotate != 0.0 {
            controller.select(id, true);
        }
    }
    if args.rotate != 0.0 {
        controller.dispatch(0, mpr_volume::Interaction::Rotate(args.rotate));
    }

    std::fs::create_dir_all(&args.dest_dir)?;
    for (id, kind) in ViewKind::ALL.iter().enumerate() {
        let Some(frame) = controller.render(id) else {
            warn!("{kind}: nothing to render");
            continue;
        };
        let path = args.dest_dir.join(format!("{}.png", kind.to_string().to_lowercase()));
        frame.image.save(&path)?;
        info!("{kind}: wrote {}", path.display());
        for line in controller.cross_reference_lines(id) {
            info!("{kind}: cross-reference {line:?}");
        }
    }

    Ok(())
}
