use crate::{
    config::MprConfig,
    reconstructor::{ReconstructionError, Slice, VolumeReconstructor},
    viewport::ViewId,
    volume::VoxelGrid,
};

use log::{debug, error, info};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
    },
    thread,
    time::Duration,
};
use web_time::Instant;

#[derive(Debug)]
pub enum BuildEvent {
    Progress {
        view: ViewId,
        generation: u64,
        percent: u8,
    },
    Finished {
        view: ViewId,
        generation: u64,
        result: Result<Arc<VoxelGrid>, ReconstructionError>,
    },
}

impl BuildEvent {
    pub fn view(&self) -> ViewId {
        match self {
            BuildEvent::Progress { view, .. } | BuildEvent::Finished { view, .. } => *view,
        }
    }

    pub fn generation(&self) -> u64 {
        match self {
            BuildEvent::Progress { generation, .. } | BuildEvent::Finished { generation, .. } => {
                *generation
            }
        }
    }
}

/// Runs reconstructions off the interactive thread.
///
/// Every request takes a fresh generation number. Only the newest
/// generation per view is current; events from older workers are dropped
/// when drained, so a superseded build simply runs to completion unseen.
pub struct BuildService {
    config: MprConfig,
    next_generation: u64,
    current: HashMap<ViewId, u64>,
    sender: Sender<BuildEvent>,
    receiver: Receiver<BuildEvent>,
}

impl BuildService {
    pub fn new(config: MprConfig) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            config,
            next_generation: 1,
            current: HashMap::new(),
            sender,
            receiver,
        }
    }

    /// Invalidate any outstanding build for `view` and return the new
    /// current generation.
    pub fn supersede(&mut self, view: ViewId) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        if let Some(previous) = self.current.insert(view, generation) {
            debug!("view {view}: build generation {previous} superseded by {generation}");
        }
        generation
    }

    pub fn is_current(&self, view: ViewId, generation: u64) -> bool {
        self.current.get(&view) == Some(&generation)
    }

    /// Start reconstructing `slices` for `view` on a worker thread.
    pub fn start(&mut self, view: ViewId, generation: u64, slices: Arc<[Slice]>) {
        let sender = self.sender.clone();
        let reconstructor = VolumeReconstructor::new(&self.config);
        let job = move || run_build(&reconstructor, view, generation, &slices, &sender);

        let spawned = thread::Builder::new()
            .name(format!("mpr-build-{view}"))
            .spawn(job);
        if let Err(err) = spawned {
            error!("view {view}: could not spawn build worker: {err}");
            let _ = self.sender.send(BuildEvent::Finished {
                view,
                generation,
                result: Err(ReconstructionError::WorkerUnavailable),
            });
        }
    }

    /// Events of current builds received so far, without blocking.
    pub fn drain(&self) -> Vec<BuildEvent> {
        self.receiver
            .try_iter()
            .filter(|event| self.keep(event))
            .collect()
    }

    /// Block until the next event of a current build, or `timeout`.
    pub fn wait(&self, timeout: Duration) -> Option<BuildEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok(event) if self.keep(&event) => return Some(event),
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return None;
                }
            }
        }
    }

    fn keep(&self, event: &BuildEvent) -> bool {
        let current = self.is_current(event.view(), event.generation());
        if !current {
            debug!(
                "view {}: dropping event of stale build {}",
                event.view(),
                event.generation()
            );
        }
        current
    }
}

fn run_build(
    reconstructor: &VolumeReconstructor,
    view: ViewId,
    generation: u64,
    slices: &[Slice],
    sender: &Sender<BuildEvent>,
) {
    let t0 = Instant::now();
    let mut report = |percent: u8| {
        let _ = sender.send(BuildEvent::Progress {
            view,
            generation,
            percent,
        });
    };
    let result = reconstructor
        .build_with_progress(slices, &mut report)
        .map(Arc::new);
    match &result {
        Ok(_) => info!("view {view}: build {generation} finished in {:?}", t0.elapsed()),
        Err(err) => info!("view {view}: build {generation} failed: {err}"),
    }
    // the receiver is gone once the service is dropped
    let _ = sender.send(BuildEvent::Finished {
        view,
        generation,
        result,
    });
}
