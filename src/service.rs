//! Concurrent metadata loading.
//!
//! [`LoadService`] runs one task per descriptor, bounded by a semaphore sized
//! to the worker count, and moves each descriptor through
//! `REQUESTED -> LOADING -> LOADED | LOAD_ERROR | INVALID`. The extraction
//! itself runs on the blocking pool. At most one load per path is in flight
//! at any time: a descriptor whose path is already being loaded is coalesced
//! into the running load instead of starting a second one.
//!
//! Each finished load is reported as a [`Completion`] on the channel given at
//! construction time; `load` itself returns as soon as the tasks are queued.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Semaphore, mpsc, watch};

use crate::descriptor::{DocumentDescriptor, FailureKind, LoadFailure, LoadStatus};
use crate::io::{MetadataExtractor, RequiredData};

/// A descriptor reached a terminal status.
#[derive(Debug, Clone)]
pub struct Completion {
    /// The settled descriptor.
    pub descriptor: Arc<DocumentDescriptor>,
    /// Load attempt that settled, see [`DocumentDescriptor::attempt`].
    pub attempt: u32,
}

/// How to stop the worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Wait for every queued and running load to finish.
    Drain,
    /// Stop handing out worker slots; queued loads are abandoned.
    Abort,
}

struct ServiceInner {
    extractor: Arc<dyn MetadataExtractor>,
    permits: Arc<Semaphore>,
    workers: usize,
    in_flight: Mutex<HashSet<PathBuf>>,
    in_flight_count: watch::Sender<usize>,
    completions: mpsc::UnboundedSender<Completion>,
}

impl ServiceInner {
    fn in_flight(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn claim(&self, path: PathBuf) -> bool {
        let mut in_flight = self.in_flight();
        let claimed = in_flight.insert(path);
        self.in_flight_count.send_replace(in_flight.len());
        claimed
    }

    fn release(&self, path: &PathBuf) {
        let mut in_flight = self.in_flight();
        in_flight.remove(path);
        self.in_flight_count.send_replace(in_flight.len());
    }
}

/// Releases the in-flight claim on a path on every exit path of a worker.
struct Claim {
    inner: Arc<ServiceInner>,
    path: PathBuf,
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.inner.release(&self.path);
    }
}

/// Bounded worker pool that loads descriptor metadata.
#[derive(Clone)]
pub struct LoadService {
    inner: Arc<ServiceInner>,
}

impl std::fmt::Debug for LoadService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadService")
            .field("workers", &self.inner.workers)
            .field("permits_available", &self.inner.permits.available_permits())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl LoadService {
    /// Create a pool of `workers` slots reporting to `completions`.
    ///
    /// A worker count of zero is raised to one.
    pub fn new(
        extractor: Arc<dyn MetadataExtractor>,
        workers: usize,
        completions: mpsc::UnboundedSender<Completion>,
    ) -> Self {
        let workers = workers.max(1);
        Self {
            inner: Arc::new(ServiceInner {
                extractor,
                permits: Arc::new(Semaphore::new(workers)),
                workers,
                in_flight: Mutex::new(HashSet::new()),
                in_flight_count: watch::Sender::new(0),
                completions,
            }),
        }
    }

    /// Number of worker slots.
    pub fn workers(&self) -> usize {
        self.inner.workers
    }

    /// Number of paths with a queued or running load.
    pub fn in_flight(&self) -> usize {
        *self.inner.in_flight_count.borrow()
    }

    /// Queue a load for every `REQUESTED` descriptor.
    ///
    /// Returns immediately; progress is observed through the descriptors'
    /// status and the completion channel. Descriptors whose path already has
    /// a load in flight are coalesced into it, and descriptors that are not
    /// `REQUESTED` are ignored. Returns the number of loads queued.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn load(&self, descriptors: Vec<Arc<DocumentDescriptor>>, required: RequiredData) -> usize {
        let mut queued = 0;

        for descriptor in descriptors {
            let status = descriptor.status();
            if status != LoadStatus::Requested {
                tracing::warn!(path = %descriptor.path().display(), %status, "not requested, ignoring");
                continue;
            }

            let path = descriptor.path().to_path_buf();
            if !self.inner.claim(path.clone()) {
                tracing::debug!(path = %path.display(), "load already in flight, coalescing");
                continue;
            }

            let claim = Claim {
                inner: Arc::clone(&self.inner),
                path,
            };
            tokio::spawn(run_load(claim, descriptor, required));
            queued += 1;
        }

        queued
    }

    /// Stop the pool.
    ///
    /// With [`ShutdownMode::Drain`] this waits until no load is in flight.
    /// With [`ShutdownMode::Abort`] loads still waiting for a slot are dropped
    /// and their descriptors stay `REQUESTED`.
    pub async fn shutdown(&self, mode: ShutdownMode) {
        if mode == ShutdownMode::Drain {
            let mut count = self.inner.in_flight_count.subscribe();
            // The sender lives in `inner`, so this only ends when the count hits zero.
            let _ = count.wait_for(|in_flight| *in_flight == 0).await;
        }
        self.inner.permits.close();
    }
}

async fn run_load(claim: Claim, descriptor: Arc<DocumentDescriptor>, required: RequiredData) {
    let inner = Arc::clone(&claim.inner);
    let Ok(_permit) = Arc::clone(&inner.permits).acquire_owned().await else {
        tracing::warn!(path = %claim.path.display(), "worker pool closed, load abandoned");
        return;
    };

    if let Err(err) = descriptor.start_loading(required) {
        panic!("descriptor state machine violated: {err}");
    }
    let attempt = descriptor.attempt();

    let extractor = Arc::clone(&inner.extractor);
    let path = claim.path.clone();
    let outcome = tokio::task::spawn_blocking(move || extractor.extract(&path, required)).await;

    // Free the path before the terminal status becomes visible, so a retry
    // observed right after settlement can claim it again.
    drop(claim);

    let settled = match outcome {
        Ok(Ok(metadata)) => {
            tracing::debug!(path = %descriptor.path().display(), pages = metadata.page_count, "loaded");
            descriptor.complete(metadata)
        }
        Ok(Err(err)) => {
            tracing::warn!(path = %descriptor.path().display(), error = %err, "load failed");
            descriptor.fail(LoadFailure::from(&err))
        }
        Err(join_err) => {
            tracing::error!(path = %descriptor.path().display(), error = %join_err, "extractor panicked");
            descriptor.fail(LoadFailure::new(
                FailureKind::Invalid,
                format!("document could not be parsed: {join_err}"),
            ))
        }
    };
    if let Err(err) = settled {
        panic!("descriptor state machine violated: {err}");
    }

    if inner
        .completions
        .send(Completion {
            descriptor,
            attempt,
        })
        .is_err()
    {
        tracing::debug!("completion receiver dropped");
    }
}
