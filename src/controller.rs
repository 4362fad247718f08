//! Batch coordination.
//!
//! The [`LoadController`] is the entry point of the pipeline. `submit`
//! validates nothing beyond what [`LoadRequest`] already guarantees, assigns
//! a [`BatchId`] and hands the request to a single coordinator task, then
//! returns. The coordinator owns all batch bookkeeping:
//!
//! 1. Sources are expanded on the blocking pool (manifest parsing and
//!    filesystem checks), producing deduplicated descriptors.
//! 2. Each descriptor in `CREATED` moves to `REQUESTED` and is handed to the
//!    [`LoadService`]. Descriptors another batch is already loading are
//!    waited on instead of loaded twice. Descriptors that already settled
//!    count as done.
//! 3. Once every descriptor of the batch is terminal, exactly one
//!    [`LoadEvent`] is published to the batch owner.
//!
//! Because only the coordinator moves descriptors out of `CREATED` and out
//! of a terminal status, the check-then-transition steps above never race.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::LoadConfig;
use crate::descriptor::{
    Candidate, DescriptorFactory, DocumentDescriptor, Expansion, LoadStatus, SkippedEntry,
};
use crate::error::{PdfLoadError, Result};
use crate::events::{BatchId, EventBus, EventStream, LoadEvent, LoadReport};
use crate::io::{MetadataExtractor, PdfExtractor, RequiredData};
use crate::manifest::{ListFileReader, ManifestReader};
use crate::request::{LoadRequest, Owner, Source};
use crate::service::{Completion, LoadService, ShutdownMode};

/// Point-in-time view of a submitted batch.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Batch identifier.
    pub id: BatchId,
    /// Owner the batch belongs to.
    pub owner: Owner,
    /// Resolved descriptors, deduplicated, in source order.
    pub descriptors: Vec<Arc<DocumentDescriptor>>,
    /// Entries that did not resolve to a descriptor.
    pub skipped: Vec<SkippedEntry>,
    /// Whether the batch notification has been published.
    pub settled: bool,
}

type BatchTable = Arc<Mutex<HashMap<BatchId, Batch>>>;

fn lock(table: &BatchTable) -> MutexGuard<'_, HashMap<BatchId, Batch>> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Command {
    Submit {
        batch: BatchId,
        request: LoadRequest,
        started: Instant,
        reply: Option<oneshot::Sender<LoadEvent>>,
    },
    Expanded {
        batch: BatchId,
        owner: Owner,
        required: RequiredData,
        started: Instant,
        outcome: Result<Expansion>,
    },
    Retry {
        batch: BatchId,
        owner: Owner,
        descriptors: Vec<Arc<DocumentDescriptor>>,
        required: RequiredData,
        started: Instant,
    },
    Evict {
        path: PathBuf,
        reply: oneshot::Sender<bool>,
    },
    Shutdown {
        mode: ShutdownMode,
        reply: oneshot::Sender<()>,
    },
}

/// Accepts load requests and notifies owners when they settle.
pub struct LoadController {
    config: LoadConfig,
    factory: Arc<DescriptorFactory>,
    events: EventBus,
    batches: BatchTable,
    commands: mpsc::UnboundedSender<Command>,
    next_batch: AtomicU64,
    closed: AtomicBool,
    coordinator: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for LoadController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadController")
            .field("config", &self.config)
            .field("batches", &lock(&self.batches).len())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl LoadController {
    /// Create a controller that reads real PDF files and text/CSV manifests.
    ///
    /// # Errors
    ///
    /// Returns [`PdfLoadError::InvalidConfig`] for an invalid configuration
    /// or when called outside a Tokio runtime.
    pub fn new(config: LoadConfig) -> Result<Self> {
        Self::with_collaborators(
            config,
            Arc::new(PdfExtractor::new()),
            Arc::new(ListFileReader::new()),
        )
    }

    /// Create a controller with custom extraction and manifest parsing.
    ///
    /// # Errors
    ///
    /// Same as [`LoadController::new`].
    pub fn with_collaborators(
        config: LoadConfig,
        extractor: Arc<dyn MetadataExtractor>,
        manifests: Arc<dyn ManifestReader>,
    ) -> Result<Self> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            PdfLoadError::invalid_config("load controller must be created inside a Tokio runtime")
        })?;

        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let workers = config.effective_workers();
        let factory = Arc::new(DescriptorFactory::new());
        let events = EventBus::new();
        let batches = BatchTable::default();

        let coordinator = Coordinator {
            factory: Arc::clone(&factory),
            manifests,
            service: LoadService::new(extractor, workers, completions_tx),
            events: events.clone(),
            batches: Arc::clone(&batches),
            commands: commands_tx.downgrade(),
            expanding: HashMap::new(),
            pending: HashMap::new(),
            waiting: HashMap::new(),
            replies: HashMap::new(),
            draining: None,
        };
        let handle = runtime.spawn(coordinator.run(commands_rx, completions_rx));

        tracing::debug!(workers, "load controller started");

        Ok(Self {
            config,
            factory,
            events,
            batches,
            commands: commands_tx,
            next_batch: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            coordinator: Mutex::new(Some(handle)),
        })
    }

    /// Configuration the controller was built with.
    pub fn config(&self) -> &LoadConfig {
        &self.config
    }

    /// The owner-scoped event bus.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// The descriptor registry.
    pub fn factory(&self) -> &DescriptorFactory {
        &self.factory
    }

    /// Listen to the notifications of `owner`.
    pub fn subscribe(&self, owner: &Owner) -> EventStream {
        self.events.subscribe(owner)
    }

    /// Accept a request and return without waiting for any load.
    ///
    /// The batch is announced to the owner's subscribers exactly once, when
    /// it settles. Sources are expanded after this returns, so
    /// [`batch`](Self::batch) yields `None` until expansion finishes; from
    /// then on every descriptor of the batch is at least `REQUESTED`.
    ///
    /// Every load reads at least the configured
    /// [`required_data`](LoadConfig::required_data), even if the request
    /// asks for less.
    ///
    /// # Errors
    ///
    /// Returns [`PdfLoadError::ControllerClosed`] after shutdown.
    pub fn submit(&self, request: LoadRequest) -> Result<BatchId> {
        self.enqueue(request, None)
    }

    fn enqueue(
        &self,
        request: LoadRequest,
        reply: Option<oneshot::Sender<LoadEvent>>,
    ) -> Result<BatchId> {
        self.ensure_open()?;
        let batch = self.next_batch_id();
        let required = request.required_data().max(self.config.required_data);
        let request = request.with_required_data(required);

        tracing::info!(
            %batch,
            owner = %request.owner(),
            sources = request.sources().len(),
            "request submitted"
        );

        self.send(Command::Submit {
            batch,
            request,
            started: Instant::now(),
            reply,
        })?;
        Ok(batch)
    }

    /// Submit a request and wait for its notification.
    ///
    /// The event is handed to the caller directly and is also published to
    /// the owner's subscribers.
    ///
    /// # Errors
    ///
    /// Returns [`PdfLoadError::ControllerClosed`] if the controller is shut
    /// down or its coordinator stops before the batch settles.
    pub async fn load(&self, request: LoadRequest) -> Result<LoadEvent> {
        let (reply, settled) = oneshot::channel();
        self.enqueue(request, Some(reply))?;
        settled.await.map_err(|_| PdfLoadError::ControllerClosed)
    }

    /// Load documents again for `owner`.
    ///
    /// Every path must name a live descriptor in `LOADED` or `LOAD_ERROR`.
    /// The descriptors move back to `REQUESTED` and the new batch is
    /// announced like any other. The load reads at least the configured
    /// [`RequiredData`] and at least what any of the documents was last
    /// loaded with.
    ///
    /// # Errors
    ///
    /// Returns [`PdfLoadError::RetryRejected`] for a path that was never
    /// loaded, is still loading, or is `INVALID`; nothing is retried in that
    /// case. Returns [`PdfLoadError::NoSources`] for an empty path list.
    pub fn retry<I, P>(&self, owner: impl Into<String>, paths: I) -> Result<BatchId>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.ensure_open()?;
        let owner = Owner::new(owner)?;

        let mut seen = HashSet::new();
        let mut descriptors = Vec::new();
        for path in paths {
            let path = path.as_ref();
            let Some(descriptor) = self.factory.get(path) else {
                return Err(PdfLoadError::RetryRejected {
                    path: path.to_path_buf(),
                    status: LoadStatus::Created,
                });
            };

            let status = descriptor.status();
            if !matches!(status, LoadStatus::Loaded | LoadStatus::LoadError) {
                return Err(PdfLoadError::RetryRejected {
                    path: descriptor.path().to_path_buf(),
                    status,
                });
            }
            if seen.insert(descriptor.path().to_path_buf()) {
                descriptors.push(descriptor);
            }
        }
        if descriptors.is_empty() {
            return Err(PdfLoadError::NoSources);
        }

        let required = descriptors
            .iter()
            .filter_map(|descriptor| descriptor.required_data())
            .fold(self.config.required_data, Ord::max);

        let batch = self.next_batch_id();
        tracing::info!(%batch, %owner, documents = descriptors.len(), ?required, "retry submitted");

        self.send(Command::Retry {
            batch,
            owner,
            descriptors,
            required,
            started: Instant::now(),
        })?;
        Ok(batch)
    }

    /// Current view of a batch.
    ///
    /// Returns `None` for unknown or released batches, and while the batch
    /// sources are still being expanded, which includes the moment right
    /// after [`submit`](Self::submit) returns. Once visible, every
    /// descriptor is at least `REQUESTED`.
    pub fn batch(&self, id: BatchId) -> Option<Batch> {
        lock(&self.batches).get(&id).cloned()
    }

    /// Drop the record of a settled batch.
    ///
    /// Descriptors only referenced by released batches become eligible for
    /// reclamation. Returns whether a record was removed.
    pub fn release(&self, id: BatchId) -> bool {
        let mut batches = lock(&self.batches);
        match batches.get(&id) {
            Some(batch) if batch.settled => batches.remove(&id).is_some(),
            _ => false,
        }
    }

    /// Forget the live descriptor for `path` so the next request starts
    /// from a fresh `CREATED` descriptor.
    ///
    /// Refused (returns `false`) while the path is being loaded or while
    /// any request is still being expanded.
    ///
    /// # Errors
    ///
    /// Returns [`PdfLoadError::ControllerClosed`] after shutdown.
    pub async fn evict(&self, path: impl AsRef<Path>) -> Result<bool> {
        let path = path.as_ref();
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        let (reply, evicted) = oneshot::channel();
        self.send(Command::Evict { path, reply })?;
        evicted.await.map_err(|_| PdfLoadError::ControllerClosed)
    }

    /// Stop accepting requests and wind the pipeline down.
    ///
    /// [`ShutdownMode::Drain`] lets every accepted batch settle first.
    /// [`ShutdownMode::Abort`] stops immediately and publishes a
    /// [`LoadEvent::Failed`] for every batch that had not settled.
    pub async fn shutdown(&self, mode: ShutdownMode) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(?mode, "shutting down load controller");

        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::Shutdown { mode, reply }).is_ok() {
            let _ = done.await;
        }

        let handle = self
            .coordinator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle
            && let Err(err) = handle.await
        {
            tracing::error!(error = %err, "coordinator task failed");
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PdfLoadError::ControllerClosed);
        }
        Ok(())
    }

    fn next_batch_id(&self) -> BatchId {
        BatchId(self.next_batch.fetch_add(1, Ordering::SeqCst))
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| PdfLoadError::ControllerClosed)
    }
}

struct Waiter {
    batch: BatchId,
    attempt: u32,
}

struct PendingBatch {
    owner: Owner,
    descriptors: Vec<Arc<DocumentDescriptor>>,
    skipped: Vec<SkippedEntry>,
    started: Instant,
    remaining: usize,
}

/// Single task owning every batch in progress.
struct Coordinator {
    factory: Arc<DescriptorFactory>,
    manifests: Arc<dyn ManifestReader>,
    service: LoadService,
    events: EventBus,
    batches: BatchTable,
    commands: mpsc::WeakUnboundedSender<Command>,
    expanding: HashMap<BatchId, Owner>,
    pending: HashMap<BatchId, PendingBatch>,
    waiting: HashMap<PathBuf, Vec<Waiter>>,
    replies: HashMap<BatchId, oneshot::Sender<LoadEvent>>,
    draining: Option<oneshot::Sender<()>>,
}

impl Coordinator {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        loop {
            tokio::select! {
                Some(completion) = completions.recv() => self.on_completion(completion),
                command = commands.recv() => match command {
                    Some(command) => {
                        if self.handle(command).await {
                            break;
                        }
                    }
                    None => {
                        tracing::debug!("controller dropped, stopping coordinator");
                        break;
                    }
                },
            }

            if self.draining.is_some() && self.expanding.is_empty() && self.pending.is_empty() {
                self.service.shutdown(ShutdownMode::Drain).await;
                if let Some(reply) = self.draining.take() {
                    let _ = reply.send(());
                }
                break;
            }
        }
    }

    /// Apply one command. Returns `true` once the coordinator must stop.
    async fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Submit {
                batch,
                request,
                started,
                reply,
            } => {
                if let Some(reply) = reply {
                    self.replies.insert(batch, reply);
                }
                self.expand(batch, request, started);
            }
            Command::Expanded {
                batch,
                owner,
                required,
                started,
                outcome,
            } => self.on_expanded(batch, owner, required, started, outcome),
            Command::Retry {
                batch,
                owner,
                descriptors,
                required,
                started,
            } => self.admit(batch, owner, descriptors, Vec::new(), required, started, true),
            Command::Evict { path, reply } => {
                let _ = reply.send(self.evict(path));
            }
            Command::Shutdown {
                mode: ShutdownMode::Abort,
                reply,
            } => {
                self.abort().await;
                let _ = reply.send(());
                return true;
            }
            Command::Shutdown {
                mode: ShutdownMode::Drain,
                reply,
            } => self.draining = Some(reply),
        }
        false
    }

    fn expand(&mut self, batch: BatchId, request: LoadRequest, started: Instant) {
        self.expanding.insert(batch, request.owner().clone());

        let factory = Arc::clone(&self.factory);
        let manifests = Arc::clone(&self.manifests);
        let commands = self.commands.clone();
        tokio::task::spawn_blocking(move || {
            let outcome = resolve_sources(&factory, manifests.as_ref(), request.sources());
            if let Some(commands) = commands.upgrade() {
                let _ = commands.send(Command::Expanded {
                    batch,
                    owner: request.owner().clone(),
                    required: request.required_data(),
                    started,
                    outcome,
                });
            }
        });
    }

    fn on_expanded(
        &mut self,
        batch: BatchId,
        owner: Owner,
        required: RequiredData,
        started: Instant,
        outcome: Result<Expansion>,
    ) {
        self.expanding.remove(&batch);

        let expansion = match outcome {
            Ok(expansion) => expansion,
            Err(err) => {
                tracing::error!(%batch, %owner, error = %err, "request failed");
                self.record(batch, &owner, Vec::new(), Vec::new(), true);
                self.notify(
                    &owner,
                    LoadEvent::Failed {
                        batch,
                        message: err.to_string(),
                    },
                );
                return;
            }
        };

        if expansion.is_empty() {
            tracing::info!(%batch, %owner, skipped = expansion.skipped.len(), "nothing to load");
            self.record(batch, &owner, Vec::new(), expansion.skipped.clone(), true);
            self.notify(
                &owner,
                LoadEvent::NothingToLoad {
                    batch,
                    skipped: expansion.skipped,
                },
            );
            return;
        }

        self.admit(
            batch,
            owner,
            expansion.descriptors,
            expansion.skipped,
            required,
            started,
            false,
        );
    }

    /// Start loading what needs loading and register the batch as a waiter
    /// on everything not yet settled.
    #[allow(clippy::too_many_arguments)]
    fn admit(
        &mut self,
        batch: BatchId,
        owner: Owner,
        descriptors: Vec<Arc<DocumentDescriptor>>,
        skipped: Vec<SkippedEntry>,
        required: RequiredData,
        started: Instant,
        reload: bool,
    ) {
        let mut dispatch = Vec::new();
        let mut remaining = 0;

        for descriptor in &descriptors {
            let status = descriptor.status();
            let wait = match status {
                LoadStatus::Created => {
                    descriptor.advance(LoadStatus::Requested);
                    dispatch.push(Arc::clone(descriptor));
                    true
                }
                LoadStatus::Requested | LoadStatus::Loading => true,
                _ if reload && status.can_move_to(LoadStatus::Requested) => {
                    descriptor.advance(LoadStatus::Requested);
                    dispatch.push(Arc::clone(descriptor));
                    true
                }
                _ => false,
            };

            if wait {
                remaining += 1;
                self.waiting
                    .entry(descriptor.path().to_path_buf())
                    .or_default()
                    .push(Waiter {
                        batch,
                        attempt: descriptor.attempt(),
                    });
            }
        }

        self.record(batch, &owner, descriptors.clone(), skipped.clone(), false);
        let queued = self.service.load(dispatch, required);
        tracing::debug!(
            %batch,
            documents = descriptors.len(),
            queued,
            waiting = remaining,
            "batch admitted"
        );

        let pending = PendingBatch {
            owner,
            descriptors,
            skipped,
            started,
            remaining,
        };
        if remaining == 0 {
            self.settle(batch, pending);
        } else {
            self.pending.insert(batch, pending);
        }
    }

    fn on_completion(&mut self, completion: Completion) {
        let path = completion.descriptor.path();
        let Some(waiters) = self.waiting.get_mut(path) else {
            tracing::debug!(path = %path.display(), "completion without waiter");
            return;
        };

        let mut settled = Vec::new();
        waiters.retain(|waiter| {
            if waiter.attempt <= completion.attempt {
                settled.push(waiter.batch);
                false
            } else {
                true
            }
        });
        if waiters.is_empty() {
            self.waiting.remove(path);
        }

        for batch in settled {
            let Some(pending) = self.pending.get_mut(&batch) else {
                continue;
            };
            pending.remaining -= 1;
            if pending.remaining == 0
                && let Some(pending) = self.pending.remove(&batch)
            {
                self.settle(batch, pending);
            }
        }
    }

    fn settle(&mut self, batch: BatchId, pending: PendingBatch) {
        let report = LoadReport {
            batch,
            owner: pending.owner.clone(),
            descriptors: pending.descriptors,
            skipped: pending.skipped,
            elapsed: pending.started.elapsed(),
        };

        tracing::info!(
            %batch,
            owner = %report.owner,
            loaded = report.succeeded().count(),
            failed = report.failed().count(),
            skipped = report.skipped.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "batch settled"
        );

        self.mark_settled(batch);
        self.notify(&pending.owner, LoadEvent::Completed(report));
    }

    /// Deliver the one notification of a batch.
    fn notify(&mut self, owner: &Owner, event: LoadEvent) {
        if let Some(reply) = self.replies.remove(&event.batch()) {
            let _ = reply.send(event.clone());
        }
        self.events.publish(owner, event);
    }

    fn mark_settled(&self, batch: BatchId) {
        if let Some(record) = lock(&self.batches).get_mut(&batch) {
            record.settled = true;
        }
    }

    fn record(
        &self,
        batch: BatchId,
        owner: &Owner,
        descriptors: Vec<Arc<DocumentDescriptor>>,
        skipped: Vec<SkippedEntry>,
        settled: bool,
    ) {
        lock(&self.batches).insert(
            batch,
            Batch {
                id: batch,
                owner: owner.clone(),
                descriptors,
                skipped,
                settled,
            },
        );
    }

    /// `path` is already canonical.
    fn evict(&self, path: PathBuf) -> bool {
        if self.waiting.contains_key(&path) || !self.expanding.is_empty() {
            tracing::debug!(path = %path.display(), "path busy, not evicting");
            return false;
        }
        self.factory.evict(&path)
    }

    async fn abort(&mut self) {
        self.service.shutdown(ShutdownMode::Abort).await;

        let expanding: Vec<_> = self.expanding.drain().collect();
        for (batch, owner) in &expanding {
            self.record(*batch, owner, Vec::new(), Vec::new(), true);
        }
        let pending: Vec<_> = self
            .pending
            .drain()
            .map(|(batch, pending)| (batch, pending.owner))
            .collect();
        for (batch, _) in &pending {
            self.mark_settled(*batch);
        }

        for (batch, owner) in expanding.into_iter().chain(pending) {
            tracing::warn!(%batch, %owner, "batch abandoned by shutdown");
            self.notify(
                &owner,
                LoadEvent::Failed {
                    batch,
                    message: PdfLoadError::ControllerClosed.to_string(),
                },
            );
        }
        self.waiting.clear();
        self.replies.clear();
    }
}

fn resolve_sources(
    factory: &DescriptorFactory,
    manifests: &dyn ManifestReader,
    sources: &[Source],
) -> Result<Expansion> {
    let mut candidates = Vec::new();
    for source in sources {
        match source {
            Source::Path(path) => candidates.push(Candidate::path(path)),
            Source::Manifest(path) => candidates.extend(manifests.parse(path)?),
        }
    }
    Ok(factory.expand(candidates))
}
