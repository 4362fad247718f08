//! Owner-scoped load notifications.
//!
//! Every settled request produces exactly one [`LoadEvent`], delivered only
//! to subscribers of the request's [`Owner`]. The bus keeps one unbounded
//! channel per subscriber; publishing to an owner nobody listens to drops
//! the event.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::descriptor::{DescriptorSnapshot, DocumentDescriptor, LoadStatus, SkippedEntry};
use crate::request::Owner;

/// Identifier of one submitted batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub u64);

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Final state of a settled batch.
#[derive(Debug, Clone)]
pub struct LoadReport {
    /// Batch identifier returned by `submit`.
    pub batch: BatchId,
    /// Owner the batch belongs to.
    pub owner: Owner,
    /// Every resolved descriptor, all in a terminal status.
    pub descriptors: Vec<Arc<DocumentDescriptor>>,
    /// Entries that did not resolve to a descriptor.
    pub skipped: Vec<SkippedEntry>,
    /// Time from submission to settlement.
    pub elapsed: Duration,
}

impl LoadReport {
    /// Descriptors that reached `LOADED`.
    pub fn succeeded(&self) -> impl Iterator<Item = &Arc<DocumentDescriptor>> {
        self.descriptors
            .iter()
            .filter(|descriptor| descriptor.status() == LoadStatus::Loaded)
    }

    /// Descriptors that ended in `LOAD_ERROR` or `INVALID`.
    pub fn failed(&self) -> impl Iterator<Item = &Arc<DocumentDescriptor>> {
        self.descriptors
            .iter()
            .filter(|descriptor| descriptor.status().is_failure())
    }

    /// Number of descriptors in the batch.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// True when the batch holds no descriptor.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Serializable summary of the report.
    pub fn summary(&self) -> ReportSummary {
        let documents: Vec<DescriptorSnapshot> = self
            .descriptors
            .iter()
            .map(|descriptor| descriptor.snapshot())
            .collect();

        let count = |status: LoadStatus| documents.iter().filter(|d| d.status == status).count();

        ReportSummary {
            batch: self.batch,
            owner: self.owner.to_string(),
            total: documents.len(),
            loaded: count(LoadStatus::Loaded),
            load_errors: count(LoadStatus::LoadError),
            invalid: count(LoadStatus::Invalid),
            total_pages: documents
                .iter()
                .filter_map(|d| d.metadata.as_ref())
                .map(|m| m.page_count)
                .sum(),
            elapsed_ms: self.elapsed.as_millis() as u64,
            skipped: self.skipped.clone(),
            documents,
        }
    }
}

/// Serializable view of a [`LoadReport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    /// Batch identifier.
    pub batch: BatchId,
    /// Owner of the batch.
    pub owner: String,
    /// Number of resolved documents.
    pub total: usize,
    /// Documents in `LOADED`.
    pub loaded: usize,
    /// Documents in `LOAD_ERROR`.
    pub load_errors: usize,
    /// Documents in `INVALID`.
    pub invalid: usize,
    /// Pages across loaded documents.
    pub total_pages: usize,
    /// Time from submission to settlement, in milliseconds.
    pub elapsed_ms: u64,
    /// Entries skipped before loading.
    pub skipped: Vec<SkippedEntry>,
    /// Final state of each document.
    pub documents: Vec<DescriptorSnapshot>,
}

/// Notification sent to an owner once one of its requests settles.
#[derive(Debug, Clone)]
pub enum LoadEvent {
    /// Every descriptor of the batch reached a terminal status.
    Completed(LoadReport),

    /// The request resolved to zero descriptors.
    NothingToLoad {
        /// Batch identifier.
        batch: BatchId,
        /// Why each entry was skipped.
        skipped: Vec<SkippedEntry>,
    },

    /// The request failed before any entry could be attempted.
    Failed {
        /// Batch identifier.
        batch: BatchId,
        /// Failure description.
        message: String,
    },
}

impl LoadEvent {
    /// Batch the event settles.
    pub fn batch(&self) -> BatchId {
        match self {
            Self::Completed(report) => report.batch,
            Self::NothingToLoad { batch, .. } | Self::Failed { batch, .. } => *batch,
        }
    }

    /// Machine-friendly discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::NothingToLoad { .. } => "nothing_to_load",
            Self::Failed { .. } => "failed",
        }
    }
}

type Subscribers = HashMap<Owner, Vec<mpsc::UnboundedSender<LoadEvent>>>;

/// Per-owner fan-out of load events.
///
/// Each subscriber gets its own unbounded channel, so a slow reader never
/// loses a notification and a publisher never waits on one.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Subscribers>>,
}

impl EventBus {
    /// Create a bus without subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribers(&self) -> MutexGuard<'_, Subscribers> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Listen to the events of `owner`.
    ///
    /// Only events published after this call are received.
    pub fn subscribe(&self, owner: &Owner) -> EventStream {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers()
            .entry(owner.clone())
            .or_default()
            .push(sender);
        EventStream { receiver }
    }

    /// Deliver `event` to the subscribers of `owner`.
    ///
    /// Returns the number of subscribers that received it.
    pub fn publish(&self, owner: &Owner, event: LoadEvent) -> usize {
        let mut subscribers = self.subscribers();
        let Some(senders) = subscribers.get_mut(owner) else {
            tracing::debug!(%owner, kind = event.kind(), "no subscriber for owner, dropping event");
            return 0;
        };

        senders.retain(|sender| sender.send(event.clone()).is_ok());
        let delivered = senders.len();
        if delivered == 0 {
            tracing::debug!(%owner, "all subscribers gone, forgetting owner");
            subscribers.remove(owner);
        }
        delivered
    }
}

/// Receiving end of one owner's events.
#[derive(Debug)]
pub struct EventStream {
    receiver: mpsc::UnboundedReceiver<LoadEvent>,
}

impl EventStream {
    /// Receive the next event, or `None` once the bus is gone.
    ///
    /// Events arrive in publication order and none is ever skipped.
    pub async fn next(&mut self) -> Option<LoadEvent> {
        self.receiver.recv().await
    }
}
