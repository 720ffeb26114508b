//! Periodic status reconciliation.
//!
//! Push delivery is at-most-once: events sent while the channel was down are
//! gone. A [`Reconciler`] covers that gap for documents still processing by
//! polling a pull-based [`StatusSource`] and synthesizing the events a
//! consumer missed. It runs beside the channel and never touches it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use doclink_core::{DocumentEvent, ProcessingStatus};
use doclink_settings::ReconcileSettings;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Why a status lookup failed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SourceError {
    /// The backend does not know this document.
    #[error("document {0} not found")]
    NotFound(String),
    /// The backend could not be reached or answered badly.
    #[error("status source unavailable: {0}")]
    Unavailable(String),
}

/// Pull-based lookup of a document's current status.
#[async_trait]
pub trait StatusSource: Send + Sync + 'static {
    /// Current status of `document_id`.
    async fn fetch_status(&self, document_id: &str) -> Result<ProcessingStatus, SourceError>;
}

/// Polls in-progress documents and reports status changes.
pub struct Reconciler {
    source: Arc<dyn StatusSource>,
    interval: Duration,
    tracked: Mutex<HashMap<String, ProcessingStatus>>,
}

impl Reconciler {
    /// Reconciler polling `source` every `interval`.
    pub fn new(source: Arc<dyn StatusSource>, interval: Duration) -> Self {
        Self {
            source,
            interval,
            tracked: Mutex::new(HashMap::new()),
        }
    }

    /// Reconciler using the configured interval.
    pub fn from_settings(source: Arc<dyn StatusSource>, settings: &ReconcileSettings) -> Self {
        Self::new(source, Duration::from_millis(settings.interval_ms))
    }

    /// Poll interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start (or refresh) tracking a document at its last known status.
    pub fn track(&self, document_id: impl Into<String>, status: ProcessingStatus) {
        let _ = self.tracked.lock().insert(document_id.into(), status);
    }

    /// Stop tracking a document. Returns whether it was tracked.
    pub fn untrack(&self, document_id: &str) -> bool {
        self.tracked.lock().remove(document_id).is_some()
    }

    /// Fold a pushed event into the tracked state.
    ///
    /// Only documents already tracked are affected. A terminal status ends
    /// tracking.
    pub fn observe(&self, event: &DocumentEvent) {
        let (Some(document_id), Some(status)) = (event.subject(), event.status) else {
            return;
        };
        let mut tracked = self.tracked.lock();
        if !tracked.contains_key(document_id) {
            return;
        }
        if status.is_completed() {
            let _ = tracked.remove(document_id);
        } else {
            let _ = tracked.insert(document_id.to_string(), status);
        }
    }

    /// Number of tracked documents.
    pub fn tracked_count(&self) -> usize {
        self.tracked.lock().len()
    }

    /// Last known status of a tracked document.
    pub fn status_of(&self, document_id: &str) -> Option<ProcessingStatus> {
        self.tracked.lock().get(document_id).copied()
    }

    /// Tracked documents currently processing, sorted.
    pub fn in_progress(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .tracked
            .lock()
            .iter()
            .filter(|(_, status)| status.is_in_progress())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Poll every in-progress document once.
    ///
    /// Returns an event per changed status: `COMPLETED` for a terminal
    /// status (which also ends tracking), `STATUS_UPDATE` otherwise. Failed
    /// lookups are logged and the document stays tracked.
    pub async fn tick(&self) -> Vec<DocumentEvent> {
        let mut changes = Vec::new();
        for document_id in self.in_progress() {
            let status = match self.source.fetch_status(&document_id).await {
                Ok(status) => status,
                Err(e) => {
                    warn!(document_id = %document_id, error = %e, "status poll failed");
                    continue;
                }
            };

            let mut tracked = self.tracked.lock();
            let Some(previous) = tracked.get(&document_id).copied() else {
                continue;
            };
            if previous == status {
                continue;
            }
            debug!(document_id = %document_id, %previous, %status, "status changed while polling");
            if status.is_completed() {
                let _ = tracked.remove(&document_id);
                changes.push(DocumentEvent::completed(document_id, status));
            } else {
                let _ = tracked.insert(document_id.clone(), status);
                changes.push(DocumentEvent::status_update(document_id, status));
            }
        }
        changes
    }

    /// Tick on the interval until `cancel` fires, handing changes to `sink`.
    ///
    /// Intervals with nothing in progress do no I/O.
    pub async fn run<F>(&self, cancel: CancellationToken, sink: F)
    where
        F: Fn(DocumentEvent) + Send + Sync,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        let _ = ticker.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if self.in_progress().is_empty() {
                        continue;
                    }
                    for event in self.tick().await {
                        sink(event);
                    }
                }
            }
        }
        debug!("reconciler stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
