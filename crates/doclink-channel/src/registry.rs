//! Subscriber registry and dispatch.
//!
//! Two collections: document-scoped subscribers keyed by document id, and
//! global subscribers. Entries are only ever removed by explicit
//! cancellation or channel teardown, never by connection state changes.
//!
//! Dispatch snapshots the matching entries and releases the lock before
//! invoking anything, so a subscriber may subscribe or cancel (itself or
//! others) from inside its callback.

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use doclink_core::{ChannelError, DocumentEvent};
use parking_lot::Mutex;
use tracing::{debug, error};

/// Receives events from the channel.
///
/// Implemented for any `Fn(&DocumentEvent) + Send + Sync`, so closures work
/// directly. A panic inside `handle` is caught and reported; it never reaches
/// other subscribers.
pub trait Subscriber: Send + Sync + 'static {
    /// Handle one event.
    fn handle(&self, event: &DocumentEvent);
}

impl<F> Subscriber for F
where
    F: Fn(&DocumentEvent) + Send + Sync + 'static,
{
    fn handle(&self, event: &DocumentEvent) {
        self(event);
    }
}

/// Which events a subscriber receives.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Events whose `documentId` equals this id.
    Document(String),
    /// Every event.
    Global,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document(id) => write!(f, "document:{id}"),
            Self::Global => f.write_str("global"),
        }
    }
}

/// Registration identity. Never reused within a registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct Entry {
    scope: Scope,
    active: AtomicBool,
    subscriber: Box<dyn Subscriber>,
}

/// Scoped and global subscriber collections.
#[derive(Default)]
pub struct SubscriberRegistry {
    scoped: HashMap<String, HashMap<SubscriptionId, Arc<Entry>>>,
    global: HashMap<SubscriptionId, Arc<Entry>>,
    next_id: u64,
}

impl SubscriberRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `subscriber` under `scope`.
    pub fn insert(&mut self, scope: Scope, subscriber: Box<dyn Subscriber>) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        let entry = Arc::new(Entry {
            scope: scope.clone(),
            active: AtomicBool::new(true),
            subscriber,
        });
        let bucket = match scope {
            Scope::Document(doc) => self.scoped.entry(doc).or_default(),
            Scope::Global => &mut self.global,
        };
        let _ = bucket.insert(id, entry);
        id
    }

    /// Remove exactly one registration. Returns whether it was present.
    ///
    /// Removing the last subscriber of a document drops that document's
    /// bucket.
    pub fn remove(&mut self, scope: &Scope, id: SubscriptionId) -> bool {
        let removed = match scope {
            Scope::Document(doc) => {
                let Some(bucket) = self.scoped.get_mut(doc) else {
                    return false;
                };
                let removed = bucket.remove(&id);
                if bucket.is_empty() {
                    let _ = self.scoped.remove(doc);
                }
                removed
            }
            Scope::Global => self.global.remove(&id),
        };
        match removed {
            Some(entry) => {
                entry.active.store(false, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Remove everything. Returns how many registrations were dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.len();
        let scoped = self.scoped.drain().flat_map(|(_, bucket)| bucket.into_values());
        for entry in scoped.chain(self.global.drain().map(|(_, e)| e)) {
            entry.active.store(false, Ordering::Release);
        }
        count
    }

    /// Total live registrations.
    pub fn len(&self) -> usize {
        self.global.len() + self.scoped.values().map(HashMap::len).sum::<usize>()
    }

    /// Whether no one is subscribed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of documents with at least one scoped subscriber.
    pub fn document_count(&self) -> usize {
        self.scoped.len()
    }

    /// Number of subscribers for one document.
    pub fn subscribers_for(&self, document_id: &str) -> usize {
        self.scoped.get(document_id).map_or(0, HashMap::len)
    }

    fn matching(&self, event: &DocumentEvent) -> Vec<Arc<Entry>> {
        let scoped = event
            .subject()
            .and_then(|doc| self.scoped.get(doc))
            .into_iter()
            .flat_map(HashMap::values);
        scoped.chain(self.global.values()).cloned().collect()
    }
}

/// Deliver `event` to every matching subscriber.
///
/// Scoped matches first, then globals. Each callback runs at most once and is
/// skipped if it was cancelled earlier in the same dispatch. Returns one
/// [`ChannelError::SubscriberFault`] per panicking callback.
pub fn dispatch(registry: &Mutex<SubscriberRegistry>, event: &DocumentEvent) -> Vec<ChannelError> {
    let targets = registry.lock().matching(event);
    debug!(
        kind = %event.kind,
        document_id = event.subject().unwrap_or(""),
        recipients = targets.len(),
        "dispatching event"
    );

    let mut faults = Vec::new();
    for entry in targets {
        if !entry.active.load(Ordering::Acquire) {
            continue;
        }
        let outcome = catch_unwind(AssertUnwindSafe(|| entry.subscriber.handle(event)));
        if let Err(payload) = outcome {
            let message = panic_message(payload.as_ref());
            error!(scope = %entry.scope, kind = %event.kind, error = %message, "subscriber panicked");
            faults.push(ChannelError::SubscriberFault {
                scope: entry.scope.to_string(),
                message,
            });
        }
    }
    faults
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Subscription handle
// ─────────────────────────────────────────────────────────────────────────────

/// Handle returned by the subscribe operations.
///
/// Dropping it does **not** cancel; call [`Subscription::cancel`]. Holds only
/// a weak reference, so it never keeps the channel alive and cancelling after
/// teardown or after the channel is gone is a harmless no-op.
#[derive(Clone, Debug)]
pub struct Subscription {
    id: SubscriptionId,
    scope: Scope,
    registry: Weak<Mutex<SubscriberRegistry>>,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriptionId,
        scope: Scope,
        registry: Weak<Mutex<SubscriberRegistry>>,
    ) -> Self {
        Self {
            id,
            scope,
            registry,
        }
    }

    /// Registration identity.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Scope this subscription was registered under.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Stop receiving events. Idempotent.
    ///
    /// Returns `true` only for the call that actually removed the
    /// registration.
    pub fn cancel(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let removed = registry.lock().remove(&self.scope, self.id);
        if removed {
            debug!(subscription = %self.id, scope = %self.scope, "subscription cancelled");
        }
        removed
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
