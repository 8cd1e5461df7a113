//! Broadcast hub.
//!
//! Owns the subscriber set and fans each classified event out to every
//! subscriber's bounded queue. `publish` only ever performs non-blocking
//! enqueues: a subscriber that stops draining loses its own oldest events (or
//! is disconnected, depending on [`OverflowPolicy`]) and never stalls the
//! publisher or its peers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::vehicle::ClassifiedEvent;

use super::subscription::{SubscriberState, Subscription, SubscriptionId};

/// What to do when a subscriber's queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the subscriber's oldest queued event to make room.
    #[default]
    DropOldest,
    /// Remove the subscriber; its stream ends after the queue drains.
    Disconnect,
}

/// Broadcast hub configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Per-subscriber queue capacity.
    pub queue_capacity: usize,
    /// Overflow handling for a full queue.
    pub overflow: OverflowPolicy,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            overflow: OverflowPolicy::DropOldest,
        }
    }
}

impl HubConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` for a zero queue capacity.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.queue_capacity == 0 {
            return Err(ValidationError::InvalidConfig {
                field: "queue_capacity".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Outcome of one `publish` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers the event was enqueued for.
    pub delivered: usize,
    /// Older events evicted to make room.
    pub dropped: usize,
    /// Subscribers removed during this publish.
    pub disconnected: usize,
}

#[derive(Debug)]
struct SubscriberSlot {
    id: SubscriptionId,
    tx: Sender<ClassifiedEvent>,
    // Second receiver end, used only to evict the oldest queued event.
    evict_rx: Receiver<ClassifiedEvent>,
    state: Arc<SubscriberState>,
}

type SubscriberSet = Arc<Vec<Arc<SubscriberSlot>>>;

#[derive(Debug)]
pub(crate) struct HubShared {
    cfg: HubConfig,
    // Copy-on-write: publishers iterate a snapshot, join/leave swap in a new Vec.
    subscribers: RwLock<SubscriberSet>,
    publish_gate: Mutex<()>,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl HubShared {
    fn snapshot(&self) -> SubscriberSet {
        let guard = self.subscribers.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    fn insert(&self, slot: Arc<SubscriberSlot>) {
        let mut guard = self.subscribers.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(slot);
        *guard = Arc::new(next);
    }

    pub(crate) fn remove(&self, id: SubscriptionId) -> bool {
        let mut guard = self.subscribers.write().unwrap_or_else(PoisonError::into_inner);
        let Some(pos) = guard.iter().position(|slot| slot.id == id) else {
            return false;
        };
        let mut next: Vec<Arc<SubscriberSlot>> = guard.as_ref().clone();
        let slot = next.remove(pos);
        *guard = Arc::new(next);
        drop(guard);

        slot.state.closed.store(true, Ordering::Release);
        tracing::debug!(subscription = %id, "subscriber removed");
        true
    }
}

/// Fan-out hub for classified events.
#[derive(Debug)]
pub struct BroadcastHub {
    shared: Arc<HubShared>,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl BroadcastHub {
    /// Creates a hub. A zero queue capacity is raised to 1.
    #[must_use]
    pub fn new(cfg: HubConfig) -> Self {
        let cfg = HubConfig {
            queue_capacity: cfg.queue_capacity.max(1),
            ..cfg
        };
        Self {
            shared: Arc::new(HubShared {
                cfg,
                subscribers: RwLock::new(Arc::new(Vec::new())),
                publish_gate: Mutex::new(()),
                published: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &HubConfig {
        &self.shared.cfg
    }

    /// Registers a new subscriber.
    ///
    /// The subscriber only sees events published after this call returns; there
    /// is no replay.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let id = SubscriptionId::new();
        let (tx, rx) = bounded::<ClassifiedEvent>(self.shared.cfg.queue_capacity);
        let state = Arc::new(SubscriberState::default());

        self.shared.insert(Arc::new(SubscriberSlot {
            id,
            tx,
            evict_rx: rx.clone(),
            state: Arc::clone(&state),
        }));
        tracing::debug!(subscription = %id, "subscriber added");

        Subscription::new(id, rx, state, Arc::downgrade(&self.shared))
    }

    /// Removes a subscriber. Idempotent; returns true if it was still present.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.remove(id)
    }

    /// Delivers `event` to every current subscriber.
    ///
    /// Publishes are serialized, so two sequential publishes reach every
    /// subscriber in the same order. The work per subscriber is a non-blocking
    /// enqueue (plus at most one eviction).
    pub fn publish(&self, event: &ClassifiedEvent) -> PublishReport {
        let mut report = PublishReport::default();
        let mut doomed: Vec<SubscriptionId> = Vec::new();

        {
            let _gate = self.shared.publish_gate.lock().unwrap_or_else(PoisonError::into_inner);
            let subscribers = self.shared.snapshot();

            for slot in subscribers.iter() {
                if slot.state.closed.load(Ordering::Acquire) {
                    doomed.push(slot.id);
                    continue;
                }

                match slot.tx.try_send(event.clone()) {
                    Ok(()) => report.delivered += 1,
                    Err(TrySendError::Full(event)) => match self.shared.cfg.overflow {
                        OverflowPolicy::DropOldest => {
                            if slot.evict_rx.try_recv().is_ok() {
                                slot.state.dropped.fetch_add(1, Ordering::Relaxed);
                                report.dropped += 1;
                            }
                            // Only gated publishers enqueue, so there is room now.
                            if slot.tx.try_send(event).is_ok() {
                                report.delivered += 1;
                            } else {
                                slot.state.dropped.fetch_add(1, Ordering::Relaxed);
                                report.dropped += 1;
                            }
                        }
                        OverflowPolicy::Disconnect => {
                            tracing::warn!(
                                subscription = %slot.id,
                                capacity = self.shared.cfg.queue_capacity,
                                "subscriber queue full; disconnecting"
                            );
                            slot.state.dropped.fetch_add(1, Ordering::Relaxed);
                            report.dropped += 1;
                            doomed.push(slot.id);
                        }
                    },
                    Err(TrySendError::Disconnected(_)) => doomed.push(slot.id),
                }
            }

            self.shared.published.fetch_add(1, Ordering::Relaxed);
        }

        for id in doomed {
            if self.shared.remove(id) {
                report.disconnected += 1;
            }
        }
        if report.dropped > 0 {
            self.shared.dropped.fetch_add(report.dropped as u64, Ordering::Relaxed);
        }

        report
    }

    /// Number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.shared.snapshot().len()
    }

    /// Total events published.
    #[must_use]
    pub fn published_events(&self) -> u64 {
        self.shared.published.load(Ordering::Relaxed)
    }

    /// Total events discarded across all subscribers due to overflow.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}
