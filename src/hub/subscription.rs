use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::HubError;
use crate::vehicle::ClassifiedEvent;

use super::broadcast::HubShared;

/// Unique identifier for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new random subscription id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// State shared between a subscription handle and its hub-side slot.
#[derive(Debug, Default)]
pub(crate) struct SubscriberState {
    pub(crate) closed: AtomicBool,
    pub(crate) dropped: AtomicU64,
}

/// A subscriber's handle on the event stream.
///
/// Events arrive in publish order. The stream is open-ended: it only ends
/// (with [`HubError::Disconnected`]) once the subscription has been removed
/// and its queue drained. Dropping the handle unsubscribes eagerly.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    rx: Receiver<ClassifiedEvent>,
    state: Arc<SubscriberState>,
    hub: Weak<HubShared>,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriptionId,
        rx: Receiver<ClassifiedEvent>,
        state: Arc<SubscriberState>,
        hub: Weak<HubShared>,
    ) -> Self {
        Self { id, rx, state, hub }
    }

    /// The id backing this subscription.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Events discarded for this subscriber because its queue was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.state.dropped.load(Ordering::Relaxed)
    }

    /// Returns true once the subscription was removed from the hub.
    ///
    /// Already queued events can still be received.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::Acquire)
    }

    /// Number of events waiting in this subscriber's queue.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Explicit unregistration. Idempotent and non-blocking.
    pub fn unsubscribe(&self) {
        if self.state.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(self.id);
        }
    }

    /// Records a terminal delivery failure (the transport behind this
    /// subscriber is gone) and removes the subscription.
    pub fn fail(&self, reason: &str) {
        if !self.is_closed() {
            tracing::warn!(subscription = %self.id, reason, "subscriber delivery failed; removing");
        }
        self.unsubscribe();
    }

    /// Receive the next event (blocking).
    ///
    /// # Errors
    ///
    /// `HubError::Disconnected` once the subscription is closed and drained.
    pub fn recv(&self) -> Result<ClassifiedEvent, HubError> {
        self.rx.recv().map_err(|_| HubError::Disconnected)
    }

    /// Receive the next event with a timeout.
    ///
    /// # Errors
    ///
    /// `HubError::Timeout` when nothing arrives in time, `HubError::Disconnected`
    /// once the subscription is closed and drained.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<ClassifiedEvent, HubError> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => HubError::Timeout {
                duration_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
            },
            RecvTimeoutError::Disconnected => HubError::Disconnected,
        })
    }

    /// Receive an already queued event without waiting.
    ///
    /// # Errors
    ///
    /// `HubError::Empty` when nothing is queued, `HubError::Disconnected` once
    /// the subscription is closed and drained.
    pub fn try_recv(&self) -> Result<ClassifiedEvent, HubError> {
        self.rx.try_recv().map_err(|err| match err {
            TryRecvError::Empty => HubError::Empty,
            TryRecvError::Disconnected => HubError::Disconnected,
        })
    }

    /// Lazy, blocking iterator over events; ends when the subscription closes.
    pub fn iter(&self) -> impl Iterator<Item = ClassifiedEvent> + '_ {
        self.rx.iter()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
