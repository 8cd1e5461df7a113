//! Broadcast hub: fan-out of classified events to live subscribers.
//!
//! In-process and transport-agnostic. A transport layer (see the `transport`
//! module) bridges a [`Subscription`] onto its own socket writer.

/// Subscriber set and publish path.
pub mod broadcast;
/// Subscriber stream handle.
pub mod subscription;

pub use broadcast::{BroadcastHub, HubConfig, OverflowPolicy, PublishReport};
pub use subscription::{Subscription, SubscriptionId};
