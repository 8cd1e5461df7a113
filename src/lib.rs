//! # GhostBus - live vehicle fan-out with ghost detection
//!
//! GhostBus ingests a continuous stream of vehicle position reports, keeps the
//! last-known state per vehicle, flags "ghost" vehicles (stale or stationary
//! reports masquerading as live ones), and broadcasts every classified record
//! to any number of concurrent subscribers. No subscriber can stall ingest.
//!
//! ## Core Concepts
//!
//! - **Registry**: last-known [`VehiclePosition`] per vehicle id
//! - **Classifier**: pure [`classify`] over a record, `now`, and a [`GhostPolicy`]
//! - **Ingest pipeline**: validate, upsert + classify, publish
//! - **Broadcast hub**: bounded per-subscriber queues, drop-oldest on overflow
//! - **Sweep**: periodic re-evaluation so silent vehicles become ghosts
//!
//! ## Usage
//!
//! ```rust
//! use ghostbus::{GhostPolicy, HubConfig, IngestPipeline, PositionUpdate};
//!
//! let pipeline = IngestPipeline::in_memory(GhostPolicy::default(), HubConfig::default());
//! let subscription = pipeline.subscribe();
//!
//! let now = chrono::Utc::now().timestamp();
//! let event = pipeline.ingest(&PositionUpdate::new("B1", 12.9, 77.6, 0.0, now))?;
//! assert!(event.data.is_ghost); // stationary
//! assert_eq!(subscription.try_recv()?, event);
//! # Ok::<(), ghostbus::GhostError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod error;
pub mod policy;
pub mod time;
pub mod vehicle;

// State, fan-out, and the pipeline tying them together
pub mod hub;
pub mod pipeline;
pub mod registry;
pub mod sweeper;

pub mod config;

#[cfg(feature = "demo-feed")]
pub mod feed;

#[cfg(feature = "transport-tcp")]
pub mod transport;

// Re-export primary types at crate root for convenience
pub use config::GhostBusConfig;
pub use error::{GhostError, GhostResult, HubError, RegistryError, ValidationError};
pub use hub::{BroadcastHub, HubConfig, OverflowPolicy, PublishReport, Subscription, SubscriptionId};
pub use pipeline::{IngestPipeline, SnapshotReader, SweepMode, SweepReport};
pub use policy::{classify, evaluate, GhostPolicy, GhostReason};
pub use registry::{InMemoryRegistry, Reclassified, VehicleStore};
pub use sweeper::{SweepConfig, Sweeper};
pub use time::{Clock, ManualClock, SystemClock};
pub use vehicle::{ClassifiedEvent, EventKind, PositionUpdate, VehiclePosition};
