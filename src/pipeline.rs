//! Ingest pipeline, periodic sweep, and snapshot reads.
//!
//! `ingest` handles one producer update: validate, upsert + classify in the
//! registry, publish. `sweep` is time-driven: it re-evaluates every known
//! vehicle against the clock so a vehicle that goes silent still turns into a
//! ghost.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::GhostResult;
use crate::hub::{BroadcastHub, HubConfig, Subscription};
use crate::policy::{evaluate, GhostPolicy};
use crate::registry::{InMemoryRegistry, VehicleStore};
use crate::time::{Clock, SystemClock};
use crate::vehicle::{ClassifiedEvent, PositionUpdate, VehiclePosition};

/// Which records a sweep broadcasts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepMode {
    /// Broadcast every record on every tick.
    #[default]
    All,
    /// Broadcast only records whose verdict or ghost reason changed.
    Changed,
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Records re-evaluated.
    pub evaluated: usize,
    /// Records whose verdict or reason changed.
    pub transitions: usize,
    /// Events published.
    pub broadcast: usize,
    /// Records skipped because they could not be evaluated.
    pub failures: usize,
}

/// Read-side access to current vehicle state.
pub trait SnapshotReader {
    /// All current records, ordered by id.
    fn list_current(&self) -> GhostResult<Vec<VehiclePosition>>;

    /// Current record for `id`, `None` if it was never seen.
    fn get_current(&self, id: &str) -> GhostResult<Option<VehiclePosition>>;
}

/// The ingest pipeline.
pub struct IngestPipeline {
    registry: Arc<dyn VehicleStore>,
    hub: Arc<BroadcastHub>,
    policy: GhostPolicy,
    clock: Arc<dyn Clock>,
    // Held across each registry mutation and its publish, so subscribers see
    // records in the order the registry applied them.
    commit: Mutex<()>,
}

impl std::fmt::Debug for IngestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestPipeline")
            .field("policy", &self.policy)
            .field("hub", &self.hub)
            .finish_non_exhaustive()
    }
}

impl IngestPipeline {
    /// Creates a pipeline over the given collaborators.
    pub fn new(
        registry: Arc<dyn VehicleStore>,
        hub: Arc<BroadcastHub>,
        policy: GhostPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            hub,
            policy,
            clock,
            commit: Mutex::new(()),
        }
    }

    /// In-memory registry, default hub, system clock.
    #[must_use]
    pub fn in_memory(policy: GhostPolicy, hub: HubConfig) -> Self {
        Self::new(
            Arc::new(InMemoryRegistry::new()),
            Arc::new(BroadcastHub::new(hub)),
            policy,
            Arc::new(SystemClock),
        )
    }

    /// Active policy.
    #[must_use]
    pub const fn policy(&self) -> &GhostPolicy {
        &self.policy
    }

    /// The hub events are published to.
    #[must_use]
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// The registry backing this pipeline.
    #[must_use]
    pub fn registry(&self) -> &Arc<dyn VehicleStore> {
        &self.registry
    }

    fn commit_guard(&self) -> MutexGuard<'_, ()> {
        self.commit.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Shorthand for `hub().subscribe()`.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    /// Validates, records, classifies and publishes one update.
    ///
    /// An invalid update is rejected before the registry is touched. The
    /// publish step never waits on subscribers.
    ///
    /// # Errors
    ///
    /// `GhostError::Validation` naming the offending field, or
    /// `GhostError::Registry` if the registry backend failed.
    pub fn ingest(&self, update: &PositionUpdate) -> GhostResult<ClassifiedEvent> {
        update.validate()?;

        let _commit = self.commit_guard();
        let now = self.clock.now();
        let policy = self.policy;
        let record = self
            .registry
            .upsert_with(update, &|r: &VehiclePosition| evaluate(r, now, &policy))?;

        let event = ClassifiedEvent::bus_update(record);
        self.hub.publish(&event);
        Ok(event)
    }

    /// Re-evaluates every known vehicle against the current time.
    ///
    /// Ids come from a consistent `list()` snapshot; each record is then
    /// reclassified in the registry under its lock, so concurrent ingests are
    /// never overwritten with a stale verdict. Each reclassification is
    /// published before any later ingest can commit. A record that fails is
    /// logged, counted, and skipped.
    pub fn sweep(&self, mode: SweepMode) -> SweepReport {
        let mut report = SweepReport::default();
        let now = self.clock.now();
        let policy = self.policy;

        let snapshot = match self.registry.list() {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!(error = %err, "sweep could not list registry");
                report.failures += 1;
                return report;
            }
        };

        for record in snapshot {
            if let Err(err) = record.validate() {
                tracing::warn!(vehicle = %record.id, error = %err, "sweep skipped malformed record");
                report.failures += 1;
                continue;
            }

            let _commit = self.commit_guard();
            match self
                .registry
                .reclassify(&record.id, &|r: &VehiclePosition| evaluate(r, now, &policy))
            {
                Ok(Some(outcome)) => {
                    report.evaluated += 1;
                    if outcome.changed {
                        report.transitions += 1;
                    }
                    if mode == SweepMode::All || outcome.changed {
                        self.hub.publish(&ClassifiedEvent::bus_update(outcome.record));
                        report.broadcast += 1;
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(vehicle = %record.id, error = %err, "sweep failed to reclassify");
                    report.failures += 1;
                }
            }
        }

        tracing::debug!(
            now,
            evaluated = report.evaluated,
            transitions = report.transitions,
            broadcast = report.broadcast,
            failures = report.failures,
            "sweep complete"
        );
        report
    }
}

impl SnapshotReader for IngestPipeline {
    fn list_current(&self) -> GhostResult<Vec<VehiclePosition>> {
        Ok(self.registry.list()?)
    }

    fn get_current(&self, id: &str) -> GhostResult<Option<VehiclePosition>> {
        Ok(self.registry.get(id)?)
    }
}
