//! Vehicle registry contract.
//!
//! The registry is the only shared mutable state in the core. Every component
//! reads and writes vehicle records through this trait; nothing mutates a
//! record in place from outside.

use crate::error::RegistryError;
use crate::policy::GhostReason;
use crate::vehicle::{PositionUpdate, VehiclePosition};

/// Classification callback evaluated while the registry holds the record's
/// write lock.
pub type ClassifyFn<'a> = &'a (dyn Fn(&VehiclePosition) -> Option<GhostReason> + 'a);

/// Outcome of re-evaluating one record.
#[derive(Debug, Clone, PartialEq)]
pub struct Reclassified {
    /// Record after the new verdict was applied.
    pub record: VehiclePosition,
    /// Ghost reason behind the verdict, `None` when live.
    pub reason: Option<GhostReason>,
    /// Whether the verdict or its reason differs from the previous one.
    pub changed: bool,
}

/// Storage trait for last-known vehicle state.
///
/// # Consistency
/// - Writers to the same id are serialized; no reader ever sees a record with
///   fields from two different updates.
/// - Records are created on first sight and never deleted.
pub trait VehicleStore: Send + Sync {
    /// Insert or overwrite the record for `update.id`.
    ///
    /// Returns the post-mutation record. The ghost flag is carried over from
    /// the previous verdict (false for a new record); use [`upsert_with`] to
    /// apply the update and its classification atomically.
    ///
    /// [`upsert_with`]: VehicleStore::upsert_with
    fn upsert(&self, update: &PositionUpdate) -> Result<VehiclePosition, RegistryError>;

    /// Insert or overwrite the record, then set its ghost flag from `classify`
    /// before releasing the write lock.
    fn upsert_with(
        &self,
        update: &PositionUpdate,
        classify: ClassifyFn<'_>,
    ) -> Result<VehiclePosition, RegistryError>;

    /// Point lookup. `Ok(None)` when the id has never been seen.
    fn get(&self, id: &str) -> Result<Option<VehiclePosition>, RegistryError>;

    /// Snapshot of all records, ordered by id.
    fn list(&self) -> Result<Vec<VehiclePosition>, RegistryError>;

    /// Re-evaluate the current record for `id` without changing its reported
    /// fields. `Ok(None)` when the id is unknown.
    fn reclassify(
        &self,
        id: &str,
        classify: ClassifyFn<'_>,
    ) -> Result<Option<Reclassified>, RegistryError>;

    /// Number of tracked vehicles.
    fn len(&self) -> Result<usize, RegistryError>;

    /// Returns true if no vehicle has been seen yet.
    fn is_empty(&self) -> Result<bool, RegistryError> {
        Ok(self.len()? == 0)
    }
}
