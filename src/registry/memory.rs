//! In-memory vehicle registry.
//!
//! A single `RwLock` guards the whole map. Cardinality is bounded (hundreds to
//! low thousands of vehicles), so one coarse lock keeps per-id writes
//! serialized without per-entry bookkeeping.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::RegistryError;
use crate::policy::GhostReason;
use crate::registry::traits::{ClassifyFn, Reclassified, VehicleStore};
use crate::vehicle::{PositionUpdate, VehiclePosition};

fn lock_err(context: &'static str) -> RegistryError {
    RegistryError::BackendError(format!("poisoned lock: {context}"))
}

#[derive(Debug, Clone)]
struct Slot {
    record: VehiclePosition,
    reason: Option<GhostReason>,
}

impl Slot {
    fn set_verdict(&mut self, reason: Option<GhostReason>) -> bool {
        let changed = self.reason != reason;
        self.reason = reason;
        self.record.is_ghost = reason.is_some();
        changed
    }
}

/// Thread-safe in-memory registry.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    slots: RwLock<HashMap<String, Slot>>,
}

impl InMemoryRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn apply<'a>(slots: &'a mut HashMap<String, Slot>, update: &PositionUpdate) -> &'a mut Slot {
        slots
            .entry(update.id.clone())
            .and_modify(|slot| slot.record.apply(update))
            .or_insert_with(|| Slot {
                record: VehiclePosition::from_update(update),
                reason: None,
            })
    }
}

impl VehicleStore for InMemoryRegistry {
    fn upsert(&self, update: &PositionUpdate) -> Result<VehiclePosition, RegistryError> {
        let mut slots = self.slots.write().map_err(|_| lock_err("registry.upsert"))?;
        Ok(Self::apply(&mut slots, update).record.clone())
    }

    fn upsert_with(
        &self,
        update: &PositionUpdate,
        classify: ClassifyFn<'_>,
    ) -> Result<VehiclePosition, RegistryError> {
        let mut slots = self.slots.write().map_err(|_| lock_err("registry.upsert_with"))?;
        let slot = Self::apply(&mut slots, update);
        let reason = classify(&slot.record);
        slot.set_verdict(reason);
        Ok(slot.record.clone())
    }

    fn get(&self, id: &str) -> Result<Option<VehiclePosition>, RegistryError> {
        let slots = self.slots.read().map_err(|_| lock_err("registry.get"))?;
        Ok(slots.get(id).map(|slot| slot.record.clone()))
    }

    fn list(&self) -> Result<Vec<VehiclePosition>, RegistryError> {
        let slots = self.slots.read().map_err(|_| lock_err("registry.list"))?;
        let mut out: Vec<VehiclePosition> = slots.values().map(|slot| slot.record.clone()).collect();
        drop(slots);
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    fn reclassify(
        &self,
        id: &str,
        classify: ClassifyFn<'_>,
    ) -> Result<Option<Reclassified>, RegistryError> {
        let mut slots = self.slots.write().map_err(|_| lock_err("registry.reclassify"))?;
        let Some(slot) = slots.get_mut(id) else {
            return Ok(None);
        };
        let reason = classify(&slot.record);
        let changed = slot.set_verdict(reason);
        Ok(Some(Reclassified {
            record: slot.record.clone(),
            reason,
            changed,
        }))
    }

    fn len(&self) -> Result<usize, RegistryError> {
        let slots = self.slots.read().map_err(|_| lock_err("registry.len"))?;
        Ok(slots.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::thread;

    fn live(_: &VehiclePosition) -> Option<GhostReason> {
        None
    }

    fn update(id: &str, speed: f64, ts: i64) -> PositionUpdate {
        PositionUpdate::new(id, 12.9, 77.6, speed, ts)
    }

    #[test]
    fn upsert_inserts_then_mutates() {
        let reg = InMemoryRegistry::new();
        assert!(reg.is_empty().unwrap());

        let first = reg.upsert(&update("B1", 10.0, 100).with_route("R1")).unwrap();
        assert_eq!(first.last_update_time, 100);
        assert_eq!(first.route.as_deref(), Some("R1"));
        assert!(!first.is_ghost);

        let second = reg.upsert(&update("B1", 20.0, 105)).unwrap();
        assert_eq!(second.speed, 20.0);
        assert_eq!(second.route, None);
        assert_eq!(reg.len().unwrap(), 1);
    }

    #[test]
    fn get_miss_is_none() {
        let reg = InMemoryRegistry::new();
        assert_eq!(reg.get("nope").unwrap(), None);
    }

    #[test]
    fn list_is_sorted_snapshot() {
        let reg = InMemoryRegistry::new();
        for id in ["B3", "B1", "B2"] {
            reg.upsert(&update(id, 5.0, 1)).unwrap();
        }
        let ids: Vec<String> = reg.list().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["B1", "B2", "B3"]);
    }

    #[test]
    fn upsert_with_sets_verdict_under_lock() {
        let reg = InMemoryRegistry::new();
        let rec = reg
            .upsert_with(&update("B1", 0.0, 1), &|r: &VehiclePosition| {
                (r.speed < 1.0).then_some(GhostReason::Stationary)
            })
            .unwrap();
        assert!(rec.is_ghost);
        assert!(reg.get("B1").unwrap().unwrap().is_ghost);
    }

    #[test]
    fn plain_upsert_keeps_previous_flag() {
        let reg = InMemoryRegistry::new();
        reg.upsert_with(&update("B1", 0.0, 1), &|_: &VehiclePosition| Some(GhostReason::Stationary))
            .unwrap();
        let rec = reg.upsert(&update("B1", 30.0, 2)).unwrap();
        assert!(rec.is_ghost);
        assert_eq!(rec.speed, 30.0);
    }

    #[test]
    fn reclassify_reports_reason_changes() {
        let reg = InMemoryRegistry::new();
        assert_eq!(reg.reclassify("B1", &live).unwrap(), None);

        reg.upsert_with(&update("B1", 0.0, 1), &|_: &VehiclePosition| Some(GhostReason::Stationary))
            .unwrap();

        let same = reg
            .reclassify("B1", &|_: &VehiclePosition| Some(GhostReason::Stationary))
            .unwrap()
            .unwrap();
        assert!(!same.changed);

        let stale = reg
            .reclassify("B1", &|_: &VehiclePosition| Some(GhostReason::Stale))
            .unwrap()
            .unwrap();
        assert!(stale.changed);
        assert!(stale.record.is_ghost);
        assert_eq!(stale.reason, Some(GhostReason::Stale));

        let revived = reg.reclassify("B1", &live).unwrap().unwrap();
        assert!(revived.changed);
        assert!(!revived.record.is_ghost);
        assert_eq!(revived.record.last_update_time, 1);
    }

    #[test]
    fn concurrent_upserts_never_interleave_fields() {
        let reg = Arc::new(InMemoryRegistry::new());
        let mut handles = Vec::new();
        for t in 0..8i64 {
            let reg = Arc::clone(&reg);
            handles.push(thread::spawn(move || {
                for i in 0..500i64 {
                    let ts = t * 10_000 + i;
                    #[allow(clippy::cast_precision_loss)]
                    let v = ts as f64;
                    let u = PositionUpdate {
                        id: "B1".to_string(),
                        lat: v / 1_000_000.0,
                        lon: v / 500_000.0,
                        route: Some(format!("R{ts}")),
                        speed: v,
                        timestamp: ts,
                    };
                    reg.upsert(&u).unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let rec = reg.get("B1").unwrap().unwrap();
        #[allow(clippy::cast_precision_loss)]
        let v = rec.last_update_time as f64;
        assert_eq!(rec.speed, v);
        assert_eq!(rec.latitude, v / 1_000_000.0);
        assert_eq!(rec.longitude, v / 500_000.0);
        assert_eq!(rec.route, Some(format!("R{}", rec.last_update_time)));
        assert_eq!(reg.len().unwrap(), 1);
    }
}
