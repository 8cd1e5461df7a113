//! Synthetic position producer.
//!
//! Stand-in for a real GPS feed: a fleet of buses around Indian city centres
//! drifting randomly, each occasionally stopping. It only produces
//! [`PositionUpdate`]s; callers push them through `IngestPipeline::ingest`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{GhostResult, ValidationError};
use crate::vehicle::PositionUpdate;

/// City centres the fleet is spread across: (state, latitude, longitude).
pub const CITY_CENTRES: [(&str, f64, f64); 10] = [
    ("Karnataka", 12.9716, 77.5946),
    ("Maharashtra", 19.0760, 72.8777),
    ("Tamil Nadu", 13.0827, 80.2707),
    ("Delhi", 28.7041, 77.1025),
    ("West Bengal", 22.5726, 88.3639),
    ("Kerala", 8.5241, 76.9366),
    ("Gujarat", 23.0225, 72.5714),
    ("Punjab", 31.1471, 75.3412),
    ("Rajasthan", 26.9124, 75.7873),
    ("Bihar", 25.5941, 85.1376),
];

/// Feed tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedConfig {
    /// Buses per city.
    pub buses_per_city: usize,
    /// First numeric bus id (`B<first_id>`).
    pub first_id: u32,
    /// Initial scatter around the city centre, degrees.
    pub initial_jitter: f64,
    /// Per-step drift, degrees.
    pub step_jitter: f64,
    /// Probability a bus reports speed 0 on a step.
    pub stop_probability: f64,
    /// Speed range for moving buses, km/h.
    pub min_speed: f64,
    /// Upper bound (exclusive) of the moving speed range.
    pub max_speed: f64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            buses_per_city: 5,
            first_id: 100,
            initial_jitter: 0.05,
            step_jitter: 0.01,
            stop_probability: 0.2,
            min_speed: 5.0,
            max_speed: 50.0,
        }
    }
}

fn invalid(field: &str, reason: &str) -> ValidationError {
    ValidationError::InvalidConfig {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

impl FeedConfig {
    /// Validates the sampling ranges.
    ///
    /// # Errors
    ///
    /// `ValidationError::InvalidConfig` for a negative or non-finite jitter, a
    /// stop probability outside `[0, 1]`, or an empty speed range.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.initial_jitter.is_finite() || self.initial_jitter < 0.0 {
            return Err(invalid("initial_jitter", "must be a finite, non-negative angle"));
        }
        if !self.step_jitter.is_finite() || self.step_jitter < 0.0 {
            return Err(invalid("step_jitter", "must be a finite, non-negative angle"));
        }
        if !(0.0..=1.0).contains(&self.stop_probability) {
            return Err(invalid("stop_probability", "must be within [0, 1]"));
        }
        if !self.min_speed.is_finite() || self.min_speed < 0.0 {
            return Err(invalid("min_speed", "must be a finite, non-negative speed"));
        }
        if !self.max_speed.is_finite() || self.max_speed <= self.min_speed {
            return Err(invalid("max_speed", "must be finite and greater than min_speed"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct SimBus {
    id: String,
    route: String,
    lat: f64,
    lon: f64,
}

/// Deterministic (seeded) demo fleet.
#[derive(Debug)]
pub struct DemoFeed {
    cfg: FeedConfig,
    rng: StdRng,
    buses: Vec<SimBus>,
}

fn round_tenth(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn route_label(state: &str, n: usize) -> String {
    let prefix: String = state.chars().take(3).collect::<String>().to_uppercase();
    format!("{prefix}-R{n}")
}

impl DemoFeed {
    /// Creates the fleet from `seed`.
    ///
    /// # Errors
    ///
    /// `GhostError::Validation` if `cfg` fails [`FeedConfig::validate`].
    pub fn new(cfg: FeedConfig, seed: u64) -> GhostResult<Self> {
        cfg.validate()?;
        let mut rng = StdRng::seed_from_u64(seed);
        let mut buses = Vec::with_capacity(CITY_CENTRES.len() * cfg.buses_per_city);
        let mut next_id = cfg.first_id;

        for (state, lat, lon) in CITY_CENTRES {
            for i in 0..cfg.buses_per_city {
                buses.push(SimBus {
                    id: format!("B{next_id}"),
                    route: route_label(state, i + 1),
                    lat: lat + rng.gen_range(-cfg.initial_jitter..=cfg.initial_jitter),
                    lon: lon + rng.gen_range(-cfg.initial_jitter..=cfg.initial_jitter),
                });
                next_id += 1;
            }
        }

        Ok(Self { cfg, rng, buses })
    }

    /// Number of simulated buses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buses.len()
    }

    /// Returns true if the fleet is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buses.is_empty()
    }

    /// Advances every bus one step and returns their reports stamped `now`.
    pub fn step(&mut self, now: i64) -> Vec<PositionUpdate> {
        let cfg = self.cfg;
        let rng = &mut self.rng;
        self.buses
            .iter_mut()
            .map(|bus| {
                bus.lat = (bus.lat + rng.gen_range(-cfg.step_jitter..=cfg.step_jitter)).clamp(-90.0, 90.0);
                bus.lon = (bus.lon + rng.gen_range(-cfg.step_jitter..=cfg.step_jitter)).clamp(-180.0, 180.0);

                let speed = if rng.gen_bool(cfg.stop_probability) {
                    0.0
                } else {
                    round_tenth(rng.gen_range(cfg.min_speed..cfg.max_speed))
                };

                PositionUpdate {
                    id: bus.id.clone(),
                    lat: bus.lat,
                    lon: bus.lon,
                    route: Some(bus.route.clone()),
                    speed,
                    timestamp: now,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fleet_layout_matches_cities() {
        let feed = DemoFeed::new(FeedConfig::default(), 7).unwrap();
        assert_eq!(feed.len(), 50);
        assert_eq!(feed.buses[0].id, "B100");
        assert_eq!(feed.buses[0].route, "KAR-R1");
        assert_eq!(feed.buses[49].id, "B149");
        assert_eq!(feed.buses[49].route, "BIH-R5");
        assert_eq!(feed.buses[10].route, "TAM-R1");
    }

    #[test]
    fn step_produces_valid_updates() {
        let mut feed = DemoFeed::new(FeedConfig::default(), 42).unwrap();
        for tick in 0..20 {
            for update in feed.step(1_000 + tick) {
                assert!(update.validate().is_ok(), "{update:?}");
                assert_eq!(update.timestamp, 1_000 + tick);
                assert!(update.speed == 0.0 || (5.0..=50.0).contains(&update.speed));
            }
        }
    }

    #[test]
    fn same_seed_same_stream() {
        let mut a = DemoFeed::new(FeedConfig::default(), 9).unwrap();
        let mut b = DemoFeed::new(FeedConfig::default(), 9).unwrap();
        assert_eq!(a.step(1), b.step(1));
        assert_eq!(a.step(2), b.step(2));
    }

    #[test]
    fn some_buses_stop() {
        let mut feed = DemoFeed::new(FeedConfig::default(), 3).unwrap();
        let stopped = (0..10)
            .flat_map(|t| feed.step(t))
            .filter(|u| u.speed == 0.0)
            .count();
        assert!(stopped > 0);
    }

    #[test]
    fn unusable_ranges_are_rejected() {
        let cases = [
            (FeedConfig { initial_jitter: -0.1, ..FeedConfig::default() }, "initial_jitter"),
            (FeedConfig { step_jitter: f64::NAN, ..FeedConfig::default() }, "step_jitter"),
            (FeedConfig { stop_probability: 1.5, ..FeedConfig::default() }, "stop_probability"),
            (FeedConfig { min_speed: 50.0, max_speed: 50.0, ..FeedConfig::default() }, "max_speed"),
        ];
        for (cfg, field) in cases {
            let err = DemoFeed::new(cfg, 1).unwrap_err();
            assert_eq!(err.as_validation().map(ValidationError::field), Some(field));
        }
    }

    #[test]
    fn zero_jitter_is_allowed() {
        let cfg = FeedConfig {
            initial_jitter: 0.0,
            step_jitter: 0.0,
            ..FeedConfig::default()
        };
        let mut feed = DemoFeed::new(cfg, 5).unwrap();
        let first = feed.step(1);
        assert_eq!(first[0].lat, CITY_CENTRES[0].1);
    }
}
