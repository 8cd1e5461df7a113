//! Vehicle position data model and wire types.
//!
//! Producers submit [`PositionUpdate`]s; the registry owns one
//! [`VehiclePosition`] per vehicle id; subscribers receive
//! [`ClassifiedEvent`]s. Field names on the wire are the short forms
//! (`lat`, `lon`, `timestamp`) existing consumers already parse.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Maximum length of a vehicle id, in bytes.
pub const MAX_ID_LEN: usize = 128;

/// Maximum length of a route label, in bytes.
pub const MAX_ROUTE_LEN: usize = 256;

/// Raw position report from a producer.
///
/// ```
/// use ghostbus::PositionUpdate;
///
/// let update: PositionUpdate = serde_json::from_str(
///     r#"{"id":"B1","lat":12.9,"lon":77.6,"speed":30.0,"timestamp":1000}"#,
/// ).unwrap();
/// assert!(update.validate().is_ok());
/// assert!(update.route.is_none());
/// ```
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    /// Ground speed in km/h.
    pub speed: f64,
    /// Unix timestamp, seconds.
    pub timestamp: i64,
}

impl PositionUpdate {
    /// Creates an update without a route label.
    #[must_use]
    pub fn new(id: impl Into<String>, lat: f64, lon: f64, speed: f64, timestamp: i64) -> Self {
        Self {
            id: id.into(),
            lat,
            lon,
            route: None,
            speed,
            timestamp,
        }
    }

    /// Sets the route label.
    #[must_use]
    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    /// Validates this update.
    ///
    /// Fields are checked in wire order, so the first failing field is the one
    /// reported.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` naming the offending field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_id(&self.id)?;
        validate_coordinate("lat", self.lat, 90.0)?;
        validate_coordinate("lon", self.lon, 180.0)?;
        if let Some(route) = &self.route {
            if route.len() > MAX_ROUTE_LEN {
                return Err(ValidationError::FieldTooLong {
                    field: "route".to_string(),
                    max_length: MAX_ROUTE_LEN,
                });
            }
        }
        if !self.speed.is_finite() {
            return Err(ValidationError::NotFinite {
                field: "speed".to_string(),
            });
        }
        if self.speed < 0.0 {
            return Err(ValidationError::Negative {
                field: "speed".to_string(),
                value: self.speed,
            });
        }
        if self.timestamp < 0 {
            #[allow(clippy::cast_precision_loss)]
            let value = self.timestamp as f64;
            return Err(ValidationError::Negative {
                field: "timestamp".to_string(),
                value,
            });
        }
        Ok(())
    }
}

fn validate_id(id: &str) -> Result<(), ValidationError> {
    if id.trim().is_empty() {
        return Err(ValidationError::EmptyField {
            field: "id".to_string(),
        });
    }
    if id.len() > MAX_ID_LEN {
        return Err(ValidationError::FieldTooLong {
            field: "id".to_string(),
            max_length: MAX_ID_LEN,
        });
    }
    Ok(())
}

fn validate_coordinate(field: &'static str, value: f64, bound: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NotFinite {
            field: field.to_string(),
        });
    }
    if !(-bound..=bound).contains(&value) {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            value,
            min: -bound,
            max: bound,
        });
    }
    Ok(())
}

/// Last-known state of one vehicle.
///
/// `is_ghost` is derived: only the registry sets it, from the classifier's
/// verdict on this record's own fields.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehiclePosition {
    pub id: String,
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lon")]
    pub longitude: f64,
    pub route: Option<String>,
    pub speed: f64,
    #[serde(rename = "timestamp")]
    pub last_update_time: i64,
    pub is_ghost: bool,
}

impl VehiclePosition {
    /// Creates a record from a first-seen update.
    #[must_use]
    pub fn from_update(update: &PositionUpdate) -> Self {
        Self {
            id: update.id.clone(),
            latitude: update.lat,
            longitude: update.lon,
            route: update.route.clone(),
            speed: update.speed,
            last_update_time: update.timestamp,
            is_ghost: false,
        }
    }

    /// Overwrites every reported field from `update`.
    ///
    /// `is_ghost` is left alone; the caller reclassifies afterwards.
    pub fn apply(&mut self, update: &PositionUpdate) {
        self.latitude = update.lat;
        self.longitude = update.lon;
        self.route.clone_from(&update.route);
        self.speed = update.speed;
        self.last_update_time = update.timestamp;
    }

    /// The reported fields of this record, as an update.
    #[must_use]
    pub fn to_update(&self) -> PositionUpdate {
        PositionUpdate {
            id: self.id.clone(),
            lat: self.latitude,
            lon: self.longitude,
            route: self.route.clone(),
            speed: self.speed,
            timestamp: self.last_update_time,
        }
    }

    /// Checks the record's reported fields against the update rules.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` naming the first malformed field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.to_update().validate()
    }
}

/// Event type tag carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A vehicle record changed or was re-evaluated.
    #[serde(rename = "bus.update")]
    BusUpdate,
}

/// A classified vehicle record, as broadcast to subscribers.
///
/// Serializes as `{"type":"bus.update","data":{...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedEvent {
    /// Event type tag.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// The classified record.
    pub data: VehiclePosition,
}

impl ClassifiedEvent {
    /// Wraps a classified record as a `bus.update` event.
    #[must_use]
    pub const fn bus_update(data: VehiclePosition) -> Self {
        Self {
            kind: EventKind::BusUpdate,
            data,
        }
    }
}
