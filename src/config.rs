//! Aggregate configuration.
//!
//! Every section is optional in the JSON form; missing fields take their
//! defaults.
//!
//! ```
//! use ghostbus::config::GhostBusConfig;
//!
//! let cfg = GhostBusConfig::from_json_str(r#"{"policy": {"stale_after_seconds": 60}}"#).unwrap();
//! assert_eq!(cfg.policy.stale_after_seconds, 60);
//! assert_eq!(cfg.hub.queue_capacity, 256);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GhostError, GhostResult, ValidationError};
use crate::hub::HubConfig;
use crate::policy::GhostPolicy;
use crate::sweeper::SweepConfig;

/// Maximum accepted config file size.
pub const MAX_CONFIG_BYTES: u64 = 1024 * 1024;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GhostBusConfig {
    /// Classification thresholds and sweep interval.
    pub policy: GhostPolicy,
    /// Broadcast hub settings.
    pub hub: HubConfig,
    /// Sweep settings.
    pub sweep: SweepConfig,
}

impl GhostBusConfig {
    /// Parses and validates a JSON config.
    ///
    /// # Errors
    ///
    /// `ValidationError::InvalidConfig` for malformed JSON or invalid values.
    pub fn from_json_str(json: &str) -> GhostResult<Self> {
        let cfg: Self = serde_json::from_str(json).map_err(|e| ValidationError::InvalidConfig {
            field: "config".to_string(),
            reason: e.to_string(),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads, parses and validates a JSON config file.
    ///
    /// # Errors
    ///
    /// `GhostError::Internal` if the file cannot be read, otherwise as
    /// [`GhostBusConfig::from_json_str`].
    pub fn from_json_file(path: impl AsRef<Path>) -> GhostResult<Self> {
        let path = path.as_ref();
        let meta = std::fs::metadata(path)
            .map_err(|e| GhostError::internal(format!("cannot stat {}: {e}", path.display())))?;
        if meta.len() > MAX_CONFIG_BYTES {
            return Err(ValidationError::InvalidConfig {
                field: "config".to_string(),
                reason: format!("file exceeds {MAX_CONFIG_BYTES} bytes"),
            }
            .into());
        }
        let json = std::fs::read_to_string(path)
            .map_err(|e| GhostError::internal(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// The first `ValidationError` found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.policy.validate()?;
        self.hub.validate()?;
        Ok(())
    }
}
