//! Conversion tuning parameters.

use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};

/// Tuning parameters for a conversion job.
///
/// Serde-friendly so callers can load them from a settings file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertSettings {
    /// Records between progress events and cancellation checks.
    pub progress_interval: u64,
    /// Tolerance for the unit-norm check on direction cosines; records
    /// outside it are counted in the report, not dropped.
    pub direction_tolerance: f64,
}

impl Default for ConvertSettings {
    fn default() -> Self {
        Self {
            progress_interval: 10_000,
            direction_tolerance: rayset_model::DIRECTION_TOLERANCE,
        }
    }
}

impl ConvertSettings {
    /// Validate settings.
    pub fn validate(&self) -> Result<()> {
        if self.progress_interval == 0 {
            return Err(ConvertError::InvalidSettings(
                "progress_interval must be at least 1".into(),
            ));
        }
        if !self.direction_tolerance.is_finite() || self.direction_tolerance <= 0.0 {
            return Err(ConvertError::InvalidSettings(
                "direction_tolerance must be positive and finite".into(),
            ));
        }
        Ok(())
    }
}
