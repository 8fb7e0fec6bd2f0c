//! Global shutter timing.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Single global exposure window; every pixel integrates over the same interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalShutter {
    pub integration: Duration,
    /// Only used for the frame period.
    pub readout: Duration,
}

impl GlobalShutter {
    pub fn new(integration: Duration) -> Self {
        Self {
            integration,
            readout: Duration::ZERO,
        }
    }

    /// Build from seconds; negative or non-finite values are rejected.
    pub fn from_secs_f64(seconds: f64) -> Result<Self, ConfigError> {
        ConfigError::require_non_negative("integration time", seconds)?;
        Duration::try_from_secs_f64(seconds)
            .map(Self::new)
            .map_err(|_| ConfigError::Negative {
                name: "integration time",
                value: seconds,
            })
    }

    pub fn with_readout(mut self, readout: Duration) -> Self {
        self.readout = readout;
        self
    }

    pub fn integration_s(&self) -> f64 {
        self.integration.as_secs_f64()
    }

    /// Integration plus readout.
    pub fn frame_period(&self) -> Duration {
        self.integration + self.readout
    }
}

impl Default for GlobalShutter {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}
