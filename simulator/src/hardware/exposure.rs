//! Per-frame acquisition conditions.

use serde::{Deserialize, Serialize};

use super::shutter::GlobalShutter;
use crate::error::ConfigError;
use crate::photometry::Bandpass;
use crate::units::{Temperature, TemperatureExt};

/// Everything that changes from frame to frame for a fixed camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureConfig {
    pub shutter: GlobalShutter,
    /// Sensor temperature during the exposure
    pub temperature: Temperature,
    pub bandpass: Bandpass,
    /// Diffuse sky/stray-light background in e⁻/px/s
    #[serde(default)]
    pub sky_background_e_per_s: f64,
}

impl ExposureConfig {
    pub fn new(shutter: GlobalShutter, temperature: Temperature, bandpass: Bandpass) -> Self {
        Self {
            shutter,
            temperature,
            bandpass,
            sky_background_e_per_s: 0.0,
        }
    }

    pub fn with_sky_background(mut self, e_per_px_s: f64) -> Self {
        self.sky_background_e_per_s = e_per_px_s;
        self
    }

    pub fn integration_s(&self) -> f64 {
        self.shutter.integration_s()
    }

    /// Background electrons per pixel over the integration window.
    pub fn background_electrons(&self) -> f64 {
        self.sky_background_e_per_s * self.integration_s()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let kelvin = self.temperature.as_kelvin();
        if !(kelvin.is_finite() && kelvin >= 0.0) {
            return Err(ConfigError::Negative {
                name: "sensor temperature (K)",
                value: kelvin,
            });
        }
        ConfigError::require_non_negative("sky background", self.sky_background_e_per_s)?;
        if self.bandpass.transmission.peak() <= 0.0 {
            log::warn!("bandpass transmits nothing; stars will render with zero flux");
        }
        ConfigError::require_non_negative(
            "zero point",
            self.bandpass.zero_point.photons_per_s_cm2_nm,
        )
    }
}
