//! Error types surfaced by the simulator.
//!
//! Configuration problems are caught before a buffer is allocated; catalog
//! problems are caught at the projector boundary. Nothing here is retryable.

use thiserror::Error;

use crate::algo::LookupError;
use crate::distortion::DistortionError;
use crate::photometry::quantum_efficiency::QuantumEfficiencyError;
use crate::star_math::CatalogError;

/// Invalid or non-physical configuration parameters.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be positive and finite, got {value}")]
    NonPositive { name: &'static str, value: f64 },

    #[error("{name} must be non-negative and finite, got {value}")]
    Negative { name: &'static str, value: f64 },

    #[error("{name} must lie in [{min}, {max}], got {value}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("sensor must have at least one pixel, got {width}x{height}")]
    EmptySensor { width: usize, height: usize },

    #[error("hot pixel map shape {actual:?} does not match sensor shape {expected:?}")]
    HotPixelShape {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("bias shape {actual:?} does not fit sensor shape {expected:?}")]
    BiasShape {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("ADC bit depth must be in 1..=16, got {0}")]
    BitDepth(u8),

    #[error("invalid attitude: {0}")]
    Attitude(&'static str),

    #[error("invalid PSF parameter {name}: {value}")]
    InvalidPsf { name: &'static str, value: f64 },

    #[error("distortion model rejected: {0}")]
    Distortion(#[from] DistortionError),

    #[error(transparent)]
    QuantumEfficiency(#[from] QuantumEfficiencyError),

    #[error("PSF profile table: {0}")]
    ProfileTable(#[from] LookupError),
}

impl ConfigError {
    /// Reject values that are not strictly positive (including NaN and infinities).
    pub(crate) fn require_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
        if value.is_finite() && value > 0.0 {
            Ok(())
        } else {
            Err(ConfigError::NonPositive { name, value })
        }
    }

    /// Reject negative or non-finite values.
    pub(crate) fn require_non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
        if value.is_finite() && value >= 0.0 {
            Ok(())
        } else {
            Err(ConfigError::Negative { name, value })
        }
    }

    /// Reject values outside a closed interval.
    pub(crate) fn require_in_range(
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    ) -> Result<(), ConfigError> {
        if value.is_finite() && (min..=max).contains(&value) {
            Ok(())
        } else {
            Err(ConfigError::OutOfRange {
                name,
                value,
                min,
                max,
            })
        }
    }
}

/// Top-level error for a simulation call.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

impl From<QuantumEfficiencyError> for SimulationError {
    fn from(err: QuantumEfficiencyError) -> Self {
        SimulationError::Config(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_positive() {
        assert!(ConfigError::require_positive("x", 1.0).is_ok());
        assert!(ConfigError::require_positive("x", 0.0).is_err());
        assert!(ConfigError::require_positive("x", f64::NAN).is_err());
        assert!(ConfigError::require_positive("x", f64::INFINITY).is_err());
    }

    #[test]
    fn test_require_in_range_message() {
        let err = ConfigError::require_in_range("transmission", 1.5, 0.0, 1.0).unwrap_err();
        assert_eq!(
            err.to_string(),
            "transmission must lie in [0, 1], got 1.5"
        );
    }

    #[test]
    fn test_require_non_negative() {
        assert!(ConfigError::require_non_negative("read noise", 0.0).is_ok());
        assert!(ConfigError::require_non_negative("read noise", -0.1).is_err());
    }
}
