//! Dark current as a function of sensor temperature
//!
//! Thermal generation in silicon roughly doubles every few degrees. The model
//! is either the closed-form doubling law through a reference point, or a
//! measured temperature/rate curve interpolated in log space.

use serde::{Deserialize, Serialize};

use crate::algo::misc::interp;
use crate::error::ConfigError;
use crate::units::{Temperature, TemperatureExt};

/// Doubling temperature used by the bundled sensor models (°C)
pub const DEFAULT_DOUBLING_C: f64 = 8.0;

/// Elementary charge in coulombs
const ELEMENTARY_CHARGE_C: f64 = 1.602176634e-19;

/// Dark current model in electrons/pixel/second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DarkCurrentModel {
    /// `rate(T) = rate₀ · 2^((T − T₀)/T_double)`
    Doubling {
        reference_rate_e_per_s: f64,
        reference_temperature: Temperature,
        doubling_temperature_c: f64,
    },
    /// Measured curve, interpolated in log space and clamped at the ends.
    Curve {
        temperatures_c: Vec<f64>,
        rates_e_per_s: Vec<f64>,
    },
}

impl DarkCurrentModel {
    /// Doubling law through one reference point with the default 8 °C doubling.
    ///
    /// # Example
    /// ```
    /// use simulator::hardware::dark_current::DarkCurrentModel;
    /// use simulator::units::{Temperature, TemperatureExt};
    ///
    /// let model = DarkCurrentModel::from_reference_point(0.1, Temperature::from_celsius(20.0));
    /// assert!((model.rate_at(Temperature::from_celsius(28.0)) - 0.2).abs() < 1e-12);
    /// ```
    pub fn from_reference_point(reference_rate_e_per_s: f64, reference_temperature: Temperature) -> Self {
        DarkCurrentModel::Doubling {
            reference_rate_e_per_s,
            reference_temperature,
            doubling_temperature_c: DEFAULT_DOUBLING_C,
        }
    }

    /// Replace the doubling temperature of a doubling-law model.
    pub fn with_doubling_temperature(self, doubling_c: f64) -> Self {
        match self {
            DarkCurrentModel::Doubling {
                reference_rate_e_per_s,
                reference_temperature,
                ..
            } => DarkCurrentModel::Doubling {
                reference_rate_e_per_s,
                reference_temperature,
                doubling_temperature_c: doubling_c,
            },
            curve => curve,
        }
    }

    /// Fit the doubling law through two measured points.
    ///
    /// dc2 = dc1 · 2^((T2 − T1)/T_double), so T_double = (T2 − T1)/log2(dc2/dc1).
    pub fn from_two_points(
        temp1: Temperature,
        dark_current1: f64,
        temp2: Temperature,
        dark_current2: f64,
    ) -> Result<Self, ConfigError> {
        ConfigError::require_positive("dark current", dark_current1)?;
        ConfigError::require_positive("dark current", dark_current2)?;

        let temp_diff = temp2.as_celsius() - temp1.as_celsius();
        let doubling = temp_diff / (dark_current2 / dark_current1).log2();
        ConfigError::require_positive("dark current doubling temperature", doubling)?;

        Ok(DarkCurrentModel::Doubling {
            reference_rate_e_per_s: dark_current1,
            reference_temperature: temp1,
            doubling_temperature_c: doubling,
        })
    }

    /// Convert a datasheet current density (pA/cm²) into a per-pixel rate.
    pub fn from_current_density(
        pa_per_cm2: f64,
        reference_temperature: Temperature,
        pixel_size_um: f64,
    ) -> Self {
        let pixel_area_cm2 = (pixel_size_um * 1e-4).powi(2);
        let rate = pa_per_cm2 * 1e-12 * pixel_area_cm2 / ELEMENTARY_CHARGE_C;
        Self::from_reference_point(rate, reference_temperature)
    }

    /// Measured curve; temperatures must be strictly ascending and rates positive.
    pub fn from_curve(temperatures_c: Vec<f64>, rates_e_per_s: Vec<f64>) -> Result<Self, ConfigError> {
        let model = DarkCurrentModel::Curve {
            temperatures_c,
            rates_e_per_s,
        };
        model.validate()?;
        Ok(model)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            DarkCurrentModel::Doubling {
                reference_rate_e_per_s,
                reference_temperature,
                doubling_temperature_c,
            } => {
                ConfigError::require_non_negative("dark current", *reference_rate_e_per_s)?;
                if !reference_temperature.as_kelvin().is_finite() {
                    return Err(ConfigError::NonPositive {
                        name: "dark current reference temperature",
                        value: reference_temperature.as_kelvin(),
                    });
                }
                ConfigError::require_positive("dark current doubling temperature", *doubling_temperature_c)
            }
            DarkCurrentModel::Curve {
                temperatures_c,
                rates_e_per_s,
            } => {
                if temperatures_c.len() != rates_e_per_s.len() || temperatures_c.len() < 2 {
                    return Err(ConfigError::NonPositive {
                        name: "dark current curve length",
                        value: temperatures_c.len().min(rates_e_per_s.len()) as f64,
                    });
                }
                if let Some(w) = temperatures_c
                    .windows(2)
                    .find(|w| !(w[1] > w[0]) || !w[1].is_finite())
                {
                    return Err(ConfigError::NonPositive {
                        name: "dark current curve temperature step",
                        value: w[1] - w[0],
                    });
                }
                rates_e_per_s
                    .iter()
                    .try_for_each(|&r| ConfigError::require_positive("dark current", r))
            }
        }
    }

    /// Dark rate in e⁻/px/s at `temperature`.
    pub fn rate_at(&self, temperature: Temperature) -> f64 {
        let t = temperature.as_celsius();
        match self {
            DarkCurrentModel::Doubling {
                reference_rate_e_per_s,
                reference_temperature,
                doubling_temperature_c,
            } => {
                let doublings = (t - reference_temperature.as_celsius()) / doubling_temperature_c;
                reference_rate_e_per_s * 2f64.powf(doublings)
            }
            DarkCurrentModel::Curve {
                temperatures_c,
                rates_e_per_s,
            } => {
                let lo = temperatures_c[0];
                let hi = temperatures_c[temperatures_c.len() - 1];
                let clamped = t.clamp(lo, hi);
                if clamped != t {
                    log::warn!(
                        "temperature {:.1}°C outside dark current curve [{:.1}, {:.1}], clamping",
                        t,
                        lo,
                        hi
                    );
                }
                let logs: Vec<f64> = rates_e_per_s.iter().map(|r| r.ln()).collect();
                interp(clamped, temperatures_c, &logs)
                    .map(f64::exp)
                    .unwrap_or(0.0)
            }
        }
    }

    /// Degrees Celsius for the rate to double, measured around 0–10 °C for curves.
    pub fn doubling_temperature(&self) -> f64 {
        match self {
            DarkCurrentModel::Doubling {
                doubling_temperature_c,
                ..
            } => *doubling_temperature_c,
            DarkCurrentModel::Curve { .. } => {
                let dc1 = self.rate_at(Temperature::from_celsius(0.0));
                let dc2 = self.rate_at(Temperature::from_celsius(10.0));
                10.0 / (dc2 / dc1).log2()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn reference() -> DarkCurrentModel {
        DarkCurrentModel::from_reference_point(0.1, Temperature::from_celsius(20.0))
    }

    #[test]
    fn test_same_temperature() {
        assert_relative_eq!(reference().rate_at(Temperature::from_celsius(20.0)), 0.1);
    }

    #[test]
    fn test_8_degree_increase_doubles() {
        let model = reference();
        assert_relative_eq!(model.rate_at(Temperature::from_celsius(28.0)), 0.2, epsilon = 1e-12);
        assert_relative_eq!(model.rate_at(Temperature::from_celsius(36.0)), 0.4, epsilon = 1e-12);
    }

    #[test]
    fn test_8_degree_decrease_halves() {
        let model = reference();
        assert_relative_eq!(model.rate_at(Temperature::from_celsius(12.0)), 0.05, epsilon = 1e-12);
        assert_relative_eq!(model.rate_at(Temperature::from_celsius(4.0)), 0.025, epsilon = 1e-12);
    }

    #[test]
    fn test_4_degree_increase_sqrt2() {
        let expected = 0.1 * 2f64.sqrt();
        assert_relative_eq!(
            reference().rate_at(Temperature::from_celsius(24.0)),
            expected,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_custom_doubling() {
        let model = reference().with_doubling_temperature(6.0);
        assert_relative_eq!(model.rate_at(Temperature::from_celsius(26.0)), 0.2, epsilon = 1e-12);
        assert_eq!(model.doubling_temperature(), 6.0);
    }

    #[test]
    fn test_from_two_points() {
        let model = DarkCurrentModel::from_two_points(
            Temperature::from_celsius(-10.0),
            0.01,
            Temperature::from_celsius(20.0),
            0.08,
        )
        .unwrap();
        // Factor 8 over 30 °C: doubling every 10 °C
        assert_relative_eq!(model.doubling_temperature(), 10.0, epsilon = 1e-10);
        assert_relative_eq!(model.rate_at(Temperature::from_celsius(0.0)), 0.02, epsilon = 1e-12);

        assert!(DarkCurrentModel::from_two_points(
            Temperature::from_celsius(0.0),
            0.1,
            Temperature::from_celsius(10.0),
            0.05,
        )
        .is_err());
    }

    #[test]
    fn test_current_density_conversion() {
        // 1 nA/cm² over a 10 µm pixel (1e-6 cm²) is 1e-15 A = 6241.5 e⁻/s
        let model =
            DarkCurrentModel::from_current_density(1000.0, Temperature::from_celsius(25.0), 10.0);
        assert_relative_eq!(
            model.rate_at(Temperature::from_celsius(25.0)),
            6241.509,
            max_relative = 1e-6
        );
    }

    #[test]
    fn test_curve_interpolates_in_log_space() {
        let model =
            DarkCurrentModel::from_curve(vec![-20.0, 0.0, 20.0], vec![0.01, 0.1, 1.0]).unwrap();
        assert_relative_eq!(model.rate_at(Temperature::from_celsius(10.0)), 0.1 * 10f64.sqrt(), epsilon = 1e-12);
        // Clamped outside the curve
        assert_relative_eq!(model.rate_at(Temperature::from_celsius(40.0)), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_validation() {
        assert!(reference().validate().is_ok());
        assert!(reference().with_doubling_temperature(0.0).validate().is_err());
        assert!(DarkCurrentModel::from_reference_point(-1.0, Temperature::from_celsius(0.0))
            .validate()
            .is_err());
        assert!(DarkCurrentModel::from_curve(vec![0.0, 0.0], vec![1.0, 2.0]).is_err());
    }
}
