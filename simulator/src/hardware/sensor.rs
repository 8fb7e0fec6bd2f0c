//! Sensor configuration for simulating detector characteristics

use ndarray::Array2;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::dark_current::DarkCurrentModel;
use crate::error::ConfigError;
use crate::photometry::{Band, QuantumEfficiency, QuantumEfficiencyError};
use crate::units::{Temperature, TemperatureExt};

/// ADC offset in ADU, uniform or varying across the array.
///
/// Serialized untagged: a number, a per-column list, or an ndarray map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Bias {
    Uniform(f64),
    /// One offset per column, repeated down every row
    Columns(Vec<f64>),
    /// Per-pixel offsets, shape (height, width)
    Map(Array2<f64>),
}

impl Default for Bias {
    fn default() -> Self {
        Bias::Uniform(0.0)
    }
}

impl From<f64> for Bias {
    fn from(bias_adu: f64) -> Self {
        Bias::Uniform(bias_adu)
    }
}

impl From<Vec<f64>> for Bias {
    fn from(columns: Vec<f64>) -> Self {
        Bias::Columns(columns)
    }
}

impl From<Array2<f64>> for Bias {
    fn from(map: Array2<f64>) -> Self {
        Bias::Map(map)
    }
}

impl Bias {
    /// Offset at (row, col).
    ///
    /// # Panics
    ///
    /// If a column or map bias does not cover the index; [`Bias::validate`]
    /// against the sensor shape rules this out.
    pub fn at(&self, row: usize, col: usize) -> f64 {
        match self {
            Bias::Uniform(bias) => *bias,
            Bias::Columns(columns) => columns[col],
            Bias::Map(map) => map[[row, col]],
        }
    }

    /// Check the shape against a sensor of `shape` (rows, cols) and reject negative offsets.
    pub fn validate(&self, shape: (usize, usize)) -> Result<(), ConfigError> {
        let values: Vec<f64> = match self {
            Bias::Uniform(bias) => vec![*bias],
            Bias::Columns(columns) => {
                if columns.len() != shape.1 {
                    return Err(ConfigError::BiasShape {
                        expected: shape,
                        actual: (1, columns.len()),
                    });
                }
                columns.clone()
            }
            Bias::Map(map) => {
                if map.dim() != shape {
                    return Err(ConfigError::BiasShape {
                        expected: shape,
                        actual: map.dim(),
                    });
                }
                map.iter().copied().collect()
            }
        };
        values
            .into_iter()
            .try_for_each(|bias| ConfigError::require_non_negative("bias", bias))
    }
}

/// Configuration for a sensor detector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Name/model of the sensor
    pub name: String,
    /// Quantum efficiency as a function of wavelength (nm)
    pub quantum_efficiency: QuantumEfficiency,
    /// Width of sensor in pixels
    pub width_px: usize,
    /// Height of sensor in pixels
    pub height_px: usize,
    /// Pixel pitch in microns
    pub pixel_size_um: f64,
    /// Full-well capacity in electrons
    pub full_well_e: f64,
    /// Read noise σ in electrons per pixel
    pub read_noise_e: f64,
    /// Dark current versus temperature
    pub dark_current: DarkCurrentModel,
    /// ADC conversion gain in ADU per electron
    pub gain_adu_per_e: f64,
    /// ADC offset in ADU
    #[serde(default)]
    pub bias: Bias,
    /// Bit depth of the ADC
    pub bit_depth: u8,
    /// Per-pixel dark rate multiplier, shape (height, width)
    #[serde(skip)]
    pub hot_pixels: Option<Array2<f64>>,
}

impl SensorConfig {
    /// Create a new sensor configuration.
    ///
    /// Gain defaults to mapping the full well onto the ADC range and bias to zero.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        quantum_efficiency: QuantumEfficiency,
        width_px: usize,
        height_px: usize,
        pixel_size_um: f64,
        full_well_e: f64,
        read_noise_e: f64,
        dark_current: DarkCurrentModel,
        bit_depth: u8,
    ) -> Self {
        let max_adu = 2f64.powi(bit_depth as i32) - 1.0;
        Self {
            name: name.into(),
            quantum_efficiency,
            width_px,
            height_px,
            pixel_size_um,
            full_well_e,
            read_noise_e,
            dark_current,
            gain_adu_per_e: max_adu / full_well_e,
            bias: Bias::default(),
            bit_depth,
            hot_pixels: None,
        }
    }

    pub fn with_gain(mut self, gain_adu_per_e: f64) -> Self {
        self.gain_adu_per_e = gain_adu_per_e;
        self
    }

    /// Set the ADC offset: a scalar, one value per column, or a full map.
    pub fn with_bias(mut self, bias: impl Into<Bias>) -> Self {
        self.bias = bias.into();
        self
    }

    pub fn with_hot_pixels(mut self, map: Array2<f64>) -> Self {
        self.hot_pixels = Some(map);
        self
    }

    /// Image shape as (rows, cols).
    pub fn shape(&self) -> (usize, usize) {
        (self.height_px, self.width_px)
    }

    /// Get sensor dimensions in microns
    pub fn dimensions_um(&self) -> (f64, f64) {
        (
            self.width_px as f64 * self.pixel_size_um,
            self.height_px as f64 * self.pixel_size_um,
        )
    }

    /// Diagonal of the active area in microns
    pub fn diagonal_um(&self) -> f64 {
        let (w, h) = self.dimensions_um();
        w.hypot(h)
    }

    /// Largest representable ADU value, 2^bits − 1.
    pub fn max_adu(&self) -> u16 {
        ((1u32 << self.bit_depth.clamp(1, 16)) - 1) as u16
    }

    /// Dark electrons accumulated per pixel over `exposure_s` at `temperature`.
    pub fn dark_electrons(&self, temperature: Temperature, exposure_s: f64) -> f64 {
        self.dark_current.rate_at(temperature) * exposure_s
    }

    /// Reject non-physical parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width_px == 0 || self.height_px == 0 {
            return Err(ConfigError::EmptySensor {
                width: self.width_px,
                height: self.height_px,
            });
        }
        ConfigError::require_positive("pixel pitch", self.pixel_size_um)?;
        ConfigError::require_positive("full well capacity", self.full_well_e)?;
        ConfigError::require_non_negative("read noise", self.read_noise_e)?;
        ConfigError::require_positive("gain", self.gain_adu_per_e)?;
        self.bias.validate(self.shape())?;
        if !(1..=16).contains(&self.bit_depth) {
            return Err(ConfigError::BitDepth(self.bit_depth));
        }
        self.dark_current.validate()?;

        if let Some(map) = &self.hot_pixels {
            if map.dim() != self.shape() {
                return Err(ConfigError::HotPixelShape {
                    expected: self.shape(),
                    actual: map.dim(),
                });
            }
            if let Some(&bad) = map.iter().find(|v| !(v.is_finite() && **v >= 0.0)) {
                return Err(ConfigError::Negative {
                    name: "hot pixel multiplier",
                    value: bad,
                });
            }
        }
        Ok(())
    }
}

/// Flat QE curve across the silicon response range (350–1000 nm).
pub fn create_flat_qe(efficiency: f64) -> Result<QuantumEfficiency, QuantumEfficiencyError> {
    QuantumEfficiency::from_notch(&Band::from_nm_bounds(350.0, 1000.0)?, efficiency)
}

/// Standard sensor models
pub mod models {
    use super::*;

    // Bundled tables are constants; a failure here is a bug in this file.
    fn bundled_qe(wavelengths: Vec<f64>, efficiencies: Vec<f64>) -> QuantumEfficiency {
        QuantumEfficiency::from_table(wavelengths, efficiencies).expect("bundled QE table is valid")
    }

    fn bundled_flat_qe(efficiency: f64) -> QuantumEfficiency {
        create_flat_qe(efficiency).expect("bundled flat QE is valid")
    }

    /// CMOSIS/ams CMV4000, a common star-tracker detector.
    /// Datasheet values: 5.5 µm pitch, 13.5 ke⁻ full well, 13 e⁻ read noise,
    /// 125 e⁻/s dark at 25 °C, 12-bit ADC.
    pub static CMV4000: Lazy<SensorConfig> = Lazy::new(|| {
        let qe = bundled_qe(
            vec![
                350.0, 400.0, 450.0, 500.0, 550.0, 600.0, 650.0, 700.0, 750.0, 800.0, 850.0,
                900.0, 950.0, 1000.0,
            ],
            vec![
                0.0, 0.25, 0.45, 0.55, 0.60, 0.60, 0.55, 0.45, 0.35, 0.27, 0.18, 0.10, 0.04, 0.0,
            ],
        );

        SensorConfig::new(
            "CMV4000",
            qe,
            2048,
            2048,
            5.5,
            13_500.0,
            13.0,
            DarkCurrentModel::from_reference_point(125.0, Temperature::from_celsius(25.0)),
            12,
        )
    });

    /// Sony IMX455 Full-frame BSI CMOS sensor
    /// Data from: "Characterization of Sony IMX455 sensor for astronomical applications"
    /// https://arxiv.org/pdf/2207.13052
    pub static IMX455: Lazy<SensorConfig> = Lazy::new(|| {
        let qe = bundled_qe(
            vec![
                300.0, 340.0, 380.0, 420.0, 460.0, 500.0, 540.0, 580.0, 620.0, 660.0, 700.0,
                760.0, 820.0, 880.0, 940.0, 1000.0,
            ],
            vec![
                0.0, 0.12, 0.35, 0.68, 0.90, 0.94, 0.86, 0.72, 0.56, 0.42, 0.30, 0.18, 0.12,
                0.08, 0.04, 0.0,
            ],
        );

        SensorConfig::new(
            "IMX455",
            qe,
            9568,
            6380,
            3.75,
            51_000.0,
            2.67,
            DarkCurrentModel::from_reference_point(0.002, Temperature::from_celsius(-20.0)),
            16,
        )
    });

    /// GSENSE4040BSI CMOS sensor
    pub static GSENSE4040BSI: Lazy<SensorConfig> = Lazy::new(|| {
        SensorConfig::new(
            "GSENSE4040BSI",
            bundled_flat_qe(0.9),
            4096,
            4096,
            9.0,
            39_000.0,
            2.3,
            DarkCurrentModel::from_reference_point(0.04, Temperature::from_celsius(-10.0)),
            12,
        )
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn test_sensor() -> SensorConfig {
        SensorConfig::new(
            "Test",
            create_flat_qe(0.5).unwrap(),
            1024,
            768,
            5.5,
            10_000.0,
            2.0,
            DarkCurrentModel::from_reference_point(0.01, Temperature::from_celsius(20.0)),
            12,
        )
    }

    #[test]
    fn test_sensor_dimensions() {
        let sensor = test_sensor();
        let (width_um, height_um) = sensor.dimensions_um();
        assert_eq!(width_um, 1024.0 * 5.5);
        assert_eq!(height_um, 768.0 * 5.5);
        assert_eq!(sensor.shape(), (768, 1024));
        assert_relative_eq!(sensor.diagonal_um(), 1280.0 * 5.5, epsilon = 1e-9);
    }

    #[test]
    fn test_default_gain_maps_full_well_to_max_adu() {
        let sensor = test_sensor();
        assert_eq!(sensor.max_adu(), 4095);
        assert_relative_eq!(sensor.full_well_e * sensor.gain_adu_per_e, 4095.0, epsilon = 1e-9);
    }

    #[test]
    fn test_validation_rejects_bad_parameters() {
        assert!(test_sensor().validate().is_ok());

        let mut sensor = test_sensor();
        sensor.pixel_size_um = 0.0;
        assert!(matches!(sensor.validate(), Err(ConfigError::NonPositive { .. })));

        let mut sensor = test_sensor();
        sensor.read_noise_e = -1.0;
        assert!(matches!(sensor.validate(), Err(ConfigError::Negative { .. })));

        let mut sensor = test_sensor();
        sensor.bit_depth = 17;
        assert!(matches!(sensor.validate(), Err(ConfigError::BitDepth(17))));

        let mut sensor = test_sensor();
        sensor.width_px = 0;
        assert!(matches!(sensor.validate(), Err(ConfigError::EmptySensor { .. })));
    }

    #[test]
    fn test_hot_pixel_shape_checked() {
        let sensor = test_sensor().with_hot_pixels(Array2::ones((10, 10)));
        assert!(matches!(
            sensor.validate(),
            Err(ConfigError::HotPixelShape { .. })
        ));

        let sensor = test_sensor().with_hot_pixels(Array2::ones((768, 1024)));
        assert!(sensor.validate().is_ok());
    }

    #[test]
    fn test_column_and_map_bias() {
        let columns: Vec<f64> = (0..1024).map(|c| 100.0 + (c % 4) as f64).collect();
        let sensor = test_sensor().with_bias(columns);
        assert!(sensor.validate().is_ok());
        assert_eq!(sensor.bias.at(0, 2), 102.0);
        assert_eq!(sensor.bias.at(767, 2), 102.0);

        let sensor = test_sensor().with_bias(vec![100.0; 768]);
        assert!(matches!(
            sensor.validate(),
            Err(ConfigError::BiasShape {
                actual: (1, 768),
                ..
            })
        ));

        let map = Array2::from_shape_fn((768, 1024), |(r, c)| (r + c) as f64);
        let sensor = test_sensor().with_bias(map);
        assert!(sensor.validate().is_ok());
        assert_eq!(sensor.bias.at(10, 20), 30.0);

        let sensor = test_sensor().with_bias(Array2::zeros((1024, 768)));
        assert!(matches!(sensor.validate(), Err(ConfigError::BiasShape { .. })));

        let mut negative = vec![0.0; 1024];
        negative[5] = -1.0;
        let sensor = test_sensor().with_bias(negative);
        assert!(matches!(sensor.validate(), Err(ConfigError::Negative { .. })));
    }

    #[test]
    fn test_bias_serde_forms() {
        let uniform: Bias = serde_json::from_str("12.0").unwrap();
        assert_eq!(uniform, Bias::Uniform(12.0));

        let columns: Bias = serde_json::from_str("[1.0, 2.0, 3.0]").unwrap();
        assert_eq!(columns, Bias::Columns(vec![1.0, 2.0, 3.0]));

        let map = Bias::Map(Array2::from_elem((2, 3), 7.0));
        let back: Bias = serde_json::from_str(&serde_json::to_string(&map).unwrap()).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_dark_electrons() {
        let sensor = test_sensor();
        assert_relative_eq!(
            sensor.dark_electrons(Temperature::from_celsius(28.0), 10.0),
            0.2,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_predefined_sensors() {
        assert_eq!(models::CMV4000.name, "CMV4000");
        assert_eq!(models::CMV4000.shape(), (2048, 2048));
        assert_relative_eq!(models::CMV4000.quantum_efficiency.at(550.0), 0.60);
        assert!(models::CMV4000.validate().is_ok());

        assert_eq!(models::IMX455.width_px, 9568);
        assert_eq!(models::IMX455.height_px, 6380);
        assert_eq!(models::IMX455.pixel_size_um, 3.75);
        assert_eq!(models::IMX455.read_noise_e, 2.67);
        assert_relative_eq!(models::IMX455.quantum_efficiency.at(500.0), 0.94);
        assert!(models::IMX455.validate().is_ok());

        assert_relative_eq!(models::GSENSE4040BSI.quantum_efficiency.at(550.0), 0.9);
        assert!(models::GSENSE4040BSI.validate().is_ok());
    }
}
