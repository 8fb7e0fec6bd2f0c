//! Star-tracker lens configuration.
//!
//! A lens is the focal length and clear aperture of a refractive objective,
//! plus the optical losses and geometric imperfections that matter for
//! synthetic imagery: overall transmission, a central obscuration (baffle or
//! secondary), distortion and an optional field stop.
//!
//! ```rust
//! use simulator::hardware::lens::LensConfig;
//! use simulator::hardware::sensor::models::CMV4000;
//! use simulator::units::{Length, LengthExt};
//!
//! let lens = LensConfig::from_f_number("25mm f/1.4", Length::from_millimeters(25.0), 1.4, 0.85);
//! let sensor = CMV4000.clone();
//!
//! println!("f/{:.1}, {:.0} px focal length", lens.f_number(), lens.focal_length_px(&sensor));
//! println!("Half field of view: {:.2}°", lens.fov_half_angle_rad(&sensor).to_degrees());
//! ```

use std::f64::consts::PI;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::sensor::SensorConfig;
use crate::distortion::{Distortion, PixelDistortion};
use crate::error::ConfigError;
use crate::units::{Length, LengthExt};

/// Optical configuration of the camera objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LensConfig {
    /// Lens model name or identifier
    pub name: String,
    /// Effective focal length in millimeters
    pub focal_length_mm: f64,
    /// Clear aperture diameter in millimeters
    pub aperture_mm: f64,
    /// Optical transmission (0.0-1.0)
    pub transmission: f64,
    /// Central obscuration as a fraction of the aperture diameter (0.0-1.0)
    #[serde(default)]
    pub obscuration_ratio: f64,
    #[serde(default)]
    pub distortion: Distortion,
    /// Field stop half-angle in degrees; the sensor diagonal when absent
    #[serde(default)]
    pub fov_half_angle_deg: Option<f64>,
    /// Optical center in pixels; the sensor center when absent
    #[serde(default)]
    pub optical_center_px: Option<(f64, f64)>,
}

impl LensConfig {
    pub fn new(
        name: impl Into<String>,
        focal_length: Length,
        aperture: Length,
        transmission: f64,
    ) -> Self {
        Self {
            name: name.into(),
            focal_length_mm: focal_length.as_millimeters(),
            aperture_mm: aperture.as_millimeters(),
            transmission,
            obscuration_ratio: 0.0,
            distortion: Distortion::None,
            fov_half_angle_deg: None,
            optical_center_px: None,
        }
    }

    /// Aperture derived from the focal ratio, D = f/N.
    pub fn from_f_number(
        name: impl Into<String>,
        focal_length: Length,
        f_number: f64,
        transmission: f64,
    ) -> Self {
        let aperture = Length::from_millimeters(focal_length.as_millimeters() / f_number);
        Self::new(name, focal_length, aperture, transmission)
    }

    pub fn with_obscuration(mut self, ratio: f64) -> Self {
        self.obscuration_ratio = ratio;
        self
    }

    pub fn with_distortion(mut self, distortion: Distortion) -> Self {
        self.distortion = distortion;
        self
    }

    pub fn with_fov_half_angle_deg(mut self, half_angle_deg: f64) -> Self {
        self.fov_half_angle_deg = Some(half_angle_deg);
        self
    }

    pub fn with_optical_center(mut self, x_px: f64, y_px: f64) -> Self {
        self.optical_center_px = Some((x_px, y_px));
        self
    }

    pub fn f_number(&self) -> f64 {
        self.focal_length_mm / self.aperture_mm
    }

    /// Unobscured collecting area π(D/2)²(1 − ε²) in cm².
    pub fn collecting_area_cm2(&self) -> f64 {
        let radius_cm = self.aperture_mm / 20.0;
        PI * radius_cm * radius_cm * (1.0 - self.obscuration_ratio.powi(2))
    }

    /// Focal length expressed in pixels of `sensor`.
    pub fn focal_length_px(&self, sensor: &SensorConfig) -> f64 {
        self.focal_length_mm * 1000.0 / sensor.pixel_size_um
    }

    /// Optical center in pixels, with pixel centers at integer coordinates.
    pub fn optical_center(&self, sensor: &SensorConfig) -> (f64, f64) {
        self.optical_center_px.unwrap_or((
            (sensor.width_px as f64 - 1.0) / 2.0,
            (sensor.height_px as f64 - 1.0) / 2.0,
        ))
    }

    /// Half field of view in radians.
    ///
    /// Without an explicit field stop this is the widest pinhole angle that
    /// still lands on the sensor: the four sensor corners are mapped back
    /// through the distortion model. Stars are culled against this cone
    /// before distortion, so barrel distortion widens it and the corners
    /// still receive stars.
    pub fn fov_half_angle_rad(&self, sensor: &SensorConfig) -> f64 {
        if let Some(deg) = self.fov_half_angle_deg {
            return deg.to_radians();
        }

        let focal_px = self.focal_length_px(sensor);
        let mapping = self.pixel_distortion(sensor);
        let (cx, cy) = mapping.center();
        let right = sensor.width_px as f64 - 0.5;
        let bottom = sensor.height_px as f64 - 0.5;

        [(-0.5, -0.5), (right, -0.5), (-0.5, bottom), (right, bottom)]
            .into_iter()
            .map(|(x, y)| {
                // Corners that fail to invert keep their distorted radius
                let (xu, yu) = mapping.undistort(x, y).unwrap_or((x, y));
                ((xu - cx).hypot(yu - cy) / focal_px).atan()
            })
            .fold(0.0, f64::max)
    }

    /// Plate scale in arcseconds per pixel at the optical center.
    pub fn plate_scale_arcsec_per_px(&self, sensor: &SensorConfig) -> f64 {
        (1.0 / self.focal_length_px(sensor)).atan().to_degrees() * 3600.0
    }

    /// Radius of the first Airy dark ring, 1.22·λ·N, in microns.
    pub fn airy_disk_radius_um(&self, wavelength_nm: f64) -> f64 {
        1.22 * wavelength_nm * 1e-3 * self.f_number()
    }

    /// Distortion bound to this lens and `sensor`.
    pub fn pixel_distortion(&self, sensor: &SensorConfig) -> PixelDistortion {
        PixelDistortion::new(
            self.distortion,
            self.optical_center(sensor),
            self.focal_length_px(sensor),
        )
    }

    /// Reject non-physical optics.
    ///
    /// Does not check distortion invertibility, which needs a sensor; see
    /// [`PixelDistortion::validate_over_sensor`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::require_positive("focal length", self.focal_length_mm)?;
        ConfigError::require_positive("aperture", self.aperture_mm)?;
        ConfigError::require_in_range("transmission", self.transmission, 0.0, 1.0)?;
        // A fully obscured aperture collects nothing
        if !(self.obscuration_ratio.is_finite()
            && (0.0..1.0).contains(&self.obscuration_ratio))
        {
            return Err(ConfigError::OutOfRange {
                name: "central obscuration",
                value: self.obscuration_ratio,
                min: 0.0,
                max: 1.0,
            });
        }
        if let Some(deg) = self.fov_half_angle_deg {
            if !(deg.is_finite() && deg > 0.0 && deg < 90.0) {
                return Err(ConfigError::OutOfRange {
                    name: "field of view half-angle",
                    value: deg,
                    min: 0.0,
                    max: 90.0,
                });
            }
        }
        if let Some((x, y)) = self.optical_center_px {
            if !x.is_finite() || !y.is_finite() {
                return Err(ConfigError::NonPositive {
                    name: "optical center",
                    value: if x.is_finite() { y } else { x },
                });
            }
        }
        Ok(())
    }
}

/// Standard lens models
pub mod models {
    use super::*;

    /// 25 mm f/1.4 objective, a typical wide-field tracker lens.
    pub static TRACKER_25MM_F1_4: Lazy<LensConfig> = Lazy::new(|| {
        LensConfig::from_f_number(
            "25mm f/1.4",
            Length::from_millimeters(25.0),
            1.4,
            0.85,
        )
    });

    /// 50 mm f/1.8 objective for narrow-field, high-accuracy trackers.
    pub static TRACKER_50MM_F1_8: Lazy<LensConfig> = Lazy::new(|| {
        LensConfig::from_f_number(
            "50mm f/1.8",
            Length::from_millimeters(50.0),
            1.8,
            0.80,
        )
    });

    /// 50 mm aperture, 500 mm focal length refractor (f/10).
    pub static SMALL_50MM: Lazy<LensConfig> = Lazy::new(|| {
        LensConfig::new(
            "50mm",
            Length::from_millimeters(500.0),
            Length::from_millimeters(50.0),
            0.615,
        )
    });
}
