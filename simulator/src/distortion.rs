//! Lens distortion: ideal pinhole pixel coordinates to where stars actually land.
//!
//! The Brown-Conrady model works in normalized focal-plane coordinates
//! `x_n = (x − cx)/f_px`. [`PixelDistortion`] binds a model to an optical
//! center and focal length so callers can stay in pixels.
//!
//! Rendering only needs the forward map. The inverse exists so a renderer
//! can check at construction time that the coefficients describe a map that
//! is invertible over the whole sensor.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convergence tolerance of the inverse, in normalized units
pub const UNDISTORT_TOLERANCE: f64 = 1e-12;

/// Iteration cap of the inverse
pub const UNDISTORT_MAX_ITERATIONS: usize = 100;

/// Grid points per axis used when checking invertibility over a sensor
const VALIDATION_GRID: usize = 9;

/// Maximum round-trip error accepted during validation, in pixels
const ROUND_TRIP_TOLERANCE_PX: f64 = 1e-6;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DistortionError {
    #[error("inverse did not converge at ({x:.6}, {y:.6}) after {iterations} iterations")]
    NotConverged { x: f64, y: f64, iterations: usize },

    #[error("non-finite coordinate while mapping ({x}, {y})")]
    NonFinite { x: f64, y: f64 },

    #[error("round trip through ({x:.3}, {y:.3}) px is off by {error:.3e} px")]
    RoundTrip { x: f64, y: f64, error: f64 },

    #[error("non-finite distortion coefficient {0}")]
    Coefficient(&'static str),
}

/// Brown-Conrady distortion with rational radial and tangential terms.
///
/// ```text
/// r² = x² + y²
/// radial = (1 + k1·r² + k2·r⁴ + k3·r⁶) / (1 + k4·r² + k5·r⁴ + k6·r⁶)
/// x_d = x·radial + 2·p1·x·y + p2·(r² + 2x²)
/// y_d = y·radial + p1·(r² + 2y²) + 2·p2·x·y
/// ```
///
/// Barrel distortion has k1 < 0, pincushion k1 > 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BrownConrady {
    pub k1: f64,
    pub k2: f64,
    pub k3: f64,
    #[serde(default)]
    pub k4: f64,
    #[serde(default)]
    pub k5: f64,
    #[serde(default)]
    pub k6: f64,
    #[serde(default)]
    pub p1: f64,
    #[serde(default)]
    pub p2: f64,
}

impl BrownConrady {
    /// Polynomial radial terms only.
    pub fn radial(k1: f64, k2: f64, k3: f64) -> Self {
        Self {
            k1,
            k2,
            k3,
            ..Self::default()
        }
    }

    pub fn with_tangential(mut self, p1: f64, p2: f64) -> Self {
        self.p1 = p1;
        self.p2 = p2;
        self
    }

    pub fn with_rational(mut self, k4: f64, k5: f64, k6: f64) -> Self {
        self.k4 = k4;
        self.k5 = k5;
        self.k6 = k6;
        self
    }

    fn radial_factor(&self, r2: f64) -> f64 {
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let num = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;
        let den = 1.0 + self.k4 * r2 + self.k5 * r4 + self.k6 * r6;
        num / den
    }

    fn tangential(&self, x: f64, y: f64, r2: f64) -> (f64, f64) {
        (
            2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x),
            self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y,
        )
    }

    /// Forward map in normalized coordinates.
    pub fn distort(&self, x: f64, y: f64) -> (f64, f64) {
        let r2 = x * x + y * y;
        let radial = self.radial_factor(r2);
        let (dx, dy) = self.tangential(x, y, r2);
        (x * radial + dx, y * radial + dy)
    }

    /// Inverse map in normalized coordinates by successive substitution.
    ///
    /// Iterates `x ← (x_d − Δx(x)) / radial(x)` until the step drops below
    /// [`UNDISTORT_TOLERANCE`].
    pub fn undistort(&self, x_d: f64, y_d: f64) -> Result<(f64, f64), DistortionError> {
        let (mut x, mut y) = (x_d, y_d);
        for _ in 0..UNDISTORT_MAX_ITERATIONS {
            let r2 = x * x + y * y;
            let radial = self.radial_factor(r2);
            let (dx, dy) = self.tangential(x, y, r2);
            let x_next = (x_d - dx) / radial;
            let y_next = (y_d - dy) / radial;

            if !x_next.is_finite() || !y_next.is_finite() {
                return Err(DistortionError::NonFinite { x: x_d, y: y_d });
            }

            let step = (x_next - x).hypot(y_next - y);
            x = x_next;
            y = y_next;
            if step < UNDISTORT_TOLERANCE {
                return Ok((x, y));
            }
        }
        Err(DistortionError::NotConverged {
            x: x_d,
            y: y_d,
            iterations: UNDISTORT_MAX_ITERATIONS,
        })
    }

    fn validate(&self) -> Result<(), DistortionError> {
        let coefficients = [
            ("k1", self.k1),
            ("k2", self.k2),
            ("k3", self.k3),
            ("k4", self.k4),
            ("k5", self.k5),
            ("k6", self.k6),
            ("p1", self.p1),
            ("p2", self.p2),
        ];
        match coefficients.iter().find(|(_, v)| !v.is_finite()) {
            Some((name, _)) => Err(DistortionError::Coefficient(name)),
            None => Ok(()),
        }
    }
}

/// Lens distortion model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum Distortion {
    /// Ideal pinhole
    #[default]
    None,
    BrownConrady(BrownConrady),
}

impl Distortion {
    /// Forward map in normalized coordinates.
    pub fn distort(&self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Distortion::None => (x, y),
            Distortion::BrownConrady(bc) => bc.distort(x, y),
        }
    }

    /// Inverse map in normalized coordinates.
    pub fn undistort(&self, x: f64, y: f64) -> Result<(f64, f64), DistortionError> {
        match self {
            Distortion::None => Ok((x, y)),
            Distortion::BrownConrady(bc) => bc.undistort(x, y),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Distortion::None)
    }
}

/// A distortion model bound to a sensor's optical center and focal length in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelDistortion {
    model: Distortion,
    center: (f64, f64),
    focal_px: f64,
}

impl PixelDistortion {
    pub fn new(model: Distortion, center: (f64, f64), focal_px: f64) -> Self {
        Self {
            model,
            center,
            focal_px,
        }
    }

    pub fn center(&self) -> (f64, f64) {
        self.center
    }

    fn normalize(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.center.0) / self.focal_px,
            (y - self.center.1) / self.focal_px,
        )
    }

    fn to_pixels(&self, xn: f64, yn: f64) -> (f64, f64) {
        (
            self.center.0 + xn * self.focal_px,
            self.center.1 + yn * self.focal_px,
        )
    }

    /// Ideal pixel coordinate to distorted pixel coordinate.
    pub fn distort(&self, x: f64, y: f64) -> (f64, f64) {
        let (xn, yn) = self.normalize(x, y);
        let (xd, yd) = self.model.distort(xn, yn);
        self.to_pixels(xd, yd)
    }

    /// Distorted pixel coordinate back to the ideal pixel coordinate.
    pub fn undistort(&self, x: f64, y: f64) -> Result<(f64, f64), DistortionError> {
        let (xn, yn) = self.normalize(x, y);
        let (xu, yu) = self.model.undistort(xn, yn)?;
        Ok(self.to_pixels(xu, yu))
    }

    /// Check forward-then-inverse over a grid spanning a `width` × `height` sensor.
    pub fn validate_over_sensor(&self, width: usize, height: usize) -> Result<(), DistortionError> {
        if let Distortion::BrownConrady(bc) = &self.model {
            bc.validate()?;
        } else {
            return Ok(());
        }

        let span = |n: usize, i: usize| {
            let extent = n.saturating_sub(1) as f64;
            extent * i as f64 / (VALIDATION_GRID - 1) as f64
        };

        for j in 0..VALIDATION_GRID {
            for i in 0..VALIDATION_GRID {
                let (x, y) = (span(width, i), span(height, j));
                let (xd, yd) = self.distort(x, y);
                if !xd.is_finite() || !yd.is_finite() {
                    return Err(DistortionError::NonFinite { x, y });
                }
                let (xu, yu) = self.undistort(xd, yd)?;
                let error = (xu - x).hypot(yu - y);
                if error > ROUND_TRIP_TOLERANCE_PX {
                    return Err(DistortionError::RoundTrip { x, y, error });
                }
            }
        }
        Ok(())
    }
}
