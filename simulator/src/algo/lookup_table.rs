//! Lookup table with quadratic interpolation for fast function evaluation.
//!
//! Used to tabulate PSF radial profiles that are expensive to evaluate
//! (the defocus profile is a numerical integral per radius) so that kernel
//! rendering only pays for the integral once per renderer.

use thiserror::Error;

/// Error type for lookup table operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LookupError {
    /// Value is outside the domain bounds
    #[error("Value {value} is outside domain bounds ({min}, {max})")]
    OutOfBounds { value: f64, min: f64, max: f64 },

    /// Table construction parameters are unusable
    #[error("Invalid table domain ({min}, {max}) with {n_points} points")]
    InvalidDomain { min: f64, max: f64, n_points: usize },
}

/// Regularly sampled function values with quadratic (Lagrange) interpolation.
#[derive(Debug, Clone)]
pub struct LookupTable {
    /// Domain bounds (min, max)
    domain: (f64, f64),
    /// Step size between grid points
    dx: f64,
    /// Precomputed function values
    values: Vec<f64>,
}

impl LookupTable {
    /// Create a new lookup table by precomputing function values.
    ///
    /// # Arguments
    ///
    /// * `x_min` - Lower bound of the domain
    /// * `x_max` - Upper bound of the domain
    /// * `n_points` - Number of points to precompute (minimum 3)
    /// * `f` - Function to evaluate at each grid point
    pub fn new<F>(x_min: f64, x_max: f64, n_points: usize, f: F) -> Result<Self, LookupError>
    where
        F: Fn(f64) -> f64,
    {
        if !(x_min < x_max) || n_points < 3 || !x_min.is_finite() || !x_max.is_finite() {
            return Err(LookupError::InvalidDomain {
                min: x_min,
                max: x_max,
                n_points,
            });
        }

        let dx = (x_max - x_min) / (n_points - 1) as f64;
        let values = (0..n_points).map(|i| f(x_min + i as f64 * dx)).collect();

        Ok(Self {
            domain: (x_min, x_max),
            dx,
            values,
        })
    }

    /// Build a table from already-computed samples on a regular grid.
    pub fn from_samples(x_min: f64, x_max: f64, values: Vec<f64>) -> Result<Self, LookupError> {
        let n_points = values.len();
        if !(x_min < x_max) || n_points < 3 {
            return Err(LookupError::InvalidDomain {
                min: x_min,
                max: x_max,
                n_points,
            });
        }
        Ok(Self {
            domain: (x_min, x_max),
            dx: (x_max - x_min) / (n_points - 1) as f64,
            values,
        })
    }

    /// Evaluate the function at a given point using quadratic interpolation.
    pub fn eval(&self, x: f64) -> Result<f64, LookupError> {
        if !self.contains(x) {
            return Err(LookupError::OutOfBounds {
                value: x,
                min: self.domain.0,
                max: self.domain.1,
            });
        }

        let n_points = self.values.len();
        let t = (x - self.domain.0) / self.dx;
        let i = (t.floor() as usize).min(n_points - 3);

        let x0 = self.domain.0 + i as f64 * self.dx;
        let x1 = x0 + self.dx;
        let x2 = x1 + self.dx;

        let y0 = self.values[i];
        let y1 = self.values[i + 1];
        let y2 = self.values[i + 2];

        let l0 = ((x - x1) * (x - x2)) / ((x0 - x1) * (x0 - x2));
        let l1 = ((x - x0) * (x - x2)) / ((x1 - x0) * (x1 - x2));
        let l2 = ((x - x0) * (x - x1)) / ((x2 - x0) * (x2 - x1));

        Ok(y0 * l0 + y1 * l1 + y2 * l2)
    }

    /// Get the domain bounds of the lookup table.
    pub fn domain(&self) -> (f64, f64) {
        self.domain
    }

    /// Get the step size between grid points.
    pub fn step_size(&self) -> f64 {
        self.dx
    }

    /// Grid values, in ascending x order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Check if a value is within the table's domain.
    pub fn contains(&self, x: f64) -> bool {
        x >= self.domain.0 && x <= self.domain.1
    }
}
