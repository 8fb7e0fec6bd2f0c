//! Wavelength-dependent efficiency curves.
//!
//! The same piecewise-linear curve type models detector quantum efficiency,
//! filter transmission and their product. Curves are zero outside their
//! tabulated range and must start and end at zero so that products and
//! integrals never see a step at the table edge.
//!
//! ```rust
//! use simulator::photometry::{Band, QuantumEfficiency};
//!
//! let detector = QuantumEfficiency::from_table(
//!     vec![350.0, 450.0, 650.0, 950.0],
//!     vec![0.0, 0.7, 0.6, 0.0],
//! ).unwrap();
//! let filter = QuantumEfficiency::from_notch(&Band::from_nm_bounds(500.0, 600.0).unwrap(), 0.9).unwrap();
//!
//! let combined = QuantumEfficiency::product(&detector, &filter).unwrap();
//! assert_eq!(combined.at(450.0), 0.0);
//! assert!(combined.at(550.0) > 0.5);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Band;

/// Errors that can occur with quantum efficiency curves
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QuantumEfficiencyError {
    #[error("Wavelength and efficiency vectors must have the same length (at least 2)")]
    LengthMismatch,

    #[error("Wavelengths must be finite and in ascending order")]
    NotAscending,

    #[error("First and last efficiency values must be 0.0")]
    BoundaryNotZero,

    #[error("Efficiency values must be between 0.0 and 1.0")]
    OutOfRange,

    #[error("Invalid band {lower_nm}..{upper_nm} nm")]
    InvalidBand { lower_nm: f64, upper_nm: f64 },
}

/// Piecewise-linear efficiency curve over wavelength in nanometers.
///
/// Deserialization goes through [`QuantumEfficiency::from_table`], so a
/// loaded curve obeys the same rules as one built in code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "QeTable")]
pub struct QuantumEfficiency {
    /// Wavelengths in nanometers (nm)
    wavelengths: Vec<f64>,

    /// Efficiency values (0.0 to 1.0) corresponding to each wavelength
    efficiencies: Vec<f64>,
}

/// Unchecked wire form of a curve
#[derive(Deserialize)]
struct QeTable {
    wavelengths: Vec<f64>,
    efficiencies: Vec<f64>,
}

impl TryFrom<QeTable> for QuantumEfficiency {
    type Error = QuantumEfficiencyError;

    fn try_from(table: QeTable) -> Result<Self, Self::Error> {
        Self::from_table(table.wavelengths, table.efficiencies)
    }
}

impl QuantumEfficiency {
    /// Rectangular passband with constant `efficiency` inside `band`.
    ///
    /// The edges ramp to zero over 1e-8 nm, which keeps the table valid
    /// without measurably changing integrals.
    pub fn from_notch(band: &Band, efficiency: f64) -> Result<Self, QuantumEfficiencyError> {
        if !(0.0..=1.0).contains(&efficiency) {
            return Err(QuantumEfficiencyError::OutOfRange);
        }

        let smol = 1e-8;
        let wavelengths = vec![
            band.lower_nm - smol,
            band.lower_nm,
            band.upper_nm,
            band.upper_nm + smol,
        ];
        let efficiencies = vec![0.0, efficiency, efficiency, 0.0];

        Self::from_table(wavelengths, efficiencies)
    }

    /// Create a curve from wavelength and efficiency tables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The vectors have different lengths or fewer than two points
    /// - Wavelengths are not finite and strictly ascending
    /// - First or last efficiency value is not 0.0
    /// - Any efficiency value is outside the range [0.0, 1.0]
    pub fn from_table(
        wavelengths: Vec<f64>,
        efficiencies: Vec<f64>,
    ) -> Result<Self, QuantumEfficiencyError> {
        if wavelengths.len() != efficiencies.len() || wavelengths.len() < 2 {
            return Err(QuantumEfficiencyError::LengthMismatch);
        }

        if wavelengths.iter().any(|w| !w.is_finite())
            || wavelengths.windows(2).any(|w| w[1] <= w[0])
        {
            return Err(QuantumEfficiencyError::NotAscending);
        }

        if efficiencies[0] != 0.0 || efficiencies[efficiencies.len() - 1] != 0.0 {
            return Err(QuantumEfficiencyError::BoundaryNotZero);
        }

        if efficiencies.iter().any(|e| !(0.0..=1.0).contains(e)) {
            return Err(QuantumEfficiencyError::OutOfRange);
        }

        Ok(Self {
            wavelengths,
            efficiencies,
        })
    }

    /// Efficiency at `wavelength` (nm), linearly interpolated; 0.0 outside the table.
    pub fn at(&self, wavelength: f64) -> f64 {
        let n = self.wavelengths.len();
        if !(self.wavelengths[0]..=self.wavelengths[n - 1]).contains(&wavelength) {
            return 0.0;
        }

        // First index whose wavelength is strictly above the query
        let idx = self.wavelengths.partition_point(|&w| w <= wavelength);
        if idx == n {
            return self.efficiencies[n - 1];
        }
        let (x1, x2) = (self.wavelengths[idx - 1], self.wavelengths[idx]);
        let t = (wavelength - x1) / (x2 - x1);
        self.efficiencies[idx - 1] * (1.0 - t) + self.efficiencies[idx] * t
    }

    /// Wavelength range covered by the table.
    pub fn band(&self) -> Band {
        Band {
            lower_nm: self.wavelengths[0],
            upper_nm: self.wavelengths[self.wavelengths.len() - 1],
        }
    }

    /// Largest efficiency in the table.
    pub fn peak(&self) -> f64 {
        self.efficiencies.iter().copied().fold(0.0, f64::max)
    }

    /// Product curve QE₁(λ)·QE₂(λ) over the overlap of both tables.
    ///
    /// Models elements in series (filter × detector). The result is zero at
    /// the overlap boundaries; disjoint curves give an all-zero curve.
    pub fn product(
        qe1: &QuantumEfficiency,
        qe2: &QuantumEfficiency,
    ) -> Result<Self, QuantumEfficiencyError> {
        let band1 = qe1.band();
        let band2 = qe2.band();

        let overlap_lower = band1.lower_nm.max(band2.lower_nm);
        let overlap_upper = band1.upper_nm.min(band2.upper_nm);

        if overlap_lower >= overlap_upper {
            let min_wl = overlap_lower.min(overlap_upper);
            let max_wl = overlap_lower.max(overlap_upper);
            if min_wl == max_wl {
                return Self::from_table(vec![min_wl, min_wl + 1.0], vec![0.0, 0.0]);
            }
            return Self::from_table(vec![min_wl, max_wl], vec![0.0, 0.0]);
        }

        let mut wavelengths: Vec<f64> = qe1
            .wavelengths
            .iter()
            .chain(qe2.wavelengths.iter())
            .copied()
            .filter(|&w| w > overlap_lower && w < overlap_upper)
            .collect();
        wavelengths.push(overlap_lower);
        wavelengths.push(overlap_upper);
        wavelengths.sort_by(f64::total_cmp);
        wavelengths.dedup();

        let efficiencies: Vec<f64> = wavelengths
            .iter()
            .map(|&w| {
                if w == overlap_lower || w == overlap_upper {
                    0.0
                } else {
                    qe1.at(w) * qe2.at(w)
                }
            })
            .collect();

        Self::from_table(wavelengths, efficiencies)
    }

    /// Trapezoid integral of QE(λ)·f(λ) dλ over the table, λ in nm.
    pub fn integrate<F>(&self, f: F) -> f64
    where
        F: Fn(f64) -> f64,
    {
        self.wavelengths
            .windows(2)
            .zip(self.efficiencies.windows(2))
            .map(|(x, e)| {
                let y1 = e[0] * f(x[0]);
                let y2 = e[1] * f(x[1]);
                (x[1] - x[0]) * (y1 + y2) / 2.0
            })
            .sum()
    }
}
