//! Wavelength bands and the physical constants used for photon counting.

use serde::{Deserialize, Serialize};

use super::quantum_efficiency::QuantumEfficiencyError;

/// Physical constants in CGS units.
///
/// Zero points are commonly published as energy flux densities in
/// erg s⁻¹ cm⁻² Å⁻¹, so photon conversions stay in CGS.
pub struct CGS {}

impl CGS {
    /// Planck's constant
    /// Units: 6.62607015e-27 erg⋅s
    pub const PLANCK_CONSTANT: f64 = 6.62607015e-27;

    /// Speed of light in vacuum
    /// Units: 2.99792458e10 cm/s
    pub const SPEED_OF_LIGHT: f64 = 2.99792458e10;
}

/// Energy of a single photon in erg.
///
/// Returns 0.0 for non-positive wavelengths.
pub fn wavelength_to_ergs(wavelength_nm: f64) -> f64 {
    if wavelength_nm <= 0.0 {
        return 0.0;
    }
    // E = h * c / λ with λ in cm
    let wavelength_cm = wavelength_nm * 1e-7;
    CGS::PLANCK_CONSTANT * CGS::SPEED_OF_LIGHT / wavelength_cm
}

/// Contiguous wavelength interval in nanometers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    /// Lower wavelength bound in nanometers
    pub lower_nm: f64,

    /// Upper wavelength bound in nanometers
    pub upper_nm: f64,
}

impl Band {
    /// Create a band from lower and upper bounds.
    ///
    /// # Errors
    /// Fails if either bound is negative or non-finite, or if the bounds are
    /// not strictly increasing.
    pub fn from_nm_bounds(lower_nm: f64, upper_nm: f64) -> Result<Self, QuantumEfficiencyError> {
        if !lower_nm.is_finite() || !upper_nm.is_finite() || lower_nm < 0.0 || lower_nm >= upper_nm
        {
            return Err(QuantumEfficiencyError::InvalidBand { lower_nm, upper_nm });
        }
        Ok(Self { lower_nm, upper_nm })
    }

    /// Band centered on `center_nm` with full width `fwhm_nm`.
    ///
    /// This is how broadband photometric filters are usually published
    /// (effective wavelength plus FWHM).
    pub fn from_fwhm(center_nm: f64, fwhm_nm: f64) -> Result<Self, QuantumEfficiencyError> {
        Self::from_nm_bounds(center_nm - fwhm_nm / 2.0, center_nm + fwhm_nm / 2.0)
    }

    /// Width of the band in nanometers
    pub fn width(&self) -> f64 {
        self.upper_nm - self.lower_nm
    }

    /// Center of the band in nanometers
    pub fn center(&self) -> f64 {
        (self.lower_nm + self.upper_nm) / 2.0
    }

    /// True if `wavelength_nm` lies inside the closed interval.
    pub fn contains(&self, wavelength_nm: f64) -> bool {
        (self.lower_nm..=self.upper_nm).contains(&wavelength_nm)
    }
}
