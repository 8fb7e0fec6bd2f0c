//! Magnitude to photoelectron conversion.
//!
//! The expected signal of a star is
//!
//! ```text
//! N_e = F0 · 10^(−m/2.5) · ∫QE(λ)T(λ)dλ · A_eff · τ_lens · t
//! ```
//!
//! with `F0` the zero-point photon spectral flux density of the bandpass
//! (photons s⁻¹ cm⁻² nm⁻¹), `A_eff = π(D/2)²(1 − ε²)` the unobscured
//! collecting area in cm² and `t` the integration time.

use serde::{Deserialize, Serialize};

use super::band::{wavelength_to_ergs, Band};
use super::quantum_efficiency::{QuantumEfficiency, QuantumEfficiencyError};
use crate::hardware::lens::LensConfig;
use crate::hardware::sensor::SensorConfig;
use crate::hardware::shutter::GlobalShutter;

/// Photometric zero point of a bandpass, stored as a photon flux density.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZeroPoint {
    /// Photons s⁻¹ cm⁻² nm⁻¹ for a magnitude-zero source
    pub photons_per_s_cm2_nm: f64,
}

impl ZeroPoint {
    pub fn from_photon_flux_density(photons_per_s_cm2_nm: f64) -> Self {
        Self {
            photons_per_s_cm2_nm,
        }
    }

    /// Convert a published energy flux density (erg s⁻¹ cm⁻² Å⁻¹) at the
    /// band's effective wavelength to a photon flux density.
    pub fn from_energy_flux_density(erg_per_s_cm2_a: f64, effective_wavelength_nm: f64) -> Self {
        let photon_energy = wavelength_to_ergs(effective_wavelength_nm);
        let photons_per_angstrom = if photon_energy > 0.0 {
            erg_per_s_cm2_a / photon_energy
        } else {
            0.0
        };
        // 10 Å per nm
        Self::from_photon_flux_density(photons_per_angstrom * 10.0)
    }
}

/// Filter transmission curve plus the zero point of its magnitude system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bandpass {
    pub transmission: QuantumEfficiency,
    pub zero_point: ZeroPoint,
}

impl Bandpass {
    pub fn new(transmission: QuantumEfficiency, zero_point: ZeroPoint) -> Self {
        Self {
            transmission,
            zero_point,
        }
    }

    /// Rectangular unit-transmission bandpass spanning `eff ± fwhm/2`.
    pub fn from_fwhm(
        effective_wavelength_nm: f64,
        fwhm_nm: f64,
        zero_point: ZeroPoint,
    ) -> Result<Self, QuantumEfficiencyError> {
        let band = Band::from_fwhm(effective_wavelength_nm, fwhm_nm)?;
        let transmission = QuantumEfficiency::from_notch(&band, 1.0)?;
        Ok(Self::new(transmission, zero_point))
    }

    /// Johnson V: λ_eff 551 nm, FWHM 88 nm, 3.63e-9 erg s⁻¹ cm⁻² Å⁻¹ (Bessell 1998).
    pub fn johnson_v() -> Result<Self, QuantumEfficiencyError> {
        Self::from_fwhm(
            551.0,
            88.0,
            ZeroPoint::from_energy_flux_density(3.63e-9, 551.0),
        )
    }

    pub fn band(&self) -> Band {
        self.transmission.band()
    }
}

/// Relative flux of a source of magnitude `mag` against the zero point.
pub fn magnitude_to_relative_flux(mag: f64) -> f64 {
    10f64.powf(-0.4 * mag)
}

/// Per-camera radiometric constants, computed once per exposure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Radiometry {
    /// ∫QE·T dλ in nm
    responsivity_nm: f64,
    /// ∫T dλ in nm
    bandwidth_nm: f64,
    zero_point: ZeroPoint,
    collecting_area_cm2: f64,
    lens_transmission: f64,
}

impl Radiometry {
    pub fn new(
        lens: &LensConfig,
        sensor: &SensorConfig,
        bandpass: &Bandpass,
    ) -> Result<Self, QuantumEfficiencyError> {
        let system = QuantumEfficiency::product(&sensor.quantum_efficiency, &bandpass.transmission)?;
        let responsivity_nm = system.integrate(|_| 1.0);
        let bandwidth_nm = bandpass.transmission.integrate(|_| 1.0);

        log::debug!(
            "radiometry: responsivity {:.3} nm over {:.1} nm band, area {:.3} cm²",
            responsivity_nm,
            bandwidth_nm,
            lens.collecting_area_cm2()
        );

        Ok(Self {
            responsivity_nm,
            bandwidth_nm,
            zero_point: bandpass.zero_point,
            collecting_area_cm2: lens.collecting_area_cm2(),
            lens_transmission: lens.transmission,
        })
    }

    /// ∫QE(λ)·T(λ) dλ over the bandpass, in nm.
    pub fn responsivity_nm(&self) -> f64 {
        self.responsivity_nm
    }

    /// Band-averaged detection efficiency ∫QE·T / ∫T.
    pub fn mean_efficiency(&self) -> f64 {
        if self.bandwidth_nm > 0.0 {
            self.responsivity_nm / self.bandwidth_nm
        } else {
            0.0
        }
    }

    /// Photoelectrons per second for a star of magnitude `mag`.
    pub fn electron_rate(&self, mag: f64) -> f64 {
        self.zero_point.photons_per_s_cm2_nm
            * magnitude_to_relative_flux(mag)
            * self.responsivity_nm
            * self.collecting_area_cm2
            * self.lens_transmission
    }

    /// Expected photoelectrons collected during the shutter's integration window.
    pub fn expected_electrons(&self, mag: f64, shutter: &GlobalShutter) -> f64 {
        self.electron_rate(mag) * shutter.integration_s()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::{Length, LengthExt};
    use approx::assert_relative_eq;

    fn flat_sensor(qe: f64) -> SensorConfig {
        let mut sensor = crate::hardware::sensor::models::CMV4000.clone();
        sensor.quantum_efficiency =
            QuantumEfficiency::from_notch(&Band::from_nm_bounds(300.0, 1000.0).unwrap(), qe)
                .unwrap();
        sensor
    }

    #[test]
    fn test_johnson_v_zero_point() {
        let v = Bandpass::johnson_v().unwrap();
        // ~1000 photons s⁻¹ cm⁻² Å⁻¹ for a V=0 star
        assert_relative_eq!(v.zero_point.photons_per_s_cm2_nm, 1.007e4, max_relative = 1e-2);
        assert_relative_eq!(v.band().center(), 551.0, epsilon = 1e-6);
    }

    #[test]
    fn test_magnitude_scale() {
        assert_relative_eq!(magnitude_to_relative_flux(0.0), 1.0);
        assert_relative_eq!(magnitude_to_relative_flux(5.0), 0.01, epsilon = 1e-12);
        assert_relative_eq!(
            magnitude_to_relative_flux(1.0) / magnitude_to_relative_flux(2.0),
            2.5118864315,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_expected_electrons_closed_form() {
        let lens = LensConfig::new(
            "test",
            Length::from_millimeters(50.0),
            Length::from_millimeters(20.0),
            0.8,
        );
        let sensor = flat_sensor(0.5);
        let bandpass =
            Bandpass::from_fwhm(550.0, 100.0, ZeroPoint::from_photon_flux_density(1.0e4)).unwrap();
        let radiometry = Radiometry::new(&lens, &sensor, &bandpass).unwrap();

        assert_relative_eq!(radiometry.responsivity_nm(), 50.0, epsilon = 1e-4);
        assert_relative_eq!(radiometry.mean_efficiency(), 0.5, epsilon = 1e-6);

        // Area of a 2 cm diameter aperture
        let area = std::f64::consts::PI;
        let shutter = GlobalShutter::from_secs_f64(0.1).unwrap();
        let expected = 1.0e4 * 1e-2 * 50.0 * area * 0.8 * 0.1;
        assert_relative_eq!(
            radiometry.expected_electrons(5.0, &shutter),
            expected,
            max_relative = 1e-6
        );
    }

    #[test]
    fn test_obscuration_reduces_signal() {
        let clear = LensConfig::new(
            "clear",
            Length::from_millimeters(50.0),
            Length::from_millimeters(20.0),
            1.0,
        );
        let obscured = clear.clone().with_obscuration(0.5);
        let sensor = flat_sensor(0.9);
        let bandpass = Bandpass::johnson_v().unwrap();

        let a = Radiometry::new(&clear, &sensor, &bandpass).unwrap();
        let b = Radiometry::new(&obscured, &sensor, &bandpass).unwrap();
        assert_relative_eq!(b.electron_rate(3.0) / a.electron_rate(3.0), 0.75, epsilon = 1e-12);
    }
}
