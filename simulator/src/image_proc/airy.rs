//! Airy disk point spread function for diffraction-limited optics.
//!
//! The diffraction pattern of a uniformly illuminated circular aperture with
//! a central obscuration of fractional diameter ε is
//!
//! ```text
//! I(v) ∝ [2J₁(v)/v − ε²·2J₁(εv)/(εv)]²,   v = π·D·r/(λ·f)
//! ```
//!
//! [`AiryDisk`] works in the dimensionless radius `v`; [`PixelScaledAiryDisk`]
//! carries the scale between `v` and sensor pixels for a given lens,
//! wavelength and pixel pitch.

use once_cell::sync::Lazy;
use scilib::math::bessel;

/// Airy pattern landmarks in normalized units (v).
#[derive(Debug, Clone, Copy)]
pub struct AiryDisk {
    /// First zero location (first dark ring radius), ≈ 3.8317
    pub first_zero: f64,
    /// Full-width-half-maximum, ≈ 3.2327
    pub fwhm: f64,
}

impl Default for AiryDisk {
    fn default() -> Self {
        Self::new()
    }
}

impl AiryDisk {
    pub fn new() -> Self {
        let first_zero = Self::dark_ring(1);
        let fwhm = Self::calculate_fwhm();
        Self { first_zero, fwhm }
    }

    /// Clear-aperture intensity [2J₁(v)/v]², normalized to 1 at the center.
    pub fn intensity(&self, v: f64) -> f64 {
        let a = amplitude(v);
        a * a
    }

    /// Intensity for an aperture with central obscuration ratio `epsilon`,
    /// normalized to 1 at the center.
    pub fn obscured_intensity(&self, v: f64, epsilon: f64) -> f64 {
        if epsilon <= 0.0 {
            return self.intensity(v);
        }
        let eps2 = epsilon * epsilon;
        let a = (amplitude(v) - eps2 * amplitude(epsilon * v)) / (1.0 - eps2);
        a * a
    }

    /// Fraction of the clear-aperture energy inside radius `v`, 1 − J₀² − J₁².
    pub fn encircled_energy(&self, v: f64) -> f64 {
        if v <= 0.0 {
            return 0.0;
        }
        let j0 = bessel::j_n(0, v);
        let j1 = bessel::j_n(1, v);
        (1.0 - j0 * j0 - j1 * j1).clamp(0.0, 1.0)
    }

    /// Radius of the `n`-th dark ring (n-th positive zero of J₁), n ≥ 1.
    ///
    /// Each zero lies in [nπ, (n + ½)π]; found by bisection.
    pub fn dark_ring(n: u32) -> f64 {
        let n = n.max(1) as f64;
        let mut lo = n * std::f64::consts::PI;
        let mut hi = (n + 0.5) * std::f64::consts::PI;
        let sign_lo = bessel::j_n(1, lo).signum();
        while hi - lo > 1e-12 {
            let mid = 0.5 * (lo + hi);
            if bessel::j_n(1, mid).signum() == sign_lo {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        0.5 * (lo + hi)
    }

    /// Radius where the clear-aperture energy first reaches `fraction`.
    pub fn encircled_energy_radius(&self, fraction: f64) -> f64 {
        let target = fraction.clamp(0.0, 1.0 - 1e-9);
        let mut hi = self.first_zero;
        while self.encircled_energy(hi) < target && hi < 1e7 {
            hi *= 2.0;
        }
        let mut lo = 0.0;
        while hi - lo > 1e-9 * hi.max(1.0) {
            let mid = 0.5 * (lo + hi);
            if self.encircled_energy(mid) < target {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        hi
    }

    /// Full width at half maximum by bisection on the clear-aperture profile
    fn calculate_fwhm() -> f64 {
        let profile = |v: f64| {
            let a = amplitude(v);
            a * a
        };
        let (mut left, mut right) = (0.0, 2.0);
        while profile(right) > 0.5 {
            right *= 2.0;
        }
        while (right - left) > 1e-10 {
            let mid = (left + right) / 2.0;
            if profile(mid) > 0.5 {
                left = mid;
            } else {
                right = mid;
            }
        }
        left + right
    }
}

/// Field amplitude 2J₁(v)/v with its limit 1 at the origin
fn amplitude(v: f64) -> f64 {
    if v.abs() < 1e-10 {
        return 1.0;
    }
    2.0 * bessel::j_n(1, v) / v
}

pub static AIRY_DISK: Lazy<AiryDisk> = Lazy::new(AiryDisk::new);

/// Airy disk scaled to sensor pixels.
#[derive(Debug, Clone, Copy)]
pub struct PixelScaledAiryDisk {
    disk: AiryDisk,
    /// Pixels per unit of normalized radius v
    radius_scale: f64,
    obscuration: f64,
    /// Reference wavelength in nanometers
    pub reference_wavelength: f64,
}

impl PixelScaledAiryDisk {
    fn new(radius_scale: f64, obscuration: f64, reference_wavelength: f64) -> Self {
        PixelScaledAiryDisk {
            disk: *AIRY_DISK,
            radius_scale,
            obscuration,
            reference_wavelength,
        }
    }

    /// Scale for a lens of `aperture_mm` and `focal_length_mm` at `wavelength_nm`
    /// on pixels of `pixel_size_um`.
    ///
    /// From v = π·D·r/(λ·f): one unit of v spans λ·f/(π·D) microns.
    pub fn from_optics(
        aperture_mm: f64,
        focal_length_mm: f64,
        wavelength_nm: f64,
        pixel_size_um: f64,
        obscuration: f64,
    ) -> Self {
        let wavelength_um = wavelength_nm * 1e-3;
        let um_per_v = wavelength_um * focal_length_mm / (std::f64::consts::PI * aperture_mm);
        Self::new(um_per_v / pixel_size_um, obscuration, wavelength_nm)
    }

    /// Clear aperture scaled so the first dark ring sits at `first_zero` pixels.
    pub fn with_first_zero(first_zero: f64, reference_wavelength: f64) -> Self {
        Self::new(first_zero / AIRY_DISK.first_zero, 0.0, reference_wavelength)
    }

    /// Clear aperture scaled to the given FWHM in pixels.
    pub fn with_fwhm(fwhm: f64, reference_wavelength: f64) -> Self {
        Self::new(fwhm / AIRY_DISK.fwhm, 0.0, reference_wavelength)
    }

    /// Intensity at `radius` pixels, 1 at the center.
    pub fn intensity(&self, radius: f64) -> f64 {
        self.disk
            .obscured_intensity(radius / self.radius_scale, self.obscuration)
    }

    /// First dark ring radius in pixels (clear aperture).
    pub fn first_zero(&self) -> f64 {
        self.disk.first_zero * self.radius_scale
    }

    /// Radius of the `n`-th dark ring in pixels (clear aperture).
    pub fn dark_ring_radius(&self, n: u32) -> f64 {
        AiryDisk::dark_ring(n) * self.radius_scale
    }

    /// FWHM in pixels (clear aperture).
    pub fn fwhm(&self) -> f64 {
        self.disk.fwhm * self.radius_scale
    }

    /// Radius in pixels enclosing `fraction` of the clear-aperture energy.
    pub fn encircled_energy_radius(&self, fraction: f64) -> f64 {
        self.disk.encircled_energy_radius(fraction) * self.radius_scale
    }

    pub fn radius_scale(&self) -> f64 {
        self.radius_scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_airy_disk_landmarks() {
        let disk = AiryDisk::new();
        assert_relative_eq!(disk.first_zero, 3.831706, epsilon = 1e-5);
        assert_relative_eq!(disk.fwhm, 3.2327, epsilon = 1e-3);
        assert_relative_eq!(AiryDisk::dark_ring(2), 7.015587, epsilon = 1e-5);
        assert_relative_eq!(AiryDisk::dark_ring(3), 10.173468, epsilon = 1e-5);
    }

    #[test]
    fn test_intensity_at_center_and_zero() {
        let disk = AiryDisk::new();
        assert_relative_eq!(disk.intensity(0.0), 1.0, epsilon = 1e-10);
        assert!(disk.intensity(disk.first_zero) < 1e-10);
        assert_relative_eq!(disk.intensity(disk.fwhm / 2.0), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_encircled_energy() {
        let disk = AiryDisk::new();
        // 83.8% inside the first dark ring
        assert_relative_eq!(disk.encircled_energy(disk.first_zero), 0.8378, epsilon = 1e-3);
        assert_relative_eq!(disk.encircled_energy(AiryDisk::dark_ring(2)), 0.9099, epsilon = 1e-3);
        let r = disk.encircled_energy_radius(0.8);
        assert_relative_eq!(disk.encircled_energy(r), 0.8, epsilon = 1e-6);
    }

    #[test]
    fn test_obscuration_moves_energy_out_of_core() {
        let disk = AiryDisk::new();
        assert_relative_eq!(disk.obscured_intensity(0.0, 0.4), 1.0, epsilon = 1e-12);
        assert_eq!(disk.obscured_intensity(2.0, 0.0), disk.intensity(2.0));
        // First ring is brighter relative to the core for an obscured aperture
        let ring = 5.1;
        assert!(disk.obscured_intensity(ring, 0.4) > disk.intensity(ring));
    }

    #[test]
    fn test_pixel_scaling_from_optics() {
        // f/2 at 550 nm on 5.5 µm pixels: first ring at 1.22·0.55·2 = 1.342 µm
        let psf = PixelScaledAiryDisk::from_optics(25.0, 50.0, 550.0, 5.5, 0.0);
        assert_relative_eq!(psf.first_zero(), 1.342 / 5.5, max_relative = 1e-3);
        assert_relative_eq!(psf.intensity(0.0), 1.0);

        let scaled = PixelScaledAiryDisk::with_first_zero(2.0, 550.0);
        assert_relative_eq!(scaled.first_zero(), 2.0, epsilon = 1e-12);
        assert!(scaled.intensity(2.0) < 1e-10);

        let by_fwhm = PixelScaledAiryDisk::with_fwhm(3.0, 550.0);
        assert_relative_eq!(by_fwhm.fwhm(), 3.0, epsilon = 1e-12);
    }
}
