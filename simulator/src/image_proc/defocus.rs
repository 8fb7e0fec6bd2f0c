//! Defocused point spread function (Wyant & Creath).
//!
//! For defocus W020 (waves of wavefront error at the pupil edge) the
//! amplitude at normalized radius `v = π·D·r/(λ·f)` is the Hankel transform
//! of the defocused pupil,
//!
//! ```text
//! U(v) = 2 ∫_ε^1 exp(i·2π·W020·ρ²) · J₀(v·ρ) · ρ dρ,    I(v) = |U(v)|²
//! ```
//!
//! where ε is the central obscuration ratio. There is no closed form, so the
//! profile is integrated with Simpson's rule once per radius and tabulated.

use rayon::prelude::*;
use scilib::math::bessel;
use std::f64::consts::PI;

use crate::algo::misc::trap_integrate;
use crate::algo::LookupTable;
use crate::error::ConfigError;

/// Minimum Simpson intervals across the pupil
const MIN_PUPIL_INTERVALS: usize = 256;

/// Table spacing in normalized radius
const TABLE_STEP_V: f64 = 0.1;

/// Extra normalized radius tabulated beyond the geometric blur edge
const TABLE_MARGIN_V: f64 = 40.0;

const MAX_TABLE_POINTS: usize = 20_001;

/// Complex pupil integral U(v) returned as (re, im).
pub fn defocus_amplitude(v: f64, w020: f64, obscuration: f64) -> (f64, f64) {
    // Phase and Bessel oscillations both need resolving across the pupil
    let oscillations = w020.abs() + v / PI;
    let mut n = MIN_PUPIL_INTERVALS.max(16 * oscillations.ceil() as usize);
    if n % 2 == 1 {
        n += 1;
    }

    let rho0 = obscuration.clamp(0.0, 1.0);
    let h = (1.0 - rho0) / n as f64;
    if h <= 0.0 {
        return (0.0, 0.0);
    }

    let integrand = |rho: f64| {
        let phase = 2.0 * PI * w020 * rho * rho;
        let radial = bessel::j_n(0, v * rho) * rho;
        (phase.cos() * radial, phase.sin() * radial)
    };

    let (mut re, mut im) = (0.0, 0.0);
    for k in 0..=n {
        let weight = if k == 0 || k == n {
            1.0
        } else if k % 2 == 1 {
            4.0
        } else {
            2.0
        };
        let (fr, fi) = integrand(rho0 + k as f64 * h);
        re += weight * fr;
        im += weight * fi;
    }
    let scale = 2.0 * h / 3.0;
    (re * scale, im * scale)
}

/// Tabulated defocus profile in sensor pixels.
#[derive(Debug, Clone)]
pub struct DefocusProfile {
    table: LookupTable,
    /// Cumulative encircled energy at each table radius, ending at 1
    encircled: Vec<f64>,
    radii_px: Vec<f64>,
    defocus_waves: f64,
}

impl DefocusProfile {
    /// Tabulate the profile for the given optics and pixel pitch.
    pub fn new(
        aperture_mm: f64,
        focal_length_mm: f64,
        wavelength_nm: f64,
        pixel_size_um: f64,
        obscuration: f64,
        defocus_waves: f64,
    ) -> Result<Self, ConfigError> {
        let um_per_v = wavelength_nm * 1e-3 * focal_length_mm / (PI * aperture_mm);
        let px_per_v = um_per_v / pixel_size_um;
        ConfigError::require_positive("defocus profile scale", px_per_v)?;

        // Geometric blur radius is 4π·|W020| in v
        let v_max = 4.0 * PI * defocus_waves.abs() + TABLE_MARGIN_V;
        let n_points = ((v_max / TABLE_STEP_V).ceil() as usize + 1).clamp(64, MAX_TABLE_POINTS);
        let dv = v_max / (n_points - 1) as f64;

        let values: Vec<f64> = (0..n_points)
            .into_par_iter()
            .map(|i| {
                let (re, im) = defocus_amplitude(i as f64 * dv, defocus_waves, obscuration);
                re * re + im * im
            })
            .collect();

        let radii_px: Vec<f64> = (0..n_points).map(|i| i as f64 * dv * px_per_v).collect();
        let encircled = cumulative_energy(&radii_px, &values);

        let r_max_px = v_max * px_per_v;
        let table = LookupTable::from_samples(0.0, r_max_px, values)?;

        log::debug!(
            "defocus profile: W020 {:.2} waves, {} samples out to {:.2} px",
            defocus_waves,
            n_points,
            r_max_px
        );

        Ok(Self {
            table,
            encircled,
            radii_px,
            defocus_waves,
        })
    }

    /// Intensity at `radius` pixels; zero beyond the table.
    pub fn intensity(&self, radius: f64) -> f64 {
        self.table.eval(radius).map(|v| v.max(0.0)).unwrap_or(0.0)
    }

    /// Smallest tabulated radius (px) enclosing `fraction` of the energy.
    pub fn encircled_energy_radius(&self, fraction: f64) -> f64 {
        let idx = self.encircled.partition_point(|&e| e < fraction);
        if idx == 0 {
            return self.radii_px[0];
        }
        if idx >= self.encircled.len() {
            return self.max_radius();
        }
        let (e0, e1) = (self.encircled[idx - 1], self.encircled[idx]);
        let (r0, r1) = (self.radii_px[idx - 1], self.radii_px[idx]);
        let t = if e1 > e0 { (fraction - e0) / (e1 - e0) } else { 0.0 };
        r0 + t * (r1 - r0)
    }

    /// Outer edge of the tabulated profile in pixels.
    pub fn max_radius(&self) -> f64 {
        self.table.domain().1
    }

    pub fn defocus_waves(&self) -> f64 {
        self.defocus_waves
    }
}

/// Normalized cumulative ∫ I(r)·r dr
fn cumulative_energy(radii: &[f64], intensity: &[f64]) -> Vec<f64> {
    let weighted: Vec<f64> = radii.iter().zip(intensity).map(|(r, i)| r * i).collect();
    let mut cumulative = Vec::with_capacity(radii.len());
    cumulative.push(0.0);
    for k in 1..radii.len() {
        let segment = trap_integrate(&radii[k - 1..=k], &weighted[k - 1..=k]);
        cumulative.push(cumulative[k - 1] + segment);
    }
    let total = cumulative.last().copied().unwrap_or(0.0);
    if total > 0.0 {
        cumulative.iter_mut().for_each(|c| *c /= total);
    }
    cumulative
}
