//! Point spread function variants and their discretization onto pixels.
//!
//! A [`PsfModel`] is the serializable description; [`PsfModel::resolve`]
//! binds it to a lens and sensor, producing a [`PixelPsf`] in pixel units.
//! Every variant is consumed through [`PixelPsf::kernel_patch`], which returns
//! a local, normalized weight patch for one star position.

use ndarray::Array2;
use scilib::math::basic::erf;
use serde::{Deserialize, Serialize};
use std::f64::consts::SQRT_2;

use super::airy::PixelScaledAiryDisk;
use super::defocus::DefocusProfile;
use crate::error::ConfigError;
use crate::hardware::{LensConfig, SensorConfig};

pub const DEFAULT_ENERGY_FRACTION: f64 = 0.997;
pub const DEFAULT_OVERSAMPLE: usize = 5;
pub const DEFAULT_AIRY_RINGS: u32 = 3;

fn default_airy_rings() -> u32 {
    DEFAULT_AIRY_RINGS
}

/// PSF shape selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PsfModel {
    /// Uniform disk
    Pillbox { radius_px: f64 },
    /// Circular 2D Gaussian
    Gaussian { sigma_px: f64 },
    /// Diffraction-limited pattern from the lens aperture, truncated at `rings` dark rings
    Airy {
        wavelength_nm: f64,
        #[serde(default = "default_airy_rings")]
        rings: u32,
    },
    /// Defocused aperture with W020 = `defocus_waves`
    Defocus {
        wavelength_nm: f64,
        defocus_waves: f64,
    },
}

impl PsfModel {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            PsfModel::Pillbox { radius_px } => require_psf_positive("pillbox radius", radius_px),
            PsfModel::Gaussian { sigma_px } => require_psf_positive("gaussian sigma", sigma_px),
            PsfModel::Airy {
                wavelength_nm,
                rings,
            } => {
                require_psf_positive("airy wavelength", wavelength_nm)?;
                if rings == 0 {
                    return Err(ConfigError::InvalidPsf {
                        name: "airy truncation rings",
                        value: 0.0,
                    });
                }
                Ok(())
            }
            PsfModel::Defocus {
                wavelength_nm,
                defocus_waves,
            } => {
                require_psf_positive("defocus wavelength", wavelength_nm)?;
                if !defocus_waves.is_finite() {
                    return Err(ConfigError::InvalidPsf {
                        name: "defocus W020",
                        value: defocus_waves,
                    });
                }
                Ok(())
            }
        }
    }

    /// Bind the model to concrete optics, in sensor pixel units.
    pub fn resolve(&self, lens: &LensConfig, sensor: &SensorConfig) -> Result<PixelPsf, ConfigError> {
        self.validate()?;
        let psf = match *self {
            PsfModel::Pillbox { radius_px } => PixelPsf::Pillbox { radius: radius_px },
            PsfModel::Gaussian { sigma_px } => PixelPsf::Gaussian { sigma: sigma_px },
            PsfModel::Airy {
                wavelength_nm,
                rings,
            } => {
                let disk = PixelScaledAiryDisk::from_optics(
                    lens.aperture_mm,
                    lens.focal_length_mm,
                    wavelength_nm,
                    sensor.pixel_size_um,
                    lens.obscuration_ratio,
                );
                PixelPsf::Airy {
                    truncation: disk.dark_ring_radius(rings),
                    disk,
                }
            }
            PsfModel::Defocus {
                wavelength_nm,
                defocus_waves,
            } => PixelPsf::Defocus(Box::new(DefocusProfile::new(
                lens.aperture_mm,
                lens.focal_length_mm,
                wavelength_nm,
                sensor.pixel_size_um,
                lens.obscuration_ratio,
                defocus_waves,
            )?)),
        };
        Ok(psf)
    }
}

fn require_psf_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidPsf { name, value })
    }
}

/// Discretization controls shared by all PSF variants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PsfSettings {
    /// Energy fraction the kernel window must capture, in (0, 1)
    pub energy_fraction: f64,
    /// Sub-pixel samples per axis for numerically sampled profiles
    pub oversample: usize,
}

impl Default for PsfSettings {
    fn default() -> Self {
        Self {
            energy_fraction: DEFAULT_ENERGY_FRACTION,
            oversample: DEFAULT_OVERSAMPLE,
        }
    }
}

impl PsfSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.energy_fraction > 0.0 && self.energy_fraction < 1.0) {
            return Err(ConfigError::InvalidPsf {
                name: "energy fraction",
                value: self.energy_fraction,
            });
        }
        if self.oversample == 0 {
            return Err(ConfigError::InvalidPsf {
                name: "oversample",
                value: 0.0,
            });
        }
        Ok(())
    }
}

/// A PSF scaled to sensor pixels.
#[derive(Debug, Clone)]
pub enum PixelPsf {
    Pillbox {
        radius: f64,
    },
    Gaussian {
        sigma: f64,
    },
    Airy {
        disk: PixelScaledAiryDisk,
        /// Radius in pixels beyond which the pattern is cut
        truncation: f64,
    },
    Defocus(Box<DefocusProfile>),
}

impl PixelPsf {
    /// Window radius in pixels capturing `fraction` of the energy.
    pub fn support_radius(&self, fraction: f64) -> f64 {
        match self {
            PixelPsf::Pillbox { radius } => *radius,
            PixelPsf::Gaussian { sigma } => sigma * (-2.0 * (1.0 - fraction).ln()).sqrt(),
            PixelPsf::Airy { disk, truncation } => {
                truncation.min(disk.encircled_energy_radius(fraction))
            }
            PixelPsf::Defocus(profile) => profile.encircled_energy_radius(fraction),
        }
    }

    /// Unnormalized intensity at pixel offset (dx, dy) from the star center.
    pub fn intensity(&self, dx: f64, dy: f64) -> f64 {
        let r = dx.hypot(dy);
        match self {
            PixelPsf::Pillbox { radius } => {
                if r <= *radius {
                    1.0
                } else {
                    0.0
                }
            }
            PixelPsf::Gaussian { sigma } => (-0.5 * (r / sigma).powi(2)).exp(),
            PixelPsf::Airy { disk, truncation } => {
                if r > *truncation {
                    0.0
                } else {
                    disk.intensity(r)
                }
            }
            PixelPsf::Defocus(profile) => profile.intensity(r),
        }
    }

    /// Normalized weights over the pixels around sub-pixel position (x, y).
    ///
    /// Pixel centers sit at integer coordinates. The returned weights sum to 1;
    /// if sampling misses the profile entirely, all weight lands on the
    /// nearest pixel.
    pub fn kernel_patch(&self, x: f64, y: f64, settings: &PsfSettings) -> KernelPatch {
        let radius = self.support_radius(settings.energy_fraction).max(0.0);
        let col0 = (x - radius).round() as i64;
        let col1 = (x + radius).round() as i64;
        let row0 = (y - radius).round() as i64;
        let row1 = (y + radius).round() as i64;
        let shape = ((row1 - row0 + 1) as usize, (col1 - col0 + 1) as usize);

        let mut weights = match self {
            PixelPsf::Gaussian { sigma } => {
                let col_weights: Vec<f64> = (col0..=col1)
                    .map(|c| gaussian_pixel_integral(c as f64 - x, *sigma))
                    .collect();
                let row_weights: Vec<f64> = (row0..=row1)
                    .map(|r| gaussian_pixel_integral(r as f64 - y, *sigma))
                    .collect();
                Array2::from_shape_fn(shape, |(i, j)| row_weights[i] * col_weights[j])
            }
            _ => {
                let n = settings.oversample.max(1);
                let step = 1.0 / n as f64;
                Array2::from_shape_fn(shape, |(i, j)| {
                    let px = (col0 + j as i64) as f64 - x;
                    let py = (row0 + i as i64) as f64 - y;
                    let mut acc = 0.0;
                    for sy in 0..n {
                        let oy = (sy as f64 + 0.5) * step - 0.5;
                        for sx in 0..n {
                            let ox = (sx as f64 + 0.5) * step - 0.5;
                            acc += self.intensity(px + ox, py + oy);
                        }
                    }
                    acc / (n * n) as f64
                })
            }
        };

        let total = weights.sum();
        if !(total.is_finite() && total > 0.0) {
            return KernelPatch::nearest(x, y);
        }
        weights.mapv_inplace(|w| w / total);

        KernelPatch {
            col0,
            row0,
            weights,
        }
    }
}

/// Fraction of a unit-σ-scaled Gaussian falling in the pixel centered at `offset`.
fn gaussian_pixel_integral(offset: f64, sigma: f64) -> f64 {
    let scale = sigma * SQRT_2;
    0.5 * (erf((offset + 0.5) / scale) - erf((offset - 0.5) / scale))
}

/// Normalized PSF weights anchored at (row0, col0) in image coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelPatch {
    pub col0: i64,
    pub row0: i64,
    pub weights: Array2<f64>,
}

impl KernelPatch {
    /// Single-pixel patch at the pixel nearest (x, y).
    pub fn nearest(x: f64, y: f64) -> Self {
        Self {
            col0: x.round() as i64,
            row0: y.round() as i64,
            weights: Array2::ones((1, 1)),
        }
    }

    /// Add `electrons · weight` into `image`, skipping pixels off the array.
    ///
    /// Returns the charge actually deposited.
    pub fn accumulate_into(&self, image: &mut Array2<f64>, electrons: f64) -> f64 {
        let (height, width) = image.dim();
        let mut deposited = 0.0;
        for ((i, j), &w) in self.weights.indexed_iter() {
            let row = self.row0 + i as i64;
            let col = self.col0 + j as i64;
            if row < 0 || col < 0 || row >= height as i64 || col >= width as i64 {
                continue;
            }
            let e = electrons * w;
            image[[row as usize, col as usize]] += e;
            deposited += e;
        }
        deposited
    }

    /// Weight at absolute image position, zero outside the patch.
    pub fn weight_at(&self, row: i64, col: i64) -> f64 {
        let (i, j) = (row - self.row0, col - self.col0);
        if i < 0 || j < 0 {
            return 0.0;
        }
        self.weights
            .get((i as usize, j as usize))
            .copied()
            .unwrap_or(0.0)
    }
}
