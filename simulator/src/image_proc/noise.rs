//! Sensor noise stages applied to the noise-free electron image.
//!
//! Order within a frame is dark current, then Poisson shot noise on the
//! combined mean (signal + background + dark), then Gaussian read noise.
//! Sampling goes through [`process_array_in_parallel_chunks`], so a given
//! seed reproduces the same frame regardless of the rayon pool size.

use ndarray::{Array2, Zip};
use rand::{thread_rng, RngCore};
use rand_distr::{Distribution, Normal, Poisson};
use serde::{Deserialize, Serialize};

use crate::algo::parallel::{process_array_in_parallel_chunks, DEFAULT_CHUNK_ROWS};
use crate::hardware::{ExposureConfig, SensorConfig};

/// Mixed into the frame seed for the read-noise stage so its chunk seeds
/// never coincide with the shot-noise chunk seeds.
pub const READ_NOISE_SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// Per-stage switches, all on by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoiseToggles {
    pub dark_current: bool,
    pub shot_noise: bool,
    pub read_noise: bool,
}

impl Default for NoiseToggles {
    fn default() -> Self {
        Self {
            dark_current: true,
            shot_noise: true,
            read_noise: true,
        }
    }
}

impl NoiseToggles {
    /// Noise-free rendering: signal and background only.
    pub fn disabled() -> Self {
        Self {
            dark_current: false,
            shot_noise: false,
            read_noise: false,
        }
    }
}

/// Add `dark_electrons` to every pixel, scaled per pixel by the hot-pixel map when given.
///
/// # Panics
///
/// If `hot_pixels` and `image` differ in shape. [`SensorConfig::validate`]
/// rejects such maps before any rendering.
pub fn add_dark_current(image: &mut Array2<f64>, dark_electrons: f64, hot_pixels: Option<&Array2<f64>>) {
    match hot_pixels {
        Some(map) => {
            Zip::from(image)
                .and(map)
                .par_for_each(|pixel, &multiplier| *pixel += dark_electrons * multiplier);
        }
        None => image.par_mapv_inplace(|v| v + dark_electrons),
    }
}

/// Replace each pixel's mean electron count with a Poisson sample.
///
/// Non-positive means produce zero.
pub fn apply_poisson_photon_noise(mean_electron_image: &Array2<f64>, rng_seed: Option<u64>) -> Array2<f64> {
    let seed = rng_seed.unwrap_or_else(|| thread_rng().next_u64());

    process_array_in_parallel_chunks(
        mean_electron_image.clone(),
        seed,
        Some(DEFAULT_CHUNK_ROWS),
        |chunk, _row0, rng| {
            chunk.iter_mut().for_each(|pixel| {
                let mean_electrons = *pixel;
                *pixel = if mean_electrons > 0.0 {
                    match Poisson::new(mean_electrons) {
                        Ok(poisson) => poisson.sample(rng),
                        Err(_) => 0.0,
                    }
                } else {
                    0.0
                };
            });
        },
    )
}

/// Add zero-mean Gaussian read noise of standard deviation `sigma` electrons.
pub fn add_read_noise(image: Array2<f64>, sigma: f64, rng_seed: Option<u64>) -> Array2<f64> {
    let normal = match Normal::new(0.0, sigma) {
        Ok(normal) if sigma > 0.0 => normal,
        _ => return image,
    };
    let seed = rng_seed.unwrap_or_else(|| thread_rng().next_u64());

    process_array_in_parallel_chunks(image, seed, Some(DEFAULT_CHUNK_ROWS), |chunk, _row0, rng| {
        chunk.iter_mut().for_each(|pixel| *pixel += normal.sample(rng));
    })
}

/// Run the enabled noise stages over a noise-free electron image.
pub fn apply_sensor_noise(
    image: Array2<f64>,
    sensor: &SensorConfig,
    exposure: &ExposureConfig,
    toggles: &NoiseToggles,
    seed: u64,
) -> Array2<f64> {
    let mut image = image;

    if toggles.dark_current {
        let dark = sensor.dark_electrons(exposure.temperature, exposure.integration_s());
        log::debug!("dark current: {:.3} e-/px", dark);
        add_dark_current(&mut image, dark, sensor.hot_pixels.as_ref());
    }

    if toggles.shot_noise {
        image = apply_poisson_photon_noise(&image, Some(seed));
    }

    if toggles.read_noise {
        image = add_read_noise(image, sensor.read_noise_e, Some(seed ^ READ_NOISE_SEED_MIX));
    }

    image
}
