//! End-to-end star field rendering.
//!
//! [`Renderer`] is built once per camera (lens, sensor, PSF, bloom) and
//! validates everything up front, including the distortion round trip over
//! the sensor. Each call to [`Renderer::render`] then runs one exposure:
//!
//! 1. **Projection**: catalog directions through the attitude and pinhole model
//! 2. **Distortion**: Brown-Conrady forward model in pixel space
//! 3. **Radiometry**: magnitude to expected photoelectrons
//! 4. **PSF**: per-star kernel patches, computed in parallel and accumulated
//!    serially in (electrons, id) order
//! 5. **Background**: uniform sky level
//! 6. **Noise**: dark current, shot noise, read noise
//! 7. **Saturation**: full-well clip with blooming
//! 8. **Readout**: electrons to ADU
//!
//! The only randomness is in step 6, driven by the frame seed.

use ndarray::{Array2, Zip};
use rand::{thread_rng, RngCore};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::bloom::{apply_saturation, BloomConfig, BloomReport};
use super::noise::{apply_sensor_noise, NoiseToggles};
use super::psf::{KernelPatch, PixelPsf, PsfModel, PsfSettings};
use crate::distortion::PixelDistortion;
use crate::error::{ConfigError, SimulationError};
use crate::hardware::{ExposureConfig, LensConfig, SensorConfig};
use crate::photometry::Radiometry;
use crate::star_math::{Attitude, DataPolicy, RejectedStar, Star, StarProjector};

/// Ground truth for one star that reached the focal plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectedStar {
    pub id: u64,
    pub magnitude: f64,
    /// Pinhole position before distortion, pixels
    pub ideal: (f64, f64),
    /// Position after lens distortion, where the PSF is centered
    pub distorted: (f64, f64),
    /// Expected photoelectrons over the integration
    pub electrons: f64,
}

/// Per-renderer switches that are not part of the hardware description.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RenderOptions {
    #[serde(default)]
    pub psf_settings: PsfSettings,
    #[serde(default)]
    pub data_policy: DataPolicy,
    #[serde(default)]
    pub noise: NoiseToggles,
}

#[derive(Debug, Clone)]
pub struct RenderingResult {
    /// Mean electrons from stars and sky background, before noise
    pub signal_image: Array2<f64>,
    /// Electrons after noise and saturation
    pub electron_image: Array2<f64>,
    /// Quantized readout
    pub adu_image: Array2<u16>,
    /// Stars rendered into the frame, in accumulation order
    pub stars: Vec<ProjectedStar>,
    /// Catalog entries skipped as malformed
    pub rejected: Vec<RejectedStar>,
    pub bloom: BloomReport,
    /// Seed that reproduces this frame's noise
    pub seed: u64,
}

impl RenderingResult {
    /// Sum of expected electrons over the rendered stars.
    pub fn expected_star_electrons(&self) -> f64 {
        self.stars.iter().map(|s| s.electrons).sum()
    }

    pub fn find_star(&self, id: u64) -> Option<&ProjectedStar> {
        self.stars.iter().find(|s| s.id == id)
    }
}

/// A validated camera model ready to render exposures.
#[derive(Debug, Clone)]
pub struct Renderer {
    lens: LensConfig,
    sensor: SensorConfig,
    psf_model: PsfModel,
    psf: PixelPsf,
    bloom: BloomConfig,
    options: RenderOptions,
    distortion: PixelDistortion,
}

impl Renderer {
    /// Validate the camera description and precompute the pixel-space PSF.
    ///
    /// Fails on any non-physical parameter or on a distortion model that does
    /// not invert cleanly across the sensor.
    pub fn new(
        lens: LensConfig,
        sensor: SensorConfig,
        psf_model: PsfModel,
        bloom: BloomConfig,
        options: RenderOptions,
    ) -> Result<Self, ConfigError> {
        lens.validate()?;
        sensor.validate()?;
        options.psf_settings.validate()?;

        let distortion = lens.pixel_distortion(&sensor);
        distortion.validate_over_sensor(sensor.width_px, sensor.height_px)?;

        let psf = psf_model.resolve(&lens, &sensor)?;

        log::info!(
            "renderer: {} on {} ({}x{} px, {:.2}\"/px), PSF support {:.2} px",
            lens.name,
            sensor.name,
            sensor.width_px,
            sensor.height_px,
            lens.plate_scale_arcsec_per_px(&sensor),
            psf.support_radius(options.psf_settings.energy_fraction)
        );

        Ok(Self {
            lens,
            sensor,
            psf_model,
            psf,
            bloom,
            options,
            distortion,
        })
    }

    pub fn lens(&self) -> &LensConfig {
        &self.lens
    }

    pub fn sensor(&self) -> &SensorConfig {
        &self.sensor
    }

    pub fn psf_model(&self) -> &PsfModel {
        &self.psf_model
    }

    pub fn psf(&self) -> &PixelPsf {
        &self.psf
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Project, distort and price the catalog for one exposure.
    ///
    /// Stars whose PSF window falls entirely off the sensor are dropped. The
    /// result is sorted by (expected electrons, id), the accumulation order.
    pub fn project_stars(
        &self,
        catalog: &[Star],
        attitude: &Attitude,
        exposure: &ExposureConfig,
    ) -> Result<(Vec<ProjectedStar>, Vec<RejectedStar>), SimulationError> {
        let projector = StarProjector::new(attitude, &self.lens, &self.sensor);
        let outcome = projector.project_catalog(catalog, self.options.data_policy)?;
        let radiometry = Radiometry::new(&self.lens, &self.sensor, &exposure.bandpass)?;

        let margin = self
            .psf
            .support_radius(self.options.psf_settings.energy_fraction)
            + 0.5;
        let (width, height) = (self.sensor.width_px as f64, self.sensor.height_px as f64);
        let on_sensor = |(x, y): (f64, f64)| {
            x >= -margin && y >= -margin && x <= width - 1.0 + margin && y <= height - 1.0 + margin
        };

        let mut stars: Vec<ProjectedStar> = outcome
            .visible
            .iter()
            .filter_map(|visible| {
                let distorted = self.distortion.distort(visible.ideal.0, visible.ideal.1);
                if !on_sensor(distorted) {
                    return None;
                }
                Some(ProjectedStar {
                    id: visible.star.id,
                    magnitude: visible.star.magnitude,
                    ideal: visible.ideal,
                    distorted,
                    electrons: radiometry.expected_electrons(visible.star.magnitude, &exposure.shutter),
                })
            })
            .collect();

        // Float accumulation is order dependent
        stars.sort_by(|a, b| a.electrons.total_cmp(&b.electrons).then(a.id.cmp(&b.id)));

        log::debug!(
            "{} of {} visible stars land on the sensor",
            stars.len(),
            outcome.visible.len()
        );
        Ok((stars, outcome.rejected))
    }

    /// Render one exposure.
    ///
    /// `seed` fixes the noise realization; `None` draws one from the thread RNG
    /// and records it in the result.
    pub fn render(
        &self,
        catalog: &[Star],
        attitude: &Attitude,
        exposure: &ExposureConfig,
        seed: Option<u64>,
    ) -> Result<RenderingResult, SimulationError> {
        exposure.validate()?;
        let (stars, rejected) = self.project_stars(catalog, attitude, exposure)?;

        let mut signal_image = Array2::zeros(self.sensor.shape());
        let deposited = add_stars_to_image(
            &mut signal_image,
            &stars,
            &self.psf,
            &self.options.psf_settings,
        );

        let background = exposure.background_electrons();
        if background > 0.0 {
            signal_image.par_mapv_inplace(|v| v + background);
        }

        let seed = seed.unwrap_or_else(|| thread_rng().next_u64());
        let mut electron_image = apply_sensor_noise(
            signal_image.clone(),
            &self.sensor,
            exposure,
            &self.options.noise,
            seed,
        );

        let bloom = apply_saturation(&mut electron_image, self.sensor.full_well_e, &self.bloom);
        let adu_image = quantize_image(&electron_image, &self.sensor);

        log::info!(
            "rendered {} stars ({:.1} e- deposited), {} rejected, {} pixels saturated, seed {}",
            stars.len(),
            deposited,
            rejected.len(),
            bloom.clipped_pixels,
            seed
        );

        Ok(RenderingResult {
            signal_image,
            electron_image,
            adu_image,
            stars,
            rejected,
            bloom,
            seed,
        })
    }
}

/// Accumulate each star's PSF into `image`.
///
/// Kernels are evaluated in parallel; accumulation follows the order of
/// `stars` so the result is independent of the thread pool. Returns the
/// electrons that landed on the array.
pub fn add_stars_to_image(
    image: &mut Array2<f64>,
    stars: &[ProjectedStar],
    psf: &PixelPsf,
    settings: &PsfSettings,
) -> f64 {
    let patches: Vec<KernelPatch> = stars
        .par_iter()
        .map(|star| psf.kernel_patch(star.distorted.0, star.distorted.1, settings))
        .collect();

    stars
        .iter()
        .zip(&patches)
        .map(|(star, patch)| patch.accumulate_into(image, star.electrons))
        .sum()
}

/// Convert electrons to ADU: `floor(e · gain) + bias`, clipped to the ADC range.
///
/// A column or map bias is looked up per pixel, so `electron_img` must have
/// the sensor's shape in that case.
pub fn quantize_image(electron_img: &Array2<f64>, sensor: &SensorConfig) -> Array2<u16> {
    let max_adu = sensor.max_adu() as f64;
    let gain = sensor.gain_adu_per_e;
    let mut adu_img = Array2::zeros(electron_img.dim());
    Zip::indexed(&mut adu_img)
        .and(electron_img)
        .par_for_each(|(row, col), adu, &electrons| {
            let value = (electrons * gain).floor() + sensor.bias.at(row, col);
            *adu = value.clamp(0.0, max_adu) as u16;
        });
    adu_img
}
