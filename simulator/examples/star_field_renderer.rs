//! Star field renderer for simulating star-tracker frames
//!
//! Generates a random star field around a pointing, renders one exposure
//! through a CMV4000 behind a 25 mm f/1.4 lens, and writes:
//! 1. An auto-scaled 8-bit PNG preview of the ADU frame
//! 2. The scene setup (lens, sensor, exposure, PSF, options) as JSON
//! 3. A summary of the brightest rendered stars to the log
//!
//! Run with `RUST_LOG=info cargo run --example star_field_renderer -- --psf defocus`.

use clap::{Parser, ValueEnum};
use image::{ImageBuffer, Luma};
use ndarray::Array2;
use serde_json::json;
use simulator::distortion::{BrownConrady, Distortion};
use simulator::hardware::lens::models::TRACKER_25MM_F1_4;
use simulator::hardware::sensor::models::CMV4000;
use simulator::hardware::{ExposureConfig, GlobalShutter};
use simulator::image_proc::bloom::{BloomAxes, BloomConfig, BloomMode};
use simulator::image_proc::psf::PsfModel;
use simulator::image_proc::render::{RenderOptions, Renderer};
use simulator::photometry::Bandpass;
use simulator::star_math::{Attitude, StarFieldGenerator};
use simulator::units::{Temperature, TemperatureExt};

fn to_preview(frame: &Array2<u16>) -> ImageBuffer<Luma<u8>, Vec<u8>> {
    let (height, width) = frame.dim();
    let max_val = *frame.iter().max().unwrap_or(&1) as f32;
    let scale = if max_val > 0.0 { 255.0 / max_val } else { 1.0 };

    ImageBuffer::from_fn(width as u32, height as u32, |x, y| {
        Luma([(frame[[y as usize, x as usize]] as f32 * scale) as u8])
    })
}

/// PSF model used for the render
#[derive(Debug, Clone, Copy, ValueEnum)]
enum PsfChoice {
    Gaussian,
    Pillbox,
    Airy,
    Defocus,
}

impl PsfChoice {
    fn model(self) -> PsfModel {
        match self {
            PsfChoice::Gaussian => PsfModel::Gaussian { sigma_px: 1.2 },
            PsfChoice::Pillbox => PsfModel::Pillbox { radius_px: 2.0 },
            PsfChoice::Airy => PsfModel::Airy {
                wavelength_nm: 550.0,
                rings: 3,
            },
            PsfChoice::Defocus => PsfModel::Defocus {
                wavelength_nm: 550.0,
                defocus_waves: 6.0,
            },
        }
    }
}

/// Command line arguments for the star field renderer
#[derive(Parser, Debug)]
#[command(version, about = "Star-tracker frame renderer")]
struct Args {
    /// Boresight right ascension in degrees
    #[arg(long, default_value_t = 100.0)]
    ra: f64,

    /// Boresight declination in degrees
    #[arg(long, default_value_t = 45.0, allow_hyphen_values = true)]
    dec: f64,

    /// Roll about the boresight in degrees
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    roll: f64,

    /// Number of stars to generate around the boresight
    #[arg(long, default_value_t = 2000)]
    stars: usize,

    /// Exposure time in seconds
    #[arg(long, default_value_t = 0.1)]
    exposure: f64,

    /// Seed for both the star field and the sensor noise
    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(long, value_enum, default_value_t = PsfChoice::Airy)]
    psf: PsfChoice,

    /// Output PNG path; the scene setup goes to `<output>.json`
    #[arg(long, default_value = "star_field.png")]
    output: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let psf = args.psf.model();

    let barrel = BrownConrady::radial(-0.08, 0.01, 0.0);
    let lens = TRACKER_25MM_F1_4
        .clone()
        .with_distortion(Distortion::BrownConrady(barrel));
    let sensor = CMV4000.clone();
    let bloom = BloomConfig::new(BloomAxes::Vertical, BloomMode::Symmetric);
    let options = RenderOptions::default();
    let exposure = ExposureConfig::new(
        GlobalShutter::from_secs_f64(args.exposure)?,
        Temperature::from_celsius(20.0),
        Bandpass::johnson_v()?,
    )
    .with_sky_background(40.0);

    let scene = json!({
        "lens": lens,
        "sensor": sensor,
        "exposure": exposure,
        "psf": psf,
        "bloom": bloom,
        "options": options,
        "pointing": { "ra_deg": args.ra, "dec_deg": args.dec, "roll_deg": args.roll },
        "seed": args.seed,
    });
    let scene_path = format!("{}.json", args.output);
    std::fs::write(&scene_path, serde_json::to_string_pretty(&scene)?)?;
    log::info!("Scene setup written to {scene_path}");

    let renderer = Renderer::new(lens, sensor, psf, bloom, options)?;
    let attitude = Attitude::from_pointing(args.ra, args.dec, args.roll);
    let fov_deg = renderer.lens().fov_half_angle_rad(renderer.sensor()).to_degrees();
    let catalog = StarFieldGenerator::new(args.seed).generate_around(
        args.stars,
        args.ra,
        args.dec,
        fov_deg * 1.2,
        (1.0, 9.0),
    );

    let result = renderer.render(&catalog, &attitude, &exposure, Some(args.seed))?;

    log::info!(
        "{} stars rendered, {} pixels saturated, {:.0} e- bloomed off the array",
        result.stars.len(),
        result.bloom.clipped_pixels,
        result.bloom.boundary_loss_e
    );
    for star in result.stars.iter().rev().take(5) {
        log::info!(
            "  star {:>5}: mag {:5.2} at ({:8.2}, {:8.2}) px, {:9.0} e-",
            star.id,
            star.magnitude,
            star.distorted.0,
            star.distorted.1,
            star.electrons
        );
    }

    to_preview(&result.adu_image).save(&args.output)?;
    log::info!("Frame written to {}", args.output);

    Ok(())
}
