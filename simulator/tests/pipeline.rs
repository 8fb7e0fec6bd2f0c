//! End-to-end rendering scenarios on a small synthetic camera

use approx::assert_relative_eq;
use nalgebra::Vector3;
use simulator::distortion::{BrownConrady, Distortion};
use simulator::hardware::sensor::create_flat_qe;
use simulator::hardware::{
    DarkCurrentModel, ExposureConfig, GlobalShutter, LensConfig, SensorConfig,
};
use simulator::image_proc::bloom::{BloomAxes, BloomConfig, BloomMode};
use simulator::image_proc::noise::NoiseToggles;
use simulator::image_proc::psf::{PsfModel, PsfSettings};
use simulator::image_proc::render::{RenderOptions, Renderer};
use simulator::photometry::Bandpass;
use simulator::star_math::{Attitude, DataPolicy, Star};
use simulator::units::{Length, LengthExt, Temperature, TemperatureExt};
use simulator::SimulationError;

const SIZE: usize = 101;
const CENTER: f64 = 50.0;

fn test_lens() -> LensConfig {
    LensConfig::from_f_number("test 25mm", Length::from_millimeters(25.0), 2.0, 0.9)
}

fn test_sensor(full_well: f64) -> SensorConfig {
    SensorConfig::new(
        "test 101px",
        create_flat_qe(0.5).unwrap(),
        SIZE,
        SIZE,
        5.5,
        full_well,
        5.0,
        DarkCurrentModel::from_reference_point(20.0, Temperature::from_celsius(20.0)),
        16,
    )
}

fn test_exposure() -> ExposureConfig {
    ExposureConfig::new(
        GlobalShutter::from_secs_f64(0.1).unwrap(),
        Temperature::from_celsius(20.0),
        Bandpass::johnson_v().unwrap(),
    )
}

fn quiet_options() -> RenderOptions {
    RenderOptions {
        noise: NoiseToggles::disabled(),
        ..Default::default()
    }
}

fn focal_px() -> f64 {
    25.0 * 1000.0 / 5.5
}

/// Star whose ideal pinhole image lands at pixel offset (dx, dy) from the center
fn star_at_offset(id: u64, dx: f64, dy: f64, magnitude: f64) -> Star {
    let direction = Vector3::new(dx / focal_px(), dy / focal_px(), 1.0).normalize();
    Star::new(id, direction, magnitude)
}

fn renderer(sensor: SensorConfig, bloom: BloomConfig, options: RenderOptions) -> Renderer {
    Renderer::new(
        test_lens(),
        sensor,
        PsfModel::Gaussian { sigma_px: 1.0 },
        bloom,
        options,
    )
    .unwrap()
}

#[test]
fn centered_gaussian_star_peaks_at_kernel_peak() {
    let renderer = renderer(test_sensor(1e9), BloomConfig::disabled(), quiet_options());
    let catalog = vec![Star::new(7, Vector3::z(), 4.0)];

    let result = renderer
        .render(&catalog, &Attitude::identity(), &test_exposure(), Some(1))
        .unwrap();

    assert_eq!(result.stars.len(), 1);
    let star = result.stars[0];
    assert_eq!(star.id, 7);
    assert_relative_eq!(star.ideal.0, CENTER, epsilon = 1e-9);
    assert_relative_eq!(star.ideal.1, CENTER, epsilon = 1e-9);
    assert_eq!(star.distorted, star.ideal);
    assert!(star.electrons > 100.0);

    let patch = renderer
        .psf()
        .kernel_patch(star.distorted.0, star.distorted.1, &PsfSettings::default());
    let kernel_peak = patch.weights.iter().cloned().fold(f64::MIN, f64::max);

    let c = CENTER as usize;
    let image = &result.electron_image;
    assert_relative_eq!(image[[c, c]], star.electrons * kernel_peak, max_relative = 1e-12);

    // Symmetric spot
    assert_relative_eq!(image[[c, c - 1]], image[[c, c + 1]], max_relative = 1e-9);
    assert_relative_eq!(image[[c - 1, c]], image[[c + 1, c]], max_relative = 1e-9);
    assert_relative_eq!(image[[c - 1, c]], image[[c, c + 1]], max_relative = 1e-9);

    // Fully contained footprint: all expected electrons land on the array
    assert_relative_eq!(result.signal_image.sum(), star.electrons, max_relative = 1e-9);
    assert_eq!(result.bloom.clipped_pixels, 0);
}

#[test]
fn stars_outside_field_contribute_nothing() {
    let renderer = renderer(test_sensor(1e9), BloomConfig::disabled(), quiet_options());
    let exposure = test_exposure();
    let attitude = Attitude::identity();

    let inside = vec![star_at_offset(1, 10.0, -5.0, 5.0)];
    let mut with_outside = inside.clone();
    // 45° off axis, and directly behind the camera
    with_outside.push(Star::new(2, Vector3::new(1.0, 0.0, 1.0).normalize(), 0.0));
    with_outside.push(Star::new(3, -Vector3::z(), -1.0));

    let a = renderer.render(&inside, &attitude, &exposure, Some(3)).unwrap();
    let b = renderer.render(&with_outside, &attitude, &exposure, Some(3)).unwrap();

    assert_eq!(b.stars.len(), 1);
    assert!(b.find_star(2).is_none());
    assert!(b.find_star(3).is_none());
    assert_eq!(a.electron_image, b.electron_image);
    assert_eq!(a.adu_image, b.adu_image);
}

#[test]
fn vertical_bloom_conserves_charge_along_columns() {
    let full_well = 500.0;
    let bloom = BloomConfig::new(BloomAxes::Vertical, BloomMode::Symmetric);
    let renderer = renderer(test_sensor(full_well), bloom, quiet_options());
    let catalog = vec![Star::new(1, Vector3::z(), 0.0)];

    let result = renderer
        .render(&catalog, &Attitude::identity(), &test_exposure(), Some(9))
        .unwrap();

    assert!(result.bloom.clipped_pixels > 1);
    assert!(result
        .electron_image
        .iter()
        .all(|&v| (0.0..=full_well).contains(&v)));

    let before = result.signal_image.sum();
    let after =
        result.electron_image.sum() + result.bloom.boundary_loss_e + result.bloom.discarded_e;
    assert_relative_eq!(after, before, max_relative = 1e-9);

    // Charge only moved within the columns the PSF already touched
    let patch = renderer.psf().kernel_patch(CENTER, CENTER, &PsfSettings::default());
    let cols = patch.col0..patch.col0 + patch.weights.ncols() as i64;
    for (((_r, c), &out), &sig) in result
        .electron_image
        .indexed_iter()
        .zip(result.signal_image.iter())
    {
        if out > sig + 1e-9 {
            assert!(cols.contains(&(c as i64)), "charge bloomed into column {c}");
        }
    }
}

#[test]
fn seeded_render_is_bit_identical() {
    let renderer = renderer(
        test_sensor(20_000.0),
        BloomConfig::new(BloomAxes::Both, BloomMode::Symmetric),
        RenderOptions::default(),
    );
    let exposure = test_exposure().with_sky_background(50.0);
    let catalog: Vec<Star> = (0..12)
        .map(|i| {
            let dx = (i as f64 * 7.3) % 80.0 - 40.0;
            let dy = (i as f64 * 4.1) % 60.0 - 30.0;
            star_at_offset(i, dx, dy, 2.0 + 0.4 * i as f64)
        })
        .collect();
    let attitude = Attitude::identity();

    let a = renderer.render(&catalog, &attitude, &exposure, Some(1234)).unwrap();
    let b = renderer.render(&catalog, &attitude, &exposure, Some(1234)).unwrap();
    assert_eq!(a.electron_image, b.electron_image);
    assert_eq!(a.adu_image, b.adu_image);
    assert_eq!(a.seed, 1234);

    let c = renderer.render(&catalog, &attitude, &exposure, Some(4321)).unwrap();
    assert_ne!(a.electron_image, c.electron_image);
    // Noise never touches the mean image
    assert_eq!(a.signal_image, c.signal_image);
}

#[test]
fn barrel_distortion_moves_psf_toward_center() {
    let barrel = BrownConrady::radial(-100.0, 0.0, 0.0);
    let lens = test_lens().with_distortion(Distortion::BrownConrady(barrel));
    let renderer = Renderer::new(
        lens,
        test_sensor(1e9),
        PsfModel::Gaussian { sigma_px: 1.0 },
        BloomConfig::disabled(),
        quiet_options(),
    )
    .unwrap();
    let catalog = vec![star_at_offset(5, 30.0, 0.0, 4.0)];

    let result = renderer
        .render(&catalog, &Attitude::identity(), &test_exposure(), Some(0))
        .unwrap();
    let star = result.stars[0];
    assert_relative_eq!(star.ideal.0, CENTER + 30.0, epsilon = 1e-9);
    assert!(star.distorted.0 < star.ideal.0 - 0.1);
    assert_relative_eq!(star.distorted.1, CENTER, epsilon = 1e-9);

    let image = &result.electron_image;
    let total = image.sum();
    let centroid_x = image
        .indexed_iter()
        .map(|((_r, c), &v)| c as f64 * v)
        .sum::<f64>()
        / total;
    assert!((centroid_x - star.distorted.0).abs() < 5e-3);
}

#[test]
fn malformed_catalog_entries() {
    let bad = Star::new(99, Vector3::new(0.0, 0.0, 2.0), 3.0);
    let catalog = vec![Star::new(1, Vector3::z(), 5.0), bad];

    let skipping = renderer(test_sensor(1e9), BloomConfig::disabled(), quiet_options());
    let result = skipping
        .render(&catalog, &Attitude::identity(), &test_exposure(), Some(2))
        .unwrap();
    assert_eq!(result.stars.len(), 1);
    assert_eq!(result.rejected.len(), 1);
    assert_eq!(result.rejected[0].id, 99);

    let strict = renderer(
        test_sensor(1e9),
        BloomConfig::disabled(),
        RenderOptions {
            data_policy: DataPolicy::RejectRun,
            ..quiet_options()
        },
    );
    let err = strict
        .render(&catalog, &Attitude::identity(), &test_exposure(), Some(2))
        .unwrap_err();
    assert!(matches!(err, SimulationError::Catalog(_)));
}

#[test]
fn configuration_round_trips_through_json() {
    let lens = test_lens()
        .with_obscuration(0.2)
        .with_distortion(Distortion::BrownConrady(
            BrownConrady::radial(-0.1, 0.01, 0.0).with_tangential(1e-4, -2e-4),
        ));
    let json = serde_json::to_string(&lens).unwrap();
    let back: LensConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, lens);

    let options = RenderOptions::default();
    let back: RenderOptions = serde_json::from_str(&serde_json::to_string(&options).unwrap()).unwrap();
    assert_eq!(back, options);

    let exposure = test_exposure().with_sky_background(3.0);
    let back: ExposureConfig = serde_json::from_str(&serde_json::to_string(&exposure).unwrap()).unwrap();
    assert_eq!(back, exposure);
}

#[test]
fn loaded_configs_with_empty_curves_are_rejected() {
    let mut exposure = serde_json::to_value(test_exposure()).unwrap();
    exposure["bandpass"]["transmission"] = serde_json::json!({
        "wavelengths": [],
        "efficiencies": []
    });
    assert!(serde_json::from_value::<ExposureConfig>(exposure).is_err());

    let mut sensor = serde_json::to_value(test_sensor(1e9)).unwrap();
    sensor["quantum_efficiency"] = serde_json::json!({
        "wavelengths": [500.0],
        "efficiencies": [0.0]
    });
    assert!(serde_json::from_value::<SensorConfig>(sensor).is_err());
}

#[test]
fn unseeded_render_reports_a_reusable_seed() {
    let renderer = renderer(test_sensor(20_000.0), BloomConfig::disabled(), RenderOptions::default());
    let catalog = vec![star_at_offset(1, 3.0, -4.0, 3.0)];
    let exposure = test_exposure().with_sky_background(20.0);
    let attitude = Attitude::identity();

    let first = renderer.render(&catalog, &attitude, &exposure, None).unwrap();
    let replay = renderer
        .render(&catalog, &attitude, &exposure, Some(first.seed))
        .unwrap();
    assert_eq!(replay.seed, first.seed);
    assert_eq!(replay.electron_image, first.electron_image);
    assert_eq!(replay.adu_image, first.adu_image);
}
