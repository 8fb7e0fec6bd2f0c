//! Stars, camera attitude and the pinhole star projector
//!
//! Star directions are unit vectors in an inertial frame. An [`Attitude`]
//! rotates them into the camera frame, where +Z is the boresight, +X runs
//! along increasing column and +Y along increasing row. The projector then
//! applies a gnomonic (pinhole) projection into pixel coordinates.

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ConfigError;
use crate::hardware::lens::LensConfig;
use crate::hardware::sensor::SensorConfig;

/// Allowed deviation of a catalog direction from unit length
pub const UNIT_NORM_TOLERANCE: f64 = 1e-6;

/// Malformed catalog entries.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CatalogError {
    #[error("star {id}: direction norm {norm} is not 1")]
    NonUnitDirection { id: u64, norm: f64 },

    #[error("star {id}: non-finite direction or magnitude")]
    NonFinite { id: u64 },
}

/// What to do with malformed catalog entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataPolicy {
    /// Drop the entry, log a warning and record it in the outcome
    #[default]
    SkipInvalid,
    /// Fail the whole run on the first bad entry
    RejectRun,
}

/// Catalog star.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Star {
    pub id: u64,
    /// Unit vector in the inertial frame
    pub direction: Vector3<f64>,
    /// Apparent magnitude in the bandpass's system
    pub magnitude: f64,
}

impl Star {
    pub fn new(id: u64, direction: Vector3<f64>, magnitude: f64) -> Self {
        Self {
            id,
            direction,
            magnitude,
        }
    }

    /// Star at right ascension / declination given in degrees.
    pub fn from_ra_dec(id: u64, ra_deg: f64, dec_deg: f64, magnitude: f64) -> Self {
        Self::new(id, radec_to_unit(ra_deg, dec_deg), magnitude)
    }

    /// Check the direction is finite and unit length within [`UNIT_NORM_TOLERANCE`].
    pub fn validate(&self) -> Result<(), CatalogError> {
        if !self.magnitude.is_finite() || self.direction.iter().any(|c| !c.is_finite()) {
            return Err(CatalogError::NonFinite { id: self.id });
        }
        let norm = self.direction.norm();
        if (norm - 1.0).abs() > UNIT_NORM_TOLERANCE {
            return Err(CatalogError::NonUnitDirection { id: self.id, norm });
        }
        Ok(())
    }
}

/// Unit vector for an equatorial coordinate in degrees.
pub fn radec_to_unit(ra_deg: f64, dec_deg: f64) -> Vector3<f64> {
    let (ra, dec) = (ra_deg.to_radians(), dec_deg.to_radians());
    Vector3::new(dec.cos() * ra.cos(), dec.cos() * ra.sin(), dec.sin())
}

/// Uniform random star field generator
///
/// Directions are uniform on the sphere and magnitudes uniform in the given
/// range, drawn from a seeded generator so fields are reproducible.
pub struct StarFieldGenerator {
    rng: StdRng,
}

impl StarFieldGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Generate `count` stars with ids `0..count`.
    pub fn generate(&mut self, count: usize, magnitude_range: (f64, f64)) -> Vec<Star> {
        (0..count)
            .map(|id| {
                let ra = self.rng.gen::<f64>() * 360.0;
                // Uniform in sin(dec) for uniform sky density
                let dec = (self.rng.gen::<f64>() * 2.0 - 1.0).asin().to_degrees();
                let mag = self.rng.gen_range(magnitude_range.0..=magnitude_range.1);
                Star::from_ra_dec(id as u64, ra, dec, mag)
            })
            .collect()
    }

    /// Generate `count` stars within `radius_deg` of a pointing.
    pub fn generate_around(
        &mut self,
        count: usize,
        ra_deg: f64,
        dec_deg: f64,
        radius_deg: f64,
        magnitude_range: (f64, f64),
    ) -> Vec<Star> {
        let attitude = Attitude::from_pointing(ra_deg, dec_deg, 0.0);
        let cos_max = radius_deg.to_radians().cos();
        (0..count)
            .map(|id| {
                // Uniform over the spherical cap around +Z, then into the inertial frame
                let cos_theta = 1.0 - self.rng.gen::<f64>() * (1.0 - cos_max);
                let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
                let phi = self.rng.gen::<f64>() * std::f64::consts::TAU;
                let camera = Vector3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta);
                let mag = self.rng.gen_range(magnitude_range.0..=magnitude_range.1);
                Star::new(id as u64, attitude.to_inertial(&camera), mag)
            })
            .collect()
    }
}

/// Rotation from the inertial frame into the camera frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attitude {
    rotation: Rotation3<f64>,
}

impl Attitude {
    pub fn identity() -> Self {
        Self {
            rotation: Rotation3::identity(),
        }
    }

    pub fn from_rotation(rotation: Rotation3<f64>) -> Self {
        Self { rotation }
    }

    /// Scalar-first quaternion mapping inertial vectors into the camera frame.
    ///
    /// Non-unit quaternions are normalized; zero or non-finite ones are rejected.
    pub fn from_quaternion(w: f64, x: f64, y: f64, z: f64) -> Result<Self, ConfigError> {
        let q = nalgebra::Quaternion::new(w, x, y, z);
        let norm = q.norm();
        if !norm.is_finite() || norm < 1e-12 {
            return Err(ConfigError::Attitude("quaternion must be finite and non-zero"));
        }
        let unit = UnitQuaternion::from_quaternion(q);
        Ok(Self {
            rotation: unit.to_rotation_matrix(),
        })
    }

    /// Rotation matrix whose rows are the camera axes expressed in the inertial frame.
    pub fn from_matrix(matrix: Matrix3<f64>) -> Result<Self, ConfigError> {
        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(ConfigError::Attitude("matrix must be finite"));
        }
        let orthogonality = (matrix.transpose() * matrix - Matrix3::identity()).norm();
        if orthogonality > 1e-6 || matrix.determinant() <= 0.0 {
            return Err(ConfigError::Attitude("matrix must be a proper rotation"));
        }
        Ok(Self {
            rotation: Rotation3::from_matrix_unchecked(matrix),
        })
    }

    /// Boresight at (RA, Dec) with celestial north toward −Y (up in the image)
    /// at zero roll; roll rotates the image about the boresight.
    pub fn from_pointing(ra_deg: f64, dec_deg: f64, roll_deg: f64) -> Self {
        let z = radec_to_unit(ra_deg, dec_deg);

        // East is undefined at the poles; fall back to the inertial +Y axis
        let north_pole = Vector3::z();
        let east = match north_pole.cross(&z).try_normalize(1e-12) {
            Some(east) => east,
            None => Vector3::y(),
        };
        let up = z.cross(&east);

        // North up and east left, as on the sky seen looking out
        let x0 = -east;
        let y0 = -up;

        let (s, c) = roll_deg.to_radians().sin_cos();
        let x = x0 * c + y0 * s;
        let y = y0 * c - x0 * s;

        let matrix = Matrix3::from_rows(&[x.transpose(), y.transpose(), z.transpose()]);
        Self {
            rotation: Rotation3::from_matrix_unchecked(matrix),
        }
    }

    pub fn rotation(&self) -> &Rotation3<f64> {
        &self.rotation
    }

    pub fn to_camera(&self, inertial: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * inertial
    }

    pub fn to_inertial(&self, camera: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.inverse() * camera
    }

    /// Boresight direction in the inertial frame.
    pub fn boresight(&self) -> Vector3<f64> {
        self.to_inertial(&Vector3::z())
    }
}

impl Default for Attitude {
    fn default() -> Self {
        Self::identity()
    }
}

/// A star that survived projection, with its ideal pinhole pixel coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibleStar {
    pub star: Star,
    pub ideal: (f64, f64),
}

/// Catalog entry dropped at the projector boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedStar {
    pub id: u64,
    pub reason: CatalogError,
}

/// Result of projecting a catalog.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectionOutcome {
    pub visible: Vec<VisibleStar>,
    pub rejected: Vec<RejectedStar>,
}

/// Pinhole projector from inertial star directions to ideal pixel coordinates
pub struct StarProjector {
    attitude: Attitude,
    focal_px: f64,
    center: (f64, f64),
    cos_half_fov: f64,
}

impl StarProjector {
    pub fn new(attitude: &Attitude, lens: &LensConfig, sensor: &SensorConfig) -> Self {
        Self {
            attitude: *attitude,
            focal_px: lens.focal_length_px(sensor),
            center: lens.optical_center(sensor),
            cos_half_fov: lens.fov_half_angle_rad(sensor).cos(),
        }
    }

    /// Ideal pixel coordinate of `direction`, or `None` when it is behind the
    /// camera or outside the field of view.
    ///
    /// `direction` is assumed to be unit length.
    pub fn project(&self, direction: &Vector3<f64>) -> Option<(f64, f64)> {
        let cam = self.attitude.to_camera(direction);
        if cam.z <= 0.0 {
            return None;
        }
        // Angle from boresight, compared through its cosine
        if cam.z / cam.norm() < self.cos_half_fov {
            return None;
        }
        Some((
            self.center.0 + self.focal_px * cam.x / cam.z,
            self.center.1 + self.focal_px * cam.y / cam.z,
        ))
    }

    /// Project every valid catalog entry.
    ///
    /// Invalid entries are skipped with a warning under
    /// [`DataPolicy::SkipInvalid`], or fail the call under [`DataPolicy::RejectRun`].
    pub fn project_catalog(
        &self,
        catalog: &[Star],
        policy: DataPolicy,
    ) -> Result<ProjectionOutcome, CatalogError> {
        let mut outcome = ProjectionOutcome::default();

        for star in catalog {
            if let Err(reason) = star.validate() {
                match policy {
                    DataPolicy::RejectRun => return Err(reason),
                    DataPolicy::SkipInvalid => {
                        log::warn!("skipping catalog entry: {reason}");
                        outcome.rejected.push(RejectedStar {
                            id: star.id,
                            reason,
                        });
                        continue;
                    }
                }
            }

            if let Some(ideal) = self.project(&star.direction) {
                outcome.visible.push(VisibleStar { star: *star, ideal });
            }
        }

        log::debug!(
            "projected {} of {} catalog stars ({} rejected)",
            outcome.visible.len(),
            catalog.len(),
            outcome.rejected.len()
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::sensor::models::CMV4000;
    use crate::units::{Length, LengthExt};
    use approx::assert_relative_eq;

    fn lens() -> LensConfig {
        LensConfig::new(
            "test",
            Length::from_millimeters(50.0),
            Length::from_millimeters(25.0),
            0.8,
        )
    }

    #[test]
    fn test_radec_to_unit() {
        let v = radec_to_unit(90.0, 0.0);
        assert_relative_eq!(v, Vector3::y(), epsilon = 1e-12);
        let p = radec_to_unit(123.0, 90.0);
        assert_relative_eq!(p, Vector3::z(), epsilon = 1e-12);
    }

    #[test]
    fn test_pointing_boresight() {
        for &(ra, dec, roll) in &[(10.0, 20.0, 0.0), (200.0, -45.0, 33.0), (0.0, 90.0, 0.0)] {
            let att = Attitude::from_pointing(ra, dec, roll);
            assert_relative_eq!(att.boresight(), radec_to_unit(ra, dec), epsilon = 1e-12);
            assert_relative_eq!(att.rotation().matrix().determinant(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_north_is_up_east_is_left() {
        let att = Attitude::from_pointing(0.0, 0.0, 0.0);
        let north = att.to_camera(&radec_to_unit(0.0, 1.0));
        let east = att.to_camera(&radec_to_unit(1.0, 0.0));
        assert!(north.y < 0.0);
        assert!(east.x < 0.0);
    }

    #[test]
    fn test_quaternion_and_matrix_agree() {
        let att = Attitude::from_pointing(45.0, 30.0, 10.0);
        let q = UnitQuaternion::from_rotation_matrix(att.rotation());
        let from_q = Attitude::from_quaternion(q.w * 2.0, q.i * 2.0, q.j * 2.0, q.k * 2.0).unwrap();
        let from_m = Attitude::from_matrix(*att.rotation().matrix()).unwrap();

        let v = radec_to_unit(47.0, 31.0);
        assert_relative_eq!(from_q.to_camera(&v), att.to_camera(&v), epsilon = 1e-12);
        assert_relative_eq!(from_m.to_camera(&v), att.to_camera(&v), epsilon = 1e-12);

        assert!(Attitude::from_quaternion(0.0, 0.0, 0.0, 0.0).is_err());
        assert!(Attitude::from_matrix(Matrix3::identity() * 2.0).is_err());
        assert!(Attitude::from_matrix(-Matrix3::identity()).is_err());
    }

    #[test]
    fn test_boresight_star_lands_on_optical_center() {
        let sensor = CMV4000.clone();
        let att = Attitude::from_pointing(80.0, -10.0, 0.0);
        let projector = StarProjector::new(&att, &lens(), &sensor);
        let (x, y) = projector.project(&radec_to_unit(80.0, -10.0)).unwrap();
        assert_relative_eq!(x, 1023.5, epsilon = 1e-9);
        assert_relative_eq!(y, 1023.5, epsilon = 1e-9);
    }

    #[test]
    fn test_pinhole_scale() {
        let sensor = CMV4000.clone();
        let projector = StarProjector::new(&Attitude::identity(), &lens(), &sensor);
        // Offset along camera +X by atan(0.01)
        let dir = Vector3::new(0.01, 0.0, 1.0).normalize();
        let (x, y) = projector.project(&dir).unwrap();
        let f_px = 50_000.0 / 5.5;
        assert_relative_eq!(x, 1023.5 + 0.01 * f_px, epsilon = 1e-6);
        assert_relative_eq!(y, 1023.5, epsilon = 1e-9);
    }

    #[test]
    fn test_behind_and_outside_fov_are_culled() {
        let sensor = CMV4000.clone();
        let projector = StarProjector::new(&Attitude::identity(), &lens(), &sensor);
        assert!(projector.project(&-Vector3::z()).is_none());
        assert!(projector.project(&Vector3::x()).is_none());
        // Half diagonal of this setup is about 9 degrees
        let outside = Vector3::new(20f64.to_radians().tan(), 0.0, 1.0).normalize();
        assert!(projector.project(&outside).is_none());
    }

    #[test]
    fn test_catalog_policies() {
        let sensor = CMV4000.clone();
        let projector = StarProjector::new(&Attitude::identity(), &lens(), &sensor);
        let catalog = vec![
            Star::new(1, Vector3::z(), 3.0),
            Star::new(2, Vector3::new(0.0, 0.0, 2.0), 3.0),
            Star::new(3, Vector3::new(f64::NAN, 0.0, 1.0), 3.0),
            Star::new(4, -Vector3::z(), 3.0),
        ];

        let outcome = projector
            .project_catalog(&catalog, DataPolicy::SkipInvalid)
            .unwrap();
        assert_eq!(outcome.visible.len(), 1);
        assert_eq!(outcome.visible[0].star.id, 1);
        assert_eq!(outcome.rejected.len(), 2);
        assert_eq!(
            outcome.rejected[0].reason,
            CatalogError::NonUnitDirection { id: 2, norm: 2.0 }
        );
        assert_eq!(outcome.rejected[1].reason, CatalogError::NonFinite { id: 3 });

        let err = projector
            .project_catalog(&catalog, DataPolicy::RejectRun)
            .unwrap_err();
        assert!(matches!(err, CatalogError::NonUnitDirection { id: 2, .. }));
    }

    #[test]
    fn test_empty_field_is_valid() {
        let sensor = CMV4000.clone();
        let projector = StarProjector::new(&Attitude::identity(), &lens(), &sensor);
        let outcome = projector
            .project_catalog(&[Star::new(1, -Vector3::z(), 1.0)], DataPolicy::SkipInvalid)
            .unwrap();
        assert!(outcome.visible.is_empty());
        assert!(outcome.rejected.is_empty());
    }

    #[test]
    fn test_generated_field_is_unit_and_local() {
        let mut generator = StarFieldGenerator::new(7);
        let stars = generator.generate_around(200, 120.0, 40.0, 3.0, (2.0, 6.0));
        let center = radec_to_unit(120.0, 40.0);
        for star in &stars {
            assert!(star.validate().is_ok());
            assert!(star.direction.dot(&center) >= 3f64.to_radians().cos() - 1e-12);
            assert!((2.0..=6.0).contains(&star.magnitude));
        }

        let all_sky = StarFieldGenerator::new(7).generate(50, (0.0, 1.0));
        assert!(all_sky.iter().all(|s| s.validate().is_ok()));
    }
}
