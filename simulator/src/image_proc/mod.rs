//! Focal-plane image formation: PSF models, noise, saturation and the
//! render pipeline that strings them together.

pub mod airy;
pub mod bloom;
pub mod defocus;
pub mod noise;
pub mod psf;
pub mod render;

pub use airy::{AiryDisk, PixelScaledAiryDisk, AIRY_DISK};
pub use bloom::{apply_saturation, BloomAxes, BloomConfig, BloomMode, BloomReport, BloomSign};
pub use defocus::DefocusProfile;
pub use noise::{
    add_dark_current, add_read_noise, apply_poisson_photon_noise, apply_sensor_noise,
    NoiseToggles,
};
pub use psf::{KernelPatch, PixelPsf, PsfModel, PsfSettings};
pub use render::{
    add_stars_to_image, quantize_image, ProjectedStar, RenderOptions, Renderer, RenderingResult,
};
