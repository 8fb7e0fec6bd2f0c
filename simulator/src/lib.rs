//! Star tracker image simulation
//!
//! This crate renders synthetic star-tracker frames: catalog stars are
//! projected through a camera attitude and pinhole lens model, bent by lens
//! distortion, converted to photoelectrons, spread by a point spread function,
//! and passed through sensor noise, full-well saturation and ADC readout.
//!
//! The entry point is [`image_proc::render::Renderer`].

pub mod algo;
pub mod distortion;
pub mod error;
pub mod hardware;
pub mod image_proc;
pub mod photometry;
pub mod star_math;
pub mod units;

// Re-exports for easier access
pub use distortion::{BrownConrady, Distortion};
pub use error::{ConfigError, SimulationError};
pub use hardware::{ExposureConfig, GlobalShutter, LensConfig, SensorConfig};
pub use image_proc::{BloomConfig, PsfModel, RenderOptions, Renderer, RenderingResult};
pub use photometry::{Bandpass, QuantumEfficiency};
pub use star_math::{Attitude, DataPolicy, Star};
