//! Photometry: efficiency curves, bands and magnitude to electron conversion

pub mod band;
pub mod quantum_efficiency;
pub mod radiometry;

pub use band::{Band, CGS};
pub use quantum_efficiency::{QuantumEfficiency, QuantumEfficiencyError};
pub use radiometry::{magnitude_to_relative_flux, Bandpass, Radiometry, ZeroPoint};
