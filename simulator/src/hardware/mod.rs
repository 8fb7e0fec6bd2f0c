//! Hardware module for lens, sensor and exposure configurations

pub mod dark_current;
pub mod exposure;
pub mod lens;
pub mod sensor;
pub mod shutter;

pub use dark_current::DarkCurrentModel;
pub use exposure::ExposureConfig;
pub use lens::LensConfig;
pub use sensor::{Bias, SensorConfig};
pub use shutter::GlobalShutter;
