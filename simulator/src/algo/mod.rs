//! Numerical building blocks shared by the camera models
//!
//! Interpolation, tabulated radial profiles and the seeded row-chunk
//! parallelism used by the noise stages.

pub mod lookup_table;
pub mod misc;
pub mod parallel;

pub use lookup_table::{LookupError, LookupTable};
pub use misc::{interp, trap_integrate, InterpError};
pub use parallel::process_array_in_parallel_chunks;
