//! Parallel processing utilities for image arrays
//!
//! Row-chunked parallel iteration with one RNG per chunk. Chunk RNGs are
//! seeded from the base seed plus the chunk index, so results depend only
//! on the seed and the chunk size, never on the thread schedule.

use ndarray::{Array2, ArrayViewMut2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

/// Rows per chunk used by the noise stages
pub const DEFAULT_CHUNK_ROWS: usize = 64;

/// Process an Array2 in parallel chunks with deterministic seeding
///
/// # Arguments
/// * `array` - The 2D array to process
/// * `seed` - Base seed for random number generation
/// * `chunk_size` - Optional chunk size (rows per chunk). Defaults to [`DEFAULT_CHUNK_ROWS`].
/// * `processor` - Closure that processes each chunk with its own RNG. The
///   second argument is the index of the first row in the chunk.
pub fn process_array_in_parallel_chunks<F>(
    mut array: Array2<f64>,
    seed: u64,
    chunk_size: Option<usize>,
    processor: F,
) -> Array2<f64>
where
    F: Fn(&mut ArrayViewMut2<f64>, usize, &mut StdRng) + Send + Sync,
{
    let chunk_size = chunk_size.unwrap_or(DEFAULT_CHUNK_ROWS).max(1);

    array
        .axis_chunks_iter_mut(Axis(0), chunk_size)
        .into_par_iter()
        .enumerate()
        .for_each(|(chunk_idx, mut chunk)| {
            let chunk_seed = seed.wrapping_add(chunk_idx as u64);
            let mut rng = StdRng::seed_from_u64(chunk_seed);
            processor(&mut chunk, chunk_idx * chunk_size, &mut rng);
        });

    array
}
