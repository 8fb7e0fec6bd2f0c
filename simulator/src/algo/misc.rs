//! Interpolation helpers.

use thiserror::Error;

/// Errors that can occur during interpolation operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InterpError {
    #[error("Value {0} is out of bounds for interpolation range [{1}, {2}]")]
    OutOfBounds(f64, f64, f64),
    #[error("Input vectors must have at least 2 points")]
    InsufficientData,
    #[error("Input vectors must have the same length")]
    MismatchedLengths,
    #[error("X values must be sorted in ascending order")]
    UnsortedData,
}

/// Performs linear interpolation on 1D data using binary search.
///
/// `xs` must be strictly ascending and the same length as `ys`. Values of
/// `x` outside `[xs[0], xs[n-1]]` are an error rather than an extrapolation.
///
/// # Errors
///
/// * `InterpError::OutOfBounds` - x is outside the range \\[xs\\[0\\], xs\\[n-1\\]\\]
/// * `InterpError::InsufficientData` - Less than 2 data points provided
/// * `InterpError::MismatchedLengths` - xs and ys have different lengths
/// * `InterpError::UnsortedData` - xs array is not strictly ascending
pub fn interp(x: f64, xs: &[f64], ys: &[f64]) -> Result<f64, InterpError> {
    if xs.len() != ys.len() {
        return Err(InterpError::MismatchedLengths);
    }

    if xs.len() < 2 {
        return Err(InterpError::InsufficientData);
    }

    if xs.windows(2).any(|w| w[1] <= w[0]) {
        return Err(InterpError::UnsortedData);
    }

    let min_x = xs[0];
    let max_x = xs[xs.len() - 1];

    if !(min_x..=max_x).contains(&x) {
        return Err(InterpError::OutOfBounds(x, min_x, max_x));
    }

    // Index of the first sample strictly greater than x
    let idx = xs.partition_point(|&probe| probe <= x);
    if idx == 0 {
        return Ok(ys[0]);
    }
    if xs[idx - 1] == x || idx == xs.len() {
        return Ok(ys[idx - 1]);
    }

    let (x1, x2) = (xs[idx - 1], xs[idx]);
    let (y1, y2) = (ys[idx - 1], ys[idx]);

    let t = (x - x1) / (x2 - x1);
    Ok(y1 + t * (y2 - y1))
}

/// Trapezoid-rule integral of uniformly or non-uniformly sampled data.
///
/// Returns 0.0 for fewer than two samples.
pub fn trap_integrate(xs: &[f64], ys: &[f64]) -> f64 {
    xs.windows(2)
        .zip(ys.windows(2))
        .map(|(x, y)| (x[1] - x[0]) * (y[0] + y[1]) / 2.0)
        .sum()
}
