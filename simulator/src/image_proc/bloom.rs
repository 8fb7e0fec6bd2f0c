//! Full-well saturation and charge blooming.
//!
//! Pixels above capacity are clipped and their excess is shared among the
//! enabled bloom directions. Neighbors pushed over capacity are queued and
//! processed in turn, so a bright star bleeds into a column or row streak.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Excess below this many electrons is absorbed at the clip
pub const MIN_BLOOM_EXCESS_E: f64 = 1e-9;

/// Worklist entries processed per pixel before giving up on the cascade
pub const BLOOM_ITERATIONS_PER_PIXEL: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BloomAxes {
    /// Clip only; excess is discarded
    #[default]
    None,
    /// Along rows (changing column)
    Horizontal,
    /// Along columns (changing row), the usual CCD/CMOS readout direction
    Vertical,
    Both,
}

const BOTH_WAYS: &[isize] = &[1, -1];
const INCREASING: &[isize] = &[1];
const DECREASING: &[isize] = &[-1];

/// Which way charge flows along an axis in directed mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BloomSign {
    #[default]
    Increasing,
    Decreasing,
}

impl BloomSign {
    fn steps(self) -> &'static [isize] {
        match self {
            BloomSign::Increasing => INCREASING,
            BloomSign::Decreasing => DECREASING,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BloomMode {
    /// Excess split between both neighbors on each enabled axis
    #[default]
    Symmetric,
    /// Excess flows only toward increasing index
    Unidirectional,
    /// Excess flows one way per axis, e.g. `+x` with `-y`
    Directed {
        horizontal: BloomSign,
        vertical: BloomSign,
    },
}

impl BloomMode {
    pub fn directed(horizontal: BloomSign, vertical: BloomSign) -> Self {
        BloomMode::Directed {
            horizontal,
            vertical,
        }
    }
}

/// Step to a neighboring pixel as (row delta, column delta).
pub type BloomDirection = (isize, isize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BloomConfig {
    pub axes: BloomAxes,
    pub mode: BloomMode,
}

impl BloomConfig {
    pub fn new(axes: BloomAxes, mode: BloomMode) -> Self {
        Self { axes, mode }
    }

    /// Clip at full well without redistributing.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Neighbor steps receiving an equal share of each pixel's excess.
    pub fn directions(&self) -> Vec<BloomDirection> {
        let horizontal = matches!(self.axes, BloomAxes::Horizontal | BloomAxes::Both);
        let vertical = matches!(self.axes, BloomAxes::Vertical | BloomAxes::Both);

        let (col_steps, row_steps): (&[isize], &[isize]) = match self.mode {
            BloomMode::Symmetric => (BOTH_WAYS, BOTH_WAYS),
            BloomMode::Unidirectional => (INCREASING, INCREASING),
            BloomMode::Directed {
                horizontal,
                vertical,
            } => (horizontal.steps(), vertical.steps()),
        };

        let mut dirs = Vec::with_capacity(4);
        if horizontal {
            dirs.extend(col_steps.iter().map(|&dc| (0, dc)));
        }
        if vertical {
            dirs.extend(row_steps.iter().map(|&dr| (dr, 0)));
        }
        dirs
    }
}

/// Charge accounting for one saturation pass.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BloomReport {
    /// Distinct pixels clipped to full well
    pub clipped_pixels: usize,
    /// Electrons that bloomed off the edge of the array
    pub boundary_loss_e: f64,
    /// Electrons dropped at the clip (no bloom directions, negligible excess, or cascade cap)
    pub discarded_e: f64,
    /// Pixels raised from below zero
    pub floored_pixels: usize,
    /// Electrons added by flooring negatives
    pub floored_e: f64,
    pub hit_iteration_cap: bool,
}

/// Enforce `0 <= pixel <= full_well` in place, blooming excess charge per `config`.
pub fn apply_saturation(image: &mut Array2<f64>, full_well: f64, config: &BloomConfig) -> BloomReport {
    let (height, width) = image.dim();
    let mut report = BloomReport::default();

    for pixel in image.iter_mut() {
        if *pixel < 0.0 {
            report.floored_e -= *pixel;
            report.floored_pixels += 1;
            *pixel = 0.0;
        }
    }

    let directions = config.directions();
    let mut queued = Array2::from_elem((height, width), false);
    let mut clipped = Array2::from_elem((height, width), false);
    let mut worklist: VecDeque<(usize, usize)> = VecDeque::new();

    for ((r, c), &v) in image.indexed_iter() {
        if v > full_well {
            worklist.push_back((r, c));
            queued[[r, c]] = true;
        }
    }

    let cap = BLOOM_ITERATIONS_PER_PIXEL.saturating_mul(height * width);
    let mut processed = 0usize;

    while let Some((r, c)) = worklist.pop_front() {
        if processed >= cap {
            report.hit_iteration_cap = true;
            break;
        }
        processed += 1;
        queued[[r, c]] = false;

        let excess = image[[r, c]] - full_well;
        if excess <= 0.0 {
            continue;
        }
        image[[r, c]] = full_well;
        clipped[[r, c]] = true;

        if excess <= MIN_BLOOM_EXCESS_E || directions.is_empty() {
            report.discarded_e += excess;
            continue;
        }

        let share = excess / directions.len() as f64;
        for &(dr, dc) in &directions {
            let nr = r as isize + dr;
            let nc = c as isize + dc;
            if nr < 0 || nc < 0 || nr >= height as isize || nc >= width as isize {
                report.boundary_loss_e += share;
                continue;
            }
            let (nr, nc) = (nr as usize, nc as usize);
            image[[nr, nc]] += share;
            if image[[nr, nc]] > full_well && !queued[[nr, nc]] {
                queued[[nr, nc]] = true;
                worklist.push_back((nr, nc));
            }
        }
    }

    if report.hit_iteration_cap {
        let mut remaining = 0usize;
        for ((r, c), pixel) in image.indexed_iter_mut() {
            if *pixel > full_well {
                report.discarded_e += *pixel - full_well;
                *pixel = full_well;
                clipped[[r, c]] = true;
                remaining += 1;
            }
        }
        log::warn!(
            "bloom cascade stopped after {} steps; clipped {} remaining pixels",
            processed,
            remaining
        );
    }

    report.clipped_pixels = clipped.iter().filter(|&&c| c).count();
    log::debug!(
        "saturation: {} clipped, {:.1} e- off edge, {:.3e} e- discarded",
        report.clipped_pixels,
        report.boundary_loss_e,
        report.discarded_e
    );
    report
}
