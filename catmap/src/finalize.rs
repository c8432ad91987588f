//! Terminal statistics pass: per-pixel sums become maps.
//!
//! Runs exactly once. The first sub-pass rewrites sums into means,
//! population variances, and inverse-variance weights, clearing pixels with
//! no data or degenerate variance from the mask. The second sub-pass uses
//! the global mean count to rewrite surviving counts into overdensities and
//! fill the number inverse-variance map. The rewrite is destructive by
//! construction: the sum maps are consumed and returned as statistic maps.

use skymap::PixelMap;

use crate::error::PipelineError;
use crate::validate::{ReferenceMonitor, ValidationSummary};

/// Per-pixel sums handed over by the accumulator.
pub(crate) struct SumMaps {
    pub mask: PixelMap,
    pub counts: PixelMap,
    pub sum_e1: PixelMap,
    pub sum_e2: PixelMap,
    pub sum_e1_sq: PixelMap,
    pub sum_e2_sq: PixelMap,
    pub monitor: Option<ReferenceMonitor>,
}

/// The Finalized state of a run: immutable statistic maps plus run totals.
#[derive(Debug, Clone)]
pub struct FinalizedMaps {
    overdensity: PixelMap,
    mean_e1: PixelMap,
    mean_e2: PixelMap,
    inv_var_e1: PixelMap,
    inv_var_e2: PixelMap,
    number_inv_var: PixelMap,
    mask: PixelMap,
    n_bar: f64,
    observed_pixels: usize,
    total_objects: f64,
    validation: Option<ValidationSummary>,
}

impl FinalizedMaps {
    pub(crate) fn from_sums(sums: SumMaps) -> Result<Self, PipelineError> {
        let SumMaps {
            mut mask,
            mut counts,
            mut sum_e1,
            mut sum_e2,
            mut sum_e1_sq,
            mut sum_e2_sq,
            monitor,
        } = sums;

        let n_pix = mask.len();
        let mut number_inv_var = PixelMap::zeroed(mask.n_side());
        let mut observed_pixels = 0usize;
        let mut total_objects = 0.0f64;

        for pixel in 0..n_pix {
            let n = counts[pixel];
            if n <= 0.0 {
                sum_e1[pixel] = 0.0;
                sum_e2[pixel] = 0.0;
                sum_e1_sq[pixel] = 0.0;
                sum_e2_sq[pixel] = 0.0;
                mask[pixel] = 0.0;
                continue;
            }

            let mean_e1 = sum_e1[pixel] / n;
            let mean_e2 = sum_e2[pixel] / n;
            let var_e1 = sum_e1_sq[pixel] / n - mean_e1 * mean_e1;
            let var_e2 = sum_e2_sq[pixel] / n - mean_e2 * mean_e2;

            if var_e1 > 0.0 && var_e2 > 0.0 {
                sum_e1[pixel] = mean_e1;
                sum_e2[pixel] = mean_e2;
                sum_e1_sq[pixel] = 1.0 / var_e1;
                sum_e2_sq[pixel] = 1.0 / var_e2;
                observed_pixels += 1;
                total_objects += n;
            } else {
                // Degenerate variance disqualifies the pixel.
                counts[pixel] = 0.0;
                sum_e1[pixel] = 0.0;
                sum_e2[pixel] = 0.0;
                sum_e1_sq[pixel] = 0.0;
                sum_e2_sq[pixel] = 0.0;
                mask[pixel] = 0.0;
            }
        }

        if observed_pixels == 0 {
            return Err(PipelineError::Invariant(
                "no pixel survived finalization: every cell was empty or had degenerate variance"
                    .into(),
            ));
        }
        let n_bar = total_objects / observed_pixels as f64;
        if n_bar <= 0.0 {
            return Err(PipelineError::Invariant(format!(
                "mean object count per pixel is {n_bar}, expected positive"
            )));
        }

        for pixel in 0..n_pix {
            if counts[pixel] > 0.0 {
                counts[pixel] = (counts[pixel] - n_bar) / n_bar;
                number_inv_var[pixel] = n_bar;
            }
        }

        let validation = monitor.map(|m| m.summarize(observed_pixels));

        Ok(Self {
            overdensity: counts,
            mean_e1: sum_e1,
            mean_e2: sum_e2,
            inv_var_e1: sum_e1_sq,
            inv_var_e2: sum_e2_sq,
            number_inv_var,
            mask,
            n_bar,
            observed_pixels,
            total_objects,
            validation,
        })
    }

    /// Fractional deviation of each surviving pixel's count from the mean.
    pub fn overdensity(&self) -> &PixelMap {
        &self.overdensity
    }

    /// Mean first ellipticity component per surviving pixel.
    pub fn mean_e1(&self) -> &PixelMap {
        &self.mean_e1
    }

    /// Mean second ellipticity component per surviving pixel.
    pub fn mean_e2(&self) -> &PixelMap {
        &self.mean_e2
    }

    /// Inverse variance of the first ellipticity component.
    pub fn inv_var_e1(&self) -> &PixelMap {
        &self.inv_var_e1
    }

    /// Inverse variance of the second ellipticity component.
    pub fn inv_var_e2(&self) -> &PixelMap {
        &self.inv_var_e2
    }

    /// Number inverse-variance map (the mean count at surviving pixels).
    pub fn number_inv_var(&self) -> &PixelMap {
        &self.number_inv_var
    }

    /// Mask with empty and degenerate pixels cleared.
    pub fn mask(&self) -> &PixelMap {
        &self.mask
    }

    /// Global mean object count over observed pixels.
    pub fn n_bar(&self) -> f64 {
        self.n_bar
    }

    /// Pixels that survived finalization.
    pub fn observed_pixels(&self) -> usize {
        self.observed_pixels
    }

    /// Objects accumulated over surviving pixels.
    pub fn total_objects(&self) -> f64 {
        self.total_objects
    }

    /// Validation diagnostics, when a monitor was attached.
    pub fn validation(&self) -> Option<&ValidationSummary> {
        self.validation.as_ref()
    }
}
