//! Reference-map validation monitor.
//!
//! When reference ellipticity maps are supplied, every included record is
//! compared against the reference value at its pixel and mismatches are
//! tallied per shape component. The two comparison rules are configured
//! independently; the defaults preserve the historically observed asymmetry
//! (`>=` for the first component, `>` for the second) instead of silently
//! unifying it.

use skymap::PixelMap;

use crate::error::PipelineError;

/// Default relative-difference threshold for both components.
pub const DEFAULT_MISMATCH_THRESHOLD: f64 = 1e-5;

/// Comparison policy for one shape component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MismatchRule {
    /// Relative difference at which a record counts as mismatched.
    pub threshold: f64,
    /// Whether a difference exactly at the threshold counts.
    pub inclusive: bool,
}

impl MismatchRule {
    /// Rule that flags differences meeting or exceeding the threshold.
    pub fn inclusive(threshold: f64) -> Self {
        Self {
            threshold,
            inclusive: true,
        }
    }

    /// Rule that flags only differences strictly above the threshold.
    pub fn exclusive(threshold: f64) -> Self {
        Self {
            threshold,
            inclusive: false,
        }
    }

    /// Apply the rule to a relative difference.
    pub fn flags(&self, relative_difference: f64) -> bool {
        if self.inclusive {
            relative_difference >= self.threshold
        } else {
            relative_difference > self.threshold
        }
    }
}

/// Aggregated validation diagnostics, produced once after finalization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationSummary {
    pub mismatch_e1: u64,
    pub mismatch_e2: u64,
    /// Mismatch counts normalized by the observed pixel count.
    pub mismatch_fraction_e1: f64,
    pub mismatch_fraction_e2: f64,
    /// Observed pixels over reference-map pixels.
    pub sky_fraction: f64,
}

/// Compares included records against preloaded reference maps.
///
/// The reference maps are never mutated. When no monitor is configured the
/// accumulator skips this stage entirely.
#[derive(Debug, Clone)]
pub struct ReferenceMonitor {
    reference_e1: PixelMap,
    reference_e2: PixelMap,
    rule_e1: MismatchRule,
    rule_e2: MismatchRule,
    mismatch_e1: u64,
    mismatch_e2: u64,
}

impl ReferenceMonitor {
    /// Build a monitor with the default asymmetric rules.
    pub fn new(reference_e1: PixelMap, reference_e2: PixelMap) -> Result<Self, PipelineError> {
        if !reference_e1.same_geometry(&reference_e2) {
            return Err(PipelineError::Invariant(format!(
                "reference maps disagree on geometry: {} vs {} pixels",
                reference_e1.len(),
                reference_e2.len()
            )));
        }
        Ok(Self {
            reference_e1,
            reference_e2,
            rule_e1: MismatchRule::inclusive(DEFAULT_MISMATCH_THRESHOLD),
            rule_e2: MismatchRule::exclusive(DEFAULT_MISMATCH_THRESHOLD),
            mismatch_e1: 0,
            mismatch_e2: 0,
        })
    }

    /// Replace the comparison rules.
    pub fn with_rules(mut self, rule_e1: MismatchRule, rule_e2: MismatchRule) -> Self {
        self.rule_e1 = rule_e1;
        self.rule_e2 = rule_e2;
        self
    }

    /// Pixel count of the reference maps.
    pub fn reference_pixels(&self) -> usize {
        self.reference_e1.len()
    }

    /// Compare one included record against the reference at its pixel.
    pub fn inspect(&mut self, pixel: usize, e1: f64, e2: f64) {
        let relative_e1 = (e1 - self.reference_e1[pixel]).abs() / e1;
        if self.rule_e1.flags(relative_e1) {
            self.mismatch_e1 += 1;
        }

        let relative_e2 = (e2 - self.reference_e2[pixel]).abs() / e2;
        if self.rule_e2.flags(relative_e2) {
            self.mismatch_e2 += 1;
        }
    }

    /// Fold another monitor's counters into this one (shard merge).
    pub(crate) fn absorb(&mut self, other: &ReferenceMonitor) {
        self.mismatch_e1 += other.mismatch_e1;
        self.mismatch_e2 += other.mismatch_e2;
    }

    /// Produce the per-pixel-normalized diagnostics.
    pub fn summarize(&self, observed_pixels: usize) -> ValidationSummary {
        ValidationSummary {
            mismatch_e1: self.mismatch_e1,
            mismatch_e2: self.mismatch_e2,
            mismatch_fraction_e1: self.mismatch_e1 as f64 / observed_pixels as f64,
            mismatch_fraction_e2: self.mismatch_e2 as f64 / observed_pixels as f64,
            sky_fraction: observed_pixels as f64 / self.reference_pixels() as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn constant_map(n_side: u32, value: f64) -> PixelMap {
        let mut map = PixelMap::zeroed(n_side);
        for pixel in 0..map.len() {
            map[pixel] = value;
        }
        map
    }

    #[test]
    fn test_rule_asymmetry_at_the_threshold() {
        let inclusive = MismatchRule::inclusive(DEFAULT_MISMATCH_THRESHOLD);
        let exclusive = MismatchRule::exclusive(DEFAULT_MISMATCH_THRESHOLD);

        assert!(inclusive.flags(DEFAULT_MISMATCH_THRESHOLD));
        assert!(!exclusive.flags(DEFAULT_MISMATCH_THRESHOLD));

        assert!(inclusive.flags(2e-5));
        assert!(exclusive.flags(2e-5));
        assert!(!inclusive.flags(0.5e-5));
        assert!(!exclusive.flags(0.5e-5));
    }

    #[test]
    fn test_exact_match_never_counts() {
        let mut monitor =
            ReferenceMonitor::new(constant_map(2, 0.25), constant_map(2, -0.5)).unwrap();
        for pixel in 0..12 {
            monitor.inspect(pixel, 0.25, -0.5);
        }
        let summary = monitor.summarize(12);
        assert_eq!(summary.mismatch_e1, 0);
        assert_eq!(summary.mismatch_e2, 0);
        assert_relative_eq!(summary.mismatch_fraction_e1, 0.0);
        assert_relative_eq!(summary.mismatch_fraction_e2, 0.0);
    }

    #[test]
    fn test_gross_mismatch_counts_both_components() {
        let mut monitor =
            ReferenceMonitor::new(constant_map(2, 1.0), constant_map(2, 1.0)).unwrap();
        monitor.inspect(0, 2.0, 3.0);
        let summary = monitor.summarize(4);
        assert_eq!(summary.mismatch_e1, 1);
        assert_eq!(summary.mismatch_e2, 1);
        assert_relative_eq!(summary.mismatch_fraction_e1, 0.25);
    }

    #[test]
    fn test_sky_fraction_uses_reference_pixel_count() {
        let monitor = ReferenceMonitor::new(constant_map(2, 0.0), constant_map(2, 0.0)).unwrap();
        let summary = monitor.summarize(12);
        assert_relative_eq!(summary.sky_fraction, 12.0 / 48.0);
    }

    #[test]
    fn test_mismatched_reference_geometry_rejected() {
        let result = ReferenceMonitor::new(constant_map(2, 0.0), constant_map(4, 0.0));
        assert!(matches!(result, Err(PipelineError::Invariant(_))));
    }
}
