//! Streaming per-pixel accumulation of catalogue records.
//!
//! The accumulator is the Accumulating state of the run: it owns the mask,
//! the per-pixel sums, and the optional redshift filter and validation
//! monitor. `finalize` consumes it, so the sums can only be rewritten into
//! statistics once and nothing can be accumulated afterwards.

use skymap::{PixelMap, SkyProjector};
use std::f64::consts::FRAC_PI_2;

use crate::catalog::{CatalogRecord, ZBounds};
use crate::error::PipelineError;
use crate::finalize::{FinalizedMaps, SumMaps};
use crate::validate::ReferenceMonitor;

/// Accumulates masked, redshift-filtered records into per-pixel sums.
pub struct ShearAccumulator {
    projector: SkyProjector,
    mask: PixelMap,
    z_bounds: Option<ZBounds>,
    rotation_offset_deg: f64,
    counts: PixelMap,
    sum_e1: PixelMap,
    sum_e2: PixelMap,
    sum_e1_sq: PixelMap,
    sum_e2_sq: PixelMap,
    monitor: Option<ReferenceMonitor>,
    records_seen: u64,
    records_kept: u64,
}

impl ShearAccumulator {
    /// Build an accumulator over the given grid and mask.
    ///
    /// All working maps are allocated zero-filled at the mask's resolution.
    pub fn new(projector: SkyProjector, mask: PixelMap) -> Result<Self, PipelineError> {
        if mask.len() != projector.n_pix() || mask.n_side() != projector.n_side() {
            return Err(PipelineError::Invariant(format!(
                "mask has {} pixels at n_side {}, but the grid expects {} at n_side {}",
                mask.len(),
                mask.n_side(),
                projector.n_pix(),
                projector.n_side()
            )));
        }
        let n_side = mask.n_side();
        Ok(Self {
            projector,
            mask,
            z_bounds: None,
            rotation_offset_deg: 0.0,
            counts: PixelMap::zeroed(n_side),
            sum_e1: PixelMap::zeroed(n_side),
            sum_e2: PixelMap::zeroed(n_side),
            sum_e1_sq: PixelMap::zeroed(n_side),
            sum_e2_sq: PixelMap::zeroed(n_side),
            monitor: None,
            records_seen: 0,
            records_kept: 0,
        })
    }

    /// Enable the redshift filter.
    pub fn with_z_bounds(mut self, bounds: ZBounds) -> Self {
        self.z_bounds = Some(bounds);
        self
    }

    /// Rotate longitudes by an offset in degrees before projection.
    pub fn with_rotation_offset(mut self, degrees: f64) -> Self {
        self.rotation_offset_deg = degrees;
        self
    }

    /// Attach a validation monitor; its reference maps must match the grid.
    pub fn with_monitor(mut self, monitor: ReferenceMonitor) -> Result<Self, PipelineError> {
        if monitor.reference_pixels() != self.projector.n_pix() {
            return Err(PipelineError::Invariant(format!(
                "reference maps have {} pixels, but the grid expects {}",
                monitor.reference_pixels(),
                self.projector.n_pix()
            )));
        }
        self.monitor = Some(monitor);
        Ok(self)
    }

    /// Sky cell a record projects to.
    fn project(&self, record: &CatalogRecord) -> usize {
        let colatitude = -record.dec.to_radians() + FRAC_PI_2;
        let longitude = (record.ra - self.rotation_offset_deg).to_radians();
        self.projector.project(colatitude, longitude)
    }

    /// Fold one record into the sums.
    ///
    /// The record is dropped unless its pixel is unmasked and, when bounds
    /// are configured, its redshift falls in `[lo, hi)`. Validation runs
    /// before accumulation, for included records only. Returns whether the
    /// record was kept.
    pub fn accumulate(&mut self, record: &CatalogRecord) -> bool {
        self.records_seen += 1;

        let pixel = self.project(record);
        if self.mask[pixel] <= 0.0 {
            return false;
        }
        if let Some(bounds) = self.z_bounds {
            if !bounds.contains(record.z) {
                return false;
            }
        }

        if let Some(monitor) = self.monitor.as_mut() {
            monitor.inspect(pixel, record.e1, record.e2);
        }

        self.counts[pixel] += 1.0;
        self.sum_e1[pixel] += record.e1;
        self.sum_e2[pixel] += record.e2;
        self.sum_e1_sq[pixel] += record.e1 * record.e1;
        self.sum_e2_sq[pixel] += record.e2 * record.e2;
        self.records_kept += 1;
        true
    }

    /// Fold another accumulator's sums into this one.
    ///
    /// Per-pixel updates are commutative and associative, so independent
    /// shards of the record stream may accumulate privately and merge here
    /// before finalization. Both shards must share grid, mask geometry, and
    /// validation configuration.
    pub fn merge(&mut self, other: &ShearAccumulator) -> Result<(), PipelineError> {
        if !self.mask.same_geometry(&other.mask) {
            return Err(PipelineError::Invariant(format!(
                "cannot merge shards with different geometry: n_side {} vs {}",
                self.mask.n_side(),
                other.mask.n_side()
            )));
        }
        match (self.monitor.as_mut(), other.monitor.as_ref()) {
            (Some(mine), Some(theirs)) => mine.absorb(theirs),
            (None, None) => {}
            _ => {
                return Err(PipelineError::Invariant(
                    "cannot merge shards with different validation configuration".into(),
                ))
            }
        }

        self.counts += &other.counts;
        self.sum_e1 += &other.sum_e1;
        self.sum_e2 += &other.sum_e2;
        self.sum_e1_sq += &other.sum_e1_sq;
        self.sum_e2_sq += &other.sum_e2_sq;
        self.records_seen += other.records_seen;
        self.records_kept += other.records_kept;
        Ok(())
    }

    /// Records offered to the accumulator so far.
    pub fn records_seen(&self) -> u64 {
        self.records_seen
    }

    /// Records that passed the filters.
    pub fn records_kept(&self) -> u64 {
        self.records_kept
    }

    /// True until the first record has been offered.
    pub fn is_empty(&self) -> bool {
        self.records_seen == 0
    }

    /// One-way transition to the Finalized state.
    ///
    /// Consumes the accumulator: the sums are destructively rewritten into
    /// statistics and no further accumulation is possible.
    pub fn finalize(self) -> Result<FinalizedMaps, PipelineError> {
        FinalizedMaps::from_sums(SumMaps {
            mask: self.mask,
            counts: self.counts,
            sum_e1: self.sum_e1,
            sum_e2: self.sum_e2,
            sum_e1_sq: self.sum_e1_sq,
            sum_e2_sq: self.sum_e2_sq,
            monitor: self.monitor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const N_SIDE: u32 = 8;

    fn record(ra: f64, dec: f64, z: f64, e1: f64, e2: f64) -> CatalogRecord {
        CatalogRecord { ra, dec, z, e1, e2 }
    }

    fn ones_mask() -> PixelMap {
        let mut mask = PixelMap::zeroed(N_SIDE);
        for pixel in 0..mask.len() {
            mask[pixel] = 1.0;
        }
        mask
    }

    fn accumulator() -> ShearAccumulator {
        ShearAccumulator::new(SkyProjector::new(N_SIDE).unwrap(), ones_mask()).unwrap()
    }

    fn pixel_of(ra: f64, dec: f64) -> usize {
        let projector = SkyProjector::new(N_SIDE).unwrap();
        projector.project(-dec.to_radians() + FRAC_PI_2, ra.to_radians())
    }

    #[test]
    fn test_masked_pixel_takes_no_contribution() {
        let target = pixel_of(10.0, 10.0);
        let mut mask = ones_mask();
        mask[target] = 0.0;

        let mut acc =
            ShearAccumulator::new(SkyProjector::new(N_SIDE).unwrap(), mask).unwrap();
        assert!(!acc.accumulate(&record(10.0, 10.0, 0.5, 0.25, 0.5)));
        assert!(acc.accumulate(&record(100.0, -40.0, 0.5, 0.25, 0.5)));
        assert_eq!(acc.records_seen(), 2);
        assert_eq!(acc.records_kept(), 1);
    }

    #[test]
    fn test_redshift_filter_boundaries() {
        let mut acc = accumulator().with_z_bounds(ZBounds::new(1.0, 2.0).unwrap());
        assert!(!acc.accumulate(&record(10.0, 10.0, 0.9, 0.25, 0.5)));
        assert!(acc.accumulate(&record(10.0, 10.0, 1.0, 0.25, 0.5)));
        assert!(!acc.accumulate(&record(10.0, 10.0, 2.0, 0.25, 0.5)));
        assert!(acc.accumulate(&record(10.0, 10.0, 1.5, 0.25, 0.5)));
        assert_eq!(acc.records_kept(), 2);
    }

    #[test]
    fn test_accumulation_is_order_independent() {
        // Exactly representable values keep the sums order-exact.
        let records = [
            record(10.0, 10.0, 0.5, 0.25, 0.5),
            record(10.0, 10.0, 0.5, 0.75, 0.25),
            record(10.0, 10.0, 0.5, 1.5, -0.5),
            record(100.0, -40.0, 0.5, 0.5, 0.125),
            record(100.0, -40.0, 0.5, 1.0, 0.375),
        ];

        let mut forward = accumulator();
        for r in &records {
            forward.accumulate(r);
        }
        let mut backward = accumulator();
        for r in records.iter().rev() {
            backward.accumulate(r);
        }

        let forward = forward.finalize().unwrap();
        let backward = backward.finalize().unwrap();
        for pixel in 0..forward.overdensity().len() {
            assert_eq!(forward.overdensity()[pixel], backward.overdensity()[pixel]);
            assert_eq!(forward.mean_e1()[pixel], backward.mean_e1()[pixel]);
            assert_eq!(forward.inv_var_e2()[pixel], backward.inv_var_e2()[pixel]);
        }
    }

    #[test]
    fn test_shard_merge_matches_single_pass() {
        let records = [
            record(10.0, 10.0, 0.5, 0.25, 0.5),
            record(10.0, 10.0, 0.5, 0.75, 0.25),
            record(100.0, -40.0, 0.5, 0.5, 0.125),
            record(100.0, -40.0, 0.5, 1.0, 0.375),
        ];

        let mut whole = accumulator();
        for r in &records {
            whole.accumulate(r);
        }

        let mut left = accumulator();
        let mut right = accumulator();
        for r in &records[..2] {
            left.accumulate(r);
        }
        for r in &records[2..] {
            right.accumulate(r);
        }
        left.merge(&right).unwrap();
        assert_eq!(left.records_seen(), 4);

        let whole = whole.finalize().unwrap();
        let merged = left.finalize().unwrap();
        assert_relative_eq!(whole.n_bar(), merged.n_bar());
        for pixel in 0..whole.overdensity().len() {
            assert_eq!(whole.overdensity()[pixel], merged.overdensity()[pixel]);
            assert_eq!(whole.mean_e2()[pixel], merged.mean_e2()[pixel]);
        }
    }

    #[test]
    fn test_merge_rejects_mismatched_geometry() {
        let mut coarse = ShearAccumulator::new(
            SkyProjector::new(4).unwrap(),
            PixelMap::from_values(4, vec![1.0; 192]).unwrap(),
        )
        .unwrap();
        let fine = accumulator();
        assert!(matches!(
            coarse.merge(&fine),
            Err(PipelineError::Invariant(_))
        ));
    }

    #[test]
    fn test_rotation_offset_shifts_longitude() {
        // Unmask only the cell ra=40, dec=10 projects to; a 30 degree offset
        // must make ra=70 land there and ra=40 land elsewhere.
        let target = pixel_of(40.0, 10.0);
        let mut mask = PixelMap::zeroed(N_SIDE);
        mask[target] = 1.0;

        let mut rotated = ShearAccumulator::new(SkyProjector::new(N_SIDE).unwrap(), mask)
            .unwrap()
            .with_rotation_offset(30.0);
        assert!(rotated.accumulate(&record(70.0, 10.0, 0.5, 0.25, 0.5)));
        assert!(!rotated.accumulate(&record(40.0, 10.0, 0.5, 0.25, 0.5)));
    }
}
