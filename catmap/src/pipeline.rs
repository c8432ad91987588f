//! Run orchestration: config → mask → stream → finalize → write.

use log::{debug, info};
use skymap::{PixelMap, SkyProjector};
use std::path::Path;

use crate::accumulate::ShearAccumulator;
use crate::catalog::{CatalogReader, LineTokenizer};
use crate::config::Config;
use crate::error::PipelineError;
use crate::finalize::FinalizedMaps;
use crate::validate::{ReferenceMonitor, ValidationSummary};

/// Records between progress log lines.
const PROGRESS_EVERY: u64 = 1_000_000;

/// Data-map channel holding the first mean-ellipticity map.
const REFERENCE_E1_CHANNEL: usize = 2;
/// Data-map channel holding the second mean-ellipticity map.
const REFERENCE_E2_CHANNEL: usize = 3;

/// Totals reported after a completed run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunReport {
    pub records_seen: u64,
    pub records_kept: u64,
    pub observed_pixels: usize,
    pub n_bar: f64,
    pub validation: Option<ValidationSummary>,
}

/// Load a configuration file and execute the run it describes.
pub fn run_from_path(config_path: &Path) -> Result<RunReport, PipelineError> {
    let config = Config::load(config_path)?;
    run(&config)
}

/// Execute a full reduction run.
pub fn run(config: &Config) -> Result<RunReport, PipelineError> {
    let projector = SkyProjector::new(config.output.n_side)
        .map_err(|err| PipelineError::Invariant(err.to_string()))?;
    info!(
        "output resolution n_side {} ({} pixels)",
        config.output.n_side,
        projector.n_pix()
    );

    let mask = read_map_checked("mask", &config.input.mask_file, 1)?;
    if mask.n_side() != config.output.n_side {
        return Err(PipelineError::Invariant(format!(
            "mask file {} has n_side {}, configuration expects {}",
            config.input.mask_file.display(),
            mask.n_side(),
            config.output.n_side
        )));
    }

    let mut accumulator = ShearAccumulator::new(projector, mask)?
        .with_rotation_offset(config.input.rotation_offset_deg);
    if let Some(bounds) = config.output.z_bounds {
        info!(
            "redshift filter active: [{}, {})",
            bounds.lo(),
            bounds.hi()
        );
        accumulator = accumulator.with_z_bounds(bounds);
    }
    if let Some(test) = &config.test {
        info!("validating against {}", test.map_file.display());
        let reference_e1 = read_map_checked("reference", &test.map_file, REFERENCE_E1_CHANNEL)?;
        let reference_e2 = read_map_checked("reference", &test.map_file, REFERENCE_E2_CHANNEL)?;
        accumulator =
            accumulator.with_monitor(ReferenceMonitor::new(reference_e1, reference_e2)?)?;
    }

    info!(
        "accumulating objects from {} (skipping {} header rows)",
        config.input.catalogue_file.display(),
        config.input.skip_rows
    );
    let tokenizer = LineTokenizer::new(config.input.delimiter, config.input.columns);
    {
        let reader = CatalogReader::open(
            &config.input.catalogue_file,
            config.input.skip_rows,
            tokenizer,
        )?;
        for record in reader {
            accumulator.accumulate(&record?);
            if accumulator.records_seen() % PROGRESS_EVERY == 0 {
                debug!("{} records processed", accumulator.records_seen());
            }
        }
        // The catalogue handle is released here on every exit path; the `?`
        // above drops the reader before the error propagates.
    }
    let records_seen = accumulator.records_seen();
    let records_kept = accumulator.records_kept();
    info!("{records_seen} records read, {records_kept} accumulated");

    let maps = accumulator.finalize()?;
    let report = RunReport {
        records_seen,
        records_kept,
        observed_pixels: maps.observed_pixels(),
        n_bar: maps.n_bar(),
        validation: maps.validation().copied(),
    };
    info!(
        "{} pixels observed, mean count {:.6}",
        report.observed_pixels, report.n_bar
    );
    if let Some(validation) = &report.validation {
        info!(
            "validation: mismatch fractions e1 {:.6e}, e2 {:.6e}; sky fraction {:.6}",
            validation.mismatch_fraction_e1,
            validation.mismatch_fraction_e2,
            validation.sky_fraction
        );
    }

    write_outputs(config, &maps)?;
    Ok(report)
}

fn write_outputs(config: &Config, maps: &FinalizedMaps) -> Result<(), PipelineError> {
    let overwrite = config.output.overwrite;

    skymap::write_maps(
        &config.output.data_map_file,
        overwrite,
        &[
            ("N", maps.overdensity()),
            ("E1", maps.mean_e1()),
            ("E2", maps.mean_e2()),
        ],
    )?;
    skymap::write_maps(
        &config.output.augmented_mask_file,
        overwrite,
        &[("MASK", maps.mask())],
    )?;
    skymap::write_maps(
        &config.output.n_inv_map_file,
        overwrite,
        &[
            ("E1_INVVAR", maps.inv_var_e1()),
            ("E2_INVVAR", maps.inv_var_e2()),
            ("N_INVVAR", maps.number_inv_var()),
        ],
    )?;

    info!(
        "maps written to {}, {}, {}",
        config.output.data_map_file.display(),
        config.output.augmented_mask_file.display(),
        config.output.n_inv_map_file.display()
    );
    Ok(())
}

/// Read one map channel, reporting a missing file as an open failure rather
/// than a codec error.
fn read_map_checked(
    role: &'static str,
    path: &Path,
    channel: usize,
) -> Result<PixelMap, PipelineError> {
    if !path.exists() {
        return Err(PipelineError::FileOpen {
            role,
            path: path.to_owned(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        });
    }
    Ok(skymap::read_map(path, channel)?)
}
