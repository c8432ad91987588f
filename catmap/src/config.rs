//! Run configuration.
//!
//! The configuration file is TOML with `[input]`, `[output]`, and optional
//! `[test]` sections. Raw serde structs mirror the file keys one-to-one;
//! they are validated once at startup into the typed `Config` the rest of
//! the pipeline consumes, so every required field fails fast by name and no
//! string-keyed lookups survive past loading.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::catalog::{ColumnSelection, ZBounds};
use crate::error::PipelineError;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    input: RawInput,
    output: RawOutput,
    test: Option<RawTest>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawInput {
    catalogue_file_name: PathBuf,
    skip_rows: usize,
    delimiter: String,
    col_ra: usize,
    col_dec: usize,
    col_z: usize,
    col_ellip_1: usize,
    col_ellip_2: usize,
    mask_file_name: PathBuf,
    #[serde(default)]
    rotation_offset_deg: f64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOutput {
    n_side: u32,
    data_map_file_name: PathBuf,
    augmented_mask_file_name: PathBuf,
    #[serde(rename = "nInv_map_file_name")]
    n_inv_map_file_name: PathBuf,
    z_bounds: Option<String>,
    #[serde(default = "default_overwrite")]
    overwrite: bool,
}

fn default_overwrite() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTest {
    map_file_name: PathBuf,
}

/// Validated input settings.
#[derive(Debug, Clone)]
pub struct InputConfig {
    pub catalogue_file: PathBuf,
    pub skip_rows: usize,
    pub delimiter: char,
    pub columns: ColumnSelection,
    pub mask_file: PathBuf,
    pub rotation_offset_deg: f64,
}

/// Validated output settings.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub n_side: u32,
    pub data_map_file: PathBuf,
    pub augmented_mask_file: PathBuf,
    pub n_inv_map_file: PathBuf,
    pub z_bounds: Option<ZBounds>,
    pub overwrite: bool,
}

/// Validated validation settings.
#[derive(Debug, Clone)]
pub struct TestConfig {
    pub map_file: PathBuf,
}

/// Complete, validated run configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub input: InputConfig,
    pub output: OutputConfig,
    pub test: Option<TestConfig>,
}

impl Config {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = fs::read_to_string(path).map_err(|source| PipelineError::FileOpen {
            role: "configuration",
            path: path.to_owned(),
            source,
        })?;
        let raw: RawConfig =
            toml::from_str(&text).map_err(|err| PipelineError::Config {
                path: path.to_owned(),
                message: err.message().to_string(),
            })?;
        Self::validate(raw, path)
    }

    fn validate(raw: RawConfig, path: &Path) -> Result<Self, PipelineError> {
        let config_error = |message: String| PipelineError::Config {
            path: path.to_owned(),
            message,
        };

        let mut delimiter_chars = raw.input.delimiter.chars();
        let delimiter = match (delimiter_chars.next(), delimiter_chars.next()) {
            (Some(c), None) => c,
            _ => {
                return Err(config_error(format!(
                    "input.delimiter must be a single character, got '{}'",
                    raw.input.delimiter
                )))
            }
        };

        let n_side = raw.output.n_side;
        if n_side == 0 || n_side > (1 << 29) || !n_side.is_power_of_two() {
            return Err(config_error(format!(
                "output.n_side must be a power of two in [1, 2^29], got {n_side}"
            )));
        }

        let z_bounds = raw
            .output
            .z_bounds
            .as_deref()
            .map(parse_z_bounds)
            .transpose()?;

        Ok(Self {
            input: InputConfig {
                catalogue_file: raw.input.catalogue_file_name,
                skip_rows: raw.input.skip_rows,
                delimiter,
                columns: ColumnSelection {
                    ra: raw.input.col_ra,
                    dec: raw.input.col_dec,
                    z: raw.input.col_z,
                    e1: raw.input.col_ellip_1,
                    e2: raw.input.col_ellip_2,
                },
                mask_file: raw.input.mask_file_name,
                rotation_offset_deg: raw.input.rotation_offset_deg,
            },
            output: OutputConfig {
                n_side,
                data_map_file: raw.output.data_map_file_name,
                augmented_mask_file: raw.output.augmented_mask_file_name,
                n_inv_map_file: raw.output.n_inv_map_file_name,
                z_bounds,
                overwrite: raw.output.overwrite,
            },
            test: raw.test.map(|t| TestConfig {
                map_file: t.map_file_name,
            }),
        })
    }
}

/// Parse a `"lo,hi"` redshift interval.
///
/// A missing half, a non-numeric bound, or an inverted interval violates the
/// run's invariants rather than the file syntax.
fn parse_z_bounds(text: &str) -> Result<ZBounds, PipelineError> {
    let invalid = || {
        PipelineError::Invariant(format!(
            "redshift bounds '{text}' must be 'lo,hi' with numeric lo < hi"
        ))
    };

    let (lo, hi) = text.split_once(',').ok_or_else(invalid)?;
    let lo: f64 = lo.trim().parse().map_err(|_| invalid())?;
    let hi: f64 = hi.trim().parse().map_err(|_| invalid())?;
    ZBounds::new(lo, hi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const COMPLETE: &str = r#"
[input]
catalogue_file_name = "catalogue.txt"
skip_rows = 1
delimiter = ","
col_ra = 0
col_dec = 1
col_z = 2
col_ellip_1 = 3
col_ellip_2 = 4
mask_file_name = "mask.fits"

[output]
n_side = 256
data_map_file_name = "data.fits"
augmented_mask_file_name = "mask_out.fits"
nInv_map_file_name = "ninv.fits"
z_bounds = "0.5,1.5"

[test]
map_file_name = "reference.fits"
"#;

    fn write_config(text: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(text.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn test_complete_config_loads() {
        let (_dir, path) = write_config(COMPLETE);
        let config = Config::load(&path).unwrap();

        assert_eq!(config.input.skip_rows, 1);
        assert_eq!(config.input.delimiter, ',');
        assert_eq!(config.input.columns.e2, 4);
        assert_eq!(config.input.rotation_offset_deg, 0.0);
        assert_eq!(config.output.n_side, 256);
        assert!(config.output.overwrite);
        let bounds = config.output.z_bounds.unwrap();
        assert_eq!(bounds.lo(), 0.5);
        assert_eq!(bounds.hi(), 1.5);
        assert_eq!(
            config.test.unwrap().map_file,
            PathBuf::from("reference.fits")
        );
    }

    #[test]
    fn test_missing_key_fails_by_name() {
        let trimmed = COMPLETE.replace("delimiter = \",\"\n", "");
        let (_dir, path) = write_config(&trimmed);
        let err = Config::load(&path).unwrap_err();
        match err {
            PipelineError::Config { message, .. } => assert!(message.contains("delimiter")),
            other => panic!("expected a config error, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_key_rejected() {
        let extended = COMPLETE.replace("skip_rows = 1", "skip_rows = 1\nskip_cols = 2");
        let (_dir, path) = write_config(&extended);
        assert!(matches!(
            Config::load(&path),
            Err(PipelineError::Config { .. })
        ));
    }

    #[test]
    fn test_multi_character_delimiter_rejected() {
        let bad = COMPLETE.replace("delimiter = \",\"", "delimiter = \",;\"");
        let (_dir, path) = write_config(&bad);
        let err = Config::load(&path).unwrap_err();
        match err {
            PipelineError::Config { message, .. } => assert!(message.contains("delimiter")),
            other => panic!("expected a config error, got {other:?}"),
        }
    }

    #[test]
    fn test_non_power_of_two_n_side_rejected() {
        let bad = COMPLETE.replace("n_side = 256", "n_side = 200");
        let (_dir, path) = write_config(&bad);
        let err = Config::load(&path).unwrap_err();
        match err {
            PipelineError::Config { message, .. } => assert!(message.contains("n_side")),
            other => panic!("expected a config error, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_z_bounds_is_invariant_violation() {
        for bad_bounds in ["1.0", "1.0,", "a,b", "2.0,1.0"] {
            let bad = COMPLETE.replace("z_bounds = \"0.5,1.5\"", &format!("z_bounds = \"{bad_bounds}\""));
            let (_dir, path) = write_config(&bad);
            assert!(
                matches!(Config::load(&path), Err(PipelineError::Invariant(_))),
                "bounds '{bad_bounds}' should violate the invariant"
            );
        }
    }

    #[test]
    fn test_z_bounds_and_test_section_are_optional() {
        let minimal = COMPLETE
            .replace("z_bounds = \"0.5,1.5\"\n", "")
            .replace("[test]\nmap_file_name = \"reference.fits\"\n", "");
        let (_dir, path) = write_config(&minimal);
        let config = Config::load(&path).unwrap();
        assert!(config.output.z_bounds.is_none());
        assert!(config.test.is_none());
    }
}
