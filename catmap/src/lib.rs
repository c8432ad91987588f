//! Catalogue-to-map reduction pipeline.
//!
//! Streams a delimited galaxy shape catalogue, projects every object onto a
//! fixed-resolution sky grid, and reduces the stream into statistic maps:
//! overdensity, per-component mean ellipticity, matching inverse-variance
//! weights, and an updated validity mask. An optional monitor compares the
//! stream against reference maps and reports mismatch diagnostics.

pub mod accumulate;
pub mod catalog;
pub mod config;
pub mod error;
pub mod finalize;
pub mod pipeline;
pub mod validate;

pub use accumulate::ShearAccumulator;
pub use catalog::{CatalogReader, CatalogRecord, ColumnSelection, LineTokenizer, ZBounds};
pub use config::{Config, InputConfig, OutputConfig, TestConfig};
pub use error::PipelineError;
pub use finalize::FinalizedMaps;
pub use pipeline::{run, run_from_path, RunReport};
pub use validate::{MismatchRule, ReferenceMonitor, ValidationSummary};
