//! Catalogue records and the streaming line tokenizer.
//!
//! A catalogue is a delimited text file with one object per line. The
//! tokenizer addresses five numeric columns by index and refuses truncated
//! lines outright; the reader owns the file handle, skips the configured
//! header rows, and yields records until the stream is exhausted or a fatal
//! parse error surfaces.

use log::debug;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::error::PipelineError;

/// One catalogue object: sky position, redshift, and shape components.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CatalogRecord {
    /// Right ascension in degrees.
    pub ra: f64,
    /// Declination in degrees.
    pub dec: f64,
    /// Redshift (distance proxy).
    pub z: f64,
    /// First ellipticity component.
    pub e1: f64,
    /// Second ellipticity component.
    pub e2: f64,
}

/// Zero-based column indices of the five record fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSelection {
    pub ra: usize,
    pub dec: usize,
    pub z: usize,
    pub e1: usize,
    pub e2: usize,
}

impl ColumnSelection {
    /// Highest column index addressed by any field.
    pub fn max_index(&self) -> usize {
        self.ra.max(self.dec).max(self.z).max(self.e1).max(self.e2)
    }
}

/// Half-open redshift interval `[lo, hi)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZBounds {
    lo: f64,
    hi: f64,
}

impl ZBounds {
    /// Build bounds, rejecting an inverted or empty interval.
    pub fn new(lo: f64, hi: f64) -> Result<Self, PipelineError> {
        if !(lo < hi) {
            return Err(PipelineError::Invariant(format!(
                "inverted redshift bounds: [{lo}, {hi})"
            )));
        }
        Ok(Self { lo, hi })
    }

    /// Lower bound (inclusive).
    pub fn lo(&self) -> f64 {
        self.lo
    }

    /// Upper bound (exclusive).
    pub fn hi(&self) -> f64 {
        self.hi
    }

    /// True when `z` falls inside the interval.
    pub fn contains(&self, z: f64) -> bool {
        self.lo <= z && z < self.hi
    }
}

/// Tokenization failure on a single line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenizeError {
    #[error("expected at least {needed} fields, found {found}")]
    TooFewFields { needed: usize, found: usize },
    #[error("invalid numeric value '{token}' in column {column}")]
    BadNumber { column: usize, token: String },
}

/// Splits one catalogue line into a record.
#[derive(Debug, Clone, Copy)]
pub struct LineTokenizer {
    delimiter: char,
    columns: ColumnSelection,
}

impl LineTokenizer {
    pub fn new(delimiter: char, columns: ColumnSelection) -> Self {
        Self { delimiter, columns }
    }

    pub fn columns(&self) -> &ColumnSelection {
        &self.columns
    }

    /// Tokenize one line.
    ///
    /// A line that is empty after trimming yields `Ok(None)`. A non-empty
    /// line with fewer tokens than the highest configured column index
    /// requires is an error; truncation never passes silently.
    pub fn tokenize(&self, line: &str) -> Result<Option<CatalogRecord>, TokenizeError> {
        if line.trim().is_empty() {
            return Ok(None);
        }

        let fields: Vec<&str> = line.split(self.delimiter).collect();
        let needed = self.columns.max_index() + 1;
        if fields.len() < needed {
            return Err(TokenizeError::TooFewFields {
                needed,
                found: fields.len(),
            });
        }

        let number = |column: usize| -> Result<f64, TokenizeError> {
            let token = fields[column].trim();
            token.parse().map_err(|_| TokenizeError::BadNumber {
                column,
                token: token.to_string(),
            })
        };

        Ok(Some(CatalogRecord {
            ra: number(self.columns.ra)?,
            dec: number(self.columns.dec)?,
            z: number(self.columns.z)?,
            e1: number(self.columns.e1)?,
            e2: number(self.columns.e2)?,
        }))
    }
}

/// Streaming record reader over a catalogue file.
///
/// Owns the underlying file handle; dropping the reader (on any exit path,
/// including the fatal one) releases the stream.
#[derive(Debug)]
pub struct CatalogReader {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    tokenizer: LineTokenizer,
    skip_rows: usize,
    line_number: usize,
}

impl CatalogReader {
    /// Open a catalogue for streaming.
    pub fn open(
        path: &Path,
        skip_rows: usize,
        tokenizer: LineTokenizer,
    ) -> Result<Self, PipelineError> {
        let file = File::open(path).map_err(|source| PipelineError::FileOpen {
            role: "catalogue",
            path: path.to_owned(),
            source,
        })?;
        Ok(Self {
            path: path.to_owned(),
            lines: BufReader::new(file).lines(),
            tokenizer,
            skip_rows,
            line_number: 0,
        })
    }

    /// Number of the last line handed out, counting from 1.
    pub fn line_number(&self) -> usize {
        self.line_number
    }
}

impl Iterator for CatalogReader {
    type Item = Result<CatalogRecord, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(source) => {
                    return Some(Err(PipelineError::FileOpen {
                        role: "catalogue",
                        path: self.path.clone(),
                        source,
                    }))
                }
            };
            self.line_number += 1;

            if self.line_number <= self.skip_rows {
                debug!("skipping header line {}", self.line_number);
                continue;
            }

            match self.tokenizer.tokenize(&line) {
                Ok(None) => continue,
                Ok(Some(record)) => return Some(Ok(record)),
                Err(err) => {
                    return Some(Err(PipelineError::Parse {
                        path: self.path.clone(),
                        line: self.line_number,
                        message: err.to_string(),
                    }))
                }
            }
        }
    }
}
