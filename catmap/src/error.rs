//! Fatal error taxonomy for a reduction run.
//!
//! Every fatal kind carries enough context to be reported once at the point
//! of detection and maps to its own process exit status; validation
//! mismatches are not errors and are aggregated by the monitor instead.

use std::path::PathBuf;
use thiserror::Error;

/// A fatal condition that aborts the run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing or malformed configuration key.
    #[error("configuration error in {path}: {message}")]
    Config { path: PathBuf, message: String },

    /// Catalogue, mask, reference, or configuration file could not be read.
    #[error("failed to open {role} file {path}: {source}")]
    FileOpen {
        role: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed numeric token, or a column index past the parsed fields.
    #[error("parse error in {path} line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// A structural precondition of the reduction does not hold.
    #[error("invariant violation: {0}")]
    Invariant(String),

    /// Codec-level failure while reading or writing a map file.
    #[error(transparent)]
    MapIo(#[from] skymap::MapIoError),
}

impl PipelineError {
    /// Process exit status for this error kind.
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::Config { .. } => 2,
            PipelineError::FileOpen { .. } => 3,
            PipelineError::Parse { .. } => 4,
            PipelineError::Invariant(_) => 5,
            PipelineError::MapIo(_) => 6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_exit_codes_are_distinct_and_nonzero() {
        let errors = [
            PipelineError::Config {
                path: "run.toml".into(),
                message: "missing field `delimiter`".into(),
            },
            PipelineError::FileOpen {
                role: "catalogue",
                path: "cat.txt".into(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            },
            PipelineError::Parse {
                path: "cat.txt".into(),
                line: 3,
                message: "invalid numeric value 'x' in column 2".into(),
            },
            PipelineError::Invariant("no pixel survived finalization".into()),
            PipelineError::MapIo(skymap::MapIoError::NoChannels),
        ];

        let codes: HashSet<u8> = errors.iter().map(|e| e.exit_code()).collect();
        assert_eq!(codes.len(), errors.len());
        assert!(!codes.contains(&0));
    }

    #[test]
    fn test_messages_identify_the_offender() {
        let err = PipelineError::Parse {
            path: "cat.txt".into(),
            line: 42,
            message: "invalid numeric value 'nanx' in column 3".into(),
        };
        let text = err.to_string();
        assert!(text.contains("cat.txt"));
        assert!(text.contains("42"));
        assert!(text.contains("nanx"));
    }
}
