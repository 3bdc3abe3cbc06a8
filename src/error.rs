// Error Types
use std::path::PathBuf;

use thiserror::Error;

pub type PeResult<T> = Result<T, PeError>;

/// Every failure a processing element call can report.
///
/// All of them are deterministic validation failures: the call that raised
/// one left the simulator state untouched and produced no partial result.
#[derive(Debug, Error)]
pub enum PeError {
    /// Weight matrix dimensions differ from the configured crossbar.
    #[error(
        "weight matrix is {actual_rows}x{actual_columns}, crossbar is configured as {rows}x{columns}"
    )]
    Shape {
        rows: usize,
        columns: usize,
        actual_rows: usize,
        actual_columns: usize,
    },

    /// A weight, input or row index outside its representable range.
    #[error("{what} = {value} is outside the allowed range [0, {max}]")]
    Range { what: String, value: i128, max: u64 },

    #[error("{inputs} digital inputs supplied for {rows} selected rows")]
    LengthMismatch { inputs: usize, rows: usize },

    /// The crossbar (or its subtractor bank) cannot hold what was requested.
    #[error("{what} needs {required}, crossbar provides {available}")]
    Capacity {
        what: &'static str,
        required: u64,
        available: u64,
    },

    #[error("invalid configuration key `{key}`: {reason}")]
    InvalidConfig { key: &'static str, reason: String },

    #[error("failed to read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl PeError {
    pub(crate) fn range(what: impl Into<String>, value: impl Into<i128>, max: u64) -> Self {
        PeError::Range {
            what: what.into(),
            value: value.into(),
            max,
        }
    }

    pub(crate) fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        PeError::InvalidConfig {
            key,
            reason: reason.into(),
        }
    }
}
