// 🚨 Error taxonomy
// Typed failures that travel inside anyhow::Error so callers can downcast.
//
// Soft failures (date lookup, row-level parse misses, match misses) never
// become errors; they are logged or routed to the Unmatched output instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    /// Results page for a draw could not be fetched. Fatal for the run.
    #[error("failed to fetch results page for draw {draw}: {reason}")]
    Fetch { draw: u32, reason: String },

    /// Required configuration is missing or invalid. Checked before any work.
    #[error("configuration error: {0}")]
    Config(String),

    /// A persisted row carries a value that cannot be read without coercion.
    #[error("{path}:{line}: malformed {field} value {value:?}")]
    DataFormat {
        path: String,
        line: u64,
        field: &'static str,
        value: String,
    },
}

impl IngestError {
    pub fn data_format(path: &str, line: u64, field: &'static str, value: &str) -> Self {
        IngestError::DataFormat {
            path: path.to_string(),
            line,
            field,
            value: value.to_string(),
        }
    }
}
