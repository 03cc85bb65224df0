use std::path::PathBuf;

use thiserror::Error;

/// Failures the bridge can observe. None of them is fatal to the turn loop:
/// callers log and keep polling.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The outbound command file could not be opened or written. The command is dropped.
    #[error("write to {path} failed: {source}")]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The inbound file could not be read. Treated as "no new data" by the turn loop.
    #[error("read from {path} failed: {source}")]
    ReadFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The decision-maker errored or returned nothing usable; the turn is skipped.
    #[error("decision failed: {0}")]
    DecisionFailure(String),

    /// Startup configuration is invalid (missing fallback context, bad pattern).
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl BridgeError {
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::WriteFailure {
            path: path.into(),
            source,
        }
    }

    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadFailure {
            path: path.into(),
            source,
        }
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
