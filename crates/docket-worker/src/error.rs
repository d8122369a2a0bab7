use std::path::PathBuf;

use docket_broker::BrokerError;
use docket_core::AppError;
use thiserror::Error;

/// What the consume loop does with a message whose handling failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Malformed input. Log, acknowledge, never retry.
    Skip,
    /// Transient failure. Back off and handle the same message again without committing.
    Retry,
    /// The upload cannot proceed. Log and acknowledge; leftover state is left to the janitor.
    Abandon,
    /// Shutdown interrupted handling. Leave the message uncommitted and stop consuming.
    Stop,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to decode {kind} message: {source}")]
    Decode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode {kind} message: {source}")]
    Encode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("no usable destination for staged file {}", staged.display())]
    Destination { staged: PathBuf },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("store error: {0}")]
    Store(#[from] AppError),

    #[error("cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn disposition(&self) -> Disposition {
        match self {
            PipelineError::Decode { .. } => Disposition::Skip,
            PipelineError::Encode { .. } => Disposition::Abandon,
            PipelineError::Destination { .. } => Disposition::Abandon,
            PipelineError::Io { .. } => Disposition::Abandon,
            PipelineError::Broker(BrokerError::Decode(_)) => Disposition::Skip,
            PipelineError::Broker(BrokerError::Config(_)) => Disposition::Abandon,
            PipelineError::Broker(_) => Disposition::Retry,
            PipelineError::Store(_) => Disposition::Retry,
            PipelineError::Cancelled => Disposition::Stop,
        }
    }
}
