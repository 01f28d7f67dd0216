use klinesync_core::{PipelineError, ValidationError};
use klinesync_store::StoreError;
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Pipeline(PipelineError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<PipelineError> for CliError {
    fn from(error: PipelineError) -> Self {
        match error {
            PipelineError::Config(error) => Self::Validation(error),
            PipelineError::Store(error) => Self::Store(error),
            other => Self::Pipeline(other),
        }
    }
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Pipeline(PipelineError::NoData { .. }) => 3,
            Self::Pipeline(PipelineError::DuplicateSource(_)) => 2,
            Self::Pipeline(_) => 6,
            Self::Serialization(_) => 4,
            Self::Store(_) | Self::Io(_) => 10,
        }
    }
}
