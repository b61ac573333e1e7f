use thiserror::Error;

/// Typed failures raised below the worker boundary. Workers hold plain
/// `anyhow::Result` and downcast only when a branch cares.
#[derive(Error, Debug)]
pub enum PulseError {
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
