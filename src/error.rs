//! Top-level error type for the identification pipeline.
//!
//! Each component (C1–C7) raises its own error enum; [`IdentifyError`]
//! aggregates them with `#[from]` so orchestrator code can use `?`
//! throughout, the same shape as the teacher's `ServerError` aggregating
//! per-stage pipeline errors.

use thiserror::Error;

use crate::fingerprint::FingerprintError;
use crate::repository::RepositoryError;
use crate::stashbox::RemoteError;

#[derive(Debug, Error)]
pub enum IdentifyError {
    #[error("fingerprint error: {0}")]
    Fingerprint(#[from] FingerprintError),

    #[error("repository error: {0}")]
    Repository(RepositoryError),

    #[error("remote registry error: {0}")]
    Remote(#[from] RemoteError),

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("operation cancelled")]
    Cancelled,
}

pub type IdentifyResult<T> = Result<T, IdentifyError>;
