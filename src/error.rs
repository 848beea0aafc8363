//! Top-level error aggregation: a plain `thiserror` enum wrapping every
//! component's error type for library callers. This crate has no HTTP
//! boundary to render a response at; the CLI binary logs a `CoreError` at
//! error level and exits non-zero.

use thiserror::Error;

use crate::orchestrator::OrchestratorError;
use crate::permissions::PermissionError;
use crate::provider::ProviderError;
use crate::store::StoreError;
use crate::sync::ControllerError;
use crate::transform::TransformError;
use crate::watch::WatchError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Permission(#[from] PermissionError),
    #[error(transparent)]
    Watch(#[from] WatchError),
    #[error(transparent)]
    Controller(#[from] ControllerError),
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}
