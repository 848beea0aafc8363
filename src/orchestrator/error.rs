use thiserror::Error;

use crate::provider::ProviderError;
use crate::store::StoreError;
use crate::sync::ControllerError;
use crate::watch::WatchError;

/// Errors surfaced by the Orchestrator (C8).
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Controller(#[from] ControllerError),
    #[error(transparent)]
    Watch(#[from] WatchError),
}
