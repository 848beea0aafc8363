use thiserror::Error;

use crate::provider::ProviderError;
use crate::store::StoreError;

/// Errors surfaced by the Watch Bootstrapper (C7).
#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
