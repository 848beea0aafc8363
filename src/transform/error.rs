use thiserror::Error;

use crate::permissions::PermissionError;
use crate::store::StoreError;

/// Errors surfaced by the Batch Transformer (C5).
#[derive(Debug, Error)]
pub enum TransformError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Permission(#[from] PermissionError),
}
