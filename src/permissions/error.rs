use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum PermissionError {
    #[error(transparent)]
    Store(#[from] StoreError),
}
