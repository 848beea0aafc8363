use thiserror::Error;

use crate::model::SyncStatus;
use crate::permissions::PermissionError;
use crate::provider::ProviderError;
use crate::store::StoreError;
use crate::transform::TransformError;
use crate::watch::WatchError;

/// The event side of the sync state-transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Start,
    Pause,
    Resume,
    Stop,
    InternalSuccess,
    InternalError,
}

/// A transition not present in the table above. A prior implementation
/// silently no-opped here; this crate surfaces it as a typed error instead
/// (recorded as a deliberate improvement in DESIGN.md) while the public
/// `start`/`pause`/`resume`/`stop` control surface still collapses it to
/// `false`.
#[derive(Debug, Error)]
#[error("illegal transition: {event:?} from {from:?}")]
pub struct TransitionError {
    pub from: SyncStatus,
    pub event: Event,
}

/// Errors surfaced by the Sync Controller (C6).
#[derive(Debug, Error)]
pub enum ControllerError {
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
    Transition(#[from] TransitionError),
}
