use thiserror::Error;

/// Errors surfaced by the Graph Store Adapter (C1).
///
/// Mirrors the shape of `search::SearchError` / `threading::cache::CacheError`
/// here: one variant per failure mode, propagated with `?` rather
/// than panicking.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transaction {0} was already committed or aborted")]
    TransactionClosed(uuid::Uuid),

    #[error("transaction aborted: {0}")]
    Aborted(String),

    #[error("unknown sync state row for {email}/{service}")]
    UnknownSyncState { email: String, service: String },

    #[error("backing store error: {0}")]
    Backend(String),
}
