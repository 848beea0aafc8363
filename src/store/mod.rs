//! Graph Store Adapter (C1).
//!
//! `GraphStore` is the typed upsert/edge-create contract the rest of the
//! crate is written against; the concrete graph database driver is an
//! external collaborator. `memory::InMemoryGraphStore` is the
//! one implementation this crate ships, used by its own tests and the CLI
//! demo binary.

pub mod error;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use error::StoreError;

use crate::model::{
    Attachment, BelongsToEdge, Channel, Drive, FileEntity, Group, Key, Mail, Organization,
    PermissionEdge, Person, Record, RecordRelation, ServiceType, SyncStateRow, SyncStatus, User,
    UserDriveEdge,
};

/// Which `users`/`groups`/`people` collection a resolved principal landed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrincipalKind {
    User,
    Group,
    Person,
}

/// A handle to one multi-collection transaction.
///
/// All vertex/edge writes made through the `GraphStore` methods that accept
/// `&mut Transaction` are staged here and only become visible to readers
/// once [`GraphStore::commit`] is called. Dropping a `Transaction` without
/// committing aborts it: nothing was ever written to the live store, so the
/// abort is free, but the drop still logs a warning the way an unused
/// `sqlx::Transaction` would silently roll back on drop.
pub struct Transaction {
    pub id: uuid::Uuid,
    committed: bool,
    pub(crate) staged: memory::StagedWrites,
}

impl Transaction {
    fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            committed: false,
            staged: memory::StagedWrites::default(),
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.committed {
            log::warn!("transaction {} dropped without commit; aborting", self.id);
        }
    }
}

/// Typed upsert/edge-create contract spanning the graph's vertex and edge
/// collections.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn begin_txn(&self) -> Transaction {
        Transaction::new()
    }

    async fn commit(&self, txn: Transaction) -> Result<(), StoreError>;

    /// Explicit abort. Equivalent to dropping the transaction, provided for
    /// callers that want to log their own reason.
    async fn abort(&self, txn: Transaction, reason: &str) -> Result<(), StoreError> {
        let _ = reason;
        drop(txn);
        Ok(())
    }

    async fn upsert_users(&self, rows: Vec<User>, txn: &mut Transaction) -> Result<Vec<Key>, StoreError>;
    async fn upsert_groups(&self, rows: Vec<Group>, txn: &mut Transaction) -> Result<Vec<Key>, StoreError>;
    async fn upsert_people(&self, rows: Vec<Person>, txn: &mut Transaction) -> Result<Vec<Key>, StoreError>;
    async fn upsert_organizations(
        &self,
        rows: Vec<Organization>,
        txn: &mut Transaction,
    ) -> Result<Vec<Key>, StoreError>;
    async fn upsert_drives(&self, rows: Vec<Drive>, txn: &mut Transaction) -> Result<Vec<Key>, StoreError>;
    async fn upsert_files(&self, rows: Vec<FileEntity>, txn: &mut Transaction) -> Result<Vec<Key>, StoreError>;
    async fn upsert_mails(&self, rows: Vec<Mail>, txn: &mut Transaction) -> Result<Vec<Key>, StoreError>;
    async fn upsert_attachments(
        &self,
        rows: Vec<Attachment>,
        txn: &mut Transaction,
    ) -> Result<Vec<Key>, StoreError>;
    async fn upsert_records(&self, rows: Vec<Record>, txn: &mut Transaction) -> Result<Vec<Key>, StoreError>;

    async fn create_record_relations(
        &self,
        edges: Vec<RecordRelation>,
        txn: &mut Transaction,
    ) -> Result<(), StoreError>;
    async fn create_permissions(
        &self,
        edges: Vec<PermissionEdge>,
        txn: &mut Transaction,
    ) -> Result<(), StoreError>;
    async fn create_belongs_to(
        &self,
        edges: Vec<BelongsToEdge>,
        txn: &mut Transaction,
    ) -> Result<(), StoreError>;
    async fn create_user_drive_edges(
        &self,
        edges: Vec<UserDriveEdge>,
        txn: &mut Transaction,
    ) -> Result<(), StoreError>;

    async fn get_user_by_external_id(&self, external_id: &str) -> Result<Option<User>, StoreError>;
    async fn get_file_by_external_id(&self, external_id: &str) -> Result<Option<FileEntity>, StoreError>;
    async fn get_mail_by_external_id(&self, external_id: &str) -> Result<Option<Mail>, StoreError>;
    async fn get_attachment_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Attachment>, StoreError>;
    async fn get_record(&self, key: Key) -> Result<Option<Record>, StoreError>;

    async fn key_by_external_message_id(&self, external_id: &str) -> Result<Option<Key>, StoreError>;
    async fn key_by_external_file_id(&self, external_id: &str) -> Result<Option<Key>, StoreError>;

    /// Resolve a principal email against `users`, then `groups`, then
    /// `people`, in that order.
    async fn entity_id_by_email(&self, email: &str) -> Result<Option<(PrincipalKind, Key)>, StoreError>;

    /// Well-known `anyone` vertex key, created lazily on first use.
    async fn anyone_key(&self) -> Result<Key, StoreError>;

    async fn get_sync_state(
        &self,
        email: &str,
        service: &str,
    ) -> Result<Option<SyncStateRow>, StoreError>;
    async fn update_sync_state(
        &self,
        email: &str,
        service: &str,
        state: SyncStatus,
        last_token: Option<String>,
    ) -> Result<(), StoreError>;

    /// Convenience wrapper scoping `update_sync_state` to a plain service.
    async fn update_service_sync_state(
        &self,
        email: &str,
        service: ServiceType,
        state: SyncStatus,
    ) -> Result<(), StoreError> {
        self.update_sync_state(email, &service.to_string(), state, None)
            .await
    }

    async fn store_channel(&self, channel: Channel) -> Result<(), StoreError>;
    async fn store_page_token(
        &self,
        channel_id: &str,
        resource_id: &str,
        email: &str,
        token: &str,
    ) -> Result<(), StoreError>;

    /// All persisted `syncStates` rows, used by the Orchestrator's crash
    /// recovery step to find orphaned `RUNNING` rows.
    async fn list_sync_states(&self) -> Result<Vec<SyncStateRow>, StoreError>;

    /// Every non-archived `mails`/`attachments`/`files` row has exactly one
    /// `records` row with the same key. Used by tests asserting that
    /// invariant holds after a sync run.
    async fn record_count_by_type(&self, record_type: crate::model::RecordType) -> Result<usize, StoreError>;
}

pub(crate) fn now() -> DateTime<Utc> {
    Utc::now()
}
