//! In-memory `GraphStore` implementation, backed by `dashmap::DashMap`
//! per-collection tables. This is the only adapter this crate ships; a real
//! deployment would swap it for a driver against the actual graph database
//! without touching any caller of the `GraphStore` trait.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::model::{
    Attachment, BelongsToEdge, Channel, Drive, EdgeKind, FileEntity, Group, Key, Mail,
    Organization, PermissionEdge, Person, Record, RecordRelation, RecordType, ServiceType,
    SyncStateRow, SyncStatus, User, UserDriveEdge, ANYONE_KEY,
};

use super::{now, GraphStore, PrincipalKind, StoreError, Transaction};

/// Rows staged inside one `Transaction`, applied to the live tables on
/// commit and simply dropped on abort.
#[derive(Default)]
pub struct StagedWrites {
    users: Vec<User>,
    groups: Vec<Group>,
    people: Vec<Person>,
    organizations: Vec<Organization>,
    drives: Vec<Drive>,
    files: Vec<FileEntity>,
    mails: Vec<Mail>,
    attachments: Vec<Attachment>,
    records: Vec<Record>,
    record_relations: Vec<RecordRelation>,
    permissions: Vec<PermissionEdge>,
    belongs_to: Vec<BelongsToEdge>,
    user_drive_edges: Vec<UserDriveEdge>,
    /// Namespaced external-id -> key map, so that a batch transformer can
    /// wire edges between two rows staged earlier in the same transaction
    /// before either has been committed.
    pending_ids: HashMap<String, Key>,
}

#[derive(Default)]
pub struct InMemoryGraphStore {
    users: DashMap<Key, User>,
    users_by_external_id: DashMap<String, Key>,
    users_by_email: DashMap<String, Key>,

    groups: DashMap<Key, Group>,
    groups_by_external_id: DashMap<String, Key>,
    groups_by_email: DashMap<String, Key>,

    people: DashMap<Key, Person>,
    people_by_email: DashMap<String, Key>,

    organizations: DashMap<Key, Organization>,
    organizations_by_name: DashMap<String, Key>,

    drives: DashMap<Key, Drive>,
    drives_by_external_id: DashMap<String, Key>,

    files: DashMap<Key, FileEntity>,
    files_by_external_id: DashMap<String, Key>,

    mails: DashMap<Key, Mail>,
    mails_by_external_id: DashMap<String, Key>,

    attachments: DashMap<Key, Attachment>,
    attachments_by_external_id: DashMap<String, Key>,

    records: DashMap<Key, Record>,

    record_relations: DashMap<(Key, Key, crate::model::RelationType), ()>,
    permissions: DashMap<(Key, Key), crate::model::Role>,
    belongs_to: DashMap<(Key, Key, EdgeKind), Option<String>>,
    user_drive_edges: DashMap<(Key, Key), String>,

    sync_states: DashMap<(String, String), SyncStateRow>,
    channels: DashMap<String, Channel>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn resolve_by_external_id(
        &self,
        index: &DashMap<String, Key>,
        txn: &mut Transaction,
        namespace: &str,
        external_id: &str,
    ) -> Key {
        if let Some(existing) = index.get(external_id) {
            return *existing;
        }
        let pending_key = format!("{namespace}:{external_id}");
        if let Some(existing) = txn.staged.pending_ids.get(&pending_key) {
            return *existing;
        }
        let key = uuid::Uuid::new_v4();
        txn.staged.pending_ids.insert(pending_key, key);
        key
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn commit(&self, mut txn: Transaction) -> Result<(), StoreError> {
        for mut row in std::mem::take(&mut txn.staged.users) {
            self.users_by_external_id
                .insert(row.external_id.clone(), row.key);
            self.users_by_email.insert(row.email.clone(), row.key);
            row.created_at = row.created_at;
            self.users.insert(row.key, row);
        }
        for row in std::mem::take(&mut txn.staged.groups) {
            self.groups_by_external_id
                .insert(row.external_id.clone(), row.key);
            self.groups_by_email.insert(row.email.clone(), row.key);
            self.groups.insert(row.key, row);
        }
        for row in std::mem::take(&mut txn.staged.people) {
            self.people_by_email.insert(row.email.clone(), row.key);
            self.people.insert(row.key, row);
        }
        for row in std::mem::take(&mut txn.staged.organizations) {
            self.organizations_by_name.insert(row.name.clone(), row.key);
            self.organizations.insert(row.key, row);
        }
        for row in std::mem::take(&mut txn.staged.drives) {
            self.drives_by_external_id
                .insert(row.external_id.clone(), row.key);
            self.drives.insert(row.key, row);
        }
        for row in std::mem::take(&mut txn.staged.files) {
            self.files_by_external_id
                .insert(row.external_id.clone(), row.key);
            self.files.insert(row.key, row);
        }
        for row in std::mem::take(&mut txn.staged.mails) {
            self.mails_by_external_id
                .insert(row.external_id.clone(), row.key);
            self.mails.insert(row.key, row);
        }
        for row in std::mem::take(&mut txn.staged.attachments) {
            self.attachments_by_external_id
                .insert(row.external_id.clone(), row.key);
            self.attachments.insert(row.key, row);
        }
        for row in std::mem::take(&mut txn.staged.records) {
            self.records.insert(row.key, row);
        }
        for edge in std::mem::take(&mut txn.staged.record_relations) {
            if edge.from == edge.to {
                continue;
            }
            self.record_relations
                .insert((edge.from, edge.to, edge.relation_type), ());
        }
        for edge in std::mem::take(&mut txn.staged.permissions) {
            if edge.principal == edge.record {
                continue;
            }
            self.permissions.insert((edge.principal, edge.record), edge.role);
        }
        for edge in std::mem::take(&mut txn.staged.belongs_to) {
            self.belongs_to
                .insert((edge.user, edge.target, edge.entity_type), edge.role);
        }
        for edge in std::mem::take(&mut txn.staged.user_drive_edges) {
            self.user_drive_edges
                .insert((edge.user, edge.drive), edge.access_level);
        }

        txn.committed = true;
        Ok(())
    }

    async fn upsert_users(
        &self,
        rows: Vec<User>,
        txn: &mut Transaction,
    ) -> Result<Vec<Key>, StoreError> {
        let mut keys = Vec::with_capacity(rows.len());
        for mut row in rows {
            let key = self.resolve_by_external_id(
                &self.users_by_external_id,
                txn,
                "user",
                &row.external_id,
            );
            row.key = key;
            keys.push(key);
            txn.staged.users.push(row);
        }
        Ok(keys)
    }

    async fn upsert_groups(
        &self,
        rows: Vec<Group>,
        txn: &mut Transaction,
    ) -> Result<Vec<Key>, StoreError> {
        let mut keys = Vec::with_capacity(rows.len());
        for mut row in rows {
            let key = self.resolve_by_external_id(
                &self.groups_by_external_id,
                txn,
                "group",
                &row.external_id,
            );
            row.key = key;
            keys.push(key);
            txn.staged.groups.push(row);
        }
        Ok(keys)
    }

    async fn upsert_people(
        &self,
        rows: Vec<Person>,
        txn: &mut Transaction,
    ) -> Result<Vec<Key>, StoreError> {
        // Person keys are deterministic (sha256 of the email, see
        // permissions::people_key) so there's nothing to allocate here.
        let mut keys = Vec::with_capacity(rows.len());
        for row in rows {
            keys.push(row.key);
            txn.staged.people.push(row);
        }
        Ok(keys)
    }

    async fn upsert_organizations(
        &self,
        rows: Vec<Organization>,
        txn: &mut Transaction,
    ) -> Result<Vec<Key>, StoreError> {
        let mut keys = Vec::with_capacity(rows.len());
        for mut row in rows {
            let key = self.resolve_by_external_id(
                &self.organizations_by_name,
                txn,
                "org",
                &row.name,
            );
            row.key = key;
            keys.push(key);
            txn.staged.organizations.push(row);
        }
        Ok(keys)
    }

    async fn upsert_drives(
        &self,
        rows: Vec<Drive>,
        txn: &mut Transaction,
    ) -> Result<Vec<Key>, StoreError> {
        let mut keys = Vec::with_capacity(rows.len());
        for mut row in rows {
            let key = self.resolve_by_external_id(
                &self.drives_by_external_id,
                txn,
                "drive",
                &row.external_id,
            );
            row.key = key;
            keys.push(key);
            txn.staged.drives.push(row);
        }
        Ok(keys)
    }

    async fn upsert_files(
        &self,
        rows: Vec<FileEntity>,
        txn: &mut Transaction,
    ) -> Result<Vec<Key>, StoreError> {
        let mut keys = Vec::with_capacity(rows.len());
        for mut row in rows {
            let key = self.resolve_by_external_id(
                &self.files_by_external_id,
                txn,
                "file",
                &row.external_id,
            );
            row.key = key;
            keys.push(key);
            txn.staged.files.push(row);
        }
        Ok(keys)
    }

    async fn upsert_mails(
        &self,
        rows: Vec<Mail>,
        txn: &mut Transaction,
    ) -> Result<Vec<Key>, StoreError> {
        let mut keys = Vec::with_capacity(rows.len());
        for mut row in rows {
            let key = self.resolve_by_external_id(
                &self.mails_by_external_id,
                txn,
                "mail",
                &row.external_id,
            );
            row.key = key;
            keys.push(key);
            txn.staged.mails.push(row);
        }
        Ok(keys)
    }

    async fn upsert_attachments(
        &self,
        rows: Vec<Attachment>,
        txn: &mut Transaction,
    ) -> Result<Vec<Key>, StoreError> {
        let mut keys = Vec::with_capacity(rows.len());
        for mut row in rows {
            let key = self.resolve_by_external_id(
                &self.attachments_by_external_id,
                txn,
                "attachment",
                &row.external_id,
            );
            row.key = key;
            keys.push(key);
            txn.staged.attachments.push(row);
        }
        Ok(keys)
    }

    async fn upsert_records(
        &self,
        rows: Vec<Record>,
        txn: &mut Transaction,
    ) -> Result<Vec<Key>, StoreError> {
        // Records mirror an existing mail/file/attachment 1:1 — the caller
        // already knows the key, there's nothing to resolve.
        let mut keys = Vec::with_capacity(rows.len());
        for row in rows {
            keys.push(row.key);
            txn.staged.records.push(row);
        }
        Ok(keys)
    }

    async fn create_record_relations(
        &self,
        edges: Vec<RecordRelation>,
        txn: &mut Transaction,
    ) -> Result<(), StoreError> {
        txn.staged.record_relations.extend(edges);
        Ok(())
    }

    async fn create_permissions(
        &self,
        edges: Vec<PermissionEdge>,
        txn: &mut Transaction,
    ) -> Result<(), StoreError> {
        txn.staged.permissions.extend(edges);
        Ok(())
    }

    async fn create_belongs_to(
        &self,
        edges: Vec<BelongsToEdge>,
        txn: &mut Transaction,
    ) -> Result<(), StoreError> {
        txn.staged.belongs_to.extend(edges);
        Ok(())
    }

    async fn create_user_drive_edges(
        &self,
        edges: Vec<UserDriveEdge>,
        txn: &mut Transaction,
    ) -> Result<(), StoreError> {
        txn.staged.user_drive_edges.extend(edges);
        Ok(())
    }

    async fn get_user_by_external_id(&self, external_id: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .users_by_external_id
            .get(external_id)
            .and_then(|key| self.users.get(&key).map(|r| r.clone())))
    }

    async fn get_file_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<FileEntity>, StoreError> {
        Ok(self
            .files_by_external_id
            .get(external_id)
            .and_then(|key| self.files.get(&key).map(|r| r.clone())))
    }

    async fn get_mail_by_external_id(&self, external_id: &str) -> Result<Option<Mail>, StoreError> {
        Ok(self
            .mails_by_external_id
            .get(external_id)
            .and_then(|key| self.mails.get(&key).map(|r| r.clone())))
    }

    async fn get_attachment_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Attachment>, StoreError> {
        Ok(self
            .attachments_by_external_id
            .get(external_id)
            .and_then(|key| self.attachments.get(&key).map(|r| r.clone())))
    }

    async fn get_record(&self, key: Key) -> Result<Option<Record>, StoreError> {
        Ok(self.records.get(&key).map(|r| r.clone()))
    }

    async fn key_by_external_message_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Key>, StoreError> {
        Ok(self.mails_by_external_id.get(external_id).map(|k| *k))
    }

    async fn key_by_external_file_id(&self, external_id: &str) -> Result<Option<Key>, StoreError> {
        Ok(self.files_by_external_id.get(external_id).map(|k| *k))
    }

    async fn entity_id_by_email(
        &self,
        email: &str,
    ) -> Result<Option<(PrincipalKind, Key)>, StoreError> {
        if let Some(key) = self.users_by_email.get(email) {
            return Ok(Some((PrincipalKind::User, *key)));
        }
        if let Some(key) = self.groups_by_email.get(email) {
            return Ok(Some((PrincipalKind::Group, *key)));
        }
        if let Some(key) = self.people_by_email.get(email) {
            return Ok(Some((PrincipalKind::Person, *key)));
        }
        Ok(None)
    }

    async fn anyone_key(&self) -> Result<Key, StoreError> {
        if let Some(key) = self.people_by_email.get(ANYONE_KEY) {
            return Ok(*key);
        }
        let key = crate::permissions::people_key(ANYONE_KEY);
        self.people_by_email.insert(ANYONE_KEY.to_string(), key);
        self.people.insert(
            key,
            Person {
                key,
                email: ANYONE_KEY.to_string(),
            },
        );
        Ok(key)
    }

    async fn get_sync_state(
        &self,
        email: &str,
        service: &str,
    ) -> Result<Option<SyncStateRow>, StoreError> {
        Ok(self
            .sync_states
            .get(&(email.to_string(), service.to_string()))
            .map(|r| r.clone()))
    }

    async fn update_sync_state(
        &self,
        email: &str,
        service: &str,
        state: SyncStatus,
        last_token: Option<String>,
    ) -> Result<(), StoreError> {
        let key = (email.to_string(), service.to_string());
        let mut row = self
            .sync_states
            .get(&key)
            .map(|r| r.clone())
            .unwrap_or_else(|| SyncStateRow {
                email: email.to_string(),
                service: service.to_string(),
                sync_state: SyncStatus::NotStarted,
                last_token: None,
                updated_at: now(),
            });
        row.sync_state = state;
        if last_token.is_some() {
            row.last_token = last_token;
        }
        row.updated_at = now();
        self.sync_states.insert(key, row);
        Ok(())
    }

    async fn store_channel(&self, channel: Channel) -> Result<(), StoreError> {
        self.channels.insert(channel.channel_id.clone(), channel);
        Ok(())
    }

    async fn store_page_token(
        &self,
        channel_id: &str,
        resource_id: &str,
        email: &str,
        token: &str,
    ) -> Result<(), StoreError> {
        let mut chan = self
            .channels
            .get(channel_id)
            .map(|c| c.clone())
            .ok_or_else(|| {
                StoreError::Backend(format!("unknown channel {channel_id} for {email}/{resource_id}"))
            })?;
        chan.token = token.to_string();
        self.channels.insert(channel_id.to_string(), chan);
        Ok(())
    }

    async fn list_sync_states(&self) -> Result<Vec<SyncStateRow>, StoreError> {
        Ok(self.sync_states.iter().map(|e| e.value().clone()).collect())
    }

    async fn record_count_by_type(&self, record_type: RecordType) -> Result<usize, StoreError> {
        Ok(self
            .records
            .iter()
            .filter(|entry| entry.value().record_type == record_type)
            .count())
    }
}
