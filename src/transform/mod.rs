//! Batch Transformer (C5).
//!
//! Turns raw provider payloads into normalized `{entity, record, relations,
//! permissions}` tuples and stages them into a transaction, batch by batch,
//! the way a chunked bulk-import pipeline would.

mod error;

pub use error::TransformError;

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::model::{
    Attachment, Drive, FileEntity, FileHashes, IndexingStatus, Key, Mail, Record, RecordRelation,
    RecordTimestamps, RecordType, RelationType, UserDriveEdge,
};
use crate::permissions::{self, ObservedGrant};
use crate::provider::{AttachmentPayload, DriveInfo, FilePayload, MessagePayload, MessagePermissionGrant};
use crate::store::{GraphStore, Transaction};

const MAIL_MIME_TYPE: &str = "message/rfc822";

/// Whether a transformed record is newly created or a re-observation that
/// changed a writable attribute. Drives this crate's re-emission policy:
/// a pure re-observation with no change emits nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordChange {
    Created,
    Updated,
}

/// Everything the Sync Controller needs to build one event envelope for a
/// record the transformer just wrote.
#[derive(Debug, Clone)]
pub struct EmittableRecord {
    pub key: Key,
    pub record_type: RecordType,
    pub record_name: String,
    pub version: u32,
    pub mime_type: String,
    pub extension: Option<String>,
    pub thread_id: Option<String>,
    pub source_created: Option<DateTime<Utc>>,
    pub source_modified: Option<DateTime<Utc>>,
    pub change: RecordChange,
}

/// One mail thread's provider payloads, the atomic unit the C5
/// mail algorithm operates over (grouped, at the controller level, into
/// fixed-size batches of threads per commit — see `sync::MailBatchRunner`).
#[derive(Debug, Clone, Default)]
pub struct ThreadBatch {
    pub thread_id: String,
    pub messages: Vec<MessagePayload>,
    /// Keyed by the owning message's external id.
    pub attachments: HashMap<String, Vec<AttachmentPayload>>,
    pub permissions: Vec<MessagePermissionGrant>,
}

fn grants_from(principals: &[String], role: &str) -> Vec<ObservedGrant> {
    principals
        .iter()
        .map(|email| {
            if email.eq_ignore_ascii_case("anyone") {
                ObservedGrant::anyone()
            } else {
                ObservedGrant {
                    email: email.clone(),
                    role: role.to_string(),
                    is_anyone: false,
                }
            }
        })
        .collect()
}

/// Transform one mail thread into `mails`/`attachments`/`records` rows,
/// `SIBLING`/`ATTACHMENT` relations, and `HAS_ACCESS` permission edges,
/// staged into `txn`.
pub async fn transform_mail_thread(
    store: &dyn GraphStore,
    txn: &mut Transaction,
    connector_name: &str,
    thread: &ThreadBatch,
) -> Result<Vec<EmittableRecord>, TransformError> {
    let mut messages = thread.messages.clone();
    messages.sort_by_key(|m| m.internal_date);

    let mut outcomes = Vec::new();
    let mut message_keys: HashMap<String, Key> = HashMap::new();
    let mut previous_key: Option<Key> = None;

    for (idx, msg) in messages.iter().enumerate() {
        if let Some(existing) = store.get_mail_by_external_id(&msg.id).await? {
            // Re-observation: the first-seen winner stands;
            // no attribute rewrite, no version bump, no re-emit.
            message_keys.insert(msg.id.clone(), existing.key);
            previous_key = Some(existing.key);
            continue;
        }

        let now = crate::store::now();
        let mail_row = Mail {
            key: Key::new_v4(),
            external_id: msg.id.clone(),
            thread_id: msg.thread_id.clone(),
            is_parent: idx == 0,
            internal_date: msg.internal_date,
            subject: msg.headers.subject.clone(),
            date: msg.headers.date.unwrap_or(msg.internal_date),
            from: msg.headers.from.clone(),
            to: msg.headers.to.clone(),
            cc: msg.headers.cc.clone(),
            bcc: msg.headers.bcc.clone(),
            message_id_header: msg.headers.message_id.clone(),
            history_id: msg.history_id.clone(),
            web_url: msg.web_url.clone(),
            label_ids: msg.label_ids.clone(),
            last_sync_time: now,
        };
        // The store resolves external-id collisions internally; the key it
        // hands back, not the provisional one on `mail_row`, is what the
        // mirrored record and every edge must reference.
        let key = store.upsert_mails(vec![mail_row], txn).await?[0];

        let record = Record {
            key,
            record_name: msg.headers.subject.clone(),
            record_type: RecordType::Message,
            version: 1,
            timestamps: RecordTimestamps {
                created: now,
                updated: now,
                source_created: Some(msg.internal_date),
                source_modified: Some(msg.internal_date),
                last_sync: now,
            },
            external_record_id: msg.id.clone(),
            record_source: Record::RECORD_SOURCE.to_string(),
            connector_name: connector_name.to_string(),
            is_archived: false,
            indexing_status: IndexingStatus::NotStarted,
            extraction_status: IndexingStatus::NotStarted,
        };
        store.upsert_records(vec![record.clone()], txn).await?;

        if let Some(prev) = previous_key {
            if prev != key {
                store
                    .create_record_relations(
                        vec![RecordRelation {
                            from: prev,
                            to: key,
                            relation_type: RelationType::Sibling,
                        }],
                        txn,
                    )
                    .await?;
            }
        }

        message_keys.insert(msg.id.clone(), key);
        previous_key = Some(key);

        outcomes.push(EmittableRecord {
            key,
            record_type: RecordType::Message,
            record_name: record.record_name,
            version: record.version,
            mime_type: MAIL_MIME_TYPE.to_string(),
            extension: None,
            thread_id: Some(msg.thread_id.clone()),
            source_created: Some(msg.internal_date),
            source_modified: Some(msg.internal_date),
            change: RecordChange::Created,
        });
    }

    let mut attachment_keys: HashMap<String, Key> = HashMap::new();

    for (owning_message_id, attachments) in &thread.attachments {
        let Some(&message_key) = message_keys.get(owning_message_id) else {
            log::warn!(
                "thread {}: skipping attachments for unknown message {owning_message_id}",
                thread.thread_id
            );
            continue;
        };

        for att in attachments {
            let now = crate::store::now();
            let existing = store.get_attachment_by_external_id(&att.id).await?;
            let is_new = existing.is_none();

            let row = Attachment {
                key: existing.as_ref().map(|e| e.key).unwrap_or_else(Key::new_v4),
                external_id: att.id.clone(),
                message_id: message_key,
                mime_type: att.mime_type.clone(),
                filename: att.filename.clone(),
                size: att.size,
                web_url: att.web_url.clone(),
                last_sync_time: now,
            };
            let key = store.upsert_attachments(vec![row], txn).await?[0];
            attachment_keys.insert(att.id.clone(), key);

            store
                .create_record_relations(
                    vec![RecordRelation {
                        from: message_key,
                        to: key,
                        relation_type: RelationType::Attachment,
                    }],
                    txn,
                )
                .await?;

            if !is_new {
                // Already mirrored; nothing new to emit for a re-observed attachment.
                continue;
            }

            let record = Record {
                key,
                record_name: att.filename.clone(),
                record_type: RecordType::Attachment,
                version: 1,
                timestamps: RecordTimestamps {
                    created: now,
                    updated: now,
                    source_created: None,
                    source_modified: None,
                    last_sync: now,
                },
                external_record_id: att.id.clone(),
                record_source: Record::RECORD_SOURCE.to_string(),
                connector_name: connector_name.to_string(),
                is_archived: false,
                indexing_status: IndexingStatus::NotStarted,
                extraction_status: IndexingStatus::NotStarted,
            };
            store.upsert_records(vec![record.clone()], txn).await?;

            outcomes.push(EmittableRecord {
                key,
                record_type: RecordType::Attachment,
                record_name: record.record_name,
                version: record.version,
                mime_type: att.mime_type.clone(),
                extension: None,
                thread_id: Some(thread.thread_id.clone()),
                source_created: None,
                source_modified: None,
                change: RecordChange::Created,
            });
        }
    }

    // Permission resolution is scoped to this thread alone (never
    // accumulated across a user's whole sweep, per the Open Question
    // resolved in DESIGN.md).
    for grant in &thread.permissions {
        let Some(&message_key) = message_keys.get(&grant.message_id) else {
            log::warn!(
                "thread {}: permission grant for unknown message {}",
                thread.thread_id,
                grant.message_id
            );
            continue;
        };

        let grants = grants_from(&grant.principals, &grant.role);
        permissions::resolve_and_stage(store, txn, message_key, &grants).await?;

        for attachment_external_id in &grant.attachment_ids {
            let attachment_key = match attachment_keys.get(attachment_external_id) {
                Some(&key) => Some(key),
                None => store
                    .get_attachment_by_external_id(attachment_external_id)
                    .await?
                    .map(|a| a.key),
            };
            if let Some(attachment_key) = attachment_key {
                permissions::resolve_and_stage(store, txn, attachment_key, &grants).await?;
            }
        }
    }

    Ok(outcomes)
}

fn hashes_from(payload: &FilePayload) -> FileHashes {
    FileHashes {
        etag: payload.hashes.etag.clone(),
        ctag: payload.hashes.ctag.clone(),
        md5: payload.hashes.md5.clone(),
        sha1: payload.hashes.sha1.clone(),
        sha256: payload.hashes.sha256.clone(),
        xor: payload.hashes.quick_xor.clone(),
        crc32: payload.hashes.crc32.clone(),
    }
}

fn file_changed(existing: &FileEntity, payload: &FilePayload, hashes: &FileHashes) -> bool {
    existing.file_name != payload.name
        || existing.mime_type != payload.mime_type
        || existing.size_in_bytes != payload.size
        || existing.web_url != payload.web_view_link
        || &existing.hashes != hashes
        || existing.path != payload.path
}

/// Transform one batch of drive file/folder metadata into `files`/`records`
/// rows, `PARENT_CHILD` relations, and `HAS_ACCESS` permission edges.
///
pub async fn transform_drive_batch(
    store: &dyn GraphStore,
    txn: &mut Transaction,
    org_id: Key,
    connector_name: &str,
    files: &[FilePayload],
) -> Result<Vec<EmittableRecord>, TransformError> {
    let mut outcomes = Vec::new();
    let mut file_keys: HashMap<String, Key> = HashMap::new();

    for payload in files {
        let now = crate::store::now();
        let existing = store.get_file_by_external_id(&payload.id).await?;
        let hashes = hashes_from(payload);

        let (provisional_key, change) = match &existing {
            None => (Key::new_v4(), Some(RecordChange::Created)),
            Some(row) if file_changed(row, payload, &hashes) => (row.key, Some(RecordChange::Updated)),
            Some(row) => (row.key, None),
        };

        let Some(change) = change else {
            file_keys.insert(payload.id.clone(), provisional_key);
            continue;
        };

        let row = FileEntity {
            key: provisional_key,
            org_id,
            file_name: payload.name.clone(),
            is_file: !payload.is_folder,
            extension: payload.file_extension.clone(),
            mime_type: payload.mime_type.clone(),
            size_in_bytes: payload.size,
            web_url: payload.web_view_link.clone(),
            hashes: hashes.clone(),
            external_id: payload.id.clone(),
            path: payload.path.clone(),
        };
        // As above: the key the store resolves, not the provisional one,
        // is what the mirrored record, relations, and permissions use.
        let key = store.upsert_files(vec![row], txn).await?[0];
        file_keys.insert(payload.id.clone(), key);

        let version = match (&existing, change) {
            (Some(prior_record_lookup), RecordChange::Updated) => {
                match store.get_record(prior_record_lookup.key).await? {
                    Some(r) => r.version + 1,
                    None => 1,
                }
            }
            _ => 1,
        };

        let record = Record {
            key,
            record_name: payload.name.clone(),
            record_type: RecordType::File,
            version,
            timestamps: RecordTimestamps {
                created: now,
                updated: now,
                source_created: Some(payload.created_time),
                source_modified: Some(payload.modified_time),
                last_sync: now,
            },
            external_record_id: payload.id.clone(),
            record_source: Record::RECORD_SOURCE.to_string(),
            connector_name: connector_name.to_string(),
            is_archived: false,
            indexing_status: IndexingStatus::NotStarted,
            extraction_status: IndexingStatus::NotStarted,
        };
        store.upsert_records(vec![record.clone()], txn).await?;

        outcomes.push(EmittableRecord {
            key,
            record_type: RecordType::File,
            record_name: record.record_name,
            version: record.version,
            mime_type: payload.mime_type.clone(),
            extension: payload.file_extension.clone(),
            thread_id: None,
            source_created: Some(payload.created_time),
            source_modified: Some(payload.modified_time),
            change,
        });
    }

    for payload in files {
        let Some(&child_key) = file_keys.get(&payload.id) else {
            continue;
        };
        for parent_external_id in &payload.parents {
            let parent_key = match file_keys.get(parent_external_id) {
                Some(k) => Some(*k),
                None => store
                    .get_file_by_external_id(parent_external_id)
                    .await?
                    .map(|f| f.key),
            };
            let Some(parent_key) = parent_key else {
                log::warn!(
                    "file {}: missing parent {parent_external_id}, omitting PARENT_CHILD edge",
                    payload.id
                );
                continue;
            };
            if parent_key == child_key {
                continue;
            }
            store
                .create_record_relations(
                    vec![RecordRelation {
                        from: parent_key,
                        to: child_key,
                        relation_type: RelationType::ParentChild,
                    }],
                    txn,
                )
                .await?;
        }
    }

    // The permission list is read by reference only, never drained — see
    // the "pop side effect" ambiguity resolved in DESIGN.md.
    for payload in files {
        let Some(&file_key) = file_keys.get(&payload.id) else {
            continue;
        };
        let grants: Vec<ObservedGrant> = payload
            .permissions
            .iter()
            .map(|p| {
                if p.is_anyone {
                    ObservedGrant::anyone()
                } else {
                    ObservedGrant {
                        email: p.email.clone().unwrap_or_default(),
                        role: p.role.clone(),
                        is_anyone: false,
                    }
                }
            })
            .collect();
        if !grants.is_empty() {
            permissions::resolve_and_stage(store, txn, file_key, &grants).await?;
        }
    }

    Ok(outcomes)
}

/// Transform a drive's own identity: the `drives` vertex and the
/// `userDriveRelation` edge carrying its access level.
pub async fn transform_drive_vertex(
    store: &dyn GraphStore,
    txn: &mut Transaction,
    user_key: Key,
    info: &DriveInfo,
) -> Result<Key, TransformError> {
    let drive_row = Drive {
        key: Key::new_v4(),
        external_id: info.id.clone(),
        access_level: info.access_level.clone(),
    };
    let keys = store.upsert_drives(vec![drive_row], txn).await?;
    let drive_key = keys[0];

    store
        .create_user_drive_edges(
            vec![UserDriveEdge {
                user: user_key,
                drive: drive_key,
                access_level: info.access_level.clone(),
            }],
            txn,
        )
        .await?;

    Ok(drive_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MessageHeaders;
    use crate::store::memory::InMemoryGraphStore;
    use chrono::TimeZone;

    fn msg(id: &str, thread: &str, internal_date: i64, subject: &str) -> MessagePayload {
        MessagePayload {
            id: id.to_string(),
            thread_id: thread.to_string(),
            internal_date: Utc.timestamp_opt(internal_date, 0).unwrap(),
            label_ids: vec![],
            headers: MessageHeaders {
                subject: subject.to_string(),
                from: "alice@x.com".to_string(),
                to: vec!["bob@x.com".to_string()],
                cc: vec![],
                bcc: vec![],
                date: Some(Utc.timestamp_opt(internal_date, 0).unwrap()),
                message_id: format!("<{id}@x.com>"),
            },
            history_id: None,
            web_url: None,
        }
    }

    #[tokio::test]
    async fn thread_of_three_out_of_order_messages_chains_by_internal_date() {
        let store = InMemoryGraphStore::new();
        let mut txn = store.begin_txn().await;

        let mut attachments = HashMap::new();
        attachments.insert(
            "m2".to_string(),
            vec![AttachmentPayload {
                id: "a1".to_string(),
                message_id: "m2".to_string(),
                mime_type: "application/pdf".to_string(),
                filename: "doc.pdf".to_string(),
                size: 100,
                web_url: None,
            }],
        );

        let thread = ThreadBatch {
            thread_id: "T1".to_string(),
            messages: vec![msg("m1", "T1", 10, "s1"), msg("m2", "T1", 20, "s2"), msg("m3", "T1", 15, "s3")],
            attachments,
            permissions: vec![MessagePermissionGrant {
                message_id: "m2".to_string(),
                attachment_ids: vec!["a1".to_string()],
                role: "reader".to_string(),
                principals: vec!["alice@x.com".to_string(), "bob@x.com".to_string()],
            }],
        };

        let outcomes = transform_mail_thread(&store, &mut txn, "gmail", &thread)
            .await
            .unwrap();
        store.commit(txn).await.unwrap();

        assert_eq!(outcomes.len(), 4);
        assert_eq!(
            store.record_count_by_type(RecordType::Message).await.unwrap(),
            3
        );
        assert_eq!(
            store.record_count_by_type(RecordType::Attachment).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn mail_and_attachment_vertex_keys_equal_their_mirrored_record_keys() {
        let store = InMemoryGraphStore::new();
        let mut txn = store.begin_txn().await;

        let mut attachments = HashMap::new();
        attachments.insert(
            "m1".to_string(),
            vec![AttachmentPayload {
                id: "a1".to_string(),
                message_id: "m1".to_string(),
                mime_type: "application/pdf".to_string(),
                filename: "doc.pdf".to_string(),
                size: 100,
                web_url: None,
            }],
        );
        let thread = ThreadBatch {
            thread_id: "T1".to_string(),
            messages: vec![msg("m1", "T1", 10, "s1")],
            attachments,
            permissions: vec![],
        };

        transform_mail_thread(&store, &mut txn, "gmail", &thread)
            .await
            .unwrap();
        store.commit(txn).await.unwrap();

        let mail = store.get_mail_by_external_id("m1").await.unwrap().unwrap();
        assert!(store.get_record(mail.key).await.unwrap().is_some());

        let attachment = store.get_attachment_by_external_id("a1").await.unwrap().unwrap();
        assert!(store.get_record(attachment.key).await.unwrap().is_some());
        assert_ne!(mail.key, attachment.key);
    }

    #[tokio::test]
    async fn re_running_the_same_thread_allocates_no_new_keys() {
        let store = InMemoryGraphStore::new();
        let thread = ThreadBatch {
            thread_id: "T1".to_string(),
            messages: vec![msg("m1", "T1", 10, "s1")],
            attachments: HashMap::new(),
            permissions: vec![],
        };

        let mut txn1 = store.begin_txn().await;
        let first = transform_mail_thread(&store, &mut txn1, "gmail", &thread).await.unwrap();
        store.commit(txn1).await.unwrap();

        let mut txn2 = store.begin_txn().await;
        let second = transform_mail_thread(&store, &mut txn2, "gmail", &thread).await.unwrap();
        store.commit(txn2).await.unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 0);
        assert_eq!(
            store.record_count_by_type(RecordType::Message).await.unwrap(),
            1
        );
    }

    fn file(id: &str, parents: Vec<&str>) -> FilePayload {
        FilePayload {
            id: id.to_string(),
            name: format!("{id}.csv"),
            mime_type: "text/csv".to_string(),
            file_extension: Some("csv".to_string()),
            is_folder: false,
            size: 10,
            web_view_link: None,
            hashes: crate::provider::FileHashSet::default(),
            head_revision_id: None,
            created_time: Utc.timestamp_opt(0, 0).unwrap(),
            modified_time: Utc.timestamp_opt(0, 0).unwrap(),
            parents: parents.into_iter().map(String::from).collect(),
            permissions: vec![],
            path: None,
        }
    }

    #[tokio::test]
    async fn file_vertex_key_equals_its_mirrored_record_key_and_resolves_parent_edges() {
        let store = InMemoryGraphStore::new();
        let org_id = Key::new_v4();

        let mut txn = store.begin_txn().await;
        transform_drive_batch(&store, &mut txn, org_id, "gdrive", &[file("root", vec![])])
            .await
            .unwrap();
        store.commit(txn).await.unwrap();

        let mut txn = store.begin_txn().await;
        transform_drive_batch(&store, &mut txn, org_id, "gdrive", &[file("child", vec!["root"])])
            .await
            .unwrap();
        store.commit(txn).await.unwrap();

        let root = store.get_file_by_external_id("root").await.unwrap().unwrap();
        let child = store.get_file_by_external_id("child").await.unwrap().unwrap();
        assert!(store.get_record(root.key).await.unwrap().is_some());
        assert!(store.get_record(child.key).await.unwrap().is_some());

        // Re-observe "child" unchanged: version must not bump, and the key
        // found via `get_file_by_external_id` must still resolve a record,
        // which only holds if the vertex and record were written under the
        // same key originally.
        let mut txn = store.begin_txn().await;
        let outcomes = transform_drive_batch(&store, &mut txn, org_id, "gdrive", &[file("child", vec!["root"])])
            .await
            .unwrap();
        store.commit(txn).await.unwrap();
        assert!(outcomes.is_empty());
        let record = store.get_record(child.key).await.unwrap().unwrap();
        assert_eq!(record.version, 1);
    }
}
