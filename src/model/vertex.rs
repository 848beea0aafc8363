//! Vertex collections of the graph data model.
//!
//! Every struct here mirrors a named vertex collection. Field shapes follow
//! a plain DTO style (`Serialize`/`Deserialize` derives, one doc comment per
//! field where the name alone doesn't say enough).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::Key;

/// `users` — internal principal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub key: Key,
    pub email: String,
    pub full_name: String,
    pub domain: String,
    pub designation: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub external_id: String,
}

/// `groups` — mailing/security group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Group {
    pub key: Key,
    pub email: String,
    pub group_name: String,
    pub description: Option<String>,
    pub admin_created: bool,
    pub created_at: DateTime<Utc>,
    pub external_id: String,
}

/// `people` — fallback collection for unknown ACL principals (email only).
///
/// Keys are deterministic (SHA-256 of the lower-cased email, see
/// `permissions::people_key`) so two observations of the same address never
/// race into two rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Person {
    pub key: Key,
    pub email: String,
}

/// `organizations` — tenant root vertex.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Organization {
    pub key: Key,
    pub name: String,
}

/// `drives` — a logical container: a user's root drive or a shared drive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Drive {
    pub key: Key,
    pub external_id: String,
    pub access_level: String,
}

/// Content hashes carried on a `files` vertex, as returned by the provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FileHashes {
    pub etag: Option<String>,
    pub ctag: Option<String>,
    pub md5: Option<String>,
    pub sha1: Option<String>,
    pub sha256: Option<String>,
    pub xor: Option<String>,
    pub crc32: Option<String>,
}

/// `files` — any stored file or folder's metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileEntity {
    pub key: Key,
    pub org_id: Key,
    pub file_name: String,
    pub is_file: bool,
    pub extension: Option<String>,
    pub mime_type: String,
    pub size_in_bytes: i64,
    pub web_url: Option<String>,
    pub hashes: FileHashes,
    pub external_id: String,
    pub path: Option<String>,
}

/// `mails` — a single mail message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Mail {
    pub key: Key,
    pub external_id: String,
    pub thread_id: String,
    pub is_parent: bool,
    pub internal_date: DateTime<Utc>,
    pub subject: String,
    pub date: DateTime<Utc>,
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub message_id_header: String,
    pub history_id: Option<String>,
    pub web_url: Option<String>,
    pub label_ids: Vec<String>,
    pub last_sync_time: DateTime<Utc>,
}

/// `attachments` — mail attachment metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attachment {
    pub key: Key,
    pub external_id: String,
    pub message_id: Key,
    pub mime_type: String,
    pub filename: String,
    pub size: i64,
    pub web_url: Option<String>,
    pub last_sync_time: DateTime<Utc>,
}

/// Discriminates which concrete entity a `records` row mirrors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    Message,
    File,
    Attachment,
}

/// Downstream indexing lifecycle markers carried on a record.
///
/// This crate creates rows with `NotStarted` and never advances them — the
/// indexing/extraction pipelines that would are out of scope.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndexingStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

/// Timestamps carried on a `records` row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordTimestamps {
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub source_created: Option<DateTime<Utc>>,
    pub source_modified: Option<DateTime<Utc>>,
    pub last_sync: DateTime<Utc>,
}

/// `records` — the uniform indexable abstraction mirroring a mail,
/// attachment, or file 1:1.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    /// Equal to the key of the entity this record mirrors.
    pub key: Key,
    pub record_name: String,
    pub record_type: RecordType,
    pub version: u32,
    pub timestamps: RecordTimestamps,
    pub external_record_id: String,
    pub record_source: String,
    pub connector_name: String,
    pub is_archived: bool,
    pub indexing_status: IndexingStatus,
    pub extraction_status: IndexingStatus,
}

impl Record {
    pub const RECORD_SOURCE: &'static str = "CONNECTOR";
}

/// Which provider surface a sync state / channel row belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    Drive,
    Mail,
}

impl std::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceType::Drive => write!(f, "drive"),
            ServiceType::Mail => write!(f, "mail"),
        }
    }
}

/// The legal states of the per-(principal, service) sync state machine
/// state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    NotStarted,
    Running,
    Paused,
    Completed,
    Failed,
    Stopped,
}

/// `syncStates` — a per-(principal, serviceType) row.
///
/// For per-drive state (`driveSyncState`), `service` carries a
/// synthetic `drive:{driveId}` discriminator so the
/// same row shape and store contract serve both.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncStateRow {
    pub email: String,
    pub service: String,
    pub sync_state: SyncStatus,
    pub last_token: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl SyncStateRow {
    pub fn service_key(service: ServiceType) -> String {
        service.to_string()
    }

    pub fn drive_service_key(drive_id: &str) -> String {
        format!("drive:{drive_id}")
    }
}

/// `channels` — a registered watch channel and its opaque resume token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Channel {
    pub channel_id: String,
    pub resource_id: String,
    pub principal_email: String,
    pub service_type: ServiceType,
    /// `pageToken` (drive) or `historyId` (mail).
    pub token: String,
    pub expiry: Option<DateTime<Utc>>,
}

/// Convenience map of email -> resolved principal key, threaded through the
/// permission resolver to avoid repeat store round-trips within one batch.
pub type PrincipalCache = HashMap<String, Key>;
