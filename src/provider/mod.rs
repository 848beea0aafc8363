//! Provider Façade (C3).
//!
//! An abstract capability set over the external mail/drive APIs, favoring
//! composition: one concrete Sync Controller parametrized by a
//! `ProviderSurface`, rather than an inheritance hierarchy per backend.
//! Concrete clients (the Gmail/Graph/etc. wire calls) are external
//! collaborators; this crate only defines the traits and ships an
//! in-memory test double (`provider::testing`).

pub mod testing;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Distinguishes a tenant with an admin/directory API (`listPrincipals`,
/// `listGroups`, ...) from one where only per-user delegation is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderMode {
    Enterprise,
    Individual,
}

/// Transient errors are assumed already retried with backoff inside the
/// concrete provider client; by the time one reaches this crate it is
/// terminal for the current call. Permanent errors (bad auth, malformed
/// request) are never retried by the caller either way.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transient provider error: {0}")]
    Transient(String),
    #[error("permanent provider error: {0}")]
    Permanent(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

/// Enterprise directory principal (`id, primaryEmail, name.fullName,
/// creationTime, suspended`).
#[derive(Debug, Clone, PartialEq)]
pub struct PrincipalPayload {
    pub id: String,
    pub primary_email: String,
    pub full_name: String,
    pub creation_time: DateTime<Utc>,
    pub suspended: bool,
}

/// Enterprise directory group (`id, name, email, description, adminCreated,
/// creationTime`).
#[derive(Debug, Clone, PartialEq)]
pub struct GroupPayload {
    pub id: String,
    pub name: String,
    pub email: String,
    pub description: Option<String>,
    pub admin_created: bool,
    pub creation_time: DateTime<Utc>,
}

/// One membership row returned by `listGroupMembers`.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupMember {
    pub email: String,
    pub role: String,
}

/// Header subset carried on a message payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageHeaders {
    pub subject: String,
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub date: Option<DateTime<Utc>>,
    pub message_id: String,
}

/// Mail message payload (`id, threadId, internalDate, labelIds, headers,
/// body`). Body content is opaque to this crate.
#[derive(Debug, Clone, PartialEq)]
pub struct MessagePayload {
    pub id: String,
    pub thread_id: String,
    pub internal_date: DateTime<Utc>,
    pub label_ids: Vec<String>,
    pub headers: MessageHeaders,
    pub history_id: Option<String>,
    pub web_url: Option<String>,
}

/// Mail attachment payload.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentPayload {
    pub id: String,
    pub message_id: String,
    pub mime_type: String,
    pub filename: String,
    pub size: i64,
    pub web_url: Option<String>,
}

/// One `{messageId, attachmentIds[], role, principals[]}` grant descriptor,
/// scoped to a single thread's worth of messages (resolved per-thread, never
/// accumulated across a user's whole sweep — see DESIGN.md).
#[derive(Debug, Clone, PartialEq)]
pub struct MessagePermissionGrant {
    pub message_id: String,
    pub attachment_ids: Vec<String>,
    pub role: String,
    pub principals: Vec<String>,
}

/// One ACL entry on a file/folder, as read (never drained) off its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct FilePermission {
    pub email: Option<String>,
    pub role: String,
    pub is_anyone: bool,
}

/// Content hashes as the provider reports them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileHashSet {
    pub etag: Option<String>,
    pub ctag: Option<String>,
    pub md5: Option<String>,
    pub sha1: Option<String>,
    pub sha256: Option<String>,
    pub quick_xor: Option<String>,
    pub crc32: Option<String>,
}

/// File/folder metadata payload (`id, name, mimeType, fileExtension, size,
/// webViewLink, hashes..., headRevisionId, createdTime, modifiedTime,
/// parents[], permissions[], path`).
#[derive(Debug, Clone, PartialEq)]
pub struct FilePayload {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub file_extension: Option<String>,
    pub is_folder: bool,
    pub size: i64,
    pub web_view_link: Option<String>,
    pub hashes: FileHashSet,
    pub head_revision_id: Option<String>,
    pub created_time: DateTime<Utc>,
    pub modified_time: DateTime<Utc>,
    pub parents: Vec<String>,
    pub permissions: Vec<FilePermission>,
    pub path: Option<String>,
}

/// A drive (root or shared) as reported by `getDriveInfo`/`listSharedDrives`.
#[derive(Debug, Clone, PartialEq)]
pub struct DriveInfo {
    pub id: String,
    pub name: String,
    pub access_level: String,
}

/// Opaque watch registration result (`channelId, resourceId, token, expiry`).
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelDescriptor {
    pub channel_id: String,
    pub resource_id: String,
    pub token: String,
    pub expiry: Option<DateTime<Utc>>,
}

/// One delta entry from `getChanges`. Applying a delta is out of this
/// crate's scope; the watch bootstrap only registers the
/// channel and discards the first page.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeItem {
    MessageChanged(String),
    FileChanged(String),
    Deleted(String),
}

/// Shared by the mail and drive user surfaces: register a watch, then page
/// through deltas with an opaque resume token.
#[async_trait]
pub trait ChangeWatchSurface: Send + Sync {
    async fn create_watch(&self) -> Result<ChannelDescriptor, ProviderError>;
    async fn get_changes(
        &self,
        token: &str,
    ) -> Result<(Vec<ChangeItem>, Option<String>), ProviderError>;
}

/// Per-user mail capability set.
#[async_trait]
pub trait MailUserSurface: ChangeWatchSurface {
    async fn list_threads(&self) -> Result<Vec<String>, ProviderError>;
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<MessagePayload>, ProviderError>;
    async fn get_message(&self, id: &str) -> Result<MessagePayload, ProviderError>;
    async fn list_attachments(
        &self,
        message_id: &str,
    ) -> Result<Vec<AttachmentPayload>, ProviderError>;
    async fn list_message_permissions(
        &self,
        thread_id: &str,
    ) -> Result<Vec<MessagePermissionGrant>, ProviderError>;
}

/// Per-user drive capability set.
#[async_trait]
pub trait DriveUserSurface: ChangeWatchSurface {
    async fn list_shared_drives(&self) -> Result<Vec<DriveInfo>, ProviderError>;
    async fn get_drive_info(&self, drive_id: &str) -> Result<DriveInfo, ProviderError>;
    async fn list_files_in_folder(&self, drive_id: &str) -> Result<Vec<String>, ProviderError>;
    async fn batch_fetch_metadata_and_permissions(
        &self,
        file_ids: &[String],
    ) -> Result<Vec<FilePayload>, ProviderError>;
}

/// A delegated, per-principal handle exposing whichever surfaces that
/// principal has (a pure-mail tenant has no `drive()`, and vice versa).
pub trait UserSurface: Send + Sync {
    fn mail(&self) -> Option<&dyn MailUserSurface>;
    fn drive(&self) -> Option<&dyn DriveUserSurface>;
}

/// Enterprise directory surface, present only when `ProviderMode::Enterprise`.
#[async_trait]
pub trait AdminSurface: Send + Sync {
    async fn list_principals(&self) -> Result<Vec<PrincipalPayload>, ProviderError>;
    async fn list_groups(&self) -> Result<Vec<GroupPayload>, ProviderError>;
    async fn list_group_members(&self, group_email: &str) -> Result<Vec<GroupMember>, ProviderError>;
    async fn list_domains(&self) -> Result<Vec<String>, ProviderError>;
}

/// Top-level façade: yields a delegated [`UserSurface`] for any principal.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    fn mode(&self) -> ProviderMode;
    async fn delegate_for(&self, email: &str) -> Result<Arc<dyn UserSurface>, ProviderError>;
}
