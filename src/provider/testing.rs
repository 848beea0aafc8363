//! In-memory [`ProviderFactory`]/[`AdminSurface`] test double.
//!
//! Not a production provider client — there is no concrete wire
//! implementation in this crate, since the real mail/drive clients are
//! external collaborators. This module exists so the crate's own unit and
//! integration tests can exercise the Sync Controller and Orchestrator end
//! to end without a live service.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use super::{
    AdminSurface, AttachmentPayload, ChangeItem, ChangeWatchSurface, ChannelDescriptor, DriveInfo,
    DriveUserSurface, FilePayload, GroupMember, GroupPayload, MailUserSurface, MessagePayload,
    MessagePermissionGrant, PrincipalPayload, ProviderError, ProviderFactory, ProviderMode,
    UserSurface,
};

/// One mail thread's worth of fixture data for a single mock user.
#[derive(Debug, Clone, Default)]
pub struct MockThread {
    pub thread_id: String,
    pub messages: Vec<MessagePayload>,
    pub attachments: HashMap<String, Vec<AttachmentPayload>>,
    pub permissions: Vec<MessagePermissionGrant>,
}

/// One drive's worth of fixture data for a single mock user.
#[derive(Debug, Clone)]
pub struct MockDrive {
    pub info: DriveInfo,
    pub files: Vec<FilePayload>,
}

/// Everything one mock user can hand back across both surfaces.
#[derive(Debug, Clone, Default)]
pub struct MockUserData {
    pub threads: Vec<MockThread>,
    pub drives: Vec<MockDrive>,
}

/// Builder-style in-memory provider. Populate with [`MockProvider::with_principal`]
/// / [`MockProvider::with_user_data`], then hand `Arc<MockProvider>` to an
/// [`crate::orchestrator::Orchestrator`] wherever a `ProviderFactory` +
/// `AdminSurface` pair is expected.
#[derive(Default)]
pub struct MockProvider {
    mode: std::sync::OnceLock<ProviderMode>,
    principals: DashMap<String, PrincipalPayload>,
    groups: DashMap<String, GroupPayload>,
    group_members: DashMap<String, Vec<GroupMember>>,
    users: DashMap<String, MockUserData>,
    watch_seq: AtomicU64,
}

impl MockProvider {
    pub fn new(mode: ProviderMode) -> Self {
        let provider = Self::default();
        let _ = provider.mode.set(mode);
        provider
    }

    pub fn with_principal(self, principal: PrincipalPayload) -> Self {
        self.principals
            .insert(principal.primary_email.clone(), principal);
        self
    }

    pub fn with_group(self, group: GroupPayload, members: Vec<GroupMember>) -> Self {
        self.group_members.insert(group.email.clone(), members);
        self.groups.insert(group.email.clone(), group);
        self
    }

    pub fn with_user_data(self, email: impl Into<String>, data: MockUserData) -> Self {
        self.users.insert(email.into(), data);
        self
    }

    fn mode_or_individual(&self) -> ProviderMode {
        *self.mode.get().unwrap_or(&ProviderMode::Individual)
    }
}

#[async_trait]
impl AdminSurface for MockProvider {
    async fn list_principals(&self) -> Result<Vec<PrincipalPayload>, ProviderError> {
        Ok(self.principals.iter().map(|e| e.value().clone()).collect())
    }

    async fn list_groups(&self) -> Result<Vec<GroupPayload>, ProviderError> {
        Ok(self.groups.iter().map(|e| e.value().clone()).collect())
    }

    async fn list_group_members(&self, group_email: &str) -> Result<Vec<GroupMember>, ProviderError> {
        Ok(self
            .group_members
            .get(group_email)
            .map(|m| m.clone())
            .unwrap_or_default())
    }

    async fn list_domains(&self) -> Result<Vec<String>, ProviderError> {
        Ok(self
            .principals
            .iter()
            .filter_map(|e| e.primary_email.split('@').nth(1).map(str::to_string))
            .collect::<std::collections::HashSet<_>>()
            .into_iter()
            .collect())
    }
}

#[async_trait]
impl ProviderFactory for MockProvider {
    fn mode(&self) -> ProviderMode {
        self.mode_or_individual()
    }

    async fn delegate_for(&self, email: &str) -> Result<Arc<dyn UserSurface>, ProviderError> {
        let data = self.users.get(email).map(|d| d.clone()).unwrap_or_default();
        Ok(Arc::new(MockUserSurface {
            data,
            watch_seq: AtomicU64::new(0),
        }))
    }
}

struct MockUserSurface {
    data: MockUserData,
    watch_seq: AtomicU64,
}

impl MockUserSurface {
    fn next_channel(&self) -> ChannelDescriptor {
        let n = self.watch_seq.fetch_add(1, Ordering::Relaxed);
        ChannelDescriptor {
            channel_id: format!("mock-channel-{n}"),
            resource_id: format!("mock-resource-{n}"),
            token: format!("mock-token-{n}"),
            expiry: None,
        }
    }
}

#[async_trait]
impl ChangeWatchSurface for MockUserSurface {
    async fn create_watch(&self) -> Result<ChannelDescriptor, ProviderError> {
        Ok(self.next_channel())
    }

    async fn get_changes(
        &self,
        _token: &str,
    ) -> Result<(Vec<ChangeItem>, Option<String>), ProviderError> {
        Ok((Vec::new(), None))
    }
}

#[async_trait]
impl MailUserSurface for MockUserSurface {
    async fn list_threads(&self) -> Result<Vec<String>, ProviderError> {
        Ok(self.data.threads.iter().map(|t| t.thread_id.clone()).collect())
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<MessagePayload>, ProviderError> {
        Ok(self
            .data
            .threads
            .iter()
            .find(|t| t.thread_id == thread_id)
            .map(|t| t.messages.clone())
            .unwrap_or_default())
    }

    async fn get_message(&self, id: &str) -> Result<MessagePayload, ProviderError> {
        self.data
            .threads
            .iter()
            .flat_map(|t| t.messages.iter())
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| ProviderError::Permanent(format!("unknown message {id}")))
    }

    async fn list_attachments(
        &self,
        message_id: &str,
    ) -> Result<Vec<AttachmentPayload>, ProviderError> {
        Ok(self
            .data
            .threads
            .iter()
            .filter_map(|t| t.attachments.get(message_id))
            .flatten()
            .cloned()
            .collect())
    }

    async fn list_message_permissions(
        &self,
        thread_id: &str,
    ) -> Result<Vec<MessagePermissionGrant>, ProviderError> {
        Ok(self
            .data
            .threads
            .iter()
            .find(|t| t.thread_id == thread_id)
            .map(|t| t.permissions.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl DriveUserSurface for MockUserSurface {
    async fn list_shared_drives(&self) -> Result<Vec<DriveInfo>, ProviderError> {
        Ok(self.data.drives.iter().map(|d| d.info.clone()).collect())
    }

    async fn get_drive_info(&self, drive_id: &str) -> Result<DriveInfo, ProviderError> {
        self.data
            .drives
            .iter()
            .find(|d| d.info.id == drive_id)
            .map(|d| d.info.clone())
            .ok_or_else(|| ProviderError::Permanent(format!("unknown drive {drive_id}")))
    }

    async fn list_files_in_folder(&self, drive_id: &str) -> Result<Vec<String>, ProviderError> {
        Ok(self
            .data
            .drives
            .iter()
            .find(|d| d.info.id == drive_id)
            .map(|d| d.files.iter().map(|f| f.id.clone()).collect())
            .unwrap_or_default())
    }

    async fn batch_fetch_metadata_and_permissions(
        &self,
        file_ids: &[String],
    ) -> Result<Vec<FilePayload>, ProviderError> {
        Ok(self
            .data
            .drives
            .iter()
            .flat_map(|d| d.files.iter())
            .filter(|f| file_ids.contains(&f.id))
            .cloned()
            .collect())
    }
}

impl UserSurface for MockUserSurface {
    fn mail(&self) -> Option<&dyn MailUserSurface> {
        Some(self)
    }

    fn drive(&self) -> Option<&dyn DriveUserSurface> {
        Some(self)
    }
}
