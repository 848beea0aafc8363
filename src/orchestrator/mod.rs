//! Orchestrator (C8).
//!
//! Tenant-level composition root: hydrates directory principals/groups into
//! the graph store, recovers any `RUNNING` sync state a crash left behind,
//! bootstraps watch channels, then fans out one Sync Controller per
//! (principal, service) pair.

mod error;

pub use error::OrchestratorError;

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::SyncCoreConfig;
use crate::events::EventEmitter;
use crate::model::{BelongsToEdge, EdgeKind, Group, Key, Organization, ServiceType, SyncStatus, User};
use crate::provider::{AdminSurface, ProviderFactory, UserSurface};
use crate::store::GraphStore;
use crate::sync::SyncController;
use crate::watch::WatchBootstrapper;

pub struct Orchestrator {
    store: Arc<dyn GraphStore>,
    emitter: Arc<dyn EventEmitter>,
    config: SyncCoreConfig,
    factory: Arc<dyn ProviderFactory>,
    admin: Arc<dyn AdminSurface>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn GraphStore>,
        emitter: Arc<dyn EventEmitter>,
        config: SyncCoreConfig,
        factory: Arc<dyn ProviderFactory>,
        admin: Arc<dyn AdminSurface>,
    ) -> Self {
        Self {
            store,
            emitter,
            config,
            factory,
            admin,
        }
    }

    /// Hydrates `organizations`/`users`/`groups`/`belongsTo` for one tenant,
    /// recovers any orphaned `RUNNING` sync state, and bootstraps watch
    /// channels. Returns the tenant's org key and the (email, services)
    /// pairs its initial sync should cover.
    pub async fn initialize(
        &self,
        org_name: &str,
    ) -> Result<(Key, Vec<(String, Vec<ServiceType>)>), OrchestratorError> {
        let mut txn = self.store.begin_txn().await;

        let org_key = self
            .store
            .upsert_organizations(
                vec![Organization {
                    key: Key::new_v4(),
                    name: org_name.to_string(),
                }],
                &mut txn,
            )
            .await?[0];

        let principals = self.admin.list_principals().await?;
        let mut user_keys: HashMap<String, Key> = HashMap::new();

        for principal in &principals {
            let domain = principal
                .primary_email
                .split('@')
                .nth(1)
                .unwrap_or_default()
                .to_string();
            let key = self
                .store
                .upsert_users(
                    vec![User {
                        key: Key::new_v4(),
                        email: principal.primary_email.clone(),
                        full_name: principal.full_name.clone(),
                        domain,
                        designation: None,
                        is_active: !principal.suspended,
                        created_at: principal.creation_time,
                        external_id: principal.id.clone(),
                    }],
                    &mut txn,
                )
                .await?[0];
            user_keys.insert(principal.primary_email.clone(), key);

            self.store
                .create_belongs_to(
                    vec![BelongsToEdge {
                        user: key,
                        target: org_key,
                        entity_type: EdgeKind::Organization,
                        role: None,
                    }],
                    &mut txn,
                )
                .await?;
        }

        for group in self.admin.list_groups().await? {
            let group_key = self
                .store
                .upsert_groups(
                    vec![Group {
                        key: Key::new_v4(),
                        email: group.email.clone(),
                        group_name: group.name.clone(),
                        description: group.description.clone(),
                        admin_created: group.admin_created,
                        created_at: group.creation_time,
                        external_id: group.id.clone(),
                    }],
                    &mut txn,
                )
                .await?[0];

            for member in self.admin.list_group_members(&group.email).await? {
                let Some(&user_key) = user_keys.get(&member.email) else {
                    log::debug!(
                        "group {}: member {} is not a known principal, skipping",
                        group.email,
                        member.email
                    );
                    continue;
                };
                self.store
                    .create_belongs_to(
                        vec![BelongsToEdge {
                            user: user_key,
                            target: group_key,
                            entity_type: EdgeKind::Group,
                            role: Some(member.role.clone()),
                        }],
                        &mut txn,
                    )
                    .await?;
            }
        }

        self.store.commit(txn).await?;

        self.recover_orphaned_states().await?;

        let principal_services: Vec<(String, Vec<ServiceType>)> = principals
            .iter()
            .map(|p| (p.primary_email.clone(), vec![ServiceType::Mail, ServiceType::Drive]))
            .collect();

        if self.config.bootstrap_watches {
            let bootstrapper = WatchBootstrapper::new(self.store.clone());
            bootstrapper
                .register_all(
                    self.factory.clone(),
                    principal_services.clone(),
                    self.config.fan_out_width,
                )
                .await?;
        }

        Ok((org_key, principal_services))
    }

    /// Downgrades any `RUNNING` row — a top-level `mail`/`drive` state or a
    /// per-drive `drive:{id}` sub-state — to `PAUSED`. A `RUNNING` row that
    /// survives a process restart can only mean the worker that owned it
    /// never reached a suspension point before the process died.
    async fn recover_orphaned_states(&self) -> Result<(), OrchestratorError> {
        for row in self.store.list_sync_states().await? {
            if row.sync_state == SyncStatus::Running {
                log::warn!(
                    "recovering orphaned RUNNING state for {}/{}",
                    row.email,
                    row.service
                );
                self.store
                    .update_sync_state(&row.email, &row.service, SyncStatus::Paused, None)
                    .await?;
            }
        }
        Ok(())
    }

    /// Runs one `SyncController` per (principal, service) pair, bounded by
    /// `config.fan_out_width` concurrent controllers.
    pub async fn perform_initial_sync(
        &self,
        org_id: Key,
        principals: Vec<(String, Vec<ServiceType>)>,
    ) -> Result<(), OrchestratorError> {
        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.config.fan_out_width.max(1)));
        let mut tasks = tokio::task::JoinSet::new();

        for (email, services) in principals {
            for service in services {
                let store = self.store.clone();
                let emitter = self.emitter.clone();
                let config = self.config.clone();
                let factory = self.factory.clone();
                let semaphore = semaphore.clone();
                let email = email.clone();

                tasks.spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .expect("orchestrator fan-out semaphore closed");

                    let surface = match factory.delegate_for(&email).await {
                        Ok(s) => s,
                        Err(err) => {
                            log::warn!("perform_initial_sync: delegate_for({email}) failed: {err}");
                            return;
                        }
                    };

                    let controller = SyncController::new(email.clone(), service, store.clone(), emitter, config);
                    if !controller.start().await {
                        log::debug!("perform_initial_sync: start rejected for {email}/{service}");
                        return;
                    }

                    let result = match service {
                        ServiceType::Mail => match surface.mail() {
                            Some(mail) => controller.run_mail_sync(mail, org_id, "connector").await,
                            None => Ok(()),
                        },
                        ServiceType::Drive => match surface.drive() {
                            Some(drive) => match store.entity_id_by_email(&email).await {
                                Ok(Some((_, user_key))) => {
                                    controller.run_drive_sync(drive, org_id, user_key, "connector").await
                                }
                                _ => {
                                    log::warn!(
                                        "perform_initial_sync: no resolved principal for {email}, skipping drive sync"
                                    );
                                    Ok(())
                                }
                            },
                            None => Ok(()),
                        },
                    };

                    if let Err(err) = result {
                        log::error!("perform_initial_sync: {email}/{service} failed: {err}");
                    }
                });
            }
        }

        while tasks.join_next().await.is_some() {}
        Ok(())
    }

    /// Convenience composing [`Orchestrator::initialize`] and
    /// [`Orchestrator::perform_initial_sync`] for one tenant.
    pub async fn run_tenant(&self, org_name: &str) -> Result<(), OrchestratorError> {
        let (org_id, principals) = self.initialize(org_name).await?;
        self.perform_initial_sync(org_id, principals).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingEventEmitter;
    use crate::model::RecordType;
    use crate::provider::testing::{MockDrive, MockProvider, MockThread, MockUserData};
    use crate::provider::{DriveInfo, GroupMember, GroupPayload, MessageHeaders, MessagePayload, PrincipalPayload, ProviderMode};
    use crate::store::memory::InMemoryGraphStore;
    use chrono::{TimeZone, Utc};

    fn principal(email: &str) -> PrincipalPayload {
        PrincipalPayload {
            id: format!("id-{email}"),
            primary_email: email.to_string(),
            full_name: "Test User".to_string(),
            creation_time: Utc.timestamp_opt(0, 0).unwrap(),
            suspended: false,
        }
    }

    fn one_message_thread(thread_id: &str) -> MockThread {
        MockThread {
            thread_id: thread_id.to_string(),
            messages: vec![MessagePayload {
                id: format!("m-{thread_id}"),
                thread_id: thread_id.to_string(),
                internal_date: Utc.timestamp_opt(10, 0).unwrap(),
                label_ids: vec![],
                headers: MessageHeaders {
                    subject: "hello".to_string(),
                    from: "alice@acme.com".to_string(),
                    to: vec!["bob@acme.com".to_string()],
                    ..Default::default()
                },
                history_id: None,
                web_url: None,
            }],
            attachments: HashMap::new(),
            permissions: vec![],
        }
    }

    #[tokio::test]
    async fn run_tenant_hydrates_directory_and_syncs_each_principal() {
        let store: Arc<dyn GraphStore> = Arc::new(InMemoryGraphStore::new());
        let emitter = Arc::new(RecordingEventEmitter::new());

        let mut data = MockUserData::default();
        data.threads.push(one_message_thread("T1"));
        data.drives.push(MockDrive {
            info: DriveInfo {
                id: "d1".to_string(),
                name: "Shared Drive".to_string(),
                access_level: "writer".to_string(),
            },
            files: vec![],
        });

        let provider = Arc::new(
            MockProvider::new(ProviderMode::Enterprise)
                .with_principal(principal("alice@acme.com"))
                .with_group(
                    GroupPayload {
                        id: "g1".to_string(),
                        name: "Engineering".to_string(),
                        email: "eng@acme.com".to_string(),
                        description: None,
                        admin_created: true,
                        creation_time: Utc.timestamp_opt(0, 0).unwrap(),
                    },
                    vec![GroupMember {
                        email: "alice@acme.com".to_string(),
                        role: "MEMBER".to_string(),
                    }],
                )
                .with_user_data("alice@acme.com", data),
        );

        let mut config = SyncCoreConfig::default();
        config.bootstrap_watches = false;

        let orchestrator = Orchestrator::new(
            store.clone(),
            emitter.clone(),
            config,
            provider.clone(),
            provider,
        );

        orchestrator.run_tenant("Acme Inc").await.unwrap();

        assert!(store
            .get_user_by_external_id("id-alice@acme.com")
            .await
            .unwrap()
            .is_some());
        assert_eq!(store.record_count_by_type(RecordType::Message).await.unwrap(), 1);
        assert!(!emitter.is_empty());
    }

    #[tokio::test]
    async fn initialize_downgrades_orphaned_running_state() {
        let store: Arc<dyn GraphStore> = Arc::new(InMemoryGraphStore::new());
        store
            .update_sync_state("alice@acme.com", "mail", SyncStatus::Running, None)
            .await
            .unwrap();

        let provider = Arc::new(MockProvider::new(ProviderMode::Enterprise));
        let mut config = SyncCoreConfig::default();
        config.bootstrap_watches = false;

        let orchestrator = Orchestrator::new(
            store.clone(),
            Arc::new(RecordingEventEmitter::new()),
            config,
            provider.clone(),
            provider,
        );

        orchestrator.initialize("Acme Inc").await.unwrap();

        let row = store.get_sync_state("alice@acme.com", "mail").await.unwrap().unwrap();
        assert_eq!(row.sync_state, SyncStatus::Paused);
    }
}
