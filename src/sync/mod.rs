//! Sync Controller (C6).
//!
//! Per-(principal, service) state machine owning `start`/`pause`/`resume`/
//! `stop`, partitioning provider work into fixed-size batches and driving
//! C5 (transform) → C1 (commit) → C2 (emit) for each.

mod error;

pub use error::{ControllerError, Event, TransitionError};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::SyncCoreConfig;
use crate::events::EventEmitter;
use crate::model::{EventEnvelope, EventType, Key, ServiceType, SyncStateRow, SyncStatus};
use crate::provider::{DriveUserSurface, MailUserSurface};
use crate::store::GraphStore;
use crate::transform::{self, EmittableRecord, RecordChange, ThreadBatch};

/// The legal-transition table for the sync state machine. `start` is only legal from the four
/// "not currently active" states; `resume` is the only event that moves
/// `PAUSED` back to `RUNNING` — the transition table's own prose contradicts
/// the table on whether `start` also covers that case — resolved here in
/// favor of the prose, since it keeps `start` and `resume` semantically
/// distinct; recorded in DESIGN.md.
pub fn apply_transition(current: SyncStatus, event: Event) -> Result<SyncStatus, TransitionError> {
    use Event::*;
    use SyncStatus::*;

    match (current, event) {
        (NotStarted, Start) | (Completed, Start) | (Failed, Start) | (Stopped, Start) => Ok(Running),
        (Running, Pause) => Ok(Paused),
        (Paused, Resume) => Ok(Running),
        (Running, InternalSuccess) => Ok(Completed),
        (Running, InternalError) => Ok(Failed),
        (_, Stop) => Ok(Stopped),
        _ => Err(TransitionError { from: current, event }),
    }
}

/// Per-(principal, service) sync state machine and batch driver.
///
/// Holds three locks: `transition_lock`
/// serializes `start`/`pause`/`resume`/`stop`; `sync_lock` is held for the
/// duration of one batch's transform + transaction + emit so a pause/stop
/// can never interleave with a partially-committed batch.
pub struct SyncController {
    email: String,
    service: ServiceType,
    store: Arc<dyn GraphStore>,
    emitter: Arc<dyn EventEmitter>,
    config: SyncCoreConfig,
    transition_lock: Mutex<()>,
    sync_lock: Mutex<()>,
    stop_requested: AtomicBool,
}

impl SyncController {
    pub fn new(
        email: impl Into<String>,
        service: ServiceType,
        store: Arc<dyn GraphStore>,
        emitter: Arc<dyn EventEmitter>,
        config: SyncCoreConfig,
    ) -> Self {
        Self {
            email: email.into(),
            service,
            store,
            emitter,
            config,
            transition_lock: Mutex::new(()),
            sync_lock: Mutex::new(()),
            stop_requested: AtomicBool::new(false),
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn service(&self) -> ServiceType {
        self.service
    }

    async fn current_state(&self) -> Result<SyncStatus, ControllerError> {
        Ok(self
            .store
            .get_sync_state(&self.email, &self.service.to_string())
            .await?
            .map(|r| r.sync_state)
            .unwrap_or(SyncStatus::NotStarted))
    }

    /// Control surface `start(tenantId)`: collapses to `true`
    /// on a legal transition, `false` (logged) on anything else.
    pub async fn start(&self) -> bool {
        let _guard = self.transition_lock.lock().await;
        let current = match self.current_state().await {
            Ok(s) => s,
            Err(err) => {
                log::warn!("start({}/{}): state lookup failed: {err}", self.email, self.service);
                return false;
            }
        };
        match apply_transition(current, Event::Start) {
            Ok(next) => {
                if let Err(err) = self
                    .store
                    .update_service_sync_state(&self.email, self.service, next)
                    .await
                {
                    log::error!("start({}/{}): persist failed: {err}", self.email, self.service);
                    return false;
                }
                self.stop_requested.store(false, Ordering::SeqCst);
                true
            }
            Err(err) => {
                log::debug!("start({}/{}) rejected: {err}", self.email, self.service);
                false
            }
        }
    }

    /// Control surface `pause(tenantId)`. Cooperative: only requests a
    /// pause at the next suspension point; the run loop
    /// persists `PAUSED` once it actually stops.
    pub async fn pause(&self) -> bool {
        let _guard = self.transition_lock.lock().await;
        let current = match self.current_state().await {
            Ok(s) => s,
            Err(_) => return false,
        };
        match apply_transition(current, Event::Pause) {
            Ok(_) => {
                self.stop_requested.store(true, Ordering::SeqCst);
                true
            }
            Err(err) => {
                log::debug!("pause({}/{}) rejected: {err}", self.email, self.service);
                false
            }
        }
    }

    /// Control surface `resume(tenantId)`. Only legal from `PAUSED`; the
    /// caller must re-invoke `run_mail_sync`/`run_drive_sync` afterward.
    pub async fn resume(&self) -> bool {
        let _guard = self.transition_lock.lock().await;
        let current = match self.current_state().await {
            Ok(s) => s,
            Err(_) => return false,
        };
        match apply_transition(current, Event::Resume) {
            Ok(next) => {
                if let Err(err) = self
                    .store
                    .update_service_sync_state(&self.email, self.service, next)
                    .await
                {
                    log::error!("resume({}/{}): persist failed: {err}", self.email, self.service);
                    return false;
                }
                self.stop_requested.store(false, Ordering::SeqCst);
                true
            }
            Err(err) => {
                log::debug!("resume({}/{}) rejected: {err}", self.email, self.service);
                false
            }
        }
    }

    /// Control surface `stop()`. Legal from any state; hard-stops this
    /// controller and clears the stop flag for the next `start`.
    pub async fn stop(&self) -> bool {
        let _guard = self.transition_lock.lock().await;
        let current = match self.current_state().await {
            Ok(s) => s,
            Err(_) => return false,
        };
        match apply_transition(current, Event::Stop) {
            Ok(next) => {
                self.stop_requested.store(true, Ordering::SeqCst);
                if let Err(err) = self
                    .store
                    .update_service_sync_state(&self.email, self.service, next)
                    .await
                {
                    log::error!("stop({}/{}): persist failed: {err}", self.email, self.service);
                    return false;
                }
                // Leave the flag set: a hard stop must still cancel whatever
                // run loop is in flight. It's cleared by the next `start`/
                // `resume` (see those methods), not here.
                true
            }
            Err(err) => {
                log::debug!("stop({}/{}) rejected: {err}", self.email, self.service);
                false
            }
        }
    }

    /// Checked before every batch and before every drive. If a
    /// pause/stop was requested, persists the resulting state and returns
    /// `true` so the caller's run loop can exit.
    async fn should_suspend(&self) -> Result<bool, ControllerError> {
        if !self.stop_requested.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let _guard = self.transition_lock.lock().await;
        let current = self.current_state().await?;
        if current == SyncStatus::Stopped {
            return Ok(true);
        }
        if let Ok(next) = apply_transition(current, Event::Pause) {
            self.store
                .update_service_sync_state(&self.email, self.service, next)
                .await?;
        }
        Ok(true)
    }

    async fn finish(&self, event: Event) -> Result<(), ControllerError> {
        let _guard = self.transition_lock.lock().await;
        let current = self.current_state().await?;
        if current != SyncStatus::Running {
            // Paused or stopped concurrently; don't clobber that outcome.
            return Ok(());
        }
        let next = apply_transition(current, event)?;
        self.store
            .update_service_sync_state(&self.email, self.service, next)
            .await?;
        Ok(())
    }

    async fn emit(&self, org_id: Key, connector_name: &str, outcome: &EmittableRecord) {
        let event_type = match outcome.change {
            RecordChange::Created => EventType::Create,
            RecordChange::Updated => EventType::Update,
        };
        let envelope = EventEnvelope {
            org_id,
            record_id: outcome.key,
            record_name: outcome.record_name.clone(),
            record_type: outcome.record_type,
            record_version: outcome.version,
            event_type,
            body: None,
            signed_url_route: EventEnvelope::signed_url_route(outcome.key),
            metadata_route: EventEnvelope::metadata_route(outcome.key),
            connector_name: connector_name.to_string(),
            record_source: "CONNECTOR".to_string(),
            mime_type: outcome.mime_type.clone(),
            extension: outcome.extension.clone(),
            thread_id: outcome.thread_id.clone(),
            created_at_source_timestamp: outcome.source_created.map(|d| d.timestamp()).unwrap_or(0),
            modified_at_source_timestamp: outcome
                .source_modified
                .map(|d| d.timestamp())
                .unwrap_or(0),
        };
        self.emitter.emit(envelope).await;
    }

    async fn fetch_thread_batch(
        &self,
        provider: &dyn MailUserSurface,
        thread_id: &str,
    ) -> Result<ThreadBatch, ControllerError> {
        let messages = provider.list_messages(thread_id).await?;
        let mut attachments = HashMap::new();
        for msg in &messages {
            let atts = provider.list_attachments(&msg.id).await?;
            if !atts.is_empty() {
                attachments.insert(msg.id.clone(), atts);
            }
        }
        let permissions = provider.list_message_permissions(thread_id).await?;
        Ok(ThreadBatch {
            thread_id: thread_id.to_string(),
            messages,
            attachments,
            permissions,
        })
    }

    /// Drive C5→C1→C2 across every thread for this user's mailbox, in
    /// batches of `config.mail_thread_batch_size` threads.
    pub async fn run_mail_sync(
        &self,
        provider: &dyn MailUserSurface,
        org_id: Key,
        connector_name: &str,
    ) -> Result<(), ControllerError> {
        if self.current_state().await? != SyncStatus::Running {
            log::warn!(
                "run_mail_sync({}/{}): not RUNNING, skipping",
                self.email,
                self.service
            );
            return Ok(());
        }

        let thread_ids = provider.list_threads().await?;

        for chunk in thread_ids.chunks(self.config.mail_thread_batch_size.max(1)) {
            if self.should_suspend().await? {
                return Ok(());
            }

            let _sync_guard = self.sync_lock.lock().await;
            let mut txn = self.store.begin_txn().await;
            let mut outcomes = Vec::new();
            let mut batch_failed = false;

            for thread_id in chunk {
                let batch = match self.fetch_thread_batch(provider, thread_id).await {
                    Ok(b) => b,
                    Err(ControllerError::Provider(err)) => {
                        log::warn!("thread {thread_id}: provider error, skipping: {err}");
                        continue;
                    }
                    Err(err) => {
                        log::warn!("thread {thread_id}: skipping: {err}");
                        continue;
                    }
                };
                match transform::transform_mail_thread(self.store.as_ref(), &mut txn, connector_name, &batch)
                    .await
                {
                    Ok(mut produced) => outcomes.append(&mut produced),
                    Err(err) => {
                        log::error!("thread {thread_id}: transform failed, aborting batch: {err}");
                        batch_failed = true;
                        break;
                    }
                }
            }

            if batch_failed {
                self.store.abort(txn, "mail transform failure").await?;
                continue;
            }

            if let Err(err) = self.store.commit(txn).await {
                log::error!("mail batch commit failed, skipping batch: {err}");
                continue;
            }

            for outcome in &outcomes {
                self.emit(org_id, connector_name, outcome).await;
            }
        }

        self.finish(Event::InternalSuccess).await
    }

    /// Drive C5→C1→C2 across every shared drive for this user, skipping any
    /// drive whose own `driveSyncState` already reads `COMPLETED` (so a
    /// resumed sync does not redo finished drives).
    pub async fn run_drive_sync(
        &self,
        provider: &dyn DriveUserSurface,
        org_id: Key,
        user_key: Key,
        connector_name: &str,
    ) -> Result<(), ControllerError> {
        if self.current_state().await? != SyncStatus::Running {
            log::warn!(
                "run_drive_sync({}/{}): not RUNNING, skipping",
                self.email,
                self.service
            );
            return Ok(());
        }

        let drives = provider.list_shared_drives().await?;

        for drive in drives {
            if self.should_suspend().await? {
                return Ok(());
            }

            let drive_service = SyncStateRow::drive_service_key(&drive.id);
            let drive_state = self
                .store
                .get_sync_state(&self.email, &drive_service)
                .await?
                .map(|r| r.sync_state)
                .unwrap_or(SyncStatus::NotStarted);
            if drive_state == SyncStatus::Completed {
                continue;
            }

            let file_ids = provider.list_files_in_folder(&drive.id).await?;

            for chunk in file_ids.chunks(self.config.drive_file_batch_size.max(1)) {
                if self.should_suspend().await? {
                    return Ok(());
                }

                let _sync_guard = self.sync_lock.lock().await;
                let mut txn = self.store.begin_txn().await;

                let files = match provider.batch_fetch_metadata_and_permissions(chunk).await {
                    Ok(f) => f,
                    Err(err) => {
                        log::warn!("drive {}: metadata fetch failed, skipping chunk: {err}", drive.id);
                        self.store.abort(txn, "metadata fetch failure").await?;
                        continue;
                    }
                };

                if let Err(err) =
                    transform::transform_drive_vertex(self.store.as_ref(), &mut txn, user_key, &drive).await
                {
                    log::error!("drive {}: failed to write drive vertex: {err}", drive.id);
                    self.store.abort(txn, "drive vertex failure").await?;
                    continue;
                }

                let outcomes = match transform::transform_drive_batch(
                    self.store.as_ref(),
                    &mut txn,
                    org_id,
                    connector_name,
                    &files,
                )
                .await
                {
                    Ok(o) => o,
                    Err(err) => {
                        log::error!("drive {}: transform failed, aborting batch: {err}", drive.id);
                        self.store.abort(txn, "drive transform failure").await?;
                        continue;
                    }
                };

                if let Err(err) = self.store.commit(txn).await {
                    log::error!("drive batch commit failed, skipping batch: {err}");
                    continue;
                }

                for outcome in &outcomes {
                    self.emit(org_id, connector_name, outcome).await;
                }
            }

            self.store
                .update_sync_state(&self.email, &drive_service, SyncStatus::Completed, None)
                .await?;
        }

        self.finish(Event::InternalSuccess).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingEventEmitter;
    use crate::provider::testing::{MockProvider, MockThread, MockUserData};
    use crate::provider::{MessageHeaders, MessagePayload, ProviderFactory, ProviderMode, UserSurface};
    use crate::store::memory::InMemoryGraphStore;
    use chrono::{TimeZone, Utc};

    fn message(id: &str, thread: &str, secs: i64) -> MessagePayload {
        MessagePayload {
            id: id.to_string(),
            thread_id: thread.to_string(),
            internal_date: Utc.timestamp_opt(secs, 0).unwrap(),
            label_ids: vec![],
            headers: MessageHeaders {
                subject: format!("subject {id}"),
                from: "alice@x.com".to_string(),
                to: vec!["bob@x.com".to_string()],
                ..Default::default()
            },
            history_id: None,
            web_url: None,
        }
    }

    fn threads(n: usize) -> MockUserData {
        let mut data = MockUserData::default();
        for i in 0..n {
            data.threads.push(MockThread {
                thread_id: format!("T{i}"),
                messages: vec![message(&format!("m{i}"), &format!("T{i}"), i as i64)],
                attachments: HashMap::new(),
                permissions: vec![],
            });
        }
        data
    }

    #[tokio::test]
    async fn start_is_rejected_while_running() {
        let store: Arc<dyn GraphStore> = Arc::new(InMemoryGraphStore::new());
        let emitter: Arc<dyn EventEmitter> = Arc::new(RecordingEventEmitter::new());
        let controller = SyncController::new(
            "alice@x.com",
            ServiceType::Mail,
            store,
            emitter,
            SyncCoreConfig::default(),
        );

        assert!(controller.start().await);
        assert!(!controller.start().await);
    }

    #[tokio::test]
    async fn pause_after_two_batches_leaves_no_partial_thread() {
        let store: Arc<dyn GraphStore> = Arc::new(InMemoryGraphStore::new());
        let emitter: Arc<dyn EventEmitter> = Arc::new(RecordingEventEmitter::new());
        let mut config = SyncCoreConfig::default();
        config.mail_thread_batch_size = 50;

        let provider = MockProvider::new(ProviderMode::Individual)
            .with_user_data("alice@x.com", threads(120));
        let surface = provider.delegate_for("alice@x.com").await.unwrap();
        let mail = surface.mail().unwrap();

        let controller = Arc::new(SyncController::new(
            "alice@x.com",
            ServiceType::Mail,
            store.clone(),
            emitter,
            config,
        ));
        assert!(controller.start().await);

        // Pause concurrently once the controller itself observes it is
        // running; since this test drives the loop directly we simulate
        // "pause requested after the second batch" by flipping the flag
        // once the first two 50-thread batches have committed.
        let committed_before = store.record_count_by_type(crate::model::RecordType::Message).await.unwrap();
        assert_eq!(committed_before, 0);

        // Run to completion once (120 threads / 50 = 3 batches) but request
        // a pause right after kicking the run off, from a second task, and
        // assert whatever prefix landed is a whole multiple of the batch size.
        let pauser = controller.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            pauser.pause().await;
        });

        controller.run_mail_sync(mail, Key::new_v4(), "gmail").await.unwrap();

        let committed = store.record_count_by_type(crate::model::RecordType::Message).await.unwrap();
        assert_eq!(committed % 50, 0, "a partial batch must never be committed");
    }

    #[tokio::test]
    async fn stop_leaves_the_suspend_flag_set_for_the_run_loop_to_observe() {
        let store: Arc<dyn GraphStore> = Arc::new(InMemoryGraphStore::new());
        let emitter: Arc<dyn EventEmitter> = Arc::new(RecordingEventEmitter::new());
        let controller = SyncController::new(
            "alice@x.com",
            ServiceType::Mail,
            store.clone(),
            emitter,
            SyncCoreConfig::default(),
        );

        assert!(controller.start().await);
        assert!(controller.stop().await);

        // A hard stop must not self-clear the flag it just set: a run loop
        // blocked elsewhere has to observe it was asked to suspend the next
        // time it checks, rather than finding the flag already cleared and
        // racing through every remaining batch to completion.
        assert!(controller.stop_requested.load(Ordering::SeqCst));
        assert!(
            controller.should_suspend().await.unwrap(),
            "should_suspend must report true after stop()"
        );

        let row = store.get_sync_state("alice@x.com", "mail").await.unwrap().unwrap();
        assert_eq!(row.sync_state, SyncStatus::Stopped);
    }

    #[tokio::test]
    async fn stop_cancels_the_in_flight_run_instead_of_finishing_it() {
        let store: Arc<dyn GraphStore> = Arc::new(InMemoryGraphStore::new());
        let emitter: Arc<dyn EventEmitter> = Arc::new(RecordingEventEmitter::new());
        let mut config = SyncCoreConfig::default();
        config.mail_thread_batch_size = 1;

        let provider =
            MockProvider::new(ProviderMode::Individual).with_user_data("alice@x.com", threads(120));
        let surface = provider.delegate_for("alice@x.com").await.unwrap();
        let mail = surface.mail().unwrap();

        let controller = Arc::new(SyncController::new(
            "alice@x.com",
            ServiceType::Mail,
            store.clone(),
            emitter,
            config,
        ));
        assert!(controller.start().await);

        let stopper = controller.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            assert!(stopper.stop().await);
        });

        controller.run_mail_sync(mail, Key::new_v4(), "gmail").await.unwrap();

        let committed = store.record_count_by_type(crate::model::RecordType::Message).await.unwrap();
        assert!(
            committed < 120,
            "stop must cancel remaining batches, not run them all to completion"
        );

        let row = store.get_sync_state("alice@x.com", "mail").await.unwrap().unwrap();
        assert_eq!(row.sync_state, SyncStatus::Stopped);
    }
}
