//! Watch Bootstrapper (C7).
//!
//! Registers a provider change-watch channel per (principal, service),
//! persists its opaque resume token, and immediately takes (and discards)
//! one page of changes so the token is bound to "everything after this
//! point".

mod error;

pub use error::WatchError;

use std::sync::Arc;

use crate::model::{Channel, ServiceType};
use crate::provider::{ChangeWatchSurface, ProviderFactory, UserSurface};
use crate::store::GraphStore;

pub struct WatchBootstrapper {
    store: Arc<dyn GraphStore>,
}

impl WatchBootstrapper {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Register one channel for `email`/`service` against `surface`, and
    /// persist its resume token.
    pub async fn register<S: ChangeWatchSurface + ?Sized>(
        &self,
        email: &str,
        service: ServiceType,
        surface: &S,
    ) -> Result<(), WatchError> {
        let descriptor = surface.create_watch().await?;
        let channel = Channel {
            channel_id: descriptor.channel_id.clone(),
            resource_id: descriptor.resource_id.clone(),
            principal_email: email.to_string(),
            service_type: service,
            token: descriptor.token.clone(),
            expiry: descriptor.expiry,
        };
        self.store.store_channel(channel).await?;

        // Delta application is out of scope; discard the first page so the
        // persisted token reads as "everything observed after registration".
        let _ = surface.get_changes(&descriptor.token).await?;

        log::info!(
            "registered watch channel {} for {email} ({service})",
            descriptor.channel_id
        );
        Ok(())
    }

    /// Fan out channel registration across every (principal, service) pair,
    /// bounded by `fan_out` concurrent registrations — channel registration
    /// is itself rate-limited provider I/O.
    pub async fn register_all(
        &self,
        factory: Arc<dyn ProviderFactory>,
        principals: Vec<(String, Vec<ServiceType>)>,
        fan_out: usize,
    ) -> Result<(), WatchError> {
        let semaphore = Arc::new(tokio::sync::Semaphore::new(fan_out.max(1)));
        let mut tasks = tokio::task::JoinSet::new();

        for (email, services) in principals {
            for service in services {
                let store = self.store.clone();
                let factory = factory.clone();
                let semaphore = semaphore.clone();
                tasks.spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .expect("watch bootstrap semaphore closed");
                    let bootstrapper = WatchBootstrapper { store };
                    let surface = match factory.delegate_for(&email).await {
                        Ok(s) => s,
                        Err(err) => {
                            log::warn!("watch bootstrap: delegate_for({email}) failed: {err}");
                            return;
                        }
                    };
                    let result = match service {
                        ServiceType::Mail => match surface.mail() {
                            Some(mail) => bootstrapper.register(&email, service, mail).await,
                            None => Ok(()),
                        },
                        ServiceType::Drive => match surface.drive() {
                            Some(drive) => bootstrapper.register(&email, service, drive).await,
                            None => Ok(()),
                        },
                    };
                    if let Err(err) = result {
                        log::warn!("watch bootstrap failed for {email} ({service}): {err}");
                    }
                });
            }
        }

        while tasks.join_next().await.is_some() {}
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::{MockProvider, MockUserData};
    use crate::provider::ProviderMode;
    use crate::store::memory::InMemoryGraphStore;

    #[tokio::test]
    async fn register_persists_a_channel_row() {
        let store: Arc<dyn GraphStore> = Arc::new(InMemoryGraphStore::new());
        let provider = Arc::new(
            MockProvider::new(ProviderMode::Individual)
                .with_user_data("alice@x.com", MockUserData::default()),
        );
        let bootstrapper = WatchBootstrapper::new(store.clone());

        bootstrapper
            .register_all(
                provider,
                vec![("alice@x.com".to_string(), vec![ServiceType::Mail])],
                4,
            )
            .await
            .unwrap();
    }
}
