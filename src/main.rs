//! Demo CLI entrypoint: wires the in-memory `GraphStore`, a logging event
//! emitter, and the mock provider through one tenant's `Orchestrator` run.
//! A small `clap::Parser` binary wiring concrete collaborators and calling
//! straight into library code, no web framework involved.

use std::sync::Arc;

use chrono::Utc;
use clap::Parser;

use syncgraph_core::events::LoggingEventEmitter;
use syncgraph_core::orchestrator::Orchestrator;
use syncgraph_core::provider::testing::{MockDrive, MockProvider, MockThread, MockUserData};
use syncgraph_core::provider::{DriveInfo, MessageHeaders, MessagePayload, PrincipalPayload, ProviderMode};
use syncgraph_core::store::memory::InMemoryGraphStore;
use syncgraph_core::{init_logger, CoreError, SyncCoreConfig};

/// Runs one tenant's mail/drive sync against the crate's in-memory store and
/// mock provider, for local exploration of the Sync Controller and
/// Orchestrator without a live mail/drive backend.
#[derive(Debug, Parser)]
#[command(name = "syncgraph-core", about = "Mail/drive sync core demo runner")]
struct Cli {
    /// Tenant organization name to hydrate and sync.
    #[arg(long, default_value = "Acme Inc")]
    org: String,

    /// Demo principal's email address.
    #[arg(long, default_value = "alice@acme.example")]
    principal: String,

    /// Disable watch-channel bootstrap for this run.
    #[arg(long)]
    no_watch: bool,
}

fn demo_user_data() -> MockUserData {
    let mut data = MockUserData::default();
    data.threads.push(MockThread {
        thread_id: "T-welcome".to_string(),
        messages: vec![MessagePayload {
            id: "m-welcome-1".to_string(),
            thread_id: "T-welcome".to_string(),
            internal_date: Utc::now(),
            label_ids: vec!["INBOX".to_string()],
            headers: MessageHeaders {
                subject: "Welcome to syncgraph-core".to_string(),
                from: "onboarding@acme.example".to_string(),
                to: vec!["alice@acme.example".to_string()],
                ..Default::default()
            },
            history_id: None,
            web_url: None,
        }],
        attachments: Default::default(),
        permissions: vec![],
    });
    data.drives.push(MockDrive {
        info: DriveInfo {
            id: "drive-shared-1".to_string(),
            name: "Shared Drive".to_string(),
            access_level: "writer".to_string(),
        },
        files: vec![],
    });
    data
}

#[tokio::main]
async fn main() -> Result<(), CoreError> {
    init_logger();

    let cli = Cli::parse();
    log::info!("starting demo run for org '{}', principal {}", cli.org, cli.principal);

    let store = Arc::new(InMemoryGraphStore::new());
    let emitter = Arc::new(LoggingEventEmitter::default());

    let provider = Arc::new(
        MockProvider::new(ProviderMode::Individual)
            .with_principal(PrincipalPayload {
                id: format!("demo-{}", cli.principal),
                primary_email: cli.principal.clone(),
                full_name: "Demo Principal".to_string(),
                creation_time: Utc::now(),
                suspended: false,
            })
            .with_user_data(cli.principal.clone(), demo_user_data()),
    );

    let mut config = SyncCoreConfig::from_env();
    if cli.no_watch {
        config.bootstrap_watches = false;
    }

    let orchestrator = Orchestrator::new(store, emitter, config, provider.clone(), provider);
    orchestrator.run_tenant(&cli.org).await?;

    log::info!("demo run complete");
    Ok(())
}
