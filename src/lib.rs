pub mod config;
pub mod error;
pub mod events;
pub mod model;
pub mod orchestrator;
pub mod permissions;
pub mod provider;
pub mod store;
pub mod sync;
pub mod transform;
pub mod watch;

use std::sync::Once;

use env_logger::Env;

pub use config::SyncCoreConfig;
pub use error::CoreError;

static LOGGER: Once = Once::new();

/// Initializes the process-wide logger exactly once. Safe to call from
/// both `main` and test setup.
pub fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    });
}
