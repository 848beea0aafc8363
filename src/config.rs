//! Environment-driven tunables for the Sync Controller and Watch Bootstrapper.
//!
//! A small struct with a `from_env` constructor, falling back to fixed
//! defaults when a variable is unset or unparsable.

use std::env;

/// Batch sizes, fan-out width, and the watch-bootstrap toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCoreConfig {
    /// Threads committed together as one mail sync batch.
    pub mail_thread_batch_size: usize,
    /// Files committed together as one drive sync batch.
    pub drive_file_batch_size: usize,
    /// Generic fallback batch size for callers that don't distinguish service type.
    pub default_batch_size: usize,
    /// Maximum number of per-user sync tasks running concurrently.
    pub fan_out_width: usize,
    /// Whether the Orchestrator bootstraps watch channels during `initialize`.
    pub bootstrap_watches: bool,
}

impl Default for SyncCoreConfig {
    fn default() -> Self {
        Self {
            mail_thread_batch_size: 50,
            drive_file_batch_size: 50,
            default_batch_size: 100,
            fan_out_width: 8,
            bootstrap_watches: true,
        }
    }
}

impl SyncCoreConfig {
    /// Reads overrides from the process environment, falling back to
    /// [`SyncCoreConfig::default`] for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            mail_thread_batch_size: env_usize(
                "SYNC_MAIL_THREAD_BATCH_SIZE",
                defaults.mail_thread_batch_size,
            ),
            drive_file_batch_size: env_usize(
                "SYNC_DRIVE_FILE_BATCH_SIZE",
                defaults.drive_file_batch_size,
            ),
            default_batch_size: env_usize("SYNC_DEFAULT_BATCH_SIZE", defaults.default_batch_size),
            fan_out_width: env_usize("SYNC_FAN_OUT_WIDTH", defaults.fan_out_width),
            bootstrap_watches: env_bool("SYNC_BOOTSTRAP_WATCHES", defaults.bootstrap_watches),
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_fixed_batch_sizes() {
        let cfg = SyncCoreConfig::default();
        assert_eq!(cfg.mail_thread_batch_size, 50);
        assert_eq!(cfg.drive_file_batch_size, 50);
        assert_eq!(cfg.default_batch_size, 100);
    }

    #[test]
    fn from_env_falls_back_when_unset() {
        env::remove_var("SYNC_FAN_OUT_WIDTH");
        let cfg = SyncCoreConfig::from_env();
        assert_eq!(cfg.fan_out_width, SyncCoreConfig::default().fan_out_width);
    }
}
