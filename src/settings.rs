//! Persisted settings and pipeline bootstrap
//!
//! The thin composition layer: reads the user's persisted toggle surface
//! (a JSON file in the [`RuntimeConfig`] wire shape), installs the runtime,
//! and wires the enabled transports into it. A destination that cannot be
//! opened degrades with a side-channel warning; bootstrap itself never
//! fails.

use crate::core::{global, init, Dispatcher, Result, RuntimeConfig};
use crate::transports::{RemoteTransport, StoreTransport};
use std::path::Path;
use std::sync::Arc;

const STORE_FILE: &str = "logs.redb";

/// Load settings from `path`. A missing or unreadable file yields the
/// defaults; a corrupt file yields the defaults with a warning.
pub fn load_settings(path: impl AsRef<Path>) -> RuntimeConfig {
    let raw = match std::fs::read_to_string(path.as_ref()) {
        Ok(raw) => raw,
        Err(_) => return RuntimeConfig::default(),
    };
    match serde_json::from_str(&raw) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "[LOGPIPE WARNING] unreadable settings file {}: {}; using defaults",
                path.as_ref().display(),
                e
            );
            RuntimeConfig::default()
        }
    }
}

/// Persist settings as pretty JSON.
pub fn save_settings(path: impl AsRef<Path>, config: &RuntimeConfig) -> Result<()> {
    if let Some(parent) = path.as_ref().parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(config)?)?;
    Ok(())
}

/// Install a runtime from `config` and register the enabled transports.
/// Starts the threshold flushers and the interval flush timer; requires a
/// tokio runtime.
pub async fn bootstrap(config: RuntimeConfig) -> Arc<Dispatcher> {
    let dispatcher = init(config);
    let config = dispatcher.config();

    if config.enable_storage {
        // Validation guarantees a data dir when storage is enabled.
        if let Some(dir) = config.data_dir.as_ref() {
            match StoreTransport::open(
                dir.join(STORE_FILE),
                config.buffer_size,
                config.max_storage_entries,
                config.retention_days,
            ) {
                Ok(store) => {
                    let store = Arc::new(store);
                    store.spawn_flusher();
                    dispatcher.register_transport(store).await;
                }
                Err(e) => {
                    eprintln!("[LOGPIPE WARNING] store transport unavailable: {}", e);
                }
            }
        }
    }

    if config.enable_remote {
        if let Some(endpoint) = config.remote_endpoint.clone() {
            match RemoteTransport::new(endpoint) {
                Ok(remote) => {
                    let remote = Arc::new(
                        remote
                            .with_headers(config.remote_headers.clone())
                            .with_buffer_size(config.buffer_size),
                    );
                    remote.spawn_flusher();
                    dispatcher.register_transport(remote).await;
                }
                Err(e) => {
                    eprintln!("[LOGPIPE WARNING] remote transport unavailable: {}", e);
                }
            }
        }
    }

    dispatcher.spawn_flush_timer();
    dispatcher
}

/// Re-apply a changed settings surface to the current runtime without
/// rebuilding it (level, sampling, and redaction changes take effect on the
/// next call).
pub fn apply_settings(config: RuntimeConfig) {
    global().update_config(config);
}
