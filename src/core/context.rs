//! Ambient logging context
//!
//! Holds the per-runtime session id, the current trace id, and a small
//! ambient key-value map merged into every entry's data.

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const SESSION_FILE: &str = "session-id";

/// Registry of ambient identifiers and context fields.
///
/// The session id is generated once per runtime session and persisted under
/// the configured data dir so it survives reloads; without a data dir it is
/// generated in memory only. The trace id is an ephemeral correlation slot
/// the caller sets, clears, or scopes via [`ContextRegistry::with_trace`].
pub struct ContextRegistry {
    session_id: String,
    trace_id: Mutex<Option<String>>,
    ambient: RwLock<Map<String, Value>>,
}

impl ContextRegistry {
    pub fn new(data_dir: Option<&Path>) -> Self {
        Self {
            session_id: Self::load_or_create_session_id(data_dir),
            trace_id: Mutex::new(None),
            ambient: RwLock::new(Map::new()),
        }
    }

    fn load_or_create_session_id(data_dir: Option<&Path>) -> String {
        let Some(dir) = data_dir else {
            return Uuid::new_v4().to_string();
        };

        let path: PathBuf = dir.join(SESSION_FILE);
        if let Ok(existing) = fs::read_to_string(&path) {
            let trimmed = existing.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }

        let fresh = Uuid::new_v4().to_string();
        // Persistence is best-effort; an unwritable dir degrades to an
        // in-memory session id.
        if fs::create_dir_all(dir).is_ok() {
            if let Err(e) = fs::write(&path, &fresh) {
                eprintln!("[LOGPIPE WARNING] could not persist session id: {}", e);
            }
        }
        fresh
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn trace_id(&self) -> Option<String> {
        self.trace_id.lock().clone()
    }

    pub fn set_trace_id(&self, trace_id: impl Into<String>) {
        *self.trace_id.lock() = Some(trace_id.into());
    }

    pub fn clear_trace_id(&self) {
        *self.trace_id.lock() = None;
    }

    /// Run `f` with a freshly generated trace id, restoring the previous
    /// value afterward.
    ///
    /// The restore is single-slot save-then-restore: a nested invocation's
    /// exit re-establishes the outermost saved value, not true stack
    /// nesting. Callers needing nested correlation should manage trace ids
    /// explicitly.
    pub fn with_trace<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&str) -> R,
    {
        let fresh = Uuid::new_v4().to_string();
        let previous = self.trace_id.lock().replace(fresh.clone());
        let result = f(&fresh);
        *self.trace_id.lock() = previous;
        result
    }

    /// Async variant of [`ContextRegistry::with_trace`], with the same
    /// single-slot restore semantics.
    pub async fn with_trace_async<F, Fut, R>(&self, f: F) -> R
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = R>,
    {
        let fresh = Uuid::new_v4().to_string();
        let previous = self.trace_id.lock().replace(fresh.clone());
        let result = f(fresh).await;
        *self.trace_id.lock() = previous;
        result
    }

    /// Set an ambient field merged into every entry's data (lowest
    /// precedence).
    pub fn set_ambient(&self, key: impl Into<String>, value: Value) {
        self.ambient.write().insert(key.into(), value);
    }

    pub fn remove_ambient(&self, key: &str) {
        self.ambient.write().remove(key);
    }

    pub fn clear_ambient(&self) {
        self.ambient.write().clear();
    }

    pub fn ambient_snapshot(&self) -> Map<String, Value> {
        self.ambient.read().clone()
    }
}
