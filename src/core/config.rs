//! Runtime configuration for the pipeline
//!
//! `RuntimeConfig` is the process-wide settings surface: level threshold,
//! destination toggles, sampling rules, buffering, and redaction. It is
//! serde round-trippable with the camelCase option names the settings layer
//! persists.

use super::level::LogLevel;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Per-module sampling rule, resolved by exact module name, else by the
/// longest matching module-name prefix, else the library default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SamplingRule {
    /// Sample rate in [0, 1]. 1.0 passes everything, 0.0 drops everything
    /// below Error.
    pub rate: f64,

    /// Minimum interval between emissions for the same (module, level) key,
    /// in milliseconds.
    #[serde(rename = "minInterval", skip_serializing_if = "Option::is_none")]
    pub min_interval_ms: Option<u64>,

    /// Maximum emissions for the same (module, level) key per rolling
    /// one-second window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub burst_limit: Option<u32>,
}

impl Default for SamplingRule {
    fn default() -> Self {
        Self {
            rate: 1.0,
            min_interval_ms: None,
            burst_limit: None,
        }
    }
}

impl SamplingRule {
    pub fn new(rate: f64) -> Self {
        Self {
            rate: rate.clamp(0.0, 1.0),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval_ms = Some(interval.as_millis() as u64);
        self
    }

    #[must_use]
    pub fn with_burst_limit(mut self, limit: u32) -> Self {
        self.burst_limit = Some(limit);
        self
    }

    pub fn min_interval(&self) -> Option<Duration> {
        self.min_interval_ms.map(Duration::from_millis)
    }
}

/// Configuration for scrubbing sensitive content from entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RedactionConfig {
    pub enabled: bool,

    /// Sensitive key names, matched case- and separator-insensitively by
    /// equality or substring containment.
    pub redact_keys: Vec<String>,

    /// Regex sources applied (case-insensitively) to message, stack, and
    /// string data values. Invalid patterns are skipped, never fatal.
    pub redact_patterns: Vec<String>,

    /// Replacement token for redacted content.
    pub replacement: String,

    /// Maximum traversal depth for the structured data walk.
    pub max_depth: usize,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            redact_keys: vec![
                "password".to_string(),
                "secret".to_string(),
                "token".to_string(),
                "apikey".to_string(),
                "authorization".to_string(),
                "cookie".to_string(),
            ],
            redact_patterns: Vec::new(),
            replacement: "[REDACTED]".to_string(),
            max_depth: 8,
        }
    }
}

/// Process-wide pipeline configuration.
///
/// Created at first use with defaults, replaceable via `init`, and reset by
/// `shutdown`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeConfig {
    pub min_level: LogLevel,

    pub enable_console: bool,
    pub enable_storage: bool,
    pub enable_remote: bool,

    /// Required when `enable_remote` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_endpoint: Option<String>,

    /// Extra headers sent with every remote batch.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub remote_headers: HashMap<String, String>,

    pub max_storage_entries: u64,
    pub retention_days: u32,

    pub include_stack_trace: bool,
    /// Off by default; call sites pay for capture only when enabled.
    pub include_source: bool,

    /// Module pattern (exact name or prefix) to sampling rule.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub sampling: HashMap<String, SamplingRule>,

    /// Buffered-transport flush threshold, in entries.
    pub buffer_size: usize,

    /// Timed flush cadence, in milliseconds.
    #[serde(rename = "flushInterval")]
    pub flush_interval_ms: u64,

    pub redaction: RedactionConfig,

    /// Directory for the session-id file and the embedded store. When
    /// absent, the session id lives in memory only and the store sink
    /// cannot be enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            enable_console: true,
            enable_storage: false,
            enable_remote: false,
            remote_endpoint: None,
            remote_headers: HashMap::new(),
            max_storage_entries: 10_000,
            retention_days: 7,
            include_stack_trace: true,
            include_source: false,
            sampling: HashMap::new(),
            buffer_size: 50,
            flush_interval_ms: 5_000,
            redaction: RedactionConfig::default(),
            data_dir: None,
        }
    }
}

impl RuntimeConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Validate cross-field constraints. Called by `init`; a failed check
    /// falls back to a corrected config rather than panicking, per the
    /// never-raise contract.
    pub fn validated(mut self) -> Self {
        if self.enable_remote && self.remote_endpoint.is_none() {
            eprintln!("[LOGPIPE WARNING] remote transport enabled without an endpoint; disabling");
            self.enable_remote = false;
        }
        if self.enable_storage && self.data_dir.is_none() {
            eprintln!("[LOGPIPE WARNING] storage transport enabled without a data dir; disabling");
            self.enable_storage = false;
        }
        for rule in self.sampling.values_mut() {
            rule.rate = rule.rate.clamp(0.0, 1.0);
        }
        self
    }
}
