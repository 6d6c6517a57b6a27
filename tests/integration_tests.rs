//! Integration tests for the logging pipeline
//!
//! These tests verify:
//! - Minimum-level filtering end to end
//! - Sampler bypass for critical levels
//! - Redaction of messages and structured data
//! - Burst deduplication with aggregated delivery
//! - Trace-id scoping
//! - Store persistence, retention, and queries through the dispatcher
//! - Remote failure isolation
//! - Shutdown / re-init lifecycle

use logpipe::prelude::*;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

/// Tests share the process-wide runtime; serialize the ones that touch it.
static RUNTIME_GUARD: Mutex<()> = Mutex::new(());

struct TestSink {
    entries: Mutex<Vec<LogEntry>>,
}

impl TestSink {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(Vec::new()),
        })
    }

    fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }
}

impl Transport for TestSink {
    fn name(&self) -> &str {
        "test-sink"
    }

    fn log(&self, entry: &LogEntry) -> logpipe::Result<()> {
        self.entries.lock().push(entry.clone());
        Ok(())
    }
}

async fn fresh_runtime(config: RuntimeConfig) -> (Arc<Dispatcher>, Arc<TestSink>) {
    shutdown().await;
    let dispatcher = init(RuntimeConfig {
        enable_console: false,
        ..config
    });
    let sink = TestSink::new();
    dispatcher.register_transport(sink.clone()).await;
    (dispatcher, sink)
}

#[tokio::test]
async fn test_min_level_scenario() {
    let _guard = RUNTIME_GUARD.lock();
    let (_dispatcher, sink) = fresh_runtime(RuntimeConfig {
        min_level: LogLevel::Warn,
        ..Default::default()
    })
    .await;

    let log = logger("app");
    log.debug("x");
    log.warn("y");

    let entries = sink.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].level, LogLevel::Warn);
    assert_eq!(entries[0].message, "y");
    shutdown().await;
}

#[tokio::test]
async fn test_critical_levels_bypass_sampling() {
    let _guard = RUNTIME_GUARD.lock();
    let mut sampling = HashMap::new();
    sampling.insert("noisy".to_string(), SamplingRule::new(0.0));
    let (_dispatcher, sink) = fresh_runtime(RuntimeConfig {
        min_level: LogLevel::Trace,
        sampling,
        ..Default::default()
    })
    .await;

    let log = logger("noisy");
    for _ in 0..10 {
        log.info("sampled away");
    }
    log.error("always delivered");

    let entries = sink.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].level, LogLevel::Error);
    shutdown().await;
}

#[tokio::test]
async fn test_bearer_pattern_redaction() {
    let _guard = RUNTIME_GUARD.lock();
    let (_dispatcher, sink) = fresh_runtime(RuntimeConfig {
        redaction: RedactionConfig {
            redact_patterns: vec![r"Bearer \w+".to_string()],
            ..Default::default()
        },
        ..Default::default()
    })
    .await;

    logger("auth").info_with("token issued", json!({ "note": "Bearer abc123" }));

    let entries = sink.entries();
    let data = entries[0].data.as_ref().unwrap();
    assert_eq!(data["note"], json!("[REDACTED]"));
    shutdown().await;
}

#[tokio::test]
async fn test_nested_sensitive_key_redaction() {
    let _guard = RUNTIME_GUARD.lock();
    let (_dispatcher, sink) = fresh_runtime(RuntimeConfig::default()).await;

    logger("vault").info_with(
        "stored",
        json!({ "outer": { "apiKey": "secret" }, "count": 2, "ok": true }),
    );

    let data = sink.entries()[0].data.clone().unwrap();
    assert_eq!(data["outer"]["apiKey"], json!("[REDACTED]"));
    assert_eq!(data["count"], json!(2));
    assert_eq!(data["ok"], json!(true));
    shutdown().await;
}

#[tokio::test]
async fn test_dedupe_suppresses_and_aggregates() {
    let _guard = RUNTIME_GUARD.lock();
    let (_dispatcher, sink) = fresh_runtime(RuntimeConfig::default()).await;

    let log = logger("repeat");
    log.info("same thing");
    log.info("same thing");
    assert_eq!(sink.entries().len(), 1, "second call suppressed");

    for _ in 0..8 {
        log.info("same thing");
    }
    let entries = sink.entries();
    assert_eq!(entries.len(), 2, "tenth call aggregates");
    assert_eq!(
        entries[1].data.as_ref().unwrap()["occurrences"],
        json!(10)
    );
    shutdown().await;
}

#[tokio::test]
async fn test_trace_scoping() {
    let _guard = RUNTIME_GUARD.lock();
    let (dispatcher, sink) = fresh_runtime(RuntimeConfig::default()).await;

    let log = logger("traced");
    dispatcher.context().with_trace(|trace_id| {
        log.info("inside");
        assert_eq!(sink.entries()[0].trace_id.as_deref(), Some(trace_id));
    });
    log.info("outside");

    let entries = sink.entries();
    assert!(entries[1].trace_id.is_none());
    shutdown().await;
}

#[tokio::test]
async fn test_context_layers_merge_into_entries() {
    let _guard = RUNTIME_GUARD.lock();
    let (dispatcher, sink) = fresh_runtime(RuntimeConfig::default()).await;
    dispatcher.context().set_ambient("app", json!("desktop"));

    let log = logger("ctx").with_context(json!({ "component": "editor" }));
    log.info_with("typed", json!({ "chars": 12 }));

    let data = sink.entries()[0].data.clone().unwrap();
    assert_eq!(data["app"], json!("desktop"));
    assert_eq!(data["component"], json!("editor"));
    assert_eq!(data["chars"], json!(12));
    shutdown().await;
}

#[tokio::test]
async fn test_error_cause_carries_error_shape() {
    let _guard = RUNTIME_GUARD.lock();
    let (_dispatcher, sink) = fresh_runtime(RuntimeConfig::default()).await;

    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing config");
    logger("startup").error_cause("could not read config", &io);

    let entries = sink.entries();
    assert_eq!(entries[0].level, LogLevel::Error);
    let error = &entries[0].data.as_ref().unwrap()["error"];
    assert_eq!(error["message"], json!("missing config"));
    assert!(entries[0].stack.is_some(), "stack captured for error_cause");
    shutdown().await;
}

#[tokio::test]
async fn test_store_roundtrip_through_dispatcher() {
    let _guard = RUNTIME_GUARD.lock();
    let dir = tempfile::tempdir().unwrap();
    let (dispatcher, _sink) = fresh_runtime(RuntimeConfig {
        min_level: LogLevel::Trace,
        ..Default::default()
    })
    .await;

    let store = Arc::new(
        StoreTransport::open(dir.path().join("logs.redb"), 10, 100, 7).unwrap(),
    );
    dispatcher.register_transport(store.clone()).await;

    let log = logger("persisted");
    log.info("first");
    log.warn("second");
    log.with_tags(vec!["durable".to_string()]).info("third");
    dispatcher.flush().await;

    let entries = store.query(&LogQuery::default().module("persisted")).unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].message, "first");

    let tagged = store.query(&LogQuery::default().tag("durable")).unwrap();
    assert_eq!(tagged.len(), 1);
    assert_eq!(tagged[0].message, "third");

    let stats = store.stats().unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.by_level["warn"], 1);
    shutdown().await;
}

#[tokio::test]
async fn test_failing_remote_never_reaches_caller() {
    let _guard = RUNTIME_GUARD.lock();
    let (dispatcher, sink) = fresh_runtime(RuntimeConfig::default()).await;

    let remote = Arc::new(
        RemoteTransport::with_timeout("http://127.0.0.1:9/ingest", std::time::Duration::from_millis(300))
            .unwrap()
            .with_retry(2, std::time::Duration::from_millis(5)),
    );
    dispatcher.register_transport(remote.clone()).await;

    let log = logger("shipping");
    log.info("queued");
    // Flush tolerates the unreachable collector; nothing panics or raises.
    dispatcher.flush().await;

    assert_eq!(sink.entries().len(), 1, "other transports still delivered");
    assert_eq!(remote.pending_count(), 1, "entry retained for retry");
    shutdown().await;
}

#[tokio::test]
async fn test_shutdown_then_reinit() {
    let _guard = RUNTIME_GUARD.lock();
    let (_dispatcher, _sink) = fresh_runtime(RuntimeConfig {
        min_level: LogLevel::Error,
        ..Default::default()
    })
    .await;
    shutdown().await;

    // A fresh default runtime comes up on first use.
    let dispatcher = global();
    assert_eq!(dispatcher.config().min_level, LogLevel::Info);

    // And logging still works without any explicit init.
    logger("post-shutdown").info("no panic");
    shutdown().await;
}

#[tokio::test]
async fn test_bootstrap_wires_enabled_transports() {
    let _guard = RUNTIME_GUARD.lock();
    shutdown().await;
    let dir = tempfile::tempdir().unwrap();

    let dispatcher = bootstrap(RuntimeConfig {
        enable_storage: true,
        data_dir: Some(dir.path().to_path_buf()),
        ..Default::default()
    })
    .await;

    let names = dispatcher.transport_names();
    assert!(names.contains(&"store".to_string()));

    // Console arrives lazily with the first dispatch.
    logger("boot").info("hello");
    assert!(dispatcher.transport_names().contains(&"console".to_string()));
    shutdown().await;
}

#[tokio::test]
async fn test_high_volume_fanout() {
    let _guard = RUNTIME_GUARD.lock();
    let (_dispatcher, sink) = fresh_runtime(RuntimeConfig {
        min_level: LogLevel::Trace,
        ..Default::default()
    })
    .await;

    let log = logger("volume");
    for i in 0..500 {
        // Distinct messages so deduplication stays out of the way.
        log.debug(format!("message {}", i));
    }

    assert_eq!(sink.entries().len(), 500);
    shutdown().await;
}
