//! Runtime core: configuration, transport registry, and fan-out
//!
//! The dispatcher owns the process-wide pipeline state. Leveled calls run a
//! synchronous, non-blocking hot path — level filter, sampler, dedupe,
//! context merge, assembly, normalization, redaction — then fan out to every
//! registered transport with per-transport failure isolation. All I/O
//! happens later, inside transport `flush` implementations.

use super::{
    config::RuntimeConfig,
    context::ContextRegistry,
    entry::{LogEntry, SourceLocation},
    level::LogLevel,
    metrics::PipelineMetrics,
    normalize,
    redact::Redactor,
    sampler::{DedupeDecision, Sampler},
    transport::Transport,
};
use crate::transports::ConsoleTransport;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::panic::Location;
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;

const CONSOLE_TRANSPORT: &str = "console";

pub struct Dispatcher {
    config: RwLock<RuntimeConfig>,
    transports: RwLock<HashMap<String, Arc<dyn Transport>>>,
    sampler: Sampler,
    redactor: RwLock<Redactor>,
    context: ContextRegistry,
    metrics: PipelineMetrics,
    flush_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    pub fn new(config: RuntimeConfig) -> Arc<Self> {
        let config = config.validated();
        Arc::new(Self {
            sampler: Sampler::new(config.sampling.clone()),
            redactor: RwLock::new(Redactor::from_config(&config.redaction)),
            context: ContextRegistry::new(config.data_dir.as_deref()),
            metrics: PipelineMetrics::new(),
            transports: RwLock::new(HashMap::new()),
            flush_tasks: Mutex::new(Vec::new()),
            config: RwLock::new(config),
        })
    }

    pub fn config(&self) -> RuntimeConfig {
        self.config.read().clone()
    }

    pub fn context(&self) -> &ContextRegistry {
        &self.context
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    /// Replace the runtime configuration. Sampling rules and the compiled
    /// redactor follow; a console transport disabled here is dropped from
    /// the registry.
    pub fn update_config(&self, config: RuntimeConfig) {
        let config = config.validated();
        self.sampler.set_rules(config.sampling.clone());
        *self.redactor.write() = Redactor::from_config(&config.redaction);
        if !config.enable_console {
            self.transports.write().remove(CONSOLE_TRANSPORT);
        }
        *self.config.write() = config;
    }

    /// Register a transport under its name, closing any previous holder of
    /// that name first.
    pub async fn register_transport(&self, transport: Arc<dyn Transport>) {
        let name = transport.name().to_string();
        let previous = self.transports.write().insert(name.clone(), transport);
        if let Some(previous) = previous {
            if let Err(e) = previous.close().await {
                eprintln!("[LOGPIPE ERROR] closing replaced transport '{}': {}", name, e);
            }
        }
    }

    pub fn transport_names(&self) -> Vec<String> {
        self.transports.read().keys().cloned().collect()
    }

    fn ensure_console(&self) {
        if !self.config.read().enable_console {
            return;
        }
        if self.transports.read().contains_key(CONSOLE_TRANSPORT) {
            return;
        }
        self.transports
            .write()
            .entry(CONSOLE_TRANSPORT.to_string())
            .or_insert_with(|| Arc::new(ConsoleTransport::new()));
    }

    /// The hot path. Cheap rejections run before any merge, normalization,
    /// or redaction work.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn dispatch(
        &self,
        module: &str,
        level: LogLevel,
        message: &str,
        scope: Option<&Map<String, Value>>,
        data: Option<Value>,
        error: Option<Value>,
        tags: Option<&[String]>,
        caller: Option<&'static Location<'static>>,
    ) {
        let (min_level, include_stack, include_source) = {
            let config = self.config.read();
            (
                config.min_level,
                config.include_stack_trace,
                config.include_source,
            )
        };

        if level < min_level {
            self.metrics.record_level_filtered();
            return;
        }
        if !self.sampler.should_log(module, level) {
            self.metrics.record_sampled_out();
            return;
        }
        let occurrences = match self.sampler.check_dedupe(module, level, message) {
            DedupeDecision::Deliver => None,
            DedupeDecision::Suppress => {
                self.metrics.record_deduplicated();
                return;
            }
            DedupeDecision::Aggregate(count) => Some(count),
        };

        // Ambient context, then logger scope, then call-site data; later
        // layers win on key collision.
        let mut merged = self.context.ambient_snapshot();
        if let Some(scope) = scope {
            for (key, value) in scope {
                merged.insert(key.clone(), value.clone());
            }
        }
        match data {
            Some(Value::Object(map)) => merged.extend(map),
            Some(other) => {
                merged.insert("value".to_string(), other);
            }
            None => {}
        }
        let had_error = error.is_some();
        if let Some(error) = error {
            merged.insert("error".to_string(), error);
        }
        if let Some(count) = occurrences {
            merged.insert("occurrences".to_string(), Value::from(count));
        }
        normalize::normalize_map(&mut merged);

        let stack = if had_error && level.is_critical() && include_stack {
            Some(std::backtrace::Backtrace::force_capture().to_string())
        } else {
            None
        };
        let source = match caller {
            Some(location) if include_source => Some(SourceLocation::from_caller(location)),
            _ => None,
        };

        let mut entry = LogEntry::new(level, module, message)
            .with_trace_id(self.context.trace_id())
            .with_session_id(Some(self.context.session_id().to_string()))
            .with_data(merged)
            .with_stack(stack)
            .with_source(source)
            .with_tags(tags.map(<[String]>::to_vec).unwrap_or_default());

        self.redactor.read().redact_entry(&mut entry);

        self.ensure_console();
        let transports: Vec<Arc<dyn Transport>> =
            self.transports.read().values().cloned().collect();

        // Per-transport isolation: one broken sink cannot suppress delivery
        // to the rest, and nothing propagates to the logging caller.
        for transport in &transports {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                transport.log(&entry)
            }));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    self.metrics.record_transport_failure();
                    eprintln!(
                        "[LOGPIPE ERROR] transport '{}' failed: {}",
                        transport.name(),
                        e
                    );
                }
                Err(panic_info) => {
                    self.metrics.record_transport_failure();
                    let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                        s.to_string()
                    } else if let Some(s) = panic_info.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "unknown panic".to_string()
                    };
                    eprintln!(
                        "[LOGPIPE CRITICAL] transport '{}' panicked: {}. \
                         Other transports continue to function.",
                        transport.name(),
                        panic_msg
                    );
                }
            }
        }

        self.metrics.record_dispatched();
    }

    /// Await every transport's flush in parallel; individual failures are
    /// reported on the side channel and tolerated.
    pub async fn flush(&self) {
        let transports: Vec<Arc<dyn Transport>> =
            self.transports.read().values().cloned().collect();
        let results =
            futures::future::join_all(transports.iter().map(|t| t.flush())).await;
        for (transport, result) in transports.iter().zip(results) {
            if let Err(e) = result {
                self.metrics.record_transport_failure();
                eprintln!(
                    "[LOGPIPE ERROR] transport '{}' flush failed: {}",
                    transport.name(),
                    e
                );
            }
        }
    }

    /// Start the interval-driven flush task for buffered transports.
    /// Requires a tokio runtime; the task is stopped by `shutdown`.
    pub fn spawn_flush_timer(self: &Arc<Self>) {
        let dispatcher = Arc::clone(self);
        // tokio panics on a zero interval.
        let interval = self
            .config
            .read()
            .flush_interval()
            .max(std::time::Duration::from_millis(10));
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                dispatcher.flush().await;
            }
        });
        self.flush_tasks.lock().push(handle);
    }

    /// Flush, close every transport in parallel, clear the registry, and
    /// reset configuration, leaving the system re-initializable.
    pub async fn shutdown(&self) {
        for task in self.flush_tasks.lock().drain(..) {
            task.abort();
        }

        self.flush().await;

        let transports: Vec<Arc<dyn Transport>> =
            self.transports.write().drain().map(|(_, t)| t).collect();
        let results =
            futures::future::join_all(transports.iter().map(|t| t.close())).await;
        for (transport, result) in transports.iter().zip(results) {
            if let Err(e) = result {
                eprintln!(
                    "[LOGPIPE ERROR] transport '{}' close failed: {}",
                    transport.name(),
                    e
                );
            }
        }

        self.update_config(RuntimeConfig::default());
        self.metrics.reset();
    }
}

// ---------------------------------------------------------------------------
// Process-wide runtime
// ---------------------------------------------------------------------------

static RUNTIME: OnceLock<RwLock<Option<Arc<Dispatcher>>>> = OnceLock::new();

fn runtime_slot() -> &'static RwLock<Option<Arc<Dispatcher>>> {
    RUNTIME.get_or_init(|| RwLock::new(None))
}

/// Install a fresh runtime built from `config`, replacing any current one.
/// A previous runtime keeps its transports; call [`shutdown`] first to drain
/// and close them.
pub fn init(config: RuntimeConfig) -> Arc<Dispatcher> {
    let dispatcher = Dispatcher::new(config);
    *runtime_slot().write() = Some(Arc::clone(&dispatcher));
    dispatcher
}

/// The current runtime, created with defaults on first use.
pub fn global() -> Arc<Dispatcher> {
    if let Some(dispatcher) = runtime_slot().read().as_ref() {
        return Arc::clone(dispatcher);
    }
    let mut slot = runtime_slot().write();
    Arc::clone(slot.get_or_insert_with(|| Dispatcher::new(RuntimeConfig::default())))
}

/// Drain and close the current runtime, if any, leaving the process
/// re-initializable.
pub async fn shutdown() {
    let dispatcher = runtime_slot().write().take();
    if let Some(dispatcher) = dispatcher {
        dispatcher.shutdown().await;
    }
}

/// Set the ambient trace id on the current runtime.
pub fn set_trace_id(trace_id: impl Into<String>) {
    global().context().set_trace_id(trace_id);
}

pub fn clear_trace_id() {
    global().context().clear_trace_id();
}

// ---------------------------------------------------------------------------
// Caller-facing logger handles
// ---------------------------------------------------------------------------

/// Obtain a module-scoped logger handle.
pub fn logger(module: impl Into<String>) -> Logger {
    Logger {
        module: module.into(),
        scope: None,
        tags: None,
    }
}

/// A lightweight, cloneable handle bound to a module name, an optional
/// frozen context map, and an optional tag list. All handles share the
/// process-wide runtime; a runtime replaced via [`init`] is picked up by
/// existing handles.
#[derive(Debug, Clone)]
pub struct Logger {
    module: String,
    scope: Option<Arc<Map<String, Value>>>,
    tags: Option<Arc<Vec<String>>>,
}

impl Logger {
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Derive a child logger with a `::`-joined sub-module name.
    pub fn child(&self, name: &str) -> Logger {
        Logger {
            module: format!("{}::{}", self.module, name),
            scope: self.scope.clone(),
            tags: self.tags.clone(),
        }
    }

    /// Derive a logger carrying extra frozen context merged into every
    /// entry. Later derivations win on key collision; non-object values
    /// land under a `"context"` key.
    pub fn with_context(&self, context: Value) -> Logger {
        let mut merged = self
            .scope
            .as_deref()
            .cloned()
            .unwrap_or_default();
        match context {
            Value::Object(map) => merged.extend(map),
            other => {
                merged.insert("context".to_string(), other);
            }
        }
        Logger {
            module: self.module.clone(),
            scope: Some(Arc::new(merged)),
            tags: self.tags.clone(),
        }
    }

    /// Derive a logger whose entries carry the given tags.
    pub fn with_tags(&self, tags: Vec<String>) -> Logger {
        Logger {
            module: self.module.clone(),
            scope: self.scope.clone(),
            tags: Some(Arc::new(tags)),
        }
    }

    #[track_caller]
    pub fn log(&self, level: LogLevel, message: impl AsRef<str>) {
        let caller = Location::caller();
        self.emit(level, message.as_ref(), None, None, caller);
    }

    #[track_caller]
    pub fn log_with(&self, level: LogLevel, message: impl AsRef<str>, data: Value) {
        let caller = Location::caller();
        self.emit(level, message.as_ref(), Some(data), None, caller);
    }

    #[track_caller]
    pub fn trace(&self, message: impl AsRef<str>) {
        let caller = Location::caller();
        self.emit(LogLevel::Trace, message.as_ref(), None, None, caller);
    }

    #[track_caller]
    pub fn trace_with(&self, message: impl AsRef<str>, data: Value) {
        let caller = Location::caller();
        self.emit(LogLevel::Trace, message.as_ref(), Some(data), None, caller);
    }

    #[track_caller]
    pub fn debug(&self, message: impl AsRef<str>) {
        let caller = Location::caller();
        self.emit(LogLevel::Debug, message.as_ref(), None, None, caller);
    }

    #[track_caller]
    pub fn debug_with(&self, message: impl AsRef<str>, data: Value) {
        let caller = Location::caller();
        self.emit(LogLevel::Debug, message.as_ref(), Some(data), None, caller);
    }

    #[track_caller]
    pub fn info(&self, message: impl AsRef<str>) {
        let caller = Location::caller();
        self.emit(LogLevel::Info, message.as_ref(), None, None, caller);
    }

    #[track_caller]
    pub fn info_with(&self, message: impl AsRef<str>, data: Value) {
        let caller = Location::caller();
        self.emit(LogLevel::Info, message.as_ref(), Some(data), None, caller);
    }

    #[track_caller]
    pub fn warn(&self, message: impl AsRef<str>) {
        let caller = Location::caller();
        self.emit(LogLevel::Warn, message.as_ref(), None, None, caller);
    }

    #[track_caller]
    pub fn warn_with(&self, message: impl AsRef<str>, data: Value) {
        let caller = Location::caller();
        self.emit(LogLevel::Warn, message.as_ref(), Some(data), None, caller);
    }

    #[track_caller]
    pub fn error(&self, message: impl AsRef<str>) {
        let caller = Location::caller();
        self.emit(LogLevel::Error, message.as_ref(), None, None, caller);
    }

    #[track_caller]
    pub fn error_with(&self, message: impl AsRef<str>, data: Value) {
        let caller = Location::caller();
        self.emit(LogLevel::Error, message.as_ref(), Some(data), None, caller);
    }

    /// Log an error-level entry carrying a flattened error value; captures
    /// a backtrace when stack traces are enabled.
    #[track_caller]
    pub fn error_cause<E>(&self, message: impl AsRef<str>, err: &E)
    where
        E: std::error::Error + ?Sized,
    {
        let caller = Location::caller();
        self.emit(
            LogLevel::Error,
            message.as_ref(),
            None,
            Some(normalize::error_value(err)),
            caller,
        );
    }

    #[track_caller]
    pub fn fatal(&self, message: impl AsRef<str>) {
        let caller = Location::caller();
        self.emit(LogLevel::Fatal, message.as_ref(), None, None, caller);
    }

    #[track_caller]
    pub fn fatal_with(&self, message: impl AsRef<str>, data: Value) {
        let caller = Location::caller();
        self.emit(LogLevel::Fatal, message.as_ref(), Some(data), None, caller);
    }

    #[track_caller]
    pub fn fatal_cause<E>(&self, message: impl AsRef<str>, err: &E)
    where
        E: std::error::Error + ?Sized,
    {
        let caller = Location::caller();
        self.emit(
            LogLevel::Fatal,
            message.as_ref(),
            None,
            Some(normalize::error_value(err)),
            caller,
        );
    }

    fn emit(
        &self,
        level: LogLevel,
        message: &str,
        data: Option<Value>,
        error: Option<Value>,
        caller: &'static Location<'static>,
    ) {
        global().dispatch(
            &self.module,
            level,
            message,
            self.scope.as_deref(),
            data,
            error,
            self.tags.as_deref().map(Vec::as_slice),
            Some(caller),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SamplingRule;
    use crate::core::error::Result;
    use serde_json::json;

    /// Collects entries for assertions.
    struct TestSink {
        name: &'static str,
        entries: Mutex<Vec<LogEntry>>,
    }

    impl TestSink {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                entries: Mutex::new(Vec::new()),
            })
        }

        fn entries(&self) -> Vec<LogEntry> {
            self.entries.lock().clone()
        }
    }

    #[async_trait::async_trait]
    impl Transport for TestSink {
        fn name(&self) -> &str {
            self.name
        }

        fn log(&self, entry: &LogEntry) -> Result<()> {
            self.entries.lock().push(entry.clone());
            Ok(())
        }
    }

    struct PanickingSink;

    #[async_trait::async_trait]
    impl Transport for PanickingSink {
        fn name(&self) -> &str {
            "panicking"
        }

        fn log(&self, _entry: &LogEntry) -> Result<()> {
            panic!("sink blew up");
        }
    }

    fn test_dispatcher(config: RuntimeConfig) -> (Arc<Dispatcher>, Arc<TestSink>) {
        let config = RuntimeConfig {
            enable_console: false,
            ..config
        };
        let dispatcher = Dispatcher::new(config);
        let sink = TestSink::new("test");
        dispatcher
            .transports
            .write()
            .insert("test".to_string(), sink.clone());
        (dispatcher, sink)
    }

    #[test]
    fn test_min_level_filter() {
        let (dispatcher, sink) = test_dispatcher(RuntimeConfig {
            min_level: LogLevel::Warn,
            ..Default::default()
        });

        dispatcher.dispatch("m", LogLevel::Debug, "x", None, None, None, None, None);
        dispatcher.dispatch("m", LogLevel::Warn, "y", None, None, None, None, None);

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, LogLevel::Warn);
        assert_eq!(entries[0].message, "y");
        assert_eq!(dispatcher.metrics().level_filtered(), 1);
        assert_eq!(dispatcher.metrics().dispatched(), 1);
    }

    #[test]
    fn test_sampling_rate_zero_blocks_info_not_error() {
        let mut sampling = HashMap::new();
        sampling.insert("m".to_string(), SamplingRule::new(0.0));
        let (dispatcher, sink) = test_dispatcher(RuntimeConfig {
            min_level: LogLevel::Trace,
            sampling,
            ..Default::default()
        });

        for _ in 0..5 {
            dispatcher.dispatch("m", LogLevel::Info, "drop me", None, None, None, None, None);
        }
        dispatcher.dispatch("m", LogLevel::Error, "keep me", None, None, None, None, None);

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, LogLevel::Error);
    }

    #[test]
    fn test_dedupe_aggregation_tags_occurrences() {
        let (dispatcher, sink) = test_dispatcher(RuntimeConfig::default());

        for _ in 0..10 {
            dispatcher.dispatch("m", LogLevel::Info, "same", None, None, None, None, None);
        }

        let entries = sink.entries();
        assert_eq!(entries.len(), 2, "first delivery plus one aggregate");
        assert!(entries[0].data.is_none() || !entries[0].data.as_ref().unwrap().contains_key("occurrences"));
        let aggregated = entries[1].data.as_ref().unwrap();
        assert_eq!(aggregated["occurrences"], json!(10));
        assert_eq!(dispatcher.metrics().deduplicated(), 8);
    }

    #[test]
    fn test_context_merge_precedence() {
        let (dispatcher, sink) = test_dispatcher(RuntimeConfig::default());
        dispatcher.context().set_ambient("layer", json!("ambient"));
        dispatcher.context().set_ambient("app", json!("desktop"));

        let mut scope = Map::new();
        scope.insert("layer".to_string(), json!("scope"));
        scope.insert("request".to_string(), json!("r-1"));

        dispatcher.dispatch(
            "m",
            LogLevel::Info,
            "merged",
            Some(&scope),
            Some(json!({ "layer": "call" })),
            None,
            None,
            None,
        );

        let entries = sink.entries();
        let data = entries[0].data.as_ref().unwrap();
        assert_eq!(data["layer"], json!("call"));
        assert_eq!(data["app"], json!("desktop"));
        assert_eq!(data["request"], json!("r-1"));
    }

    #[test]
    fn test_entry_carries_session_and_trace() {
        let (dispatcher, sink) = test_dispatcher(RuntimeConfig::default());
        dispatcher.context().set_trace_id("t-7");

        dispatcher.dispatch("m", LogLevel::Info, "hello", None, None, None, None, None);

        let entries = sink.entries();
        assert_eq!(entries[0].trace_id.as_deref(), Some("t-7"));
        assert_eq!(
            entries[0].session_id.as_deref(),
            Some(dispatcher.context().session_id())
        );
    }

    #[test]
    fn test_redaction_applied_before_fanout() {
        let (dispatcher, sink) = test_dispatcher(RuntimeConfig::default());

        dispatcher.dispatch(
            "m",
            LogLevel::Info,
            "created key",
            None,
            Some(json!({ "apiKey": "secret", "plain": 1 })),
            None,
            None,
            None,
        );

        let data = sink.entries()[0].data.clone().unwrap();
        assert_eq!(data["apiKey"], json!("[REDACTED]"));
        assert_eq!(data["plain"], json!(1));
    }

    #[test]
    fn test_panicking_transport_is_isolated() {
        let (dispatcher, sink) = test_dispatcher(RuntimeConfig::default());
        dispatcher
            .transports
            .write()
            .insert("panicking".to_string(), Arc::new(PanickingSink));

        dispatcher.dispatch("m", LogLevel::Info, "survives", None, None, None, None, None);

        assert_eq!(sink.entries().len(), 1);
        assert_eq!(dispatcher.metrics().transport_failures(), 1);
    }

    #[tokio::test]
    async fn test_register_replaces_and_closes_previous() {
        let (dispatcher, _) = test_dispatcher(RuntimeConfig::default());

        let first = TestSink::new("dup");
        let second = TestSink::new("dup");
        dispatcher.register_transport(first).await;
        dispatcher.register_transport(second.clone()).await;

        dispatcher.dispatch("m", LogLevel::Info, "routed", None, None, None, None, None);
        assert_eq!(second.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_clears_registry_and_resets_config() {
        let (dispatcher, _) = test_dispatcher(RuntimeConfig {
            min_level: LogLevel::Trace,
            ..Default::default()
        });

        dispatcher.shutdown().await;

        assert!(dispatcher.transport_names().is_empty());
        assert_eq!(dispatcher.config().min_level, LogLevel::Info);
    }

    #[test]
    fn test_logger_child_and_context() {
        let root = logger("app");
        let child = root.child("db").child("writer");
        assert_eq!(child.module(), "app::db::writer");

        let scoped = child.with_context(json!({ "pool": "primary" }));
        let rescoped = scoped.with_context(json!({ "pool": "replica", "shard": 2 }));
        let scope = rescoped.scope.as_deref().unwrap();
        assert_eq!(scope["pool"], json!("replica"));
        assert_eq!(scope["shard"], json!(2));
    }

    #[test]
    fn test_tagged_entries() {
        let (dispatcher, sink) = test_dispatcher(RuntimeConfig::default());

        dispatcher.dispatch(
            "m",
            LogLevel::Info,
            "tagged",
            None,
            None,
            None,
            Some(&["net".to_string(), "slow".to_string()]),
            None,
        );

        let entries = sink.entries();
        assert_eq!(
            entries[0].tags.as_deref(),
            Some(["net".to_string(), "slow".to_string()].as_slice())
        );
    }
}
