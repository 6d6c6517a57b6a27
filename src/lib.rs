//! # Logpipe
//!
//! A structured-logging and observability pipeline: leveled log calls flow
//! through rate-limited sampling, burst deduplication, context merging, and
//! sensitive-data redaction before fanning out to pluggable destinations —
//! console, an embedded persistent store, a remote HTTP collector, and
//! distributed-tracing bridges.
//!
//! ## Features
//!
//! - **Never in the way**: a log call never blocks on I/O and never raises
//!   back to the caller, whatever the destinations are doing
//! - **Volume control**: per-module sampling rates, minimum intervals,
//!   burst limits, and burst deduplication with aggregated delivery
//! - **Privacy**: recursive, depth-safe redaction of sensitive keys and
//!   text patterns
//! - **Durable and queryable**: batched embedded storage with retention
//!   sweeps and a filtered read API
//! - **Best-effort shipping**: batched remote delivery with timeouts,
//!   exponential backoff, and an offline queue
//!
//! ## Example
//!
//! ```
//! use serde_json::json;
//!
//! let log = logpipe::logger("sync::engine");
//! log.info("engine started");
//! log.warn_with("slow peer", json!({ "peerId": "p-17", "latencyMs": 900 }));
//!
//! let worker = log.child("worker");
//! worker.debug("spawned");
//! ```

pub mod core;
pub mod macros;
pub mod settings;
pub mod transports;

pub mod prelude {
    pub use crate::core::{
        clear_trace_id, global, init, logger, set_trace_id, shutdown, Dispatcher, LogEntry,
        LogLevel, Logger, PipelineError, RedactionConfig, Result, RuntimeConfig, SamplingRule,
        SourceLocation, Transport,
    };
    pub use crate::settings::{apply_settings, bootstrap, load_settings, save_settings};
    pub use crate::transports::{
        AiTraceBridge, ConsoleTransport, LogQuery, LogStats, RemoteTransport, SpanBridge,
        StoreEvent, StoreTransport,
    };
}

pub use core::{
    clear_trace_id, global, init, logger, set_trace_id, shutdown, ContextRegistry,
    DedupeDecision, Dispatcher, LogEntry, LogLevel, Logger, PipelineError, PipelineMetrics,
    RedactionConfig, Redactor, Result, RuntimeConfig, Sampler, SamplerMetrics, SamplingRule,
    SourceLocation, Transport,
};
pub use settings::{apply_settings, bootstrap, load_settings, save_settings};
pub use transports::{
    AiTraceBridge, ConsoleTransport, LogQuery, LogStats, RemoteTransport, SpanBridge, StoreEvent,
    StoreTransport,
};
