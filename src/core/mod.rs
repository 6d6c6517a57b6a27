//! Core pipeline types and runtime

pub mod config;
pub mod context;
pub mod dispatcher;
pub mod entry;
pub mod error;
pub mod level;
pub mod metrics;
pub mod normalize;
pub mod redact;
pub mod sampler;
pub mod transport;

pub use config::{RedactionConfig, RuntimeConfig, SamplingRule};
pub use context::ContextRegistry;
pub use dispatcher::{
    clear_trace_id, global, init, logger, set_trace_id, shutdown, Dispatcher, Logger,
};
pub use entry::{LogEntry, SourceLocation};
pub use error::{PipelineError, Result};
pub use level::LogLevel;
pub use metrics::PipelineMetrics;
pub use redact::Redactor;
pub use sampler::{DedupeDecision, Sampler, SamplerMetrics};
pub use transport::Transport;
