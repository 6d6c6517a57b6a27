//! Transport implementations

pub mod ai_trace;
pub mod console;
pub mod remote;
pub mod store;
pub mod trace_span;

pub use ai_trace::AiTraceBridge;
pub use console::ConsoleTransport;
pub use remote::{PayloadTransform, RemoteTransport};
pub use store::{LogQuery, LogStats, StoreEvent, StoreTransport};
pub use trace_span::SpanBridge;

// Re-export the contract for convenience
pub use crate::core::Transport;
