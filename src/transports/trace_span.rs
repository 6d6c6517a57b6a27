//! Distributed-tracing span bridge
//!
//! Attaches qualifying entries as timestamped events on the currently
//! active `tracing` span; error and fatal entries additionally record an
//! exception event so span processors mark the span failed. A no-op when no
//! tracing context is active.

use crate::core::{LogEntry, LogLevel, Result, Transport};
use tracing::Level;

pub struct SpanBridge {
    min_level: LogLevel,
}

impl SpanBridge {
    pub fn new(min_level: LogLevel) -> Self {
        Self { min_level }
    }

    fn qualifies(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }
}

impl Default for SpanBridge {
    fn default() -> Self {
        Self::new(LogLevel::Info)
    }
}

#[async_trait::async_trait]
impl Transport for SpanBridge {
    fn name(&self) -> &str {
        "trace-span"
    }

    fn log(&self, entry: &LogEntry) -> Result<()> {
        if !self.qualifies(entry.level) {
            return Ok(());
        }
        let span = tracing::Span::current();
        if span.is_disabled() {
            // No active tracing context.
            return Ok(());
        }

        let trace_id = entry.trace_id.as_deref().unwrap_or("");
        match entry.level {
            LogLevel::Trace => tracing::event!(
                Level::TRACE,
                module = %entry.module,
                trace_id = %trace_id,
                "{}",
                entry.message
            ),
            LogLevel::Debug => tracing::event!(
                Level::DEBUG,
                module = %entry.module,
                trace_id = %trace_id,
                "{}",
                entry.message
            ),
            LogLevel::Info => tracing::event!(
                Level::INFO,
                module = %entry.module,
                trace_id = %trace_id,
                "{}",
                entry.message
            ),
            LogLevel::Warn => tracing::event!(
                Level::WARN,
                module = %entry.module,
                trace_id = %trace_id,
                "{}",
                entry.message
            ),
            LogLevel::Error | LogLevel::Fatal => {
                tracing::event!(
                    Level::ERROR,
                    module = %entry.module,
                    trace_id = %trace_id,
                    "{}",
                    entry.message
                );
                // Exception semantics so span processors flag the span.
                tracing::event!(
                    Level::ERROR,
                    exception.message = %entry.message,
                    otel.status_code = "ERROR",
                    "span failed"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_level_gate() {
        let bridge = SpanBridge::new(LogLevel::Warn);
        assert!(!bridge.qualifies(LogLevel::Info));
        assert!(bridge.qualifies(LogLevel::Warn));
        assert!(bridge.qualifies(LogLevel::Fatal));
    }

    #[test]
    fn test_noop_without_subscriber() {
        // No tracing subscriber installed: every call is a cheap no-op.
        let bridge = SpanBridge::default();
        let entry = LogEntry::new(LogLevel::Error, "app", "boom");
        assert!(bridge.log(&entry).is_ok());
    }
}
