//! Transport contract for log destinations
//!
//! `log` is the synchronous hot-path append and must stay cheap; all real
//! I/O belongs in `flush`. A transport's failure is isolated by the
//! dispatcher and never reaches the logging caller.

use super::{entry::LogEntry, error::Result};
use async_trait::async_trait;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Registry name; registering another transport under the same name
    /// replaces this one.
    fn name(&self) -> &str;

    /// Accept one entry. Buffered transports append; unbuffered ones write
    /// immediately. Must not block on I/O.
    fn log(&self, entry: &LogEntry) -> Result<()>;

    /// Deliver all currently buffered entries, or return the error so the
    /// dispatcher can report it. Default: nothing buffered.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Flush, then release held resources (timers, connections). Default:
    /// flush only.
    async fn close(&self) -> Result<()> {
        self.flush().await
    }
}
