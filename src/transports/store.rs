//! Persistent embedded store transport
//!
//! Buffers entries and writes each flush as a single redb transaction; a
//! failed write re-queues the batch at the front of the buffer so order is
//! preserved. Every successful open/flush is followed by a retention sweep
//! (age first, then count) and a best-effort change broadcast for live
//! observers. Also exposes the read side: filtered queries, aggregate
//! statistics, and full JSON export.

use crate::core::{LogEntry, LogLevel, Result, Transport};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;

/// Key: (timestamp millis, insertion seq) so iteration is time-ordered and
/// same-millisecond entries keep arrival order. Value: JSON-encoded entry.
const LOGS_TABLE: TableDefinition<(u64, u64), &[u8]> = TableDefinition::new("log_entries");

const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Change notification broadcast to observers sharing the store. Delivery
/// is best-effort; a lagging observer misses events rather than blocking
/// the writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Flushed { count: usize },
    Swept { removed: usize },
}

/// Filter for the store's read API. All set fields must match.
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    pub min_level: Option<LogLevel>,
    pub module: Option<String>,
    pub trace_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub text: Option<String>,
    pub tags: Vec<String>,
    pub limit: Option<usize>,
}

impl LogQuery {
    #[must_use]
    pub fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = Some(level);
        self
    }

    #[must_use]
    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    #[must_use]
    pub fn trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    #[must_use]
    pub fn between(mut self, from: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.until = Some(until);
        self
    }

    #[must_use]
    pub fn text(mut self, needle: impl Into<String>) -> Self {
        self.text = Some(needle.into());
        self
    }

    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(min) = self.min_level {
            if entry.level < min {
                return false;
            }
        }
        if let Some(module) = &self.module {
            if entry.module != *module {
                return false;
            }
        }
        if let Some(trace_id) = &self.trace_id {
            if entry.trace_id.as_deref() != Some(trace_id.as_str()) {
                return false;
            }
        }
        if let Some(from) = self.from {
            if entry.timestamp < from {
                return false;
            }
        }
        if let Some(until) = self.until {
            if entry.timestamp > until {
                return false;
            }
        }
        if let Some(text) = &self.text {
            if !entry.message.contains(text.as_str()) {
                return false;
            }
        }
        if !self.tags.is_empty() {
            let Some(tags) = &entry.tags else { return false };
            if !self.tags.iter().any(|t| tags.contains(t)) {
                return false;
            }
        }
        true
    }
}

/// Aggregate statistics over the stored entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogStats {
    pub total: u64,
    pub by_level: HashMap<String, u64>,
    pub by_module: HashMap<String, u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest: Option<DateTime<Utc>>,
}

pub struct StoreTransport {
    db: Database,
    buffer: Mutex<Vec<LogEntry>>,
    buffer_size: usize,
    max_entries: u64,
    retention: ChronoDuration,
    seq: AtomicU64,
    events: broadcast::Sender<StoreEvent>,
    flush_needed: Notify,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl StoreTransport {
    /// Open (or create) the store and run an initial retention sweep.
    pub fn open(
        path: impl AsRef<Path>,
        buffer_size: usize,
        max_entries: u64,
        retention_days: u32,
    ) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Database::create(path)?;

        // Make sure the table exists so the read API works before the
        // first flush, and resume the sequence counter past any stored key.
        let mut next_seq = 0u64;
        let txn = db.begin_write()?;
        {
            let table = txn.open_table(LOGS_TABLE)?;
            let last = table.last()?;
            if let Some(item) = last {
                next_seq = item.0.value().1 + 1;
            }
        }
        txn.commit()?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let store = Self {
            db,
            buffer: Mutex::new(Vec::new()),
            buffer_size: buffer_size.max(1),
            max_entries,
            retention: ChronoDuration::days(retention_days.max(1) as i64),
            seq: AtomicU64::new(next_seq),
            events,
            flush_needed: Notify::new(),
            flusher: Mutex::new(None),
        };

        if let Err(e) = store.sweep() {
            eprintln!("[LOGPIPE WARNING] store retention sweep on open failed: {}", e);
        }
        Ok(store)
    }

    /// Start the threshold-driven flusher. The periodic cadence is the
    /// dispatcher's flush timer; this task only reacts to a full buffer.
    pub fn spawn_flusher(self: &Arc<Self>) {
        let store = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                store.flush_needed.notified().await;
                if let Err(e) = Transport::flush(store.as_ref()).await {
                    eprintln!("[LOGPIPE ERROR] store flush failed: {}", e);
                }
            }
        });
        *self.flusher.lock() = Some(handle);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub fn buffered_count(&self) -> usize {
        self.buffer.lock().len()
    }

    fn write_batch(&self, batch: &[LogEntry]) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(LOGS_TABLE)?;
            for entry in batch {
                let key = (entry.timestamp_millis(), self.seq.fetch_add(1, Ordering::Relaxed));
                let value = serde_json::to_vec(entry)?;
                table.insert(key, value.as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Delete entries older than the retention window, then the oldest
    /// entries beyond the count cap.
    pub fn sweep(&self) -> Result<usize> {
        let cutoff = (Utc::now() - self.retention).timestamp_millis().max(0) as u64;
        let mut removed = 0usize;

        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(LOGS_TABLE)?;

            let expired: Vec<(u64, u64)> = {
                let mut keys = Vec::new();
                for item in table.iter()? {
                    let (key, _) = item?;
                    let key = key.value();
                    if key.0 < cutoff {
                        keys.push(key);
                    } else {
                        break;
                    }
                }
                keys
            };
            for key in expired {
                table.remove(key)?;
                removed += 1;
            }

            let len = table.len()?;
            if len > self.max_entries {
                let excess = (len - self.max_entries) as usize;
                let oldest: Vec<(u64, u64)> = {
                    let mut keys = Vec::with_capacity(excess);
                    for item in table.iter()?.take(excess) {
                        let (key, _) = item?;
                        keys.push(key.value());
                    }
                    keys
                };
                for key in oldest {
                    table.remove(key)?;
                    removed += 1;
                }
            }
        }
        txn.commit()?;

        if removed > 0 {
            let _ = self.events.send(StoreEvent::Swept { removed });
        }
        Ok(removed)
    }

    /// Read entries matching `query`, ascending by timestamp. With a limit,
    /// the most recent matches are returned.
    pub fn query(&self, query: &LogQuery) -> Result<Vec<LogEntry>> {
        let limit = query.limit.unwrap_or(usize::MAX);
        let txn = self.db.begin_read()?;
        let table = txn.open_table(LOGS_TABLE)?;

        let mut matches = Vec::new();
        for item in table.iter()?.rev() {
            if matches.len() >= limit {
                break;
            }
            let (_, value) = item?;
            let entry: LogEntry = serde_json::from_slice(value.value())?;
            if query.matches(&entry) {
                matches.push(entry);
            }
        }
        matches.reverse();
        Ok(matches)
    }

    /// Aggregate statistics: totals by level and module, oldest/newest
    /// timestamps.
    pub fn stats(&self) -> Result<LogStats> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(LOGS_TABLE)?;

        let mut stats = LogStats::default();
        for item in table.iter()? {
            let (_, value) = item?;
            let entry: LogEntry = serde_json::from_slice(value.value())?;
            stats.total += 1;
            *stats
                .by_level
                .entry(entry.level.wire_name().to_string())
                .or_insert(0) += 1;
            *stats.by_module.entry(entry.module.clone()).or_insert(0) += 1;
            if stats.oldest.map_or(true, |t| entry.timestamp < t) {
                stats.oldest = Some(entry.timestamp);
            }
            if stats.newest.map_or(true, |t| entry.timestamp > t) {
                stats.newest = Some(entry.timestamp);
            }
        }
        Ok(stats)
    }

    /// Export every stored entry as a JSON array, ascending by timestamp.
    pub fn export_json(&self) -> Result<String> {
        let entries = self.query(&LogQuery::default())?;
        Ok(serde_json::to_string_pretty(&entries)?)
    }
}

#[async_trait::async_trait]
impl Transport for StoreTransport {
    fn name(&self) -> &str {
        "store"
    }

    fn log(&self, entry: &LogEntry) -> Result<()> {
        let mut buffer = self.buffer.lock();
        buffer.push(entry.clone());
        if buffer.len() >= self.buffer_size {
            self.flush_needed.notify_one();
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let batch: Vec<LogEntry> = {
            let mut buffer = self.buffer.lock();
            if buffer.is_empty() {
                return Ok(());
            }
            buffer.drain(..).collect()
        };

        match self.write_batch(&batch) {
            Ok(()) => {
                if let Err(e) = self.sweep() {
                    eprintln!("[LOGPIPE WARNING] store retention sweep failed: {}", e);
                }
                let _ = self.events.send(StoreEvent::Flushed { count: batch.len() });
                Ok(())
            }
            Err(e) => {
                // Re-queue at the front, preserving order for the retry.
                let mut buffer = self.buffer.lock();
                let mut requeued = batch;
                requeued.append(&mut buffer);
                *buffer = requeued;
                Err(e)
            }
        }
    }

    async fn close(&self) -> Result<()> {
        let result = Transport::flush(self).await;
        if let Some(handle) = self.flusher.lock().take() {
            handle.abort();
        }
        result
    }
}
