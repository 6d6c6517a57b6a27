//! Remote HTTP shipper transport
//!
//! Buffers entries and POSTs them as JSON batches to a collector endpoint.
//! Each send is bounded by the client timeout; failures retry with
//! exponential backoff, and a batch that exhausts its retry budget moves to
//! a bounded offline queue instead of being discarded. A
//! connectivity-restored signal drains that queue in batches. The wire
//! payload can be reshaped with a pluggable transform to match different
//! backend schemas.

use crate::core::{LogEntry, PipelineError, Result, Transport};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Reshapes a batch into the backend's expected body. The default payload
/// is the plain JSON array of entries.
pub type PayloadTransform = Arc<dyn Fn(&[LogEntry]) -> Value + Send + Sync>;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BASE_BACKOFF: Duration = Duration::from_millis(500);
const DEFAULT_OFFLINE_CAPACITY: usize = 10_000;

pub struct RemoteTransport {
    client: reqwest::Client,
    endpoint: String,
    headers: HashMap<String, String>,
    buffer: Mutex<Vec<LogEntry>>,
    /// Batches that exhausted their retry budget, oldest first.
    offline: Mutex<VecDeque<Vec<LogEntry>>>,
    offline_capacity: usize,
    buffer_size: usize,
    max_retries: u32,
    base_backoff: Duration,
    transform: Option<PayloadTransform>,
    flush_needed: Notify,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl RemoteTransport {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        Self::with_timeout(endpoint, DEFAULT_TIMEOUT)
    }

    /// Create a shipper whose in-flight sends abort after `timeout`.
    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            headers: HashMap::new(),
            buffer: Mutex::new(Vec::new()),
            offline: Mutex::new(VecDeque::new()),
            offline_capacity: DEFAULT_OFFLINE_CAPACITY,
            buffer_size: 50,
            max_retries: DEFAULT_MAX_RETRIES,
            base_backoff: DEFAULT_BASE_BACKOFF,
            transform: None,
            flush_needed: Notify::new(),
            flusher: Mutex::new(None),
        })
    }

    /// Extra headers sent with every batch (authentication, routing).
    #[must_use]
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    /// Retry budget per batch and the base backoff delay; attempt `n`
    /// waits `base * 2^(n-1)`.
    #[must_use]
    pub fn with_retry(mut self, max_retries: u32, base_backoff: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.base_backoff = base_backoff;
        self
    }

    #[must_use]
    pub fn with_offline_capacity(mut self, capacity: usize) -> Self {
        self.offline_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_transform(mut self, transform: PayloadTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Start the threshold-driven flusher; the periodic cadence is the
    /// dispatcher's flush timer.
    pub fn spawn_flusher(self: &Arc<Self>) {
        let remote = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                remote.flush_needed.notified().await;
                if let Err(e) = Transport::flush(remote.as_ref()).await {
                    eprintln!("[LOGPIPE ERROR] remote flush failed: {}", e);
                }
            }
        });
        *self.flusher.lock() = Some(handle);
    }

    /// Entries awaiting delivery: buffered plus offline-queued.
    pub fn pending_count(&self) -> usize {
        self.buffer.lock().len() + self.offline.lock().iter().map(Vec::len).sum::<usize>()
    }

    pub fn offline_batches(&self) -> usize {
        self.offline.lock().len()
    }

    fn build_payload(&self, batch: &[LogEntry]) -> Result<Value> {
        match &self.transform {
            Some(transform) => Ok(transform(batch)),
            None => Ok(serde_json::to_value(batch)?),
        }
    }

    async fn send_batch(&self, batch: &[LogEntry]) -> Result<()> {
        let payload = self.build_payload(batch)?;
        let mut request = self.client.post(&self.endpoint).json(&payload);
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::remote_status(status.as_u16()));
        }
        Ok(())
    }

    async fn send_with_retries(&self, batch: &[LogEntry]) -> Result<()> {
        let mut last_error = None;
        for attempt in 1..=self.max_retries {
            match self.send_batch(batch).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        let delay = self.base_backoff * 2u32.pow(attempt - 1);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        Err(last_error.unwrap_or_else(|| PipelineError::other("remote send failed")))
    }

    fn queue_offline(&self, batch: Vec<LogEntry>) {
        let mut offline = self.offline.lock();
        let mut held: usize = offline.iter().map(Vec::len).sum();
        offline.push_back(batch);
        held += offline.back().map_or(0, Vec::len);
        // Bounded queue: oldest batches give way, loudly.
        while held > self.offline_capacity && offline.len() > 1 {
            if let Some(evicted) = offline.pop_front() {
                held -= evicted.len();
                eprintln!(
                    "[LOGPIPE WARNING] offline queue over capacity; dropped {} queued entries",
                    evicted.len()
                );
            }
        }
    }

    /// Drain the offline queue in batches after connectivity is restored.
    /// Stops (and re-queues the batch) on the first failure.
    pub async fn notify_online(&self) -> Result<()> {
        loop {
            let batch = match self.offline.lock().pop_front() {
                Some(batch) => batch,
                None => return Ok(()),
            };
            if let Err(e) = self.send_batch(&batch).await {
                self.offline.lock().push_front(batch);
                return Err(e);
            }
        }
    }
}

#[async_trait::async_trait]
impl Transport for RemoteTransport {
    fn name(&self) -> &str {
        "remote"
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

        match self.send_with_retries(&batch).await {
            Ok(()) => Ok(()),
            Err(_) => {
                let attempts = self.max_retries;
                let entries = batch.len();
                self.queue_offline(batch);
                Err(PipelineError::retries_exhausted(attempts, entries))
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
