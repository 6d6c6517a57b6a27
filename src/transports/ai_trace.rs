//! AI-observability trace bridge
//!
//! Groups buffered entries by trace id (session id as fallback) and, on the
//! batching cadence, creates an ad-hoc trace-with-observations structure
//! per group for an external AI-observability backend. Backend
//! unavailability is a soft failure: entries return to the bounded buffer
//! instead of raising.

use crate::core::{LogEntry, Result, Transport};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_BUFFER_CAPACITY: usize = 2_000;

const UNTRACED_GROUP: &str = "untraced";

pub struct AiTraceBridge {
    client: reqwest::Client,
    endpoint: String,
    headers: HashMap<String, String>,
    buffer: Mutex<Vec<LogEntry>>,
    buffer_capacity: usize,
}

impl AiTraceBridge {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            headers: HashMap::new(),
            buffer: Mutex::new(Vec::new()),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        })
    }

    #[must_use]
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity.max(1);
        self
    }

    pub fn buffered_count(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Build one trace structure per (trace id | session id) group.
    fn build_batch(&self, entries: &[LogEntry]) -> Value {
        let mut groups: HashMap<String, Vec<&LogEntry>> = HashMap::new();
        for entry in entries {
            let key = entry
                .trace_id
                .clone()
                .or_else(|| entry.session_id.clone())
                .unwrap_or_else(|| UNTRACED_GROUP.to_string());
            groups.entry(key).or_default().push(entry);
        }

        let traces: Vec<Value> = groups
            .into_iter()
            .map(|(group, members)| {
                let first = members[0];
                let observations: Vec<Value> = members
                    .iter()
                    .map(|e| {
                        json!({
                            "id": Uuid::new_v4().to_string(),
                            "type": "event",
                            "name": e.module,
                            "startTime": e.timestamp,
                            "level": e.level.wire_name(),
                            "message": e.message,
                            "metadata": e.data,
                        })
                    })
                    .collect();
                json!({
                    "trace": {
                        "id": group,
                        "name": first.module,
                        "sessionId": first.session_id,
                        "timestamp": first.timestamp,
                    },
                    "observations": observations,
                })
            })
            .collect();

        json!({ "batch": traces })
    }

    async fn send(&self, payload: &Value) -> Result<()> {
        let mut request = self.client.post(&self.endpoint).json(payload);
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(crate::core::PipelineError::remote_status(status.as_u16()));
        }
        Ok(())
    }

    fn return_to_buffer(&self, entries: Vec<LogEntry>) {
        let mut buffer = self.buffer.lock();
        let mut restored = entries;
        restored.append(&mut buffer);
        if restored.len() > self.buffer_capacity {
            let overflow = restored.len() - self.buffer_capacity;
            restored.drain(..overflow);
        }
        *buffer = restored;
    }
}

#[async_trait::async_trait]
impl Transport for AiTraceBridge {
    fn name(&self) -> &str {
        "ai-trace"
    }

    fn log(&self, entry: &LogEntry) -> Result<()> {
        let mut buffer = self.buffer.lock();
        buffer.push(entry.clone());
        if buffer.len() > self.buffer_capacity {
            buffer.remove(0);
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let entries: Vec<LogEntry> = {
            let mut buffer = self.buffer.lock();
            if buffer.is_empty() {
                return Ok(());
            }
            buffer.drain(..).collect()
        };

        let payload = self.build_batch(&entries);
        if let Err(e) = self.send(&payload).await {
            // Soft failure: the backend being down must not surface as an
            // error; entries wait for the next cadence.
            eprintln!("[LOGPIPE WARNING] ai-trace backend unavailable: {}", e);
            self.return_to_buffer(entries);
        }
        Ok(())
    }
}
