//! Log entry structure
//!
//! The wire/storage shape shared by every transport: camelCase field names,
//! ISO-8601 timestamps, lowercase level names.

use super::level::LogLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Call-site location attached to an entry when source capture is enabled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
}

impl SourceLocation {
    pub fn from_caller(location: &'static std::panic::Location<'static>) -> Self {
        Self {
            file: Some(location.file().to_string()),
            line: Some(location.line()),
            function: None,
        }
    }
}

/// One structured log record flowing through the pipeline.
///
/// Entries are assembled by the dispatcher and immutable once past
/// redaction; transports only read them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub module: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl LogEntry {
    /// Sanitize log message to prevent log injection attacks
    ///
    /// Replaces newlines, carriage returns, and tabs with escape sequences
    /// so a crafted message cannot forge additional log lines.
    fn sanitize_message(message: &str) -> String {
        message
            .replace('\n', "\\n")
            .replace('\r', "\\r")
            .replace('\t', "\\t")
    }

    pub fn new(level: LogLevel, module: impl Into<String>, message: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            level,
            message: Self::sanitize_message(message),
            module: module.into(),
            trace_id: None,
            session_id: None,
            data: None,
            stack: None,
            source: None,
            tags: None,
        }
    }

    pub fn with_trace_id(mut self, trace_id: Option<String>) -> Self {
        self.trace_id = trace_id;
        self
    }

    pub fn with_session_id(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        if !data.is_empty() {
            self.data = Some(data);
        }
        self
    }

    pub fn with_stack(mut self, stack: Option<String>) -> Self {
        self.stack = stack;
        self
    }

    pub fn with_source(mut self, source: Option<SourceLocation>) -> Self {
        self.source = source;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        if !tags.is_empty() {
            self.tags = Some(tags);
        }
        self
    }

    /// Timestamp in milliseconds since epoch, used as the store sort key.
    pub fn timestamp_millis(&self) -> u64 {
        self.timestamp.timestamp_millis().max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_ids_are_unique() {
        let a = LogEntry::new(LogLevel::Info, "app", "one");
        let b = LogEntry::new(LogLevel::Info, "app", "two");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_message_sanitization() {
        let entry = LogEntry::new(
            LogLevel::Info,
            "auth",
            "login\nERROR forged line\tdone",
        );
        assert_eq!(entry.message, "login\\nERROR forged line\\tdone");
    }

    #[test]
    fn test_wire_shape() {
        let mut data = Map::new();
        data.insert("userId".to_string(), Value::from(42));

        let entry = LogEntry::new(LogLevel::Warn, "sync", "slow response")
            .with_trace_id(Some("t-1".to_string()))
            .with_data(data)
            .with_tags(vec!["net".to_string()]);

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["level"], "warn");
        assert_eq!(json["module"], "sync");
        assert_eq!(json["traceId"], "t-1");
        assert_eq!(json["data"]["userId"], 42);
        assert!(json.get("sessionId").is_none());
        assert!(json.get("stack").is_none());
        // ISO-8601 text timestamp
        assert!(json["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_empty_data_is_omitted() {
        let entry = LogEntry::new(LogLevel::Info, "app", "msg").with_data(Map::new());
        assert!(entry.data.is_none());
    }

    #[test]
    fn test_roundtrip() {
        let entry = LogEntry::new(LogLevel::Error, "db", "write failed")
            .with_session_id(Some("s-9".to_string()))
            .with_stack(Some("backtrace...".to_string()));
        let json = serde_json::to_string(&entry).unwrap();
        let back: LogEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, entry.id);
        assert_eq!(back.level, LogLevel::Error);
        assert_eq!(back.session_id.as_deref(), Some("s-9"));
    }
}
