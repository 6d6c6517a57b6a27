//! Console transport
//!
//! Synchronous and unbuffered: formats and writes immediately, exempt from
//! batching and retry. Error and Fatal route to stderr.

use crate::core::{LogEntry, LogLevel, Result, Transport};
use colored::Colorize;

pub struct ConsoleTransport {
    use_colors: bool,
}

impl ConsoleTransport {
    pub fn new() -> Self {
        Self { use_colors: true }
    }

    pub fn with_colors(use_colors: bool) -> Self {
        Self { use_colors }
    }

    fn format(&self, entry: &LogEntry) -> String {
        let level_str = if self.use_colors {
            format!("{:5}", entry.level.to_str())
                .color(entry.level.color_code())
                .to_string()
        } else {
            format!("{:5}", entry.level.to_str())
        };

        let mut line = format!(
            "[{}] [{}] {} - {}",
            entry.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            level_str,
            entry.module,
            entry.message
        );

        if let Some(trace_id) = &entry.trace_id {
            line.push_str(&format!(" trace={}", trace_id));
        }

        if let Some(data) = &entry.data {
            let fields = data
                .iter()
                .map(|(k, v)| match v {
                    serde_json::Value::String(s) => format!("{}={}", k, s),
                    other => format!("{}={}", k, other),
                })
                .collect::<Vec<_>>()
                .join(" ");
            if !fields.is_empty() {
                line.push(' ');
                line.push_str(&fields);
            }
        }

        line
    }
}

impl Default for ConsoleTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Transport for ConsoleTransport {
    fn name(&self) -> &str {
        "console"
    }

    fn log(&self, entry: &LogEntry) -> Result<()> {
        let output = self.format(entry);
        match entry.level {
            LogLevel::Error | LogLevel::Fatal => eprintln!("{}", output),
            _ => println!("{}", output),
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        use std::io::Write;
        std::io::stdout().flush()?;
        std::io::stderr().flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    #[test]
    fn test_format_contains_fields() {
        let transport = ConsoleTransport::with_colors(false);
        let mut data = Map::new();
        data.insert("user".to_string(), json!("ada"));
        data.insert("attempt".to_string(), json!(2));

        let entry = LogEntry::new(LogLevel::Warn, "auth", "login slow")
            .with_trace_id(Some("t-1".to_string()))
            .with_data(data);

        let line = transport.format(&entry);
        assert!(line.contains("WARN"));
        assert!(line.contains("auth"));
        assert!(line.contains("login slow"));
        assert!(line.contains("trace=t-1"));
        assert!(line.contains("user=ada"));
        assert!(line.contains("attempt=2"));
    }

    #[test]
    fn test_log_never_fails() {
        let transport = ConsoleTransport::with_colors(false);
        let entry = LogEntry::new(LogLevel::Info, "app", "hello");
        assert!(transport.log(&entry).is_ok());
    }
}
