//! Sensitive-content scrubbing
//!
//! Compiled once from [`RedactionConfig`]; applied to every entry after
//! normalization and before fan-out. Key rules match case- and
//! separator-insensitively by equality or containment; pattern rules are
//! case-insensitive regexes run over the message, the stack, and string
//! values in the data tree.
//!
//! `serde_json::Value` trees are acyclic by construction, so the traversal
//! needs only the configured depth cap for safety.

use super::config::RedactionConfig;
use super::entry::LogEntry;
use regex::RegexBuilder;
use serde_json::{Map, Value};

pub struct Redactor {
    enabled: bool,
    patterns: Vec<regex::Regex>,
    /// Normalized (lowercased, separator-stripped) sensitive key names.
    keys: Vec<String>,
    replacement: String,
    max_depth: usize,
}

/// Lowercase and strip separator characters so `api_key`, `Api-Key`, and
/// `apikey` all compare equal.
fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| !matches!(c, '_' | '-' | '.' | ' '))
        .flat_map(|c| c.to_lowercase())
        .collect()
}

impl Redactor {
    pub fn from_config(config: &RedactionConfig) -> Self {
        let mut patterns = Vec::with_capacity(config.redact_patterns.len());
        for source in &config.redact_patterns {
            match RegexBuilder::new(source).case_insensitive(true).build() {
                Ok(regex) => patterns.push(regex),
                // Malformed patterns are skipped, never fatal.
                Err(e) => {
                    eprintln!("[LOGPIPE WARNING] invalid redaction pattern '{}': {}", source, e)
                }
            }
        }

        Self {
            enabled: config.enabled,
            patterns,
            keys: config.redact_keys.iter().map(|k| normalize_key(k)).collect(),
            replacement: config.replacement.clone(),
            max_depth: config.max_depth,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            patterns: Vec::new(),
            keys: Vec::new(),
            replacement: String::new(),
            max_depth: 0,
        }
    }

    /// Scrub an entry in place. No-op when redaction is disabled.
    pub fn redact_entry(&self, entry: &mut LogEntry) {
        if !self.enabled {
            return;
        }

        entry.message = self.redact_text(&entry.message);
        if let Some(stack) = entry.stack.take() {
            entry.stack = Some(self.redact_text(&stack));
        }
        if let Some(data) = entry.data.as_mut() {
            self.redact_map(data, 0);
        }
    }

    /// Apply the compiled patterns to free text.
    pub fn redact_text(&self, text: &str) -> String {
        let mut result = text.to_string();
        for pattern in &self.patterns {
            result = pattern
                .replace_all(&result, self.replacement.as_str())
                .into_owned();
        }
        result
    }

    fn is_sensitive_key(&self, key: &str) -> bool {
        let normalized = normalize_key(key);
        self.keys
            .iter()
            .any(|rule| normalized == *rule || normalized.contains(rule.as_str()))
    }

    fn redact_map(&self, map: &mut Map<String, Value>, depth: usize) {
        if depth > self.max_depth {
            return;
        }
        for (key, value) in map.iter_mut() {
            if self.is_sensitive_key(key) {
                // A sensitive key blanks the whole value regardless of type.
                *value = Value::String(self.replacement.clone());
            } else {
                self.redact_value(value, depth + 1);
            }
        }
    }

    fn redact_value(&self, value: &mut Value, depth: usize) {
        if depth > self.max_depth {
            return;
        }
        match value {
            Value::Object(map) => self.redact_map(map, depth),
            Value::Array(items) => {
                for item in items.iter_mut() {
                    self.redact_value(item, depth);
                }
            }
            Value::String(text) => {
                let scrubbed = self.redact_text(text);
                if scrubbed != *text {
                    *text = scrubbed;
                }
            }
            // Numbers, booleans, and null carry no scannable text.
            _ => {}
        }
    }
}
