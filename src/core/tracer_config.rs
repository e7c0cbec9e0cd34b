//! Per-tracer capture policy.
//!
//! A [`TracerConfig`] is attached to every trace a tracer opens. Spans consult
//! the policy of the trace they record into, so two tracers with different
//! policies can run side by side in one process.

use crate::config::{CaptureLevel, Settings};
use crate::error::Result;
use crate::models::Payload;
use regex::Regex;
use serde_json::Value;

pub const REDACTED: &str = "[REDACTED]";
pub const TRUNCATED_SUFFIX: &str = "...[truncated]";

#[derive(Debug, Clone, Default)]
pub struct TracerConfig {
    pub capture_level: CaptureLevel,
    redact_patterns: Vec<Regex>,
    pub max_output_size: Option<usize>,
}

impl TracerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capture_level(mut self, capture_level: CaptureLevel) -> Self {
        self.capture_level = capture_level;
        self
    }

    /// Compile redaction patterns; fails on the first invalid regex
    pub fn with_redact_patterns<I, S>(mut self, patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.redact_patterns = patterns
            .into_iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<std::result::Result<_, _>>()?;
        Ok(self)
    }

    pub fn with_max_output_size(mut self, max_output_size: Option<usize>) -> Self {
        self.max_output_size = max_output_size;
        self
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new()
            .with_capture_level(settings.capture_level)
            .with_max_output_size(settings.max_output_size)
            .with_redact_patterns(&settings.redact_patterns)
    }

    /// Policy-filtered input fields, or `None` when payloads are not captured
    pub(crate) fn capture_input(&self, fields: Payload) -> Option<Payload> {
        if !self.capture_level.records_payloads() {
            return None;
        }
        Some(
            fields
                .into_iter()
                .map(|(key, value)| {
                    let value = self.redact(&key, value);
                    (key, value)
                })
                .collect(),
        )
    }

    /// Like [`Self::capture_input`], additionally truncating long strings
    pub(crate) fn capture_output(&self, fields: Payload) -> Option<Payload> {
        let fields = self.capture_input(fields)?;
        Some(match self.max_output_size {
            None => fields,
            Some(max) => fields
                .into_iter()
                .map(|(key, value)| (key, truncate(value, max)))
                .collect(),
        })
    }

    pub(crate) fn capture_metadata(&self, key: &str, value: Value) -> Value {
        self.redact(key, value)
    }

    pub(crate) fn capture_traceback(&self, traceback: String) -> Option<String> {
        self.capture_level.records_tracebacks().then_some(traceback)
    }

    fn is_redacted(&self, key: &str) -> bool {
        self.redact_patterns.iter().any(|pattern| pattern.is_match(key))
    }

    fn redact(&self, key: &str, value: Value) -> Value {
        if self.redact_patterns.is_empty() {
            return value;
        }
        if self.is_redacted(key) {
            return Value::String(REDACTED.to_string());
        }
        match value {
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| {
                        let v = self.redact(&k, v);
                        (k, v)
                    })
                    .collect(),
            ),
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|item| self.redact(key, item)).collect())
            }
            other => other,
        }
    }
}

fn truncate(value: Value, max: usize) -> Value {
    match value {
        Value::String(s) if s.chars().count() > max => {
            let mut kept: String = s.chars().take(max).collect();
            kept.push_str(TRUNCATED_SUFFIX);
            Value::String(kept)
        }
        Value::Object(map) => {
            Value::Object(map.into_iter().map(|(k, v)| (k, truncate(v, max))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(|v| truncate(v, max)).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(pairs: &[(&str, Value)]) -> Payload {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_full_capture_passes_through() {
        let config = TracerConfig::new();
        let fields = payload(&[("x", json!(1))]);
        assert_eq!(config.capture_input(fields.clone()), Some(fields));
        assert_eq!(config.capture_traceback("tb".to_string()), Some("tb".to_string()));
    }

    #[test]
    fn test_minimal_capture_drops_payloads() {
        let config = TracerConfig::new().with_capture_level(CaptureLevel::Minimal);
        assert!(config.capture_input(payload(&[("x", json!(1))])).is_none());
        assert!(config.capture_output(payload(&[("y", json!(2))])).is_none());
        assert!(config.capture_traceback("tb".to_string()).is_none());
    }

    #[test]
    fn test_standard_capture_omits_traceback() {
        let config = TracerConfig::new().with_capture_level(CaptureLevel::Standard);
        assert!(config.capture_input(payload(&[("x", json!(1))])).is_some());
        assert!(config.capture_traceback("tb".to_string()).is_none());
    }

    #[test]
    fn test_redaction_is_recursive() {
        let config = TracerConfig::new()
            .with_redact_patterns(["(?i)api_key", "^password$"])
            .unwrap();
        let fields = payload(&[
            ("API_KEY", json!("secret")),
            ("auth", json!({"password": "hunter2", "user": "ada"})),
            ("list", json!([{"api_key": "k"}])),
            ("query", json!("rust")),
        ]);

        let captured = config.capture_input(fields).unwrap();

        assert_eq!(captured["API_KEY"], json!(REDACTED));
        assert_eq!(captured["auth"], json!({"password": REDACTED, "user": "ada"}));
        assert_eq!(captured["list"], json!([{"api_key": REDACTED}]));
        assert_eq!(captured["query"], json!("rust"));
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        assert!(TracerConfig::new().with_redact_patterns(["[bad"]).is_err());
    }

    #[test]
    fn test_output_truncation() {
        let config = TracerConfig::new().with_max_output_size(Some(5));
        let fields = payload(&[
            ("text", json!("abcdefghij")),
            ("short", json!("abc")),
            ("nested", json!({"inner": "0123456789"})),
            ("number", json!(1234567890)),
        ]);

        let captured = config.capture_output(fields).unwrap();

        assert_eq!(captured["text"], json!(format!("abcde{}", TRUNCATED_SUFFIX)));
        assert_eq!(captured["short"], json!("abc"));
        assert_eq!(captured["nested"]["inner"], json!(format!("01234{}", TRUNCATED_SUFFIX)));
        assert_eq!(captured["number"], json!(1234567890));
    }

    #[test]
    fn test_input_is_not_truncated() {
        let config = TracerConfig::new().with_max_output_size(Some(2));
        let captured = config.capture_input(payload(&[("text", json!("long value"))])).unwrap();
        assert_eq!(captured["text"], json!("long value"));
    }

    #[test]
    fn test_from_settings() {
        let settings = Settings::default()
            .with_capture_level(CaptureLevel::Standard)
            .with_redact_patterns(["token"])
            .with_max_output_size(Some(64));
        let config = TracerConfig::from_settings(&settings).unwrap();
        assert_eq!(config.capture_level, CaptureLevel::Standard);
        assert_eq!(config.max_output_size, Some(64));
        assert_eq!(config.capture_metadata("token", json!("t")), json!(REDACTED));
    }
}
