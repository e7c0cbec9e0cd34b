//! HTTP span helpers shared by every client adapter.

use crate::core::{get_current_trace, NodeHandle, Span};
use crate::models::{NodeStatus, NodeType};
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

/// Rewrites a URL before it is recorded, e.g. to strip credentials
pub type UrlFilter = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// What to record for traced HTTP requests
#[derive(Clone, Default)]
pub struct HttpInstrumentOptions {
    pub url_filter: Option<UrlFilter>,
    /// Requests whose filtered URL matches any of these are not traced
    pub exclude_urls: Vec<Regex>,
}

impl HttpInstrumentOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.url_filter = Some(Arc::new(filter));
        self
    }

    /// Add exclusion patterns; a pattern that does not compile is skipped
    pub fn with_exclude_urls<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for pattern in patterns {
            let pattern = pattern.as_ref();
            match Regex::new(pattern) {
                Ok(regex) => self.exclude_urls.push(regex),
                Err(e) => warn!(pattern = pattern, error = %e, "Ignoring invalid URL exclusion pattern"),
            }
        }
        self
    }

    /// Apply the URL filter; a panicking filter falls back to the raw URL
    fn filter_url(&self, url: &str) -> String {
        let Some(filter) = &self.url_filter else {
            return url.to_string();
        };
        match panic::catch_unwind(AssertUnwindSafe(|| filter(url))) {
            Ok(filtered) => filtered,
            Err(_) => {
                warn!("URL filter panicked; recording the unfiltered URL");
                url.to_string()
            }
        }
    }

    fn is_excluded(&self, url: &str) -> bool {
        self.exclude_urls.iter().any(|pattern| pattern.is_match(url))
    }
}

impl fmt::Debug for HttpInstrumentOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpInstrumentOptions")
            .field("url_filter", &self.url_filter.is_some())
            .field("exclude_urls", &self.exclude_urls)
            .finish()
    }
}

/// Create an `http_request` span for a request in the current trace
///
/// Returns `None` when no trace is active or the filtered URL is excluded.
/// The span is named `"{METHOD} {url}"` and records `method` and `url` as input.
pub fn create_http_span(method: &str, url: &str, options: &HttpInstrumentOptions) -> Option<Span> {
    let trace = get_current_trace()?;

    let url = options.filter_url(url);
    if options.is_excluded(&url) {
        return None;
    }

    let method = method.to_uppercase();
    let span = Span::in_trace(&trace, format!("{} {}", method, url), NodeType::HttpRequest);
    span.input([("method", method), ("url", url)]);
    Some(span)
}

/// Record the response, or the transport error, onto an HTTP span
///
/// An error also marks the node `failed`.
pub fn record_http_response(
    node: &NodeHandle,
    status_code: Option<u16>,
    duration_ms: f64,
    error: Option<&str>,
) {
    let mut output = vec![("duration_ms", Value::from((duration_ms * 100.0).round() / 100.0))];
    if let Some(status_code) = status_code {
        output.push(("status_code", Value::from(status_code)));
    }
    if let Some(error) = error {
        output.push(("error", Value::from(error)));
        node.set_status(NodeStatus::Failed);
    }
    node.output(output);
}

/// Milliseconds elapsed since `start`
pub fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{clear_context, push_current_trace, reset_current_trace, TraceHandle, TracerConfig};
    use crate::models::TraceGraph;
    use serde_json::json;

    fn with_trace<R>(f: impl FnOnce(&TraceHandle) -> R) -> R {
        clear_context();
        let trace = TraceHandle::new(TraceGraph::new("http"), TracerConfig::default());
        let token = push_current_trace(trace.clone());
        let result = f(&trace);
        reset_current_trace(token);
        result
    }

    #[test]
    fn test_no_span_without_trace() {
        clear_context();
        assert!(create_http_span("get", "https://example.com/", &HttpInstrumentOptions::new()).is_none());
    }

    #[test]
    fn test_span_name_and_input() {
        with_trace(|_| {
            let span = create_http_span("get", "https://example.com/api", &HttpInstrumentOptions::new()).unwrap();
            let node = span.snapshot().unwrap();
            assert_eq!(node.name, "GET https://example.com/api");
            assert_eq!(node.node_type, "http_request");
            assert_eq!(node.input_data["method"], json!("GET"));
            assert_eq!(node.input_data["url"], json!("https://example.com/api"));
        });
    }

    #[test]
    fn test_url_filter_applies_before_exclusion() {
        let options = HttpInstrumentOptions::new()
            .with_url_filter(|url| url.split('?').next().unwrap_or(url).to_string())
            .with_exclude_urls([r"/health$"]);

        with_trace(|trace| {
            let span = create_http_span("POST", "https://api.test/v1?key=secret", &options).unwrap();
            assert_eq!(span.snapshot().unwrap().input_data["url"], json!("https://api.test/v1"));

            assert!(create_http_span("GET", "https://api.test/health?probe=1", &options).is_none());
            assert_eq!(trace.node_count(), 1);
        });
    }

    #[test]
    fn test_panicking_url_filter_falls_back_to_raw_url() {
        let options = HttpInstrumentOptions::new()
            .with_url_filter(|url| {
                if url.contains("bad") {
                    panic!("filter failed");
                }
                url.to_string()
            })
            .with_exclude_urls([r"/bad/skip$"]);

        with_trace(|trace| {
            let span = create_http_span("get", "https://api.test/bad/path", &options).unwrap();
            assert_eq!(span.snapshot().unwrap().input_data["url"], json!("https://api.test/bad/path"));
            assert!(create_http_span("get", "https://api.test/bad/skip", &options).is_none());
            assert_eq!(trace.node_count(), 1);
        });
    }

    #[test]
    fn test_invalid_exclusion_pattern_is_skipped() {
        let options = HttpInstrumentOptions::new().with_exclude_urls(["[unclosed", r"example\.com/skip"]);
        assert_eq!(options.exclude_urls.len(), 1);
    }

    #[test]
    fn test_record_response() {
        with_trace(|trace| {
            let node = trace.create_node("GET /".into(), "http_request".into(), None);
            record_http_response(&node, Some(200), 12.3456, None);

            let snapshot = node.snapshot().unwrap();
            assert_eq!(snapshot.output_data["duration_ms"], json!(12.35));
            assert_eq!(snapshot.output_data["status_code"], json!(200));
            assert!(!snapshot.output_data.contains_key("error"));
        });
    }

    #[test]
    fn test_record_error_marks_failed() {
        with_trace(|trace| {
            let node = trace.create_node("GET /".into(), "http_request".into(), None);
            record_http_response(&node, None, 1.0, Some("Connection refused"));

            let snapshot = node.snapshot().unwrap();
            assert_eq!(snapshot.status, NodeStatus::Failed);
            assert_eq!(snapshot.output_data["error"], json!("Connection refused"));
            assert!(!snapshot.output_data.contains_key("status_code"));
        });
    }

    #[test]
    fn test_elapsed_ms_is_non_negative() {
        assert!(elapsed_ms(Instant::now()) >= 0.0);
    }
}
