//! Instrumentation adapters for third-party clients
//!
//! Adapters open a child span only while a trace is active in the calling
//! context. With no active trace they cost one context read and nothing else.
//!
//! - [`http`]: client-agnostic span creation and response recording
//! - [`reqwest_client`]: [`TracedClient`], a traced wrapper around `reqwest::Client`
//! - [`reqwest_blocking`]: [`BlockingTracedClient`], the same for `reqwest::blocking::Client`

pub mod http;
pub mod reqwest_blocking;
pub mod reqwest_client;

pub use http::{create_http_span, elapsed_ms, record_http_response, HttpInstrumentOptions};
pub use reqwest_blocking::BlockingTracedClient;
pub use reqwest_client::TracedClient;
