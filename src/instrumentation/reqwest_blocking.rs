//! Traced `reqwest::blocking` client.

use super::http::{create_http_span, elapsed_ms, record_http_response, HttpInstrumentOptions};
use crate::error::{NodetracerError, Result};
use reqwest::blocking::{Client, Request, RequestBuilder, Response};
use reqwest::{IntoUrl, Method};
use std::time::Instant;

/// Blocking counterpart of [`TracedClient`](super::TracedClient)
///
/// The request runs on the calling thread inside an `http_request` span, so
/// it parents on whatever node is current there. Must not be used from
/// within an async runtime, same as `reqwest::blocking::Client`.
#[derive(Debug, Clone, Default)]
pub struct BlockingTracedClient {
    client: Client,
    options: HttpInstrumentOptions,
}

impl BlockingTracedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            options: HttpInstrumentOptions::default(),
        }
    }

    pub fn with_options(mut self, options: HttpInstrumentOptions) -> Self {
        self.options = options;
        self
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    pub fn get(&self, url: impl IntoUrl) -> RequestBuilder {
        self.client.get(url)
    }

    pub fn post(&self, url: impl IntoUrl) -> RequestBuilder {
        self.client.post(url)
    }

    pub fn request(&self, method: Method, url: impl IntoUrl) -> RequestBuilder {
        self.client.request(method, url)
    }

    pub fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let request = builder.build()?;
        self.execute(request)
    }

    pub fn execute(&self, request: Request) -> Result<Response> {
        let Some(span) = create_http_span(request.method().as_str(), request.url().as_str(), &self.options)
        else {
            return Ok(self.client.execute(request)?);
        };

        span.run(|node| {
            let start = Instant::now();
            match self.client.execute(request) {
                Ok(response) => {
                    record_http_response(node, Some(response.status().as_u16()), elapsed_ms(start), None);
                    Ok(response)
                }
                Err(e) => {
                    record_http_response(node, None, elapsed_ms(start), Some(&e.to_string()));
                    Err(NodetracerError::from(e))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Tracer;
    use crate::models::NodeStatus;
    use crate::storage::{MemoryStore, StorageBackend};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_request_records_child_span() {
        let mut server = mockito::Server::new();
        let mock = server.mock("GET", "/items").with_status(201).with_body("[]").create();

        let store = Arc::new(MemoryStore::new());
        let tracer = Tracer::with_storage(store.clone());
        let client = BlockingTracedClient::new();
        let url = format!("{}/items", server.url());

        let status = tracer
            .trace("blocking_http", |_| {
                let response = client.send(client.get(&url))?;
                Ok::<_, NodetracerError>(response.status().as_u16())
            })
            .unwrap();

        mock.assert();
        assert_eq!(status, 201);
        let id = store.list_traces().unwrap().remove(0);
        let graph = store.load(&id).unwrap().unwrap();
        let node = graph
            .nodes_by_sequence()
            .into_iter()
            .find(|n| n.node_type == "http_request")
            .cloned()
            .unwrap();
        assert_eq!(node.name, format!("GET {}", url));
        assert_eq!(node.depth, 1);
        assert_eq!(node.output_data["status_code"], json!(201));
        assert_eq!(node.status, NodeStatus::Completed);
    }

    #[test]
    fn test_transport_error_marks_span_failed() {
        let store = Arc::new(MemoryStore::new());
        let tracer = Tracer::with_storage(store.clone());
        let client = BlockingTracedClient::new();

        let result = tracer.trace("blocking_error", |_| client.send(client.get("http://127.0.0.1:9/")).map(|_| ()));

        assert!(matches!(result, Err(NodetracerError::HttpError(_))));
        let id = store.list_traces().unwrap().remove(0);
        let graph = store.load(&id).unwrap().unwrap();
        let node = graph.nodes_by_sequence().into_iter().find(|n| n.node_type == "http_request").unwrap();
        assert_eq!(node.status, NodeStatus::Failed);
        assert!(node.output_data.contains_key("error"));
    }

    #[test]
    fn test_untraced_request_passes_through() {
        crate::core::clear_context();
        let mut server = mockito::Server::new();
        let mock = server.mock("GET", "/").with_status(204).create();

        let client = BlockingTracedClient::new();
        let response = client.send(client.get(server.url())).unwrap();

        mock.assert();
        assert_eq!(response.status().as_u16(), 204);
    }
}
