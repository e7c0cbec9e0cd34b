//! Traced `reqwest` client.

use super::http::{create_http_span, elapsed_ms, record_http_response, HttpInstrumentOptions};
use crate::error::{NodetracerError, Result};
use reqwest::{Client, IntoUrl, Method, Request, RequestBuilder, Response};
use std::time::Instant;

/// `reqwest::Client` wrapper that records every request as an `http_request` span
///
/// Requests made outside an active trace go straight to the inner client.
/// Transport errors are recorded on the span and still returned to the caller.
#[derive(Debug, Clone, Default)]
pub struct TracedClient {
    client: Client,
    options: HttpInstrumentOptions,
}

impl TracedClient {
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

    pub fn options(&self) -> &HttpInstrumentOptions {
        &self.options
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

    /// Build and execute a request from one of this client's builders
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let request = builder.build()?;
        self.execute(request).await
    }

    /// Execute a request inside an `http_request` span
    pub async fn execute(&self, request: Request) -> Result<Response> {
        let Some(span) = create_http_span(request.method().as_str(), request.url().as_str(), &self.options)
        else {
            return Ok(self.client.execute(request).await?);
        };

        let client = &self.client;
        span.run_async(|node| async move {
            let start = Instant::now();
            match client.execute(request).await {
                Ok(response) => {
                    record_http_response(&node, Some(response.status().as_u16()), elapsed_ms(start), None);
                    Ok(response)
                }
                Err(e) => {
                    record_http_response(&node, None, elapsed_ms(start), Some(&e.to_string()));
                    Err(NodetracerError::from(e))
                }
            }
        })
        .await
    }
}
