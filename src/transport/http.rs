//! reqwest-backed transport

use std::collections::BTreeMap;

use futures::future::FutureExt;
use serde_json::Value;

use crate::error::TransportError;
use crate::models::{HttpResponse, RequestDescriptor};
use crate::transport::{Transport, TransportFuture};

/// HTTP transport over a shared `reqwest::Client`.
///
/// Relative URLs are resolved against the optional base URL. Bodies are
/// decoded as JSON when possible, otherwise kept as a JSON string.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: None,
        }
    }

    /// Sets the base URL joined to relative request URLs.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        self.base_url = Some(base_url.trim_end_matches('/').to_string());
        self
    }

    /// Resolves a request URL against the base URL.
    pub fn resolve(&self, url: &str) -> String {
        match &self.base_url {
            Some(base) if !url.contains("://") => {
                format!("{}/{}", base, url.trim_start_matches('/'))
            }
            _ => url.to_string(),
        }
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: RequestDescriptor) -> TransportFuture {
        let client = self.client.clone();
        let url = self.resolve(&request.url);
        perform(client, url, request).boxed()
    }
}

async fn perform(
    client: reqwest::Client,
    url: String,
    request: RequestDescriptor,
) -> Result<HttpResponse, TransportError> {
    let mut builder = client.request(request.method.into(), url.as_str());
    if !request.params.is_empty() {
        builder = builder.query(&request.params);
    }
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = &request.body {
        builder = builder.json(body);
    }
    if let Some(timeout) = request.timeout {
        builder = builder.timeout(timeout);
    }

    let response = builder.send().await?;
    let status = response.status();
    let headers: BTreeMap<String, String> = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();
    let body = decode_body(&response.text().await?);

    if status.is_success() {
        Ok(HttpResponse {
            status: status.as_u16(),
            headers,
            body,
        })
    } else {
        let reason = status.canonical_reason().unwrap_or("HTTP error");
        Err(TransportError::http(status.as_u16(), reason).with_body(body))
    }
}

fn decode_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}
