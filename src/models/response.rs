//! HTTP responses
//!
//! The successful result of a transport call, as shared between
//! deduplicated callers and stored in the cache.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// A successful HTTP response with a decoded body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers, names lowercased
    pub headers: BTreeMap<String, String>,
    /// Body decoded as JSON; plain text bodies become a JSON string
    pub body: Value,
}

impl HttpResponse {
    /// Creates a response with the given status and body and no headers.
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body,
        }
    }

    /// Creates a `200 OK` response.
    pub fn ok(body: Value) -> Self {
        Self::new(200, body)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decodes the body into a typed value.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.body)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}
