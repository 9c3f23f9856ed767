//! Request descriptors
//!
//! Everything a transport needs to perform one HTTP call.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::RequestSignature;

// == Method ==
/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl Method {
    /// Returns true for methods whose successful responses may be cached.
    pub fn is_read(&self) -> bool {
        matches!(self, Method::Get | Method::Head)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
            Method::Options => reqwest::Method::OPTIONS,
        }
    }
}

// == Request Options ==
/// Per-call options accepted by the convenience wrappers.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Query parameters
    pub params: Vec<(String, String)>,
    /// Extra headers (e.g. `Authorization`)
    pub headers: Vec<(String, String)>,
    /// Per-call timeout enforced by the transport
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

// == Request Descriptor ==
/// A single HTTP request as handed to the coordinator and the transport.
///
/// Only method, URL, params and body identify the request; headers and
/// timeout are transport options.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Absolute URL, or a path the transport resolves against its base URL
    pub url: String,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl RequestDescriptor {
    // == Constructors ==
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            params: Vec::new(),
            body: None,
            headers: Vec::new(),
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, url).json(body)
    }

    /// Builds a descriptor from a method, an optional body and call options.
    pub fn with_options(
        method: Method,
        url: impl Into<String>,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Self {
        Self {
            method,
            url: url.into(),
            params: options.params,
            body,
            headers: options.headers,
            timeout: options.timeout,
        }
    }

    // == Builder ==
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    // == Signature ==
    /// Identity used for caching, deduplication and rate limiting.
    pub fn signature(&self) -> RequestSignature {
        RequestSignature::from_descriptor(self)
    }
}
