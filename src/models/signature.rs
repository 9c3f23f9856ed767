//! Request signatures
//!
//! Two descriptors with the same signature are the same logical operation,
//! whatever the order of their params or the spelling of their URL.

use std::fmt;

use crate::models::{Method, RequestDescriptor};

// == Request Signature ==
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestSignature {
    method: Method,
    url: String,
    params: Vec<(String, String)>,
    body: Option<String>,
}

impl RequestSignature {
    /// Derives the signature of a descriptor.
    ///
    /// Query-string pairs embedded in the URL are merged with the explicit
    /// params, and the whole set is sorted. The body takes part as canonical
    /// JSON (object keys sorted), so mutations with different payloads stay
    /// distinct.
    pub fn from_descriptor(request: &RequestDescriptor) -> Self {
        let (url, mut params) = normalize_url(&request.url);
        params.extend(request.params.iter().cloned());
        params.sort();

        Self {
            method: request.method,
            url,
            params,
            body: request.body.as_ref().map(|body| body.to_string()),
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// Normalized URL without query string.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Sorted query parameters.
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }
}

impl fmt::Display for RequestSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)?;
        for (i, (key, value)) in self.params.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{}{}={}", sep, key, value)?;
        }
        Ok(())
    }
}

/// Splits a URL into its normalized form and its query pairs.
fn normalize_url(raw: &str) -> (String, Vec<(String, String)>) {
    let trimmed = raw.trim();
    let without_fragment = trimmed.split('#').next().unwrap_or_default();
    let (base, query) = match without_fragment.split_once('?') {
        Some((base, query)) => (base, query),
        None => (without_fragment, ""),
    };

    let mut url = lowercase_origin(base);
    if url.ends_with('/') && !is_root_path(&url) {
        url.pop();
    }

    let params = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect();

    (url, params)
}

/// "/" and "https://host/" keep their slash. Expects a non-empty URL.
fn is_root_path(url: &str) -> bool {
    url == "/" || origin_len(url) == Some(url.len() - 1)
}

/// Length of `scheme://authority` for absolute URLs.
fn origin_len(url: &str) -> Option<usize> {
    let scheme_end = url.find("://")? + 3;
    let authority_len = url[scheme_end..].find('/').unwrap_or(url.len() - scheme_end);
    Some(scheme_end + authority_len)
}

fn lowercase_origin(url: &str) -> String {
    match origin_len(url) {
        Some(len) => {
            let mut normalized = url[..len].to_ascii_lowercase();
            normalized.push_str(&url[len..]);
            normalized
        }
        None => url.to_string(),
    }
}
