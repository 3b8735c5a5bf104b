//! HTTP transport abstraction.
//!
//! Every outbound call of the relying party (federation fetches, PAR, token
//! exchange) goes through the [`HttpClient`] trait. The transport owns
//! timeouts and connection handling; callers in this crate never retry.
//!
//! - [`HttpClient`] - the transport trait
//! - [`ReqwestHttpClient`] - production implementation on top of `reqwest`
//! - [`HttpError`] - status and transport failures

mod client;

use std::borrow::Cow;
use std::fmt;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use url::Url;

pub use client::ReqwestHttpClient;

/// Content type of form-encoded request bodies.
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// HTTP request methods used by the relying party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// `GET`
    Get,
    /// `POST`
    Post,
}

impl HttpMethod {
    /// Returns the method name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// The server answered with an unexpected status code.
    #[error("bad status {method} {url}: {status}")]
    BadStatus {
        /// Request method.
        method: HttpMethod,
        /// Request URL.
        url: String,
        /// Received status code.
        status: u16,
    },

    /// The request could not be performed.
    #[error("http request failed {method} {url}: {source}")]
    Transport {
        /// Request method.
        method: HttpMethod,
        /// Request URL.
        url: String,
        /// Underlying transport error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The response body could not be decoded.
    #[error("invalid response body {method} {url}: {source}")]
    InvalidBody {
        /// Request method.
        method: HttpMethod,
        /// Request URL.
        url: String,
        /// JSON decoding error.
        #[source]
        source: serde_json::Error,
    },

    /// The URL scheme is not allowed (must be HTTPS in production).
    #[error("Invalid URL scheme: {0} (only HTTPS is allowed)")]
    InvalidScheme(String),

    /// The underlying client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

impl HttpError {
    /// Creates a `BadStatus` error for the given request.
    #[must_use]
    pub fn bad_status(request: &HttpRequest, status: u16) -> Self {
        Self::BadStatus {
            method: request.method,
            url: request.url.to_string(),
            status,
        }
    }

    /// Creates a `Transport` error for the given request.
    #[must_use]
    pub fn transport(
        request: &HttpRequest,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Transport {
            method: request.method,
            url: request.url.to_string(),
            source: source.into(),
        }
    }

    /// Creates an `InvalidBody` error for the given request.
    #[must_use]
    pub fn invalid_body(request: &HttpRequest, source: serde_json::Error) -> Self {
        Self::InvalidBody {
            method: request.method,
            url: request.url.to_string(),
            source,
        }
    }

    /// Returns the received status code for `BadStatus` errors.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::BadStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Machine-readable reason code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadStatus { .. } => "http_bad_status",
            Self::Transport { .. } => "http_transport",
            Self::InvalidBody { .. } => "http_invalid_body",
            Self::InvalidScheme(_) => "http_invalid_scheme",
            Self::Client(_) => "http_client",
        }
    }
}

/// An outbound HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Request method.
    pub method: HttpMethod,
    /// Target URL, including the query string.
    pub url: Url,
    /// Request headers in insertion order.
    pub headers: Vec<(String, String)>,
    /// Optional request body.
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Creates a `GET` request.
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self {
            method: HttpMethod::Get,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    /// Creates a `POST` request with a form-encoded body.
    #[must_use]
    pub fn post_form<'a>(url: Url, params: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();

        Self {
            method: HttpMethod::Post,
            url,
            headers: vec![("Content-Type".to_string(), FORM_URLENCODED.to_string())],
            body: Some(body.into_bytes()),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns the first header value with the given name (case-insensitive).
    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Decodes a form-encoded body into key/value pairs.
    #[must_use]
    pub fn form_params(&self) -> Vec<(String, String)> {
        self.body
            .as_deref()
            .map(|body| {
                url::form_urlencoded::parse(body)
                    .into_owned()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default()
    }
}

/// A received HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response headers in received order.
    pub headers: Vec<(String, String)>,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response without headers.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns the first header value with the given name (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Returns the body as text, replacing invalid UTF-8.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Decodes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Transport used for all outbound calls.
///
/// Implementations perform exactly one attempt per call.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the response regardless of its status.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// Sends a request and fails unless the response carries `expected` status.
pub(crate) async fn send_expecting(
    client: &dyn HttpClient,
    request: HttpRequest,
    expected: u16,
) -> Result<HttpResponse, HttpError> {
    let response = client.send(request.clone()).await?;

    if response.status != expected {
        tracing::debug!(
            "Unexpected status {} from {} {} (expected {})",
            response.status,
            request.method,
            request.url,
            expected
        );
        return Err(HttpError::bad_status(&request, response.status));
    }

    Ok(response)
}
