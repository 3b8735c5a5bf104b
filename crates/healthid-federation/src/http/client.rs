//! `reqwest` based transport.

use async_trait::async_trait;
use url::Url;

use super::{HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse};
use crate::config::HttpConfig;

/// [`HttpClient`] implementation backed by `reqwest`.
///
/// Only HTTPS URLs are accepted unless `allow_http` is configured.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    http_client: reqwest::Client,
    allow_http: bool,
}

impl ReqwestHttpClient {
    /// Creates a new client with the configured request timeout.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Client` if the underlying client cannot be built.
    pub fn new(config: &HttpConfig) -> Result<Self, HttpError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| HttpError::Client(e.to_string()))?;

        Ok(Self {
            http_client,
            allow_http: config.allow_http,
        })
    }

    /// Wraps an existing `reqwest` client.
    #[must_use]
    pub fn from_client(http_client: reqwest::Client, allow_http: bool) -> Self {
        Self {
            http_client,
            allow_http,
        }
    }

    /// Validates that the URL uses an allowed scheme.
    fn validate_scheme(&self, url: &Url) -> Result<(), HttpError> {
        match url.scheme() {
            "https" => Ok(()),
            "http" if self.allow_http => Ok(()),
            other => Err(HttpError::InvalidScheme(other.to_string())),
        }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        self.validate_scheme(&request.url)?;

        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        };

        let mut builder = self.http_client.request(method, request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        tracing::debug!("{} {}", request.method, request.url);

        let response = builder.send().await.map_err(|e| {
            tracing::warn!("Request {} {} failed: {}", request.method, request.url, e);
            HttpError::transport(&request, e)
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| HttpError::transport(&request, e))?
            .to_vec();

        tracing::trace!(
            "{} {} -> {} ({} bytes)",
            request.method,
            request.url,
            status,
            body.len()
        );

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
