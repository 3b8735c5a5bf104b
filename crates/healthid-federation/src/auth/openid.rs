//! OpenID Connect calls against a sectoral identity provider.
//!
//! Two requests are needed: the Pushed Authorization Request (RFC 9126),
//! answered with `201 Created`, and the authorization code exchange,
//! answered with `200 OK`. Both are form-encoded POSTs.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use super::pkce::CODE_CHALLENGE_METHOD;
use crate::http::{HttpClient, HttpError, HttpRequest, send_expecting};

/// Authentication context requested from sectoral identity providers.
pub const ACR_LOA_HIGH: &str = "gematik-ehealth-loa-high";

/// Parameters of a Pushed Authorization Request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParRequest {
    /// Our entity identifier.
    pub client_id: String,
    /// S256 PKCE challenge.
    pub code_challenge: String,
    /// Callback URI.
    pub redirect_uri: String,
    /// Session nonce.
    pub nonce: String,
    /// Session state.
    pub state: String,
    /// Requested scopes.
    pub scopes: Vec<String>,
}

impl ParRequest {
    fn to_http_request(&self, endpoint: Url) -> HttpRequest {
        let scope = self.scopes.join(" ");
        HttpRequest::post_form(
            endpoint,
            [
                ("client_id", self.client_id.as_str()),
                ("code_challenge", self.code_challenge.as_str()),
                ("code_challenge_method", CODE_CHALLENGE_METHOD),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("nonce", self.nonce.as_str()),
                ("state", self.state.as_str()),
                ("scope", scope.as_str()),
                ("acr_values", ACR_LOA_HIGH),
                ("response_type", "code"),
            ],
        )
        .header("Accept", "application/json")
    }
}

/// Response to a Pushed Authorization Request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParResponse {
    /// Reference to the pushed request.
    #[serde(default)]
    pub request_uri: Option<String>,
    /// Lifetime of `request_uri` in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Parameters of the authorization code exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequest {
    /// Our entity identifier.
    pub client_id: String,
    /// Callback URI used in the authorization request.
    pub redirect_uri: String,
    /// Authorization code.
    pub code: String,
    /// PKCE verifier.
    pub code_verifier: String,
}

impl TokenRequest {
    fn to_http_request(&self, endpoint: Url) -> HttpRequest {
        HttpRequest::post_form(
            endpoint,
            [
                ("grant_type", "authorization_code"),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("client_id", self.client_id.as_str()),
                ("code", self.code.as_str()),
                ("code_verifier", self.code_verifier.as_str()),
            ],
        )
        .header("Accept", "application/json")
    }
}

/// Token endpoint response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Access token.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Token type.
    #[serde(default)]
    pub token_type: Option<String>,
    /// Access token lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Encrypted ID token.
    #[serde(default)]
    pub id_token: Option<String>,
    /// Refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Client for identity provider OpenID endpoints.
#[derive(Clone)]
pub struct OpenIdClient {
    http: Arc<dyn HttpClient>,
}

impl OpenIdClient {
    /// Creates a client using `http` as transport.
    #[must_use]
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }

    /// Pushes an authorization request.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::BadStatus` unless the provider answers `201`,
    /// and `HttpError::InvalidBody` if the answer is not JSON.
    pub async fn push_authorization_request(
        &self,
        par_endpoint: Url,
        request: &ParRequest,
    ) -> Result<ParResponse, HttpError> {
        let http_request = request.to_http_request(par_endpoint);
        tracing::debug!("Pushing authorization request to {}", http_request.url);

        let response = send_expecting(self.http.as_ref(), http_request.clone(), 201).await?;
        response
            .json()
            .map_err(|e| HttpError::invalid_body(&http_request, e))
    }

    /// Exchanges an authorization code.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::BadStatus` unless the provider answers `200`,
    /// and `HttpError::InvalidBody` if the answer is not JSON.
    pub async fn exchange_code(
        &self,
        token_endpoint: Url,
        request: &TokenRequest,
    ) -> Result<TokenResponse, HttpError> {
        let http_request = request.to_http_request(token_endpoint);
        tracing::debug!("Exchanging authorization code at {}", http_request.url);

        let response = send_expecting(self.http.as_ref(), http_request.clone(), 200).await?;
        response
            .json()
            .map_err(|e| HttpError::invalid_body(&http_request, e))
    }
}

impl std::fmt::Debug for OpenIdClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenIdClient").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpResponse;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Recorder {
        response: HttpResponse,
        requests: Mutex<Vec<HttpRequest>>,
    }

    #[async_trait]
    impl HttpClient for Recorder {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
            self.requests.lock().unwrap().push(request);
            Ok(self.response.clone())
        }
    }

    fn recorder(status: u16, body: &str) -> Arc<Recorder> {
        Arc::new(Recorder {
            response: HttpResponse::new(status, body),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn par_request() -> ParRequest {
        ParRequest {
            client_id: "https://fachdienst.example.com".to_string(),
            code_challenge: "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM".to_string(),
            redirect_uri: "https://fachdienst.example.com/auth/callback".to_string(),
            nonce: "nonce-1".to_string(),
            state: "state-1".to_string(),
            scopes: vec!["openid".to_string(), "urn:telematik:versicherter".to_string()],
        }
    }

    #[tokio::test]
    async fn test_par_form_body() {
        let http = recorder(201, r#"{"request_uri":"urn:par:1","expires_in":90}"#);
        let client = OpenIdClient::new(http.clone());

        let response = client
            .push_authorization_request(
                Url::parse("https://idp-tk.example.com/par").unwrap(),
                &par_request(),
            )
            .await
            .unwrap();
        assert_eq!(response.request_uri.as_deref(), Some("urn:par:1"));
        assert_eq!(response.expires_in, Some(90));

        let sent = http.requests.lock().unwrap()[0].clone();
        let params = sent.form_params();
        let get = |name: &str| {
            params
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("client_id"), Some("https://fachdienst.example.com"));
        assert_eq!(get("code_challenge_method"), Some("S256"));
        assert_eq!(get("scope"), Some("openid urn:telematik:versicherter"));
        assert_eq!(get("acr_values"), Some("gematik-ehealth-loa-high"));
        assert_eq!(get("response_type"), Some("code"));
        assert_eq!(get("state"), Some("state-1"));
        assert_eq!(params.len(), 9);
    }

    #[tokio::test]
    async fn test_par_requires_201() {
        let http = recorder(200, r#"{"request_uri":"urn:par:1"}"#);
        let client = OpenIdClient::new(http);

        let err = client
            .push_authorization_request(
                Url::parse("https://idp-tk.example.com/par").unwrap(),
                &par_request(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(200));
    }

    #[tokio::test]
    async fn test_token_exchange() {
        let http = recorder(200, r#"{"access_token":"at","token_type":"Bearer","id_token":"x.y.z"}"#);
        let client = OpenIdClient::new(http.clone());

        let response = client
            .exchange_code(
                Url::parse("https://idp-tk.example.com/token").unwrap(),
                &TokenRequest {
                    client_id: "https://fachdienst.example.com".to_string(),
                    redirect_uri: "https://fachdienst.example.com/auth/callback".to_string(),
                    code: "code-1".to_string(),
                    code_verifier: "verifier-1".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(response.id_token.as_deref(), Some("x.y.z"));
        assert!(response.refresh_token.is_none());

        let params = http.requests.lock().unwrap()[0].form_params();
        assert_eq!(params[0], ("grant_type".to_string(), "authorization_code".to_string()));
        assert!(params.contains(&("code_verifier".to_string(), "verifier-1".to_string())));
    }

    #[tokio::test]
    async fn test_token_exchange_bad_status() {
        let client = OpenIdClient::new(recorder(400, r#"{"error":"invalid_grant"}"#));
        let err = client
            .exchange_code(
                Url::parse("https://idp-tk.example.com/token").unwrap(),
                &TokenRequest {
                    client_id: "c".to_string(),
                    redirect_uri: "r".to_string(),
                    code: "x".to_string(),
                    code_verifier: "v".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(400));
    }
}
