//! Error types for the authentication flow.

use crate::federation::FederationError;
use crate::http::HttpError;

/// Errors that can occur while authenticating with a sectoral identity provider.
#[derive(Debug, thiserror::Error)]
pub enum AuthFlowError {
    /// The PAR response carries no usable `request_uri`.
    #[error("Invalid PAR request_uri")]
    InvalidParRequestUri,

    /// The provider metadata lacks a pushed authorization request endpoint.
    #[error("Missing PAR endpoint: {issuer}")]
    MissingParEndpoint {
        /// The provider.
        issuer: String,
    },

    /// The PAR request failed.
    #[error("Failed PAR request: {0}")]
    FailedParRequest(#[source] HttpError),

    /// The provider metadata lacks an authorization endpoint.
    #[error("Missing authorization endpoint: {issuer}")]
    MissingAuthorizationEndpoint {
        /// The provider.
        issuer: String,
    },

    /// The provider's entity statement carries no OpenID provider metadata.
    #[error("Missing OpenID provider metadata: {issuer}")]
    MissingOpenIdProvider {
        /// The provider.
        issuer: String,
    },

    /// The provider metadata lacks a token endpoint.
    #[error("Missing token endpoint: {issuer}")]
    MissingTokenEndpoint {
        /// The provider.
        issuer: String,
    },

    /// The code exchange failed.
    #[error("Token exchange failed: {0}")]
    TokenExchange(#[source] HttpError),

    /// No decryption key is registered for the ID token.
    #[error("No decryption key for ID token (kid '{0}')")]
    DecryptionKeyNotFound(String),

    /// The ID token is not signed by a key of the trusted provider.
    #[error("Bad ID token signature")]
    BadIdTokenSignature,

    /// The ID token could not be decrypted, parsed or decoded.
    #[error("Bad ID token: {0}")]
    BadIdToken(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A provider endpoint is not a valid URL.
    #[error("Invalid endpoint URL '{url}': {reason}")]
    InvalidEndpoint {
        /// The offending value.
        url: String,
        /// Parse error.
        reason: String,
    },

    /// Trust-chain resolution failed.
    #[error(transparent)]
    Federation(#[from] FederationError),
}

impl AuthFlowError {
    /// Creates a `BadIdToken` error.
    #[must_use]
    pub fn bad_id_token(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::BadIdToken(source.into())
    }

    /// Creates an `InvalidEndpoint` error.
    #[must_use]
    pub fn invalid_endpoint(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidEndpoint {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns `true` if the provider metadata lacks something the flow needs.
    #[must_use]
    pub fn is_metadata_error(&self) -> bool {
        matches!(
            self,
            Self::MissingParEndpoint { .. }
                | Self::MissingAuthorizationEndpoint { .. }
                | Self::MissingOpenIdProvider { .. }
                | Self::MissingTokenEndpoint { .. }
                | Self::InvalidEndpoint { .. }
        )
    }

    /// Returns `true` if the ID token was rejected.
    #[must_use]
    pub fn is_id_token_error(&self) -> bool {
        matches!(
            self,
            Self::DecryptionKeyNotFound(_) | Self::BadIdTokenSignature | Self::BadIdToken(_)
        )
    }

    /// Returns the HTTP status for failed provider calls.
    #[must_use]
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::FailedParRequest(e) | Self::TokenExchange(e) => e.status(),
            Self::Federation(FederationError::Http(e)) => e.status(),
            _ => None,
        }
    }

    /// Machine-readable reason code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidParRequestUri => "invalid_par_request_uri",
            Self::MissingParEndpoint { .. } => "missing_par_endpoint",
            Self::FailedParRequest(_) => "failed_par_request",
            Self::MissingAuthorizationEndpoint { .. } => "missing_authorization_endpoint",
            Self::MissingOpenIdProvider { .. } => "missing_openid_provider",
            Self::MissingTokenEndpoint { .. } => "missing_token_endpoint",
            Self::TokenExchange(_) => "token_exchange_failed",
            Self::DecryptionKeyNotFound(_) => "decryption_key_not_found",
            Self::BadIdTokenSignature => "bad_id_token_signature",
            Self::BadIdToken(_) => "bad_id_token",
            Self::InvalidEndpoint { .. } => "invalid_endpoint",
            Self::Federation(e) => e.code(),
        }
    }
}
