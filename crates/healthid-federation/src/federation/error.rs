//! Error types for federation document handling and trust-chain resolution.

use crate::http::HttpError;
use crate::jose::JwsError;

/// Errors that can occur while fetching, parsing or trusting federation documents.
#[derive(Debug, thiserror::Error)]
pub enum FederationError {
    /// The document is not a compact JWS of the expected type.
    #[error("Not a valid {kind}")]
    NotA {
        /// Expected document kind.
        kind: &'static str,
    },

    /// The document has the expected type but its payload is invalid.
    #[error("Bad {kind}: {source}")]
    Bad {
        /// Expected document kind.
        kind: &'static str,
        /// Decoding error.
        #[source]
        source: JwsError,
    },

    /// An entity statement is outside its validity window.
    #[error("Entity statement time not valid: {subject}")]
    EntityStatementTimeNotValid {
        /// Subject of the statement.
        subject: String,
    },

    /// An entity statement does not verify against the expected keys.
    #[error("Entity statement bad signature: {subject}")]
    EntityStatementBadSignature {
        /// Subject of the statement.
        subject: String,
    },

    /// The federation master does not publish a federation fetch endpoint.
    #[error("Entity statement missing federation fetch url: {subject}")]
    MissingFederationFetchUrl {
        /// Subject of the statement.
        subject: String,
    },

    /// The federation master does not publish an idp list endpoint.
    #[error("Entity statement missing idp list url: {subject}")]
    MissingIdpListUrl {
        /// Subject of the statement.
        subject: String,
    },

    /// A federation statement is outside its validity window.
    #[error("Federation statement time not valid: {subject}")]
    FederationStatementTimeNotValid {
        /// Subject of the statement.
        subject: String,
    },

    /// A federation statement is not signed by the federation master.
    #[error("Federation statement bad signature: {subject}")]
    FederationStatementBadSignature {
        /// Subject of the statement.
        subject: String,
    },

    /// An entity configuration is not signed by a key the federation vouches for.
    #[error("Federation statement untrusted: {subject}")]
    FederationStatementUntrusted {
        /// Subject of the statement.
        subject: String,
    },

    /// The idp list is absent or has no entries.
    #[error("Empty idp list")]
    EmptyIdpList,

    /// The signed JWKS of a provider is outside its validity window.
    #[error("Expired signed jwks: {uri}")]
    ExpiredSignedJwks {
        /// Where the key set was fetched from.
        uri: String,
    },

    /// The signed JWKS of a provider failed signature or issuer checks.
    #[error("Invalid signed jwks: {uri}")]
    InvalidSignedJwks {
        /// Where the key set was fetched from.
        uri: String,
    },

    /// Neither embedded nor signed keys are available for a provider.
    #[error("No openid provider keys: {subject}")]
    NoOpenIdProviderKeys {
        /// Subject of the provider's entity statement.
        subject: String,
    },

    /// A document is signed with an algorithm other than ES256.
    #[error("Unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A URL from metadata or configuration could not be parsed.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The offending value.
        url: String,
        /// Parse error.
        reason: String,
    },

    /// Signing our own entity statement failed.
    #[error("Signing failed: {0}")]
    Signing(#[source] JwsError),

    /// The transport failed or returned an unexpected status.
    #[error(transparent)]
    Http(#[from] HttpError),
}

impl FederationError {
    /// Creates a `NotA` error.
    #[must_use]
    pub fn not_a(kind: &'static str) -> Self {
        Self::NotA { kind }
    }

    /// Creates a `Bad` error.
    #[must_use]
    pub fn bad(kind: &'static str, source: JwsError) -> Self {
        Self::Bad { kind, source }
    }

    /// Creates an `EntityStatementTimeNotValid` error.
    #[must_use]
    pub fn entity_statement_time_not_valid(subject: impl Into<String>) -> Self {
        Self::EntityStatementTimeNotValid {
            subject: subject.into(),
        }
    }

    /// Creates an `EntityStatementBadSignature` error.
    #[must_use]
    pub fn entity_statement_bad_signature(subject: impl Into<String>) -> Self {
        Self::EntityStatementBadSignature {
            subject: subject.into(),
        }
    }

    /// Creates a `FederationStatementTimeNotValid` error.
    #[must_use]
    pub fn federation_statement_time_not_valid(subject: impl Into<String>) -> Self {
        Self::FederationStatementTimeNotValid {
            subject: subject.into(),
        }
    }

    /// Creates a `FederationStatementBadSignature` error.
    #[must_use]
    pub fn federation_statement_bad_signature(subject: impl Into<String>) -> Self {
        Self::FederationStatementBadSignature {
            subject: subject.into(),
        }
    }

    /// Creates a `FederationStatementUntrusted` error.
    #[must_use]
    pub fn federation_statement_untrusted(subject: impl Into<String>) -> Self {
        Self::FederationStatementUntrusted {
            subject: subject.into(),
        }
    }

    /// Creates an `InvalidUrl` error.
    #[must_use]
    pub fn invalid_url(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns `true` if a document could not be decoded.
    #[must_use]
    pub fn is_document_error(&self) -> bool {
        matches!(self, Self::NotA { .. } | Self::Bad { .. })
    }

    /// Returns `true` if a validity window check failed.
    #[must_use]
    pub fn is_time_error(&self) -> bool {
        matches!(
            self,
            Self::EntityStatementTimeNotValid { .. }
                | Self::FederationStatementTimeNotValid { .. }
                | Self::ExpiredSignedJwks { .. }
        )
    }

    /// Returns `true` if a signature or trust check failed.
    #[must_use]
    pub fn is_trust_error(&self) -> bool {
        matches!(
            self,
            Self::EntityStatementBadSignature { .. }
                | Self::FederationStatementBadSignature { .. }
                | Self::FederationStatementUntrusted { .. }
                | Self::InvalidSignedJwks { .. }
                | Self::UnsupportedAlgorithm(_)
        )
    }

    /// Returns `true` if metadata lacks a required endpoint.
    #[must_use]
    pub fn is_metadata_error(&self) -> bool {
        matches!(
            self,
            Self::MissingFederationFetchUrl { .. }
                | Self::MissingIdpListUrl { .. }
                | Self::EmptyIdpList
                | Self::NoOpenIdProviderKeys { .. }
        )
    }

    /// Machine-readable reason code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotA { .. } => "not_a_document",
            Self::Bad { .. } => "bad_document",
            Self::EntityStatementTimeNotValid { .. } => "entity_statement_time_not_valid",
            Self::EntityStatementBadSignature { .. } => "entity_statement_bad_signature",
            Self::MissingFederationFetchUrl { .. } => "entity_statement_missing_federation_fetch_url",
            Self::MissingIdpListUrl { .. } => "entity_statement_missing_idp_list_url",
            Self::FederationStatementTimeNotValid { .. } => "federation_statement_time_not_valid",
            Self::FederationStatementBadSignature { .. } => "federation_statement_bad_signature",
            Self::FederationStatementUntrusted { .. } => "federation_statement_untrusted",
            Self::EmptyIdpList => "empty_idp_list",
            Self::ExpiredSignedJwks { .. } => "expired_signed_jwks",
            Self::InvalidSignedJwks { .. } => "invalid_signed_jwks",
            Self::NoOpenIdProviderKeys { .. } => "no_openid_provider_keys",
            Self::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            Self::InvalidUrl { .. } => "invalid_url",
            Self::Signing(_) => "signing_failed",
            Self::Http(e) => e.code(),
        }
    }
}

impl From<JwsError> for FederationError {
    fn from(err: JwsError) -> Self {
        match err {
            JwsError::UnsupportedAlgorithm(alg) => Self::UnsupportedAlgorithm(alg),
            other => Self::Signing(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FederationError::not_a("entity statement");
        assert_eq!(err.to_string(), "Not a valid entity statement");

        let err = FederationError::entity_statement_time_not_valid("https://fedmaster.example.com");
        assert_eq!(
            err.to_string(),
            "Entity statement time not valid: https://fedmaster.example.com"
        );

        let err = FederationError::federation_statement_untrusted("https://idp-tk.example.com");
        assert!(err.to_string().contains("https://idp-tk.example.com"));
    }

    #[test]
    fn test_error_predicates() {
        assert!(FederationError::not_a("idp list").is_document_error());
        assert!(FederationError::entity_statement_time_not_valid("x").is_time_error());
        assert!(FederationError::federation_statement_bad_signature("x").is_trust_error());
        assert!(!FederationError::federation_statement_bad_signature("x").is_time_error());
        assert!(FederationError::EmptyIdpList.is_metadata_error());
    }

    #[test]
    fn test_codes() {
        assert_eq!(
            FederationError::federation_statement_untrusted("x").code(),
            "federation_statement_untrusted"
        );
        assert_eq!(FederationError::EmptyIdpList.code(), "empty_idp_list");

        let http = HttpError::InvalidScheme("ftp".to_string());
        assert_eq!(FederationError::from(http).code(), "http_invalid_scheme");
    }

    #[test]
    fn test_from_jws_error() {
        let err = FederationError::from(JwsError::UnsupportedAlgorithm("HS256".to_string()));
        assert!(matches!(err, FederationError::UnsupportedAlgorithm(ref a) if a == "HS256"));
        assert!(err.is_trust_error());
    }
}
