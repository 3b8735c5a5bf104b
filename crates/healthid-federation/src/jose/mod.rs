//! JOSE primitives used by the federation and the authentication flow.
//!
//! - [`jws`] - compact JWS parsing, ES256 signing and verification
//! - [`jwe`] - ECDH-ES / A256GCM decryption of the ID token envelope
//! - [`jwk`] - JSON Web Keys and P-256 key pairs

pub mod jwe;
pub mod jwk;
pub mod jws;

pub use jwe::{CompactJwe, DecryptionKeyLookup, JweHeader, StaticKeyLookup};
pub use jwk::{EncryptionKeyPair, JsonWebKey, JwkSet, SigningKeyPair};
pub use jws::{CompactJws, JwsHeader};

/// Errors raised while parsing, signing or verifying a JWS.
#[derive(Debug, thiserror::Error)]
pub enum JwsError {
    /// The serialized form is not a compact JWS.
    #[error("Malformed JWS: {0}")]
    Malformed(String),

    /// The payload is not the expected JSON document.
    #[error("Invalid JWS payload: {0}")]
    InvalidPayload(#[source] serde_json::Error),

    /// The header names an algorithm other than ES256.
    #[error("Unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Key material could not be loaded.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Signing failed.
    #[error("Signing failed: {0}")]
    Signing(String),
}

impl JwsError {
    /// Create a `Malformed` error.
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed(reason.into())
    }

    /// Create an `InvalidKey` error.
    #[must_use]
    pub fn invalid_key(reason: impl Into<String>) -> Self {
        Self::InvalidKey(reason.into())
    }

    /// Returns `true` if the input could not be decoded.
    #[must_use]
    pub fn is_decode_error(&self) -> bool {
        matches!(self, Self::Malformed(_) | Self::InvalidPayload(_))
    }

    /// Machine-readable reason code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "jws_malformed",
            Self::InvalidPayload(_) => "jws_invalid_payload",
            Self::UnsupportedAlgorithm(_) => "jws_unsupported_algorithm",
            Self::InvalidKey(_) => "jws_invalid_key",
            Self::Signing(_) => "jws_signing_failed",
        }
    }
}

/// Errors raised while decrypting or encrypting a JWE.
#[derive(Debug, thiserror::Error)]
pub enum JweError {
    /// The serialized form is not a compact JWE.
    #[error("Malformed JWE: {0}")]
    Malformed(String),

    /// Key management algorithm other than ECDH-ES.
    #[error("Unsupported key management algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Content encryption other than A256GCM.
    #[error("Unsupported content encryption: {0}")]
    UnsupportedEncryption(String),

    /// No decryption key is registered for the envelope's key ID.
    #[error("No decryption key for kid '{0}'")]
    KeyNotFound(String),

    /// The ephemeral public key is missing or not on P-256.
    #[error("Invalid ephemeral public key")]
    InvalidEphemeralKey,

    /// Ciphertext authentication failed.
    #[error("Decryption failed")]
    DecryptionFailed,

    /// Key material could not be loaded.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Encryption failed.
    #[error("Encryption failed: {0}")]
    Encryption(String),
}

impl JweError {
    /// Create a `Malformed` error.
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed(reason.into())
    }

    /// Returns `true` if no key was found for the envelope.
    #[must_use]
    pub fn is_key_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound(_))
    }

    /// Machine-readable reason code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "jwe_malformed",
            Self::UnsupportedAlgorithm(_) => "jwe_unsupported_algorithm",
            Self::UnsupportedEncryption(_) => "jwe_unsupported_encryption",
            Self::KeyNotFound(_) => "jwe_key_not_found",
            Self::InvalidEphemeralKey => "jwe_invalid_epk",
            Self::DecryptionFailed => "jwe_decryption_failed",
            Self::InvalidKey(_) => "jwe_invalid_key",
            Self::Encryption(_) => "jwe_encryption_failed",
        }
    }
}
