//! PKCE (Proof Key for Code Exchange, RFC 7636) for the relying party side.
//!
//! The relying party generates a verifier per authentication, sends the S256
//! challenge with the pushed authorization request and presents the verifier
//! when exchanging the code.
//!
//! # Example
//!
//! ```
//! use healthid_federation::auth::{PkceChallenge, PkceVerifier};
//!
//! let verifier = PkceVerifier::generate();
//! let challenge = PkceChallenge::from_verifier(&verifier);
//! assert!(challenge.verify(&verifier).is_ok());
//! ```

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};

/// The only challenge method used.
pub const CODE_CHALLENGE_METHOD: &str = "S256";

/// Errors raised for malformed PKCE values.
#[derive(Debug, thiserror::Error)]
pub enum PkceError {
    /// Verifier length is outside 43..=128.
    #[error("Invalid verifier length: must be 43-128 characters, got {0}")]
    InvalidVerifierLength(usize),

    /// Verifier contains characters outside `[A-Za-z0-9-._~]`.
    #[error("Invalid verifier characters")]
    InvalidVerifierCharacters,

    /// Challenge is not base64url.
    #[error("Invalid challenge format: must be base64url")]
    InvalidChallengeFormat,

    /// Verifier does not match challenge.
    #[error("PKCE verification failed")]
    VerificationFailed,
}

impl PkceError {
    /// Machine-readable reason code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidVerifierLength(_) => "pkce_invalid_verifier_length",
            Self::InvalidVerifierCharacters => "pkce_invalid_verifier_characters",
            Self::InvalidChallengeFormat => "pkce_invalid_challenge",
            Self::VerificationFailed => "pkce_verification_failed",
        }
    }
}

/// PKCE code verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceVerifier(String);

impl PkceVerifier {
    /// Wraps a verifier received from elsewhere (e.g. a session store).
    ///
    /// # Errors
    ///
    /// Returns an error unless the verifier is 43-128 unreserved characters.
    pub fn new(verifier: impl Into<String>) -> Result<Self, PkceError> {
        let verifier = verifier.into();

        if !(43..=128).contains(&verifier.len()) {
            return Err(PkceError::InvalidVerifierLength(verifier.len()));
        }
        if !verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'))
        {
            return Err(PkceError::InvalidVerifierCharacters);
        }

        Ok(Self(verifier))
    }

    /// Generates a verifier from 32 random bytes (43 base64url characters).
    #[must_use]
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Returns the verifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// S256 code challenge, `BASE64URL(SHA256(verifier))`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceChallenge(String);

impl PkceChallenge {
    /// Derives the challenge of `verifier`.
    #[must_use]
    pub fn from_verifier(verifier: &PkceVerifier) -> Self {
        let hash = Sha256::digest(verifier.as_str().as_bytes());
        Self(URL_SAFE_NO_PAD.encode(hash))
    }

    /// Wraps a stored challenge.
    ///
    /// # Errors
    ///
    /// Returns `PkceError::InvalidChallengeFormat` if it is not base64url.
    pub fn new(challenge: impl Into<String>) -> Result<Self, PkceError> {
        let challenge = challenge.into();
        if URL_SAFE_NO_PAD.decode(&challenge).is_err() {
            return Err(PkceError::InvalidChallengeFormat);
        }
        Ok(Self(challenge))
    }

    /// Checks that `verifier` produced this challenge.
    ///
    /// # Errors
    ///
    /// Returns `PkceError::VerificationFailed` on mismatch.
    pub fn verify(&self, verifier: &PkceVerifier) -> Result<(), PkceError> {
        if Self::from_verifier(verifier) == *self {
            Ok(())
        } else {
            Err(PkceError::VerificationFailed)
        }
    }

    /// Returns the challenge.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
