//! Per-authentication session values.

use serde::{Deserialize, Serialize};

use super::pkce::{PkceChallenge, PkceVerifier};

/// Values bound to one authentication attempt.
///
/// The caller persists the session (and the matching [`PkceVerifier`])
/// until the identity provider redirects back, and checks `state` and
/// `nonce` against what comes back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque value echoed back on the callback.
    pub state: String,
    /// Value the identity provider embeds in the ID token.
    pub nonce: String,
    /// Where the identity provider redirects with the authorization code.
    pub callback_uri: String,
    /// S256 challenge of the session's verifier.
    pub code_challenge: String,
    /// Requested scopes.
    pub scopes: Vec<String>,
}

impl Session {
    /// Creates a session from stored values.
    #[must_use]
    pub fn new(
        state: impl Into<String>,
        nonce: impl Into<String>,
        callback_uri: impl Into<String>,
        code_challenge: &PkceChallenge,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            state: state.into(),
            nonce: nonce.into(),
            callback_uri: callback_uri.into(),
            code_challenge: code_challenge.as_str().to_string(),
            scopes,
        }
    }

    /// Creates a session with random `state`, `nonce` and PKCE verifier.
    ///
    /// Returns the session and the verifier that must be presented on code
    /// exchange.
    #[must_use]
    pub fn generate(callback_uri: impl Into<String>, scopes: Vec<String>) -> (Self, PkceVerifier) {
        let verifier = PkceVerifier::generate();
        let challenge = PkceChallenge::from_verifier(&verifier);
        let session = Self::new(
            uuid::Uuid::new_v4().simple().to_string(),
            uuid::Uuid::new_v4().simple().to_string(),
            callback_uri,
            &challenge,
            scopes,
        );
        (session, verifier)
    }

    /// Returns the scopes as a space-separated string.
    #[must_use]
    pub fn scope(&self) -> String {
        self.scopes.join(" ")
    }
}
