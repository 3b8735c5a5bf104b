//! # healthid-federation
//!
//! Relying-party client for the health-identity federation.
//!
//! This crate provides:
//! - Trust-chain resolution through a federation master (OpenID Connect Federation)
//! - A proactive-refresh cache in front of every federation document fetch
//! - Pushed Authorization Requests (PAR) and PKCE code exchange against sectoral IdPs
//! - Decryption and verification of the encrypted ID token
//! - The relying party's own self-signed entity configuration
//!
//! ## Overview
//!
//! An authentication runs in two steps. The caller starts an
//! [`AuthenticationFlow`] with a [`Session`], lists the identity providers
//! known to the federation master and picks one. The selected provider is
//! verified through the federation master before a PAR request is pushed and
//! the user is redirected. When the user comes back with an authorization
//! code, the second step exchanges it and returns the verified ID token.
//!
//! ## Modules
//!
//! - [`auth`] - Authentication flow, PAR/token client, PKCE and ID token claims
//! - [`federation`] - Signed federation documents, caching and trust-chain resolution
//! - [`jose`] - ES256 signatures, ECDH-ES/A256GCM decryption and key material
//! - [`http`] - HTTP transport abstraction and the reqwest implementation
//! - [`config`] - Relying party configuration
//! - [`clock`] - Time source used for document validity checks

pub mod auth;
pub mod clock;
pub mod config;
pub mod federation;
pub mod http;
pub mod jose;

pub use auth::{
    AuthFlowError, AuthenticationFlow, IdTokenClaims, IdTokenResult, OpenIdClient,
    PkceChallenge, PkceVerifier, SelectSectoralIdpStep, Session, TrustedSectoralIdpStep,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, RelyingPartyConfig};
pub use federation::{
    CachedFederationApiClient, EntityStatement, EntityStatementJws, FederationApiClient,
    FederationError, FederationMasterClient, HttpFederationApiClient, IdpEntry, IdpList,
    IdpListJws, SignedDocument, TemporalValidity, TtlCache,
};
pub use http::{HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};
pub use jose::{
    CompactJws, DecryptionKeyLookup, EncryptionKeyPair, JsonWebKey, JweError, JwkSet, JwsError,
    SigningKeyPair, StaticKeyLookup,
};

/// Result type for federation operations.
pub type FederationResult<T> = Result<T, FederationError>;

/// Result type for authentication flow operations.
pub type AuthFlowResult<T> = Result<T, AuthFlowError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use healthid_federation::prelude::*;
/// ```
pub mod prelude {
    pub use crate::auth::{
        AuthFlowError, AuthenticationFlow, IdTokenClaims, IdTokenResult, PkceChallenge,
        PkceVerifier, SelectSectoralIdpStep, Session, TrustedSectoralIdpStep,
    };
    pub use crate::config::{ConfigError, RelyingPartyConfig};
    pub use crate::federation::{
        EntityStatementJws, FederationError, FederationMasterClient, IdpEntry,
    };
    pub use crate::jose::{DecryptionKeyLookup, EncryptionKeyPair, SigningKeyPair, StaticKeyLookup};
    pub use crate::{AuthFlowResult, FederationResult};
}
