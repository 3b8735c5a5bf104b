//! Authentication against sectoral identity providers.
//!
//! # Overview
//!
//! - [`flow`] - The two-step authentication state machine
//! - [`openid`] - PAR and token endpoint calls
//! - [`pkce`] - PKCE verifier and S256 challenge
//! - [`session`] - Per-authentication state, nonce and challenge
//! - [`id_token`] - ID token claims
//! - [`error`] - Flow error type

pub mod error;
pub mod flow;
pub mod id_token;
pub mod openid;
pub mod pkce;
pub mod session;

pub use error::AuthFlowError;
pub use flow::{AuthenticationFlow, SelectSectoralIdpStep, TrustedSectoralIdpStep, open_id_token};
pub use id_token::{IdTokenClaims, IdTokenResult};
pub use openid::{OpenIdClient, ParRequest, ParResponse, TokenRequest, TokenResponse};
pub use pkce::{CODE_CHALLENGE_METHOD, PkceChallenge, PkceError, PkceVerifier};
pub use session::Session;
