//! OpenID Connect Federation support.
//!
//! This module resolves trust in sectoral identity providers through the
//! federation master.
//!
//! # Overview
//!
//! - [`documents`] - Entity statements, idp list and signed JWKS
//! - [`cache`] - Proactive-refresh cache for signed documents
//! - [`api`] - Fetching federation documents over HTTP
//! - [`cached_api`] - Caching decorator for the fetch client
//! - [`master`] - Trust-chain resolution and provider key discovery
//! - [`relying_party`] - Our own signed entity configuration
//! - [`error`] - Federation error type

pub mod api;
pub mod cache;
pub mod cached_api;
pub mod documents;
pub mod error;
pub mod master;
pub mod relying_party;

pub use api::{FederationApiClient, HttpFederationApiClient};
pub use cache::TtlCache;
pub use cached_api::CachedFederationApiClient;
pub use documents::{
    DocumentClaims, EntityMetadata, EntityStatement, EntityStatementJws, ExtendedJwks,
    FederationEntityMetadata, IdpEntity, IdpList, IdpListJws, OpenIdProviderMetadata,
    OpenIdRelyingPartyMetadata, SignedDocument, SignedJwks, TemporalValidity,
};
pub use error::FederationError;
pub use master::{FederationMasterClient, IdpEntry};
pub use relying_party::RelyingPartyEntity;
