//! Signed federation documents.
//!
//! # Overview
//!
//! Three kinds of signed documents flow through trust-chain resolution:
//!
//! - [`EntityStatement`] (`typ: entity-statement+jwt`): an entity's claims
//!   about itself (entity configuration) or, issued by the federation master,
//!   about a subordinate (federation statement)
//! - [`IdpList`] (`typ: idp-list+jwt`): the federation master's directory of
//!   identity providers
//! - [`ExtendedJwks`] (`typ: jwk-set+json`, not enforced): a provider key set
//!   published out of band
//!
//! Each is wrapped in a [`SignedDocument`] that keeps the serialized JWS next
//! to the decoded body, so the signature can be checked against whichever key
//! set the caller trusts at that point of the chain.
//!
//! # Validity
//!
//! Documents are usable strictly inside their window: `nbf < t < exp`, with
//! second resolution. Without `nbf` only `exp` bounds the window. A signed
//! JWKS with `exp == 0` never expires.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::error::FederationError;
use crate::jose::{CompactJws, JsonWebKey, JwkSet, SigningKeyPair, jws};

// ============================================================================
// Traits
// ============================================================================

/// A document with a validity window.
pub trait TemporalValidity {
    /// Returns `true` if the document may be used at `at`.
    fn is_valid_at(&self, at: OffsetDateTime) -> bool;
}

/// Claims carried by a [`SignedDocument`].
pub trait DocumentClaims: DeserializeOwned + Serialize + TemporalValidity {
    /// Human-readable kind used in errors.
    const KIND: &'static str;

    /// Expected JWS `typ` header.
    const MEDIA_TYPE: &'static str;

    /// Whether a `typ` other than [`DocumentClaims::MEDIA_TYPE`] is rejected.
    const STRICT_TYPE: bool = true;
}

/// `nbf < t < exp`; an absent `nbf` sets no lower bound.
fn within_window(not_before: Option<i64>, expires: i64, at: OffsetDateTime) -> bool {
    let t = at.unix_timestamp();
    not_before.is_none_or(|nbf| nbf < t) && t < expires
}

// ============================================================================
// Entity Statement
// ============================================================================

/// Claims of an entity statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityStatement {
    /// Issuer entity identifier.
    pub iss: String,

    /// Subject entity identifier.
    pub sub: String,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// Expiration (Unix timestamp).
    pub exp: i64,

    /// Not before (Unix timestamp).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// Keys of the subject.
    #[serde(default)]
    pub jwks: JwkSet,

    /// Superior entities that can issue statements about the subject.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authority_hints: Vec<String>,

    /// Role specific metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EntityMetadata>,
}

impl EntityStatement {
    /// Returns the federation entity metadata.
    #[must_use]
    pub fn federation_entity(&self) -> Option<&FederationEntityMetadata> {
        self.metadata.as_ref()?.federation_entity.as_ref()
    }

    /// Returns the OpenID provider metadata.
    #[must_use]
    pub fn openid_provider(&self) -> Option<&OpenIdProviderMetadata> {
        self.metadata.as_ref()?.openid_provider.as_ref()
    }

    /// Returns the OpenID relying party metadata.
    #[must_use]
    pub fn openid_relying_party(&self) -> Option<&OpenIdRelyingPartyMetadata> {
        self.metadata.as_ref()?.openid_relying_party.as_ref()
    }

    /// Returns the federation fetch endpoint.
    #[must_use]
    pub fn federation_fetch_endpoint(&self) -> Option<&str> {
        self.federation_entity()?.federation_fetch_endpoint.as_deref()
    }

    /// Returns the idp list endpoint.
    #[must_use]
    pub fn idp_list_endpoint(&self) -> Option<&str> {
        self.federation_entity()?.idp_list_endpoint.as_deref()
    }
}

impl TemporalValidity for EntityStatement {
    fn is_valid_at(&self, at: OffsetDateTime) -> bool {
        within_window(self.nbf, self.exp, at)
    }
}

impl DocumentClaims for EntityStatement {
    const KIND: &'static str = "entity statement";
    const MEDIA_TYPE: &'static str = "entity-statement+jwt";
}

/// Metadata of an entity, keyed by entity type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMetadata {
    /// Federation entity metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub federation_entity: Option<FederationEntityMetadata>,

    /// OpenID provider metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openid_provider: Option<OpenIdProviderMetadata>,

    /// OpenID relying party metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openid_relying_party: Option<OpenIdRelyingPartyMetadata>,
}

/// Metadata of a federation entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationEntityMetadata {
    /// Endpoint issuing federation statements about subordinates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub federation_fetch_endpoint: Option<String>,

    /// Endpoint listing subordinates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub federation_list_endpoint: Option<String>,

    /// Endpoint serving the signed idp list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idp_list_endpoint: Option<String>,

    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Contact addresses.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contacts: Vec<String>,

    /// Homepage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage_uri: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Metadata of an OpenID provider (sectoral IdP).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenIdProviderMetadata {
    /// Issuer identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// Authorization endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,

    /// Token endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,

    /// Pushed authorization request endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pushed_authorization_request_endpoint: Option<String>,

    /// Location of an out-of-band signed key set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_jwks_uri: Option<String>,

    /// Keys embedded directly in the metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks: Option<JwkSet>,

    /// Organization name shown to users.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,

    /// Logo shown to users.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_uri: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Metadata of an OpenID relying party.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenIdRelyingPartyMetadata {
    /// Registered redirect URIs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redirect_uris: Vec<String>,

    /// Space separated scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Encryption keys for ID tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks: Option<JwkSet>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub client_registration_types: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_method: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grant_types: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_types: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_pushed_authorization_requests: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token_signed_response_alg: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token_encrypted_response_alg: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token_encrypted_response_enc: Option<String>,

    /// Organization name shown to users.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
}

// ============================================================================
// Idp List
// ============================================================================

/// Claims of the federation master's idp list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdpList {
    /// Issuer (the federation master).
    pub iss: String,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// Expiration (Unix timestamp).
    pub exp: i64,

    /// Not before (Unix timestamp).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// Listed identity providers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idp_entity: Option<Vec<IdpEntity>>,
}

impl TemporalValidity for IdpList {
    fn is_valid_at(&self, at: OffsetDateTime) -> bool {
        within_window(self.nbf, self.exp, at)
    }
}

impl DocumentClaims for IdpList {
    const KIND: &'static str = "idp list";
    const MEDIA_TYPE: &'static str = "idp-list+jwt";
}

/// An entry of the idp list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdpEntity {
    /// Entity identifier of the provider.
    pub iss: String,

    /// Display name.
    #[serde(default, alias = "name")]
    pub organization_name: String,

    /// Logo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_uri: Option<String>,

    /// Supported user type (e.g. `IP` for insured persons).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_type_supported: Option<String>,

    /// Whether the provider serves privately insured persons.
    #[serde(default)]
    pub pkv: bool,
}

// ============================================================================
// Signed JWKS
// ============================================================================

/// Claims of a signed key set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedJwks {
    /// Expiration (Unix timestamp); `0` never expires.
    #[serde(default)]
    pub exp: i64,

    /// Issuer, expected to be the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Issued at (Unix timestamp).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// The keys.
    #[serde(default)]
    pub keys: Vec<JsonWebKey>,
}

impl ExtendedJwks {
    /// Returns the keys as a plain key set.
    #[must_use]
    pub fn to_jwk_set(&self) -> JwkSet {
        JwkSet::new(self.keys.clone())
    }
}

impl TemporalValidity for ExtendedJwks {
    fn is_valid_at(&self, at: OffsetDateTime) -> bool {
        self.exp == 0 || at.unix_timestamp() < self.exp
    }
}

impl DocumentClaims for ExtendedJwks {
    const KIND: &'static str = "signed jwks";
    const MEDIA_TYPE: &'static str = "jwk-set+json";
    const STRICT_TYPE: bool = false;
}

// ============================================================================
// Signed Document
// ============================================================================

/// A compact JWS together with its decoded claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedDocument<T> {
    jws: CompactJws,
    body: T,
}

/// A signed entity statement.
pub type EntityStatementJws = SignedDocument<EntityStatement>;

/// A signed idp list.
pub type IdpListJws = SignedDocument<IdpList>;

/// A signed key set.
pub type SignedJwks = SignedDocument<ExtendedJwks>;

impl<T: DocumentClaims> SignedDocument<T> {
    /// Parses a serialized document.
    ///
    /// # Errors
    ///
    /// - `FederationError::NotA` if the input is not a compact JWS or its
    ///   `typ` does not match (for strictly typed documents)
    /// - `FederationError::Bad` if the payload does not decode into `T`
    pub fn parse(raw: &str) -> Result<Self, FederationError> {
        let jws = CompactJws::parse(raw).map_err(|e| {
            tracing::debug!("Rejecting {}: {}", T::KIND, e);
            FederationError::not_a(T::KIND)
        })?;

        if T::STRICT_TYPE && !media_type_matches(jws.header().typ.as_deref(), T::MEDIA_TYPE) {
            tracing::debug!(
                "Rejecting {}: typ {:?} is not {}",
                T::KIND,
                jws.header().typ,
                T::MEDIA_TYPE
            );
            return Err(FederationError::not_a(T::KIND));
        }

        let body = jws
            .claims::<T>()
            .map_err(|e| FederationError::bad(T::KIND, e))?;

        Ok(Self { jws, body })
    }

    /// Signs `body` with ES256, using the document's media type as `typ`.
    ///
    /// # Errors
    ///
    /// Returns `FederationError::Signing` if signing fails.
    pub fn sign(body: T, key: &SigningKeyPair) -> Result<Self, FederationError> {
        let jws = CompactJws::sign(&body, T::MEDIA_TYPE, key)?;
        Ok(Self { jws, body })
    }
}

impl<T> SignedDocument<T> {
    /// Checks the signature against `trusted_keys`.
    ///
    /// # Errors
    ///
    /// Returns `FederationError::UnsupportedAlgorithm` for algorithms other than ES256.
    pub fn verify_signature(&self, trusted_keys: &JwkSet) -> Result<bool, FederationError> {
        Ok(jws::verify(trusted_keys, &self.jws)?)
    }

    /// Returns the decoded claims.
    #[must_use]
    pub fn body(&self) -> &T {
        &self.body
    }

    /// Returns the underlying JWS.
    #[must_use]
    pub fn jws(&self) -> &CompactJws {
        &self.jws
    }

    /// Returns the serialized form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.jws.as_str()
    }

    /// Consumes the document and returns the claims.
    #[must_use]
    pub fn into_body(self) -> T {
        self.body
    }
}

impl<T: TemporalValidity> TemporalValidity for SignedDocument<T> {
    fn is_valid_at(&self, at: OffsetDateTime) -> bool {
        self.body.is_valid_at(at)
    }
}

/// Compares `typ` ignoring case and an optional `application/` prefix.
fn media_type_matches(typ: Option<&str>, expected: &str) -> bool {
    typ.map(|t| {
        let t = t.trim();
        let t = t
            .get(..12)
            .filter(|prefix| prefix.eq_ignore_ascii_case("application/"))
            .map_or(t, |_| &t[12..]);
        t.eq_ignore_ascii_case(expected)
    })
    .unwrap_or(false)
}
