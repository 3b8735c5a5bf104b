//! The relying party's own entity configuration.
//!
//! Identity providers resolve the relying party the same way it resolves
//! them: by fetching `{issuer}/.well-known/openid-federation`. This module
//! builds and signs that document; serving it is left to the web layer.

use std::sync::Arc;

use time::OffsetDateTime;

use super::documents::{
    EntityMetadata, EntityStatement, EntityStatementJws, FederationEntityMetadata,
    OpenIdRelyingPartyMetadata,
};
use super::error::FederationError;
use crate::clock::Clock;
use crate::config::RelyingPartyConfig;
use crate::jose::jwe::{A256GCM, ECDH_ES};
use crate::jose::jws::ES256;
use crate::jose::{EncryptionKeyPair, JwkSet, SigningKeyPair};

/// Builds and signs the relying party's entity configuration.
pub struct RelyingPartyEntity {
    config: RelyingPartyConfig,
    signing_key: SigningKeyPair,
    encryption_keys: Vec<EncryptionKeyPair>,
    clock: Arc<dyn Clock>,
}

impl RelyingPartyEntity {
    /// Creates the entity from configuration and key material.
    #[must_use]
    pub fn new(
        config: RelyingPartyConfig,
        signing_key: SigningKeyPair,
        encryption_keys: Vec<EncryptionKeyPair>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            signing_key,
            encryption_keys,
            clock,
        }
    }

    /// Returns the unsigned entity statement valid from now for the configured TTL.
    #[must_use]
    pub fn entity_statement(&self) -> EntityStatement {
        build_entity_statement(
            &self.config,
            &self.signing_key,
            &self.encryption_keys,
            self.clock.now(),
        )
    }

    /// Returns a freshly signed entity configuration.
    ///
    /// # Errors
    ///
    /// Returns `FederationError::Signing` if signing fails.
    pub fn entity_configuration(&self) -> Result<EntityStatementJws, FederationError> {
        let statement = EntityStatementJws::sign(self.entity_statement(), &self.signing_key)?;
        tracing::debug!("Signed entity configuration for {}", self.config.issuer);
        Ok(statement)
    }

    /// Returns the public signing keys.
    #[must_use]
    pub fn signing_jwks(&self) -> JwkSet {
        self.signing_key.to_jwk_set()
    }
}

impl std::fmt::Debug for RelyingPartyEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelyingPartyEntity")
            .field("issuer", &self.config.issuer)
            .field("signing_key", &self.signing_key)
            .field("encryption_keys", &self.encryption_keys)
            .finish_non_exhaustive()
    }
}

/// Builds the relying party entity statement issued at `now`.
#[must_use]
pub fn build_entity_statement(
    config: &RelyingPartyConfig,
    signing_key: &SigningKeyPair,
    encryption_keys: &[EncryptionKeyPair],
    now: OffsetDateTime,
) -> EntityStatement {
    let iat = now.unix_timestamp();
    let ttl = i64::try_from(config.entity_statement.ttl.as_secs()).unwrap_or(i64::MAX);
    let organization_name =
        (!config.organization_name.is_empty()).then(|| config.organization_name.clone());

    let relying_party = OpenIdRelyingPartyMetadata {
        redirect_uris: config.redirect_uris.clone(),
        scope: Some(config.scopes.join(" ")),
        jwks: Some(JwkSet::new(
            encryption_keys.iter().map(EncryptionKeyPair::to_jwk).collect(),
        )),
        client_registration_types: vec!["automatic".to_string()],
        token_endpoint_auth_method: Some("self_signed_tls_client_auth".to_string()),
        grant_types: vec!["authorization_code".to_string()],
        response_types: vec!["code".to_string()],
        require_pushed_authorization_requests: Some(true),
        id_token_signed_response_alg: Some(ES256.to_string()),
        id_token_encrypted_response_alg: Some(ECDH_ES.to_string()),
        id_token_encrypted_response_enc: Some(A256GCM.to_string()),
        organization_name: organization_name.clone(),
    };

    EntityStatement {
        iss: config.issuer.clone(),
        sub: config.issuer.clone(),
        iat,
        exp: iat.saturating_add(ttl),
        nbf: Some(iat),
        jwks: signing_key.to_jwk_set(),
        authority_hints: vec![config.federation_master.clone()],
        metadata: Some(EntityMetadata {
            federation_entity: Some(FederationEntityMetadata {
                name: organization_name,
                ..Default::default()
            }),
            openid_provider: None,
            openid_relying_party: Some(relying_party),
        }),
    }
}
