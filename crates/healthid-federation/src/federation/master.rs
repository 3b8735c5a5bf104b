//! Trust-chain resolution through the federation master.
//!
//! # Overview
//!
//! The federation master is the trust anchor. A sectoral identity provider
//! is trusted when:
//!
//! 1. the master's own entity configuration is valid and self-signed,
//! 2. the master issues a valid federation statement about the provider,
//!    signed with the master's keys,
//! 3. the provider's own entity configuration is valid and signed with a key
//!    the federation statement vouches for, and
//! 4. if the provider publishes keys other than the vouched ones, its entity
//!    configuration is also self-signed.
//!
//! Every step short-circuits with a typed [`FederationError`].
//!
//! # Example
//!
//! ```ignore
//! let master = FederationMasterClient::new(federation_master, api, Arc::new(SystemClock));
//! let options = master.list_available_idps().await?;
//! let provider = master.establish_idp_trust(&options[0].iss).await?;
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::api::FederationApiClient;
use super::documents::{EntityStatementJws, TemporalValidity};
use super::error::FederationError;
use crate::clock::Clock;
use crate::jose::JwkSet;

/// An identity provider the user can choose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdpEntry {
    /// Entity identifier of the provider.
    pub iss: String,
    /// Display name.
    pub name: String,
    /// Logo.
    pub logo_uri: Option<String>,
}

/// Client for the federation master.
#[derive(Clone)]
pub struct FederationMasterClient {
    federation_master: String,
    api: Arc<dyn FederationApiClient>,
    clock: Arc<dyn Clock>,
}

impl FederationMasterClient {
    /// Creates a client for the federation master `federation_master`.
    #[must_use]
    pub fn new(
        federation_master: impl Into<String>,
        api: Arc<dyn FederationApiClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            federation_master: federation_master.into(),
            api,
            clock,
        }
    }

    /// Returns the federation master's entity identifier.
    #[must_use]
    pub fn federation_master(&self) -> &str {
        &self.federation_master
    }

    /// Lists the identity providers registered with the federation master.
    ///
    /// The idp list is used as served; its signature and validity window
    /// are not checked.
    ///
    /// # Errors
    ///
    /// - `FederationError::MissingIdpListUrl` if the master publishes no idp list endpoint
    /// - `FederationError::EmptyIdpList` if the list has no entries member
    pub async fn list_available_idps(&self) -> Result<Vec<IdpEntry>, FederationError> {
        let master = self
            .api
            .fetch_entity_configuration(&self.federation_master)
            .await?;

        let idp_list_uri = master.body().idp_list_endpoint().ok_or_else(|| {
            FederationError::MissingIdpListUrl {
                subject: self.federation_master.clone(),
            }
        })?;

        let idp_list = self.api.fetch_idp_list(idp_list_uri).await?;
        tracing::debug!(
            "Using idp list from {} without signature check",
            idp_list_uri
        );

        let entries = idp_list
            .into_body()
            .idp_entity
            .ok_or(FederationError::EmptyIdpList)?;

        Ok(entries
            .into_iter()
            .map(|entity| IdpEntry {
                iss: entity.iss,
                name: entity.organization_name,
                logo_uri: entity.logo_uri,
            })
            .collect())
    }

    /// Establishes trust in the identity provider `issuer`.
    ///
    /// Returns the provider's verified entity configuration.
    ///
    /// # Errors
    ///
    /// - `EntityStatementTimeNotValid` / `EntityStatementBadSignature` for the master's configuration
    /// - `MissingFederationFetchUrl` if the master publishes no fetch endpoint
    /// - `FederationStatementTimeNotValid` / `FederationStatementBadSignature` for the master's statement about `issuer`
    /// - `EntityStatementTimeNotValid` for the provider's configuration
    /// - `FederationStatementUntrusted` if the provider's configuration is not signed with a vouched key
    /// - `EntityStatementBadSignature` if the provider's own differing keys do not verify its configuration
    pub async fn establish_idp_trust(
        &self,
        issuer: &str,
    ) -> Result<EntityStatementJws, FederationError> {
        let now = self.clock.now();
        let master_subject = self.federation_master.as_str();

        // Federation master, self-signed
        let master = self.api.fetch_entity_configuration(master_subject).await?;
        if !master.is_valid_at(now) {
            return Err(FederationError::entity_statement_time_not_valid(master_subject));
        }
        if !master.verify_signature(&master.body().jwks)? {
            tracing::warn!("Federation master {} is not self-signed", master_subject);
            return Err(FederationError::entity_statement_bad_signature(master_subject));
        }

        let fetch_endpoint = master.body().federation_fetch_endpoint().ok_or_else(|| {
            FederationError::MissingFederationFetchUrl {
                subject: master_subject.to_string(),
            }
        })?;

        // Master's statement about the provider
        let federation_statement = self
            .api
            .fetch_federation_statement(fetch_endpoint, master_subject, issuer)
            .await?;
        if !federation_statement.is_valid_at(now) {
            return Err(FederationError::federation_statement_time_not_valid(issuer));
        }
        if !federation_statement.verify_signature(&master.body().jwks)? {
            tracing::warn!("Federation statement about {} not signed by master", issuer);
            return Err(FederationError::federation_statement_bad_signature(issuer));
        }
        let trust_store = &federation_statement.body().jwks;

        // Provider's own configuration, signed with a vouched key
        let provider = self.api.fetch_entity_configuration(issuer).await?;
        if !provider.is_valid_at(now) {
            return Err(FederationError::entity_statement_time_not_valid(issuer));
        }
        if !provider.verify_signature(trust_store)? {
            tracing::warn!("Entity configuration of {} not signed by a vouched key", issuer);
            return Err(FederationError::federation_statement_untrusted(issuer));
        }

        let own_keys = &provider.body().jwks;
        if !own_keys.same_keys(trust_store) && !provider.verify_signature(own_keys)? {
            tracing::warn!("Entity configuration of {} is not self-signed", issuer);
            return Err(FederationError::entity_statement_bad_signature(issuer));
        }

        tracing::info!("Established trust in {}", issuer);
        Ok(provider)
    }

    /// Collects the keys of an OpenID provider.
    ///
    /// Keys embedded in the provider metadata are combined with the keys of
    /// its signed JWKS, if it publishes one. The signed JWKS must be valid,
    /// signed with a key of `entity_statement` and, when it names an issuer,
    /// issued by the provider.
    ///
    /// # Errors
    ///
    /// - `FederationError::ExpiredSignedJwks` if the signed JWKS is outside its validity window
    /// - `FederationError::InvalidSignedJwks` if its signature or issuer does not match
    /// - `FederationError::NoOpenIdProviderKeys` if no keys are found at all
    pub async fn resolve_openid_provider_jwks(
        &self,
        entity_statement: &EntityStatementJws,
    ) -> Result<JwkSet, FederationError> {
        let statement = entity_statement.body();
        let provider = statement.openid_provider();

        let mut keys = provider
            .and_then(|p| p.jwks.clone())
            .unwrap_or_default();

        if let Some(uri) = provider.and_then(|p| p.signed_jwks_uri.as_deref()) {
            let signed = self.api.fetch_signed_jwks(uri).await?;

            if !signed.is_valid_at(self.clock.now()) {
                return Err(FederationError::ExpiredSignedJwks {
                    uri: uri.to_string(),
                });
            }
            if !signed.verify_signature(&statement.jwks)? {
                tracing::warn!("Signed JWKS {} not signed by {}", uri, statement.sub);
                return Err(FederationError::InvalidSignedJwks {
                    uri: uri.to_string(),
                });
            }
            if let Some(iss) = signed.body().iss.as_deref()
                && !iss.trim().is_empty()
                && iss != statement.sub
            {
                tracing::warn!("Signed JWKS {} issued by {}, expected {}", uri, iss, statement.sub);
                return Err(FederationError::InvalidSignedJwks {
                    uri: uri.to_string(),
                });
            }

            keys.merge(signed.body().to_jwk_set());
        }

        if keys.is_empty() {
            return Err(FederationError::NoOpenIdProviderKeys {
                subject: statement.sub.clone(),
            });
        }

        tracing::debug!("Resolved {} keys for {}", keys.len(), statement.sub);
        Ok(keys)
    }
}

impl std::fmt::Debug for FederationMasterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederationMasterClient")
            .field("federation_master", &self.federation_master)
            .finish_non_exhaustive()
    }
}
