//! Caching decorator for [`FederationApiClient`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::api::FederationApiClient;
use super::cache::TtlCache;
use super::documents::{EntityStatementJws, IdpListJws, SignedJwks};
use super::error::FederationError;
use crate::clock::Clock;

/// Serves entity configurations, federation statements and idp lists from
/// [`TtlCache`]s, delegating misses to the wrapped client.
///
/// Signed key sets are always fetched fresh.
pub struct CachedFederationApiClient {
    inner: Arc<dyn FederationApiClient>,
    entity_configurations: TtlCache<EntityStatementJws>,
    federation_statements: TtlCache<EntityStatementJws>,
    idp_lists: TtlCache<IdpListJws>,
}

impl CachedFederationApiClient {
    /// Wraps `inner`; all caches share `minimum_lookahead`.
    #[must_use]
    pub fn new(
        inner: Arc<dyn FederationApiClient>,
        minimum_lookahead: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner,
            entity_configurations: TtlCache::new(minimum_lookahead, Arc::clone(&clock)),
            federation_statements: TtlCache::new(minimum_lookahead, Arc::clone(&clock)),
            idp_lists: TtlCache::new(minimum_lookahead, clock),
        }
    }

    /// Drops every cached document.
    pub fn clear(&self) {
        self.entity_configurations.clear();
        self.federation_statements.clear();
        self.idp_lists.clear();
    }

    /// Drops cached documents that are no longer valid.
    pub fn cleanup(&self) {
        self.entity_configurations.cleanup();
        self.federation_statements.cleanup();
        self.idp_lists.cleanup();
    }
}

impl std::fmt::Debug for CachedFederationApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedFederationApiClient")
            .field("entity_configurations", &self.entity_configurations)
            .field("federation_statements", &self.federation_statements)
            .field("idp_lists", &self.idp_lists)
            .finish_non_exhaustive()
    }
}

fn federation_statement_key(fetch_endpoint: &str, iss: &str, sub: &str) -> String {
    format!("{fetch_endpoint}|{iss}|{sub}")
}

#[async_trait]
impl FederationApiClient for CachedFederationApiClient {
    async fn fetch_entity_configuration(
        &self,
        subject: &str,
    ) -> Result<EntityStatementJws, FederationError> {
        self.entity_configurations
            .compute_if_absent(subject, || self.inner.fetch_entity_configuration(subject))
            .await
    }

    async fn fetch_federation_statement(
        &self,
        fetch_endpoint: &str,
        iss: &str,
        sub: &str,
    ) -> Result<EntityStatementJws, FederationError> {
        let key = federation_statement_key(fetch_endpoint, iss, sub);
        self.federation_statements
            .compute_if_absent(&key, || {
                self.inner.fetch_federation_statement(fetch_endpoint, iss, sub)
            })
            .await
    }

    async fn fetch_idp_list(&self, idp_list_uri: &str) -> Result<IdpListJws, FederationError> {
        self.idp_lists
            .compute_if_absent(idp_list_uri, || self.inner.fetch_idp_list(idp_list_uri))
            .await
    }

    async fn fetch_signed_jwks(&self, uri: &str) -> Result<SignedJwks, FederationError> {
        self.inner.fetch_signed_jwks(uri).await
    }
}
