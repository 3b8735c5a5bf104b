//! Federation endpoint client.
//!
//! [`FederationApiClient`] fetches the four kinds of federation documents.
//! [`HttpFederationApiClient`] performs the requests on top of an
//! [`HttpClient`]; [`super::CachedFederationApiClient`] puts a
//! [`super::TtlCache`] in front of it.

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use super::documents::{DocumentClaims, EntityStatementJws, IdpListJws, SignedDocument, SignedJwks};
use super::error::FederationError;
use crate::http::{HttpClient, HttpRequest, send_expecting};

/// Path of an entity's own configuration, relative to its identifier.
pub const WELL_KNOWN_FEDERATION_PATH: &str = "/.well-known/openid-federation";

/// `Accept` header for entity statements.
pub const ENTITY_STATEMENT_ACCEPT: &str = "application/entity-statement+jwt";

/// `Accept` header for the idp list.
pub const IDP_LIST_ACCEPT: &str = "application/jwt";

/// `Accept` header for signed key sets.
pub const SIGNED_JWKS_ACCEPT: &str = "application/jwk-set+json, application/json";

/// Fetches federation documents.
#[async_trait]
pub trait FederationApiClient: Send + Sync {
    /// Fetches the entity configuration `subject` publishes about itself.
    async fn fetch_entity_configuration(
        &self,
        subject: &str,
    ) -> Result<EntityStatementJws, FederationError>;

    /// Fetches the statement `iss` makes about `sub` from `fetch_endpoint`.
    async fn fetch_federation_statement(
        &self,
        fetch_endpoint: &str,
        iss: &str,
        sub: &str,
    ) -> Result<EntityStatementJws, FederationError>;

    /// Fetches the idp list.
    async fn fetch_idp_list(&self, idp_list_uri: &str) -> Result<IdpListJws, FederationError>;

    /// Fetches a provider's signed key set.
    async fn fetch_signed_jwks(&self, uri: &str) -> Result<SignedJwks, FederationError>;
}

/// [`FederationApiClient`] performing plain HTTP requests.
#[derive(Clone)]
pub struct HttpFederationApiClient {
    http: Arc<dyn HttpClient>,
}

impl HttpFederationApiClient {
    /// Creates a client on top of the given transport.
    #[must_use]
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }

    async fn fetch<T: DocumentClaims>(
        &self,
        url: Url,
        accept: &str,
    ) -> Result<SignedDocument<T>, FederationError> {
        tracing::debug!("Fetching {} from {}", T::KIND, url);

        let request = HttpRequest::get(url).header("Accept", accept);
        let response = send_expecting(self.http.as_ref(), request, 200).await?;

        SignedDocument::parse(&response.text())
    }
}

impl std::fmt::Debug for HttpFederationApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFederationApiClient").finish_non_exhaustive()
    }
}

#[async_trait]
impl FederationApiClient for HttpFederationApiClient {
    async fn fetch_entity_configuration(
        &self,
        subject: &str,
    ) -> Result<EntityStatementJws, FederationError> {
        let url = entity_configuration_url(subject)?;
        self.fetch(url, ENTITY_STATEMENT_ACCEPT).await
    }

    async fn fetch_federation_statement(
        &self,
        fetch_endpoint: &str,
        iss: &str,
        sub: &str,
    ) -> Result<EntityStatementJws, FederationError> {
        let mut url = parse_url(fetch_endpoint)?;
        url.query_pairs_mut()
            .append_pair("iss", iss)
            .append_pair("sub", sub);
        self.fetch(url, ENTITY_STATEMENT_ACCEPT).await
    }

    async fn fetch_idp_list(&self, idp_list_uri: &str) -> Result<IdpListJws, FederationError> {
        let url = parse_url(idp_list_uri)?;
        self.fetch(url, IDP_LIST_ACCEPT).await
    }

    async fn fetch_signed_jwks(&self, uri: &str) -> Result<SignedJwks, FederationError> {
        let url = parse_url(uri)?;
        self.fetch(url, SIGNED_JWKS_ACCEPT).await
    }
}

/// Returns `{subject}/.well-known/openid-federation`.
///
/// # Errors
///
/// Returns `FederationError::InvalidUrl` if `subject` is not a URL.
pub fn entity_configuration_url(subject: &str) -> Result<Url, FederationError> {
    parse_url(&format!(
        "{}{}",
        subject.trim_end_matches('/'),
        WELL_KNOWN_FEDERATION_PATH
    ))
}

fn parse_url(value: &str) -> Result<Url, FederationError> {
    Url::parse(value).map_err(|e| FederationError::invalid_url(value, e))
}
