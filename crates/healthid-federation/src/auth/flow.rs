//! Two-step authentication with a sectoral identity provider.
//!
//! # Overview
//!
//! ```text
//! AuthenticationFlow::start(session)
//!     -> SelectSectoralIdpStep        fetch_idp_options()
//!        redirect_to_sectoral_idp(issuer)
//!     -> TrustedSectoralIdpStep       idp_redirect_uri()
//!        exchange_sectoral_idp_code(code, verifier)
//!     -> IdTokenResult
//! ```
//!
//! Each transition consumes its step, so a step cannot be replayed.
//! Steps hold no network state; the caller keeps the session and the PKCE
//! verifier between the redirect and the callback.
//!
//! # Example
//!
//! ```ignore
//! let flow = AuthenticationFlow::from_config(&config, key_lookup)?;
//! let (session, verifier) = Session::generate(callback, scopes);
//!
//! let step = flow.start(session);
//! let options = step.fetch_idp_options().await?;
//! let step = step.redirect_to_sectoral_idp(&options[0].iss).await?;
//! // redirect the user agent to step.idp_redirect_uri()
//!
//! let id_token = step.exchange_sectoral_idp_code(&code, verifier.as_str()).await?;
//! ```

use std::sync::Arc;

use url::Url;

use super::error::AuthFlowError;
use super::id_token::{IdTokenClaims, IdTokenResult};
use super::openid::{OpenIdClient, ParRequest, TokenRequest};
use super::session::Session;
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, RelyingPartyConfig};
use crate::federation::{
    CachedFederationApiClient, EntityStatementJws, FederationApiClient, FederationMasterClient,
    HttpFederationApiClient, IdpEntry, OpenIdProviderMetadata,
};
use crate::http::{HttpClient, ReqwestHttpClient};
use crate::jose::jwe::{self, CompactJwe, DecryptionKeyLookup};
use crate::jose::{CompactJws, JweError, jws};

/// Entry point of the authentication flow.
#[derive(Clone)]
pub struct AuthenticationFlow {
    self_issuer: String,
    master: Arc<FederationMasterClient>,
    openid: Arc<OpenIdClient>,
    key_lookup: Arc<dyn DecryptionKeyLookup>,
}

impl AuthenticationFlow {
    /// Creates a flow for the relying party `self_issuer`.
    #[must_use]
    pub fn new(
        self_issuer: impl Into<String>,
        master: Arc<FederationMasterClient>,
        openid: Arc<OpenIdClient>,
        key_lookup: Arc<dyn DecryptionKeyLookup>,
    ) -> Self {
        Self {
            self_issuer: self_issuer.into(),
            master,
            openid,
            key_lookup,
        }
    }

    /// Wires a flow from configuration.
    ///
    /// Federation documents are fetched through a cache that refreshes
    /// entries `cache.minimum_lookahead` before they expire.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration is invalid or the HTTP
    /// client cannot be built.
    pub fn from_config(
        config: &RelyingPartyConfig,
        key_lookup: Arc<dyn DecryptionKeyLookup>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let http: Arc<dyn HttpClient> = Arc::new(
            ReqwestHttpClient::new(&config.http)
                .map_err(|e| ConfigError::InvalidValue(format!("http: {e}")))?,
        );
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let api: Arc<dyn FederationApiClient> = Arc::new(CachedFederationApiClient::new(
            Arc::new(HttpFederationApiClient::new(http.clone())),
            config.cache.minimum_lookahead,
            clock.clone(),
        ));
        let master = FederationMasterClient::new(config.federation_master.clone(), api, clock);

        tracing::info!(
            "Authentication flow for {} via federation master {}",
            config.issuer,
            config.federation_master
        );

        Ok(Self::new(
            config.issuer.clone(),
            Arc::new(master),
            Arc::new(OpenIdClient::new(http)),
            key_lookup,
        ))
    }

    /// Returns the relying party's entity identifier.
    #[must_use]
    pub fn self_issuer(&self) -> &str {
        &self.self_issuer
    }

    /// Returns the federation master client.
    #[must_use]
    pub fn master(&self) -> &FederationMasterClient {
        &self.master
    }

    /// Starts an authentication for `session`.
    #[must_use]
    pub fn start(&self, session: Session) -> SelectSectoralIdpStep {
        SelectSectoralIdpStep {
            self_issuer: self.self_issuer.clone(),
            master: self.master.clone(),
            openid: self.openid.clone(),
            key_lookup: self.key_lookup.clone(),
            session,
        }
    }
}

impl std::fmt::Debug for AuthenticationFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationFlow")
            .field("self_issuer", &self.self_issuer)
            .field("master", &self.master)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Step 1: select a sectoral identity provider
// ============================================================================

/// First step: the user picks an identity provider.
pub struct SelectSectoralIdpStep {
    self_issuer: String,
    master: Arc<FederationMasterClient>,
    openid: Arc<OpenIdClient>,
    key_lookup: Arc<dyn DecryptionKeyLookup>,
    session: Session,
}

impl SelectSectoralIdpStep {
    /// Returns the session this step was started with.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Lists the identity providers known to the federation master.
    ///
    /// # Errors
    ///
    /// Returns `AuthFlowError::Federation` if the idp list cannot be fetched.
    pub async fn fetch_idp_options(&self) -> Result<Vec<IdpEntry>, AuthFlowError> {
        Ok(self.master.list_available_idps().await?)
    }

    /// Establishes trust in `issuer` and pushes the authorization request.
    ///
    /// # Errors
    ///
    /// - `AuthFlowError::Federation` if trust cannot be established
    /// - `AuthFlowError::MissingOpenIdProvider` if the provider has no OpenID metadata
    /// - `AuthFlowError::MissingParEndpoint` / `MissingAuthorizationEndpoint` for missing endpoints
    /// - `AuthFlowError::FailedParRequest` if the provider does not answer `201`
    /// - `AuthFlowError::InvalidParRequestUri` if the answer carries no `request_uri`
    pub async fn redirect_to_sectoral_idp(
        self,
        issuer: &str,
    ) -> Result<TrustedSectoralIdpStep, AuthFlowError> {
        let entity_statement = self.master.establish_idp_trust(issuer).await?;
        let provider = openid_provider(&entity_statement, issuer)?;

        let par_endpoint = provider
            .pushed_authorization_request_endpoint
            .as_deref()
            .ok_or_else(|| AuthFlowError::MissingParEndpoint {
                issuer: issuer.to_string(),
            })?;
        let par_endpoint = parse_endpoint(par_endpoint)?;

        let request = ParRequest {
            client_id: self.self_issuer.clone(),
            code_challenge: self.session.code_challenge.clone(),
            redirect_uri: self.session.callback_uri.clone(),
            nonce: self.session.nonce.clone(),
            state: self.session.state.clone(),
            scopes: self.session.scopes.clone(),
        };
        let par = self
            .openid
            .push_authorization_request(par_endpoint, &request)
            .await
            .map_err(AuthFlowError::FailedParRequest)?;

        let authorization_endpoint = provider
            .authorization_endpoint
            .as_deref()
            .ok_or_else(|| AuthFlowError::MissingAuthorizationEndpoint {
                issuer: issuer.to_string(),
            })?;

        let request_uri = par
            .request_uri
            .filter(|uri| !uri.trim().is_empty())
            .ok_or(AuthFlowError::InvalidParRequestUri)?;

        let mut redirect_uri = parse_endpoint(authorization_endpoint)?;
        redirect_uri
            .query_pairs_mut()
            .append_pair("request_uri", &request_uri)
            .append_pair("client_id", &self.self_issuer);

        tracing::info!("Pushed authorization request to {}", issuer);

        Ok(TrustedSectoralIdpStep {
            self_issuer: self.self_issuer,
            openid: self.openid,
            key_lookup: self.key_lookup,
            callback_uri: self.session.callback_uri,
            entity_statement,
            redirect_uri,
        })
    }
}

impl std::fmt::Debug for SelectSectoralIdpStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectSectoralIdpStep")
            .field("self_issuer", &self.self_issuer)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Step 2: the provider is trusted, exchange the code
// ============================================================================

/// Second step: the user agent is sent to the provider and comes back with a code.
pub struct TrustedSectoralIdpStep {
    self_issuer: String,
    openid: Arc<OpenIdClient>,
    key_lookup: Arc<dyn DecryptionKeyLookup>,
    callback_uri: String,
    entity_statement: EntityStatementJws,
    redirect_uri: Url,
}

impl TrustedSectoralIdpStep {
    /// Returns the authorization URL to redirect the user agent to.
    #[must_use]
    pub fn idp_redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    /// Returns the provider's verified entity configuration.
    #[must_use]
    pub fn entity_statement(&self) -> &EntityStatementJws {
        &self.entity_statement
    }

    /// Exchanges the authorization code and returns the verified ID token.
    ///
    /// The ID token is decrypted with the key registered for its `kid` and
    /// must be signed by a key of the provider's verified entity configuration.
    ///
    /// # Errors
    ///
    /// - `AuthFlowError::MissingOpenIdProvider` / `MissingTokenEndpoint` for missing metadata
    /// - `AuthFlowError::TokenExchange` if the provider does not answer `200`
    /// - `AuthFlowError::DecryptionKeyNotFound` if no key matches the token's `kid`
    /// - `AuthFlowError::BadIdTokenSignature` if the signature does not verify
    /// - `AuthFlowError::BadIdToken` for any other decryption or decoding failure
    pub async fn exchange_sectoral_idp_code(
        self,
        code: &str,
        code_verifier: &str,
    ) -> Result<IdTokenResult, AuthFlowError> {
        let issuer = self.entity_statement.body().sub.as_str();
        let provider = openid_provider(&self.entity_statement, issuer)?;

        let token_endpoint = provider.token_endpoint.as_deref().ok_or_else(|| {
            AuthFlowError::MissingTokenEndpoint {
                issuer: issuer.to_string(),
            }
        })?;

        let request = TokenRequest {
            client_id: self.self_issuer.clone(),
            redirect_uri: self.callback_uri.clone(),
            code: code.to_string(),
            code_verifier: code_verifier.to_string(),
        };
        let response = self
            .openid
            .exchange_code(parse_endpoint(token_endpoint)?, &request)
            .await
            .map_err(AuthFlowError::TokenExchange)?;

        let id_token = response
            .id_token
            .ok_or_else(|| AuthFlowError::bad_id_token("token response carries no id_token"))?;

        let result = open_id_token(
            &id_token,
            self.key_lookup.as_ref(),
            &self.entity_statement,
        )?;

        tracing::info!("Received ID token from {} for {}", issuer, result.claims.sub);
        Ok(result)
    }
}

impl std::fmt::Debug for TrustedSectoralIdpStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustedSectoralIdpStep")
            .field("self_issuer", &self.self_issuer)
            .field("redirect_uri", &self.redirect_uri.as_str())
            .field("callback_uri", &self.callback_uri)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ID token handling
// ============================================================================

/// Decrypts `id_token` and verifies it against the keys of `entity_statement`.
///
/// # Errors
///
/// See [`TrustedSectoralIdpStep::exchange_sectoral_idp_code`].
pub fn open_id_token(
    id_token: &str,
    key_lookup: &dyn DecryptionKeyLookup,
    entity_statement: &EntityStatementJws,
) -> Result<IdTokenResult, AuthFlowError> {
    let envelope = CompactJwe::parse(id_token).map_err(AuthFlowError::bad_id_token)?;

    let payload = jwe::decrypt(&envelope, key_lookup).map_err(|e| match e {
        JweError::KeyNotFound(kid) => AuthFlowError::DecryptionKeyNotFound(kid),
        other => AuthFlowError::bad_id_token(other),
    })?;

    let payload = String::from_utf8(payload).map_err(AuthFlowError::bad_id_token)?;
    let signed = CompactJws::parse(payload.trim()).map_err(AuthFlowError::bad_id_token)?;

    let trusted = jws::verify(&entity_statement.body().jwks, &signed)
        .map_err(AuthFlowError::bad_id_token)?;
    if !trusted {
        tracing::warn!(
            "ID token signature does not verify against keys of {}",
            entity_statement.body().sub
        );
        return Err(AuthFlowError::BadIdTokenSignature);
    }

    let claims: IdTokenClaims = signed.claims().map_err(AuthFlowError::bad_id_token)?;
    Ok(IdTokenResult {
        jws: signed,
        claims,
    })
}

fn openid_provider<'a>(
    entity_statement: &'a EntityStatementJws,
    issuer: &str,
) -> Result<&'a OpenIdProviderMetadata, AuthFlowError> {
    entity_statement
        .body()
        .openid_provider()
        .ok_or_else(|| AuthFlowError::MissingOpenIdProvider {
            issuer: issuer.to_string(),
        })
}

fn parse_endpoint(endpoint: &str) -> Result<Url, AuthFlowError> {
    Url::parse(endpoint).map_err(|e| AuthFlowError::invalid_endpoint(endpoint, e))
}
