//! Shared fixtures: an in-memory transport and a consistent federation.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use healthid_federation::federation::{
    EntityMetadata, EntityStatement, FederationEntityMetadata, IdpEntity, IdpList,
    OpenIdProviderMetadata, SignedDocument,
};
use healthid_federation::http::HttpMethod;
use healthid_federation::{
    EncryptionKeyPair, FixedClock, HttpClient, HttpError, HttpRequest, HttpResponse, JwkSet,
    SigningKeyPair,
};
use url::Url;

pub const NOW: i64 = 1_700_000_000;
pub const FEDMASTER: &str = "https://fedmaster.example.com";
pub const IDP: &str = "https://idp-tk.example.com";
pub const RP: &str = "https://fachdienst.example.com";
pub const CALLBACK: &str = "https://fachdienst.example.com/auth/callback";

pub const FETCH_ENDPOINT: &str = "https://fedmaster.example.com/federation/fetch";
pub const IDP_LIST_ENDPOINT: &str = "https://fedmaster.example.com/federation/list";
pub const PAR_ENDPOINT: &str = "https://idp-tk.example.com/par";
pub const TOKEN_ENDPOINT: &str = "https://idp-tk.example.com/token";
pub const AUTHORIZATION_ENDPOINT: &str = "https://tk.example.com/auth";

pub fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::at_unix(NOW))
}

// ============================================================================
// In-memory transport
// ============================================================================

/// Routes requests by method and full URL; unknown routes answer 404.
#[derive(Default)]
pub struct FakeHttp {
    routes: Mutex<HashMap<(HttpMethod, String), HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeHttp {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn route(&self, method: HttpMethod, url: &str, response: HttpResponse) {
        self.routes
            .lock()
            .unwrap()
            .insert((method, url.to_string()), response);
    }

    pub fn get(&self, url: &str, body: &str) {
        self.route(HttpMethod::Get, url, HttpResponse::new(200, body));
    }

    pub fn post(&self, url: &str, status: u16, body: &str) {
        self.route(HttpMethod::Post, url, HttpResponse::new(status, body));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, method: HttpMethod, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.url.as_str() == url)
            .count()
    }

    pub fn last_form(&self, url: &str) -> HashMap<String, String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.method == HttpMethod::Post && r.url.as_str() == url)
            .map(|r| r.form_params().into_iter().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl HttpClient for FakeHttp {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let key = (request.method, request.url.as_str().to_string());
        let response = self
            .routes
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| HttpResponse::new(404, "not found"));
        self.requests.lock().unwrap().push(request);
        Ok(response)
    }
}

// ============================================================================
// Federation fixture
// ============================================================================

/// Which key signs a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signer {
    Master,
    Idp,
    Unrelated,
}

/// A federation master with one identity provider.
///
/// Every document is mutable before [`Federation::install`] publishes it.
pub struct Federation {
    pub master_key: SigningKeyPair,
    pub idp_key: SigningKeyPair,
    pub unrelated_key: SigningKeyPair,
    pub idp_encryption_key: EncryptionKeyPair,

    pub master: EntityStatement,
    pub master_signer: Signer,
    pub federation_statement: EntityStatement,
    pub federation_statement_signer: Signer,
    pub idp: EntityStatement,
    pub idp_signer: Signer,
    pub idp_list: IdpList,
}

impl Federation {
    pub fn new() -> Self {
        let master_key = SigningKeyPair::generate().unwrap();
        let idp_key = SigningKeyPair::generate().unwrap();
        let unrelated_key = SigningKeyPair::generate().unwrap();
        let idp_encryption_key = EncryptionKeyPair::generate();

        let master = EntityStatement {
            iss: FEDMASTER.to_string(),
            sub: FEDMASTER.to_string(),
            iat: NOW - 60,
            exp: NOW + 3600,
            nbf: None,
            jwks: master_key.to_jwk_set(),
            authority_hints: vec![],
            metadata: Some(EntityMetadata {
                federation_entity: Some(FederationEntityMetadata {
                    federation_fetch_endpoint: Some(FETCH_ENDPOINT.to_string()),
                    idp_list_endpoint: Some(IDP_LIST_ENDPOINT.to_string()),
                    name: Some("Federation Master".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
        };

        let federation_statement = EntityStatement {
            iss: FEDMASTER.to_string(),
            sub: IDP.to_string(),
            iat: NOW - 60,
            exp: NOW + 3600,
            nbf: None,
            jwks: idp_key.to_jwk_set(),
            authority_hints: vec![],
            metadata: None,
        };

        let idp = EntityStatement {
            iss: IDP.to_string(),
            sub: IDP.to_string(),
            iat: NOW - 60,
            exp: NOW + 3600,
            nbf: None,
            jwks: idp_key.to_jwk_set(),
            authority_hints: vec![FEDMASTER.to_string()],
            metadata: Some(EntityMetadata {
                openid_provider: Some(OpenIdProviderMetadata {
                    issuer: Some(IDP.to_string()),
                    authorization_endpoint: Some(AUTHORIZATION_ENDPOINT.to_string()),
                    token_endpoint: Some(TOKEN_ENDPOINT.to_string()),
                    pushed_authorization_request_endpoint: Some(PAR_ENDPOINT.to_string()),
                    jwks: Some(JwkSet::new(vec![idp_encryption_key.to_jwk()])),
                    organization_name: Some("Techniker Krankenkasse".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
        };

        let idp_list = IdpList {
            iss: FEDMASTER.to_string(),
            iat: NOW - 60,
            exp: NOW + 3600,
            nbf: None,
            idp_entity: Some(vec![IdpEntity {
                iss: IDP.to_string(),
                organization_name: "Techniker Krankenkasse".to_string(),
                logo_uri: Some("https://idp-tk.example.com/logo.png".to_string()),
                user_type_supported: Some("IP".to_string()),
                pkv: false,
            }]),
        };

        Self {
            master_key,
            idp_key,
            unrelated_key,
            idp_encryption_key,
            master,
            master_signer: Signer::Master,
            federation_statement,
            federation_statement_signer: Signer::Master,
            idp,
            idp_signer: Signer::Idp,
            idp_list,
        }
    }

    pub fn key(&self, signer: Signer) -> &SigningKeyPair {
        match signer {
            Signer::Master => &self.master_key,
            Signer::Idp => &self.idp_key,
            Signer::Unrelated => &self.unrelated_key,
        }
    }

    pub fn idp_metadata(&mut self) -> &mut OpenIdProviderMetadata {
        self.idp
            .metadata
            .as_mut()
            .and_then(|m| m.openid_provider.as_mut())
            .unwrap()
    }

    pub fn sign<T: healthid_federation::federation::DocumentClaims>(
        &self,
        body: T,
        signer: Signer,
    ) -> String {
        SignedDocument::sign(body, self.key(signer))
            .unwrap()
            .as_str()
            .to_string()
    }

    /// Publishes all documents on `http`.
    pub fn install(&self, http: &FakeHttp) {
        http.get(
            &well_known(FEDMASTER),
            &self.sign(self.master.clone(), self.master_signer),
        );
        http.get(
            &federation_statement_url(FEDMASTER, IDP),
            &self.sign(
                self.federation_statement.clone(),
                self.federation_statement_signer,
            ),
        );
        http.get(
            IDP_LIST_ENDPOINT,
            &self.sign(self.idp_list.clone(), Signer::Master),
        );
        http.get(&well_known(IDP), &self.sign(self.idp.clone(), self.idp_signer));
    }
}

pub fn well_known(subject: &str) -> String {
    format!("{subject}/.well-known/openid-federation")
}

pub fn federation_statement_url(iss: &str, sub: &str) -> String {
    let mut url = Url::parse(FETCH_ENDPOINT).unwrap();
    url.query_pairs_mut()
        .append_pair("iss", iss)
        .append_pair("sub", sub);
    url.to_string()
}
