//! Config-driven wiring over a real HTTP transport.

mod common;

use std::sync::Arc;

use common::{Federation, Signer};
use healthid_federation::config::HttpConfig;
use healthid_federation::{AuthenticationFlow, RelyingPartyConfig, Session, StaticKeyLookup};
use time::OffsetDateTime;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn local_config(server: &MockServer) -> RelyingPartyConfig {
    RelyingPartyConfig {
        issuer: "http://localhost:8080".to_string(),
        federation_master: server.uri(),
        redirect_uris: vec!["http://localhost:8080/auth/callback".to_string()],
        http: HttpConfig {
            allow_http: true,
            ..Default::default()
        },
        ..Default::default()
    }
}

#[tokio::test]
async fn test_idp_options_via_config() {
    let server = MockServer::start().await;

    // from_config uses the system clock
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let mut federation = Federation::new();
    federation.master.iat = now - 60;
    federation.master.exp = now + 3600;
    federation.idp_list.iat = now - 60;
    federation.idp_list.exp = now + 3600;
    federation.master.iss = server.uri();
    federation.master.sub = server.uri();
    if let Some(entity) = federation
        .master
        .metadata
        .as_mut()
        .and_then(|m| m.federation_entity.as_mut())
    {
        entity.idp_list_endpoint = Some(format!("{}/federation/list", server.uri()));
    }

    Mock::given(method("GET"))
        .and(path("/.well-known/openid-federation"))
        .and(header("Accept", "application/entity-statement+jwt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(federation.sign(federation.master.clone(), Signer::Master)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/federation/list"))
        .and(header("Accept", "application/jwt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(federation.sign(federation.idp_list.clone(), Signer::Master)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = local_config(&server);
    let flow = AuthenticationFlow::from_config(&config, Arc::new(StaticKeyLookup::new())).unwrap();
    let (session, _) = Session::generate(config.redirect_uris[0].clone(), config.scopes.clone());
    let step = flow.start(session);

    // The second call is served from the cache
    for _ in 0..2 {
        let options = step.fetch_idp_options().await.unwrap();
        assert_eq!(options[0].iss, "https://idp-tk.example.com");
    }
}

#[tokio::test]
async fn test_from_config_rejects_invalid_config() {
    let config = RelyingPartyConfig {
        scopes: vec!["profile".to_string()],
        ..Default::default()
    };
    let result = AuthenticationFlow::from_config(&config, Arc::new(StaticKeyLookup::new()));
    assert!(result.is_err());
}
