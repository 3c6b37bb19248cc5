#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request};
use axum::Router;
use saml_gateway::config::{GatewayConfig, SamlConfig, TokenExpiryMode};
use saml_gateway::groups::{GroupOwner, GroupStore, GroupStoreError, RootGroup};
use saml_gateway::metrics::GatewayMetrics;
use saml_gateway::profile::SamlProfile;
use saml_gateway::saml::{AssertionValidator, SamlAuthenticator, SamlError};
use saml_gateway::tokens::TokenSigner;
use saml_gateway::{build_router, AppState};
use serde_json::Value;
use url::Url;

pub const ENTRY_POINT: &str = "https://idp.example.com/sso/saml";
pub const APP_URL: &str = "https://app.example.com/";
pub const SECRET: &str = "integration-test-secret";

const IDP_CERT_PEM: &str = include_str!("../fixtures/idp_signing_cert.pem");

pub enum GroupFixture {
    Owner(GroupOwner),
    Missing,
    Broken(&'static str),
}

pub struct StaticGroupStore(pub GroupFixture);

#[async_trait]
impl GroupStore for StaticGroupStore {
    async fn root_group(&self) -> Result<RootGroup, GroupStoreError> {
        match &self.0 {
            GroupFixture::Owner(owner) => Ok(RootGroup {
                id: "root".to_string(),
                name: "Common".to_string(),
                owner: owner.clone(),
            }),
            GroupFixture::Missing => Err(GroupStoreError::RootGroupMissing),
            GroupFixture::Broken(message) => Err(GroupStoreError::Database(
                sqlx::Error::Protocol(message.to_string()),
            )),
        }
    }
}

/// Accepts a fixed set of `SAMLResponse` values, each mapped to a profile.
#[derive(Default)]
pub struct StubValidator {
    profiles: HashMap<String, SamlProfile>,
}

impl StubValidator {
    pub fn with(mut self, saml_response: &str, profile: Value) -> Self {
        let map = match profile {
            Value::Object(map) => map,
            other => panic!("profile fixture must be an object, got {other}"),
        };
        self.profiles
            .insert(saml_response.to_string(), SamlProfile::from_map(map));
        self
    }
}

impl AssertionValidator for StubValidator {
    fn validate(&self, saml_response: &str) -> Result<SamlProfile, SamlError> {
        self.profiles
            .get(saml_response)
            .cloned()
            .ok_or_else(|| SamlError::Validation("signature mismatch".to_string()))
    }
}

pub fn saml_config() -> SamlConfig {
    SamlConfig {
        entry_point: Url::parse(ENTRY_POINT).expect("entry point"),
        issuer: "https://gateway.example.com/auth/saml/metadata".to_string(),
        idp_issuer: "https://idp.example.com".to_string(),
        callback_url: Url::parse("https://gateway.example.com/auth/saml/callback")
            .expect("callback url"),
        idp_cert_pem: IDP_CERT_PEM.to_string(),
        want_assertions_signed: true,
        want_authn_response_signed: false,
        audience: None,
    }
}

pub fn gateway_config(app_url: &str) -> GatewayConfig {
    GatewayConfig {
        saml: saml_config(),
        app_url: Url::parse(app_url).expect("app url"),
        secret: SECRET.to_string(),
        token_expiry: TokenExpiryMode::Day,
        database_url: "postgres://unused@localhost/unused".to_string(),
        listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

pub fn test_app(groups: GroupFixture, validator: StubValidator) -> Result<TestApp> {
    test_app_with(groups, validator, APP_URL, None)
}

pub fn test_app_with(
    groups: GroupFixture,
    validator: StubValidator,
    app_url: &str,
    verify: Option<saml_gateway::saml::VerifyFn>,
) -> Result<TestApp> {
    let config = gateway_config(app_url);
    let mut saml = SamlAuthenticator::new(&config.saml, Arc::new(validator))?;
    if let Some(verify) = verify {
        saml = saml.with_verify(verify);
    }
    let state = AppState {
        groups: Arc::new(StaticGroupStore(groups)),
        saml: Arc::new(saml),
        token_signer: Arc::new(TokenSigner::new(SECRET, config.token_expiry)),
        config: Arc::new(config),
        metrics: Arc::new(GatewayMetrics::new()?),
    };
    Ok(TestApp {
        router: build_router(state.clone()),
        state,
    })
}

pub fn saml_post(uri: &str, saml_response: &str) -> Result<Request<Body>> {
    let body = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("SAMLResponse", saml_response)
        .finish();
    Ok(Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))?)
}

pub fn location(response: &axum::response::Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

pub fn jwt_from_location(location: &str) -> Option<String> {
    let url = Url::parse(location).ok()?;
    let token = url
        .query_pairs()
        .find(|(key, _)| key == "jwt")
        .map(|(_, value)| value.into_owned());
    token
}
