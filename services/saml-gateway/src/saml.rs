//! SAML Service Provider glue.
//!
//! Protocol work (AuthnRequest encoding, response parsing, XML signature
//! checks, SP metadata) is done by `samael`. This module wires our
//! configuration into it and turns validated assertions into profiles.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use samael::metadata::EntityDescriptor;
use samael::schema::{Assertion, Response};
use samael::service_provider::{ServiceProvider, ServiceProviderBuilder};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::SamlConfig;
use crate::profile::SamlProfile;

/// Path the middleware sends the browser back to when authentication fails.
pub const FAILURE_REDIRECT: &str = "/auth/saml/";

#[derive(Debug, Error)]
pub enum SamlError {
    #[error("failed to build SAML service provider: {0}")]
    Setup(String),
    #[error("failed to build AuthnRequest: {0}")]
    AuthnRequest(String),
    #[error("failed to render SP metadata: {0}")]
    Metadata(String),
    #[error("SAMLResponse is not valid base64: {0}")]
    Encoding(String),
    #[error("SAML response could not be parsed: {0}")]
    Parse(String),
    #[error("SAML response rejected: {0}")]
    Validation(String),
    #[error("SAML response is not signed")]
    ResponseUnsigned,
    #[error("SAML assertion is not signed")]
    AssertionUnsigned,
    #[error("SAML assertion audience does not include '{0}'")]
    AudienceMismatch(String),
    #[error("profile rejected: {0}")]
    ProfileRejected(String),
}

/// Validates a base64 `SAMLResponse` form value and yields the asserted profile.
pub trait AssertionValidator: Send + Sync {
    fn validate(&self, saml_response: &str) -> Result<SamlProfile, SamlError>;
}

/// Hook run on every validated profile before it reaches a handler.
pub type VerifyFn = Arc<dyn Fn(SamlProfile) -> Result<SamlProfile, SamlError> + Send + Sync>;

pub fn pass_through() -> VerifyFn {
    Arc::new(accept_profile)
}

fn accept_profile(profile: SamlProfile) -> Result<SamlProfile, SamlError> {
    Ok(profile)
}

/// The authentication middleware's engine, built once from configuration.
pub struct SamlAuthenticator {
    sp: Arc<ServiceProvider>,
    entry_point: String,
    want_assertions_signed: bool,
    validator: Arc<dyn AssertionValidator>,
    verify: VerifyFn,
}

impl SamlAuthenticator {
    /// Authenticator backed by samael's response validation.
    pub fn from_config(config: &SamlConfig) -> Result<Self, SamlError> {
        let sp = Arc::new(build_service_provider(config)?);
        let validator = SamaelValidator::new(sp.clone(), config);
        Self::with_service_provider(sp, config, Arc::new(validator))
    }

    pub fn new(
        config: &SamlConfig,
        validator: Arc<dyn AssertionValidator>,
    ) -> Result<Self, SamlError> {
        let sp = Arc::new(build_service_provider(config)?);
        Self::with_service_provider(sp, config, validator)
    }

    fn with_service_provider(
        sp: Arc<ServiceProvider>,
        config: &SamlConfig,
        validator: Arc<dyn AssertionValidator>,
    ) -> Result<Self, SamlError> {
        let authenticator = Self {
            sp,
            entry_point: config.entry_point.to_string(),
            want_assertions_signed: config.want_assertions_signed,
            validator,
            verify: pass_through(),
        };
        // Fail at startup rather than on the first metadata request.
        authenticator.metadata_xml()?;
        Ok(authenticator)
    }

    pub fn with_verify(mut self, verify: VerifyFn) -> Self {
        self.verify = verify;
        self
    }

    /// Redirect URL (HTTP-Redirect binding) carrying a fresh AuthnRequest.
    pub fn authorize_url(&self, relay_state: Option<&str>) -> Result<String, SamlError> {
        let request = self
            .sp
            .make_authentication_request(&self.entry_point)
            .map_err(|err| SamlError::AuthnRequest(err.to_string()))?;
        let url = request
            .redirect(relay_state.unwrap_or_default())
            .map_err(|err| SamlError::AuthnRequest(err.to_string()))?
            .ok_or_else(|| SamlError::AuthnRequest("AuthnRequest has no destination".into()))?;
        debug!(request_id = %request.id, "Created SAML AuthnRequest redirect");
        Ok(url.to_string())
    }

    pub fn metadata_xml(&self) -> Result<String, SamlError> {
        let mut descriptor = self
            .sp
            .metadata()
            .map_err(|err| SamlError::Metadata(err.to_string()))?;
        if let Some(sp_descriptors) = descriptor.sp_sso_descriptors.as_mut() {
            for sp_descriptor in sp_descriptors {
                sp_descriptor.want_assertions_signed = Some(self.want_assertions_signed);
                // Single logout is not served here.
                sp_descriptor.single_logout_services = None;
            }
        }
        descriptor
            .to_xml()
            .map_err(|err| SamlError::Metadata(err.to_string()))
    }

    pub fn authenticate(&self, saml_response: &str) -> Result<SamlProfile, SamlError> {
        let profile = self.validator.validate(saml_response)?;
        (self.verify)(profile)
    }
}

/// Production validator. samael verifies the XML signatures against the IdP
/// certificate and checks destination, issuer, timing and the SP audience;
/// the signature placement flags and the optional extra audience are ours.
pub struct SamaelValidator {
    sp: Arc<ServiceProvider>,
    want_assertions_signed: bool,
    want_authn_response_signed: bool,
    audience: Option<String>,
}

impl SamaelValidator {
    pub fn new(sp: Arc<ServiceProvider>, config: &SamlConfig) -> Self {
        Self {
            sp,
            want_assertions_signed: config.want_assertions_signed,
            want_authn_response_signed: config.want_authn_response_signed,
            audience: config.audience.clone(),
        }
    }
}

impl AssertionValidator for SamaelValidator {
    fn validate(&self, saml_response: &str) -> Result<SamlProfile, SamlError> {
        // IdPs commonly wrap the base64 payload across lines.
        let encoded: String = saml_response
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let xml_bytes = BASE64
            .decode(&encoded)
            .map_err(|err| SamlError::Encoding(err.to_string()))?;
        let xml = String::from_utf8(xml_bytes)
            .map_err(|err| SamlError::Encoding(err.to_string()))?;

        let response = xml
            .parse::<Response>()
            .map_err(|err| SamlError::Parse(err.to_string()))?;
        check_signatures(
            response.signature.is_some(),
            response.assertion.as_ref().map(|a| a.signature.is_some()),
            self.want_authn_response_signed,
            self.want_assertions_signed,
        )?;

        let assertion = self
            .sp
            .parse_base64_response(&encoded, None)
            .map_err(|err| SamlError::Validation(err.to_string()))?;

        check_audience(self.audience.as_deref(), &assertion_audiences(&assertion))?;

        let profile = profile_from_assertion(&assertion);
        info!(
            assertion_id = %assertion.id,
            issuer = ?profile.get("issuer"),
            attributes = profile.as_map().len(),
            "SAML assertion validated"
        );
        Ok(profile)
    }
}

pub fn check_signatures(
    response_signed: bool,
    assertion_signed: Option<bool>,
    want_authn_response_signed: bool,
    want_assertions_signed: bool,
) -> Result<(), SamlError> {
    if want_authn_response_signed && !response_signed {
        return Err(SamlError::ResponseUnsigned);
    }
    if want_assertions_signed && assertion_signed == Some(false) {
        return Err(SamlError::AssertionUnsigned);
    }
    Ok(())
}

pub fn check_audience(expected: Option<&str>, audiences: &[String]) -> Result<(), SamlError> {
    match expected {
        Some(expected) if !audiences.iter().any(|aud| aud == expected) => {
            Err(SamlError::AudienceMismatch(expected.to_string()))
        }
        _ => Ok(()),
    }
}

fn assertion_audiences(assertion: &Assertion) -> Vec<String> {
    assertion
        .conditions
        .as_ref()
        .and_then(|conditions| conditions.audience_restrictions.as_ref())
        .map(|restrictions| {
            restrictions
                .iter()
                .flat_map(|restriction| restriction.audience.iter().cloned())
                .collect()
        })
        .unwrap_or_default()
}

fn profile_from_assertion(assertion: &Assertion) -> SamlProfile {
    let name_id = assertion
        .subject
        .as_ref()
        .and_then(|subject| subject.name_id.as_ref());

    let session_index = assertion
        .authn_statements
        .as_ref()
        .and_then(|stmts| stmts.first())
        .and_then(|stmt| stmt.session_index.clone());

    let mut attributes = Vec::new();
    if let Some(statements) = assertion.attribute_statements.as_ref() {
        for statement in statements {
            for attr in &statement.attributes {
                if let Some(name) = attr.name.as_ref() {
                    let values = attr
                        .values
                        .iter()
                        .filter_map(|value| value.value.clone())
                        .collect();
                    attributes.push((name.clone(), values));
                }
            }
        }
    }

    SamlProfile::from_assertion_parts(
        assertion.issuer.value.clone(),
        name_id.map(|id| id.value.clone()),
        name_id.and_then(|id| id.format.clone()),
        session_index,
        attributes,
    )
}

fn build_service_provider(config: &SamlConfig) -> Result<ServiceProvider, SamlError> {
    ServiceProviderBuilder::default()
        .entity_id(config.issuer.clone())
        .acs_url(config.callback_url.to_string())
        .idp_metadata(idp_metadata(config)?)
        .allow_idp_initiated(true)
        .build()
        .map_err(|err| SamlError::Setup(err.to_string()))
}

/// Minimal IdP descriptor assembled from the configured entry point and certificate.
fn idp_metadata(config: &SamlConfig) -> Result<EntityDescriptor, SamlError> {
    let xml = format!(
        r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="{entity_id}">
    <md:IDPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
        <md:KeyDescriptor use="signing">
            <ds:KeyInfo xmlns:ds="http://www.w3.org/2000/09/xmldsig#">
                <ds:X509Data>
                    <ds:X509Certificate>{certificate}</ds:X509Certificate>
                </ds:X509Data>
            </ds:KeyInfo>
        </md:KeyDescriptor>
        <md:SingleSignOnService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect" Location="{sso_url}"/>
    </md:IDPSSODescriptor>
</md:EntityDescriptor>"#,
        entity_id = xml_escape(&config.idp_issuer),
        certificate = strip_pem_armor(&config.idp_cert_pem),
        sso_url = xml_escape(config.entry_point.as_str()),
    );

    samael::metadata::de::from_str(&xml).map_err(|err| SamlError::Setup(err.to_string()))
}

fn strip_pem_armor(pem: &str) -> String {
    pem.lines()
        .map(str::trim)
        .filter(|line| !line.starts_with("-----BEGIN") && !line.starts_with("-----END"))
        .collect()
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
