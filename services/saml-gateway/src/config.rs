use anyhow::{anyhow, Context, Result};
use std::env;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use url::Url;

pub const DEFAULT_PORT: u16 = 7120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenExpiryMode {
    /// `now_ms + 24 * 3600`: the arithmetic deployed clients were built against.
    Legacy,
    /// `now_ms + 24 * 3600 * 1000`: a real day.
    Day,
}

impl TokenExpiryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenExpiryMode::Legacy => "legacy",
            TokenExpiryMode::Day => "day",
        }
    }

    /// Milliseconds added to the issue time.
    pub fn offset_millis(&self) -> i64 {
        match self {
            TokenExpiryMode::Legacy => 24 * 3600,
            TokenExpiryMode::Day => 24 * 3600 * 1000,
        }
    }
}

/// Settings handed to the SAML authenticator at construction time.
#[derive(Debug, Clone)]
pub struct SamlConfig {
    pub entry_point: Url,
    pub issuer: String,
    pub idp_issuer: String,
    pub callback_url: Url,
    pub idp_cert_pem: String,
    pub want_assertions_signed: bool,
    pub want_authn_response_signed: bool,
    pub audience: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub saml: SamlConfig,
    pub app_url: Url,
    pub secret: String,
    pub token_expiry: TokenExpiryMode,
    pub database_url: String,
    pub listen_addr: SocketAddr,
}

pub fn load_gateway_config() -> Result<GatewayConfig> {
    let entry_point = required_url("SAML_ENTRY_POINT")?;
    let issuer = required("SAML_ISSUER")?;
    let callback_url = required_url("SAML_CALLBACK_URL")?;
    // Compared against the Issuer of every response and assertion.
    let idp_issuer = required("SAML_IDP_ISSUER")?;
    let cert_path = required("SAML_CERT_PATH")?;
    let idp_cert_pem = load_idp_certificate(Path::new(&cert_path))?;

    let want_assertions_signed = bool_from_env("SAML_WANT_ASSERTIONS_SIGNED").unwrap_or(true);
    let want_authn_response_signed =
        bool_from_env("SAML_WANT_AUTHN_RESPONSE_SIGNED").unwrap_or(true);
    let audience = env::var("SAML_AUDIENCE")
        .ok()
        .and_then(|value| normalize_optional(&value));

    let app_url = required_url("APP_URL")?;
    let secret = required("SECRET")?;
    let token_expiry = env::var("TOKEN_EXPIRY_MODE")
        .ok()
        .map(|value| parse_expiry_mode(&value))
        .transpose()
        .context("Failed to parse TOKEN_EXPIRY_MODE")?
        .unwrap_or(TokenExpiryMode::Legacy);

    let database_url = required("DATABASE_URL")?;

    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let ip: IpAddr = host
        .trim()
        .parse()
        .with_context(|| format!("Invalid HOST '{host}'"))?;
    let port = env::var("PORT")
        .ok()
        .map(|value| parse_port(&value))
        .transpose()
        .context("Failed to parse PORT")?
        .unwrap_or(DEFAULT_PORT);

    Ok(GatewayConfig {
        saml: SamlConfig {
            entry_point,
            issuer,
            idp_issuer,
            callback_url,
            idp_cert_pem,
            want_assertions_signed,
            want_authn_response_signed,
            audience,
        },
        app_url,
        secret,
        token_expiry,
        database_url,
        listen_addr: SocketAddr::from((ip, port)),
    })
}

/// Reads the IdP signing certificate once at startup.
pub fn load_idp_certificate(path: &Path) -> Result<String> {
    let pem = fs::read_to_string(path)
        .with_context(|| format!("Failed to read IdP certificate {}", path.display()))?;
    if !pem.contains("-----BEGIN CERTIFICATE-----") {
        return Err(anyhow!(
            "IdP certificate {} does not contain a PEM certificate",
            path.display()
        ));
    }
    Ok(pem)
}

fn required(key: &str) -> Result<String> {
    env::var(key)
        .ok()
        .and_then(|value| normalize_optional(&value))
        .ok_or_else(|| anyhow!("{key} must be set"))
}

fn required_url(key: &str) -> Result<Url> {
    let raw = required(key)?;
    Url::parse(&raw).with_context(|| format!("{key} is not a valid URL: '{raw}'"))
}

fn bool_from_env(key: &str) -> Option<bool> {
    env::var(key).ok().map(|value| {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_port(value: &str) -> Result<u16> {
    let trimmed = value.trim();
    trimmed
        .parse::<u16>()
        .map_err(|err| anyhow!("Invalid port '{trimmed}': {err}"))
}

fn parse_expiry_mode(value: &str) -> Result<TokenExpiryMode> {
    match value.trim().to_ascii_lowercase().as_str() {
        "legacy" => Ok(TokenExpiryMode::Legacy),
        "day" => Ok(TokenExpiryMode::Day),
        other => Err(anyhow!(
            "Unsupported token expiry mode '{other}'. Use legacy or day."
        )),
    }
}
