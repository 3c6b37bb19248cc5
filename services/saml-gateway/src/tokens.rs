use anyhow::{anyhow, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use jsonwebtoken::{crypto, Algorithm, DecodingKey, EncodingKey};
use serde::{Deserialize, Serialize};

use crate::config::TokenExpiryMode;

const ALG_HS256: &str = "HS256";

/// Claims carried into the downstream application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    pub email: String,
    pub name: String,
}

impl TokenPayload {
    pub fn for_email(email: &str) -> Self {
        Self {
            email: email.to_string(),
            name: email_local_part(email).to_string(),
        }
    }
}

/// Everything before the first `@`; the whole string when there is none.
pub fn email_local_part(email: &str) -> &str {
    match email.find('@') {
        Some(index) => &email[..index],
        None => email,
    }
}

// Expiry lives in the JWS header (epoch millis), which is where consumers look for it.
#[derive(Debug, Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub payload: TokenPayload,
    pub expires_at_ms: i64,
}

pub struct TokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry: TokenExpiryMode,
}

impl TokenSigner {
    pub fn new(secret: &str, expiry: TokenExpiryMode) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiry,
        }
    }

    pub fn issue(&self, payload: TokenPayload) -> Result<IssuedToken> {
        self.issue_at(payload, Utc::now().timestamp_millis())
    }

    pub fn issue_at(&self, payload: TokenPayload, now_ms: i64) -> Result<IssuedToken> {
        let expires_at_ms = now_ms + self.expiry.offset_millis();
        let header = TokenHeader {
            alg: ALG_HS256.to_string(),
            exp: Some(expires_at_ms),
        };

        let header_json = serde_json::to_vec(&header)
            .map_err(|err| anyhow!("Failed to serialize token header: {err}"))?;
        let payload_json = serde_json::to_vec(&payload)
            .map_err(|err| anyhow!("Failed to serialize token payload: {err}"))?;

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header_json),
            URL_SAFE_NO_PAD.encode(payload_json)
        );
        let signature = crypto::sign(signing_input.as_bytes(), &self.encoding_key, Algorithm::HS256)
            .map_err(|err| anyhow!("Failed to sign token: {err}"))?;

        Ok(IssuedToken {
            token: format!("{signing_input}.{signature}"),
            payload,
            expires_at_ms,
        })
    }

    /// Returns the payload of a token signed with our secret that has not expired.
    pub fn decode(&self, token: &str) -> Option<TokenPayload> {
        self.decode_at(token, Utc::now().timestamp_millis())
    }

    pub fn decode_at(&self, token: &str, now_ms: i64) -> Option<TokenPayload> {
        let mut segments = token.split('.');
        let (header_b64, payload_b64, signature) =
            match (segments.next(), segments.next(), segments.next(), segments.next()) {
                (Some(header), Some(payload), Some(signature), None) => {
                    (header, payload, signature)
                }
                _ => return None,
            };

        let header: TokenHeader = decode_segment(header_b64)?;
        if header.alg != ALG_HS256 {
            return None;
        }

        let signing_input = format!("{header_b64}.{payload_b64}");
        let verified = crypto::verify(
            signature,
            signing_input.as_bytes(),
            &self.decoding_key,
            Algorithm::HS256,
        )
        .ok()?;
        if !verified {
            return None;
        }

        if let Some(exp) = header.exp {
            if exp <= now_ms {
                return None;
            }
        }

        decode_segment(payload_b64)
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Option<T> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).ok()?;
    serde_json::from_slice(&bytes).ok()
}
