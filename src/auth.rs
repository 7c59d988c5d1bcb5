use axum::http::{HeaderMap, header};
use base64::{Engine as _, engine::general_purpose};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_SECRET: &str = "change-me-in-production";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing credentials")]
    MissingCredentials,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid secret key")]
    InvalidSecret,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_secret")]
    pub secret: String,
}

fn default_enabled() -> bool {
    true
}

fn default_secret() -> String {
    DEFAULT_SECRET.to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            secret: default_secret(),
        }
    }
}

/// Decides whether a mutating request may proceed.
pub trait Authorizer: Send + Sync {
    fn authorize(&self, headers: &HeaderMap) -> Result<(), AuthError>;
}

pub type DynAuthorizer = Arc<dyn Authorizer>;

/// Lets every request through; used when auth is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(&self, _headers: &HeaderMap) -> Result<(), AuthError> {
        Ok(())
    }
}

/// Accepts `Authorization: Bearer <value>:<signature>` tokens signed with the
/// shared secret.
#[derive(Clone)]
pub struct SignedTokenAuthorizer {
    secret: String,
}

impl SignedTokenAuthorizer {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl Authorizer for SignedTokenAuthorizer {
    fn authorize(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        let value = headers
            .get(header::AUTHORIZATION)
            .ok_or(AuthError::MissingCredentials)?;
        let token = value
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or(AuthError::InvalidCredentials)?;

        if verify_signed_token(&self.secret, token) {
            Ok(())
        } else {
            debug!("Rejected bearer token");
            Err(AuthError::InvalidCredentials)
        }
    }
}

pub fn create_authorizer(config: &AuthConfig) -> DynAuthorizer {
    if config.enabled {
        Arc::new(SignedTokenAuthorizer::new(config.secret.clone()))
    } else {
        warn!("Authorization is disabled, mutating routes are open");
        Arc::new(AllowAll)
    }
}

pub fn create_signed_token(secret: &str, value: &str) -> Result<String, AuthError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::InvalidSecret)?;
    mac.update(value.as_bytes());
    let signature = mac.finalize().into_bytes();
    let signature_b64 = general_purpose::URL_SAFE_NO_PAD.encode(signature);
    Ok(format!("{}:{}", value, signature_b64))
}

pub fn verify_signed_token(secret: &str, token: &str) -> bool {
    if let Some((value, signature_b64)) = token.rsplit_once(':')
        && let Ok(signature) = general_purpose::URL_SAFE_NO_PAD.decode(signature_b64)
        && let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes())
    {
        mac.update(value.as_bytes());
        return mac.verify_slice(&signature).is_ok();
    }
    false
}
