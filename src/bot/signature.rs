//! Webhook authentication and decoding.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

use super::event::EventBatch;

type HmacSha256 = Hmac<Sha256>;

/// Header LINE puts the body signature in.
pub const SIGNATURE_HEADER: &str = "x-line-signature";

#[derive(Debug)]
pub enum WebhookError {
    MissingSignature,
    InvalidSignature,
    MalformedBody(serde_json::Error),
}

impl fmt::Display for WebhookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSignature => write!(f, "missing {SIGNATURE_HEADER} header"),
            Self::InvalidSignature => write!(f, "invalid signature"),
            Self::MalformedBody(e) => write!(f, "malformed webhook body: {e}"),
        }
    }
}

impl std::error::Error for WebhookError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::MalformedBody(e) => Some(e),
            _ => None,
        }
    }
}

/// Check `signature` (base64 HMAC-SHA256 of `body`) against the channel secret.
pub fn verify(channel_secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = STANDARD.decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(channel_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Signature the platform would send for `body`.
#[cfg(test)]
pub fn sign(channel_secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = match HmacSha256::new_from_slice(channel_secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return String::new(),
    };
    mac.update(body);
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Authenticate a delivery and decode its events.
pub fn parse(
    channel_secret: &str,
    signature: Option<&str>,
    body: &[u8],
) -> Result<EventBatch, WebhookError> {
    let signature = signature.ok_or(WebhookError::MissingSignature)?;
    if !verify(channel_secret, body, signature) {
        return Err(WebhookError::InvalidSignature);
    }
    serde_json::from_slice(body).map_err(WebhookError::MalformedBody)
}
