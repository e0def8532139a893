//! Request signature checks for Slack and GitHub.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Slack requests older than this are treated as replays.
pub const MAX_SLACK_SKEW_SECS: i64 = 60 * 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing {0} header")]
    MissingHeader(&'static str),

    #[error("malformed signature")]
    Malformed,

    #[error("request timestamp outside the allowed window")]
    Stale,

    #[error("signature mismatch")]
    Mismatch,

    #[error("invalid signing key")]
    InvalidKey,
}

fn mac(secret: &str) -> Result<HmacSha256, SignatureError> {
    <HmacSha256 as Mac>::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidKey)
}

fn verify_hex(mac: HmacSha256, signature_hex: &str) -> Result<(), SignatureError> {
    let expected = hex::decode(signature_hex).map_err(|_| SignatureError::Malformed)?;
    mac.verify_slice(&expected).map_err(|_| SignatureError::Mismatch)
}

/// Check `X-Hub-Signature-256: sha256=<hex>` against the raw body.
pub fn verify_github(secret: &str, header: Option<&str>, body: &[u8]) -> Result<(), SignatureError> {
    let header = header.ok_or(SignatureError::MissingHeader("X-Hub-Signature-256"))?;
    let signature_hex = header.strip_prefix("sha256=").ok_or(SignatureError::Malformed)?;
    let mut mac = mac(secret)?;
    mac.update(body);
    verify_hex(mac, signature_hex)
}

/// Check `X-Slack-Signature: v0=<hex>`, an HMAC over `v0:{timestamp}:{body}`.
pub fn verify_slack(
    secret: &str,
    timestamp: Option<&str>,
    signature: Option<&str>,
    body: &[u8],
    now: i64,
) -> Result<(), SignatureError> {
    let timestamp = timestamp.ok_or(SignatureError::MissingHeader("X-Slack-Request-Timestamp"))?;
    let signature = signature.ok_or(SignatureError::MissingHeader("X-Slack-Signature"))?;

    let sent: i64 = timestamp.trim().parse().map_err(|_| SignatureError::Malformed)?;
    if now.abs_diff(sent) > MAX_SLACK_SKEW_SECS.unsigned_abs() {
        return Err(SignatureError::Stale);
    }

    let signature_hex = signature.strip_prefix("v0=").ok_or(SignatureError::Malformed)?;
    let mut mac = mac(secret)?;
    mac.update(b"v0:");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    verify_hex(mac, signature_hex)
}

/// Signature value for `body`, as the sender would compute it.
#[cfg(test)]
pub(crate) fn sign(secret: &str, parts: &[&[u8]]) -> String {
    let mut mac = mac(secret).unwrap();
    for part in parts {
        mac.update(part);
    }
    hex::encode(mac.finalize().into_bytes())
}
