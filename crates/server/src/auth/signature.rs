// Webhook signature verification.
//
// GitHub-style `X-Hub-Signature` headers: `sha1=<hex HMAC-SHA1 of the raw
// body>` keyed by the shared secret. Verification happens against the exact
// bytes read off the wire, before the payload is parsed or acted on. No
// configured secret means checks are intentionally off.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use thiserror::Error;

type HmacSha1 = Hmac<Sha1>;

pub const SIGNATURE_HEADER: &str = "x-hub-signature";

/// Successful verification outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// No secret configured; the check was skipped on purpose.
    Skipped,
    /// The digest matched the body.
    Verified,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header is missing")]
    Missing,

    #[error("signature algorithm {0:?} is not supported")]
    UnsupportedAlgorithm(String),

    #[error("signature does not match the request body")]
    Mismatch,
}

/// Split a `<algorithm>=<hex digest>` header on the first `=`.
///
/// A header with no `=` carries an algorithm label and no digest, so it is
/// rejected as an unsupported algorithm rather than a mismatch.
pub fn parse_signature_header(header: &str) -> Result<(&str, &str), SignatureError> {
    header
        .split_once('=')
        .ok_or_else(|| SignatureError::UnsupportedAlgorithm(header.to_string()))
}

/// Hex HMAC-SHA1 digest of `body` keyed by `secret`.
pub fn compute_signature(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha1::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Check the signature header against the raw request body.
///
/// The digest comparison runs in constant time via [`Mac::verify_slice`];
/// a digest that is not valid hex cannot match anything and is reported as
/// a mismatch.
pub fn verify_signature(
    secret: Option<&str>,
    header: Option<&str>,
    body: &[u8],
) -> Result<Verification, SignatureError> {
    let Some(secret) = secret else {
        return Ok(Verification::Skipped);
    };

    let header = header.ok_or(SignatureError::Missing)?;
    let (algorithm, digest_hex) = parse_signature_header(header)?;
    if algorithm != "sha1" {
        return Err(SignatureError::UnsupportedAlgorithm(algorithm.to_string()));
    }

    let digest = hex::decode(digest_hex).map_err(|_| SignatureError::Mismatch)?;

    let mut mac =
        HmacSha1::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    mac.verify_slice(&digest).map_err(|_| SignatureError::Mismatch)?;

    Ok(Verification::Verified)
}
