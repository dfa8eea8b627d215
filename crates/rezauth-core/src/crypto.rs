//! Crypto primitives: SHA-256 digests, constant-time comparison, random
//! identifiers, and the compact HMAC-SHA256 token format.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::CoreError;

type HmacSha256 = Hmac<Sha256>;

/// SHA-256 hash of a string, hex-encoded.
///
/// Used for every piece of secret material the control plane persists:
/// client secrets and enrollment codes are stored only as this digest.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time equality over two hex digests.
///
/// Length is not secret for fixed-width digests, so unequal lengths
/// return early.
pub fn constant_time_hex_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Random URL-safe token: `n_bytes` of entropy, base64url, no padding.
pub fn random_token(n_bytes: usize) -> String {
    let mut rng = rand::rng();
    let mut bytes = vec![0u8; n_bytes];
    rng.fill(bytes.as_mut_slice());
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Random lowercase hex string of `n_bytes` entropy, for identifiers.
pub fn random_hex(n_bytes: usize) -> String {
    let mut rng = rand::rng();
    let mut bytes = vec![0u8; n_bytes];
    rng.fill(bytes.as_mut_slice());
    hex::encode(bytes)
}

// -----------------------------------------------------------------------
// Compact token (three base64url segments, HMAC-SHA256)
// -----------------------------------------------------------------------

/// Why a compact token failed verification.
///
/// Only two cases exist at this layer; claim-level checks (expiry,
/// issuer, scope) happen above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactTokenError {
    /// Not three segments, a segment is not valid base64url, or the
    /// payload is not a JSON object.
    Malformed,
    /// The signature segment does not match the first two segments.
    InvalidSignature,
}

/// Sign a claims payload into `base64url(header).base64url(payload).base64url(mac)`.
///
/// The header is always `{"alg":"HS256","typ":"JWT"}`.
pub fn sign_compact<T: Serialize>(claims: &T, signing_key: &str) -> Result<String, CoreError> {
    let header = serde_json::json!({ "alg": "HS256", "typ": "JWT" });
    let header_b64 = URL_SAFE_NO_PAD.encode(
        serde_json::to_vec(&header).map_err(|e| CoreError::Crypto(format!("header encode: {e}")))?,
    );
    let payload_b64 = URL_SAFE_NO_PAD.encode(
        serde_json::to_vec(claims).map_err(|e| CoreError::Crypto(format!("claims encode: {e}")))?,
    );

    let signing_input = format!("{header_b64}.{payload_b64}");
    let mut mac = HmacSha256::new_from_slice(signing_key.as_bytes())
        .map_err(|e| CoreError::Crypto(format!("hmac key: {e}")))?;
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{signing_input}.{signature}"))
}

/// Verify a compact token's shape and signature, returning the decoded
/// payload object.
pub fn verify_compact(
    token: &str,
    signing_key: &str,
) -> Result<serde_json::Map<String, serde_json::Value>, CompactTokenError> {
    let mut segments = token.split('.');
    let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(CompactTokenError::Malformed);
    };

    if URL_SAFE_NO_PAD.decode(header_b64).is_err() {
        return Err(CompactTokenError::Malformed);
    }
    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| CompactTokenError::Malformed)?;
    let supplied_signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| CompactTokenError::Malformed)?;

    let signing_input = format!("{header_b64}.{payload_b64}");
    let mut mac = HmacSha256::new_from_slice(signing_key.as_bytes())
        .map_err(|_| CompactTokenError::InvalidSignature)?;
    mac.update(signing_input.as_bytes());
    let expected = mac.finalize().into_bytes();

    let matches: bool = expected.as_slice().ct_eq(supplied_signature.as_slice()).into();
    if !matches {
        return Err(CompactTokenError::InvalidSignature);
    }

    match serde_json::from_slice::<serde_json::Value>(&payload_bytes) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        _ => Err(CompactTokenError::Malformed),
    }
}
