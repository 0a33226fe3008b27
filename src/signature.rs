//! Message Signatures
//!
//! Both integration directions authenticate every request with an
//! HMAC-SHA256 of the exact request body bytes under a shared secret,
//! hex-encoded lowercase:
//! - Provider -> Casino: header `x-provider-signature`, `PROVIDER_SECRET`
//! - Casino -> Provider: header `x-casino-signature`, `CASINO_SECRET`
//!
//! The signature covers the byte sequence on the wire: the caller signs
//! the exact bytes it sends, and the server verifies the exact bytes it
//! received. Neither side re-serializes JSON before hashing.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the Provider -> Casino signature
pub const PROVIDER_SIGNATURE_HEADER: &str = "x-provider-signature";

/// Header carrying the Casino -> Provider signature
pub const CASINO_SIGNATURE_HEADER: &str = "x-casino-signature";

/// Signature verification errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header missing")]
    MissingHeader,

    #[error("signature is not valid lowercase hex")]
    Malformed,

    #[error("signature does not match request body")]
    Mismatch,
}

/// Compute the hex-encoded HMAC-SHA256 of `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a hex-encoded signature against `body` under `secret`.
///
/// The comparison is constant-time. Wrong length, non-hex input, and a
/// valid-but-different digest all fail.
pub fn verify(secret: &str, body: &[u8], provided: &str) -> Result<(), SignatureError> {
    let expected_bytes = hex::decode(provided.trim()).map_err(|_| SignatureError::Malformed)?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(body);
    mac.verify_slice(&expected_bytes)
        .map_err(|_| SignatureError::Mismatch)
}
