// src/utils/serialization.rs
//! Text encodings used on the wire: base58 (domain identifiers, Data
//! Integrity proof values) and base64/base64url (DID documents, JWTs, JWEs,
//! DDCC attachments).

use crate::errors::{VcError, VcResult};

/// Base58 (Bitcoin alphabet) encoding.
pub fn encode_base58(bytes: &[u8]) -> String {
    bs58::encode(bytes).into_string()
}

/// Base58 (Bitcoin alphabet) decoding.
#[cfg(test)]
pub fn decode_base58(value: &str) -> VcResult<Vec<u8>> {
    bs58::decode(value)
        .into_vec()
        .map_err(|e| VcError::Validation(format!("invalid base58 value: {}", e)))
}

/// Unpadded base64url, as used by JWS/JWE compact parts.
pub fn encode_base64url(bytes: &[u8]) -> String {
    base64::encode_config(bytes, base64::URL_SAFE_NO_PAD)
}

/// Decodes base64 in any of the common variants.
///
/// DID documents and DDCC bundles in the wild carry url-safe unpadded,
/// url-safe padded and standard encodings interchangeably.
pub fn decode_base64_any(value: &str) -> VcResult<Vec<u8>> {
    let value = value.trim();
    base64::decode_config(value, base64::URL_SAFE_NO_PAD)
        .or_else(|_| base64::decode_config(value, base64::URL_SAFE))
        .or_else(|_| base64::decode_config(value, base64::STANDARD))
        .or_else(|_| base64::decode_config(value, base64::STANDARD_NO_PAD))
        .map_err(|e| VcError::Validation(format!("invalid base64 value: {}", e)))
}
