// src/utils/crypto.rs
//! Hashing and key helpers shared by the proof, domain and registry code.
//!
//! Keccak-256 is used wherever the result meets the EVM (checksums, EIP-712,
//! addresses); SHA-256 is used for credential digests.

use crate::errors::{VcError, VcResult};
use ethers::utils::{hex, keccak256};
use ethers_core::types::Address;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use sha2::{Digest, Sha256};

/// Computes a Keccak-256 hash of the input data (Ethereum-compatible).
pub fn hash_data(data: &[u8]) -> [u8; 32] {
    keccak256(data)
}

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Lowercase hex with a single `0x` prefix.
pub fn to_prefixed_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Decodes hex with or without `0x` prefix.
pub fn decode_hex(value: &str) -> VcResult<Vec<u8>> {
    hex::decode(value.trim_start_matches("0x"))
        .map_err(|e| VcError::Validation(format!("invalid hex value {}: {}", value, e)))
}

/// Derives the Ethereum address for a secp256k1 public key.
///
/// Accepts compressed (33 bytes) or uncompressed (65 bytes) SEC1 encodings,
/// so two encodings of the same key always yield the same address.
pub fn compute_address(public_key: &[u8]) -> VcResult<Address> {
    let key = k256::PublicKey::from_sec1_bytes(public_key)
        .map_err(|_| VcError::Validation(format!("invalid secp256k1 public key {}", hex::encode(public_key))))?;
    let uncompressed = key.to_encoded_point(false);
    let hash = keccak256(&uncompressed.as_bytes()[1..]);
    Ok(Address::from_slice(&hash[12..]))
}

/// Normalizes a P-256 public key to its 33 byte compressed SEC1 form.
pub fn compress_p256(public_key: &[u8]) -> VcResult<Vec<u8>> {
    let key = p256::PublicKey::from_sec1_bytes(public_key)
        .map_err(|_| VcError::Validation(format!("invalid P-256 public key {}", hex::encode(public_key))))?;
    Ok(key.to_encoded_point(true).as_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::SigningKey;

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_compute_address_ignores_encoding() {
        let key = SigningKey::from_slice(&[7u8; 32]).unwrap();
        let public = key.verifying_key();
        let compressed = public.to_encoded_point(true);
        let uncompressed = public.to_encoded_point(false);
        assert_eq!(
            compute_address(compressed.as_bytes()).unwrap(),
            compute_address(uncompressed.as_bytes()).unwrap()
        );
    }

    #[test]
    fn test_compute_address_matches_ethers_wallet() {
        use ethers::signers::{LocalWallet, Signer};
        let key = SigningKey::from_slice(&[9u8; 32]).unwrap();
        let wallet = LocalWallet::from(key.clone());
        let public = key.verifying_key().to_encoded_point(false);
        assert_eq!(compute_address(public.as_bytes()).unwrap(), wallet.address());
    }

    #[test]
    fn test_decode_hex_strips_prefix() {
        assert_eq!(decode_hex("0x0a0b").unwrap(), vec![0x0a, 0x0b]);
        assert_eq!(decode_hex("0a0b").unwrap(), vec![0x0a, 0x0b]);
        assert!(decode_hex("0xzz").is_err());
    }
}
