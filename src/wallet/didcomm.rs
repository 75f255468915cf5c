// src/wallet/didcomm.rs
//! DIDComm anonymous encryption for the in-process signer.
//!
//! Produces a JWE in general JSON serialization:
//! - key agreement: ECDH-ES with an ephemeral X25519 key
//! - key derivation: HKDF-SHA256 over the shared secret, salted with the
//!   ephemeral public key and bound to the recipient key
//! - content encryption: ChaCha20-Poly1305 with the protected header as AAD
//!
//! The sender key is carried as `skid` in the protected header so the
//! recipient can address its answer; the message itself is not authenticated
//! by the sender.

use crate::errors::{VcError, VcResult};
use crate::utils::serialization::encode_base64url;
use ethers::utils::hex;
use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey, NONCE_LEN};
use ring::agreement::{self, EphemeralPrivateKey, UnparsedPublicKey};
use ring::hkdf;
use ring::rand::{SecureRandom, SystemRandom};
use serde_json::{json, Value};

pub const ENCRYPTED_MESSAGE_TYPE: &str = "application/didcomm-encrypted+json";
const KEY_AGREEMENT_ALG: &str = "ECDH-ES";
const CONTENT_ENC: &str = "C20P";

/// Encrypts `message` for the holder of `recipient_public_key`.
///
/// # Arguments
/// * `message` - Plaintext bytes
/// * `sender_public_key` - Sender X25519 public key, announced as `skid`
/// * `recipient_public_key` - Recipient X25519 public key
///
/// # Errors
/// `VcError::Signing` if a key has the wrong length or a primitive fails.
pub fn anoncrypt(message: &[u8], sender_public_key: &[u8], recipient_public_key: &[u8]) -> VcResult<Value> {
    if recipient_public_key.len() != 32 || sender_public_key.len() != 32 {
        return Err(VcError::Signing("X25519 public keys must be 32 bytes".into()));
    }
    let rng = SystemRandom::new();
    let ephemeral = EphemeralPrivateKey::generate(&agreement::X25519, &rng)
        .map_err(|_| VcError::Signing("ephemeral key generation failed".into()))?;
    let ephemeral_public = ephemeral
        .compute_public_key()
        .map_err(|_| VcError::Signing("ephemeral public key derivation failed".into()))?;

    let protected = json!({
        "typ": ENCRYPTED_MESSAGE_TYPE,
        "alg": KEY_AGREEMENT_ALG,
        "enc": CONTENT_ENC,
        "skid": hex::encode(sender_public_key),
        "epk": {
            "kty": "OKP",
            "crv": "X25519",
            "x": encode_base64url(ephemeral_public.as_ref()),
        },
    });
    let protected_b64 = encode_base64url(&serde_json::to_vec(&protected)?);

    let key = agreement::agree_ephemeral(
        ephemeral,
        &UnparsedPublicKey::new(&agreement::X25519, recipient_public_key),
        VcError::Signing("X25519 key agreement failed".into()),
        |shared_secret| derive_content_key(shared_secret, ephemeral_public.as_ref(), recipient_public_key),
    )?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rng.fill(&mut nonce_bytes)
        .map_err(|_| VcError::Signing("nonce generation failed".into()))?;

    let mut in_out = message.to_vec();
    let tag = key
        .seal_in_place_separate_tag(
            Nonce::assume_unique_for_key(nonce_bytes),
            Aad::from(protected_b64.as_bytes()),
            &mut in_out,
        )
        .map_err(|_| VcError::Signing("encryption failed".into()))?;

    Ok(json!({
        "protected": protected_b64,
        "recipients": [{"header": {"kid": hex::encode(recipient_public_key)}}],
        "iv": encode_base64url(&nonce_bytes),
        "ciphertext": encode_base64url(&in_out),
        "tag": encode_base64url(tag.as_ref()),
    }))
}

/// HKDF-SHA256(salt = epk, ikm = shared secret, info = recipient key) -> ChaCha20-Poly1305 key.
pub(crate) fn derive_content_key(
    shared_secret: &[u8],
    ephemeral_public_key: &[u8],
    recipient_public_key: &[u8],
) -> VcResult<LessSafeKey> {
    let prk = hkdf::Salt::new(hkdf::HKDF_SHA256, ephemeral_public_key).extract(shared_secret);
    let info = [recipient_public_key];
    let okm = prk
        .expand(&info, &aead::CHACHA20_POLY1305)
        .map_err(|_| VcError::Signing("key derivation failed".into()))?;
    Ok(LessSafeKey::new(UnboundKey::from(okm)))
}
