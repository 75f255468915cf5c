// src/wallet/key_management.rs
//! Signing facade and the in-process key store.
//!
//! Every private-key operation the issuance pipeline needs goes through the
//! [`KeySigner`] trait:
//! - secp256k1 plain message signing, keys addressed by Ethereum address
//! - P-256 plain message signing, keys addressed by compressed public key
//! - ES256K DID-JWT issuance
//! - DIDComm encryption
//! - LACChain meta-transaction signing
//!
//! Two backends implement it: [`LocalKeySigner`] keeps keys in memory, and
//! [`HttpKeySigner`](crate::wallet::remote_signer::HttpKeySigner) forwards to a
//! remote key manager. One of them is chosen at startup.

use crate::blockchain::gas_model::{sign_gas_model_transaction, PopulatedTransaction};
use crate::errors::{VcError, VcResult};
use crate::utils::crypto::{compress_p256, decode_hex, sha256, to_prefixed_hex};
use crate::utils::serialization::encode_base64url;
use crate::wallet::didcomm;
use async_trait::async_trait;
use chrono::Utc;
use ethers::signers::{LocalWallet, Signer};
use ethers::utils::hex;
use ethers_core::types::{Address, Bytes};
use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::SigningKey;
use p256::ecdsa::signature::Signer as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::RwLock;

/// Message signed to check that a private key is available.
pub const PROBE_MESSAGE: &[u8] = b"Proof";

pub const DID_JWT_ALGORITHM: &str = "ES256K";

/// `sha256("Proof")` as `0x` hex.
pub fn probe_message_hash() -> String {
    to_prefixed_hex(&sha256(PROBE_MESSAGE))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignPlainMessageByAddress {
    pub address: Address,
    /// `0x` prefixed hex digest.
    pub message_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignPlainMessageByCompressedPublicKey {
    /// `0x` prefixed hex of the 33 byte SEC1 key.
    pub compressed_public_key: String,
    pub message_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidJwtRequest {
    pub sub_did: String,
    pub aud: String,
    /// Unix seconds.
    pub exp: i64,
    pub alg: String,
    pub signer_address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidCommEncryptRequest {
    pub message: String,
    /// Hex X25519 key of the sender.
    pub sender_public_key: String,
    /// Hex X25519 key of the recipient.
    pub recipient_public_key: String,
    pub non_repudiable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LacchainTransactionRequest {
    pub fully_populated_transaction_request: PopulatedTransaction,
    pub signer_address: Address,
    pub node_address: Address,
    pub expiration: u64,
}

/// Backend-agnostic signing operations.
#[async_trait]
pub trait KeySigner: Send + Sync {
    /// 65 byte `r ‖ s ‖ v` signature over the given digest.
    async fn sign_secp256k1(&self, request: &SignPlainMessageByAddress) -> VcResult<Vec<u8>>;

    /// 64 byte `r ‖ s` ECDSA-SHA256 signature over the given bytes.
    ///
    /// `message_hash` is hashed again with SHA-256 before signing, so
    /// inputs longer than 32 bytes are covered in full.
    async fn sign_p256(&self, request: &SignPlainMessageByCompressedPublicKey) -> VcResult<Vec<u8>>;

    /// Compact ES256K JWT.
    async fn create_did_jwt(&self, request: &DidJwtRequest) -> VcResult<String>;

    /// DIDComm encrypted message (JWE JSON).
    async fn did_comm_encrypt(&self, request: &DidCommEncryptRequest) -> VcResult<Value>;

    /// Raw signed gas model transaction.
    async fn sign_lacchain_transaction(&self, request: &LacchainTransactionRequest) -> VcResult<Bytes>;

    /// Whether the backend holds the secp256k1 key for `address`.
    ///
    /// Signs a fixed probe message; only a missing key yields `false`.
    async fn can_sign_secp256k1(&self, address: Address) -> VcResult<bool> {
        let request = SignPlainMessageByAddress {
            address,
            message_hash: probe_message_hash(),
        };
        probe_outcome(self.sign_secp256k1(&request).await)
    }

    /// Whether the backend holds the P-256 key with this compressed public key.
    async fn can_sign_p256(&self, compressed_public_key: &[u8]) -> VcResult<bool> {
        let request = SignPlainMessageByCompressedPublicKey {
            compressed_public_key: to_prefixed_hex(compressed_public_key),
            message_hash: probe_message_hash(),
        };
        probe_outcome(self.sign_p256(&request).await)
    }
}

fn probe_outcome(result: VcResult<Vec<u8>>) -> VcResult<bool> {
    match result {
        Ok(_) => Ok(true),
        Err(VcError::KeyNotFound(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

/// In-process key store.
#[derive(Default)]
pub struct LocalKeySigner {
    secp256k1_keys: RwLock<HashMap<Address, SigningKey>>,
    p256_keys: RwLock<HashMap<Vec<u8>, p256::ecdsa::SigningKey>>,
}

impl LocalKeySigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from comma separated hex private keys.
    ///
    /// # Errors
    /// `VcError::Validation` if any entry is not a valid private key.
    pub fn from_hex_keys(secp256k1_keys: &str, p256_keys: &str) -> VcResult<Self> {
        let signer = Self::new();
        for entry in split_keys(secp256k1_keys) {
            let key = SigningKey::from_slice(&decode_hex(entry)?)
                .map_err(|_| VcError::Validation("invalid secp256k1 private key".into()))?;
            signer.insert_secp256k1(key);
        }
        for entry in split_keys(p256_keys) {
            let key = p256::ecdsa::SigningKey::from_slice(&decode_hex(entry)?)
                .map_err(|_| VcError::Validation("invalid P-256 private key".into()))?;
            signer.insert_p256(key);
        }
        Ok(signer)
    }

    /// Stores a secp256k1 key and returns its address.
    pub fn insert_secp256k1(&self, key: SigningKey) -> Address {
        let address = LocalWallet::from(key.clone()).address();
        write_lock(&self.secp256k1_keys).insert(address, key);
        address
    }

    /// Stores a P-256 key and returns its compressed public key.
    pub fn insert_p256(&self, key: p256::ecdsa::SigningKey) -> Vec<u8> {
        let compressed = key.verifying_key().to_encoded_point(true).as_bytes().to_vec();
        write_lock(&self.p256_keys).insert(compressed.clone(), key);
        compressed
    }

    fn secp256k1_key(&self, address: &Address) -> VcResult<SigningKey> {
        self.secp256k1_keys
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(address)
            .cloned()
            .ok_or_else(|| VcError::KeyNotFound(format!("{:?}", address)))
    }

    fn p256_key(&self, compressed_public_key: &[u8]) -> VcResult<p256::ecdsa::SigningKey> {
        self.p256_keys
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(compressed_public_key)
            .cloned()
            .ok_or_else(|| VcError::KeyNotFound(hex::encode(compressed_public_key)))
    }
}

fn split_keys(keys: &str) -> impl Iterator<Item = &str> {
    keys.split(',').map(str::trim).filter(|k| !k.is_empty())
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Recoverable secp256k1 signature `r ‖ s ‖ v` with `v` in {27, 28}.
fn sign_recoverable(key: &SigningKey, digest: &[u8]) -> VcResult<Vec<u8>> {
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(digest)
        .map_err(|e| VcError::Signing(e.to_string()))?;
    let mut bytes = signature.to_bytes().to_vec();
    bytes.push(recovery_id.to_byte() + 27);
    Ok(bytes)
}

#[async_trait]
impl KeySigner for LocalKeySigner {
    async fn sign_secp256k1(&self, request: &SignPlainMessageByAddress) -> VcResult<Vec<u8>> {
        let key = self.secp256k1_key(&request.address)?;
        sign_recoverable(&key, &decode_hex(&request.message_hash)?)
    }

    async fn sign_p256(&self, request: &SignPlainMessageByCompressedPublicKey) -> VcResult<Vec<u8>> {
        let compressed = compress_p256(&decode_hex(&request.compressed_public_key)?)?;
        let key = self.p256_key(&compressed)?;
        let signature: p256::ecdsa::Signature = key
            .try_sign(&decode_hex(&request.message_hash)?)
            .map_err(|e| VcError::Signing(e.to_string()))?;
        Ok(signature.to_bytes().to_vec())
    }

    async fn create_did_jwt(&self, request: &DidJwtRequest) -> VcResult<String> {
        let key = self.secp256k1_key(&request.signer_address)?;
        let header = json!({"alg": request.alg, "typ": "JWT"});
        let payload = json!({
            "iat": Utc::now().timestamp(),
            "exp": request.exp,
            "sub": request.sub_did,
            "aud": request.aud,
            "iss": request.sub_did,
        });
        let signing_input = format!(
            "{}.{}",
            encode_base64url(&serde_json::to_vec(&header)?),
            encode_base64url(&serde_json::to_vec(&payload)?)
        );
        let signature: k256::ecdsa::Signature = key
            .sign_prehash(&sha256(signing_input.as_bytes()))
            .map_err(|e| VcError::Signing(e.to_string()))?;
        Ok(format!("{}.{}", signing_input, encode_base64url(&signature.to_bytes())))
    }

    async fn did_comm_encrypt(&self, request: &DidCommEncryptRequest) -> VcResult<Value> {
        didcomm::anoncrypt(
            request.message.as_bytes(),
            &decode_hex(&request.sender_public_key)?,
            &decode_hex(&request.recipient_public_key)?,
        )
    }

    async fn sign_lacchain_transaction(&self, request: &LacchainTransactionRequest) -> VcResult<Bytes> {
        let key = self.secp256k1_key(&request.signer_address)?;
        sign_gas_model_transaction(
            &key,
            &request.fully_populated_transaction_request,
            request.node_address,
            request.expiration,
        )
    }
}
