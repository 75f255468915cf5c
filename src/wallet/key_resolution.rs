// src/wallet/key_resolution.rs
//! Per-DID key cache with lazy provisioning.
//!
//! Keys are read from the resolved DID document on first use and cached for
//! the process lifetime. When a DID has no suitable key, a new attribute is
//! registered through the identity manager and the document is resolved
//! again. Rotations on the DID side are only observed after [`KeyResolutionCache::invalidate`].

use crate::errors::{VcError, VcResult};
use crate::models::did::{Curve, DidDocument, DidKeyMaterial, EcJwk, KeyAlgorithm};
use crate::services::did_resolver::DidResolver;
use crate::services::identity::{
    IdentityService, NewAttribute, NewJwkAttribute, ATTRIBUTE_VALID_DAYS, RELATION_ASSERTION,
    RELATION_AUTHENTICATION, RELATION_KEY_AGREEMENT,
};
use crate::utils::crypto::{compress_p256, compute_address, decode_hex, to_prefixed_hex};
use crate::utils::serialization::decode_base64_any;
use crate::utils::single_flight::KeyedLocks;
use crate::wallet::key_management::KeySigner;
use ethers::utils::hex;
use ethers_core::types::Address;
use log::info;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

/// The assertion key selected for signing proofs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionKey {
    /// Verification method id referenced by proofs.
    pub key_id: String,
    pub curve: Curve,
    /// Uncompressed for secp256k1, compressed for P-256.
    pub public_key: Vec<u8>,
}

impl AssertionKey {
    pub fn hex_public_key(&self) -> String {
        to_prefixed_hex(&self.public_key)
    }

    /// Ethereum address of a secp256k1 assertion key.
    pub fn address(&self) -> VcResult<Address> {
        compute_address(&self.public_key)
    }
}

struct Cache<K, V> {
    entries: RwLock<HashMap<K, V>>,
}

impl<K: Eq + Hash, V: Clone> Cache<K, V> {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn get(&self, key: &K) -> Option<V> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    fn insert(&self, key: K, value: V) {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key, value);
    }

    fn retain(&self, keep: impl Fn(&K) -> bool) {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .retain(|k, _| keep(k));
    }
}

pub struct KeyResolutionCache {
    resolver: Arc<dyn DidResolver>,
    identity: Arc<dyn IdentityService>,
    signer: Arc<dyn KeySigner>,
    auth_keys: Cache<String, Vec<u8>>,
    key_exchange_keys: Cache<String, Vec<u8>>,
    assertion_keys: Cache<(String, Curve), AssertionKey>,
    provisioning: KeyedLocks,
}

impl KeyResolutionCache {
    pub fn new(
        resolver: Arc<dyn DidResolver>,
        identity: Arc<dyn IdentityService>,
        signer: Arc<dyn KeySigner>,
    ) -> Self {
        Self {
            resolver,
            identity,
            signer,
            auth_keys: Cache::new(),
            key_exchange_keys: Cache::new(),
            assertion_keys: Cache::new(),
            provisioning: KeyedLocks::new(),
        }
    }

    /// Authentication (secp256k1) public key of `did`, provisioned if absent.
    pub async fn get_auth_key(&self, did: &str) -> VcResult<Vec<u8>> {
        if let Some(key) = self.auth_keys.get(&did.to_string()) {
            return Ok(key);
        }
        let _guard = self.provisioning.lock(did).await;
        if let Some(key) = self.auth_keys.get(&did.to_string()) {
            return Ok(key);
        }

        let algorithm = KeyAlgorithm::EcdsaSecp256k1RecoveryMethod2020;
        let document = self.resolver.resolve(did).await?;
        let key = match document.find_authentication_key(algorithm) {
            Some(found) => found.public_key,
            None => {
                info!(
                    "Couldn't find \"authentication\" key with type {} for did {} ... creating one for {} days",
                    algorithm.as_str(),
                    did,
                    ATTRIBUTE_VALID_DAYS
                );
                let response = self
                    .identity
                    .add_new_secp256k1_attribute(&new_attribute(did, RELATION_AUTHENTICATION))
                    .await?;
                decode_hex(&response.public_key)?
            }
        };
        self.auth_keys.insert(did.to_string(), key.clone());
        Ok(key)
    }

    /// Ethereum address of the authentication key of `did`.
    pub async fn auth_address(&self, did: &str) -> VcResult<Address> {
        compute_address(&self.get_auth_key(did).await?)
    }

    /// X25519 key agreement key of a DID this service acts for, provisioned if absent.
    ///
    /// Returned as lowercase hex without prefix.
    pub async fn get_key_exchange_key(&self, did: &str) -> VcResult<String> {
        if let Some(key) = self.key_exchange_keys.get(&did.to_string()) {
            return Ok(hex::encode(key));
        }
        let _guard = self.provisioning.lock(did).await;
        if let Some(key) = self.key_exchange_keys.get(&did.to_string()) {
            return Ok(hex::encode(key));
        }

        let algorithm = KeyAlgorithm::X25519KeyAgreementKey2019;
        let document = self.resolver.resolve(did).await?;
        let key = match document.find_key_agreement(algorithm) {
            Some(found) => found.public_key,
            None => {
                info!(
                    "Couldn't find \"key exchange\" key with type {} for did {} ... creating one for {} days",
                    algorithm.as_str(),
                    did,
                    ATTRIBUTE_VALID_DAYS
                );
                let response = self
                    .identity
                    .add_new_ed25519_attribute(&new_attribute(did, RELATION_KEY_AGREEMENT))
                    .await?;
                decode_hex(&response.public_key)?
            }
        };
        self.key_exchange_keys.insert(did.to_string(), key.clone());
        Ok(hex::encode(key))
    }

    /// X25519 key agreement key of a foreign DID; never provisions.
    ///
    /// # Errors
    /// `VcError::KeyAgreementNotFound` if the document lists none.
    pub async fn peer_key_exchange_key(&self, did: &str, role: &str) -> VcResult<String> {
        if let Some(key) = self.key_exchange_keys.get(&did.to_string()) {
            return Ok(hex::encode(key));
        }
        let document = self.resolver.resolve(did).await?;
        let found = document
            .find_key_agreement(KeyAlgorithm::X25519KeyAgreementKey2019)
            .ok_or_else(|| VcError::KeyAgreementNotFound(format!("for {}", role)))?;
        self.key_exchange_keys.insert(did.to_string(), found.public_key.clone());
        Ok(hex::encode(found.public_key))
    }

    /// Assertion key of `did` on `curve` whose private key the signer holds.
    ///
    /// Candidates are tried in document order and the first one the signer
    /// can use is selected. Without a usable candidate a new JWK attribute is
    /// provisioned and located in the re-resolved document.
    ///
    /// # Errors
    /// - `VcError::VerificationMethodNotFound` if the provisioned key does not show up
    /// - signer errors other than a missing key, and identity manager errors
    pub async fn get_assertion_key(&self, did: &str, curve: Curve) -> VcResult<AssertionKey> {
        let cache_key = (did.to_string(), curve);
        if let Some(key) = self.assertion_keys.get(&cache_key) {
            return Ok(key);
        }
        let _guard = self.provisioning.lock(did).await;
        if let Some(key) = self.assertion_keys.get(&cache_key) {
            return Ok(key);
        }

        let algorithm = KeyAlgorithm::JsonWebKey2020;
        let document = self.resolver.resolve(did).await?;
        for candidate in document.assertion_jwk_keys(algorithm, curve) {
            if self.is_usable(&candidate).await? {
                info!("Selecting assertion public key {} for {}", candidate.id, did);
                let key = assertion_key(candidate);
                self.assertion_keys.insert(cache_key, key.clone());
                return Ok(key);
            }
            info!(
                "private key related to assertion key {} was not found. Ignoring this key ...",
                candidate.id
            );
        }

        info!(
            "Couldn't find \"assertion\" key with type {} for did {} ... creating one for {} days",
            algorithm.as_str(),
            did,
            ATTRIBUTE_VALID_DAYS
        );
        let response = self
            .identity
            .add_new_jwk_attribute(&NewJwkAttribute {
                did: did.to_string(),
                valid_days: ATTRIBUTE_VALID_DAYS,
                relation: RELATION_ASSERTION.to_string(),
                jwk_type: curve.jwk_name().to_string(),
            })
            .await?;
        let provisioned = response.jwk;

        let document = self.resolver.resolve(did).await?;
        let key = find_provisioned(&document, algorithm, curve, &provisioned)?
            .map(assertion_key)
            .ok_or_else(|| {
                VcError::VerificationMethodNotFound(format!(
                    "no {} assertion key for {}",
                    curve.jwk_name(),
                    did
                ))
            })?;
        self.assertion_keys.insert(cache_key, key.clone());
        Ok(key)
    }

    /// Drops every cached key of `did`.
    pub fn invalidate(&self, did: &str) {
        self.auth_keys.retain(|k| k != did);
        self.key_exchange_keys.retain(|k| k != did);
        self.assertion_keys.retain(|(k, _)| k != did);
    }

    /// Capability check: can the signer produce signatures with this key?
    async fn is_usable(&self, candidate: &DidKeyMaterial) -> VcResult<bool> {
        match candidate.curve {
            Curve::Secp256k1 => {
                self.signer
                    .can_sign_secp256k1(compute_address(&candidate.public_key)?)
                    .await
            }
            Curve::P256 => self.signer.can_sign_p256(&candidate.public_key).await,
            Curve::X25519 => Ok(false),
        }
    }
}

fn new_attribute(did: &str, relation: &str) -> NewAttribute {
    NewAttribute {
        did: did.to_string(),
        valid_days: ATTRIBUTE_VALID_DAYS,
        relation: relation.to_string(),
    }
}

fn assertion_key(material: DidKeyMaterial) -> AssertionKey {
    AssertionKey {
        key_id: material.id,
        curve: material.curve,
        public_key: material.public_key,
    }
}

/// Locates the freshly provisioned key among the document's assertion keys.
///
/// secp256k1 keys are compared by address, P-256 keys by compressed point, so
/// differing encodings of the same key still match. A JWK without `y` is
/// matched on its x coordinate.
fn find_provisioned(
    document: &DidDocument,
    algorithm: KeyAlgorithm,
    curve: Curve,
    provisioned: &EcJwk,
) -> VcResult<Option<DidKeyMaterial>> {
    let candidates = document.assertion_jwk_keys(algorithm, curve);
    match provisioned.sec1_uncompressed() {
        Some(point) => {
            let target = match curve {
                Curve::Secp256k1 => compute_address(&point)?.as_bytes().to_vec(),
                _ => compress_p256(&point)?,
            };
            for candidate in candidates {
                let value = match curve {
                    Curve::Secp256k1 => compute_address(&candidate.public_key)?.as_bytes().to_vec(),
                    _ => candidate.public_key.clone(),
                };
                if value == target {
                    return Ok(Some(candidate));
                }
            }
            Ok(None)
        }
        None => {
            let x = decode_base64_any(&provisioned.x)?;
            Ok(candidates
                .into_iter()
                .find(|candidate| candidate.public_key.get(1..33) == Some(x.as_slice())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{jwk_for_p256, jwk_for_secp256k1, MockIdentity, MockResolver};
    use crate::wallet::key_management::LocalKeySigner;
    use k256::ecdsa::SigningKey;
    use serde_json::json;

    fn document_with_assertions(did: &str, keys: &[(&str, serde_json::Value)]) -> DidDocument {
        let assertions: Vec<_> = keys
            .iter()
            .map(|(id, jwk)| json!({"id": format!("{}#{}", did, id), "type": "JsonWebKey2020", "publicKeyJwk": jwk}))
            .collect();
        serde_json::from_value(json!({"id": did, "assertionMethod": assertions})).unwrap()
    }

    #[tokio::test]
    async fn test_rotation_selects_key_with_private_counterpart() {
        let did = "did:lac1:rotated";
        let signer = Arc::new(LocalKeySigner::new());
        signer.insert_secp256k1(SigningKey::from_slice(&[8u8; 32]).unwrap());
        let resolver = Arc::new(MockResolver::new());
        resolver.insert(document_with_assertions(
            did,
            &[("stale", jwk_for_secp256k1(&[7u8; 32])), ("fresh", jwk_for_secp256k1(&[8u8; 32]))],
        ));
        let identity = Arc::new(MockIdentity::new());
        let cache = KeyResolutionCache::new(resolver, identity.clone(), signer);

        let key = cache.get_assertion_key(did, Curve::Secp256k1).await.unwrap();
        assert_eq!(key.key_id, "did:lac1:rotated#fresh");
        assert_eq!(identity.jwk_attribute_calls(), 0);
    }

    #[tokio::test]
    async fn test_assertion_key_provisioned_when_no_candidate_is_usable() {
        let did = "did:lac1:bare";
        let signer = Arc::new(LocalKeySigner::new());
        let provisioned = p256::ecdsa::SigningKey::from_slice(&[5u8; 32]).unwrap();
        let compressed = signer.insert_p256(provisioned);
        let resolver = Arc::new(MockResolver::new());
        resolver.insert(document_with_assertions(did, &[]));
        let identity = Arc::new(MockIdentity::new());
        // The identity manager registers the key and the next resolution shows it.
        identity.on_jwk_attribute(
            jwk_for_p256(&[5u8; 32]),
            resolver.clone(),
            document_with_assertions(did, &[("vm-new", jwk_for_p256(&[5u8; 32]))]),
        );
        let cache = KeyResolutionCache::new(resolver, identity.clone(), signer);

        let key = cache.get_assertion_key(did, Curve::P256).await.unwrap();
        assert_eq!(key.key_id, "did:lac1:bare#vm-new");
        assert_eq!(key.public_key, compressed);
        assert_eq!(identity.jwk_attribute_calls(), 1);

        cache.get_assertion_key(did, Curve::P256).await.unwrap();
        assert_eq!(identity.jwk_attribute_calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_provisioned_key_is_verification_method_not_found() {
        let did = "did:lac1:lost";
        let resolver = Arc::new(MockResolver::new());
        resolver.insert(document_with_assertions(did, &[]));
        let identity = Arc::new(MockIdentity::new());
        identity.on_jwk_attribute(jwk_for_p256(&[6u8; 32]), resolver.clone(), document_with_assertions(did, &[]));
        let cache = KeyResolutionCache::new(resolver, identity, Arc::new(LocalKeySigner::new()));
        assert!(matches!(
            cache.get_assertion_key(did, Curve::P256).await,
            Err(VcError::VerificationMethodNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_peer_key_agreement_missing() {
        let resolver = Arc::new(MockResolver::new());
        resolver.insert(serde_json::from_value(json!({"id": "did:lac1:peer"})).unwrap());
        let cache = KeyResolutionCache::new(resolver, Arc::new(MockIdentity::new()), Arc::new(LocalKeySigner::new()));
        let err = cache
            .peer_key_exchange_key("did:lac1:peer", "final recipient")
            .await
            .unwrap_err();
        assert!(matches!(err, VcError::KeyAgreementNotFound(_)));
    }

    #[tokio::test]
    async fn test_auth_key_provisioned_once_and_invalidated() {
        let did = "did:lac1:noauth";
        let resolver = Arc::new(MockResolver::new());
        resolver.insert(serde_json::from_value(json!({"id": did})).unwrap());
        let identity = Arc::new(MockIdentity::new());
        let cache = KeyResolutionCache::new(resolver, identity.clone(), Arc::new(LocalKeySigner::new()));

        let first = cache.auth_address(did).await.unwrap();
        let second = cache.auth_address(did).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(identity.secp256k1_attribute_calls(), 1);

        cache.invalidate(did);
        cache.get_auth_key(did).await.unwrap();
        assert_eq!(identity.secp256k1_attribute_calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_first_requests_provision_once() {
        let did = "did:lac1:busy";
        let resolver = Arc::new(MockResolver::new());
        resolver.insert(serde_json::from_value(json!({"id": did})).unwrap());
        let identity = Arc::new(MockIdentity::new());
        let cache = Arc::new(KeyResolutionCache::new(
            resolver,
            identity.clone(),
            Arc::new(LocalKeySigner::new()),
        ));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get_key_exchange_key(did).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(identity.ed25519_attribute_calls(), 1);
    }
}
