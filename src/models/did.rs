// src/models/did.rs
//! Resolved DID documents and the typed key material extracted from them.
//!
//! Follows the shape of the [DID Core Specification](https://www.w3.org/TR/did-core/)
//! as returned by the resolver: verification relationships may embed a
//! verification method or reference one by id.

use crate::utils::crypto::compress_p256;
use crate::utils::serialization::decode_base64_any;
use ethers::utils::hex;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use serde::{Deserialize, Serialize};

/// Verification relationship a key is listed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRelationship {
    Authentication,
    KeyAgreement,
    AssertionMethod,
}

/// Verification method types this service knows how to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    EcdsaSecp256k1RecoveryMethod2020,
    X25519KeyAgreementKey2019,
    JsonWebKey2020,
}

impl KeyAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyAlgorithm::EcdsaSecp256k1RecoveryMethod2020 => "EcdsaSecp256k1RecoveryMethod2020",
            KeyAlgorithm::X25519KeyAgreementKey2019 => "X25519KeyAgreementKey2019",
            KeyAlgorithm::JsonWebKey2020 => "JsonWebKey2020",
        }
    }
}

/// Elliptic curves of the key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Curve {
    Secp256k1,
    P256,
    X25519,
}

impl Curve {
    /// JWK `crv` name.
    pub fn jwk_name(&self) -> &'static str {
        match self {
            Curve::Secp256k1 => "secp256k1",
            Curve::P256 => "P-256",
            Curve::X25519 => "X25519",
        }
    }
}

/// Elliptic curve public key in JWK form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcJwk {
    pub kty: String,
    pub crv: String,
    pub x: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

impl EcJwk {
    /// SEC1 uncompressed point `0x04 ‖ x ‖ y`, or `None` for OKP keys.
    pub fn sec1_uncompressed(&self) -> Option<Vec<u8>> {
        let x = decode_base64_any(&self.x).ok()?;
        let y = decode_base64_any(self.y.as_deref()?).ok()?;
        if x.len() != 32 || y.len() != 32 {
            return None;
        }
        let mut point = Vec::with_capacity(65);
        point.push(0x04);
        point.extend_from_slice(&x);
        point.extend_from_slice(&y);
        Some(point)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_hex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_base64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_jwk: Option<EcJwk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blockchain_account_id: Option<String>,
}

impl VerificationMethod {
    /// Raw key bytes from `publicKeyHex` or `publicKeyBase64`.
    fn raw_public_key(&self) -> Option<Vec<u8>> {
        if let Some(hex_key) = &self.public_key_hex {
            return hex::decode(hex_key.trim_start_matches("0x")).ok();
        }
        if let Some(b64_key) = &self.public_key_base64 {
            return decode_base64_any(b64_key).ok();
        }
        None
    }
}

/// A relationship entry: either an embedded method or a reference by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationshipEntry {
    Reference(String),
    Embedded(VerificationMethod),
}

/// A resolved DID Document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    pub id: String,
    #[serde(default)]
    pub verification_method: Vec<VerificationMethod>,
    #[serde(default)]
    pub authentication: Vec<RelationshipEntry>,
    #[serde(default)]
    pub assertion_method: Vec<RelationshipEntry>,
    #[serde(default)]
    pub key_agreement: Vec<RelationshipEntry>,
}

/// Typed key material extracted from a DID document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DidKeyMaterial {
    /// Verification method id, e.g. `did:lac1:...#vm-3`.
    pub id: String,
    pub relationship: KeyRelationship,
    pub algorithm: KeyAlgorithm,
    pub curve: Curve,
    /// secp256k1 keys as found (33 or 65 bytes); JWK secp256k1 keys
    /// uncompressed; P-256 keys compressed; X25519 keys raw 32 bytes.
    pub public_key: Vec<u8>,
}

impl DidDocument {
    /// Verification methods listed under `relationship`, references resolved.
    pub fn methods_for(&self, relationship: KeyRelationship) -> Vec<&VerificationMethod> {
        let entries = match relationship {
            KeyRelationship::Authentication => &self.authentication,
            KeyRelationship::KeyAgreement => &self.key_agreement,
            KeyRelationship::AssertionMethod => &self.assertion_method,
        };
        entries
            .iter()
            .filter_map(|entry| match entry {
                RelationshipEntry::Embedded(method) => Some(method),
                RelationshipEntry::Reference(id) => self.verification_method.iter().find(|vm| &vm.id == id),
            })
            .collect()
    }

    /// First authentication key of the given algorithm carrying hex/base64 key bytes.
    pub fn find_authentication_key(&self, algorithm: KeyAlgorithm) -> Option<DidKeyMaterial> {
        self.find_raw_key(KeyRelationship::Authentication, algorithm, Curve::Secp256k1)
    }

    /// First key agreement key of the given algorithm carrying hex/base64 key bytes.
    pub fn find_key_agreement(&self, algorithm: KeyAlgorithm) -> Option<DidKeyMaterial> {
        self.find_raw_key(KeyRelationship::KeyAgreement, algorithm, Curve::X25519)
    }

    /// All JWK assertion keys of `algorithm` on `curve`, in document order.
    ///
    /// Several candidates are expected after key rotation.
    pub fn assertion_jwk_keys(&self, algorithm: KeyAlgorithm, curve: Curve) -> Vec<DidKeyMaterial> {
        self.methods_for(KeyRelationship::AssertionMethod)
            .into_iter()
            .filter(|vm| vm.type_ == algorithm.as_str())
            .filter_map(|vm| {
                let jwk = vm.public_key_jwk.as_ref()?;
                if jwk.crv != curve.jwk_name() {
                    return None;
                }
                let point = jwk.sec1_uncompressed()?;
                let public_key = match curve {
                    Curve::Secp256k1 => k256::PublicKey::from_sec1_bytes(&point)
                        .ok()?
                        .to_encoded_point(false)
                        .as_bytes()
                        .to_vec(),
                    Curve::P256 => compress_p256(&point).ok()?,
                    Curve::X25519 => return None,
                };
                Some(DidKeyMaterial {
                    id: vm.id.clone(),
                    relationship: KeyRelationship::AssertionMethod,
                    algorithm,
                    curve,
                    public_key,
                })
            })
            .collect()
    }

    fn find_raw_key(
        &self,
        relationship: KeyRelationship,
        algorithm: KeyAlgorithm,
        curve: Curve,
    ) -> Option<DidKeyMaterial> {
        let method = self
            .methods_for(relationship)
            .into_iter()
            .find(|vm| vm.type_ == algorithm.as_str())?;
        Some(DidKeyMaterial {
            id: method.id.clone(),
            relationship,
            algorithm,
            curve,
            public_key: method.raw_public_key()?,
        })
    }
}
