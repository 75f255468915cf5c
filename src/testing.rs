// src/testing.rs
//! Shared fixtures and in-memory collaborators for unit tests.

use crate::config::{ProofOfExistenceMode, Settings};
use crate::contracts::verification_registry::{IssueSignedCall, VerificationRegistryContract};
use crate::errors::{VcError, VcResult};
use crate::models::credential::{CredentialGeneration, ProofSuite};
use crate::models::ddcc::{
    Certificate, CertificateIssuer, CodeSystem, DdccCoreData, DdccToVcRequest, Identifier, NumberOrText, Period,
    Vaccination,
};
use crate::models::did::DidDocument;
use crate::services::credential_issuer::CredentialAssembler;
use crate::services::did_resolver::DidResolver;
use crate::services::domain_encoder::DomainEncoder;
use crate::services::identity::{
    CreatedDid, DecodedDid, IdentityService, NewAttribute, NewAttributeResponse, NewJwkAttribute, NewJwkAttributeResponse,
};
use crate::services::proof_engine::ProofEngine;
use crate::services::secure_relay::SecureRelayTransport;
use crate::services::vc_service::VcService;
use crate::services::verification_registry::VerificationRegistryClient;
use crate::utils::serialization::encode_base64url;
use crate::wallet::key_management::LocalKeySigner;
use crate::wallet::key_resolution::KeyResolutionCache;
use async_trait::async_trait;
use ethers::utils::hex;
use ethers_core::types::{Address, H256};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use ring::agreement::{self, EphemeralPrivateKey};
use ring::rand::SystemRandom;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const ISSUER_DID: &str = "did:lac1:1iT5issuer";
pub const RECEIVER_DID: &str = "did:lac1:1iT5receiver";
pub const RELAY_DID: &str = "did:lac1:1iT5relay";
pub const CHAIN_ID: &str = "0x9e55c";

fn address_of(byte: &str) -> String {
    format!("0x{}", byte.repeat(20))
}

/// Settings pointing every HTTP collaborator at `base_url`.
pub fn test_settings(base_url: &str) -> Settings {
    Settings {
        port: 3000,
        chain_id: CHAIN_ID.into(),
        rpc_url: base_url.into(),
        node_address: address_of("44"),
        verification_registry_contract_address: address_of("11"),
        public_directory_contract_address: address_of("22"),
        chain_of_trust_contract_address: address_of("33"),
        did_resolver_url: base_url.into(),
        secure_relay_service_did: RELAY_DID.into(),
        secure_relay_message_deliverer_base_url: base_url.into(),
        secure_relay_message_deliverer_send: "/vc".into(),
        is_client_dependent_service: false,
        key_manager_base_url: base_url.into(),
        key_manager_secp256k1_plain_message_sign: "/api/v1/secp256k1/sign/plain-message".into(),
        key_manager_p256_plain_message_sign: "/api/v1/p256/sign/plain-message".into(),
        key_manager_did_jwt: "/api/v1/did-jwt/generate".into(),
        key_manager_did_comm_encrypt: "/api/v1/didcomm/x25519/encrypt".into(),
        key_manager_secp256k1_sign_lacchain_transaction: "/api/v1/secp256k1/sign/lacchain-tx".into(),
        local_secp256k1_keys: String::new(),
        local_p256_keys: String::new(),
        identity_manager_base_url: base_url.into(),
        did_lac1: "/api/v1/did/lac1".into(),
        did_lac1_controller: "/api/v1/did/lac1/controller".into(),
        did_lac1_decode_did: "/api/v1/did/lac1/decode".into(),
        did_lac1_add_new_secp256k1_attribute: "/api/v1/did/lac1/attribute/add/secp256k1".into(),
        did_lac1_add_new_ed25519_attribute: "/api/v1/did/lac1/attribute/add/ed25519".into(),
        did_lac1_add_new_jwk_attribute: "/api/v1/did/lac1/attribute/add/jwk".into(),
        proof_of_existence_mode: ProofOfExistenceMode::EnabledNotThrowable,
        credential_schema_version: 1,
        proof_suite: ProofSuite::Legacy,
    }
}

/// JWK of the secp256k1 public key belonging to `secret`.
pub fn jwk_for_secp256k1(secret: &[u8; 32]) -> Value {
    let key = k256::ecdsa::SigningKey::from_slice(secret).unwrap();
    let point = key.verifying_key().to_encoded_point(false);
    json!({
        "kty": "EC",
        "crv": "secp256k1",
        "x": encode_base64url(point.x().unwrap()),
        "y": encode_base64url(point.y().unwrap()),
    })
}

/// JWK of the P-256 public key belonging to `secret`.
pub fn jwk_for_p256(secret: &[u8; 32]) -> Value {
    let key = p256::ecdsa::SigningKey::from_slice(secret).unwrap();
    let point = key.verifying_key().to_encoded_point(false);
    json!({
        "kty": "EC",
        "crv": "P-256",
        "x": encode_base64url(point.x().unwrap()),
        "y": encode_base64url(point.y().unwrap()),
    })
}

pub fn sample_core_data() -> DdccCoreData {
    DdccCoreData {
        certificate: Some(Certificate {
            period: Some(Period {
                start: Some("2021-07-04".into()),
                end: Some("2022-07-04".into()),
            }),
            hcid: Some(Identifier {
                value: Some("123456789".into()),
            }),
            issuer: Some(CertificateIssuer {
                identifier: Some(Identifier {
                    value: Some("wA69g8VD512TfTTdkTNSsG".into()),
                }),
            }),
        }),
        vaccination: Some(Vaccination {
            vaccine: Some(CodeSystem {
                code: Some("XM68M6".into()),
                system: Some("http://id.who.int/icd11/mms".into()),
            }),
            date: Some("2021-07-04".into()),
            dose: Some(NumberOrText::Number(1.into())),
            country: Some(CodeSystem {
                code: Some("EC".into()),
                system: Some("urn:iso:std:iso:3166".into()),
            }),
            centre: Some("Vaccination Site".into()),
            next_dose: Some("2021-08-04".into()),
            brand: Some(CodeSystem {
                code: Some("XM8NQ0".into()),
                system: Some("http://id.who.int/icd11/mms".into()),
            }),
            lot: Some("PT123F".into()),
            maholder: Some(CodeSystem {
                code: Some("RA-01-01-01".into()),
                system: None,
            }),
            disease: Some(CodeSystem {
                code: Some("RA01".into()),
                system: Some("http://id.who.int/icd11/mms".into()),
            }),
            total_doses: Some(NumberOrText::Number(2.into())),
            valid_from: None,
            practitioner: Some(Identifier {
                value: Some("Dr. Jane Doe".into()),
            }),
        }),
        name: Some("Eddie Murphy".into()),
        birth_date: Some("1986-09-19".into()),
        identifier: Some("111000111".into()),
        sex: Some("male".into()),
    }
}

/// A DDCC bundle request carrying [`sample_core_data`].
pub fn sample_request(issuer_did: &str, receiver_did: &str) -> DdccToVcRequest {
    let core_data = base64::encode(serde_json::to_vec(&sample_core_data()).unwrap());
    serde_json::from_value(json!({
        "bundle": {
            "entry": [
                {"fullUrl": "urn:uuid:patient", "resource": {"resourceType": "Patient"}},
                {
                    "fullUrl": "urn:uuid:document",
                    "resource": {
                        "resourceType": "DocumentReference",
                        "description": "WHO QR code for COVID 19 Vaccine Certificate",
                        "content": [
                            {
                                "attachment": {"contentType": "application/json", "data": core_data},
                                "format": {
                                    "system": "https://worldhealthorganization.github.io/ddcc/CodeSystem/DDCC-QR-Format-CodeSystem",
                                    "code": "serialized"
                                }
                            },
                            {
                                "attachment": {"contentType": "image/png", "data": "iVBORw0KGgo="},
                                "format": {
                                    "system": "https://worldhealthorganization.github.io/ddcc/CodeSystem/DDCC-QR-Format-CodeSystem",
                                    "code": "image"
                                }
                            }
                        ]
                    }
                }
            ]
        },
        "issuerDid": issuer_did,
        "receiverDid": receiver_did,
    }))
    .unwrap()
}

fn x25519_public_key() -> [u8; 32] {
    let private = EphemeralPrivateKey::generate(&agreement::X25519, &SystemRandom::new()).unwrap();
    let public = private.compute_public_key().unwrap();
    let mut key = [0u8; 32];
    key.copy_from_slice(public.as_ref());
    key
}

fn key_agreement_document(did: &str, key: &[u8; 32]) -> DidDocument {
    serde_json::from_value(json!({
        "id": did,
        "keyAgreement": [{
            "id": format!("{}#vm-ka", did),
            "type": "X25519KeyAgreementKey2019",
            "publicKeyHex": hex::encode(key),
        }],
    }))
    .unwrap()
}

#[derive(Default)]
pub struct MockResolver {
    documents: Mutex<HashMap<String, DidDocument>>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, document: DidDocument) {
        self.documents.lock().unwrap().insert(document.id.clone(), document);
    }
}

#[async_trait]
impl DidResolver for MockResolver {
    async fn resolve(&self, did: &str) -> VcResult<DidDocument> {
        self.documents
            .lock()
            .unwrap()
            .get(did)
            .cloned()
            .ok_or_else(|| VcError::Unexpected(format!("Unable to resolve did {}", did)))
    }
}

struct JwkProvisioning {
    jwk: Value,
    resolver: Arc<MockResolver>,
    document_after: DidDocument,
}

/// Identity manager double; provisioned secp256k1 and ed25519 keys are deterministic.
#[derive(Default)]
pub struct MockIdentity {
    decoded: Mutex<HashMap<String, DecodedDid>>,
    rejected: Mutex<HashSet<String>>,
    controller: Mutex<Option<Address>>,
    jwk_provisioning: Mutex<Option<JwkProvisioning>>,
    secp256k1_calls: AtomicUsize,
    ed25519_calls: AtomicUsize,
    jwk_calls: AtomicUsize,
}

impl MockIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_decoded(&self, did: &str, decoded: DecodedDid) {
        self.decoded.lock().unwrap().insert(did.to_string(), decoded);
    }

    /// Makes `decode_did` fail for `did`.
    pub fn reject_did(&self, did: &str) {
        self.rejected.lock().unwrap().insert(did.to_string());
    }

    pub fn set_controller(&self, controller: Address) {
        *self.controller.lock().unwrap() = Some(controller);
    }

    /// On the next JWK attribute request, publishes `document_after` and answers with `jwk`.
    pub fn on_jwk_attribute(&self, jwk: Value, resolver: Arc<MockResolver>, document_after: DidDocument) {
        *self.jwk_provisioning.lock().unwrap() = Some(JwkProvisioning {
            jwk,
            resolver,
            document_after,
        });
    }

    pub fn secp256k1_attribute_calls(&self) -> usize {
        self.secp256k1_calls.load(Ordering::SeqCst)
    }

    pub fn ed25519_attribute_calls(&self) -> usize {
        self.ed25519_calls.load(Ordering::SeqCst)
    }

    pub fn jwk_attribute_calls(&self) -> usize {
        self.jwk_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityService for MockIdentity {
    async fn create_did(&self) -> VcResult<CreatedDid> {
        Ok(CreatedDid {
            did: "did:lac1:1iT5created".into(),
        })
    }

    async fn decode_did(&self, did: &str) -> VcResult<DecodedDid> {
        if self.rejected.lock().unwrap().contains(did) {
            return Err(VcError::Unexpected(format!("Unable to decode did {}", did)));
        }
        Ok(self.decoded.lock().unwrap().get(did).cloned().unwrap_or(DecodedDid {
            address: Address::repeat_byte(0x12),
            did_registry_address: Address::repeat_byte(0x55),
            chain_id: CHAIN_ID.into(),
        }))
    }

    async fn get_controller(&self, _did: &str) -> VcResult<Address> {
        Ok(self.controller.lock().unwrap().unwrap_or_else(|| Address::repeat_byte(0x99)))
    }

    async fn add_new_secp256k1_attribute(&self, _attribute: &NewAttribute) -> VcResult<NewAttributeResponse> {
        let n = self.secp256k1_calls.fetch_add(1, Ordering::SeqCst) as u8;
        let key = k256::ecdsa::SigningKey::from_slice(&[0x40 + n; 32]).unwrap();
        Ok(NewAttributeResponse {
            public_key: hex::encode(key.verifying_key().to_encoded_point(true).as_bytes()),
        })
    }

    async fn add_new_ed25519_attribute(&self, _attribute: &NewAttribute) -> VcResult<NewAttributeResponse> {
        self.ed25519_calls.fetch_add(1, Ordering::SeqCst);
        Ok(NewAttributeResponse {
            public_key: hex::encode(x25519_public_key()),
        })
    }

    async fn add_new_jwk_attribute(&self, _attribute: &NewJwkAttribute) -> VcResult<NewJwkAttributeResponse> {
        self.jwk_calls.fetch_add(1, Ordering::SeqCst);
        let provisioning = self.jwk_provisioning.lock().unwrap().take();
        match provisioning {
            Some(p) => {
                p.resolver.insert(p.document_after);
                Ok(NewJwkAttributeResponse {
                    jwk: serde_json::from_value(p.jwk)?,
                })
            }
            None => Err(VcError::Unexpected("Error while associating attribute to did".into())),
        }
    }
}

/// Registry contract double recording submitted calls.
#[derive(Default)]
pub struct MockRegistryContract {
    bindings: Mutex<HashMap<Address, Address>>,
    issued: Mutex<Vec<IssueSignedCall>>,
    add_calls: AtomicUsize,
    failing: AtomicBool,
}

impl MockRegistryContract {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, identity: Address, did_registry: Address) {
        self.bindings.lock().unwrap().insert(identity, did_registry);
    }

    /// Makes every following `issue_signed` revert.
    pub fn fail_issuance(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn issued(&self) -> Vec<IssueSignedCall> {
        self.issued.lock().unwrap().clone()
    }

    pub fn add_did_registry_calls(&self) -> usize {
        self.add_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VerificationRegistryContract for MockRegistryContract {
    async fn get_did_registry(&self, identity: Address) -> VcResult<Address> {
        Ok(self.bindings.lock().unwrap().get(&identity).copied().unwrap_or_default())
    }

    async fn add_did_registry(&self, from: Address, did_registry: Address) -> VcResult<H256> {
        self.add_calls.fetch_add(1, Ordering::SeqCst);
        self.bind(from, did_registry);
        Ok(H256::repeat_byte(0xaa))
    }

    async fn issue_signed(&self, call: &IssueSignedCall) -> VcResult<H256> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(VcError::Unexpected("execution reverted".into()));
        }
        self.issued.lock().unwrap().push(call.clone());
        Ok(H256::from(call.digest))
    }
}

/// An issuer whose keys all live in an in-process signer.
pub struct IssuerFixture {
    pub resolver: Arc<MockResolver>,
    pub identity: Arc<MockIdentity>,
    pub signer: Arc<LocalKeySigner>,
    pub secp256k1_assertion_key: k256::ecdsa::SigningKey,
    pub p256_assertion_key: p256::ecdsa::SigningKey,
    pub relay_key_agreement: [u8; 32],
}

/// Issuer, receiver and relay documents, with the issuer's controller and
/// authentication key being the same signer-held secp256k1 key.
pub fn issuer_fixture() -> IssuerFixture {
    let signer = Arc::new(LocalKeySigner::new());
    let auth_key = k256::ecdsa::SigningKey::from_slice(&[0x31u8; 32]).unwrap();
    let auth_public = auth_key.verifying_key().to_encoded_point(true);
    let auth_address = signer.insert_secp256k1(auth_key.clone());
    let secp256k1_assertion_key = k256::ecdsa::SigningKey::from_slice(&[0x32u8; 32]).unwrap();
    signer.insert_secp256k1(secp256k1_assertion_key.clone());
    let p256_assertion_key = p256::ecdsa::SigningKey::from_slice(&[0x33u8; 32]).unwrap();
    signer.insert_p256(p256_assertion_key.clone());

    let resolver = Arc::new(MockResolver::new());
    resolver.insert(
        serde_json::from_value(json!({
            "id": ISSUER_DID,
            "verificationMethod": [{
                "id": format!("{}#vm-auth", ISSUER_DID),
                "type": "EcdsaSecp256k1RecoveryMethod2020",
                "controller": ISSUER_DID,
                "publicKeyHex": hex::encode(auth_public.as_bytes()),
            }],
            "authentication": [format!("{}#vm-auth", ISSUER_DID)],
            "keyAgreement": [{
                "id": format!("{}#vm-ka", ISSUER_DID),
                "type": "X25519KeyAgreementKey2019",
                "publicKeyHex": hex::encode(x25519_public_key()),
            }],
            "assertionMethod": [
                {
                    "id": format!("{}#vm-secp256k1", ISSUER_DID),
                    "type": "JsonWebKey2020",
                    "publicKeyJwk": jwk_for_secp256k1(&[0x32u8; 32]),
                },
                {
                    "id": format!("{}#vm-p256", ISSUER_DID),
                    "type": "JsonWebKey2020",
                    "publicKeyJwk": jwk_for_p256(&[0x33u8; 32]),
                }
            ],
        }))
        .unwrap(),
    );
    resolver.insert(key_agreement_document(RECEIVER_DID, &x25519_public_key()));
    let relay_key_agreement = x25519_public_key();
    resolver.insert(key_agreement_document(RELAY_DID, &relay_key_agreement));

    let identity = Arc::new(MockIdentity::new());
    identity.set_controller(auth_address);

    IssuerFixture {
        resolver,
        identity,
        signer,
        secp256k1_assertion_key,
        p256_assertion_key,
        relay_key_agreement,
    }
}

/// A fully wired [`VcService`] for `fixture`, relaying to `send_path` on the mock server.
pub struct VcHarness {
    pub service: VcService,
    pub contract: Arc<MockRegistryContract>,
}

pub fn vc_harness(fixture: &IssuerFixture, mode: ProofOfExistenceMode, send_path: &str) -> VcHarness {
    let mut settings = test_settings(&mockito::server_url());
    settings.secure_relay_message_deliverer_send = send_path.to_string();
    let keys = Arc::new(KeyResolutionCache::new(
        fixture.resolver.clone(),
        fixture.identity.clone(),
        fixture.signer.clone(),
    ));
    let contract = Arc::new(MockRegistryContract::new());
    let registry = Arc::new(VerificationRegistryClient::new(
        contract.clone(),
        fixture.identity.clone(),
        fixture.signer.clone(),
        settings.chain_id_value().unwrap(),
        settings.verification_registry_address().unwrap(),
    ));
    let domain = Arc::new(DomainEncoder::from_settings(&settings).unwrap());
    let service = VcService::new(
        fixture.identity.clone(),
        keys.clone(),
        CredentialAssembler::new(CredentialGeneration::V1),
        ProofEngine::new(keys.clone(), fixture.signer.clone(), domain),
        registry,
        SecureRelayTransport::new(keys, fixture.signer.clone(), &settings),
        mode,
        ProofSuite::Legacy,
    );
    VcHarness { service, contract }
}
