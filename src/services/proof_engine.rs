// src/services/proof_engine.rs
//! Proof construction for DDCC credentials.
//!
//! Both suites hash RFC 8785 canonical JSON with SHA-256 and embed the
//! deployment domain. They differ in what is signed:
//! - legacy `EcdsaSecp256k1Signature2019`: `SHA256(canon(credential))`,
//!   signed with a secp256k1 assertion key, hex proof value
//! - `DataIntegrityProof` / `ecdsa-jcs-2019`:
//!   `SHA256(canon(proofConfig)) ‖ SHA256(canon(credential))`, signed with a
//!   P-256 assertion key, base58 proof value

use crate::errors::VcResult;
use crate::models::credential::{
    DataIntegrityProof, DdccCredential, Proof, ProofConfig, ProofSuite, Type1Proof, VerifiableCredential,
    ASSERTION_METHOD, DATA_INTEGRITY_PROOF_TYPE, ECDSA_JCS_2019, LEGACY_PROOF_TYPE,
};
use crate::services::domain_encoder::DomainEncoder;
use crate::utils::canonical::canonical_digest;
use crate::utils::crypto::to_prefixed_hex;
use crate::utils::serialization::encode_base58;
use crate::wallet::key_management::{KeySigner, SignPlainMessageByAddress, SignPlainMessageByCompressedPublicKey};
use crate::wallet::key_resolution::KeyResolutionCache;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// `created` format of Data Integrity proofs.
pub const CREATED_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub struct ProofEngine {
    keys: Arc<KeyResolutionCache>,
    signer: Arc<dyn KeySigner>,
    domain: Arc<DomainEncoder>,
}

impl ProofEngine {
    pub fn new(keys: Arc<KeyResolutionCache>, signer: Arc<dyn KeySigner>, domain: Arc<DomainEncoder>) -> Self {
        Self { keys, signer, domain }
    }

    /// Signs `credential` on behalf of `issuer_did` with the requested suite.
    ///
    /// # Arguments
    /// * `credential` - Unsigned credential; it is never modified
    /// * `issuer_did` - DID whose assertion key signs the proof
    /// * `suite` - Proof suite to produce
    ///
    /// # Errors
    /// Canonicalization, key resolution and signing errors.
    pub async fn add_proof(
        &self,
        credential: &DdccCredential,
        issuer_did: &str,
        suite: ProofSuite,
    ) -> VcResult<VerifiableCredential> {
        let proof = match suite {
            ProofSuite::Legacy => Proof::Type1(self.type1_proof(credential, issuer_did).await?),
            ProofSuite::DataIntegrity => {
                Proof::DataIntegrity(self.data_integrity_proof(credential, issuer_did, Utc::now()).await?)
            }
        };
        Ok(VerifiableCredential {
            credential: credential.clone(),
            proof,
        })
    }

    /// Legacy proof: secp256k1 signature over `SHA256(canon(credential))`.
    pub async fn type1_proof(&self, credential: &DdccCredential, issuer_did: &str) -> VcResult<Type1Proof> {
        let digest = canonical_digest(credential)?;
        let key = self.keys.get_assertion_key(issuer_did, ProofSuite::Legacy.curve()).await?;
        let signature = self
            .signer
            .sign_secp256k1(&SignPlainMessageByAddress {
                address: key.address()?,
                message_hash: to_prefixed_hex(&digest),
            })
            .await?;
        Ok(Type1Proof {
            id: issuer_did.to_string(),
            type_: LEGACY_PROOF_TYPE.to_string(),
            proof_purpose: ASSERTION_METHOD.to_string(),
            verification_method: key.key_id,
            domain: self.domain.domain()?.to_string(),
            proof_value: to_prefixed_hex(&signature),
        })
    }

    /// Data Integrity proof created at `created`.
    pub async fn data_integrity_proof(
        &self,
        credential: &DdccCredential,
        issuer_did: &str,
        created: DateTime<Utc>,
    ) -> VcResult<DataIntegrityProof> {
        let key = self.keys.get_assertion_key(issuer_did, ProofSuite::DataIntegrity.curve()).await?;
        let config = ProofConfig {
            type_: DATA_INTEGRITY_PROOF_TYPE.to_string(),
            cryptosuite: ECDSA_JCS_2019.to_string(),
            created: created.format(CREATED_FORMAT).to_string(),
            proof_purpose: ASSERTION_METHOD.to_string(),
            verification_method: key.key_id.clone(),
            domain: self.domain.domain()?.to_string(),
        };
        let signing_input = data_integrity_signing_input(&config, credential)?;
        let signature = self
            .signer
            .sign_p256(&SignPlainMessageByCompressedPublicKey {
                compressed_public_key: key.hex_public_key(),
                message_hash: to_prefixed_hex(&signing_input),
            })
            .await?;
        Ok(DataIntegrityProof {
            config,
            proof_value: encode_base58(&signature),
        })
    }
}

/// `SHA256(canon(config)) ‖ SHA256(canon(document))`.
pub fn data_integrity_signing_input(config: &ProofConfig, credential: &DdccCredential) -> VcResult<Vec<u8>> {
    let mut input = canonical_digest(config)?.to_vec();
    input.extend_from_slice(&canonical_digest(credential)?);
    Ok(input)
}
