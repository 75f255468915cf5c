// src/services/vc_service.rs
//! DDCC to verifiable credential pipeline.
//!
//! A request runs strictly in sequence: intake, assembly, proof,
//! proof of existence, relay delivery. Anchoring is not rolled back when the
//! relay step fails afterwards.

use crate::config::ProofOfExistenceMode;
use crate::errors::{VcError, VcResult};
use crate::models::credential::{DdccCredential, ProofSuite};
use crate::models::ddcc::{DdccInput, DdccToVcRequest, QrAttachment};
use crate::services::credential_issuer::CredentialAssembler;
use crate::services::identity::{CreatedDid, IdentityService};
use crate::services::proof_engine::ProofEngine;
use crate::services::secure_relay::{SecureRelayTransport, Sender};
use crate::services::verification_registry::VerificationRegistryClient;
use crate::utils::canonical::canonical_digest;
use crate::wallet::key_resolution::KeyResolutionCache;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Outcome of a successful send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReceipt {
    pub delivery_id: String,
    /// `None` when anchoring was skipped or tolerated.
    pub tx_hash: Option<String>,
}

pub struct VcService {
    identity: Arc<dyn IdentityService>,
    keys: Arc<KeyResolutionCache>,
    assembler: CredentialAssembler,
    proofs: ProofEngine,
    registry: Arc<VerificationRegistryClient>,
    relay: SecureRelayTransport,
    proof_of_existence_mode: ProofOfExistenceMode,
    default_suite: ProofSuite,
}

impl VcService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identity: Arc<dyn IdentityService>,
        keys: Arc<KeyResolutionCache>,
        assembler: CredentialAssembler,
        proofs: ProofEngine,
        registry: Arc<VerificationRegistryClient>,
        relay: SecureRelayTransport,
        proof_of_existence_mode: ProofOfExistenceMode,
        default_suite: ProofSuite,
    ) -> Self {
        Self {
            identity,
            keys,
            assembler,
            proofs,
            registry,
            relay,
            proof_of_existence_mode,
            default_suite,
        }
    }

    /// Creates a fresh `did:lac1` through the identity manager.
    ///
    /// # Errors
    /// `VcError::Unexpected` when the identity manager rejects the request.
    pub async fn create_did(&self) -> VcResult<CreatedDid> {
        let created = self.identity.create_did().await?;
        info!("created {}", created.did);
        Ok(created)
    }

    /// Validates a DDCC bundle request, then issues and delivers the credential.
    ///
    /// # Errors
    /// `VcError::Validation` for malformed bundles or undecodable DIDs, then
    /// whatever [`VcService::send`] returns.
    pub async fn transform_and_send(&self, request: DdccToVcRequest) -> VcResult<DeliveryReceipt> {
        let document_reference = request.bundle.document_reference()?;
        let description = document_reference.checked_description()?.to_string();
        let qr = document_reference.qr_image()?;
        let core_data = document_reference.core_data_set()?.decode_core_data()?;

        for did in [&request.issuer_did, &request.receiver_did] {
            self.identity
                .decode_did(did)
                .await
                .map_err(|_| VcError::Validation("Invalid did params".into()))?;
        }

        let input = DdccInput {
            issuer_did: request.issuer_did,
            receiver_did: request.receiver_did,
            ddcc_data: core_data.validate()?,
        };
        self.send(&input, &qr, &description, request.proof_suite).await
    }

    /// Issues the credential described by `input` and delivers it to the receiver.
    ///
    /// # Arguments
    /// * `input` - Validated DDCC data with issuer and receiver DIDs
    /// * `attachment` - QR image embedded in the credential subject
    /// * `qr_description` - Image description, defaulted when empty
    /// * `suite` - Proof suite override, the configured suite when `None`
    ///
    /// # Returns
    /// Relay delivery id and, when anchored, the `issueSigned` transaction hash
    pub async fn send(
        &self,
        input: &DdccInput,
        attachment: &QrAttachment,
        qr_description: &str,
        suite: Option<ProofSuite>,
    ) -> VcResult<DeliveryReceipt> {
        let credential = self.assembler.assemble(input, attachment, qr_description);
        let suite = suite.unwrap_or(self.default_suite);
        let verifiable_credential = self.proofs.add_proof(&credential, &input.issuer_did, suite).await?;

        let tx_hash = self.anchor(&credential, &input.issuer_did).await?;

        let message = serde_json::to_string(&verifiable_credential)?;
        let auth_address = self.keys.auth_address(&input.issuer_did).await?;
        let key_exchange = self.keys.get_key_exchange_key(&input.issuer_did).await?;
        let delivery = self
            .relay
            .send_data(
                &Sender {
                    did: &input.issuer_did,
                    auth_address,
                    key_exchange_public_key: &key_exchange,
                },
                &input.receiver_did,
                &message,
            )
            .await?;
        info!(
            "credential {} delivered to {} with delivery id {}",
            credential.id, input.receiver_did, delivery.delivery_id
        );
        Ok(DeliveryReceipt {
            delivery_id: delivery.delivery_id,
            tx_hash,
        })
    }

    async fn anchor(&self, credential: &DdccCredential, issuer_did: &str) -> VcResult<Option<String>> {
        if self.proof_of_existence_mode == ProofOfExistenceMode::Disabled {
            return Ok(None);
        }
        let result = match canonical_digest(credential) {
            Ok(digest) => {
                self.registry
                    .verify_and_issue_signed(issuer_did, digest, credential.validity.expiration_timestamp())
                    .await
            }
            Err(e) => Err(e),
        };
        match (result, self.proof_of_existence_mode) {
            (Ok(tx_hash), _) => Ok(Some(format!("{:?}", tx_hash))),
            (Err(e), ProofOfExistenceMode::Strict) => Err(match e {
                VcError::ProofOfExistenceFailed(_) | VcError::ChainIdFromDidNotSupported { .. } => e,
                other => VcError::ProofOfExistenceFailed(other.to_string()),
            }),
            (Err(e), _) => {
                warn!("proof of existence for {} was not registered: {}", credential.id, e);
                Ok(None)
            }
        }
    }
}
