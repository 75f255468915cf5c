// src/services/verification_registry.rs
//! Delegated ("gasless") proof-of-existence issuance.
//!
//! The issuer's controller signs an EIP-712 `Issue` message; a throwaway
//! relayer submits it to the verification registry. Before the first
//! issuance for a DID, the issuer's address is bound to its DID registry.

use crate::contracts::verification_registry::{IssueSignedCall, VerificationRegistryContract};
use crate::errors::{VcError, VcResult};
use crate::services::identity::IdentityService;
use crate::utils::crypto::{hash_data, to_prefixed_hex};
use crate::utils::single_flight::KeyedLocks;
use crate::wallet::key_management::{KeySigner, SignPlainMessageByAddress};
use ethers_core::abi::{encode, Token};
use ethers_core::types::{Address, H256, U256};
use log::info;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub const EIP712_DOMAIN_NAME: &str = "VerificationRegistry";
pub const EIP712_DOMAIN_VERSION: &str = "1";

/// `keccak256("Issue(bytes32 digest, uint256 exp, address identity)")`.
///
/// The registry contract hashes the type string with spaces after the commas.
pub static ISSUE_TYPEHASH: Lazy<[u8; 32]> =
    Lazy::new(|| hash_data(b"Issue(bytes32 digest, uint256 exp, address identity)"));

static EIP712_DOMAIN_TYPEHASH: Lazy<[u8; 32]> = Lazy::new(|| {
    hash_data(b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)")
});

/// EIP-712 domain separator of the verification registry.
pub fn domain_separator(chain_id: U256, verifying_contract: Address) -> [u8; 32] {
    hash_data(&encode(&[
        Token::FixedBytes(EIP712_DOMAIN_TYPEHASH.to_vec()),
        Token::FixedBytes(hash_data(EIP712_DOMAIN_NAME.as_bytes()).to_vec()),
        Token::FixedBytes(hash_data(EIP712_DOMAIN_VERSION.as_bytes()).to_vec()),
        Token::Uint(chain_id),
        Token::Address(verifying_contract),
    ]))
}

/// `keccak256(abi.encode(ISSUE_TYPEHASH, digest, exp, identity))`.
pub fn issue_struct_hash(digest: [u8; 32], exp: U256, identity: Address) -> [u8; 32] {
    hash_data(&encode(&[
        Token::FixedBytes(ISSUE_TYPEHASH.to_vec()),
        Token::FixedBytes(digest.to_vec()),
        Token::Uint(exp),
        Token::Address(identity),
    ]))
}

/// `keccak256(0x19 ‖ 0x01 ‖ domainSeparator ‖ structHash)`.
pub fn typed_data_hash(domain_separator: [u8; 32], struct_hash: [u8; 32]) -> [u8; 32] {
    let mut packed = Vec::with_capacity(66);
    packed.extend_from_slice(&[0x19, 0x01]);
    packed.extend_from_slice(&domain_separator);
    packed.extend_from_slice(&struct_hash);
    hash_data(&packed)
}

/// Splits a 65 byte `r ‖ s ‖ v` signature; `v` is normalized to 27/28.
pub fn split_signature(signature: &[u8]) -> VcResult<(u8, [u8; 32], [u8; 32])> {
    if signature.len() != 65 {
        return Err(VcError::Signing(format!(
            "expected a 65 byte signature, got {} bytes",
            signature.len()
        )));
    }
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&signature[..32]);
    s.copy_from_slice(&signature[32..64]);
    let v = match signature[64] {
        v @ (0 | 1) => v + 27,
        v => v,
    };
    Ok((v, r, s))
}

pub struct VerificationRegistryClient {
    contract: Arc<dyn VerificationRegistryContract>,
    identity: Arc<dyn IdentityService>,
    signer: Arc<dyn KeySigner>,
    chain_id: U256,
    domain_separator: [u8; 32],
    /// issuer DID -> DID registry it is bound to
    bindings: RwLock<HashMap<String, Address>>,
    binding_locks: KeyedLocks,
}

impl VerificationRegistryClient {
    /// # Arguments
    /// * `contract` - Verification registry contract binding
    /// * `identity` - Identity manager used to decode DIDs and fetch controllers
    /// * `signer` - Key signer holding the controller keys
    /// * `chain_id` - Configured chain id
    /// * `registry_address` - Verification registry address, the EIP-712 verifying contract
    pub fn new(
        contract: Arc<dyn VerificationRegistryContract>,
        identity: Arc<dyn IdentityService>,
        signer: Arc<dyn KeySigner>,
        chain_id: U256,
        registry_address: Address,
    ) -> Self {
        Self {
            contract,
            identity,
            signer,
            chain_id,
            domain_separator: domain_separator(chain_id, registry_address),
            bindings: RwLock::new(HashMap::new()),
            binding_locks: KeyedLocks::new(),
        }
    }

    /// Anchors `digest` for `issuer_did` until `exp` (unix seconds, `0` = no expiry).
    ///
    /// # Returns
    /// Hash of the `issueSigned` transaction
    ///
    /// # Errors
    /// - `VcError::ChainIdFromDidNotSupported` if the DID lives on another chain
    /// - `VcError::ProofOfExistenceFailed` if binding or issuance is not accepted
    /// - identity and signer errors as they occur
    pub async fn verify_and_issue_signed(&self, issuer_did: &str, digest: [u8; 32], exp: u64) -> VcResult<H256> {
        let decoded = self.identity.decode_did(issuer_did).await?;
        let did_chain_id = decoded.chain_id_value();
        if did_chain_id != Some(self.chain_id) {
            return Err(VcError::ChainIdFromDidNotSupported {
                expected: format!("0x{:x}", self.chain_id),
                found: decoded.chain_id.clone(),
            });
        }
        self.ensure_did_registry(issuer_did, decoded.address, decoded.did_registry_address)
            .await?;

        let exp = U256::from(exp);
        let hash = typed_data_hash(
            self.domain_separator,
            issue_struct_hash(digest, exp, decoded.address),
        );
        let controller = self.identity.get_controller(issuer_did).await?;
        let signature = self
            .signer
            .sign_secp256k1(&SignPlainMessageByAddress {
                address: controller,
                message_hash: to_prefixed_hex(&hash),
            })
            .await?;
        let (v, r, s) = split_signature(&signature)?;

        let tx_hash = self
            .contract
            .issue_signed(&IssueSignedCall {
                digest,
                exp,
                identity: decoded.address,
                v,
                r,
                s,
            })
            .await
            .map_err(|e| VcError::ProofOfExistenceFailed(e.to_string()))?;
        info!("proof of existence {} anchored for {} in {:?}", to_prefixed_hex(&digest), issuer_did, tx_hash);
        Ok(tx_hash)
    }

    /// Makes sure `address` is bound to `did_registry` on-chain, at most once per DID.
    pub async fn ensure_did_registry(&self, did: &str, address: Address, did_registry: Address) -> VcResult<()> {
        if self.cached_binding(did) == Some(did_registry) {
            return Ok(());
        }
        let _guard = self.binding_locks.lock(did).await;
        if self.cached_binding(did) == Some(did_registry) {
            return Ok(());
        }

        let current = self.contract.get_did_registry(address).await?;
        if current != did_registry {
            info!("binding {:?} to did registry {:?}", address, did_registry);
            self.contract
                .add_did_registry(address, did_registry)
                .await
                .map_err(|e| VcError::ProofOfExistenceFailed(format!("unable to bind did registry: {}", e)))?;
        }
        self.bindings
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(did.to_string(), did_registry);
        Ok(())
    }

    /// Forgets the registry binding of `did`.
    pub fn invalidate(&self, did: &str) {
        self.bindings
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(did);
    }

    fn cached_binding(&self, did: &str) -> Option<Address> {
        self.bindings
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(did)
            .copied()
    }
}
