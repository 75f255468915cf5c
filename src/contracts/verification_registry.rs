// src/contracts/verification_registry.rs
//! Verification Registry smart contract interface implementation.
//!
//! Only the three functions the issuance flow needs are bound, through a
//! human-readable ABI:
//! - `getDidRegistry(address)` reads the DID registry an identity is bound to
//! - `addDidRegistry(address)` binds the sender to a DID registry
//! - `issueSigned(...)` records a proof of existence signed by the identity's controller

use crate::blockchain::lacchain_client::LacchainClient;
use crate::errors::{VcError, VcResult};
use async_trait::async_trait;
use ethers_contract::BaseContract;
use ethers_core::abi::parse_abi;
use ethers_core::types::{Address, Bytes, H256, U256};
use std::sync::Arc;

const VERIFICATION_REGISTRY_ABI: &[&str] = &[
    "function getDidRegistry(address identity) view returns (address)",
    "function addDidRegistry(address didRegistryAddress)",
    "function issueSigned(bytes32 digest, uint256 exp, address identity, uint8 sigV, bytes32 sigR, bytes32 sigS)",
];

/// Arguments of `issueSigned`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueSignedCall {
    pub digest: [u8; 32],
    pub exp: U256,
    pub identity: Address,
    pub v: u8,
    pub r: [u8; 32],
    pub s: [u8; 32],
}

/// The on-chain verification registry.
#[async_trait]
pub trait VerificationRegistryContract: Send + Sync {
    /// DID registry bound to `identity`, zero when unbound.
    async fn get_did_registry(&self, identity: Address) -> VcResult<Address>;

    /// Binds `from` to `did_registry`; the transaction is sent as `from`.
    async fn add_did_registry(&self, from: Address, did_registry: Address) -> VcResult<H256>;

    /// Submits a signed issuance through a throwaway relayer.
    async fn issue_signed(&self, call: &IssueSignedCall) -> VcResult<H256>;
}

/// ethers-backed registry contract.
pub struct EthersVerificationRegistry {
    address: Address,
    abi: BaseContract,
    client: Arc<LacchainClient>,
}

impl EthersVerificationRegistry {
    /// Creates a new registry instance.
    ///
    /// # Errors
    /// `VcError::Unexpected` if the ABI cannot be parsed.
    pub fn new(client: Arc<LacchainClient>, address: Address) -> VcResult<Self> {
        let abi = parse_abi(VERIFICATION_REGISTRY_ABI)
            .map_err(|e| VcError::Unexpected(format!("invalid verification registry ABI: {}", e)))?;
        Ok(Self {
            address,
            abi: BaseContract::from(abi),
            client,
        })
    }

    fn encode<T: ethers_core::abi::Tokenize>(&self, name: &str, args: T) -> VcResult<Bytes> {
        self.abi
            .encode(name, args)
            .map_err(|e| VcError::Unexpected(format!("unable to encode {}: {}", name, e)))
    }
}

#[async_trait]
impl VerificationRegistryContract for EthersVerificationRegistry {
    async fn get_did_registry(&self, identity: Address) -> VcResult<Address> {
        let data = self.encode("getDidRegistry", identity)?;
        let output = self.client.call(self.address, data).await?;
        self.abi
            .decode_output("getDidRegistry", output)
            .map_err(|e| VcError::Unexpected(format!("unable to decode getDidRegistry output: {}", e)))
    }

    async fn add_did_registry(&self, from: Address, did_registry: Address) -> VcResult<H256> {
        let data = self.encode("addDidRegistry", did_registry)?;
        self.client.sign_and_send(from, self.address, data).await
    }

    async fn issue_signed(&self, call: &IssueSignedCall) -> VcResult<H256> {
        let data = self.encode(
            "issueSigned",
            (call.digest, call.exp, call.identity, call.v, call.r, call.s),
        )?;
        self.client.sign_randomly_and_send(self.address, data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::key_management::LocalKeySigner;
    use ethers::utils::keccak256;

    fn registry() -> EthersVerificationRegistry {
        let client = LacchainClient::new("http://localhost:4545", Arc::new(LocalKeySigner::new()), Address::zero(), 1)
            .unwrap();
        EthersVerificationRegistry::new(Arc::new(client), Address::repeat_byte(0x11)).unwrap()
    }

    #[test]
    fn test_selectors_match_solidity_signatures() {
        let registry = registry();
        let data = registry.encode("addDidRegistry", Address::repeat_byte(0x22)).unwrap();
        assert_eq!(&data[..4], &keccak256("addDidRegistry(address)")[..4]);
        assert_eq!(data.len(), 4 + 32);

        let call = IssueSignedCall {
            digest: [1u8; 32],
            exp: U256::from(1_700_000_000u64),
            identity: Address::repeat_byte(0x33),
            v: 27,
            r: [2u8; 32],
            s: [3u8; 32],
        };
        let data = registry
            .encode("issueSigned", (call.digest, call.exp, call.identity, call.v, call.r, call.s))
            .unwrap();
        assert_eq!(
            &data[..4],
            &keccak256("issueSigned(bytes32,uint256,address,uint8,bytes32,bytes32)")[..4]
        );
        assert_eq!(data.len(), 4 + 6 * 32);
        assert_eq!(data[4 + 4 * 32 - 1], 27);
    }
}
