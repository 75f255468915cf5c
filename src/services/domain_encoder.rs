// src/services/domain_encoder.rs
//! Deployment domain embedded in every proof.
//!
//! Layout before base58 encoding:
//!
//! ```text
//! version(2) ‖ format type(2) ‖ verification registry(20) ‖ public directory(20)
//!   ‖ chain of trust(20) ‖ chain id(n) ‖ keccak256(previous bytes)[0..4]
//! ```
//!
//! The chain id is written as its minimal big-endian bytes. An odd number of
//! hex digits gets a leading zero nibble, so `0x9e55c` becomes `09 e5 5c`.
//! Truncating the trailing nibble instead would give `0x9e55c` and `0x9e55d`
//! the same domain.

use crate::config::Settings;
use crate::errors::{VcError, VcResult};
use crate::utils::crypto::{decode_hex, hash_data};
use crate::utils::serialization::encode_base58;
use ethers_core::types::{Address, U256};
use once_cell::sync::OnceCell;

pub const DOMAIN_VERSION: [u8; 2] = [0x00, 0x01];
pub const DOMAIN_FORMAT_TYPE: [u8; 2] = [0x00, 0x01];

#[derive(Debug)]
pub struct DomainEncoder {
    verification_registry: Address,
    public_directory: Address,
    chain_of_trust: Address,
    chain_id: U256,
    encoded: OnceCell<String>,
}

impl DomainEncoder {
    pub fn new(verification_registry: Address, public_directory: Address, chain_of_trust: Address, chain_id: U256) -> Self {
        Self {
            verification_registry,
            public_directory,
            chain_of_trust,
            chain_id,
            encoded: OnceCell::new(),
        }
    }

    /// # Errors
    /// `VcError::Validation` if a configured address or the chain id is malformed.
    pub fn from_settings(settings: &Settings) -> VcResult<Self> {
        let invalid = |e: config::ConfigError| VcError::Validation(e.to_string());
        Ok(Self::new(
            settings.verification_registry_address().map_err(invalid)?,
            settings.public_directory_address().map_err(invalid)?,
            settings.chain_of_trust_address().map_err(invalid)?,
            settings.chain_id_value().map_err(invalid)?,
        ))
    }

    /// The base58 domain, computed on first use.
    pub fn domain(&self) -> VcResult<&str> {
        self.encoded.get_or_try_init(|| self.encode()).map(String::as_str)
    }

    /// Recomputes the domain from scratch.
    pub fn encode(&self) -> VcResult<String> {
        let mut payload = Vec::with_capacity(2 + 2 + 60 + 32 + 4);
        payload.extend_from_slice(&DOMAIN_VERSION);
        payload.extend_from_slice(&DOMAIN_FORMAT_TYPE);
        payload.extend_from_slice(self.verification_registry.as_bytes());
        payload.extend_from_slice(self.public_directory.as_bytes());
        payload.extend_from_slice(self.chain_of_trust.as_bytes());
        payload.extend_from_slice(&chain_id_bytes(self.chain_id)?);
        let checksum = hash_data(&payload);
        payload.extend_from_slice(&checksum[..4]);
        Ok(encode_base58(&payload))
    }
}

/// Minimal hex bytes of the chain id, left-padded to a whole byte.
fn chain_id_bytes(chain_id: U256) -> VcResult<Vec<u8>> {
    let hex = format!("{:x}", chain_id);
    let padded = if hex.len() % 2 == 1 { format!("0{}", hex) } else { hex };
    decode_hex(&padded)
}
