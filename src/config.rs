// src/config.rs
//! Process configuration.
//!
//! Settings are read once at startup from the process environment (after
//! `dotenv` has loaded an optional `.env` file) using the `config` crate.
//! Environment names are the upper-case form of the field names, e.g.
//! `CHAIN_ID`, `PROOF_OF_EXISTENCE_MODE`, `KEY_MANAGER_BASE_URL`.

use crate::models::credential::{CredentialGeneration, ProofSuite};
use config::{Config, ConfigError, Environment};
use ethers_core::types::{Address, U256};
use serde::Deserialize;
use std::str::FromStr;

/// How anchoring failures are treated by the send pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProofOfExistenceMode {
    /// Never anchor.
    Disabled,
    /// Anchor, but log and continue when anchoring fails.
    EnabledNotThrowable,
    /// Anchor and abort the send when anchoring fails.
    Strict,
}

/// Full service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub port: u16,
    /// Hex encoded chain id, e.g. `0x9e55c`.
    pub chain_id: String,
    pub rpc_url: String,
    /// LACChain writer node address used by the gas model.
    pub node_address: String,
    pub verification_registry_contract_address: String,
    pub public_directory_contract_address: String,
    pub chain_of_trust_contract_address: String,
    pub did_resolver_url: String,

    pub secure_relay_service_did: String,
    pub secure_relay_message_deliverer_base_url: String,
    pub secure_relay_message_deliverer_send: String,

    /// `true` selects the remote key manager, `false` the in-process signer.
    pub is_client_dependent_service: bool,
    pub key_manager_base_url: String,
    pub key_manager_secp256k1_plain_message_sign: String,
    pub key_manager_p256_plain_message_sign: String,
    pub key_manager_did_jwt: String,
    pub key_manager_did_comm_encrypt: String,
    pub key_manager_secp256k1_sign_lacchain_transaction: String,
    /// Comma separated hex secp256k1 private keys for the in-process signer.
    pub local_secp256k1_keys: String,
    /// Comma separated hex P-256 private keys for the in-process signer.
    pub local_p256_keys: String,

    pub identity_manager_base_url: String,
    pub did_lac1: String,
    pub did_lac1_controller: String,
    pub did_lac1_decode_did: String,
    pub did_lac1_add_new_secp256k1_attribute: String,
    pub did_lac1_add_new_ed25519_attribute: String,
    pub did_lac1_add_new_jwk_attribute: String,

    pub proof_of_existence_mode: ProofOfExistenceMode,
    pub credential_schema_version: u8,
    pub proof_suite: ProofSuite,
}

impl Settings {
    /// Loads settings from defaults and the process environment, then validates them.
    ///
    /// # Errors
    /// Returns `ConfigError` if a required key is missing, a value cannot be
    /// deserialized, or an address/chain id is malformed.
    pub fn load() -> Result<Self, ConfigError> {
        let settings: Settings = Config::builder()
            .set_default("port", 3000)?
            .set_default("rpc_url", "http://localhost:4545")?
            .set_default("secure_relay_message_deliverer_send", "/vc")?
            .set_default("is_client_dependent_service", false)?
            .set_default("key_manager_base_url", "http://localhost:3001")?
            .set_default("key_manager_secp256k1_plain_message_sign", "/api/v1/secp256k1/sign/plain-message")?
            .set_default("key_manager_p256_plain_message_sign", "/api/v1/p256/sign/plain-message")?
            .set_default("key_manager_did_jwt", "/api/v1/did-jwt/generate")?
            .set_default("key_manager_did_comm_encrypt", "/api/v1/didcomm/x25519/encrypt")?
            .set_default("key_manager_secp256k1_sign_lacchain_transaction", "/api/v1/secp256k1/sign/lacchain-tx")?
            .set_default("local_secp256k1_keys", "")?
            .set_default("local_p256_keys", "")?
            .set_default("identity_manager_base_url", "http://localhost:3002")?
            .set_default("did_lac1", "/api/v1/did/lac1")?
            .set_default("did_lac1_controller", "/api/v1/did/lac1/controller")?
            .set_default("did_lac1_decode_did", "/api/v1/did/lac1/decode")?
            .set_default("did_lac1_add_new_secp256k1_attribute", "/api/v1/did/lac1/attribute/add/secp256k1")?
            .set_default("did_lac1_add_new_ed25519_attribute", "/api/v1/did/lac1/attribute/add/ed25519")?
            .set_default("did_lac1_add_new_jwk_attribute", "/api/v1/did/lac1/attribute/add/jwk")?
            .set_default("proof_of_existence_mode", "ENABLED_NOT_THROWABLE")?
            .set_default("credential_schema_version", 1)?
            .set_default("proof_suite", "EcdsaSecp256k1Signature2019")?
            .add_source(Environment::default())
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks addresses and chain id without touching the network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chain_id_value()?;
        self.verification_registry_address()?;
        self.public_directory_address()?;
        self.chain_of_trust_address()?;
        self.node_address_value()?;
        self.credential_generation()?;
        Ok(())
    }

    pub fn chain_id_value(&self) -> Result<U256, ConfigError> {
        parse_chain_id(&self.chain_id)
            .ok_or_else(|| ConfigError::Message(format!("CHAIN_ID {} is not valid hex", self.chain_id)))
    }

    pub fn verification_registry_address(&self) -> Result<Address, ConfigError> {
        parse_address("VERIFICATION_REGISTRY_CONTRACT_ADDRESS", &self.verification_registry_contract_address)
    }

    pub fn public_directory_address(&self) -> Result<Address, ConfigError> {
        parse_address("PUBLIC_DIRECTORY_CONTRACT_ADDRESS", &self.public_directory_contract_address)
    }

    pub fn chain_of_trust_address(&self) -> Result<Address, ConfigError> {
        parse_address("CHAIN_OF_TRUST_CONTRACT_ADDRESS", &self.chain_of_trust_contract_address)
    }

    pub fn node_address_value(&self) -> Result<Address, ConfigError> {
        parse_address("NODE_ADDRESS", &self.node_address)
    }

    pub fn credential_generation(&self) -> Result<CredentialGeneration, ConfigError> {
        match self.credential_schema_version {
            1 => Ok(CredentialGeneration::V1),
            2 => Ok(CredentialGeneration::V2),
            other => Err(ConfigError::Message(format!(
                "CREDENTIAL_SCHEMA_VERSION must be 1 or 2, found {}",
                other
            ))),
        }
    }
}

/// Parses a hex chain id with or without `0x` prefix.
pub fn parse_chain_id(value: &str) -> Option<U256> {
    let trimmed = value.trim().trim_start_matches("0x");
    if trimmed.is_empty() {
        return None;
    }
    U256::from_str_radix(trimmed, 16).ok()
}

fn parse_address(name: &str, value: &str) -> Result<Address, ConfigError> {
    Address::from_str(value.trim())
        .map_err(|_| ConfigError::Message(format!("Specified {} {} is not a valid address", name, value)))
}
