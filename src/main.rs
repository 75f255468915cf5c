// src/main.rs

//! # DDCC Verifiable Credential Issuer - Main Entry Point
//!
//! Turns WHO DDCC vaccination bundles into W3C verifiable credentials,
//! anchors a proof of existence on LACChain and delivers the credential to
//! the receiver through the secure relay.
//!
//! ## Architecture Overview
//! 1. **Wallet Layer**: key signer backends (in-process or remote key manager) and the per-DID key cache
//! 2. **Blockchain Layer**: `LacchainClient` gas-model transactions and the verification registry
//! 3. **Services Layer**: credential assembly, proofs, anchoring, relay delivery and the API
//!
//! ## Configuration
//! Read from the environment (and an optional `.env` file), see `config.rs`.
//! Required: `CHAIN_ID`, `NODE_ADDRESS`, the three contract addresses,
//! `DID_RESOLVER_URL`, `SECURE_RELAY_SERVICE_DID` and
//! `SECURE_RELAY_MESSAGE_DELIVERER_BASE_URL`.

use crate::blockchain::lacchain_client::LacchainClient;
use crate::config::Settings;
use crate::contracts::verification_registry::EthersVerificationRegistry;
use crate::services::api_server::ApiServer;
use crate::services::credential_issuer::CredentialAssembler;
use crate::services::did_resolver::HttpDidResolver;
use crate::services::domain_encoder::DomainEncoder;
use crate::services::identity::{HttpIdentityService, IdentityEndpoints};
use crate::services::proof_engine::ProofEngine;
use crate::services::secure_relay::SecureRelayTransport;
use crate::services::vc_service::VcService;
use crate::services::verification_registry::VerificationRegistryClient;
use crate::wallet::key_management::{KeySigner, LocalKeySigner};
use crate::wallet::key_resolution::KeyResolutionCache;
use crate::wallet::remote_signer::{HttpKeySigner, KeyManagerEndpoints};
use anyhow::{anyhow, Context};
use dotenv::dotenv;
use log::info;
use std::net::SocketAddr;
use std::sync::Arc;

mod blockchain; // LACChain transactions
mod config; // Environment configuration
mod contracts; // Smart contract bindings
mod errors; // Error taxonomy
mod models; // Data structures
mod services; // Business logic and API
mod utils; // Hashing and encodings
mod wallet; // Key signers and key resolution

#[cfg(test)]
mod testing;

/// Main application entry point
///
/// # Initialization Sequence
/// 1. Load environment configuration
/// 2. Select the key signer backend
/// 3. Wire collaborators and services
/// 4. Start API server
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::load().context("invalid configuration")?;
    let chain_id = settings.chain_id_value()?;

    // One backend per process
    let signer: Arc<dyn KeySigner> = if settings.is_client_dependent_service {
        info!("using remote key manager at {}", settings.key_manager_base_url);
        Arc::new(HttpKeySigner::new(KeyManagerEndpoints::from_settings(&settings)))
    } else {
        info!("using in-process key signer");
        Arc::new(
            LocalKeySigner::from_hex_keys(&settings.local_secp256k1_keys, &settings.local_p256_keys)
                .context("invalid local signing keys")?,
        )
    };

    let resolver = Arc::new(HttpDidResolver::new(&settings.did_resolver_url));
    let identity = Arc::new(HttpIdentityService::new(IdentityEndpoints::from_settings(&settings)));

    let lacchain_client = Arc::new(
        LacchainClient::new(
            &settings.rpc_url,
            signer.clone(),
            settings.node_address_value()?,
            u64::try_from(chain_id).map_err(|e| anyhow!("CHAIN_ID does not fit in 64 bits: {}", e))?,
        )
        .context("failed to initialize LACChain client")?,
    );
    let registry_address = settings.verification_registry_address()?;
    let registry_contract = Arc::new(
        EthersVerificationRegistry::new(lacchain_client, registry_address)
            .context("failed to bind verification registry")?,
    );
    let registry = Arc::new(VerificationRegistryClient::new(
        registry_contract,
        identity.clone(),
        signer.clone(),
        chain_id,
        registry_address,
    ));

    let domain = Arc::new(DomainEncoder::from_settings(&settings).context("invalid domain configuration")?);
    info!("credential proofs will carry domain {}", domain.domain()?);

    let keys = Arc::new(KeyResolutionCache::new(resolver, identity.clone(), signer.clone()));
    let service = VcService::new(
        identity,
        keys.clone(),
        CredentialAssembler::new(settings.credential_generation()?),
        ProofEngine::new(keys.clone(), signer.clone(), domain),
        registry,
        SecureRelayTransport::new(keys, signer, &settings),
        settings.proof_of_existence_mode,
        settings.proof_suite,
    );
    info!("proof of existence mode: {:?}", settings.proof_of_existence_mode);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    ApiServer::new(Arc::new(service))
        .run(addr)
        .await
        .context("API server stopped")
}
