// src/blockchain/gas_model.rs
//! LACChain gas model transaction encoding.
//!
//! LACChain writer nodes only relay transactions whose data ends with the
//! writer node address and an expiration timestamp. The suffix is appended
//! before signing, so it is covered by the sender's signature.

use crate::errors::{VcError, VcResult};
use chrono::Utc;
use ethers::signers::{LocalWallet, Signer};
use ethers_core::types::{transaction::eip2718::TypedTransaction, Address, Bytes, TransactionRequest, U256};
use k256::ecdsa::SigningKey;
use serde::{Deserialize, Serialize};

/// Gas limit for every registry transaction; execution cost varies with state.
pub const GAS_LIMIT: u64 = 4_700_000;

/// Lifetime of a meta-transaction before writer nodes drop it.
pub const META_TX_VALIDITY_SECS: i64 = 86_400 * 4;

/// A fully populated legacy transaction ready for signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulatedTransaction {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
    pub gas_limit: U256,
    pub gas_price: U256,
    pub nonce: U256,
    pub value: U256,
    pub chain_id: u64,
}

/// Unix timestamp after which a meta-transaction sent now expires.
pub fn expiration_from_now() -> u64 {
    (Utc::now().timestamp() + META_TX_VALIDITY_SECS).max(0) as u64
}

/// `data ‖ node address ‖ uint256(expiration)`.
pub fn append_gas_model_suffix(data: &[u8], node_address: Address, expiration: u64) -> Bytes {
    let mut extended = Vec::with_capacity(data.len() + 52);
    extended.extend_from_slice(data);
    extended.extend_from_slice(node_address.as_bytes());
    let mut expiration_word = [0u8; 32];
    U256::from(expiration).to_big_endian(&mut expiration_word);
    extended.extend_from_slice(&expiration_word);
    Bytes::from(extended)
}

/// Signs `tx` as a LACChain gas model transaction and returns the raw RLP bytes.
///
/// # Errors
/// `VcError::Signing` if the key does not belong to `tx.from` or signing fails.
pub fn sign_gas_model_transaction(
    key: &SigningKey,
    tx: &PopulatedTransaction,
    node_address: Address,
    expiration: u64,
) -> VcResult<Bytes> {
    let wallet = LocalWallet::from(key.clone()).with_chain_id(tx.chain_id);
    if wallet.address() != tx.from {
        return Err(VcError::Signing(format!(
            "key for {:?} cannot sign transaction from {:?}",
            wallet.address(),
            tx.from
        )));
    }
    let request: TypedTransaction = TransactionRequest::new()
        .from(tx.from)
        .to(tx.to)
        .data(append_gas_model_suffix(&tx.data, node_address, expiration))
        .gas(tx.gas_limit)
        .gas_price(tx.gas_price)
        .nonce(tx.nonce)
        .value(tx.value)
        .chain_id(tx.chain_id)
        .into();
    let signature = wallet
        .sign_transaction_sync(&request)
        .map_err(|e| VcError::Signing(e.to_string()))?;
    Ok(request.rlp_signed(&signature))
}
