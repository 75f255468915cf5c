// src/blockchain/lacchain_client.rs
//! LACChain client implementation.
//!
//! Wraps an ethers JSON-RPC provider and submits gas model transactions:
//! - `sign_and_send` has the configured key signer sign for a known sender
//! - `sign_randomly_and_send` signs with a throwaway wallet that only relays
//!
//! Every transaction carries the fixed [`GAS_LIMIT`] and expires four days
//! after submission.

use crate::blockchain::gas_model::{
    expiration_from_now, sign_gas_model_transaction, PopulatedTransaction, GAS_LIMIT,
};
use crate::errors::{VcError, VcResult};
use crate::wallet::key_management::{KeySigner, LacchainTransactionRequest};
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers_core::types::{transaction::eip2718::TypedTransaction, Address, Bytes, TransactionRequest, H256, U256, U64};
use log::{debug, info};
use std::sync::Arc;

/// Blockchain client for gas model transactions and contract reads.
#[derive(Clone)]
pub struct LacchainClient {
    /// LACChain RPC provider
    provider: Arc<Provider<Http>>,
    /// Signs transactions for senders whose keys this service manages
    signer: Arc<dyn KeySigner>,
    /// Writer node relaying the transactions
    node_address: Address,
    chain_id: u64,
}

impl LacchainClient {
    /// Creates a new LACChain client.
    ///
    /// # Arguments
    /// * `rpc_url` - JSON-RPC endpoint of the writer node
    /// * `signer` - Key signer used by [`LacchainClient::sign_and_send`]
    /// * `node_address` - Writer node address appended to every transaction
    /// * `chain_id` - Configured chain id
    ///
    /// # Errors
    /// `VcError::Validation` if the RPC URL cannot be parsed.
    pub fn new(rpc_url: &str, signer: Arc<dyn KeySigner>, node_address: Address, chain_id: u64) -> VcResult<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| VcError::Validation(format!("invalid RPC_URL {}: {}", rpc_url, e)))?;
        Ok(Self {
            provider: Arc::new(provider),
            signer,
            node_address,
            chain_id,
        })
    }

    /// Read-only contract call.
    pub async fn call(&self, to: Address, data: Bytes) -> VcResult<Bytes> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        self.provider
            .call(&tx, None)
            .await
            .map_err(|e| VcError::Unexpected(format!("contract call to {:?} failed: {}", to, e)))
    }

    /// Sends `data` to `to` from `from`, signed by the key signer.
    ///
    /// # Returns
    /// Hash of the mined transaction
    pub async fn sign_and_send(&self, from: Address, to: Address, data: Bytes) -> VcResult<H256> {
        let tx = self.populate(from, to, data).await?;
        let raw = self
            .signer
            .sign_lacchain_transaction(&LacchainTransactionRequest {
                fully_populated_transaction_request: tx,
                signer_address: from,
                node_address: self.node_address,
                expiration: expiration_from_now(),
            })
            .await?;
        self.broadcast(raw).await
    }

    /// Sends `data` to `to` from a freshly generated wallet.
    ///
    /// The relaying wallet holds no funds; gas is covered by the gas model.
    pub async fn sign_randomly_and_send(&self, to: Address, data: Bytes) -> VcResult<H256> {
        let wallet = LocalWallet::new(&mut rand::thread_rng());
        debug!("relaying transaction to {:?} from throwaway {:?}", to, wallet.address());
        let tx = self.populate(wallet.address(), to, data).await?;
        let raw = sign_gas_model_transaction(wallet.signer(), &tx, self.node_address, expiration_from_now())?;
        self.broadcast(raw).await
    }

    async fn populate(&self, from: Address, to: Address, data: Bytes) -> VcResult<PopulatedTransaction> {
        let nonce = self
            .provider
            .get_transaction_count(from, None)
            .await
            .map_err(|e| VcError::Unexpected(format!("unable to fetch nonce for {:?}: {}", from, e)))?;
        let gas_price = self
            .provider
            .get_gas_price()
            .await
            .map_err(|e| VcError::Unexpected(format!("unable to fetch gas price: {}", e)))?;
        Ok(PopulatedTransaction {
            from,
            to,
            data,
            gas_limit: U256::from(GAS_LIMIT),
            gas_price,
            nonce,
            value: U256::zero(),
            chain_id: self.chain_id,
        })
    }

    /// Broadcasts a raw transaction and waits for its receipt.
    async fn broadcast(&self, raw: Bytes) -> VcResult<H256> {
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(|e| VcError::Unexpected(format!("transaction rejected by node: {}", e)))?;
        let tx_hash = pending.tx_hash();
        let receipt = pending
            .await
            .map_err(|e| VcError::Unexpected(format!("transaction {:?} failed: {}", tx_hash, e)))?
            .ok_or_else(|| VcError::Unexpected(format!("transaction {:?} was dropped", tx_hash)))?;
        if receipt.status == Some(U64::zero()) {
            return Err(VcError::Unexpected(format!("transaction {:?} reverted", tx_hash)));
        }
        info!("transaction {:?} mined in block {:?}", tx_hash, receipt.block_number);
        Ok(receipt.transaction_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::key_management::LocalKeySigner;

    #[test]
    fn test_invalid_rpc_url() {
        let signer: Arc<dyn KeySigner> = Arc::new(LocalKeySigner::new());
        assert!(matches!(
            LacchainClient::new("not a url", signer.clone(), Address::zero(), 1),
            Err(VcError::Validation(_))
        ));
        assert!(LacchainClient::new("http://localhost:4545", signer, Address::zero(), 1).is_ok());
    }
}
