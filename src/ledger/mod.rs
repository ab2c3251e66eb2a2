//! The on-chain collaborator: `WalletToken` plus the ERC-6551 accounts it
//! binds to each token.

pub mod memory;

pub use memory::MemoryLedger;

use alloy_primitives::{Address, B256, Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::binder::CommittedHash;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The transaction was mined but reverted, or would certainly revert.
    #[error("Reverted: {0}")]
    Reverted(String),
    #[error("Unknown token {0}")]
    UnknownToken(u64),
    #[error("Provider: {0}")]
    Provider(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_hash: B256,
    pub block_number:     u64,
}

/// Contract surface consumed by the authorization gate and the flows.
#[async_trait::async_trait]
pub trait Ledger: Send + Sync {
    /// Id the next `mint` will assign.
    async fn next_token_id(&self) -> Result<u64, LedgerError>;

    /// `WalletToken.getTransactionHash(pubKey)`.
    async fn transaction_hash(&self, public_key: &str) -> Result<B256, LedgerError>;

    /// `WalletToken.mint(hashKey)` sent from `minter`. Returns the new token id.
    async fn mint(&self, minter: Address, hash_key: CommittedHash) -> Result<(u64, Receipt), LedgerError>;

    async fn token_bound_wallet_address(&self, token_id: u64) -> Result<Address, LedgerError>;

    async fn token_hash_key(&self, token_id: u64) -> Result<CommittedHash, LedgerError>;

    async fn owner_of(&self, token_id: u64) -> Result<Address, LedgerError>;

    async fn balance(&self, address: Address) -> Result<U256, LedgerError>;

    /// `ERC6551Account(wallet).execute(to, value, data, hashKey)` sent from `sender`.
    async fn execute(
        &self,
        wallet: Address,
        sender: Address,
        to: Address,
        value: U256,
        data: Bytes,
        hash_key: CommittedHash,
    ) -> Result<Receipt, LedgerError>;
}
