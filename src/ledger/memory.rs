use alloy_primitives::{Address, B256, Bytes, U256, address, keccak256};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{Ledger, LedgerError, Receipt};
use crate::binder::{CommittedHash, derive_hash};

const REGISTRY: Address = address!("000000006551c19487814612e58FE06813775758");

#[derive(Debug, Clone)]
struct Token {
    owner:    Address,
    hash_key: CommittedHash,
    wallet:   Address,
}

/// Recorded `execute` call, for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedCall {
    pub wallet:   Address,
    pub to:       Address,
    pub value:    U256,
    pub data:     Bytes,
    pub hash_key: CommittedHash,
}

#[derive(Default)]
struct State {
    tokens:   Vec<Token>,
    balances: HashMap<Address, U256>,
    block:    u64,
    executed: Vec<ExecutedCall>,
}

/// In-memory `WalletToken` + `ERC6551Account`.
///
/// Token ids are assigned from 0. Each token's account address is a CREATE2
/// style derivation from the token id. `execute` reverts unless the sender
/// owns the token, the hash key equals the one committed at mint, and the
/// account holds `value`.
#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<State>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` wei to `address`.
    pub fn fund(&self, address: Address, amount: U256) {
        if let Ok(mut state) = self.state.lock() {
            let balance = state.balances.entry(address).or_default();
            *balance = balance.saturating_add(amount);
        }
    }

    pub fn executed(&self) -> Vec<ExecutedCall> {
        self.state.lock().map(|s| s.executed.clone()).unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, LedgerError> {
        self.state.lock().map_err(|_| LedgerError::Provider("ledger state poisoned".into()))
    }
}

fn wallet_address(token_id: u64) -> Address {
    let salt = B256::from(U256::from(token_id).to_be_bytes::<32>());
    let init_code_hash = keccak256(b"ERC6551Account");
    let mut buf = Vec::with_capacity(85);
    buf.push(0xff);
    buf.extend_from_slice(REGISTRY.as_slice());
    buf.extend_from_slice(salt.as_slice());
    buf.extend_from_slice(init_code_hash.as_slice());
    Address::from_slice(&keccak256(&buf)[12..])
}

impl State {
    fn token(&self, token_id: u64) -> Result<&Token, LedgerError> {
        usize::try_from(token_id)
            .ok()
            .and_then(|i| self.tokens.get(i))
            .ok_or(LedgerError::UnknownToken(token_id))
    }

    fn receipt(&mut self, from: Address, payload: &[u8]) -> Receipt {
        self.block += 1;
        let mut buf = Vec::with_capacity(28 + payload.len());
        buf.extend_from_slice(&self.block.to_be_bytes());
        buf.extend_from_slice(from.as_slice());
        buf.extend_from_slice(payload);
        Receipt { transaction_hash: keccak256(&buf), block_number: self.block }
    }
}

#[async_trait::async_trait]
impl Ledger for MemoryLedger {
    async fn next_token_id(&self) -> Result<u64, LedgerError> {
        Ok(self.lock()?.tokens.len() as u64)
    }

    async fn transaction_hash(&self, public_key: &str) -> Result<B256, LedgerError> {
        Ok(derive_hash(public_key))
    }

    async fn mint(&self, minter: Address, hash_key: CommittedHash) -> Result<(u64, Receipt), LedgerError> {
        let mut state = self.lock()?;
        let token_id = state.tokens.len() as u64;
        let wallet = wallet_address(token_id);
        state.tokens.push(Token { owner: minter, hash_key, wallet });
        let receipt = state.receipt(minter, &token_id.to_be_bytes());
        tracing::info!(token_id, %wallet, %hash_key, "Token minted");
        Ok((token_id, receipt))
    }

    async fn token_bound_wallet_address(&self, token_id: u64) -> Result<Address, LedgerError> {
        Ok(self.lock()?.token(token_id)?.wallet)
    }

    async fn token_hash_key(&self, token_id: u64) -> Result<CommittedHash, LedgerError> {
        Ok(self.lock()?.token(token_id)?.hash_key)
    }

    async fn owner_of(&self, token_id: u64) -> Result<Address, LedgerError> {
        Ok(self.lock()?.token(token_id)?.owner)
    }

    async fn balance(&self, address: Address) -> Result<U256, LedgerError> {
        Ok(self.lock()?.balances.get(&address).copied().unwrap_or_default())
    }

    async fn execute(
        &self,
        wallet: Address,
        sender: Address,
        to: Address,
        value: U256,
        data: Bytes,
        hash_key: CommittedHash,
    ) -> Result<Receipt, LedgerError> {
        let mut state = self.lock()?;
        let token = state
            .tokens
            .iter()
            .find(|t| t.wallet == wallet)
            .cloned()
            .ok_or_else(|| LedgerError::Reverted("not a token bound account".into()))?;
        if token.owner != sender {
            return Err(LedgerError::Reverted("Not token owner".into()));
        }
        if token.hash_key != hash_key {
            return Err(LedgerError::Reverted("Invalid hash key".into()));
        }
        let balance = state.balances.get(&wallet).copied().unwrap_or_default();
        if balance < value {
            return Err(LedgerError::Reverted("Insufficient balance".into()));
        }

        state.balances.insert(wallet, balance - value);
        let credited = state.balances.entry(to).or_default();
        *credited = credited.saturating_add(value);
        state.executed.push(ExecutedCall { wallet, to, value, data: data.clone(), hash_key });
        let receipt = state.receipt(sender, &data);
        tracing::info!(%wallet, %to, %value, "Account executed");
        Ok(receipt)
    }
}
