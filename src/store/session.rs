use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::{StoreError, disk};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintedWallet {
    pub token_id: u64,
    pub wallet:   Address,
}

/// Client-side session: the signed-in passkey's public-key string, the
/// virtual account derived from it, and the wallets it minted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key:      Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_address: Option<Address>,
    #[serde(default)]
    pub minted_wallets:  Vec<MintedWallet>,
}

/// Loaded once on start, written back after every mutation.
pub struct SessionStore {
    path:  Option<PathBuf>,
    state: SessionState,
}

impl SessionStore {
    pub fn load(path: PathBuf) -> Result<Self, StoreError> {
        let state = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(state) => state,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Discarding corrupt session file");
                    SessionState::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SessionState::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path: Some(path), state })
    }

    pub fn ephemeral() -> Self {
        Self { path: None, state: SessionState::default() }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Apply `f` and persist the result. On a write failure the in-memory
    /// state is left untouched.
    pub fn update<R>(&mut self, f: impl FnOnce(&mut SessionState) -> R) -> Result<R, StoreError> {
        let mut next = self.state.clone();
        let out = f(&mut next);
        if let Some(path) = &self.path {
            disk::write_json(path, &next)?;
        }
        self.state = next;
        Ok(out)
    }

    pub fn clear(&mut self) -> Result<(), StoreError> {
        if let Some(path) = &self.path {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.state = SessionState::default();
        Ok(())
    }
}
