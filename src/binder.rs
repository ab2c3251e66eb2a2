//! Binds a WebAuthn public key to a token's on-chain hash.
//!
//! The hash is `keccak256` over the UTF-8 bytes of the base64url public-key
//! string, the same value `WalletToken.getTransactionHash(string)` computes
//! with `keccak256(abi.encodePacked(pubKey))`. Both sides must agree exactly.

use alloy_primitives::{B256, keccak256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::ceremony::encoding::b64url_encode;
use crate::config::OPEN_MODE_SENTINEL;

#[derive(Debug, thiserror::Error)]
pub enum BinderError {
    #[error("Derived hash does not match the committed hash")]
    HashMismatch { derived: B256, committed: B256 },
    #[error("Malformed committed hash {0:?}")]
    Malformed(String),
}

/// Hash committed to a token at mint time.
///
/// On the wire (contract storage, JSON) the open variant is the literal
/// string `"false"`; a committed hash is `0x`-prefixed hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommittedHash {
    /// Minted without WebAuthn; verification alone authorizes.
    Open,
    Committed(B256),
}

impl CommittedHash {
    pub fn is_open(&self) -> bool {
        matches!(self, CommittedHash::Open)
    }

    pub fn for_public_key(public_key: &str) -> Self {
        CommittedHash::Committed(derive_hash(public_key))
    }
}

impl fmt::Display for CommittedHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommittedHash::Open => f.write_str(OPEN_MODE_SENTINEL),
            CommittedHash::Committed(h) => write!(f, "{h}"),
        }
    }
}

impl FromStr for CommittedHash {
    type Err = BinderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if is_open_mode(s) {
            return Ok(CommittedHash::Open);
        }
        B256::from_str(s)
            .map(CommittedHash::Committed)
            .map_err(|_| BinderError::Malformed(s.to_string()))
    }
}

impl Serialize for CommittedHash {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CommittedHash {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The string form of a credential public key that every hash and key
/// derivation consumes: base64url of the COSE_Key bytes.
pub fn public_key_string(credential_public_key: &[u8]) -> String {
    b64url_encode(credential_public_key)
}

pub fn derive_hash(public_key: &str) -> B256 {
    keccak256(public_key.as_bytes())
}

/// Whether a raw `tokenHashKey` value is the open-mode sentinel.
pub fn is_open_mode(token_hash: &str) -> bool {
    token_hash == OPEN_MODE_SENTINEL
}

/// How a token's authorization was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Open token, no comparison performed.
    Open,
    Matched(B256),
}

impl Binding {
    /// Hash argument for `ERC6551Account.execute`.
    pub fn hash_key(&self) -> CommittedHash {
        match self {
            Binding::Open => CommittedHash::Open,
            Binding::Matched(h) => CommittedHash::Committed(*h),
        }
    }
}

/// Compare a freshly supplied public key against the committed hash.
pub fn check(committed: &CommittedHash, public_key: &str) -> Result<Binding, BinderError> {
    match committed {
        CommittedHash::Open => Ok(Binding::Open),
        CommittedHash::Committed(expected) => {
            let derived = derive_hash(public_key);
            if derived == *expected {
                Ok(Binding::Matched(derived))
            } else {
                Err(BinderError::HashMismatch { derived, committed: *expected })
            }
        }
    }
}
