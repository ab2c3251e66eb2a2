//! Deterministic "virtual" accounts derived from a public-key string.
//!
//! The signing key is `SHA-256(utf8(public_key))` taken as a secp256k1
//! scalar. No salt, no randomness: the same string yields the same account
//! on every machine and after every restart.
//!
//! The public key is not a secret. Anyone who learns the string can
//! recompute the private key and move the account's funds; the account is
//! only as confidential as that string.

use alloy_primitives::{Address, keccak256};
use k256::ecdsa::SigningKey;
use sha2::{Digest, Sha256};
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("Derived scalar is not a valid secp256k1 key")]
    InvalidScalar,
}

pub fn derive_signing_key(public_key: &str) -> Result<SigningKey, KeyError> {
    let digest = Sha256::digest(public_key.as_bytes());
    SigningKey::from_slice(&digest).map_err(|_| KeyError::InvalidScalar)
}

/// Ethereum address of a secp256k1 key.
pub fn address_of(key: &SigningKey) -> Address {
    let point = key.verifying_key().to_encoded_point(false);
    // drop the 0x04 prefix
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// Account controlled by a key derived from a public-key string.
#[derive(Clone)]
pub struct VirtualAccount {
    key:     SigningKey,
    address: Address,
}

impl VirtualAccount {
    pub fn derive(public_key: &str) -> Result<Self, KeyError> {
        let key = derive_signing_key(public_key)?;
        let address = address_of(&key);
        Ok(Self { key, address })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.key
    }

    /// `0x`-prefixed hex of the raw scalar.
    pub fn private_key_hex(&self) -> String {
        format!("0x{}", alloy_primitives::hex::encode(self.key.to_bytes()))
    }
}

impl fmt::Debug for VirtualAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualAccount").field("address", &self.address).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn test_address_of_known_key() {
        let mut scalar = [0u8; 32];
        scalar[31] = 1;
        let key = SigningKey::from_slice(&scalar).unwrap();
        assert_eq!(address_of(&key), address!("7E5F4552091A69125d5DfCb7b8C2659029395Bdf"));
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let a = VirtualAccount::derive("pQECAyYgASFYIB").unwrap();
        let b = VirtualAccount::derive("pQECAyYgASFYIB").unwrap();
        assert_eq!(a.address(), b.address());
        assert_eq!(a.private_key_hex(), b.private_key_hex());
    }

    #[test]
    fn test_private_key_is_sha256_of_string() {
        let account = VirtualAccount::derive("abc").unwrap();
        // SHA-256("abc")
        assert_eq!(
            account.private_key_hex(),
            "0xba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_distinct_keys_for_distinct_strings() {
        let keys: Vec<String> = (0..32)
            .map(|i| VirtualAccount::derive(&format!("pk-{i}")).unwrap().private_key_hex())
            .collect();
        let unique: std::collections::HashSet<_> = keys.iter().collect();
        assert_eq!(unique.len(), keys.len());
    }

    #[test]
    fn test_debug_hides_private_key() {
        let account = VirtualAccount::derive("abc").unwrap();
        let dbg = format!("{account:?}");
        assert!(!dbg.contains("ba7816bf"), "debug output leaked the key: {dbg}");
    }
}
