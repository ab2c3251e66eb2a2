use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::ceremony::encoding::bytes;
use crate::ceremony::{RegistrationInfo, StoredAuthenticator, Transport};

/// Who a credential belongs to: a token id (single-user mode) or a user
/// name (multi-session mode, e.g. `walletId-0`).
///
/// Serialized as a plain string; an all-digit string is a token id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Identity {
    Token(u64),
    User(String),
}

impl Identity {
    pub fn wallet_user(token_id: u64) -> Self {
        Identity::User(format!("walletId-{token_id}"))
    }

    /// File stem used on disk: hex of the string form.
    pub fn file_stem(&self) -> String {
        alloy_primitives::hex::encode(self.to_string())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Token(id) => write!(f, "{id}"),
            Identity::User(name) => f.write_str(name),
        }
    }
}

impl FromStr for Identity {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(id) = s.parse::<u64>() {
                return Ok(Identity::Token(id));
            }
        }
        Ok(Identity::User(s.to_string()))
    }
}

impl From<u64> for Identity {
    fn from(id: u64) -> Self {
        Identity::Token(id)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(identity) => identity,
            Err(never) => match never {},
        }
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Ok(Identity::from(s.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    pub version:               u8,
    pub identity:              Identity,
    #[serde(rename = "credentialID", with = "bytes")]
    pub credential_id:         Vec<u8>,
    /// COSE_Key bytes as returned by registration
    #[serde(with = "bytes")]
    pub credential_public_key: Vec<u8>,
    pub counter:               u32,
    #[serde(default)]
    pub transports:            Vec<Transport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aaguid:                Option<String>,
    pub created_at:            u64, // Unix timestamp
}

impl CredentialRecord {
    pub fn from_registration(identity: Identity, info: &RegistrationInfo) -> Self {
        let created_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Self {
            version: 1,
            identity,
            credential_id: info.credential_id.clone(),
            credential_public_key: info.credential_public_key.clone(),
            counter: info.counter,
            transports: info.transports.clone(),
            aaguid: Some(info.aaguid.clone()),
            created_at,
        }
    }

    /// The public-key string hashed by the binder and the key derivation.
    pub fn public_key_string(&self) -> String {
        crate::binder::public_key_string(&self.credential_public_key)
    }

    pub fn to_authenticator(&self) -> StoredAuthenticator {
        StoredAuthenticator {
            credential_id: self.credential_id.clone(),
            credential_public_key: self.credential_public_key.clone(),
            counter: self.counter,
            transports: self.transports.clone(),
        }
    }
}
