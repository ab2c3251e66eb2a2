//! One-shot authorizations handed out by a verified assertion and spent by
//! a single `/execute`.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::store::Identity;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum GrantError {
    #[error("no fresh assertion for this identity")]
    Missing,
    #[error("assertion expired")]
    Expired,
    #[error("assertion was made with a different credential")]
    CredentialMismatch,
    #[error("grant table poisoned")]
    Poisoned,
}

struct Grant {
    public_key: String,
    expires_ms: u64,
}

/// At most one outstanding grant per identity; a newer assertion replaces
/// the older grant.
#[derive(Default)]
pub struct Grants {
    issued: Mutex<HashMap<Identity, Grant>>,
}

impl Grants {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self, identity: Identity, public_key: String, now_ms: u64, ttl_ms: u64) -> Result<(), GrantError> {
        let mut issued = self.issued.lock().map_err(|_| GrantError::Poisoned)?;
        issued.retain(|_, grant| grant.expires_ms > now_ms);
        tracing::debug!(identity = %identity, "Execute grant issued");
        issued.insert(identity, Grant { public_key, expires_ms: now_ms.saturating_add(ttl_ms) });
        Ok(())
    }

    /// Spend the grant for `identity`. The grant is consumed whatever the
    /// outcome.
    pub fn redeem(&self, identity: &Identity, public_key: &str, now_ms: u64) -> Result<(), GrantError> {
        let mut issued = self.issued.lock().map_err(|_| GrantError::Poisoned)?;
        let grant = issued.remove(identity).ok_or(GrantError::Missing)?;
        issued.retain(|_, grant| grant.expires_ms > now_ms);
        if grant.expires_ms <= now_ms {
            return Err(GrantError::Expired);
        }
        if grant.public_key != public_key {
            return Err(GrantError::CredentialMismatch);
        }
        Ok(())
    }

    pub fn outstanding(&self) -> usize {
        self.issued.lock().map(|g| g.len()).unwrap_or(0)
    }
}
