use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::CeremonyError;

pub const TYPE_CREATE: &str = "webauthn.create";
pub const TYPE_GET: &str = "webauthn.get";

/// The fields of clientDataJSON the relying party checks.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientData {
    #[serde(rename = "type")]
    pub kind: String,
    pub challenge: String,
    pub origin: String,
    #[serde(default)]
    pub cross_origin: bool,
}

impl ClientData {
    pub fn parse(raw: &[u8]) -> Result<Self, CeremonyError> {
        serde_json::from_slice(raw).map_err(|e| CeremonyError::ClientData(e.to_string()))
    }

    /// Check ceremony type, challenge and origin against what was issued.
    pub fn check(
        &self,
        expected_type: &str,
        expected_challenge: &str,
        expected_origin: &str,
    ) -> Result<(), CeremonyError> {
        if self.kind != expected_type {
            return Err(CeremonyError::WrongCeremonyType(self.kind.clone()));
        }
        if self.challenge.trim_end_matches('=') != expected_challenge.trim_end_matches('=') {
            return Err(CeremonyError::ChallengeMismatch);
        }
        if self.origin != expected_origin {
            return Err(CeremonyError::OriginMismatch(self.origin.clone()));
        }
        Ok(())
    }
}

pub fn client_data_hash(raw: &[u8]) -> [u8; 32] {
    Sha256::digest(raw).into()
}
