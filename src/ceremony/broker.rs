use std::sync::Arc;

use super::CeremonyError;
use super::challenge::{ChallengeIssuer, Clock};
use super::options;
use super::types::{
    AuthenticationOptions, AuthenticationResponseJson, AuthenticationVerification,
    RegistrationOptions, RegistrationResponseJson, RegistrationVerification, StoredAuthenticator,
};
use super::verify::{self, Expected};

/// Issues ceremony options and verifies the browser's responses.
///
/// Holds no per-flow state: a challenge travels to the client and back,
/// and the caller persists whatever credential material verification returns.
pub struct Broker {
    rp_name: String,
    issuer: ChallengeIssuer,
}

impl Broker {
    pub fn new(rp_name: impl Into<String>, timeout_ms: u64) -> Self {
        Self { rp_name: rp_name.into(), issuer: ChallengeIssuer::new(timeout_ms) }
    }

    pub fn with_clock(
        rp_name: impl Into<String>,
        timeout_ms: u64,
        secret: [u8; 32],
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            rp_name: rp_name.into(),
            issuer: ChallengeIssuer::with_secret(secret, timeout_ms, clock),
        }
    }

    /// Ceremony timeout, also the lifetime of what a verified ceremony grants.
    pub fn timeout_ms(&self) -> u64 {
        self.issuer.timeout_ms()
    }

    pub fn now_ms(&self) -> u64 {
        self.issuer.now_ms()
    }

    pub fn begin_registration(
        &self,
        rp_id: &str,
        user_id: &str,
        user_name: &str,
    ) -> Result<RegistrationOptions, CeremonyError> {
        tracing::debug!(rp_id, user_name, "Issuing registration challenge");
        options::begin_registration(&self.issuer, &self.rp_name, rp_id, user_id, user_name)
    }

    pub fn begin_authentication(&self, rp_id: &str) -> Result<AuthenticationOptions, CeremonyError> {
        tracing::debug!(rp_id, "Issuing authentication challenge");
        options::begin_authentication(&self.issuer, rp_id)
    }

    pub fn complete_registration(
        &self,
        response: &RegistrationResponseJson,
        expected_challenge: &str,
        expected_origin: &str,
        rp_id: &str,
    ) -> RegistrationVerification {
        verify::complete_registration(
            &self.issuer,
            response,
            Expected { challenge: expected_challenge, origin: expected_origin, rp_id },
        )
    }

    pub fn complete_authentication(
        &self,
        response: &AuthenticationResponseJson,
        expected_challenge: &str,
        expected_origin: &str,
        rp_id: &str,
        stored: &StoredAuthenticator,
    ) -> AuthenticationVerification {
        verify::complete_authentication(
            &self.issuer,
            response,
            Expected { challenge: expected_challenge, origin: expected_origin, rp_id },
            stored,
        )
    }
}
