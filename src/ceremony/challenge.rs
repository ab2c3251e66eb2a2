use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use super::CeremonyError;
use super::encoding::{b64url_decode, b64url_encode};

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 16;
const TAG_LEN: usize = 16;
/// issued_at(8) || nonce(16) || tag(16)
const CHALLENGE_LEN: usize = 8 + NONCE_LEN + TAG_LEN;
/// Tolerated clock skew for challenges that claim to come from the future.
const MAX_SKEW_MS: u64 = 5_000;

pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Issues self-describing challenges and redeems each one at most once.
///
/// A challenge carries its issue time and an HMAC over the relying party id,
/// so no per-challenge state exists until it is redeemed. Redeemed nonces are
/// remembered until they would have expired anyway.
pub struct ChallengeIssuer {
    secret: [u8; 32],
    timeout_ms: u64,
    clock: Arc<dyn Clock>,
    spent: Mutex<HashMap<[u8; NONCE_LEN], u64>>,
}

impl ChallengeIssuer {
    pub fn new(timeout_ms: u64) -> Self {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Self::with_secret(secret, timeout_ms, Arc::new(SystemClock))
    }

    pub fn with_secret(secret: [u8; 32], timeout_ms: u64, clock: Arc<dyn Clock>) -> Self {
        Self { secret, timeout_ms, clock, spent: Mutex::new(HashMap::new()) }
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn issue(&self, rp_id: &str) -> Result<String, CeremonyError> {
        let issued_at = self.clock.now_ms();
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        let tag = self.tag(rp_id, issued_at, &nonce)?;

        let mut raw = Vec::with_capacity(CHALLENGE_LEN);
        raw.extend_from_slice(&issued_at.to_be_bytes());
        raw.extend_from_slice(&nonce);
        raw.extend_from_slice(&tag[..TAG_LEN]);
        Ok(b64url_encode(&raw))
    }

    /// Consume `challenge`. Fails if it was not issued here for `rp_id`, is
    /// older than the ceremony timeout, or was already redeemed.
    pub fn redeem(&self, challenge: &str, rp_id: &str) -> Result<(), CeremonyError> {
        let raw = b64url_decode(challenge).map_err(|_| CeremonyError::UnknownChallenge)?;
        if raw.len() != CHALLENGE_LEN {
            return Err(CeremonyError::UnknownChallenge);
        }
        let issued_at = u64::from_be_bytes(raw[..8].try_into().unwrap_or_default());
        let nonce: [u8; NONCE_LEN] = raw[8..8 + NONCE_LEN]
            .try_into()
            .map_err(|_| CeremonyError::UnknownChallenge)?;

        let mut mac = self.mac()?;
        mac.update(rp_id.as_bytes());
        mac.update(&issued_at.to_be_bytes());
        mac.update(&nonce);
        mac.verify_truncated_left(&raw[8 + NONCE_LEN..])
            .map_err(|_| CeremonyError::UnknownChallenge)?;

        let now = self.clock.now_ms();
        if issued_at > now + MAX_SKEW_MS {
            return Err(CeremonyError::UnknownChallenge);
        }
        let age = now.saturating_sub(issued_at);
        if age > self.timeout_ms {
            tracing::warn!(age_ms = age, timeout_ms = self.timeout_ms, "Stale challenge");
            return Err(CeremonyError::StaleChallenge { age_ms: age });
        }

        let mut spent = self
            .spent
            .lock()
            .map_err(|_| CeremonyError::Internal("challenge set poisoned".into()))?;
        spent.retain(|_, expires| *expires > now);
        if spent.contains_key(&nonce) {
            return Err(CeremonyError::ChallengeReused);
        }
        spent.insert(nonce, issued_at + self.timeout_ms + MAX_SKEW_MS);
        Ok(())
    }

    pub fn spent_count(&self) -> usize {
        self.spent.lock().map(|s| s.len()).unwrap_or(0)
    }

    fn mac(&self) -> Result<HmacSha256, CeremonyError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|e| CeremonyError::Internal(e.to_string()))
    }

    fn tag(&self, rp_id: &str, issued_at: u64, nonce: &[u8]) -> Result<Vec<u8>, CeremonyError> {
        let mut mac = self.mac()?;
        mac.update(rp_id.as_bytes());
        mac.update(&issued_at.to_be_bytes());
        mac.update(nonce);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

/// Clock whose time is set by hand.
#[derive(Default)]
pub struct ManualClock(std::sync::atomic::AtomicU64);

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self(std::sync::atomic::AtomicU64::new(start_ms))
    }

    pub fn advance(&self, ms: u64) {
        self.0.fetch_add(ms, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> (ChallengeIssuer, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        (ChallengeIssuer::with_secret([7u8; 32], 60_000, clock.clone()), clock)
    }

    #[test]
    fn test_challenge_redeems_once() {
        let (issuer, _) = issuer();
        let c = issuer.issue("localhost").unwrap();
        issuer.redeem(&c, "localhost").unwrap();
        assert!(matches!(issuer.redeem(&c, "localhost"), Err(CeremonyError::ChallengeReused)));
    }

    #[test]
    fn test_challenge_bound_to_rp_id() {
        let (issuer, _) = issuer();
        let c = issuer.issue("localhost").unwrap();
        assert!(matches!(issuer.redeem(&c, "evil.example"), Err(CeremonyError::UnknownChallenge)));
    }

    #[test]
    fn test_challenge_from_other_issuer_rejected() {
        let (issuer, clock) = issuer();
        let other = ChallengeIssuer::with_secret([8u8; 32], 60_000, clock);
        let c = other.issue("localhost").unwrap();
        assert!(matches!(issuer.redeem(&c, "localhost"), Err(CeremonyError::UnknownChallenge)));
    }

    #[test]
    fn test_late_response_is_stale() {
        let (issuer, clock) = issuer();
        let c = issuer.issue("localhost").unwrap();
        clock.advance(60_001);
        assert!(matches!(
            issuer.redeem(&c, "localhost"),
            Err(CeremonyError::StaleChallenge { age_ms: 60_001 })
        ));
    }

    #[test]
    fn test_response_at_timeout_boundary_accepted() {
        let (issuer, clock) = issuer();
        let c = issuer.issue("localhost").unwrap();
        clock.advance(60_000);
        issuer.redeem(&c, "localhost").unwrap();
    }

    #[test]
    fn test_spent_set_is_reaped() {
        let (issuer, clock) = issuer();
        let c = issuer.issue("localhost").unwrap();
        issuer.redeem(&c, "localhost").unwrap();
        assert_eq!(issuer.spent_count(), 1);
        clock.advance(120_000);
        let c2 = issuer.issue("localhost").unwrap();
        issuer.redeem(&c2, "localhost").unwrap();
        assert_eq!(issuer.spent_count(), 1, "expired nonce must be reaped");
    }

    #[test]
    fn test_garbage_challenge_rejected() {
        let (issuer, _) = issuer();
        assert!(matches!(issuer.redeem("!!!", "localhost"), Err(CeremonyError::UnknownChallenge)));
        assert!(matches!(issuer.redeem("AAAA", "localhost"), Err(CeremonyError::UnknownChallenge)));
    }
}
