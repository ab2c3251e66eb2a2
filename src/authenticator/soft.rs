use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use super::{Authenticator, AuthenticatorError};
use crate::ceremony::attestation::{build_none_attestation, build_packed_attestation};
use crate::ceremony::authenticator_data::{
    FLAG_UP, FLAG_UV, build_assertion_auth_data, build_registration_auth_data,
};
use crate::ceremony::client_data::{TYPE_CREATE, TYPE_GET};
use crate::ceremony::cose::{ALG_ES256, encode_es256};
use crate::ceremony::encoding::{b64url_decode, b64url_encode};
use crate::ceremony::types::{
    AssertionResponseJson, AttestationResponseJson, PUBLIC_KEY_TYPE, Transport,
};
use crate::ceremony::{
    AuthenticationOptions, AuthenticationResponseJson, RegistrationOptions,
    RegistrationResponseJson,
};

#[derive(Clone)]
struct SoftCredential {
    id:          Vec<u8>,
    rp_id:       String,
    user_handle: Vec<u8>,
    key:         SigningKey,
    created_at:  u64,
}

/// In-process P-256 authenticator holding resident credentials in memory.
///
/// Shares one signature counter across credentials, incremented on every
/// assertion. User presence and verification are always asserted unless
/// the flags are overridden.
pub struct SoftAuthenticator {
    aaguid:      [u8; 16],
    flags:       u8,
    packed:      bool,
    counter:     AtomicU32,
    credentials: Mutex<Vec<SoftCredential>>,
    sequence:    AtomicU32,
}

impl Default for SoftAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftAuthenticator {
    pub fn new() -> Self {
        Self {
            aaguid:      [0u8; 16],
            flags:       FLAG_UP | FLAG_UV,
            packed:      false,
            counter:     AtomicU32::new(0),
            credentials: Mutex::new(Vec::new()),
            sequence:    AtomicU32::new(0),
        }
    }

    pub fn with_flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    /// Emit "packed" self-attestation instead of "none".
    pub fn with_packed_attestation(mut self) -> Self {
        self.packed = true;
        self
    }

    pub fn with_aaguid(mut self, aaguid: [u8; 16]) -> Self {
        self.aaguid = aaguid;
        self
    }

    pub fn set_counter(&self, value: u32) {
        self.counter.store(value, Ordering::SeqCst);
    }

    pub fn credential_count(&self) -> usize {
        self.credentials.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn create(
        &self,
        options: &RegistrationOptions,
        origin: &str,
    ) -> Result<RegistrationResponseJson, AuthenticatorError> {
        if !options.pub_key_cred_params.iter().any(|p| p.alg == ALG_ES256) {
            return Err(AuthenticatorError::UnsupportedAlgorithm);
        }

        let rp_id = options.rp.id.as_str();
        let rp_id_hash: [u8; 32] = Sha256::digest(rp_id.as_bytes()).into();
        {
            let creds = self.lock()?;
            for excluded in &options.exclude_credentials {
                let id = b64url_decode(&excluded.id)?;
                if creds.iter().any(|c| c.id == id && c.rp_id == rp_id) {
                    return Err(AuthenticatorError::CredentialExcluded);
                }
            }
        }

        let cred_id: [u8; 32] = rand::thread_rng().r#gen();
        let key = SigningKey::random(&mut rand::rngs::OsRng);
        let point = key.verifying_key().to_encoded_point(false);
        let (x, y) = match (point.x(), point.y()) {
            (Some(x), Some(y)) => (x, y),
            _ => return Err(AuthenticatorError::Internal("identity point".into())),
        };
        let x: [u8; 32] = x.as_slice().try_into().map_err(|_| AuthenticatorError::Internal("x".into()))?;
        let y: [u8; 32] = y.as_slice().try_into().map_err(|_| AuthenticatorError::Internal("y".into()))?;
        let cose = encode_es256(&x, &y)?;

        let sign_count = self.counter.load(Ordering::SeqCst);
        let auth_data = build_registration_auth_data(
            &rp_id_hash,
            self.flags,
            sign_count,
            &self.aaguid,
            &cred_id,
            &cose,
        );
        let client_data_json = client_data(TYPE_CREATE, &options.challenge, origin)?;

        let attestation_object = if self.packed {
            let mut to_sign = auth_data.clone();
            to_sign.extend_from_slice(&Sha256::digest(&client_data_json));
            let sig: Signature = key.sign(&to_sign);
            build_packed_attestation(&auth_data, ALG_ES256, sig.to_der().as_bytes())?
        } else {
            build_none_attestation(&auth_data)?
        };

        let user_handle = b64url_decode(&options.user.id)?;
        let created_at = self.sequence.fetch_add(1, Ordering::SeqCst) as u64;
        self.lock()?.push(SoftCredential {
            id: cred_id.to_vec(),
            rp_id: rp_id.to_string(),
            user_handle,
            key,
            created_at,
        });
        tracing::debug!(rp_id, user = %options.user.name, "Soft credential created");

        Ok(RegistrationResponseJson {
            id: b64url_encode(&cred_id),
            raw_id: cred_id.to_vec(),
            response: AttestationResponseJson {
                client_data_json,
                attestation_object,
                transports: vec![Transport::Internal],
            },
            kind: PUBLIC_KEY_TYPE.to_string(),
            authenticator_attachment: Some("platform".to_string()),
        })
    }

    pub fn get(
        &self,
        options: &AuthenticationOptions,
        origin: &str,
    ) -> Result<AuthenticationResponseJson, AuthenticatorError> {
        let rp_id = options.rp_id.as_str();
        let cred = {
            let creds = self.lock()?;
            let found = if !options.allow_credentials.is_empty() {
                let mut allowed = Vec::new();
                for d in &options.allow_credentials {
                    allowed.push(b64url_decode(&d.id)?);
                }
                creds
                    .iter()
                    .filter(|c| c.rp_id == rp_id && allowed.contains(&c.id))
                    .max_by_key(|c| c.created_at)
            } else {
                // discoverable flow: most recent credential for the rp
                creds.iter().filter(|c| c.rp_id == rp_id).max_by_key(|c| c.created_at)
            };
            found
                .cloned()
                .ok_or_else(|| AuthenticatorError::NoCredentials(rp_id.to_string()))?
        };

        let counter = self.counter.fetch_add(1, Ordering::SeqCst).wrapping_add(1);
        tracing::debug!(count = counter, "Counter incremented");

        let rp_id_hash: [u8; 32] = Sha256::digest(rp_id.as_bytes()).into();
        let authenticator_data = build_assertion_auth_data(&rp_id_hash, self.flags, counter);
        let client_data_json = client_data(TYPE_GET, &options.challenge, origin)?;

        let mut to_sign = authenticator_data.clone();
        to_sign.extend_from_slice(&Sha256::digest(&client_data_json));
        let sig: Signature = cred.key.sign(&to_sign);

        Ok(AuthenticationResponseJson {
            id: b64url_encode(&cred.id),
            raw_id: cred.id.clone(),
            response: AssertionResponseJson {
                client_data_json,
                authenticator_data,
                signature: sig.to_der().as_bytes().to_vec(),
                user_handle: Some(b64url_encode(&cred.user_handle)),
            },
            kind: PUBLIC_KEY_TYPE.to_string(),
            authenticator_attachment: Some("platform".to_string()),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<SoftCredential>>, AuthenticatorError> {
        self.credentials
            .lock()
            .map_err(|_| AuthenticatorError::Internal("credential list poisoned".into()))
    }
}

#[async_trait::async_trait]
impl Authenticator for SoftAuthenticator {
    async fn make_credential(
        &self,
        options: &RegistrationOptions,
        origin: &str,
    ) -> Result<RegistrationResponseJson, AuthenticatorError> {
        self.create(options, origin)
    }

    async fn get_assertion(
        &self,
        options: &AuthenticationOptions,
        origin: &str,
    ) -> Result<AuthenticationResponseJson, AuthenticatorError> {
        self.get(options, origin)
    }
}

fn client_data(kind: &str, challenge: &str, origin: &str) -> Result<Vec<u8>, AuthenticatorError> {
    serde_json::to_vec(&serde_json::json!({
        "type": kind,
        "challenge": challenge,
        "origin": origin,
        "crossOrigin": false,
    }))
    .map_err(|e| AuthenticatorError::Internal(e.to_string()))
}
