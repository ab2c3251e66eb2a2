use sha2::{Digest, Sha256};

use super::CeremonyError;
use super::attestation::AttestationObject;
use super::authenticator_data::AuthenticatorData;
use super::challenge::ChallengeIssuer;
use super::client_data::{ClientData, TYPE_CREATE, TYPE_GET, client_data_hash};
use super::cose::CoseKey;
use super::types::{
    AuthenticationInfo, AuthenticationResponseJson, AuthenticationVerification, PUBLIC_KEY_TYPE,
    RegistrationInfo, RegistrationResponseJson, RegistrationVerification, StoredAuthenticator,
    format_aaguid,
};

/// What the relying party issued and expects back.
#[derive(Debug, Clone, Copy)]
pub struct Expected<'a> {
    pub challenge: &'a str,
    pub origin: &'a str,
    pub rp_id: &'a str,
}

/// Verify a registration response. Failures are reported through
/// `verified: false`; the reason is logged.
///
/// The expected challenge is consumed whatever the outcome.
pub fn complete_registration(
    issuer: &ChallengeIssuer,
    response: &RegistrationResponseJson,
    expected: Expected<'_>,
) -> RegistrationVerification {
    match verify_registration(issuer, response, expected) {
        Ok(info) => {
            tracing::info!(
                rp_id = expected.rp_id,
                fmt = %info.fmt,
                counter = info.counter,
                "Registration verified"
            );
            RegistrationVerification { verified: true, registration_info: Some(info) }
        }
        Err(e) => {
            tracing::warn!(rp_id = expected.rp_id, error = %e, "Registration rejected");
            RegistrationVerification { verified: false, registration_info: None }
        }
    }
}

/// Verify an authentication response against a stored credential.
pub fn complete_authentication(
    issuer: &ChallengeIssuer,
    response: &AuthenticationResponseJson,
    expected: Expected<'_>,
    stored: &StoredAuthenticator,
) -> AuthenticationVerification {
    match verify_authentication(issuer, response, expected, stored) {
        Ok(info) => {
            tracing::info!(rp_id = expected.rp_id, new_counter = info.new_counter, "Authentication verified");
            AuthenticationVerification { verified: true, authentication_info: Some(info) }
        }
        Err(e) => {
            tracing::warn!(rp_id = expected.rp_id, error = %e, "Authentication rejected");
            AuthenticationVerification { verified: false, authentication_info: None }
        }
    }
}

pub fn verify_registration(
    issuer: &ChallengeIssuer,
    response: &RegistrationResponseJson,
    expected: Expected<'_>,
) -> Result<RegistrationInfo, CeremonyError> {
    issuer.redeem(expected.challenge, expected.rp_id)?;

    if response.kind != PUBLIC_KEY_TYPE {
        return Err(CeremonyError::CredentialType(response.kind.clone()));
    }

    let raw_client_data = &response.response.client_data_json;
    let client_data = ClientData::parse(raw_client_data)?;
    client_data.check(TYPE_CREATE, expected.challenge, expected.origin)?;

    let attestation = AttestationObject::try_from(response.response.attestation_object.as_slice())?;
    check_flags(&attestation.auth_data, expected.rp_id)?;

    let credential = attestation
        .auth_data
        .attested
        .as_ref()
        .ok_or(CeremonyError::MissingField("attestedCredentialData"))?;
    if credential.credential_id != response.raw_id {
        return Err(CeremonyError::CredentialIdMismatch);
    }
    credential.public_key.validate()?;

    attestation.verify_statement(&client_data_hash(raw_client_data))?;

    Ok(RegistrationInfo {
        fmt: attestation.fmt.clone(),
        counter: attestation.auth_data.sign_count,
        aaguid: format_aaguid(&credential.aaguid),
        credential_id: credential.credential_id.clone(),
        credential_public_key: credential.public_key_cbor.clone(),
        credential_type: PUBLIC_KEY_TYPE.to_string(),
        user_verified: attestation.auth_data.user_verified(),
        origin: client_data.origin,
        rp_id: expected.rp_id.to_string(),
        transports: response.response.transports.clone(),
    })
}

pub fn verify_authentication(
    issuer: &ChallengeIssuer,
    response: &AuthenticationResponseJson,
    expected: Expected<'_>,
    stored: &StoredAuthenticator,
) -> Result<AuthenticationInfo, CeremonyError> {
    issuer.redeem(expected.challenge, expected.rp_id)?;

    if response.kind != PUBLIC_KEY_TYPE {
        return Err(CeremonyError::CredentialType(response.kind.clone()));
    }
    if response.raw_id != stored.credential_id {
        return Err(CeremonyError::CredentialIdMismatch);
    }

    let raw_client_data = &response.response.client_data_json;
    let client_data = ClientData::parse(raw_client_data)?;
    client_data.check(TYPE_GET, expected.challenge, expected.origin)?;

    let raw_auth_data = &response.response.authenticator_data;
    let auth_data = AuthenticatorData::try_from(raw_auth_data.as_slice())?;
    check_flags(&auth_data, expected.rp_id)?;

    let key = CoseKey::from_cbor(&stored.credential_public_key)?;
    let mut signed = raw_auth_data.clone();
    signed.extend_from_slice(&client_data_hash(raw_client_data));
    key.verify(&signed, &response.response.signature)?;

    // No exemption for authenticators that always report 0: a stored 0
    // followed by a reported 0 is refused like any other repeat.
    if auth_data.sign_count <= stored.counter {
        return Err(CeremonyError::CounterNotIncreased {
            stored: stored.counter,
            received: auth_data.sign_count,
        });
    }

    Ok(AuthenticationInfo {
        new_counter: auth_data.sign_count,
        credential_id: stored.credential_id.clone(),
        user_verified: auth_data.user_verified(),
        origin: client_data.origin,
        rp_id: expected.rp_id.to_string(),
    })
}

fn check_flags(auth_data: &AuthenticatorData, rp_id: &str) -> Result<(), CeremonyError> {
    let rp_id_hash: [u8; 32] = Sha256::digest(rp_id.as_bytes()).into();
    if auth_data.rp_id_hash != rp_id_hash {
        return Err(CeremonyError::RpIdMismatch);
    }
    if !auth_data.user_present() {
        return Err(CeremonyError::UserNotPresent);
    }
    if !auth_data.user_verified() {
        return Err(CeremonyError::UserNotVerified);
    }
    Ok(())
}
