use super::CeremonyError;
use super::challenge::ChallengeIssuer;
use super::encoding::b64url_encode;
use super::types::{
    AuthenticationOptions, AuthenticatorSelection, PUBLIC_KEY_TYPE, PubKeyCredParam,
    RegistrationOptions, RelyingParty, UserEntity,
};
use crate::config::SUPPORTED_ALGORITHMS;

pub fn begin_registration(
    issuer: &ChallengeIssuer,
    rp_name: &str,
    rp_id: &str,
    user_id: &str,
    user_name: &str,
) -> Result<RegistrationOptions, CeremonyError> {
    let challenge = issuer.issue(rp_id)?;
    Ok(RegistrationOptions {
        challenge,
        rp: RelyingParty { name: rp_name.to_string(), id: rp_id.to_string() },
        user: UserEntity {
            id: b64url_encode(user_id.as_bytes()),
            name: user_name.to_string(),
            display_name: user_name.to_string(),
        },
        pub_key_cred_params: SUPPORTED_ALGORITHMS
            .iter()
            .map(|&alg| PubKeyCredParam { alg, kind: PUBLIC_KEY_TYPE.to_string() })
            .collect(),
        timeout: issuer.timeout_ms(),
        attestation: "none".to_string(),
        exclude_credentials: Vec::new(),
        authenticator_selection: AuthenticatorSelection {
            resident_key: "required".to_string(),
            require_resident_key: true,
            user_verification: "preferred".to_string(),
        },
    })
}

pub fn begin_authentication(
    issuer: &ChallengeIssuer,
    rp_id: &str,
) -> Result<AuthenticationOptions, CeremonyError> {
    Ok(AuthenticationOptions {
        challenge: issuer.issue(rp_id)?,
        allow_credentials: Vec::new(),
        timeout: issuer.timeout_ms(),
        user_verification: "required".to_string(),
        rp_id: rp_id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_options_shape() {
        let issuer = ChallengeIssuer::new(60_000);
        let opts = begin_registration(&issuer, "RP", "localhost", "default-id", "nft-bound-wallet")
            .unwrap();
        let json = serde_json::to_value(&opts).unwrap();
        assert_eq!(json["rp"]["id"], "localhost");
        assert_eq!(json["user"]["id"], b64url_encode(b"default-id"));
        assert_eq!(json["user"]["displayName"], "nft-bound-wallet");
        assert_eq!(json["pubKeyCredParams"][0]["alg"], -7);
        assert_eq!(json["pubKeyCredParams"][1]["alg"], -257);
        assert_eq!(json["timeout"], 60_000);
        assert_eq!(json["attestation"], "none");
        assert_eq!(json["authenticatorSelection"]["residentKey"], "required");
        assert_eq!(json["authenticatorSelection"]["requireResidentKey"], true);
    }

    #[test]
    fn test_authentication_options_require_uv() {
        let issuer = ChallengeIssuer::new(60_000);
        let opts = begin_authentication(&issuer, "localhost").unwrap();
        let json = serde_json::to_value(&opts).unwrap();
        assert_eq!(json["userVerification"], "required");
        assert_eq!(json["rpId"], "localhost");
        assert_eq!(json["timeout"], 60_000);
        assert!(json["allowCredentials"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_each_call_issues_fresh_challenge() {
        let issuer = ChallengeIssuer::new(60_000);
        let a = begin_authentication(&issuer, "localhost").unwrap();
        let b = begin_authentication(&issuer, "localhost").unwrap();
        assert_ne!(a.challenge, b.challenge);
    }
}
