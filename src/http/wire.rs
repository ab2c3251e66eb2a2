//! Request and response bodies of the HTTP endpoints.
//!
//! The `/generate-auth` and `/verify-auth` responses tag registration with a
//! `type` key and authentication with a `text` key. Existing clients read
//! those keys, so the asymmetry stays.

use alloy_primitives::Address;
use serde::{Deserialize, Deserializer, Serialize};

use crate::ceremony::{
    AuthenticationOptions, AuthenticationVerification, RegistrationOptions,
    RegistrationVerification, StoredAuthenticator,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CeremonyKind {
    Register,
    Auth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateAuthRequest {
    #[serde(rename = "type")]
    pub kind: CeremonyKind,
    #[serde(rename = "rpID")]
    pub rp_id: String,
    #[serde(rename = "userID", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(rename = "userName", default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GenerateAuthResponse {
    Register {
        #[serde(rename = "type")]
        kind: String,
        options: RegistrationOptions,
    },
    Auth {
        text: String,
        options: AuthenticationOptions,
    },
}

impl GenerateAuthResponse {
    pub fn register(options: RegistrationOptions) -> Self {
        GenerateAuthResponse::Register { kind: "register".into(), options }
    }

    pub fn auth(options: AuthenticationOptions) -> Self {
        GenerateAuthResponse::Auth { text: "auth".into(), options }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyAuthRequest {
    #[serde(rename = "type")]
    pub kind: CeremonyKind,
    #[serde(rename = "rpID")]
    pub rp_id: String,
    /// Registration or authentication response JSON, typed by `kind`.
    pub auth_response: serde_json::Value,
    pub expected_challenge: String,
    pub expected_origin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator: Option<StoredAuthenticator>,
    /// Registry identity to store the credential under, or to authenticate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VerifyAuthResponse {
    Register {
        #[serde(rename = "type")]
        kind: String,
        verification: RegistrationVerification,
    },
    Auth {
        text: String,
        verification: AuthenticationVerification,
    },
}

impl VerifyAuthResponse {
    pub fn register(verification: RegistrationVerification) -> Self {
        VerifyAuthResponse::Register { kind: "register".into(), verification }
    }

    pub fn auth(verification: AuthenticationVerification) -> Self {
        VerifyAuthResponse::Auth { text: "auth".into(), verification }
    }

    pub fn verified(&self) -> bool {
        match self {
            VerifyAuthResponse::Register { verification, .. } => verification.verified,
            VerifyAuthResponse::Auth { verification, .. } => verification.verified,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    pub pub_key: String,
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aaguid: Option<String>,
    #[serde(deserialize_with = "u64_from_str_or_number")]
    pub token_id: u64,
    pub recipient: Address,
    #[serde(deserialize_with = "string_from_str_or_number")]
    pub amount: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_data: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    pub status: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PubKeyRequest {
    pub pub_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountResponse {
    pub message: String,
    pub address: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintResponse {
    pub message: String,
    pub token_id: String,
    pub wallet: Address,
    pub block_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StrOrNumber {
    Str(String),
    Number(serde_json::Number),
}

fn u64_from_str_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    match StrOrNumber::deserialize(d)? {
        StrOrNumber::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
        StrOrNumber::Number(n) => n
            .as_u64()
            .ok_or_else(|| serde::de::Error::custom(format!("{n} is not a token id"))),
    }
}

fn string_from_str_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match StrOrNumber::deserialize(d)? {
        StrOrNumber::Str(s) => s,
        StrOrNumber::Number(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_request_accepts_numbers_and_strings() {
        let req: ExecuteRequest = serde_json::from_str(
            r#"{"pubKey":"pk","userName":"walletId-0","tokenId":"3",
                "recipient":"0x00000000000000000000000000000000000000bb","amount":0.5}"#,
        )
        .unwrap();
        assert_eq!(req.token_id, 3);
        assert_eq!(req.amount, "0.5");
        assert!(req.call_data.is_none());

        let req: ExecuteRequest = serde_json::from_str(
            r#"{"pubKey":"pk","userName":"u","tokenId":7,
                "recipient":"0x00000000000000000000000000000000000000bb","amount":"1","callData":"0x"}"#,
        )
        .unwrap();
        assert_eq!(req.token_id, 7);
    }

    #[test]
    fn test_generate_response_key_asymmetry() {
        let json = r#"{"text":"auth","options":{"challenge":"c","allowCredentials":[],
            "timeout":60000,"userVerification":"required","rpId":"localhost"}}"#;
        let resp: GenerateAuthResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(resp, GenerateAuthResponse::Auth { .. }));
        let out = serde_json::to_value(&resp).unwrap();
        assert_eq!(out["text"], "auth");
        assert!(out.get("type").is_none());
    }

    #[test]
    fn test_request_kind_rejects_unknown() {
        let res: Result<GenerateAuthRequest, _> =
            serde_json::from_str(r#"{"type":"login","rpID":"localhost"}"#);
        assert!(res.is_err());
    }
}
