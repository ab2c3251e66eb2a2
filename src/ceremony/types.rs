//! JSON payloads exchanged with the browser and the HTTP layer.
//!
//! Field names follow the WebAuthn JSON serialization (`clientDataJSON`,
//! `rawId`, `rpId`, ...). Binary fields accept every wire form a browser
//! client is known to send, see [`super::encoding::bytes`].

use serde::{Deserialize, Serialize};

use super::encoding::bytes;

pub const PUBLIC_KEY_TYPE: &str = "public-key";

/// Authenticator transport hint. Unknown values are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Transport {
    Usb,
    Nfc,
    Ble,
    Internal,
    Hybrid,
    Other(String),
}

impl From<String> for Transport {
    fn from(s: String) -> Self {
        match s.as_str() {
            "usb" => Transport::Usb,
            "nfc" => Transport::Nfc,
            "ble" => Transport::Ble,
            "internal" => Transport::Internal,
            "hybrid" => Transport::Hybrid,
            _ => Transport::Other(s),
        }
    }
}

impl From<Transport> for String {
    fn from(t: Transport) -> Self {
        match t {
            Transport::Usb => "usb".into(),
            Transport::Nfc => "nfc".into(),
            Transport::Ble => "ble".into(),
            Transport::Internal => "internal".into(),
            Transport::Hybrid => "hybrid".into(),
            Transport::Other(s) => s,
        }
    }
}

// ---- options ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelyingParty {
    pub name: String,
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    /// base64url of the user handle bytes
    pub id: String,
    pub name: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PubKeyCredParam {
    pub alg: i64,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialDescriptor {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transports: Vec<Transport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelection {
    pub resident_key: String,
    pub require_resident_key: bool,
    pub user_verification: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationOptions {
    pub challenge: String,
    pub rp: RelyingParty,
    pub user: UserEntity,
    pub pub_key_cred_params: Vec<PubKeyCredParam>,
    pub timeout: u64,
    pub attestation: String,
    pub exclude_credentials: Vec<CredentialDescriptor>,
    pub authenticator_selection: AuthenticatorSelection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationOptions {
    pub challenge: String,
    pub allow_credentials: Vec<CredentialDescriptor>,
    pub timeout: u64,
    pub user_verification: String,
    pub rp_id: String,
}

// ---- responses ----

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationResponseJson {
    #[serde(rename = "clientDataJSON", with = "bytes")]
    pub client_data_json: Vec<u8>,
    #[serde(with = "bytes")]
    pub attestation_object: Vec<u8>,
    #[serde(default)]
    pub transports: Vec<Transport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponseJson {
    pub id: String,
    #[serde(with = "bytes")]
    pub raw_id: Vec<u8>,
    pub response: AttestationResponseJson,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionResponseJson {
    #[serde(rename = "clientDataJSON", with = "bytes")]
    pub client_data_json: Vec<u8>,
    #[serde(with = "bytes")]
    pub authenticator_data: Vec<u8>,
    #[serde(with = "bytes")]
    pub signature: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_handle: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationResponseJson {
    pub id: String,
    #[serde(with = "bytes")]
    pub raw_id: Vec<u8>,
    pub response: AssertionResponseJson,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<String>,
}

/// Credential material the relying party keeps after registration and
/// hands back for every authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAuthenticator {
    #[serde(rename = "credentialID", with = "bytes")]
    pub credential_id: Vec<u8>,
    #[serde(with = "bytes")]
    pub credential_public_key: Vec<u8>,
    pub counter: u32,
    #[serde(default)]
    pub transports: Vec<Transport>,
}

// ---- verification results ----

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationInfo {
    pub fmt: String,
    pub counter: u32,
    pub aaguid: String,
    #[serde(rename = "credentialID", with = "bytes")]
    pub credential_id: Vec<u8>,
    #[serde(with = "bytes")]
    pub credential_public_key: Vec<u8>,
    pub credential_type: String,
    pub user_verified: bool,
    pub origin: String,
    #[serde(rename = "rpID")]
    pub rp_id: String,
    #[serde(default)]
    pub transports: Vec<Transport>,
}

impl RegistrationInfo {
    pub fn to_authenticator(&self) -> StoredAuthenticator {
        StoredAuthenticator {
            credential_id: self.credential_id.clone(),
            credential_public_key: self.credential_public_key.clone(),
            counter: self.counter,
            transports: self.transports.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationInfo {
    pub new_counter: u32,
    #[serde(rename = "credentialID", with = "bytes")]
    pub credential_id: Vec<u8>,
    pub user_verified: bool,
    pub origin: String,
    #[serde(rename = "rpID")]
    pub rp_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationVerification {
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_info: Option<RegistrationInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationVerification {
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication_info: Option<AuthenticationInfo>,
}

/// Format a 16-byte AAGUID in its canonical UUID form.
pub fn format_aaguid(aaguid: &[u8; 16]) -> String {
    let hex: String = aaguid.iter().map(|b| format!("{b:02x}")).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..]
    )
}
