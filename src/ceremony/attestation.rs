use ciborium::value::Value;

use super::CeremonyError;
use super::authenticator_data::AuthenticatorData;
use super::cbor::{as_bytes, as_int, as_map, as_text, encode, get_str_key, parse_map};

pub const FMT_NONE: &str = "none";
pub const FMT_PACKED: &str = "packed";

#[derive(Debug, Clone)]
pub struct AttestationObject {
    pub fmt: String,
    pub att_stmt: Vec<(Value, Value)>,
    pub auth_data_raw: Vec<u8>,
    pub auth_data: AuthenticatorData,
}

impl TryFrom<&[u8]> for AttestationObject {
    type Error = CeremonyError;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        let map = parse_map(data)?;
        let fmt = get_str_key(&map, "fmt")
            .and_then(as_text)
            .ok_or(CeremonyError::MissingField("fmt"))?
            .to_string();
        let att_stmt = get_str_key(&map, "attStmt")
            .and_then(as_map)
            .ok_or(CeremonyError::MissingField("attStmt"))?
            .to_vec();
        let auth_data_raw = get_str_key(&map, "authData")
            .and_then(as_bytes)
            .ok_or(CeremonyError::MissingField("authData"))?
            .to_vec();
        let auth_data = AuthenticatorData::try_from(auth_data_raw.as_slice())?;
        Ok(AttestationObject { fmt, att_stmt, auth_data_raw, auth_data })
    }
}

impl AttestationObject {
    /// Check the attestation statement. Supports `none` and `packed`
    /// self-attestation, where the statement is signed by the credential key.
    pub fn verify_statement(&self, client_data_hash: &[u8; 32]) -> Result<(), CeremonyError> {
        match self.fmt.as_str() {
            FMT_NONE => {
                if self.att_stmt.is_empty() {
                    Ok(())
                } else {
                    Err(CeremonyError::Attestation("none format with non-empty statement".into()))
                }
            }
            FMT_PACKED => {
                if get_str_key(&self.att_stmt, "x5c").is_some() {
                    return Err(CeremonyError::Attestation(
                        "packed full attestation (x5c) is not supported".into(),
                    ));
                }
                let credential = self
                    .auth_data
                    .attested
                    .as_ref()
                    .ok_or(CeremonyError::MissingField("attestedCredentialData"))?;
                let alg = get_str_key(&self.att_stmt, "alg")
                    .and_then(as_int)
                    .ok_or(CeremonyError::MissingField("attStmt.alg"))?;
                if alg != credential.public_key.alg() {
                    return Err(CeremonyError::Attestation(format!(
                        "statement alg {alg} does not match credential alg {}",
                        credential.public_key.alg()
                    )));
                }
                let sig = get_str_key(&self.att_stmt, "sig")
                    .and_then(as_bytes)
                    .ok_or(CeremonyError::MissingField("attStmt.sig"))?;
                let mut signed = self.auth_data_raw.clone();
                signed.extend_from_slice(client_data_hash);
                credential.public_key.verify(&signed, sig)
            }
            other => Err(CeremonyError::Attestation(format!("unsupported format {other:?}"))),
        }
    }
}

/// Build a "packed" self-attestation object.
pub fn build_packed_attestation(
    auth_data: &[u8],
    alg: i64,
    der_sig: &[u8],
) -> Result<Vec<u8>, CeremonyError> {
    let map = Value::Map(vec![
        (Value::Text("fmt".to_string()), Value::Text(FMT_PACKED.to_string())),
        (
            Value::Text("attStmt".to_string()),
            Value::Map(vec![
                (Value::Text("alg".to_string()), Value::Integer(alg.into())),
                (Value::Text("sig".to_string()), Value::Bytes(der_sig.to_vec())),
            ]),
        ),
        (Value::Text("authData".to_string()), Value::Bytes(auth_data.to_vec())),
    ]);
    encode(&map)
}

/// Build a "none" attestation object.
pub fn build_none_attestation(auth_data: &[u8]) -> Result<Vec<u8>, CeremonyError> {
    let map = Value::Map(vec![
        (Value::Text("fmt".to_string()), Value::Text(FMT_NONE.to_string())),
        (Value::Text("attStmt".to_string()), Value::Map(vec![])),
        (Value::Text("authData".to_string()), Value::Bytes(auth_data.to_vec())),
    ]);
    encode(&map)
}
