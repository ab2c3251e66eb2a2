use super::CeremonyError;
use super::cbor::parse_prefix;
use super::cose::CoseKey;

pub const FLAG_UP: u8 = 0x01;
pub const FLAG_UV: u8 = 0x04;
pub const FLAG_AT: u8 = 0x40;
pub const FLAG_ED: u8 = 0x80;

/// rpIdHash(32) + flags(1) + signCount(4)
const HEADER_LEN: usize = 37;

#[derive(Debug, Clone)]
pub struct AttestedCredential {
    pub aaguid: [u8; 16],
    pub credential_id: Vec<u8>,
    /// COSE_Key bytes exactly as they appeared in authenticatorData.
    pub public_key_cbor: Vec<u8>,
    pub public_key: CoseKey,
}

#[derive(Debug, Clone)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; 32],
    pub flags: u8,
    pub sign_count: u32,
    pub attested: Option<AttestedCredential>,
}

impl AuthenticatorData {
    pub fn user_present(&self) -> bool {
        self.flags & FLAG_UP != 0
    }

    pub fn user_verified(&self) -> bool {
        self.flags & FLAG_UV != 0
    }
}

impl TryFrom<&[u8]> for AuthenticatorData {
    type Error = CeremonyError;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        if data.len() < HEADER_LEN {
            return Err(CeremonyError::AuthenticatorData(format!(
                "{} bytes, need at least {HEADER_LEN}",
                data.len()
            )));
        }
        let mut rp_id_hash = [0u8; 32];
        rp_id_hash.copy_from_slice(&data[..32]);
        let flags = data[32];
        let sign_count = u32::from_be_bytes([data[33], data[34], data[35], data[36]]);

        let mut rest = &data[HEADER_LEN..];
        let attested = if flags & FLAG_AT != 0 {
            // aaguid(16) + credIdLen(2)
            if rest.len() < 18 {
                return Err(CeremonyError::AuthenticatorData(
                    "attested credential data truncated".into(),
                ));
            }
            let mut aaguid = [0u8; 16];
            aaguid.copy_from_slice(&rest[..16]);
            let id_len = u16::from_be_bytes([rest[16], rest[17]]) as usize;
            rest = &rest[18..];
            if rest.len() < id_len {
                return Err(CeremonyError::AuthenticatorData("credential id truncated".into()));
            }
            let credential_id = rest[..id_len].to_vec();
            rest = &rest[id_len..];

            let (value, used) = parse_prefix(rest)?;
            let public_key_cbor = rest[..used].to_vec();
            let public_key = CoseKey::from_value(&value)?;
            rest = &rest[used..];
            Some(AttestedCredential { aaguid, credential_id, public_key_cbor, public_key })
        } else {
            None
        };

        if flags & FLAG_ED != 0 {
            parse_prefix(rest)?;
        } else if !rest.is_empty() {
            return Err(CeremonyError::AuthenticatorData(format!(
                "{} trailing bytes",
                rest.len()
            )));
        }

        Ok(AuthenticatorData { rp_id_hash, flags, sign_count, attested })
    }
}

/// Build authenticatorData for a registration (AT set, includes credential data).
pub fn build_registration_auth_data(
    rp_id_hash: &[u8; 32],
    flags: u8,
    sign_count: u32,
    aaguid: &[u8; 16],
    credential_id: &[u8],
    cose_key: &[u8],
) -> Vec<u8> {
    let cred_id_len = credential_id.len() as u16;
    let mut data = Vec::new();
    data.extend_from_slice(rp_id_hash);
    data.push(flags | FLAG_AT);
    data.extend_from_slice(&sign_count.to_be_bytes());
    data.extend_from_slice(aaguid);
    data.extend_from_slice(&cred_id_len.to_be_bytes());
    data.extend_from_slice(credential_id);
    data.extend_from_slice(cose_key);
    data
}

/// Build authenticatorData for an assertion (no AT flag).
pub fn build_assertion_auth_data(rp_id_hash: &[u8; 32], flags: u8, sign_count: u32) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(rp_id_hash);
    data.push(flags & !FLAG_AT);
    data.extend_from_slice(&sign_count.to_be_bytes());
    data
}
