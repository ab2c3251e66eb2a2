use ciborium::value::Value;
use sha2::Sha256;

use super::CeremonyError;
use super::cbor::{as_bytes, as_int, as_map, encode, get_int_key};

pub const ALG_ES256: i64 = -7;
pub const ALG_RS256: i64 = -257;

const KTY_EC2: i64 = 2;
const KTY_RSA: i64 = 3;
const CRV_P256: i64 = 1;

/// Credential public key decoded from its COSE_Key form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoseKey {
    Es256 { x: [u8; 32], y: [u8; 32] },
    Rs256 { n: Vec<u8>, e: Vec<u8> },
}

impl CoseKey {
    pub fn from_cbor(data: &[u8]) -> Result<Self, CeremonyError> {
        let map = super::cbor::parse_map(data)?;
        Self::from_map(&map)
    }

    pub(crate) fn from_value(value: &Value) -> Result<Self, CeremonyError> {
        let map = as_map(value).ok_or_else(|| CeremonyError::CoseKey("not a map".into()))?;
        Self::from_map(map)
    }

    fn from_map(map: &[(Value, Value)]) -> Result<Self, CeremonyError> {
        let int = |key: i64| get_int_key(map, key).and_then(as_int);
        let bytes = |key: i64| get_int_key(map, key).and_then(as_bytes);

        let kty = int(1).ok_or_else(|| CeremonyError::CoseKey("missing kty".into()))?;
        let alg = int(3).ok_or_else(|| CeremonyError::CoseKey("missing alg".into()))?;

        match (kty, alg) {
            (KTY_EC2, ALG_ES256) => {
                if int(-1) != Some(CRV_P256) {
                    return Err(CeremonyError::CoseKey("EC2 key is not on P-256".into()));
                }
                let x: [u8; 32] = bytes(-2)
                    .and_then(|b| b.try_into().ok())
                    .ok_or_else(|| CeremonyError::CoseKey("bad x coordinate".into()))?;
                let y: [u8; 32] = bytes(-3)
                    .and_then(|b| b.try_into().ok())
                    .ok_or_else(|| CeremonyError::CoseKey("bad y coordinate".into()))?;
                Ok(CoseKey::Es256 { x, y })
            }
            (KTY_RSA, ALG_RS256) => {
                let n = bytes(-1).ok_or_else(|| CeremonyError::CoseKey("missing modulus".into()))?;
                let e = bytes(-2).ok_or_else(|| CeremonyError::CoseKey("missing exponent".into()))?;
                Ok(CoseKey::Rs256 { n: n.to_vec(), e: e.to_vec() })
            }
            (_, alg) => Err(CeremonyError::UnsupportedAlgorithm(alg)),
        }
    }

    pub fn alg(&self) -> i64 {
        match self {
            CoseKey::Es256 { .. } => ALG_ES256,
            CoseKey::Rs256 { .. } => ALG_RS256,
        }
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>, CeremonyError> {
        match self {
            CoseKey::Es256 { x, y } => encode_es256(x, y),
            CoseKey::Rs256 { n, e } => encode_rs256(n, e),
        }
    }

    /// Check that the key material is usable: an ES256 point on P-256, or
    /// an RSA modulus and exponent the verifier accepts.
    pub fn validate(&self) -> Result<(), CeremonyError> {
        match self {
            CoseKey::Es256 { x, y } => es256_key(x, y).map(|_| ()),
            CoseKey::Rs256 { n, e } => rs256_key(n, e).map(|_| ()),
        }
    }

    /// Verify `signature` over `message` (the hash is applied here, per alg).
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), CeremonyError> {
        match self {
            CoseKey::Es256 { x, y } => {
                use p256::ecdsa::Signature;
                use p256::ecdsa::signature::Verifier;

                let key = es256_key(x, y)?;
                let sig = Signature::from_der(signature)
                    .map_err(|_| CeremonyError::BadSignature)?;
                key.verify(message, &sig).map_err(|_| CeremonyError::BadSignature)
            }
            CoseKey::Rs256 { n, e } => {
                use rsa::pkcs1v15::{Signature, VerifyingKey};
                use rsa::signature::Verifier;

                let key = rs256_key(n, e)?;
                let sig = Signature::try_from(signature).map_err(|_| CeremonyError::BadSignature)?;
                VerifyingKey::<Sha256>::new(key)
                    .verify(message, &sig)
                    .map_err(|_| CeremonyError::BadSignature)
            }
        }
    }
}

fn es256_key(x: &[u8; 32], y: &[u8; 32]) -> Result<p256::ecdsa::VerifyingKey, CeremonyError> {
    let mut sec1 = [0u8; 65];
    sec1[0] = 0x04;
    sec1[1..33].copy_from_slice(x);
    sec1[33..].copy_from_slice(y);
    p256::ecdsa::VerifyingKey::from_sec1_bytes(&sec1)
        .map_err(|_| CeremonyError::CoseKey("EC2 point is not on P-256".into()))
}

fn rs256_key(n: &[u8], e: &[u8]) -> Result<rsa::RsaPublicKey, CeremonyError> {
    use rsa::{BigUint, RsaPublicKey};

    RsaPublicKey::new(BigUint::from_bytes_be(n), BigUint::from_bytes_be(e))
        .map_err(|e| CeremonyError::CoseKey(e.to_string()))
}

/// Encode a P-256 public key as a COSE_Key CBOR map (kty=2, alg=-7, crv=1, x, y).
pub fn encode_es256(x: &[u8; 32], y: &[u8; 32]) -> Result<Vec<u8>, CeremonyError> {
    let map = Value::Map(vec![
        (Value::Integer(1i64.into()), Value::Integer(KTY_EC2.into())),
        (Value::Integer(3i64.into()), Value::Integer(ALG_ES256.into())),
        (Value::Integer((-1i64).into()), Value::Integer(CRV_P256.into())),
        (Value::Integer((-2i64).into()), Value::Bytes(x.to_vec())),
        (Value::Integer((-3i64).into()), Value::Bytes(y.to_vec())),
    ]);
    encode(&map)
}

/// Encode an RSA public key as a COSE_Key CBOR map (kty=3, alg=-257, n, e).
pub fn encode_rs256(n: &[u8], e: &[u8]) -> Result<Vec<u8>, CeremonyError> {
    let map = Value::Map(vec![
        (Value::Integer(1i64.into()), Value::Integer(KTY_RSA.into())),
        (Value::Integer(3i64.into()), Value::Integer(ALG_RS256.into())),
        (Value::Integer((-1i64).into()), Value::Bytes(n.to_vec())),
        (Value::Integer((-2i64).into()), Value::Bytes(e.to_vec())),
    ]);
    encode(&map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::signature::Signer;

    fn es256_pair() -> (p256::ecdsa::SigningKey, CoseKey) {
        let sk = p256::ecdsa::SigningKey::random(&mut rand::rngs::OsRng);
        let point = sk.verifying_key().to_encoded_point(false);
        let x: [u8; 32] = point.x().unwrap().as_slice().try_into().unwrap();
        let y: [u8; 32] = point.y().unwrap().as_slice().try_into().unwrap();
        (sk, CoseKey::Es256 { x, y })
    }

    #[test]
    fn test_cose_es256_fields_survive_encoding() {
        let (_, key) = es256_pair();
        let decoded = CoseKey::from_cbor(&key.to_cbor().unwrap()).unwrap();
        assert_eq!(decoded, key);
        assert_eq!(decoded.alg(), ALG_ES256);
    }

    #[test]
    fn test_es256_verify_accepts_der_signature() {
        let (sk, key) = es256_pair();
        let sig: p256::ecdsa::Signature = sk.sign(b"payload");
        key.verify(b"payload", sig.to_der().as_bytes()).unwrap();
    }

    #[test]
    fn test_es256_verify_rejects_other_message() {
        let (sk, key) = es256_pair();
        let sig: p256::ecdsa::Signature = sk.sign(b"payload");
        let err = key.verify(b"tampered", sig.to_der().as_bytes()).unwrap_err();
        assert!(matches!(err, CeremonyError::BadSignature));
    }

    #[test]
    fn test_rs256_verify() {
        use rsa::pkcs1v15::SigningKey;
        use rsa::signature::{SignatureEncoding, Signer as _};
        use rsa::traits::PublicKeyParts;

        let private = rsa::RsaPrivateKey::new(&mut rand::rngs::OsRng, 1024).unwrap();
        let public = private.to_public_key();
        let key = CoseKey::Rs256 {
            n: public.n().to_bytes_be(),
            e: public.e().to_bytes_be(),
        };
        let decoded = CoseKey::from_cbor(&key.to_cbor().unwrap()).unwrap();
        let sig = SigningKey::<Sha256>::new(private).sign(b"payload").to_vec();
        decoded.verify(b"payload", &sig).unwrap();
        assert!(decoded.verify(b"other", &sig).is_err());
    }

    #[test]
    fn test_validate_rejects_point_off_curve() {
        let (_, key) = es256_pair();
        key.validate().unwrap();

        let off_curve = CoseKey::Es256 { x: [0x11; 32], y: [0x22; 32] };
        let err = off_curve.validate().unwrap_err();
        assert!(matches!(err, CeremonyError::CoseKey(_)), "got {err}");
    }

    #[test]
    fn test_unsupported_algorithm_rejected() {
        // EdDSA OKP key
        let map = Value::Map(vec![
            (Value::Integer(1i64.into()), Value::Integer(1i64.into())),
            (Value::Integer(3i64.into()), Value::Integer((-8i64).into())),
        ]);
        let err = CoseKey::from_cbor(&encode(&map).unwrap()).unwrap_err();
        assert!(matches!(err, CeremonyError::UnsupportedAlgorithm(-8)));
    }
}
