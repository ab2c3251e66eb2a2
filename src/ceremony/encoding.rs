use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::{Deserializer, Serializer};
use std::fmt;

use super::CeremonyError;

pub fn b64url_encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode base64url, tolerating trailing `=` padding.
pub fn b64url_decode(s: &str) -> Result<Vec<u8>, CeremonyError> {
    URL_SAFE_NO_PAD
        .decode(s.trim_end_matches('='))
        .map_err(|e| CeremonyError::Encoding(e.to_string()))
}

/// Serde adapter for binary credential material.
///
/// Serializes as base64url. Deserializes from base64url, from a JSON array of
/// bytes, or from an index-keyed object (`{"0": 165, "1": 1, ...}`), which is
/// how a browser `Uint8Array` looks after a naive `JSON.stringify`.
pub mod bytes {
    use super::*;

    pub fn serialize<S: Serializer>(value: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&b64url_encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        d.deserialize_any(BytesVisitor)
    }

    struct BytesVisitor;

    impl<'de> Visitor<'de> for BytesVisitor {
        type Value = Vec<u8>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("base64url string, byte array, or index-keyed byte object")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Vec<u8>, E> {
            b64url_decode(v).map_err(E::custom)
        }

        fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Vec<u8>, E> {
            Ok(v.to_vec())
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Vec<u8>, A::Error> {
            let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(b) = seq.next_element::<u8>()? {
                out.push(b);
            }
            Ok(out)
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Vec<u8>, A::Error> {
            let mut entries: Vec<(usize, u8)> = Vec::new();
            while let Some((k, v)) = map.next_entry::<String, u8>()? {
                let idx = k
                    .parse::<usize>()
                    .map_err(|_| de::Error::custom(format!("non-numeric byte index {k:?}")))?;
                entries.push((idx, v));
            }
            entries.sort_by_key(|(i, _)| *i);
            for (expected, (idx, _)) in entries.iter().enumerate() {
                if *idx != expected {
                    return Err(de::Error::custom("byte object has gaps"));
                }
            }
            Ok(entries.into_iter().map(|(_, b)| b).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Holder {
        #[serde(with = "bytes")]
        data: Vec<u8>,
    }

    #[test]
    fn test_bytes_from_all_wire_forms() {
        let expected = vec![0xa5u8, 0x01, 0x02];
        for json in [
            r#"{"data":"pQEC"}"#,
            r#"{"data":[165,1,2]}"#,
            r#"{"data":{"1":1,"0":165,"2":2}}"#,
        ] {
            let h: Holder = serde_json::from_str(json).unwrap();
            assert_eq!(h.data, expected, "wire form {json}");
        }
    }

    #[test]
    fn test_bytes_serialize_as_b64url() {
        let h = Holder { data: vec![0xfb, 0xff] };
        assert_eq!(serde_json::to_string(&h).unwrap(), r#"{"data":"-_8"}"#);
    }

    #[test]
    fn test_bytes_rejects_gappy_object() {
        let res: Result<Holder, _> = serde_json::from_str(r#"{"data":{"0":1,"2":2}}"#);
        assert!(res.is_err());
    }

    #[test]
    fn test_b64url_decode_tolerates_padding() {
        assert_eq!(b64url_decode("pQE=").unwrap(), vec![0xa5, 0x01]);
    }
}
