use ciborium::value::Value;

use super::CeremonyError;

pub(crate) fn parse_map(data: &[u8]) -> Result<Vec<(Value, Value)>, CeremonyError> {
    let value: Value =
        ciborium::from_reader(data).map_err(|e| CeremonyError::Cbor(e.to_string()))?;
    match value {
        Value::Map(map) => Ok(map),
        _ => Err(CeremonyError::Cbor("expected map".into())),
    }
}

/// Decode one CBOR item from the front of `data`; returns it with the number
/// of bytes it occupied.
pub(crate) fn parse_prefix(data: &[u8]) -> Result<(Value, usize), CeremonyError> {
    let mut cursor = std::io::Cursor::new(data);
    let value: Value =
        ciborium::from_reader(&mut cursor).map_err(|e| CeremonyError::Cbor(e.to_string()))?;
    Ok((value, cursor.position() as usize))
}

pub(crate) fn encode(value: &Value) -> Result<Vec<u8>, CeremonyError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| CeremonyError::Cbor(e.to_string()))?;
    Ok(buf)
}

pub(crate) fn get_int_key(map: &[(Value, Value)], key: i64) -> Option<&Value> {
    let target = Value::Integer(key.into());
    map.iter().find(|(k, _)| k == &target).map(|(_, v)| v)
}

pub(crate) fn get_str_key<'a>(map: &'a [(Value, Value)], key: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| matches!(k, Value::Text(s) if s == key))
        .map(|(_, v)| v)
}

pub(crate) fn as_bytes(v: &Value) -> Option<&[u8]> {
    match v { Value::Bytes(b) => Some(b), _ => None }
}

pub(crate) fn as_text(v: &Value) -> Option<&str> {
    match v { Value::Text(s) => Some(s), _ => None }
}

pub(crate) fn as_int(v: &Value) -> Option<i64> {
    match v {
        Value::Integer(i) => i64::try_from(i128::from(*i)).ok(),
        _ => None,
    }
}

pub(crate) fn as_map(v: &Value) -> Option<&[(Value, Value)]> {
    match v { Value::Map(m) => Some(m), _ => None }
}
