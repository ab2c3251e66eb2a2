use alloy_primitives::{Address, Bytes, U256};
use std::str::FromStr;

use crate::store::Identity;

/// Fractional ether digits kept before conversion to wei.
const AMOUNT_DECIMALS: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum IntentError {
    #[error("Invalid amount {0:?}")]
    Amount(String),
    #[error("Invalid call data {0:?}")]
    CallData(String),
    #[error("Invalid address {0:?}")]
    Address(String),
}

/// A transfer request from the bound wallet of `token_id`.
///
/// `identity` names the credential that must authenticate it and `sender`
/// is the account that submits `execute`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionIntent {
    pub identity:  Identity,
    pub token_id:  u64,
    pub sender:    Address,
    pub recipient: Address,
    pub value:     U256,
    pub data:      Bytes,
}

impl TransactionIntent {
    /// Build an intent from user input: an ether amount string and
    /// optional hex call data.
    pub fn from_input(
        identity: Identity,
        token_id: u64,
        sender: Address,
        recipient: &str,
        amount: &str,
        call_data: Option<&str>,
    ) -> Result<Self, IntentError> {
        let recipient =
            Address::from_str(recipient.trim()).map_err(|_| IntentError::Address(recipient.to_string()))?;
        Ok(Self {
            identity,
            token_id,
            sender,
            recipient,
            value: parse_amount(amount)?,
            data: normalize_call_data(call_data)?,
        })
    }
}

/// Parse a decimal ether amount into wei, rounding half-up to 12 fractional
/// digits first.
pub fn parse_amount(amount: &str) -> Result<U256, IntentError> {
    let bad = || IntentError::Amount(amount.to_string());
    let s = amount.trim();
    let s = s.strip_prefix('+').unwrap_or(s);
    let (int_part, frac_part) = s.split_once('.').unwrap_or((s, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(bad());
    }
    if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }

    let scale = U256::from(10u64).pow(U256::from(AMOUNT_DECIMALS));
    let int_value = if int_part.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(int_part, 10).map_err(|_| bad())?
    };

    let kept = &frac_part[..frac_part.len().min(AMOUNT_DECIMALS)];
    let mut frac_value = U256::ZERO;
    for b in kept.bytes() {
        frac_value = frac_value * U256::from(10u8) + U256::from(b - b'0');
    }
    frac_value *= U256::from(10u64).pow(U256::from(AMOUNT_DECIMALS - kept.len()));
    if frac_part.as_bytes().get(AMOUNT_DECIMALS).is_some_and(|d| *d >= b'5') {
        frac_value += U256::from(1u8);
    }

    let units = int_value
        .checked_mul(scale)
        .and_then(|v| v.checked_add(frac_value))
        .ok_or_else(bad)?;
    // 12 kept digits, 18 wei decimals
    units.checked_mul(U256::from(1_000_000u64)).ok_or_else(bad)
}

/// Normalize call data: absent or empty becomes `0x` (no bytes).
pub fn normalize_call_data(call_data: Option<&str>) -> Result<Bytes, IntentError> {
    let raw = call_data.map(str::trim).unwrap_or("");
    if raw.is_empty() || raw == "0x" {
        return Ok(Bytes::new());
    }
    Bytes::from_str(raw).map_err(|_| IntentError::CallData(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::utils::parse_ether;

    #[test]
    fn test_parse_amount_matches_parse_ether() {
        for s in ["1", "0.5", "10", "0.000000000001", "123.456"] {
            assert_eq!(parse_amount(s).unwrap(), parse_ether(s).unwrap(), "{s}");
        }
        assert_eq!(parse_amount(".25").unwrap(), parse_ether("0.25").unwrap());
    }

    #[test]
    fn test_parse_amount_rounds_to_twelve_digits() {
        // 0.0000000000004 rounds down, 0.0000000000005 rounds up
        assert_eq!(parse_amount("0.0000000000004").unwrap(), U256::ZERO);
        assert_eq!(parse_amount("0.0000000000005").unwrap(), U256::from(1_000_000u64));
        assert_eq!(
            parse_amount("0.9999999999995").unwrap(),
            parse_ether("1").unwrap(),
            "rounding carries into the integer part"
        );
    }

    #[test]
    fn test_parse_amount_rejects_garbage() {
        for s in ["", ".", "-1", "1e3", "abc", "1.2.3", "0x10"] {
            assert!(parse_amount(s).is_err(), "{s:?} must be rejected");
        }
    }

    #[test]
    fn test_empty_call_data_normalizes_to_0x() {
        assert_eq!(normalize_call_data(None).unwrap(), Bytes::new());
        assert_eq!(normalize_call_data(Some("")).unwrap(), Bytes::new());
        assert_eq!(normalize_call_data(Some("0x")).unwrap().to_string(), "0x");
        assert_eq!(normalize_call_data(Some("0xdeadbeef")).unwrap().len(), 4);
        assert!(normalize_call_data(Some("0xabc")).is_err());
        assert!(normalize_call_data(Some("0xzz")).is_err());
    }

    #[test]
    fn test_intent_from_input() {
        let intent = TransactionIntent::from_input(
            Identity::Token(0),
            0,
            Address::ZERO,
            "0x00000000000000000000000000000000000000bb",
            "1",
            None,
        )
        .unwrap();
        assert_eq!(intent.value, parse_ether("1").unwrap());
        assert!(intent.data.is_empty());
        assert!(
            TransactionIntent::from_input(Identity::Token(0), 0, Address::ZERO, "bob", "1", None).is_err()
        );
    }
}
