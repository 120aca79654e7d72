//! Voter identifiers.

use crate::commitment::CodecError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A voter address, normalised to lowercase `0x` + 40 hex characters.
///
/// Normalisation makes `(proposal, voter)` uniqueness independent of the
/// checksum casing a wallet happens to produce.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VoterId(String);

impl VoterId {
    /// Validates and normalises an address.
    pub fn parse(input: &str) -> Result<Self, CodecError> {
        normalize_address(input)
            .map(Self)
            .ok_or_else(|| CodecError::InvalidVoter(input.to_string()))
    }

    /// Returns the normalised address.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn normalize_address(value: &str) -> Option<String> {
    let trimmed = value.trim();
    let raw = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))?;
    if raw.len() != 40 || !raw.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("0x{}", raw.to_ascii_lowercase()))
}

impl fmt::Display for VoterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for VoterId {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VoterId {
    type Error = CodecError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VoterId> for String {
    fn from(value: VoterId) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_casing_is_normalised() {
        let a = VoterId::parse("0xAbCdEfabcdefABCDefAbcdefABcdefabCDefAb12").unwrap();
        let b = VoterId::parse("0XABCDEFABCDEFABCDEFABCDEFABCDEFABCDEFAB12").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "0xabcdefabcdefabcdefabcdefabcdefabcdefab12");
    }

    #[test]
    fn malformed_addresses_are_rejected() {
        assert!(VoterId::parse("abcdefabcdefabcdefabcdefabcdefabcdefab12").is_err());
        assert!(VoterId::parse("0x1234").is_err());
        assert!(VoterId::parse("0xgggggggggggggggggggggggggggggggggggggggg").is_err());
    }

    #[test]
    fn serde_rejects_invalid_addresses() {
        assert!(serde_json::from_str::<VoterId>("\"0x01\"").is_err());
        let ok: VoterId =
            serde_json::from_str("\"0x00000000000000000000000000000000000000AA\"").unwrap();
        assert_eq!(ok.as_str(), "0x00000000000000000000000000000000000000aa");
    }
}
