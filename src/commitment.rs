//! Commitment codec for sealed ballots.
//!
//! A commitment binds a voter to a yes/no choice without disclosing it:
//!
//! ```text
//! commit = keccak256(vote_byte || salt_be32)
//! ```
//!
//! `vote_byte` is `0x01` for yes and `0x00` for no, and the salt is the
//! 32-byte big-endian encoding of a 256-bit integer.  The layout matches the
//! Ethereum `keccak256(abi.encodePacked(bool, uint256))` packing, so a hash
//! produced here can be checked by an EVM contract and vice versa.
//!
//! ```
//! use sealed_ballot::{make_commit, verify_commit, Salt, Vote};
//!
//! let salt = Salt::from_bytes([0xAA; 32]);
//! let commit = make_commit(Vote::Yes, &salt);
//! assert!(verify_commit(Vote::Yes, &salt, &commit));
//! assert!(!verify_commit(Vote::No, &salt, &commit));
//! ```

use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Mutex;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Width in bytes of salts and commitment digests.
pub const DIGEST_LEN: usize = 32;

/// Errors raised while parsing codec values from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The input lacked the mandatory `0x` prefix.
    #[error("hex value must start with 0x")]
    MissingPrefix,
    /// The input was not valid hexadecimal.
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    /// The decoded value had the wrong width.
    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Required width in bytes.
        expected: usize,
        /// Width actually decoded.
        actual: usize,
    },
    /// The vote literal was not recognised.
    #[error("invalid vote {0:?}; expected yes/no")]
    InvalidVote(String),
    /// The phase literal was not recognised.
    #[error("invalid phase {0:?}; expected commit/reveal/completed")]
    InvalidPhase(String),
    /// The voter identifier was not a `0x`-prefixed 20-byte address.
    #[error("invalid voter address {0:?}")]
    InvalidVoter(String),
}

/// A binary ballot choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vote {
    /// In favour of the proposal.
    Yes,
    /// Against the proposal.
    No,
}

impl Vote {
    /// Maps the wire boolean onto a vote.
    pub fn from_bool(value: bool) -> Self {
        if value {
            Vote::Yes
        } else {
            Vote::No
        }
    }

    /// Returns the wire boolean.
    pub fn as_bool(self) -> bool {
        matches!(self, Vote::Yes)
    }

    fn packed(self) -> u8 {
        u8::from(self.as_bool())
    }
}

impl fmt::Display for Vote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Vote::Yes => "yes",
            Vote::No => "no",
        })
    }
}

impl FromStr for Vote {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yes" | "true" | "1" => Ok(Vote::Yes),
            "no" | "false" | "0" => Ok(Vote::No),
            _ => Err(CodecError::InvalidVote(s.to_string())),
        }
    }
}

fn encode_hex32(bytes: &[u8; DIGEST_LEN]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn decode_hex32(input: &str) -> Result<[u8; DIGEST_LEN], CodecError> {
    let trimmed = input.trim();
    let raw = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or(CodecError::MissingPrefix)?;
    let decoded = hex::decode(raw).map_err(|err| CodecError::InvalidHex(err.to_string()))?;
    <[u8; DIGEST_LEN]>::try_from(decoded.as_slice()).map_err(|_| CodecError::InvalidLength {
        expected: DIGEST_LEN,
        actual: decoded.len(),
    })
}

/// A 256-bit salt mixed into a commitment.
///
/// Salts stay secret until the reveal, so `Debug` never prints the bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Salt([u8; DIGEST_LEN]);

impl Salt {
    /// Wraps raw big-endian bytes.
    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Encodes a small integer as a big-endian `uint256`.
    pub fn from_u128(value: u128) -> Self {
        let mut bytes = [0u8; DIGEST_LEN];
        bytes[16..].copy_from_slice(&value.to_be_bytes());
        Self(bytes)
    }

    /// Returns the big-endian bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Returns the `0x`-prefixed hex form.
    pub fn to_hex(&self) -> String {
        encode_hex32(&self.0)
    }

    /// Parses the `0x`-prefixed hex form.
    pub fn from_hex(input: &str) -> Result<Self, CodecError> {
        decode_hex32(input).map(Self)
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Salt(..)")
    }
}

impl TryFrom<String> for Salt {
    type Error = CodecError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<Salt> for String {
    fn from(value: Salt) -> Self {
        value.to_hex()
    }
}

/// A 32-byte Keccak-256 commitment digest.
///
/// Equality is evaluated in constant time over the full width.
#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommitHash([u8; DIGEST_LEN]);

impl CommitHash {
    /// Wraps raw digest bytes.
    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns the digest bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Returns the conventional `0x` + 64 hex characters form.
    pub fn to_hex(&self) -> String {
        encode_hex32(&self.0)
    }

    /// Parses the `0x`-prefixed hex form (either case).
    pub fn from_hex(input: &str) -> Result<Self, CodecError> {
        decode_hex32(input).map(Self)
    }
}

impl PartialEq for CommitHash {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for CommitHash {}

impl Hash for CommitHash {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl fmt::Debug for CommitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitHash({})", self.to_hex())
    }
}

impl fmt::Display for CommitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl TryFrom<String> for CommitHash {
    type Error = CodecError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<CommitHash> for String {
    fn from(value: CommitHash) -> Self {
        value.to_hex()
    }
}

/// Builds the commitment for `(vote, salt)`.
pub fn make_commit(vote: Vote, salt: &Salt) -> CommitHash {
    let mut hasher = Keccak256::new();
    hasher.update([vote.packed()]);
    hasher.update(salt.as_bytes());
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(&hasher.finalize());
    CommitHash(out)
}

/// Recomputes the commitment and compares it with `commit`.
///
/// Any mismatch is a rejection; there is no partial match.
pub fn verify_commit(vote: Vote, salt: &Salt, commit: &CommitHash) -> bool {
    make_commit(vote, salt) == *commit
}

/// Source of fresh commitment salts.
pub trait SaltSource: Send + Sync {
    /// Returns a new salt.
    fn generate_salt(&self) -> Salt;
}

/// Salt source backed by the operating system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSaltSource;

impl SaltSource for OsSaltSource {
    fn generate_salt(&self) -> Salt {
        let mut bytes = [0u8; DIGEST_LEN];
        OsRng.fill_bytes(&mut bytes);
        Salt(bytes)
    }
}

/// Reproducible salt source for simulations and tests.
///
/// Never use this for real ballots: anyone who knows the seed can
/// brute-force the hidden votes.
#[derive(Debug)]
pub struct SeededSaltSource {
    rng: Mutex<StdRng>,
}

impl SeededSaltSource {
    /// Creates a source seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl SaltSource for SeededSaltSource {
    fn generate_salt(&self) -> Salt {
        let mut bytes = [0u8; DIGEST_LEN];
        let mut rng = self
            .rng
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        rng.fill_bytes(&mut bytes);
        Salt(bytes)
    }
}
