// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Identifier and hashing utilities.
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use sha2::{Digest, Sha256};

/// Opaque part identifier, unique across the union of all shards.
///
/// Backed by `Arc<str>` so the arena, the quantity rows and the emitted
/// results can share one allocation per part.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct PartId(Arc<str>);

impl PartId {
    /// Creates a part id from any string-like value.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// UTF-8 bytes of the id, as mixed into salted hash contributions.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for PartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartId({:?})", &*self.0)
    }
}

impl fmt::Display for PartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for PartId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PartId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PartId {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

/// One of the three horizontally partitioned stores.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ShardId {
    /// Shard `A`.
    A,
    /// Shard `B`.
    B,
    /// Shard `C`.
    C,
}

impl ShardId {
    /// All shards in canonical (UNION ALL) order.
    pub const ALL: [Self; 3] = [Self::A, Self::B, Self::C];

    /// Single-letter table prefix (`A_cfpval`, `B_parts_tree`, ...).
    pub fn prefix(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
        }
    }

    /// Shard-qualified table name, e.g. `table("cfpval")` → `A_cfpval`.
    pub fn table(self, base: &str) -> String {
        format!("{}_{base}", self.prefix())
    }

    /// Dense index in [`ShardId::ALL`].
    pub fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
            Self::C => 2,
        }
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Error returned when an assembler string names no known shard.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("[SHARD_ID] unknown shard: {0:?}")]
pub struct UnknownShard(pub String);

impl FromStr for ShardId {
    type Err = UnknownShard;

    /// Accepts `A`/`B`/`C` in any case, and the historical host-style names
    /// (`postgresA`, `ubuntuB`, ...) whose last character names the shard.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let tail = trimmed.chars().last();
        let accepted = trimmed.len() == 1
            || trimmed
                .strip_suffix(|c: char| c.is_ascii_uppercase())
                .is_some_and(|head| head.chars().all(|c| c.is_ascii_lowercase()));
        match (accepted, tail.map(|c| c.to_ascii_uppercase())) {
            (true, Some('A')) => Ok(Self::A),
            (true, Some('B')) => Ok(Self::B),
            (true, Some('C')) => Ok(Self::C),
            _ => Err(UnknownShard(s.to_owned())),
        }
    }
}

/// 256-bit parts-tree hash, stored as big-endian bytes.
///
/// Integer XOR on the 256-bit value is byte-wise XOR on this representation,
/// so the fold in the hash engine never has to leave byte space.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PartHash(pub [u8; 32]);

impl PartHash {
    /// The all-zero value (XOR identity).
    pub const ZERO: Self = Self([0; 32]);

    /// SHA-256 of `bytes`, read as a big-endian integer.
    pub fn sha256(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    /// Big-endian byte view.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase, zero-padded 64 digit hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a 64 digit hex string (either case).
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut out = [0u8; 32];
        hex::decode_to_slice(s, &mut out)?;
        Ok(Self(out))
    }
}

impl std::ops::BitXor for PartHash {
    type Output = Self;

    fn bitxor(mut self, rhs: Self) -> Self {
        self ^= rhs;
        self
    }
}

impl std::ops::BitXorAssign for PartHash {
    fn bitxor_assign(&mut self, rhs: Self) {
        for (a, b) in self.0.iter_mut().zip(rhs.0) {
            *a ^= b;
        }
    }
}

impl fmt::Debug for PartHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartHash({})", self.to_hex())
    }
}

impl fmt::Display for PartHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for PartHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for PartHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn shard_id_parses_letters_and_host_names() {
        assert_eq!("A".parse::<ShardId>().unwrap(), ShardId::A);
        assert_eq!("b".parse::<ShardId>().unwrap(), ShardId::B);
        assert_eq!(" C ".parse::<ShardId>().unwrap(), ShardId::C);
        assert_eq!("postgresA".parse::<ShardId>().unwrap(), ShardId::A);
        assert_eq!("ubuntuC".parse::<ShardId>().unwrap(), ShardId::C);
        assert!("D".parse::<ShardId>().is_err());
        assert!("".parse::<ShardId>().is_err());
        assert!("postgresa".parse::<ShardId>().is_err());
        assert!("AB".parse::<ShardId>().is_err());
    }

    #[test]
    fn shard_tables_are_prefixed() {
        assert_eq!(ShardId::B.table("cfpval"), "B_cfpval");
        assert_eq!(ShardId::C.table("parts_tree"), "C_parts_tree");
    }

    #[test]
    fn hash_hex_round_trip_is_zero_padded() {
        let mut bytes = [0u8; 32];
        bytes[31] = 0x0f;
        let h = PartHash(bytes);
        let hex = h.to_hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.ends_with("0f"));
        assert!(hex.starts_with("0000"));
        assert_eq!(PartHash::from_hex(&hex).unwrap(), h);
    }

    #[test]
    fn sha256_matches_known_vector() {
        // SHA-256("abc")
        assert_eq!(
            PartHash::sha256(b"abc").to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn xor_is_self_inverse() {
        let a = PartHash::sha256(b"left");
        let b = PartHash::sha256(b"right");
        assert_eq!(a ^ b ^ b, a);
        assert_eq!(a ^ a, PartHash::ZERO);
    }
}
