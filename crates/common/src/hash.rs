// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// The identity of an asset: a 64-bit xxHash3 digest of its raw bytes.
///
/// This is deliberately not a cryptographic digest. It exists to collapse byte-identical uploads
/// into one record and to catch accidental corruption in transit, not to resist an adversary who
/// can choose the bytes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(u64);

impl ContentHash {
    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }

    /// Digest the given bytes.
    pub fn of(bytes: &[u8]) -> Self {
        Self(xxhash_rust::xxh3::xxh3_64(bytes))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// True if `bytes` digests to this hash.
    pub fn verify(&self, bytes: &[u8]) -> bool {
        Self::of(bytes) == *self
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid content hash {0:?}: expected 16 hex digits")]
pub struct InvalidContentHash(pub String);

impl FromStr for ContentHash {
    type Err = InvalidContentHash;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 16 {
            return Err(InvalidContentHash(s.to_string()));
        }
        u64::from_str_radix(s, 16)
            .map(Self)
            .map_err(|_| InvalidContentHash(s.to_string()))
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable_for_identical_bytes() {
        let a = ContentHash::of(b"goblin.png contents");
        let b = ContentHash::of(b"goblin.png contents");
        assert_eq!(a, b);
        assert_ne!(a, ContentHash::of(b"goblin.png content"));
    }

    #[test]
    fn test_display_parse_roundtrip() {
        let hash = ContentHash::from_u64(0xab);
        assert_eq!(hash.to_string(), "00000000000000ab");
        assert_eq!("00000000000000ab".parse::<ContentHash>().unwrap(), hash);
    }

    #[test]
    fn test_rejects_malformed_hex() {
        assert!("abc".parse::<ContentHash>().is_err());
        assert!("zzzzzzzzzzzzzzzz".parse::<ContentHash>().is_err());
    }

    #[test]
    fn test_verify_detects_corruption() {
        let bytes = b"0123456789";
        let hash = ContentHash::of(bytes);
        assert!(hash.verify(bytes));
        assert!(!hash.verify(b"0123456788"));
    }

    #[test]
    fn test_serializes_as_hex_string() {
        let hash = ContentHash::from_u64(1);
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, "\"0000000000000001\"");
        let back: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }
}
