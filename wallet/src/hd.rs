//! SLIP-0010 ed25519 derivation along the wallet's BIP-44 path scheme.
//!
//! Ed25519 only supports hardened children, so every path component is
//! hardened. Paths look like `m/44'/540'/0'/0'/3'`.

use crate::mnemonic::Seed;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::Sha512;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use zeroize::Zeroizing;

type HmacSha512 = Hmac<Sha512>;

const ED25519_CURVE: &[u8] = b"ed25519 seed";

/// Offset applied to every component when hashing; all levels are hardened.
pub const HARDENED_OFFSET: u32 = 0x8000_0000;

pub const BIP44_PURPOSE: u32 = 44;
pub const COIN_TYPE: u32 = 540;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("Path must start with 'm/': {0}")]
    MissingRoot(String),

    #[error("Every path component must be hardened, got '{0}'")]
    NotHardened(String),

    #[error("Invalid path index '{0}'")]
    InvalidIndex(String),
}

/// An all-hardened derivation path. Indices are stored without the hardened
/// offset.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HdPath(Vec<u32>);

impl HdPath {
    pub fn new(indices: Vec<u32>) -> Result<Self, PathError> {
        if let Some(bad) = indices.iter().find(|i| **i >= HARDENED_OFFSET) {
            return Err(PathError::InvalidIndex(bad.to_string()));
        }
        Ok(Self(indices))
    }

    /// Parent of every account, `m/44'/540'/0'/0'`.
    pub fn master() -> Self {
        Self(vec![BIP44_PURPOSE, COIN_TYPE, 0, 0])
    }

    /// Path of the account at `index`, `m/44'/540'/0'/0'/index'`.
    pub fn account(index: u32) -> Self {
        let mut indices = Self::master().0;
        indices.push(index & !HARDENED_OFFSET);
        Self(indices)
    }

    pub fn indices(&self) -> &[u32] {
        &self.0
    }

    /// Last component, which is the account index for account paths.
    pub fn last_index(&self) -> Option<u32> {
        self.0.last().copied()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Returns true when `self` is a strict prefix of `other`.
    pub fn is_parent_of(&self, other: &HdPath) -> bool {
        other.0.len() > self.0.len() && other.0.starts_with(&self.0)
    }
}

impl fmt::Display for HdPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("m")?;
        for index in &self.0 {
            write!(f, "/{}'", index)?;
        }
        Ok(())
    }
}

impl fmt::Debug for HdPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HdPath({})", self)
    }
}

impl FromStr for HdPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let rest = match s.strip_prefix('m') {
            Some(rest) => rest,
            None => return Err(PathError::MissingRoot(s.to_string())),
        };
        if rest.is_empty() {
            return Ok(Self(Vec::new()));
        }
        let rest = rest
            .strip_prefix('/')
            .ok_or_else(|| PathError::MissingRoot(s.to_string()))?;

        let mut indices = Vec::new();
        for segment in rest.split('/') {
            let digits = segment
                .strip_suffix('\'')
                .or_else(|| segment.strip_suffix('h'))
                .ok_or_else(|| PathError::NotHardened(segment.to_string()))?;
            let index: u32 = digits
                .parse()
                .map_err(|_| PathError::InvalidIndex(segment.to_string()))?;
            if index >= HARDENED_OFFSET {
                return Err(PathError::InvalidIndex(segment.to_string()));
            }
            indices.push(index);
        }
        Ok(Self(indices))
    }
}

impl Serialize for HdPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HdPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A SLIP-0010 node: private key plus chain code, both wiped on drop.
pub struct ExtendedKey {
    private_key: Zeroizing<[u8; 32]>,
    chain_code: Zeroizing<[u8; 32]>,
}

impl ExtendedKey {
    /// Root node: I = HMAC-SHA512(key = "ed25519 seed", data = seed).
    pub fn from_seed(seed: &Seed) -> Self {
        Self::from_hmac(ED25519_CURVE, &[seed.as_bytes().as_slice()])
    }

    /// Hardened child: I = HMAC-SHA512(key = chain code, data = 0x00 || key || index').
    pub fn derive_hardened(&self, index: u32) -> Self {
        let hardened = (index | HARDENED_OFFSET).to_be_bytes();
        Self::from_hmac(
            self.chain_code.as_slice(),
            &[&[0x00u8][..], self.private_key.as_slice(), &hardened[..]],
        )
    }

    /// Walk from the root of `seed` down `path`.
    pub fn derive_path(seed: &Seed, path: &HdPath) -> Self {
        path.indices()
            .iter()
            .fold(Self::from_seed(seed), |node, index| node.derive_hardened(*index))
    }

    pub fn private_key(&self) -> &[u8; 32] {
        &self.private_key
    }

    pub fn chain_code(&self) -> &[u8; 32] {
        &self.chain_code
    }

    fn from_hmac(key: &[u8], parts: &[&[u8]]) -> Self {
        // HMAC accepts keys of any length
        let mut mac = match HmacSha512::new_from_slice(key) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC-SHA512 accepts any key length"),
        };
        for part in parts {
            mac.update(part);
        }
        let mut output = Zeroizing::new([0u8; 64]);
        output.copy_from_slice(&mac.finalize().into_bytes());

        let mut private_key = Zeroizing::new([0u8; 32]);
        let mut chain_code = Zeroizing::new([0u8; 32]);
        private_key.copy_from_slice(&output[..32]);
        chain_code.copy_from_slice(&output[32..]);

        Self {
            private_key,
            chain_code,
        }
    }
}
