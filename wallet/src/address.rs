//! Network addresses
//!
//! An account address is the Bech32 encoding of the account's principal under
//! the network's human-readable prefix (HRP). The principal is the BLAKE3 hash
//! of the single-signature wallet template address followed by the public
//! key; the address keeps 4 reserved zero bytes and the last 20 hash bytes.

use bech32::{FromBase32, ToBase32, Variant};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Length of a decoded address.
pub const ADDRESS_LEN: usize = 24;

const RESERVED_PREFIX_LEN: usize = 4;

/// Address of the built-in single-signature wallet template.
pub const WALLET_TEMPLATE: [u8; ADDRESS_LEN] = {
    let mut template = [0u8; ADDRESS_LEN];
    template[ADDRESS_LEN - 1] = 1;
    template
};

/// HRP used when the caller does not supply one.
pub const DEFAULT_HRP: &str = "sm";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid public key length: {0}")]
    InvalidPublicKey(usize),

    #[error("Invalid network prefix '{0}'")]
    InvalidHrp(String),

    #[error("Invalid address encoding: {0}")]
    InvalidEncoding(String),

    #[error("Address belongs to network '{found}', expected '{expected}'")]
    WrongNetwork { expected: String, found: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    #[default]
    Mainnet,
    Testnet,
}

impl NetworkType {
    /// Default human-readable prefix for this network.
    pub fn hrp(&self) -> &'static str {
        match self {
            NetworkType::Mainnet => DEFAULT_HRP,
            NetworkType::Testnet => "stest",
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkType::Mainnet => write!(f, "mainnet"),
            NetworkType::Testnet => write!(f, "testnet"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    hrp: String,
    bytes: [u8; ADDRESS_LEN],
    encoded: String,
}

impl Address {
    /// Address of the wallet spawned for `public_key` on the network `hrp`.
    pub fn from_public_key(public_key: &[u8], hrp: &str) -> Result<Self, AddressError> {
        if public_key.len() != 32 {
            return Err(AddressError::InvalidPublicKey(public_key.len()));
        }

        let mut hasher = blake3::Hasher::new();
        hasher.update(&WALLET_TEMPLATE);
        hasher.update(public_key);
        let principal = hasher.finalize();

        let mut bytes = [0u8; ADDRESS_LEN];
        let tail = ADDRESS_LEN - RESERVED_PREFIX_LEN;
        bytes[RESERVED_PREFIX_LEN..].copy_from_slice(&principal.as_bytes()[32 - tail..]);

        Self::from_bytes(bytes, hrp)
    }

    /// Encode raw address bytes under `hrp`.
    pub fn from_bytes(bytes: [u8; ADDRESS_LEN], hrp: &str) -> Result<Self, AddressError> {
        validate_hrp(hrp)?;
        let encoded = bech32::encode(hrp, bytes.to_base32(), Variant::Bech32)
            .map_err(|_| AddressError::InvalidHrp(hrp.to_string()))?;
        Ok(Self {
            hrp: hrp.to_string(),
            bytes,
            encoded,
        })
    }

    /// Decode an address string of any network.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let (hrp, data, variant) =
            bech32::decode(s).map_err(|e| AddressError::InvalidEncoding(e.to_string()))?;
        if variant != Variant::Bech32 {
            return Err(AddressError::InvalidEncoding("expected bech32".to_string()));
        }
        let raw = Vec::<u8>::from_base32(&data)
            .map_err(|e| AddressError::InvalidEncoding(e.to_string()))?;
        let bytes: [u8; ADDRESS_LEN] = raw
            .as_slice()
            .try_into()
            .map_err(|_| AddressError::InvalidEncoding(format!("length {}", raw.len())))?;
        Self::from_bytes(bytes, &hrp)
    }

    /// Decode an address and require it to belong to `hrp`.
    pub fn parse_for(s: &str, hrp: &str) -> Result<Self, AddressError> {
        let address = Self::parse(s)?;
        if address.hrp != hrp {
            return Err(AddressError::WrongNetwork {
                expected: hrp.to_string(),
                found: address.hrp,
            });
        }
        Ok(address)
    }

    pub fn hrp(&self) -> &str {
        &self.hrp
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.bytes
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

/// Encode `public_key` as an address on network `hrp`.
pub fn pubkey_to_address(public_key: &[u8], hrp: &str) -> Result<Address, AddressError> {
    Address::from_public_key(public_key, hrp)
}

// Lowercase only, so that two prefixes differing in case cannot name the same network.
fn validate_hrp(hrp: &str) -> Result<(), AddressError> {
    let valid = !hrp.is_empty()
        && hrp.len() <= 83
        && hrp
            .bytes()
            .all(|b| (33..=126).contains(&b) && !b.is_ascii_uppercase());
    if valid {
        Ok(())
    } else {
        Err(AddressError::InvalidHrp(hrp.to_string()))
    }
}
