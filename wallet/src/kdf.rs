//! Password key derivation for the wallet container.

use crate::container::{decode_lower_hex, ContainerError};
use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use zeroize::Zeroizing;

/// Length of the derived AES-256 key.
pub const KEY_LEN: usize = 32;

/// Length of the random salt stored in the container header.
pub const SALT_LEN: usize = 16;

pub const ARGON2ID_ID: &str = "argon2id";
pub const PBKDF2_SHA512_ID: &str = "pbkdf2-sha512";

/// PBKDF2-HMAC-SHA512 rounds used when none are configured.
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 210_000;

// Refuse headers that would make opening a file take minutes or gigabytes.
const MAX_ARGON2_MEMORY_KIB: u32 = 4 * 1024 * 1024;
const MAX_ARGON2_PARALLELISM: u32 = 64;
// memory times passes, in KiB
const MAX_ARGON2_WORK_KIB: u64 = 8 * 1024 * 1024;
const MAX_ITERATIONS: u32 = 10_000_000;

/// Which KDF to run and how hard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all_fields = "camelCase")]
pub enum KdfConfig {
    #[serde(rename = "argon2id")]
    Argon2id {
        memory_kib: u32,
        iterations: u32,
        parallelism: u32,
    },
    #[serde(rename = "pbkdf2-sha512")]
    Pbkdf2Sha512 { iterations: u32 },
}

impl Default for KdfConfig {
    fn default() -> Self {
        KdfConfig::Argon2id {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

/// KDF parameters as written to the container header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KdfParams {
    pub salt: String,
    pub iterations: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_kib: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallelism: Option<u32>,
    pub key_len: usize,
}

impl KdfConfig {
    pub fn pbkdf2() -> Self {
        KdfConfig::Pbkdf2Sha512 {
            iterations: DEFAULT_PBKDF2_ITERATIONS,
        }
    }

    /// Identifier stored in the header's `kdf` field.
    pub fn id(&self) -> &'static str {
        match self {
            KdfConfig::Argon2id { .. } => ARGON2ID_ID,
            KdfConfig::Pbkdf2Sha512 { .. } => PBKDF2_SHA512_ID,
        }
    }

    /// Header parameters for this configuration and `salt`.
    pub fn to_params(&self, salt: &[u8]) -> KdfParams {
        match *self {
            KdfConfig::Argon2id {
                memory_kib,
                iterations,
                parallelism,
            } => KdfParams {
                salt: hex::encode(salt),
                iterations,
                memory_kib: Some(memory_kib),
                parallelism: Some(parallelism),
                key_len: KEY_LEN,
            },
            KdfConfig::Pbkdf2Sha512 { iterations } => KdfParams {
                salt: hex::encode(salt),
                iterations,
                memory_kib: None,
                parallelism: None,
                key_len: KEY_LEN,
            },
        }
    }

    /// Rebuild the configuration named by a header. Returns it with the
    /// decoded salt.
    pub fn from_header(kdf: &str, params: &KdfParams) -> Result<(Self, Vec<u8>), ContainerError> {
        let config = match kdf {
            ARGON2ID_ID => {
                let (Some(memory_kib), Some(parallelism)) = (params.memory_kib, params.parallelism)
                else {
                    return Err(ContainerError::EncodingError(
                        "argon2id parameters incomplete".to_string(),
                    ));
                };
                KdfConfig::Argon2id {
                    memory_kib,
                    iterations: params.iterations,
                    parallelism,
                }
            }
            PBKDF2_SHA512_ID => KdfConfig::Pbkdf2Sha512 {
                iterations: params.iterations,
            },
            other => {
                return Err(ContainerError::UnsupportedFormatVersion(format!(
                    "unknown kdf '{}'",
                    other
                )))
            }
        };

        if params.key_len != KEY_LEN {
            return Err(ContainerError::UnsupportedFormatVersion(format!(
                "key length {}",
                params.key_len
            )));
        }
        config.check_bounds()?;

        let salt = decode_lower_hex(&params.salt)
            .ok_or_else(|| ContainerError::EncodingError("salt is not lowercase hex".to_string()))?;
        if salt.len() != SALT_LEN {
            return Err(ContainerError::EncodingError(format!(
                "salt length {}",
                salt.len()
            )));
        }
        Ok((config, salt))
    }

    fn check_bounds(&self) -> Result<(), ContainerError> {
        let sane = match *self {
            KdfConfig::Argon2id {
                memory_kib,
                iterations,
                parallelism,
            } => {
                memory_kib <= MAX_ARGON2_MEMORY_KIB
                    && iterations >= 1
                    && u64::from(memory_kib) * u64::from(iterations) <= MAX_ARGON2_WORK_KIB
                    && (1..=MAX_ARGON2_PARALLELISM).contains(&parallelism)
            }
            KdfConfig::Pbkdf2Sha512 { iterations } => (1..=MAX_ITERATIONS).contains(&iterations),
        };
        if sane {
            Ok(())
        } else {
            Err(ContainerError::EncodingError(format!(
                "{} parameters out of range",
                self.id()
            )))
        }
    }

    /// Stretch `password` with `salt` into an AES-256 key.
    pub fn derive_key(
        &self,
        password: &[u8],
        salt: &[u8],
    ) -> Result<Zeroizing<[u8; KEY_LEN]>, ContainerError> {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        match *self {
            KdfConfig::Argon2id {
                memory_kib,
                iterations,
                parallelism,
            } => {
                let params = Params::new(memory_kib, iterations, parallelism, Some(KEY_LEN))
                    .map_err(|e| ContainerError::EncodingError(format!("argon2id: {}", e)))?;
                Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
                    .hash_password_into(password, salt, &mut key[..])
                    .map_err(|e| ContainerError::EncodingError(format!("argon2id: {}", e)))?;
            }
            KdfConfig::Pbkdf2Sha512 { iterations } => {
                pbkdf2::pbkdf2_hmac::<Sha512>(password, salt, iterations, &mut key[..]);
            }
        }
        Ok(key)
    }
}
