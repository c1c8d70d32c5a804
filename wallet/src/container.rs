//! Wallet container
//!
//! The on-disk form of a wallet is a JSON document:
//!
//! ```text
//! { "version": 1,
//!   "meta":    { "displayName", "created" },
//!   "crypto":  { "cipher", "kdf", "kdfParams", "nonce", "ciphertext" },   // encrypted
//!   "secrets": { "mnemonic"?, "masterKeypair"?, "accounts": [...] } }     // plaintext
//! ```
//!
//! Exactly one of `crypto` and `secrets` is present. When encrypted, the
//! ciphertext is AES-256-GCM over the same JSON that `secrets` would hold,
//! keyed by the header's KDF applied to the password and salt. The version,
//! cipher id, KDF id and `meta` are authenticated as associated data. Hex
//! fields must be lowercase, so every encoding of a payload is unique.
//!
//! Reading never distinguishes a wrong password from a damaged file. With
//! [`OpenOptions::with_debug`] the failing check is logged for the operator;
//! the returned error stays the same.

use crate::hd::HdPath;
use crate::kdf::{KdfConfig, KdfParams, SALT_LEN};
use crate::keypair::Keypair;
use crate::mnemonic::{parse_mnemonic, MnemonicPhrase};
use crate::wallet::{Secrets, Wallet, WalletError, WalletMeta};
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use zeroize::Zeroizing;

/// Container format written by this version.
pub const FORMAT_VERSION: u32 = 1;

/// Cipher identifier stored in the header.
pub const CIPHER_ID: &str = "AES-256-GCM";

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("Wrong password or corrupt wallet file")]
    WrongPasswordOrCorruptFile,

    #[error("Unsupported wallet file format: {0}")]
    UnsupportedFormatVersion(String),

    #[error("Wallet file encoding error: {0}")]
    EncodingError(String),

    #[error("Wallet file already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Options for reading a container.
#[derive(Clone, Default)]
pub struct OpenOptions {
    password: Zeroizing<String>,
    debug: bool,
}

impl OpenOptions {
    /// An empty password opens unencrypted containers only.
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: Zeroizing::new(password.into()),
            debug: false,
        }
    }

    /// Log why an open failed. Does not change the returned error.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn debug(&self) -> bool {
        self.debug
    }
}

impl std::fmt::Debug for OpenOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenOptions")
            .field("password", &"<redacted>")
            .field("debug", &self.debug)
            .finish()
    }
}

/// Options for writing a container. A fresh salt and nonce are drawn on
/// every export.
#[derive(Clone, Default)]
pub struct ExportOptions {
    password: Zeroizing<String>,
    kdf: KdfConfig,
}

impl ExportOptions {
    /// An empty password writes the secrets unencrypted.
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: Zeroizing::new(password.into()),
            kdf: KdfConfig::default(),
        }
    }

    pub fn with_kdf(mut self, kdf: KdfConfig) -> Self {
        self.kdf = kdf;
        self
    }

    pub fn kdf(&self) -> &KdfConfig {
        &self.kdf
    }

    pub fn is_encrypted(&self) -> bool {
        !self.password.is_empty()
    }
}

impl std::fmt::Debug for ExportOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportOptions")
            .field("password", &"<redacted>")
            .field("kdf", &self.kdf)
            .finish()
    }
}

#[derive(Serialize, Deserialize)]
struct ContainerFile {
    version: u32,
    meta: WalletMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    crypto: Option<CryptoHeader>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    secrets: Option<SecretsRecord>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CryptoHeader {
    cipher: String,
    kdf: String,
    kdf_params: KdfParams,
    nonce: String,
    ciphertext: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SecretsRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mnemonic: Option<Zeroizing<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    master_keypair: Option<KeypairRecord>,
    accounts: Vec<KeypairRecord>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeypairRecord {
    public_key: String,
    // hex of the 64-byte keypair, empty when hardware-backed
    secret_key: Zeroizing<String>,
    path: HdPath,
    display_name: String,
    created: DateTime<Utc>,
}

impl From<&Keypair> for KeypairRecord {
    fn from(keypair: &Keypair) -> Self {
        Self {
            public_key: keypair.public_key_hex(),
            secret_key: Zeroizing::new(keypair.private_key().map(hex::encode).unwrap_or_default()),
            path: keypair.path().clone(),
            display_name: keypair.display_name().to_string(),
            created: keypair.created(),
        }
    }
}

impl KeypairRecord {
    fn to_keypair(&self) -> Result<Keypair, ContainerError> {
        let public = hex::decode(&self.public_key)
            .map_err(|_| ContainerError::EncodingError(format!("public key at {}", self.path)))?;
        let secret = Zeroizing::new(
            hex::decode(self.secret_key.as_str())
                .map_err(|_| ContainerError::EncodingError(format!("secret key at {}", self.path)))?,
        );
        Keypair::from_parts(
            &public,
            &secret,
            self.path.clone(),
            self.display_name.clone(),
            self.created,
        )
        .map_err(|e| ContainerError::EncodingError(format!("keypair at {}: {}", self.path, e)))
    }
}

impl SecretsRecord {
    fn from_wallet(wallet: &Wallet) -> Self {
        let secrets = wallet.secrets();
        Self {
            mnemonic: wallet
                .mnemonic()
                .map(|m| Zeroizing::new(m.phrase().to_string())),
            master_keypair: secrets.master_keypair().map(KeypairRecord::from),
            accounts: secrets.accounts().iter().map(KeypairRecord::from).collect(),
        }
    }

    fn into_wallet(self, meta: WalletMeta) -> Result<Wallet, ContainerError> {
        let mnemonic: Option<MnemonicPhrase> = match &self.mnemonic {
            Some(words) => Some(
                parse_mnemonic(words)
                    .map_err(|_| ContainerError::EncodingError("stored mnemonic is invalid".to_string()))?,
            ),
            None => None,
        };

        let master = self
            .master_keypair
            .as_ref()
            .map(KeypairRecord::to_keypair)
            .transpose()?;
        let accounts = self
            .accounts
            .iter()
            .map(KeypairRecord::to_keypair)
            .collect::<Result<Vec<_>, _>>()?;

        // private keys are either held for every key or for none
        let mut holds_private = master.iter().chain(&accounts).map(Keypair::has_private_key);
        if let Some(first) = holds_private.next() {
            if holds_private.any(|held| held != first) {
                return Err(ContainerError::EncodingError(
                    "partial private key material".to_string(),
                ));
            }
        }

        let secrets = Secrets::new(master, accounts)
            .map_err(|e| ContainerError::EncodingError(e.to_string()))?;
        Ok(Wallet::from_parts(meta, secrets, mnemonic))
    }
}

fn associated_data(
    version: u32,
    cipher: &str,
    kdf: &str,
    meta: &WalletMeta,
) -> Result<Vec<u8>, ContainerError> {
    let mut aad = format!("smwallet/v{}/{}/{}/", version, cipher, kdf).into_bytes();
    let meta = serde_json::to_vec(meta).map_err(|e| ContainerError::EncodingError(e.to_string()))?;
    aad.extend_from_slice(&meta);
    Ok(aad)
}

/// Decode hex written by [`hex::encode`]. Uppercase digits are refused.
pub(crate) fn decode_lower_hex(field: &str) -> Option<Vec<u8>> {
    let bytes = hex::decode(field).ok()?;
    (hex::encode(&bytes) == field).then_some(bytes)
}

/// Decode container `bytes` into a wallet.
pub fn open(bytes: &[u8], options: &OpenOptions) -> Result<Wallet, WalletError> {
    let wallet = decode(bytes, options)?;
    log::debug!("opened wallet with {} account(s)", wallet.accounts().len());
    Ok(wallet)
}

/// Encode `wallet` as container bytes.
pub fn export(wallet: &Wallet, options: &ExportOptions) -> Result<Vec<u8>, WalletError> {
    Ok(encode(wallet, options)?)
}

fn decode(bytes: &[u8], options: &OpenOptions) -> Result<Wallet, ContainerError> {
    let document: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| ContainerError::EncodingError(format!("not a wallet file: {}", e)))?;

    // check the version before anything else depends on the layout
    match document.get("version").and_then(serde_json::Value::as_u64) {
        Some(v) if v == u64::from(FORMAT_VERSION) => {}
        Some(v) => {
            return Err(ContainerError::UnsupportedFormatVersion(format!(
                "version {}",
                v
            )))
        }
        None => return Err(ContainerError::EncodingError("missing version".to_string())),
    }

    let file: ContainerFile = serde_json::from_value(document)
        .map_err(|e| ContainerError::EncodingError(e.to_string()))?;

    match (file.crypto, file.secrets) {
        (None, Some(secrets)) => secrets.into_wallet(file.meta),
        (Some(crypto), None) => {
            let payload = decrypt(file.version, &crypto, &file.meta, options)?;
            let secrets: SecretsRecord = serde_json::from_slice(&payload).map_err(|e| {
                diagnose(options, "decrypted payload is not valid wallet JSON");
                ContainerError::EncodingError(e.to_string())
            })?;
            secrets.into_wallet(file.meta)
        }
        (Some(_), Some(_)) => Err(ContainerError::EncodingError(
            "both encrypted and plaintext secrets present".to_string(),
        )),
        (None, None) => Err(ContainerError::EncodingError(
            "no secrets present".to_string(),
        )),
    }
}

fn decrypt(
    version: u32,
    crypto: &CryptoHeader,
    meta: &WalletMeta,
    options: &OpenOptions,
) -> Result<Zeroizing<Vec<u8>>, ContainerError> {
    if crypto.cipher != CIPHER_ID {
        return Err(ContainerError::UnsupportedFormatVersion(format!(
            "unknown cipher '{}'",
            crypto.cipher
        )));
    }
    let (kdf, salt) = KdfConfig::from_header(&crypto.kdf, &crypto.kdf_params)?;

    let nonce = decode_lower_hex(&crypto.nonce).ok_or_else(|| {
        diagnose(options, "nonce is not lowercase hex");
        ContainerError::WrongPasswordOrCorruptFile
    })?;
    if nonce.len() != NONCE_LEN {
        diagnose(options, "nonce has the wrong length");
        return Err(ContainerError::WrongPasswordOrCorruptFile);
    }
    let ciphertext = decode_lower_hex(&crypto.ciphertext).ok_or_else(|| {
        diagnose(options, "ciphertext is not lowercase hex");
        ContainerError::WrongPasswordOrCorruptFile
    })?;
    if ciphertext.len() < TAG_LEN {
        diagnose(options, "ciphertext is truncated");
        return Err(ContainerError::WrongPasswordOrCorruptFile);
    }

    let key = kdf.derive_key(options.password.as_bytes(), &salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key[..])
        .map_err(|_| ContainerError::EncodingError("bad key length".to_string()))?;
    let aad = associated_data(version, &crypto.cipher, &crypto.kdf, meta)?;

    cipher
        .decrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: &ciphertext,
                aad: &aad,
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| {
            diagnose(options, "authentication tag mismatch");
            ContainerError::WrongPasswordOrCorruptFile
        })
}

fn diagnose(options: &OpenOptions, reason: &str) {
    if options.debug {
        log::warn!("wallet open failed: {}", reason);
    }
}

fn encode(wallet: &Wallet, options: &ExportOptions) -> Result<Vec<u8>, ContainerError> {
    let record = SecretsRecord::from_wallet(wallet);

    let file = if options.is_encrypted() {
        let payload = Zeroizing::new(
            serde_json::to_vec(&record).map_err(|e| ContainerError::EncodingError(e.to_string()))?,
        );

        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let kdf = options.kdf;
        let key = kdf.derive_key(options.password.as_bytes(), &salt)?;
        let cipher = Aes256Gcm::new_from_slice(&key[..])
            .map_err(|_| ContainerError::EncodingError("bad key length".to_string()))?;
        let aad = associated_data(FORMAT_VERSION, CIPHER_ID, kdf.id(), wallet.meta())?;
        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &payload,
                    aad: &aad,
                },
            )
            .map_err(|_| ContainerError::EncodingError("encryption failed".to_string()))?;

        log::info!(
            "exporting encrypted wallet ({} account(s), kdf {})",
            wallet.accounts().len(),
            kdf.id()
        );
        ContainerFile {
            version: FORMAT_VERSION,
            meta: wallet.meta().clone(),
            crypto: Some(CryptoHeader {
                cipher: CIPHER_ID.to_string(),
                kdf: kdf.id().to_string(),
                kdf_params: kdf.to_params(&salt),
                nonce: hex::encode(nonce),
                ciphertext: hex::encode(ciphertext),
            }),
            secrets: None,
        }
    } else {
        log::warn!("exporting wallet without encryption");
        ContainerFile {
            version: FORMAT_VERSION,
            meta: wallet.meta().clone(),
            crypto: None,
            secrets: Some(record),
        }
    };

    serde_json::to_vec_pretty(&file).map_err(|e| ContainerError::EncodingError(e.to_string()))
}

fn temp_beside(path: &Path) -> Result<NamedTempFile, ContainerError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    // tempfile creates the file with mode 0600
    Ok(NamedTempFile::new_in(dir)?)
}

fn staged(path: &Path, bytes: &[u8]) -> Result<NamedTempFile, ContainerError> {
    let mut tmp = temp_beside(path)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    Ok(tmp)
}

/// Create a new wallet file. Fails if `path` already exists.
pub fn write_new(path: &Path, bytes: &[u8]) -> Result<(), ContainerError> {
    if path.exists() {
        return Err(ContainerError::AlreadyExists(path.to_path_buf()));
    }
    staged(path, bytes)?.persist_noclobber(path).map_err(|e| {
        if e.error.kind() == std::io::ErrorKind::AlreadyExists {
            ContainerError::AlreadyExists(path.to_path_buf())
        } else {
            ContainerError::Io(e.error)
        }
    })?;
    log::info!("wrote new wallet file {}", path.display());
    Ok(())
}

/// Atomically replace the wallet file at `path`.
pub fn replace(path: &Path, bytes: &[u8]) -> Result<(), ContainerError> {
    staged(path, bytes)?
        .persist(path)
        .map_err(|e| ContainerError::Io(e.error))?;
    log::info!("replaced wallet file {}", path.display());
    Ok(())
}

pub fn read(path: &Path) -> Result<Vec<u8>, ContainerError> {
    Ok(std::fs::read(path)?)
}
