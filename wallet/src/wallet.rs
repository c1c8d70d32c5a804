use crate::address::{pubkey_to_address, Address, AddressError};
use crate::container::ContainerError;
use crate::hardware::DeviceError;
use crate::hd::{HdPath, PathError};
use crate::key_source::{KeySource, SeedKeySource};
use crate::keypair::{Keypair, KeypairError};
use crate::mnemonic::{generate_mnemonic, mnemonic_to_seed, parse_mnemonic, MnemonicError, MnemonicPhrase, Seed};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest account count accepted for a single wallet.
pub const MAX_ACCOUNTS: usize = i16::MAX as usize;

pub const MASTER_DISPLAY_NAME: &str = "Master Key";
pub const DEFAULT_WALLET_NAME: &str = "Main Wallet";

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Mnemonic error: {0}")]
    MnemonicError(#[from] MnemonicError),

    #[error("Keypair error: {0}")]
    KeypairError(#[from] KeypairError),

    #[error("Address error: {0}")]
    AddressError(#[from] AddressError),

    #[error("Derivation path error: {0}")]
    PathError(#[from] PathError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error("Invalid account count: {0} (must be between 1 and {max})", max = MAX_ACCOUNTS)]
    InvalidAccountCount(i64),

    #[error("Invalid wallet secrets: {0}")]
    InvalidSecrets(&'static str),

    #[error("No account at index {0}")]
    AccountNotFound(usize),
}

/// Wallet-level metadata stored in the container header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletMeta {
    pub display_name: String,
    pub created: DateTime<Utc>,
}

impl Default for WalletMeta {
    fn default() -> Self {
        Self {
            display_name: DEFAULT_WALLET_NAME.to_string(),
            created: Utc::now(),
        }
    }
}

/// Derived key material: the master keypair and the ordered accounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Secrets {
    master_keypair: Option<Keypair>,
    accounts: Vec<Keypair>,
}

impl Secrets {
    /// Accounts must be non-empty, with strictly ascending paths.
    pub fn new(master_keypair: Option<Keypair>, accounts: Vec<Keypair>) -> Result<Self, WalletError> {
        if accounts.is_empty() {
            return Err(WalletError::InvalidAccountCount(0));
        }
        if accounts.windows(2).any(|w| w[0].path() >= w[1].path()) {
            return Err(WalletError::InvalidSecrets(
                "account paths must be strictly ascending",
            ));
        }
        Ok(Self {
            master_keypair,
            accounts,
        })
    }

    pub fn master_keypair(&self) -> Option<&Keypair> {
        self.master_keypair.as_ref()
    }

    pub fn accounts(&self) -> &[Keypair] {
        &self.accounts
    }
}

/// Wallet: secrets plus, for software wallets, the originating mnemonic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wallet {
    meta: WalletMeta,
    secrets: Secrets,
    mnemonic: Option<MnemonicPhrase>,
}

/// A message signed with an account key, in the JSON shape wallets exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedMessage {
    pub text: String,
    pub signature: String,
    pub public_key: String,
}

/// Validate a user supplied account count.
pub fn account_count(raw: i64) -> Result<usize, WalletError> {
    if raw < 1 || raw > MAX_ACCOUNTS as i64 {
        return Err(WalletError::InvalidAccountCount(raw));
    }
    Ok(raw as usize)
}

/// Root keypair of the account tree.
pub fn derive_master(seed: &Seed) -> Keypair {
    Keypair::derive(seed, HdPath::master(), MASTER_DISPLAY_NAME)
}

/// Account `index`; always the same keypair for the same seed and index.
pub fn derive_account(seed: &Seed, index: u32) -> Keypair {
    Keypair::derive(seed, HdPath::account(index), account_display_name(index))
}

/// Master keypair plus `n` accounts at indices `0..n`.
pub fn build_wallet(seed: &Seed, n: usize) -> Result<Wallet, WalletError> {
    Wallet::from_seed(seed, n, None)
}

fn account_display_name(index: u32) -> String {
    format!("Child Key {}", index)
}

impl Wallet {
    /// Create a wallet with `n` accounts from a fresh random mnemonic.
    pub fn random(n: usize) -> Result<Self, WalletError> {
        Self::with_mnemonic(generate_mnemonic(), n)
    }

    /// Create (or recover) a wallet with `n` accounts from a mnemonic phrase.
    pub fn from_mnemonic(phrase: &str, n: usize) -> Result<Self, WalletError> {
        Self::with_mnemonic(parse_mnemonic(phrase)?, n)
    }

    pub fn with_mnemonic(mnemonic: MnemonicPhrase, n: usize) -> Result<Self, WalletError> {
        // BIP-39 passphrases are not supported yet, see mnemonic_to_seed
        let seed = mnemonic_to_seed(&mnemonic, "");
        Self::from_seed(&seed, n, Some(mnemonic))
    }

    fn from_seed(seed: &Seed, n: usize, mnemonic: Option<MnemonicPhrase>) -> Result<Self, WalletError> {
        let source = SeedKeySource::new(seed.clone());
        Self::from_key_source(&source, n, mnemonic)
    }

    /// Derive the master keypair and `n` accounts from any key source.
    pub fn from_key_source(
        source: &dyn KeySource,
        n: usize,
        mnemonic: Option<MnemonicPhrase>,
    ) -> Result<Self, WalletError> {
        if n < 1 || n > MAX_ACCOUNTS {
            return Err(WalletError::InvalidAccountCount(n as i64));
        }

        let master = source.keypair(HdPath::master(), MASTER_DISPLAY_NAME.to_string())?;
        let accounts = (0..n as u32)
            .map(|index| source.keypair(HdPath::account(index), account_display_name(index)))
            .collect::<Result<Vec<_>, _>>()?;
        log::info!("derived {} account(s) from {:?} key source", n, source.kind());

        Ok(Self {
            meta: WalletMeta::default(),
            secrets: Secrets::new(Some(master), accounts)?,
            mnemonic,
        })
    }

    /// Reassemble a wallet read back from storage.
    pub fn from_parts(meta: WalletMeta, secrets: Secrets, mnemonic: Option<MnemonicPhrase>) -> Self {
        Self {
            meta,
            secrets,
            mnemonic,
        }
    }

    pub fn meta(&self) -> &WalletMeta {
        &self.meta
    }

    pub fn secrets(&self) -> &Secrets {
        &self.secrets
    }

    pub fn accounts(&self) -> &[Keypair] {
        self.secrets.accounts()
    }

    pub fn account(&self, index: usize) -> Result<&Keypair, WalletError> {
        self.accounts()
            .get(index)
            .ok_or(WalletError::AccountNotFound(index))
    }

    /// The originating mnemonic; `None` for hardware wallets.
    pub fn mnemonic(&self) -> Option<&MnemonicPhrase> {
        self.mnemonic.as_ref()
    }

    /// True when no account carries a private key.
    pub fn is_hardware_backed(&self) -> bool {
        self.accounts().iter().all(|a| !a.has_private_key())
    }

    /// Address of account `index` on network `hrp`.
    pub fn address(&self, index: usize, hrp: &str) -> Result<Address, WalletError> {
        Ok(pubkey_to_address(self.account(index)?.public_key(), hrp)?)
    }

    /// Sign `message` with the key of account `index`.
    ///
    /// Hardware-backed accounts fail with `NoPrivateKey`; sign those through
    /// their key source instead.
    pub fn sign_message(&self, index: usize, message: &str) -> Result<SignedMessage, WalletError> {
        let account = self.account(index)?;
        let signature = account.sign(message.as_bytes())?;
        Ok(SignedMessage {
            text: message.to_string(),
            signature: format!("0x{}", hex::encode(signature)),
            public_key: format!("0x{}", account.public_key_hex()),
        })
    }

    /// Sign `message` for account `index` using an external key source.
    pub fn sign_message_with(
        &self,
        source: &dyn KeySource,
        index: usize,
        message: &str,
    ) -> Result<SignedMessage, WalletError> {
        let account = self.account(index)?;
        let signature = source.sign(account.path(), message.as_bytes())?;
        Ok(SignedMessage {
            text: message.to_string(),
            signature: format!("0x{}", hex::encode(signature)),
            public_key: format!("0x{}", account.public_key_hex()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{DeviceKeySource, MemoryDevice};
    use crate::keypair::verify_signature;
    use std::sync::Arc;
    use std::time::Duration;

    const ABANDON: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn abandon_seed() -> Seed {
        mnemonic_to_seed(&parse_mnemonic(ABANDON).unwrap(), "")
    }

    #[test]
    fn test_build_wallet_account_paths() {
        let wallet = build_wallet(&abandon_seed(), 4).unwrap();
        assert_eq!(wallet.accounts().len(), 4);
        for (i, account) in wallet.accounts().iter().enumerate() {
            assert_eq!(account.path(), &HdPath::account(i as u32));
            assert_eq!(account.display_name(), format!("Child Key {}", i));
            assert!(account.has_private_key());
        }
        let master = wallet.secrets().master_keypair().unwrap();
        assert_eq!(master.path(), &HdPath::master());
        assert_eq!(master.display_name(), MASTER_DISPLAY_NAME);
    }

    #[test]
    fn test_build_wallet_deterministic() {
        let a = build_wallet(&abandon_seed(), 3).unwrap();
        let b = build_wallet(&abandon_seed(), 3).unwrap();
        for (x, y) in a.accounts().iter().zip(b.accounts()) {
            assert_eq!(x.public_key(), y.public_key());
            assert_eq!(x.private_key(), y.private_key());
        }
    }

    #[test]
    fn test_accounts_distinct() {
        let wallet = build_wallet(&abandon_seed(), 3).unwrap();
        let accounts = wallet.accounts();
        assert_ne!(accounts[0].public_key(), accounts[1].public_key());
        assert_ne!(accounts[1].public_key(), accounts[2].public_key());
        assert_ne!(
            wallet.secrets().master_keypair().unwrap().public_key(),
            accounts[0].public_key()
        );
    }

    #[test]
    fn test_derive_account_matches_wallet() {
        let seed = abandon_seed();
        let wallet = build_wallet(&seed, 3).unwrap();
        assert_eq!(derive_account(&seed, 2).public_key(), wallet.accounts()[2].public_key());
        assert_eq!(
            derive_master(&seed).public_key(),
            wallet.secrets().master_keypair().unwrap().public_key()
        );
    }

    #[test]
    fn test_zero_accounts_rejected() {
        assert!(matches!(
            build_wallet(&abandon_seed(), 0),
            Err(WalletError::InvalidAccountCount(0))
        ));
    }

    #[test]
    fn test_account_count_validation() {
        assert_eq!(account_count(1).unwrap(), 1);
        assert_eq!(account_count(5).unwrap(), 5);
        assert!(matches!(account_count(0), Err(WalletError::InvalidAccountCount(0))));
        assert!(matches!(account_count(-3), Err(WalletError::InvalidAccountCount(-3))));
        assert!(account_count(MAX_ACCOUNTS as i64 + 1).is_err());
    }

    #[test]
    fn test_from_mnemonic_keeps_phrase() {
        let wallet = Wallet::from_mnemonic(ABANDON, 1).unwrap();
        assert_eq!(wallet.mnemonic().unwrap().phrase(), ABANDON);
        assert!(!wallet.is_hardware_backed());
    }

    #[test]
    fn test_from_invalid_mnemonic() {
        let result = Wallet::from_mnemonic(
            "invalid word word word word word word word word word word word",
            1,
        );
        assert!(matches!(result, Err(WalletError::MnemonicError(_))));
    }

    #[test]
    fn test_random_wallets_differ() {
        let a = Wallet::random(1).unwrap();
        let b = Wallet::random(1).unwrap();
        assert_ne!(a.accounts()[0].public_key(), b.accounts()[0].public_key());
    }

    #[test]
    fn test_sign_message() {
        let wallet = Wallet::from_mnemonic(ABANDON, 2).unwrap();
        let signed = wallet.sign_message(0, "hello").unwrap();
        assert_eq!(signed.text, "hello");
        assert!(signed.signature.starts_with("0x"));

        let signature = hex::decode(&signed.signature[2..]).unwrap();
        let public = hex::decode(&signed.public_key[2..]).unwrap();
        assert!(verify_signature(&public, b"hello", &signature).is_ok());

        let json = serde_json::to_value(&signed).unwrap();
        assert!(json.get("publicKey").is_some());
    }

    #[test]
    fn test_sign_missing_account() {
        let wallet = Wallet::from_mnemonic(ABANDON, 1).unwrap();
        assert!(matches!(
            wallet.sign_message(3, "hello"),
            Err(WalletError::AccountNotFound(3))
        ));
    }

    #[test]
    fn test_hardware_wallet_cannot_sign_locally() {
        let device = MemoryDevice::from_seed(abandon_seed());
        let source = DeviceKeySource::connect(Arc::new(device), Duration::from_secs(5)).unwrap();
        let wallet = Wallet::from_key_source(&source, 2, None).unwrap();

        assert!(wallet.is_hardware_backed());
        assert!(wallet.mnemonic().is_none());
        assert!(matches!(
            wallet.sign_message(0, "hello"),
            Err(WalletError::KeypairError(KeypairError::NoPrivateKey(_)))
        ));

        let signed = wallet.sign_message_with(&source, 0, "hello").unwrap();
        let software = Wallet::from_mnemonic(ABANDON, 1).unwrap();
        assert_eq!(signed, software.sign_message(0, "hello").unwrap());
    }

    #[test]
    fn test_address_for_account() {
        let wallet = Wallet::from_mnemonic(ABANDON, 2).unwrap();
        let address = wallet.address(1, "stest").unwrap();
        assert_eq!(
            address,
            pubkey_to_address(wallet.accounts()[1].public_key(), "stest").unwrap()
        );
    }
}
