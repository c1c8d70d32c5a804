//! Spacemesh Wallet Secrets
//!
//! Everything in a wallet that touches key material:
//! - BIP-39 mnemonics and seeds
//! - SLIP-0010 ed25519 derivation of a master key and sequential accounts
//! - Hardware key sources with bounded, cancellable device requests
//! - A versioned container, encrypted with AES-256-GCM under Argon2id or PBKDF2
//! - Bech32 account addresses with a network prefix
//!
//! All operations are synchronous. Secrets are wiped from memory on drop and
//! never logged.

pub mod address;
pub mod container;
pub mod hardware;
pub mod hd;
pub mod kdf;
pub mod key_source;
pub mod keypair;
pub mod mnemonic;
pub mod wallet;

pub use address::{pubkey_to_address, Address, AddressError, NetworkType, DEFAULT_HRP};
pub use container::{export, open, ContainerError, ExportOptions, OpenOptions};
pub use hardware::{derive_from_device, DeviceError, DeviceKeySource, HardwareDevice, MemoryDevice};
pub use hd::{HdPath, PathError};
pub use kdf::KdfConfig;
pub use key_source::{KeySource, KeySourceKind, SeedKeySource};
pub use keypair::{verify_signature, Keypair, KeypairError};
pub use mnemonic::{generate_mnemonic, mnemonic_to_seed, parse_mnemonic, MnemonicError, MnemonicPhrase, Seed};
pub use wallet::{
    account_count, build_wallet, derive_account, derive_master, Secrets, SignedMessage, Wallet,
    WalletError, WalletMeta,
};
