//! Where account keys come from.
//!
//! Both the seed-based deriver and a hardware device answer the same two
//! questions: "what is the public key at this path" and "sign this payload
//! with the key at this path". Only the seed-based source can hand out
//! private key bytes.

use crate::hd::HdPath;
use crate::keypair::{Keypair, PUBLIC_KEY_LEN, SIGNATURE_LEN};
use crate::mnemonic::Seed;
use crate::wallet::WalletError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySourceKind {
    /// Keys derived on the host from a seed.
    Software,
    /// Keys held by an external device; private bytes never leave it.
    Hardware,
}

pub trait KeySource {
    fn kind(&self) -> KeySourceKind;

    fn public_key(&self, path: &HdPath) -> Result<[u8; PUBLIC_KEY_LEN], WalletError>;

    fn sign(&self, path: &HdPath, payload: &[u8]) -> Result<[u8; SIGNATURE_LEN], WalletError>;

    /// Keypair at `path`. The default carries only the public key.
    fn keypair(&self, path: HdPath, display_name: String) -> Result<Keypair, WalletError> {
        let public = self.public_key(&path)?;
        Ok(Keypair::public_only(public, path, display_name)?)
    }
}

/// Derives keys from a BIP-39 seed on the host.
#[derive(Debug)]
pub struct SeedKeySource {
    seed: Seed,
}

impl SeedKeySource {
    pub fn new(seed: Seed) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> &Seed {
        &self.seed
    }
}

impl KeySource for SeedKeySource {
    fn kind(&self) -> KeySourceKind {
        KeySourceKind::Software
    }

    fn public_key(&self, path: &HdPath) -> Result<[u8; PUBLIC_KEY_LEN], WalletError> {
        Ok(*Keypair::derive(&self.seed, path.clone(), "").public_key())
    }

    fn sign(&self, path: &HdPath, payload: &[u8]) -> Result<[u8; SIGNATURE_LEN], WalletError> {
        Ok(Keypair::derive(&self.seed, path.clone(), "").sign(payload)?)
    }

    fn keypair(&self, path: HdPath, display_name: String) -> Result<Keypair, WalletError> {
        Ok(Keypair::derive(&self.seed, path, display_name))
    }
}
