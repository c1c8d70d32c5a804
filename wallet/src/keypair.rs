//! Account keypairs
//!
//! A keypair always carries its ed25519 public key. The private half is the
//! 64-byte ed25519 keypair encoding (secret seed followed by the public key)
//! and is absent for hardware-backed accounts.

use crate::hd::{ExtendedKey, HdPath};
use crate::mnemonic::Seed;
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use thiserror::Error;
use zeroize::Zeroizing;

pub const PUBLIC_KEY_LEN: usize = 32;
pub const PRIVATE_KEY_LEN: usize = 64;
pub const SIGNATURE_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum KeypairError {
    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Invalid private key")]
    InvalidPrivateKey,

    #[error("Private key does not match public key")]
    KeyMismatch,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Keypair at {0} has no private key (hardware-backed)")]
    NoPrivateKey(HdPath),
}

#[derive(Clone, PartialEq, Eq)]
pub struct Keypair {
    public: [u8; PUBLIC_KEY_LEN],
    private: Option<Zeroizing<[u8; PRIVATE_KEY_LEN]>>,
    path: HdPath,
    display_name: String,
    created: DateTime<Utc>,
}

impl Keypair {
    /// Derive the keypair at `path` from a seed.
    pub fn derive(seed: &Seed, path: HdPath, display_name: impl Into<String>) -> Self {
        let node = ExtendedKey::derive_path(seed, &path);
        let signing_key = SigningKey::from_bytes(node.private_key());
        Self {
            public: signing_key.verifying_key().to_bytes(),
            private: Some(Zeroizing::new(signing_key.to_keypair_bytes())),
            path,
            display_name: display_name.into(),
            created: Utc::now(),
        }
    }

    /// A keypair whose private key lives elsewhere, e.g. on a hardware device.
    pub fn public_only(
        public: [u8; PUBLIC_KEY_LEN],
        path: HdPath,
        display_name: impl Into<String>,
    ) -> Result<Self, KeypairError> {
        VerifyingKey::from_bytes(&public).map_err(|_| KeypairError::InvalidPublicKey)?;
        Ok(Self {
            public,
            private: None,
            path,
            display_name: display_name.into(),
            created: Utc::now(),
        })
    }

    /// Rebuild a keypair from stored parts. `private` must be empty or a full
    /// 64-byte keypair matching `public`.
    pub fn from_parts(
        public: &[u8],
        private: &[u8],
        path: HdPath,
        display_name: String,
        created: DateTime<Utc>,
    ) -> Result<Self, KeypairError> {
        let public: [u8; PUBLIC_KEY_LEN] = public
            .try_into()
            .map_err(|_| KeypairError::InvalidPublicKey)?;
        VerifyingKey::from_bytes(&public).map_err(|_| KeypairError::InvalidPublicKey)?;

        let private = match private.len() {
            0 => None,
            PRIVATE_KEY_LEN => {
                let mut bytes = Zeroizing::new([0u8; PRIVATE_KEY_LEN]);
                bytes.copy_from_slice(private);
                // checks that the trailing public half matches the secret
                let signing_key = SigningKey::from_keypair_bytes(&bytes)
                    .map_err(|_| KeypairError::KeyMismatch)?;
                if signing_key.verifying_key().to_bytes() != public {
                    return Err(KeypairError::KeyMismatch);
                }
                Some(bytes)
            }
            _ => return Err(KeypairError::InvalidPrivateKey),
        };

        Ok(Self {
            public,
            private,
            path,
            display_name,
            created,
        })
    }

    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.public
    }

    /// Private key bytes, or `None` for hardware-backed keypairs.
    pub fn private_key(&self) -> Option<&[u8; PRIVATE_KEY_LEN]> {
        self.private.as_deref()
    }

    pub fn has_private_key(&self) -> bool {
        self.private.is_some()
    }

    pub fn path(&self) -> &HdPath {
        &self.path
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// Get the public key as hex string
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public)
    }

    /// Sign `message` with the local private key.
    ///
    /// Fails with [`KeypairError::NoPrivateKey`] for hardware-backed keypairs;
    /// those must be signed through their key source.
    pub fn sign(&self, message: &[u8]) -> Result<[u8; SIGNATURE_LEN], KeypairError> {
        let private = self
            .private
            .as_ref()
            .ok_or_else(|| KeypairError::NoPrivateKey(self.path.clone()))?;
        let signing_key =
            SigningKey::from_keypair_bytes(private).map_err(|_| KeypairError::InvalidPrivateKey)?;
        Ok(signing_key.sign(message).to_bytes())
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("public", &self.public_key_hex())
            .field("has_private", &self.has_private_key())
            .field("path", &self.path)
            .field("display_name", &self.display_name)
            .field("created", &self.created)
            .finish()
    }
}

/// Verify an ed25519 signature over `message`.
pub fn verify_signature(
    public_key: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<(), KeypairError> {
    let public: [u8; PUBLIC_KEY_LEN] = public_key
        .try_into()
        .map_err(|_| KeypairError::InvalidPublicKey)?;
    let verifying_key =
        VerifyingKey::from_bytes(&public).map_err(|_| KeypairError::InvalidPublicKey)?;
    let signature: [u8; SIGNATURE_LEN] = signature
        .try_into()
        .map_err(|_| KeypairError::InvalidSignature)?;
    verifying_key
        .verify(message, &Signature::from_bytes(&signature))
        .map_err(|_| KeypairError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed() -> Seed {
        Seed::from_bytes([42u8; 64])
    }

    #[test]
    fn test_derive_has_consistent_halves() {
        let kp = Keypair::derive(&seed(), HdPath::account(0), "Child Key 0");
        let private = kp.private_key().unwrap();
        assert_eq!(&private[32..], kp.public_key());
        assert_eq!(kp.display_name(), "Child Key 0");
    }

    #[test]
    fn test_sign_and_verify() {
        let kp = Keypair::derive(&seed(), HdPath::account(0), "Child Key 0");
        let message = b"test message";

        let signature = kp.sign(message).unwrap();
        assert!(verify_signature(kp.public_key(), message, &signature).is_ok());
        assert!(verify_signature(kp.public_key(), b"wrong message", &signature).is_err());
    }

    #[test]
    fn test_public_only_cannot_sign() {
        let derived = Keypair::derive(&seed(), HdPath::account(1), "Child Key 1");
        let kp = Keypair::public_only(*derived.public_key(), HdPath::account(1), "Child Key 1")
            .unwrap();

        assert!(!kp.has_private_key());
        match kp.sign(b"hello") {
            Err(KeypairError::NoPrivateKey(path)) => assert_eq!(path, HdPath::account(1)),
            other => panic!("Expected NoPrivateKey, got {:?}", other),
        }
    }

    #[test]
    fn test_from_parts_roundtrip() {
        let kp = Keypair::derive(&seed(), HdPath::account(2), "Child Key 2");
        let rebuilt = Keypair::from_parts(
            kp.public_key(),
            kp.private_key().unwrap(),
            kp.path().clone(),
            kp.display_name().to_string(),
            kp.created(),
        )
        .unwrap();
        assert_eq!(kp, rebuilt);
    }

    #[test]
    fn test_from_parts_rejects_partial_private_key() {
        let kp = Keypair::derive(&seed(), HdPath::account(0), "Child Key 0");
        let private = kp.private_key().unwrap();
        let result = Keypair::from_parts(
            kp.public_key(),
            &private[..32],
            kp.path().clone(),
            String::new(),
            kp.created(),
        );
        assert!(matches!(result, Err(KeypairError::InvalidPrivateKey)));
    }

    #[test]
    fn test_from_parts_rejects_mismatched_keys() {
        let a = Keypair::derive(&seed(), HdPath::account(0), "a");
        let b = Keypair::derive(&seed(), HdPath::account(1), "b");
        let result = Keypair::from_parts(
            a.public_key(),
            b.private_key().unwrap(),
            a.path().clone(),
            String::new(),
            a.created(),
        );
        assert!(matches!(result, Err(KeypairError::KeyMismatch)));
    }

    #[test]
    fn test_debug_hides_private_key() {
        let kp = Keypair::derive(&seed(), HdPath::account(0), "Child Key 0");
        let secret_hex = hex::encode(&kp.private_key().unwrap()[..32]);
        assert!(!format!("{:?}", kp).contains(&secret_hex));
    }
}
