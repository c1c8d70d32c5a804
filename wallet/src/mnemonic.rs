//! BIP-39 mnemonic support
//!
//! Mnemonics are the only recovery path for a software wallet: the same phrase
//! and account count always rebuild the same accounts.

use bip39::{Language, Mnemonic};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroizing;

/// Word count used when the caller does not ask for a specific length.
pub const DEFAULT_WORD_COUNT: usize = 24;

/// Length of a BIP-39 seed in bytes.
pub const SEED_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum MnemonicError {
    #[error("Invalid mnemonic phrase: {0}")]
    InvalidMnemonic(String),

    #[error("Invalid word count: {0} (must be 12, 15, 18, 21, or 24)")]
    InvalidWordCount(usize),
}

/// A validated English BIP-39 phrase. The words are wiped from memory on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct MnemonicPhrase {
    phrase: Zeroizing<String>,
}

/// Seed derived from a mnemonic. Never persisted.
#[derive(Clone)]
pub struct Seed(Zeroizing<[u8; SEED_LEN]>);

impl Seed {
    /// Wrap raw seed bytes, e.g. from a test vector.
    pub fn from_bytes(bytes: [u8; SEED_LEN]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; SEED_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for Seed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Seed(..)")
    }
}

/// Generate a new random mnemonic with the default word count.
///
/// Entropy comes from the operating system CSPRNG.
pub fn generate_mnemonic() -> MnemonicPhrase {
    match MnemonicPhrase::generate_with_words(DEFAULT_WORD_COUNT) {
        Ok(phrase) => phrase,
        // 24 words is always a valid length and 32 bytes always valid entropy
        Err(_) => unreachable!("default word count is valid"),
    }
}

/// Parse and validate a user supplied phrase.
///
/// Surrounding whitespace (including a trailing CRLF) is ignored. The error
/// never echoes the submitted words.
pub fn parse_mnemonic(words: &str) -> Result<MnemonicPhrase, MnemonicError> {
    let mnemonic = Mnemonic::parse_in(Language::English, words.trim())
        .map_err(|e| MnemonicError::InvalidMnemonic(e.to_string()))?;
    Ok(MnemonicPhrase::from_mnemonic(&mnemonic))
}

/// Stretch a mnemonic into a seed.
///
/// `passphrase` is the optional BIP-39 extension word. Wallet creation always
/// passes `""`; the parameter is kept so that phrases protected by a
/// passphrase elsewhere can still be handled here later.
pub fn mnemonic_to_seed(mnemonic: &MnemonicPhrase, passphrase: &str) -> Seed {
    // The phrase was validated on construction, re-parsing cannot fail.
    let seed = match Mnemonic::parse_in(Language::English, mnemonic.phrase()) {
        Ok(parsed) => parsed.to_seed_normalized(passphrase),
        Err(_) => unreachable!("MnemonicPhrase is always valid"),
    };
    Seed(Zeroizing::new(seed))
}

impl MnemonicPhrase {
    /// Generate a random phrase of `word_count` words (12, 15, 18, 21 or 24).
    pub fn generate_with_words(word_count: usize) -> Result<Self, MnemonicError> {
        if ![12, 15, 18, 21, 24].contains(&word_count) {
            return Err(MnemonicError::InvalidWordCount(word_count));
        }

        // 3 words per 32 bits of entropy
        let entropy_len = word_count / 3 * 4;
        let mut entropy = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut entropy[..entropy_len]);

        let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy[..entropy_len])
            .map_err(|e| MnemonicError::InvalidMnemonic(e.to_string()))?;
        Ok(Self::from_mnemonic(&mnemonic))
    }

    /// Create from an existing phrase
    pub fn from_phrase(phrase: &str) -> Result<Self, MnemonicError> {
        parse_mnemonic(phrase)
    }

    fn from_mnemonic(mnemonic: &Mnemonic) -> Self {
        Self {
            phrase: Zeroizing::new(mnemonic.to_string()),
        }
    }

    /// Get the phrase as a string
    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    /// Get word count
    pub fn word_count(&self) -> usize {
        self.phrase.split_whitespace().count()
    }

    /// Derive the BIP-39 seed for this phrase.
    pub fn to_seed(&self, passphrase: &str) -> Seed {
        mnemonic_to_seed(self, passphrase)
    }
}

impl std::fmt::Display for MnemonicPhrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.phrase.as_str())
    }
}

impl std::fmt::Debug for MnemonicPhrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MnemonicPhrase")
            .field("words", &self.word_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABANDON: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_generate_default_word_count() {
        let mnemonic = generate_mnemonic();
        assert_eq!(mnemonic.word_count(), DEFAULT_WORD_COUNT);
    }

    #[test]
    fn test_generate_mnemonic_12_words() {
        let mnemonic = MnemonicPhrase::generate_with_words(12).unwrap();
        assert_eq!(mnemonic.word_count(), 12);
        assert!(parse_mnemonic(mnemonic.phrase()).is_ok());
    }

    #[test]
    fn test_generated_mnemonics_differ() {
        assert_ne!(generate_mnemonic(), generate_mnemonic());
    }

    #[test]
    fn test_invalid_word_count() {
        match MnemonicPhrase::generate_with_words(13) {
            Err(MnemonicError::InvalidWordCount(13)) => {}
            _ => panic!("Expected InvalidWordCount error"),
        }
    }

    #[test]
    fn test_invalid_mnemonic() {
        let result =
            parse_mnemonic("invalid word word word word word word word word word word word");
        assert!(matches!(result, Err(MnemonicError::InvalidMnemonic(_))));
    }

    #[test]
    fn test_bad_checksum_rejected() {
        // valid words, last word breaks the checksum
        let phrase = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon";
        assert!(matches!(
            parse_mnemonic(phrase),
            Err(MnemonicError::InvalidMnemonic(_))
        ));
    }

    #[test]
    fn test_unsupported_length_rejected() {
        let phrase = "abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
        assert!(parse_mnemonic(phrase).is_err());
    }

    #[test]
    fn test_error_does_not_echo_words() {
        let err = parse_mnemonic("zebra zebra zebra zebra zebra zebra zebra zebra zebra zebra zebra zebrax")
            .unwrap_err();
        assert!(!err.to_string().contains("zebrax"));
    }

    #[test]
    fn test_whitespace_trimmed() {
        let phrase = parse_mnemonic(&format!("  {}\r\n", ABANDON)).unwrap();
        assert_eq!(phrase.phrase(), ABANDON);
    }

    #[test]
    fn test_known_seed_vector() {
        let phrase = parse_mnemonic(ABANDON).unwrap();
        let seed = mnemonic_to_seed(&phrase, "");
        assert_eq!(
            hex::encode(seed.as_bytes()),
            "5eb00bbddcf069084889a8ab9155568165f5c453ccb85e70811aaed6f6da5fc19a5ac40b389cd370d086206dec8aa6c43daea6690f20ad3d8d48b2d2ce9e38e4"
        );
    }

    #[test]
    fn test_seed_deterministic() {
        let phrase = parse_mnemonic(ABANDON).unwrap();
        assert_eq!(phrase.to_seed("").as_bytes(), phrase.to_seed("").as_bytes());
    }

    #[test]
    fn test_passphrase_changes_seed() {
        let phrase = parse_mnemonic(ABANDON).unwrap();
        assert_ne!(phrase.to_seed("").as_bytes(), phrase.to_seed("TREZOR").as_bytes());
    }

    #[test]
    fn test_debug_redacts_words() {
        let phrase = parse_mnemonic(ABANDON).unwrap();
        assert!(!format!("{:?}", phrase).contains("abandon"));
    }
}
