//! Terminal rendering of wallet contents.

use wallet::{Keypair, Wallet, WalletError};

/// Column width for keys unless `--full` is given.
pub const ABBREVIATED_WIDTH: usize = 20;
/// Wide enough for a 64-byte key in hex.
pub const FULL_WIDTH: usize = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEncoding {
    Hex,
    Base58,
}

impl KeyEncoding {
    pub fn encode(&self, bytes: &[u8]) -> String {
        match self {
            KeyEncoding::Hex => hex::encode(bytes),
            KeyEncoding::Base58 => bs58::encode(bytes).into_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    pub private: bool,
    pub full: bool,
    pub parent: bool,
    pub encoding: KeyEncoding,
}

/// Shorten `s` to `max` characters, keeping its head and tail.
pub fn abbreviate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    if max <= 7 {
        return s[..max].to_string();
    }
    format!("{}..{}", &s[..max - 7], &s[s.len() - 5..])
}

fn key_row(
    keypair: &Keypair,
    address: String,
    options: &ReadOptions,
    width: usize,
) -> Vec<String> {
    let mut row = vec![
        address,
        abbreviate(&options.encoding.encode(keypair.public_key()), width),
    ];
    if options.private {
        let private = match keypair.private_key() {
            Some(bytes) => abbreviate(&options.encoding.encode(bytes), width),
            None => "(none)".to_string(),
        };
        row.push(private);
    }
    row.push(keypair.path().to_string());
    row.push(keypair.display_name().to_string());
    row.push(keypair.created().to_rfc3339());
    row
}

/// Lay out the wallet's accounts as a table.
pub fn render_wallet(wallet: &Wallet, hrp: &str, options: &ReadOptions) -> Result<String, WalletError> {
    let width = if options.full { FULL_WIDTH } else { ABBREVIATED_WIDTH };

    let mut header = vec!["address", "pubkey"];
    if options.private {
        header.push("privkey");
    }
    header.extend(["path", "name", "created"]);

    let mut rows: Vec<Vec<String>> = vec![header.iter().map(|h| h.to_string()).collect()];
    if options.parent {
        if let Some(master) = wallet.secrets().master_keypair() {
            rows.push(key_row(master, "N/A".to_string(), options, width));
        }
    }
    for (i, account) in wallet.accounts().iter().enumerate() {
        let address = wallet.address(i, hrp)?.to_string();
        rows.push(key_row(account, address, options, width));
    }

    let columns = rows[0].len();
    let widths: Vec<usize> = (0..columns)
        .map(|c| rows.iter().map(|r| r[c].len()).max().unwrap_or(0))
        .collect();

    let mut out = String::new();
    out.push_str("\n🔑 Wallet Contents\n");
    out.push_str("═══════════════════════════════════\n");
    for (n, row) in rows.iter().enumerate() {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, w)| format!("{:<w$}", cell, w = *w))
            .collect();
        out.push_str(line.join("  ").trim_end());
        out.push('\n');
        if n == 0 {
            let rule: usize = widths.iter().sum::<usize>() + 2 * (columns - 1);
            out.push_str(&"─".repeat(rule));
            out.push('\n');
        }
    }

    if options.private {
        match wallet.mnemonic() {
            Some(mnemonic) => out.push_str(&format!("\nMnemonic: {}\n", mnemonic)),
            None => out.push_str("\nMnemonic: (none)\n"),
        }
    }
    if !options.full {
        out.push_str("\nTo print full keys, use the --full flag.\n");
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABANDON: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn options() -> ReadOptions {
        ReadOptions {
            private: false,
            full: false,
            parent: false,
            encoding: KeyEncoding::Hex,
        }
    }

    #[test]
    fn test_abbreviate() {
        let key = "0123456789abcdef0123456789abcdef";
        assert_eq!(abbreviate(key, 64), key);
        assert_eq!(abbreviate(key, 20), "0123456789abc..bcdef");
        assert_eq!(abbreviate(key, 20).len(), 20);
        assert_eq!(abbreviate(key, 5), "01234");
    }

    #[test]
    fn test_encodings() {
        assert_eq!(KeyEncoding::Hex.encode(&[0, 255]), "00ff");
        assert_eq!(KeyEncoding::Base58.encode(&[0, 0, 1]), "112");
    }

    #[test]
    fn test_render_hides_private_by_default() {
        let wallet = Wallet::from_mnemonic(ABANDON, 2).unwrap();
        let text = render_wallet(&wallet, "sm", &options()).unwrap();

        assert!(text.contains("Child Key 0"));
        assert!(text.contains("Child Key 1"));
        assert!(!text.contains("Master Key"));
        assert!(!text.contains("privkey"));
        assert!(!text.contains("abandon"));
        assert!(text.contains(wallet.address(1, "sm").unwrap().as_str()));
    }

    #[test]
    fn test_render_private_and_parent() {
        let wallet = Wallet::from_mnemonic(ABANDON, 1).unwrap();
        let opts = ReadOptions {
            private: true,
            full: true,
            parent: true,
            ..options()
        };
        let text = render_wallet(&wallet, "sm", &opts).unwrap();

        assert!(text.contains("Master Key"));
        assert!(text.contains(&format!("Mnemonic: {}", ABANDON)));
        let private = hex::encode(wallet.accounts()[0].private_key().unwrap());
        assert!(text.contains(&private));
        assert!(!text.contains("--full"));
    }
}
