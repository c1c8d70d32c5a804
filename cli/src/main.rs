//! smcli - Spacemesh wallet command line tool

mod config;
mod display;

use clap::{Parser, Subcommand};
use config::Config;
use display::{render_wallet, KeyEncoding, ReadOptions};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use wallet::mnemonic::MnemonicPhrase;
use wallet::{
    account_count, container, derive_from_device, open, DeviceError, DeviceKeySource,
    ExportOptions, HardwareDevice, OpenOptions, Wallet,
};
use zeroize::Zeroizing;

#[derive(Parser)]
#[command(name = "smcli")]
#[command(about = "Spacemesh wallet tool", version)]
#[command(long_version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("SMCLI_GIT_HASH"), ")"))]
struct Cli {
    /// Config file (defaults to ~/.spacemesh/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Wallet management
    Wallet {
        #[command(subcommand)]
        command: WalletCommands,
    },
}

#[derive(Subcommand)]
enum WalletCommands {
    /// Generate a new wallet file from a BIP-39 mnemonic or a Ledger device
    Create {
        /// Number of accounts to create
        #[arg(default_value_t = 1, allow_negative_numbers = true)]
        accounts: i64,

        /// Read public keys from a Ledger device instead of a mnemonic.
        /// This build has no USB/HID transport, so it reports that no device was found
        #[arg(long)]
        ledger: bool,
    },

    /// Read an existing wallet file and print its accounts
    Read {
        /// Wallet file
        file: PathBuf,

        /// Print private keys and the mnemonic
        #[arg(short, long)]
        private: bool,

        /// Print full keys rather than abbreviated ones
        #[arg(short, long)]
        full: bool,

        /// Print keys in base58 rather than hex
        #[arg(long)]
        base58: bool,

        /// Also print the parent (master) key
        #[arg(long)]
        parent: bool,

        /// Network prefix for addresses (defaults to the configured one)
        #[arg(long)]
        hrp: Option<String>,

        /// Report why a wallet file could not be opened
        #[arg(long)]
        debug: bool,
    },

    /// Sign a message with an account key
    Sign {
        /// Wallet file
        file: PathBuf,

        /// Message to sign
        message: String,

        /// Account to sign with
        #[arg(long, default_value_t = 0)]
        account: usize,

        /// Report why a wallet file could not be opened
        #[arg(long)]
        debug: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Wallet { command } => match command {
            WalletCommands::Create { accounts, ledger } => create(&config, accounts, ledger)?,
            WalletCommands::Read {
                file,
                private,
                full,
                base58,
                parent,
                hrp,
                debug,
            } => {
                let wallet = open_wallet(&file, debug)?;
                let options = ReadOptions {
                    private,
                    full,
                    parent,
                    encoding: if base58 {
                        KeyEncoding::Base58
                    } else {
                        KeyEncoding::Hex
                    },
                };
                let hrp = hrp.unwrap_or_else(|| config.hrp.clone());
                print!("{}", render_wallet(&wallet, &hrp, &options)?);
            }
            WalletCommands::Sign {
                file,
                message,
                account,
                debug,
            } => {
                let wallet = open_wallet(&file, debug)?;
                let signed = wallet.sign_message(account, &message)?;
                println!("{}", serde_json::to_string_pretty(&signed)?);
            }
        },
    }

    Ok(())
}

fn prompt_hidden(prompt: &str) -> std::io::Result<String> {
    rpassword::prompt_password_stdout(prompt)
}

fn open_wallet(file: &Path, debug: bool) -> Result<Wallet, Box<dyn std::error::Error>> {
    let bytes = container::read(file)?;
    let password = prompt_hidden("Enter wallet password: ")?;
    let wallet = open(&bytes, &OpenOptions::new(password).with_debug(debug))?;
    Ok(wallet)
}

// No USB/HID transport is bundled with this build, so no device is ever found.
fn find_ledger() -> Result<Arc<dyn HardwareDevice>, DeviceError> {
    Err(DeviceError::DeviceNotFound)
}

fn create(config: &Config, accounts: i64, ledger: bool) -> Result<(), Box<dyn std::error::Error>> {
    let n = account_count(accounts)?;

    let wallet = if ledger {
        let source = DeviceKeySource::connect(find_ledger()?, config.device_timeout())?;
        source.cancel_on_interrupt()?;
        let wallet = derive_from_device(&source, n)?;
        println!(
            "Note that, when using a hardware wallet, the wallet file won't contain any private \
             keys or mnemonics, but you may still choose to encrypt it to protect privacy."
        );
        wallet
    } else {
        let text = Zeroizing::new(prompt_hidden(
            "Enter a BIP-39-compatible mnemonic (or leave blank to generate a new one): ",
        )?);
        println!("Note: BIP-39 optional passphrases are not supported yet.");

        if text.trim().is_empty() {
            let mnemonic = MnemonicPhrase::generate_with_words(config.word_count)?;
            let wallet = Wallet::with_mnemonic(mnemonic, n)?;
            show_new_mnemonic(&wallet)?;
            wallet
        } else {
            Wallet::from_mnemonic(&text, n)?
        }
    };

    let password = prompt_hidden(
        "Enter a secure password used to encrypt the wallet file (optional but strongly recommended): ",
    )?;
    let options = ExportOptions::new(password).with_kdf(config.kdf);
    if !options.is_encrypted() {
        println!("Warning: the wallet file will NOT be encrypted.");
    }

    config.ensure_data_dir()?;
    let path = config.new_wallet_path();
    let bytes = wallet::export(&wallet, &options)?;
    container::write_new(&path, &bytes)?;

    println!("Wallet saved to {}. BACK UP THIS FILE NOW!", path.display());
    Ok(())
}

fn show_new_mnemonic(wallet: &Wallet) -> std::io::Result<()> {
    let Some(mnemonic) = wallet.mnemonic() else {
        return Ok(());
    };
    println!();
    println!("This is your mnemonic (seed phrase). Write it down and store it safely.");
    println!("It is the ONLY way to restore your wallet.");
    println!("Neither Spacemesh nor anyone else can help you restore your wallet without this mnemonic.");
    println!();
    println!("***********************************");
    println!("SAVE THIS MNEMONIC IN A SAFE PLACE!");
    println!("***********************************");
    println!();
    println!("{}", mnemonic);
    println!();
    println!("Press enter when you have securely saved your mnemonic.");

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_read_flags() {
        let cli = Cli::try_parse_from([
            "smcli", "wallet", "read", "w.json", "--private", "--base58", "--hrp", "stest",
        ])
        .unwrap();
        match cli.command {
            Commands::Wallet {
                command:
                    WalletCommands::Read {
                        private,
                        base58,
                        full,
                        hrp,
                        ..
                    },
            } => {
                assert!(private && base58 && !full);
                assert_eq!(hrp.as_deref(), Some("stest"));
            }
            _ => panic!("Expected wallet read"),
        }
    }

    #[test]
    fn test_parse_create_defaults_to_one_account() {
        let cli = Cli::try_parse_from(["smcli", "wallet", "create"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Wallet {
                command: WalletCommands::Create {
                    accounts: 1,
                    ledger: false
                }
            }
        ));
    }

    #[test]
    fn test_negative_account_count_reaches_validation() {
        let cli = Cli::try_parse_from(["smcli", "wallet", "create", "-2"]).unwrap();
        let Commands::Wallet {
            command: WalletCommands::Create { accounts, .. },
        } = cli.command
        else {
            panic!("Expected wallet create");
        };
        assert!(account_count(accounts).is_err());
    }

    #[test]
    fn test_ledger_reports_missing_device() {
        assert_eq!(find_ledger().err(), Some(DeviceError::DeviceNotFound));
    }

    #[test]
    fn test_ledger_help_mentions_missing_transport() {
        let mut command = Cli::command();
        let help = command
            .find_subcommand_mut("wallet")
            .and_then(|wallet| wallet.find_subcommand_mut("create"))
            .unwrap()
            .render_long_help()
            .to_string();
        let help = help.split_whitespace().collect::<Vec<_>>().join(" ");
        assert!(help.contains("no USB/HID transport"));
    }
}
