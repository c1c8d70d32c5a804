use wallet::{container, open, ExportOptions, NetworkType, OpenOptions, Wallet};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Spacemesh Wallet Example ===\n");

    // Create a new wallet with three accounts
    println!("Creating new wallet...");
    let wallet = Wallet::random(3)?;
    let hrp = NetworkType::Testnet.hrp();

    println!("✓ Wallet created!");
    println!("  Mnemonic words: {}", wallet.mnemonic().map_or(0, |m| m.word_count()));
    for (i, account) in wallet.accounts().iter().enumerate() {
        println!("  {} {} {}", account.display_name(), account.path(), wallet.address(i, hrp)?);
    }
    println!();

    // Sign a message with the first account
    println!("Signing message with account 0...");
    let signed = wallet.sign_message(0, "hello spacemesh")?;
    println!("✓ {}\n", serde_json::to_string_pretty(&signed)?);

    // Save wallet to file
    let dir = tempfile::tempdir()?;
    let wallet_file = dir.path().join("wallet.json");
    println!("Saving encrypted wallet...");
    let bytes = wallet::export(&wallet, &ExportOptions::new("correct-horse"))?;
    container::write_new(&wallet_file, &bytes)?;
    println!("✓ Wallet saved to: {}\n", wallet_file.display());

    // Load wallet from file
    println!("Loading wallet from file...");
    let loaded = open(&container::read(&wallet_file)?, &OpenOptions::new("correct-horse"))?;
    println!("✓ Wallet loaded!");
    println!("  Addresses match: {}", loaded.address(0, hrp)? == wallet.address(0, hrp)?);

    println!("\n✅ All operations completed successfully!");

    Ok(())
}
