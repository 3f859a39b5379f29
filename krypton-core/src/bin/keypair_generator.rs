use std::{env, process::exit};

use anyhow::{Context, Result};
use krypton_core::{utils::Saveable, wallet::Wallet};

fn main() -> Result<()> {
    let name = if let Some(arg) = env::args().nth(1) {
        arg
    } else {
        eprintln!("Usage: keypair_generator <name>");
        exit(1);
    };

    let wallet = Wallet::generate();
    let path = name + ".wallet.json";
    wallet
        .save_to_file(&path)
        .with_context(|| format!("Failed to save wallet to {}", path))?;

    println!("{} {}", wallet.address().to_user_friendly_address(), path);
    Ok(())
}
