use std::{env, fs, process::exit};

use anyhow::{Context, Result};
use krypton_core::{
    currency::Amount, genesis::GenesisConfig, primitives::Address, serial::SerialEncode,
    utils::Saveable, wallet::Wallet,
};

const USAGE: &str =
    "Usage: transaction_generator <wallet> <recipient> <value> <height> <out> [network]";

fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() < 5 || args.len() > 6 {
        eprintln!("{}", USAGE);
        exit(1);
    }

    let wallet = Wallet::load_from_file(&args[0])
        .with_context(|| format!("Failed to load wallet {}", args[0]))?;
    let recipient: Address = args[1].parse().context("Invalid recipient address")?;
    let value: Amount = args[2].parse().context("Invalid value")?;
    let height: u32 = args[3].parse().context("Invalid validity start height")?;
    let network = GenesisConfig::from_any(args.get(5).map_or("test", String::as_str))?;

    let transaction =
        wallet.create_transaction(recipient, value.as_satoshis(), height, network.network_id)?;
    fs::write(&args[4], hex::encode(transaction.to_bytes()))
        .with_context(|| format!("Failed to write transaction to {}", args[4]))?;

    println!("{} {}", transaction.hash(), args[4]);
    Ok(())
}
