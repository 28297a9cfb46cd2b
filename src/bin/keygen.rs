use anyhow::Result;
use quorumchain::crypto;
use std::path::Path;

fn main() -> Result<()> {
    let dir = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "wallet".to_string());

    let (signing_key, verifying_key) = crypto::generate_keypair();
    crypto::save_keypair(Path::new(&dir), &signing_key)?;

    println!("🔑 generated new key-pair in {dir}");
    println!("   address: {}", hex::encode(crypto::address_of(&verifying_key)));
    Ok(())
}
