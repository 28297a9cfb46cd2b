use anyhow::Result;
use quorumchain::genesis;
use std::path::Path;

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let alloc = args.next().unwrap_or_else(|| "genesis.json".to_string());
    let out = args.next().unwrap_or_else(|| "genesis.dat".to_string());

    let block = genesis::build_genesis_block(Path::new(&alloc))?;
    genesis::write_genesis_file(&block, Path::new(&out))?;

    println!("genesis block written to {out}");
    println!("  hash:        {}", hex::encode(block.current_block_hash));
    println!("  merkle root: {}", hex::encode(block.merkle_root));
    println!("  mints:       {}", block.transactions.len());
    Ok(())
}
