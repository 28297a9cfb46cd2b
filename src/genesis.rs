use crate::{
    block::{Block, Transaction},
    storage::BlockStore,
};
use anyhow::{Context, Result, bail};
use bincode::config::standard;
use serde::Deserialize;
use std::{collections::BTreeMap, fs, path::Path};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct GenesisAlloc {
    pub alloc: BTreeMap<String, AllocEntry>,
}

#[derive(Debug, Deserialize)]
pub struct AllocEntry {
    pub balance: f64,
}

/// Builds the height-0 block from an alloc file: one mint transaction per
/// funded address. The alloc map is ordered so the block hash does not
/// depend on map iteration.
pub fn build_genesis_block(alloc_path: &Path) -> Result<Block> {
    let raw = fs::read_to_string(alloc_path)
        .with_context(|| format!("reading `{}`", alloc_path.display()))?;
    let data: GenesisAlloc = serde_json::from_str(&raw).context("parsing genesis alloc JSON")?;

    let mut txs = Vec::with_capacity(data.alloc.len());
    for (address, entry) in &data.alloc {
        let receiver = hex::decode(address)
            .with_context(|| format!("address `{address}` in alloc is not hex"))?;
        txs.push(Transaction::mint(receiver, entry.balance));
    }
    if txs.is_empty() {
        bail!("genesis alloc is empty");
    }

    Ok(Block::build(txs, Vec::new(), 0))
}

pub fn write_genesis_file(block: &Block, path: &Path) -> Result<()> {
    let bytes = bincode::serde::encode_to_vec(block, standard())
        .context("encoding genesis block")?;
    fs::write(path, bytes).with_context(|| format!("writing `{}`", path.display()))?;
    Ok(())
}

pub fn load_genesis_file(path: &Path) -> Result<Block> {
    let bytes = fs::read(path).with_context(|| format!("reading `{}`", path.display()))?;
    let (block, _) = bincode::serde::decode_from_slice(&bytes, standard())
        .context("decoding genesis block")?;
    Ok(block)
}

/// First-boot bootstrap: a fresh store (no `latest` pointer) gets the
/// pre-built genesis block saved before normal operation begins.
pub fn bootstrap_if_empty(store: &BlockStore, genesis_path: &Path) -> Result<()> {
    if store.get_latest_block()?.is_some() {
        return Ok(());
    }

    info!(path = %genesis_path.display(), "empty store, loading genesis block");
    let genesis = load_genesis_file(genesis_path)?;
    if genesis.height != 0 {
        bail!("genesis file holds a block at height {}", genesis.height);
    }

    store.save_block(&genesis)?;
    info!("genesis block written");
    Ok(())
}
