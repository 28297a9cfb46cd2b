use crate::{block::Block, error::ChainError};
use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use tracing::info;

const LATEST_KEY: &[u8] = b"latest";

/// Durable append-only block log over sled. Blocks are stored under their
/// hash, with a `latest` pointer and a `height-<N>` index alongside; the
/// ledger's `balance-<hex>` entries live in the same keyspace.
#[derive(Clone)]
pub struct BlockStore {
    db: sled::Db,
}

impl BlockStore {
    pub fn open(path: &str) -> Result<Self, ChainError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    fn height_key(height: u64) -> Vec<u8> {
        format!("height-{height}").into_bytes()
    }

    pub fn save_block(&self, block: &Block) -> Result<(), ChainError> {
        let val = encode_to_vec(block, standard())
            .map_err(|e| ChainError::Storage(e.to_string()))?;

        self.db.insert(&block.current_block_hash[..], val)?;
        self.db.insert(LATEST_KEY, &block.current_block_hash[..])?;
        self.db
            .insert(Self::height_key(block.height), &block.current_block_hash[..])?;
        self.db.flush()?;

        info!(
            height = block.height,
            hash = %hex::encode(block.current_block_hash),
            "block persisted"
        );
        Ok(())
    }

    pub fn get_block(&self, hash: &[u8]) -> Result<Block, ChainError> {
        let raw = self
            .db
            .get(hash)?
            .ok_or_else(|| ChainError::BlockNotFound(hex::encode(hash)))?;
        let (block, _) =
            decode_from_slice(&raw, standard()).map_err(|e| ChainError::Storage(e.to_string()))?;
        Ok(block)
    }

    /// `Ok(None)` on an empty store: the caller uses it to detect a fresh
    /// node that still needs its genesis block.
    pub fn get_latest_block(&self) -> Result<Option<Block>, ChainError> {
        match self.db.get(LATEST_KEY)? {
            Some(hash) => Ok(Some(self.get_block(&hash)?)),
            None => Ok(None),
        }
    }

    pub fn get_block_by_height(&self, height: u64) -> Result<Block, ChainError> {
        let hash = self
            .db
            .get(Self::height_key(height))?
            .ok_or_else(|| ChainError::BlockNotFound(format!("height {height}")))?;
        self.get_block(&hash)
    }

    /// All blocks at and above `from_height`, ascending. Empty when the
    /// caller is already current.
    pub fn blocks_from(&self, from_height: u64) -> Result<Vec<Block>, ChainError> {
        let mut blocks = Vec::new();
        let mut height = from_height;
        while let Some(hash) = self.db.get(Self::height_key(height))? {
            blocks.push(self.get_block(&hash)?);
            height += 1;
        }
        Ok(blocks)
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<sled::IVec>, ChainError> {
        Ok(self.db.get(key)?)
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), ChainError> {
        self.db.insert(key, value)?;
        Ok(())
    }

    pub fn remove_prefix(&self, prefix: &[u8]) -> Result<(), ChainError> {
        for entry in self.db.scan_prefix(prefix) {
            let (key, _) = entry?;
            self.db.remove(key)?;
        }
        Ok(())
    }
}
