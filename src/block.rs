use crate::trie;
use blake3::Hasher;
use serde::{Deserialize, Serialize};

/// Sentinel sender for mint transactions. They carry no signature and only
/// ever appear in the height-0 block.
pub const GENESIS_SENDER: &[u8] = b"GENESIS";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    pub sender:     Vec<u8>,
    pub receiver:   Vec<u8>,
    pub amount:     f64,
    pub timestamp:  i64,
    pub signature:  Vec<u8>,
    pub public_key: Vec<u8>,
}

impl Transaction {
    pub fn new(sender: Vec<u8>, receiver: Vec<u8>, amount: f64) -> Self {
        Self {
            sender,
            receiver,
            amount,
            timestamp: chrono::Utc::now().timestamp(),
            signature: Vec::new(),
            public_key: Vec::new(),
        }
    }

    pub fn mint(receiver: Vec<u8>, amount: f64) -> Self {
        Self {
            sender: GENESIS_SENDER.to_vec(),
            receiver,
            amount,
            timestamp: 0,
            signature: Vec::new(),
            public_key: Vec::new(),
        }
    }

    pub fn is_mint(&self) -> bool {
        self.sender == GENESIS_SENDER
    }

    // The transaction's identity: a digest over every field except the
    // signature and public key, so signing does not move the identity.
    pub fn digest(&self) -> [u8; 32] {
        let mut h = Hasher::new();
        h.update(&(self.sender.len() as u64).to_be_bytes());
        h.update(&self.sender);
        h.update(&(self.receiver.len() as u64).to_be_bytes());
        h.update(&self.receiver);
        h.update(&self.amount.to_be_bytes());
        h.update(&self.timestamp.to_be_bytes());
        h.finalize().into()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    pub height:              u64,
    pub transactions:        Vec<Transaction>,
    pub merkle_root:         [u8; 32],
    pub previous_block_hash: Vec<u8>,
    pub current_block_hash:  [u8; 32],
    pub timestamp:           i64,
}

impl Block {
    /// Assembles a block over `transactions`, embedding the digest-trie root
    /// and stamping its own content hash.
    pub fn build(transactions: Vec<Transaction>, previous_block_hash: Vec<u8>, height: u64) -> Self {
        let digests: Vec<[u8; 32]> = transactions.iter().map(Transaction::digest).collect();
        let (_, merkle_root) = trie::build_from_hashes(&digests);

        let mut block = Self {
            height,
            transactions,
            merkle_root,
            previous_block_hash,
            current_block_hash: [0u8; 32],
            timestamp: chrono::Utc::now().timestamp(),
        };
        block.current_block_hash = block.hash();
        block
    }

    // Content hash. `current_block_hash` is never part of its own input.
    pub fn hash(&self) -> [u8; 32] {
        let mut h = Hasher::new();
        h.update(&self.height.to_be_bytes());
        h.update(&(self.previous_block_hash.len() as u64).to_be_bytes());
        h.update(&self.previous_block_hash);
        h.update(&self.merkle_root);
        h.update(&self.timestamp.to_be_bytes());
        h.update(&(self.transactions.len() as u64).to_be_bytes());
        for tx in &self.transactions {
            h.update(&tx.digest());
        }
        h.finalize().into()
    }

    pub fn tx_digests(&self) -> Vec<[u8; 32]> {
        self.transactions.iter().map(Transaction::digest).collect()
    }
}

#[cfg(feature = "grpc")]
mod wire {
    use super::{Block, Transaction};
    use crate::pb;
    use anyhow::{Result, bail};

    impl Transaction {
        pub fn to_proto(&self) -> pb::Transaction {
            pb::Transaction {
                sender:     self.sender.clone(),
                receiver:   self.receiver.clone(),
                amount:     self.amount,
                timestamp:  self.timestamp,
                signature:  self.signature.clone(),
                public_key: self.public_key.clone(),
            }
        }

        pub fn from_proto(tx: pb::Transaction) -> Self {
            Self {
                sender:     tx.sender,
                receiver:   tx.receiver,
                amount:     tx.amount,
                timestamp:  tx.timestamp,
                signature:  tx.signature,
                public_key: tx.public_key,
            }
        }
    }

    impl Block {
        pub fn to_proto(&self) -> pb::Block {
            pb::Block {
                height:              self.height,
                transactions:        self.transactions.iter().map(Transaction::to_proto).collect(),
                merkle_root:         self.merkle_root.to_vec(),
                previous_block_hash: self.previous_block_hash.clone(),
                current_block_hash:  self.current_block_hash.to_vec(),
                timestamp:           self.timestamp,
            }
        }

        pub fn from_proto(block: pb::Block) -> Result<Self> {
            let Ok(merkle_root) = <[u8; 32]>::try_from(block.merkle_root.as_slice()) else {
                bail!("merkle root must be 32 bytes, got {}", block.merkle_root.len());
            };
            let Ok(current_block_hash) = <[u8; 32]>::try_from(block.current_block_hash.as_slice())
            else {
                bail!(
                    "block hash must be 32 bytes, got {}",
                    block.current_block_hash.len()
                );
            };

            Ok(Self {
                height: block.height,
                transactions: block
                    .transactions
                    .into_iter()
                    .map(Transaction::from_proto)
                    .collect(),
                merkle_root,
                previous_block_hash: block.previous_block_hash,
                current_block_hash,
                timestamp: block.timestamp,
            })
        }
    }
}
