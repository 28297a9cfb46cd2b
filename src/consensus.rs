//! Leader-driven majority-vote commit protocol.
//!
//! The engine owns all protocol state: the pending transaction queue, the
//! in-flight block map, the vote book, and the chain tip. Each logically
//! distinct map sits behind its own lock so the vote tally never waits on
//! block persistence, and no lock is ever held across an await. All
//! outbound traffic goes through the [`Network`] seam on spawned tasks, so
//! a slow peer cannot stall the local commit path.

use crate::{
    block::{Block, Transaction},
    config::NodeConfig,
    crypto,
    error::ChainError,
    ledger::Ledger,
    storage::BlockStore,
    validate::validate_block,
};
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

const SYNC_ATTEMPTS: u32 = 5;
const SYNC_BACKOFF: Duration = Duration::from_secs(3);
const BATCH_COOLDOWN: Duration = Duration::from_millis(500);

pub type BlockHash = [u8; 32];

/// Approval for one pending block. Ephemeral: lives only for the voting
/// round, never persisted.
#[derive(Clone, Debug)]
pub struct Vote {
    pub voter_id: String,
    pub block_hash: BlockHash,
    pub height: u64,
    pub approved: bool,
}

/// Outbound side of the protocol. Broadcasts are fire-and-forget with
/// bounded retry inside the adapter; only the historical fetch reports
/// failure to the caller.
#[async_trait::async_trait]
pub trait Network: Send + Sync + 'static {
    async fn broadcast_proposal(&self, block: Block);
    async fn send_vote(&self, vote: Vote);
    async fn broadcast_commit(&self, block: Block);
    async fn fetch_blocks_from(&self, height: u64) -> Result<Vec<Block>, ChainError>;
}

struct VoteBook {
    tally: HashMap<BlockHash, usize>,
    committed: HashSet<BlockHash>,
}

struct ChainState {
    latest: Option<Block>,
}

pub struct Engine {
    node_id: String,
    leader: bool,
    total_nodes: usize,
    batch_size: usize,
    batch_timeout: Duration,

    store: BlockStore,
    ledger: Ledger,
    net: Arc<dyn Network>,

    pending_txs: Mutex<Vec<Transaction>>,
    // Single batch build in flight at a time, whichever trigger fired.
    batching: Mutex<bool>,
    pending_blocks: Mutex<HashMap<BlockHash, Block>>,
    votes: Mutex<VoteBook>,
    // Serializes commit application and guards the tip, so commits land in
    // height order even when votes for different blocks race.
    chain: Mutex<ChainState>,
}

impl Engine {
    pub fn new(
        cfg: &NodeConfig,
        store: BlockStore,
        ledger: Ledger,
        net: Arc<dyn Network>,
    ) -> Result<Arc<Self>, ChainError> {
        let latest = store.get_latest_block()?;
        if let Some(tip) = &latest {
            info!(height = tip.height, "chain tip loaded");
        }

        Ok(Arc::new(Self {
            node_id: cfg.node_id.clone(),
            leader: cfg.leader,
            total_nodes: cfg.total_nodes(),
            batch_size: cfg.batch_size,
            batch_timeout: Duration::from_millis(cfg.batch_timeout_ms),
            store,
            ledger,
            net,
            pending_txs: Mutex::new(Vec::new()),
            batching: Mutex::new(false),
            pending_blocks: Mutex::new(HashMap::new()),
            votes: Mutex::new(VoteBook {
                tally: HashMap::new(),
                committed: HashSet::new(),
            }),
            chain: Mutex::new(ChainState { latest }),
        }))
    }

    pub fn is_leader(&self) -> bool {
        self.leader
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn store(&self) -> &BlockStore {
        &self.store
    }

    pub fn latest_block(&self) -> Option<Block> {
        self.chain.lock().latest.clone()
    }

    fn quorum(&self) -> usize {
        self.total_nodes / 2 + 1
    }

    /// Signature-checks and queues a client transaction. On the leader the
    /// sender balance is pre-checked against the live ledger for early
    /// rejection, and a batch build is triggered once the queue reaches
    /// `batch_size` or the idle timer runs out, whichever comes first.
    pub async fn submit_transaction(self: Arc<Self>, tx: Transaction) -> Result<(), ChainError> {
        crypto::verify_transaction(&tx)?;

        if self.leader {
            let sender = hex::encode(&tx.sender);
            let balance = self.ledger.get_balance(&sender)?;
            if balance < tx.amount {
                return Err(ChainError::InsufficientBalance {
                    address: sender,
                    balance,
                    needed: tx.amount,
                });
            }
        }

        let queued = {
            let mut queue = self.pending_txs.lock();
            queue.push(tx);
            queue.len()
        };
        debug!(queued, "transaction queued");

        if !self.leader {
            return Ok(());
        }

        if queued >= self.batch_size {
            if self.begin_batch() {
                tokio::spawn(async move { self.build_batch().await });
            }
        } else {
            // Idle timer. If a size-triggered build drains the queue first,
            // this fires into a no-op behind the batching flag.
            tokio::spawn(async move {
                sleep(self.batch_timeout).await;
                if self.begin_batch() {
                    self.build_batch().await;
                }
            });
        }

        Ok(())
    }

    fn begin_batch(&self) -> bool {
        let mut building = self.batching.lock();
        if *building {
            return false;
        }
        *building = true;
        true
    }

    fn end_batch(&self) {
        *self.batching.lock() = false;
    }

    // Runs with the batching flag held; keeps draining until the queue is
    // empty so transactions that arrive mid-build are not stranded without
    // a trigger.
    async fn build_batch(self: Arc<Self>) {
        loop {
            let txs: Vec<Transaction> = {
                let mut queue = self.pending_txs.lock();
                let take = queue.len().min(self.batch_size);
                queue.drain(..take).collect()
            };

            if txs.is_empty() {
                self.end_batch();
                return;
            }

            Arc::clone(&self).create_and_propose_block(txs).await;
            sleep(BATCH_COOLDOWN).await;
        }
    }

    /// Builds the next block on top of the current tip, records it as
    /// pending with the proposer's own vote, and broadcasts the proposal.
    /// A single-node cluster has its quorum already and commits here.
    pub async fn create_and_propose_block(self: Arc<Self>, txs: Vec<Transaction>) {
        let (prev_hash, height) = {
            let chain = self.chain.lock();
            match &chain.latest {
                Some(tip) => (tip.current_block_hash.to_vec(), tip.height + 1),
                None => (Vec::new(), 0),
            }
        };

        let block = Block::build(txs, prev_hash, height);
        let hash = block.current_block_hash;
        info!(
            height,
            hash = %hex::encode(hash),
            txs = block.transactions.len(),
            "proposing block"
        );

        self.pending_blocks.lock().insert(hash, block.clone());

        let quorum_already = {
            let mut votes = self.votes.lock();
            votes.tally.insert(hash, 1);
            1 >= self.quorum()
        };

        if quorum_already {
            if let Err(err) = self.commit_block(&block) {
                error!(height, %err, "commit after self-quorum failed");
                return;
            }
        }

        let engine = Arc::clone(&self);
        let proposal = block.clone();
        tokio::spawn(async move { engine.net.broadcast_proposal(proposal).await });

        if quorum_already {
            let engine = Arc::clone(&self);
            tokio::spawn(async move { engine.net.broadcast_commit(block).await });
        }
    }

    /// Follower-side proposal handling: validate against the local ledger
    /// and tip, register as pending, and send an approval back to the
    /// leader. A validation failure is returned to the RPC layer so the
    /// leader hears an explicit rejection instead of a silent timeout.
    pub async fn handle_proposed_block(self: Arc<Self>, block: Block) -> Result<(), ChainError> {
        info!(height = block.height, "validating proposed block");

        {
            let chain = self.chain.lock();
            validate_block(&block, &self.ledger, chain.latest.as_ref())?;
        }

        let hash = block.current_block_hash;
        self.pending_blocks.lock().insert(hash, block.clone());

        let vote = Vote {
            voter_id: self.node_id.clone(),
            block_hash: hash,
            height: block.height,
            approved: true,
        };
        tokio::spawn(async move { self.net.send_vote(vote).await });

        debug!(hash = %hex::encode(hash), "approval vote on its way");
        Ok(())
    }

    /// Tallies one vote. The quorum comparison runs under the vote lock as
    /// an exact-crossing test, so of two racing votes only one can observe
    /// the threshold and trigger the commit.
    pub async fn handle_vote(self: Arc<Self>, vote: Vote) -> Result<(), ChainError> {
        debug!(voter = %vote.voter_id, approved = vote.approved, "vote received");

        if !vote.approved {
            return Ok(());
        }
        if vote.voter_id == self.node_id {
            // The proposer's own vote was counted at proposal time.
            return Ok(());
        }

        let block = self.pending_blocks.lock().get(&vote.block_hash).cloned();
        let Some(block) = block else {
            warn!(hash = %hex::encode(vote.block_hash), "vote for unknown block");
            return Err(ChainError::BlockNotFound(hex::encode(vote.block_hash)));
        };

        let (count, reached) = {
            let mut votes = self.votes.lock();
            let tally = votes.tally.entry(vote.block_hash).or_insert(0);
            *tally += 1;
            let count = *tally;
            let reached = count == self.quorum() && !votes.committed.contains(&vote.block_hash);
            (count, reached)
        };
        info!(
            hash = %hex::encode(vote.block_hash),
            count,
            needed = self.quorum(),
            "vote tallied"
        );

        if !reached {
            return Ok(());
        }

        info!(height = block.height, "quorum reached, committing");
        self.commit_block(&block)?;

        tokio::spawn(async move { self.net.broadcast_commit(block).await });
        Ok(())
    }

    /// Commits a block: one last full validation against the live ledger
    /// (the tip may have moved since the vote), persist, apply every
    /// transaction in order, advance the tip. Re-delivery of an already
    /// committed block is a silent no-op.
    pub fn commit_block(&self, block: &Block) -> Result<(), ChainError> {
        let mut chain = self.chain.lock();
        let hash = block.current_block_hash;

        if self.votes.lock().committed.contains(&hash) {
            debug!(height = block.height, "block already committed");
            return Ok(());
        }

        validate_block(block, &self.ledger, chain.latest.as_ref())?;

        self.store.save_block(block)?;

        for tx in &block.transactions {
            if let Err(err) = self.ledger.apply_transaction(tx) {
                // The block is already persisted; losing one transaction
                // here is reported loudly but must not take the node down.
                error!(height = block.height, %err, "transaction in committed block failed to apply");
            }
        }

        chain.latest = Some(block.clone());
        {
            let mut votes = self.votes.lock();
            votes.committed.insert(hash);
            votes.tally.remove(&hash);
        }
        self.pending_blocks.lock().remove(&hash);

        info!(height = block.height, hash = %hex::encode(hash), "block committed");
        Ok(())
    }

    /// Startup / reconnection catch-up: fetch everything above the local
    /// tip from the leader with bounded retry and replay it through the
    /// same commit path as live traffic.
    pub async fn sync_from_leader(self: Arc<Self>) -> Result<(), ChainError> {
        let start = {
            let chain = self.chain.lock();
            chain.latest.as_ref().map(|b| b.height + 1).unwrap_or(0)
        };
        info!(start, "syncing blocks from leader");

        let mut fetched = None;
        for attempt in 1..=SYNC_ATTEMPTS {
            match self.net.fetch_blocks_from(start).await {
                Ok(blocks) => {
                    fetched = Some(blocks);
                    break;
                }
                Err(err) => {
                    warn!(attempt, %err, "leader not reachable, retrying");
                    sleep(SYNC_BACKOFF).await;
                }
            }
        }
        let Some(blocks) = fetched else {
            return Err(ChainError::SyncExhausted);
        };

        if blocks.is_empty() {
            info!("already at the latest height");
            return Ok(());
        }

        info!(count = blocks.len(), "applying blocks from leader");
        for block in blocks {
            let height = block.height;
            self.commit_block(&block)?;
            debug!(height, "synced block committed");
        }
        Ok(())
    }
}
