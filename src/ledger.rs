use crate::{block::Transaction, error::ChainError, storage::BlockStore};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{info, warn};

const BALANCE_PREFIX: &str = "balance-";

/// Authoritative balance view, materialized in the block store's keyspace
/// and derivable at any time by replaying the block log from height 0.
#[derive(Clone)]
pub struct Ledger {
    store: BlockStore,
    // Transfers touch two keys; readers must never see only one applied.
    guard: Arc<RwLock<()>>,
}

impl Ledger {
    pub fn new(store: BlockStore) -> Self {
        Self {
            store,
            guard: Arc::new(RwLock::new(())),
        }
    }

    /// Balance for a hex-encoded address. Unseen addresses hold 0.
    pub fn get_balance(&self, address: &str) -> Result<f64, ChainError> {
        let _r = self.guard.read();
        self.read_balance(address)
    }

    fn read_balance(&self, address: &str) -> Result<f64, ChainError> {
        let key = format!("{BALANCE_PREFIX}{address}");
        match self.store.get(key.as_bytes())? {
            Some(raw) => {
                let text = std::str::from_utf8(&raw)
                    .map_err(|e| ChainError::Storage(format!("balance for {address}: {e}")))?;
                text.parse::<f64>()
                    .map_err(|e| ChainError::Storage(format!("balance for {address}: {e}")))
            }
            None => Ok(0.0),
        }
    }

    fn write_balance(&self, address: &str, balance: f64) -> Result<(), ChainError> {
        let key = format!("{BALANCE_PREFIX}{address}");
        self.store.put(key.as_bytes(), balance.to_string().as_bytes())
    }

    /// Applies one transaction. Mints credit the receiver unconditionally;
    /// transfers debit the sender first and fail whole if the balance is
    /// short. The receiver is re-read after the debit so a self-transfer
    /// nets out to zero.
    pub fn apply_transaction(&self, tx: &Transaction) -> Result<(), ChainError> {
        let receiver = hex::encode(&tx.receiver);

        if tx.is_mint() {
            let _w = self.guard.write();
            let balance = self.read_balance(&receiver)?;
            return self.write_balance(&receiver, balance + tx.amount);
        }

        let sender = hex::encode(&tx.sender);
        let _w = self.guard.write();

        let sender_balance = self.read_balance(&sender)?;
        if sender_balance < tx.amount {
            return Err(ChainError::InsufficientBalance {
                address: sender,
                balance: sender_balance,
                needed: tx.amount,
            });
        }

        self.write_balance(&sender, sender_balance - tx.amount)?;
        let receiver_balance = self.read_balance(&receiver)?;
        self.write_balance(&receiver, receiver_balance + tx.amount)?;
        Ok(())
    }

    /// Drops every balance entry and replays the whole block log in height
    /// order. Individual transaction failures are logged and skipped so one
    /// odd historical block cannot wedge startup.
    pub fn rebuild_from_log(&self) -> Result<(), ChainError> {
        let Some(latest) = self.store.get_latest_block()? else {
            info!("no blocks in store, ledger starts empty");
            return Ok(());
        };

        {
            let _w = self.guard.write();
            self.store.remove_prefix(BALANCE_PREFIX.as_bytes())?;
        }

        info!(tip = latest.height, "rebuilding balances from the block log");
        for height in 0..=latest.height {
            let block = self.store.get_block_by_height(height)?;
            for tx in &block.transactions {
                if let Err(err) = self.apply_transaction(tx) {
                    warn!(height, %err, "skipping transaction during rebuild");
                }
            }
        }
        Ok(())
    }
}
