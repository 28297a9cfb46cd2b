use crate::{block::Block, crypto, error::ChainError, ledger::Ledger, trie};

/// Full block validation, failing fast on the first violation:
/// per-transaction signature and balance checks (mints are exempt), then
/// the recomputed digest-trie root, then linkage against the previous
/// block. Pure apart from ledger reads.
pub fn validate_block(
    block: &Block,
    ledger: &Ledger,
    previous: Option<&Block>,
) -> Result<(), ChainError> {
    for tx in &block.transactions {
        if tx.is_mint() {
            continue;
        }

        crypto::verify_transaction(tx)?;

        let sender = hex::encode(&tx.sender);
        let balance = ledger.get_balance(&sender)?;
        if balance < tx.amount {
            return Err(ChainError::InsufficientBalance {
                address: sender,
                balance,
                needed: tx.amount,
            });
        }
    }

    let (_, computed) = trie::build_from_hashes(&block.tx_digests());
    if computed != block.merkle_root {
        return Err(ChainError::RootMismatch {
            expected: hex::encode(block.merkle_root),
            computed: hex::encode(computed),
        });
    }

    if let Some(prev) = previous {
        if block.previous_block_hash[..] != prev.current_block_hash[..] {
            return Err(ChainError::LinkageMismatch);
        }
    }

    Ok(())
}
