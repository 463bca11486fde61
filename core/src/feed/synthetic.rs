//! Deterministic synthetic chain.
//!
//! All randomness comes from one seeded Pcg64Mcg stream, so the same
//! seed and the same sequence of `mine_blocks` calls always produce the
//! same chain. Used by the runner's demo mode and by randomized tests.

use super::{AddressPage, FeedTransaction, TransactionFeed, TxIo};
use crate::{
    error::FeedResult,
    types::{Amount, BlockHeight},
};
use rand::{Rng, RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

/// Counterparty for every leg that does not belong to a tracked account.
pub const EXTERNAL_ADDRESS: &str = "external";

const MAX_TXS_PER_BLOCK: u32 = 3;

pub struct SyntheticChain {
    rng: Pcg64Mcg,
    accounts: Vec<String>,
    tip: BlockHeight,
    // Oldest first; reversed on read.
    transactions: Vec<FeedTransaction>,
}

impl SyntheticChain {
    pub fn new(seed: u64, accounts: &[&str]) -> Self {
        Self {
            rng: Pcg64Mcg::seed_from_u64(seed),
            accounts: accounts.iter().map(|a| a.to_string()).collect(),
            tip: 0,
            transactions: Vec::new(),
        }
    }

    pub fn tip(&self) -> BlockHeight {
        self.tip
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    /// Append `n` blocks, each carrying 0..=3 transactions.
    pub fn mine_blocks(&mut self, n: u64) {
        for _ in 0..n {
            self.tip += 1;
            let count = self.rng.gen_range(0..=MAX_TXS_PER_BLOCK);
            for _ in 0..count {
                let tx = self.random_transaction();
                self.transactions.push(tx);
            }
        }
    }

    /// Balance an account must reach once fully reconciled.
    pub fn expected_balance(&self, account_id: &str) -> Amount {
        self.transactions
            .iter()
            .filter_map(|tx| tx.value_change_for(account_id).ok())
            .sum()
    }

    /// Transactions touching `account_id`, newest-first.
    pub fn history(&self, account_id: &str) -> Vec<FeedTransaction> {
        self.transactions
            .iter()
            .rev()
            .filter(|tx| touches(tx, account_id))
            .cloned()
            .collect()
    }

    fn random_transaction(&mut self) -> FeedTransaction {
        let from = self.pick_address();
        let to = self.pick_address();
        let value: Amount = self.rng.gen_range(1_000..=5_000_000);
        let change: Amount = self.rng.gen_range(0..=value);
        let hash = format!("{:016x}{:08x}", self.rng.next_u64(), self.transactions.len());

        FeedTransaction {
            hash,
            block_height: self.tip,
            inputs: vec![TxIo::new(&from, value + change)],
            outputs: vec![TxIo::new(&to, value), TxIo::new(&from, change)],
        }
    }

    fn pick_address(&mut self) -> String {
        let idx = self.rng.gen_range(0..=self.accounts.len());
        self.accounts
            .get(idx)
            .cloned()
            .unwrap_or_else(|| EXTERNAL_ADDRESS.to_string())
    }
}

fn touches(tx: &FeedTransaction, account_id: &str) -> bool {
    tx.inputs
        .iter()
        .chain(tx.outputs.iter())
        .any(|leg| leg.address == account_id)
}

impl TransactionFeed for SyntheticChain {
    fn get_address(&self, account_id: &str, limit: u32, offset: u64) -> FeedResult<AddressPage> {
        let transactions = self
            .transactions
            .iter()
            .rev()
            .filter(|tx| touches(tx, account_id))
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok(AddressPage { transactions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_chain() {
        let mut a = SyntheticChain::new(7, &["alice", "bob"]);
        let mut b = SyntheticChain::new(7, &["alice", "bob"]);
        a.mine_blocks(50);
        b.mine_blocks(50);
        assert_eq!(a.history("alice"), b.history("alice"));
        assert_eq!(a.expected_balance("bob"), b.expected_balance("bob"));
    }

    #[test]
    fn history_is_newest_first() {
        let mut chain = SyntheticChain::new(99, &["alice"]);
        chain.mine_blocks(100);
        let heights: Vec<BlockHeight> = chain.history("alice").iter().map(|t| t.block_height).collect();
        assert!(heights.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(chain.tip(), 100);
    }
}
