use super::{AddressPage, FeedTransaction, TransactionFeed};
use crate::error::{FeedError, FeedResult};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

/// In-process feed over fixed per-account histories, with call-level
/// failure injection. Histories are stored newest-first, exactly as
/// returned; nothing is sorted or validated.
#[derive(Debug, Default)]
pub struct MemoryFeed {
    histories: RefCell<HashMap<String, Vec<FeedTransaction>>>,
    failing_calls: RefCell<HashSet<usize>>,
    calls: Cell<usize>,
}

impl MemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace an account's full history (newest-first).
    pub fn set_history(&self, account_id: &str, transactions: Vec<FeedTransaction>) {
        self.histories
            .borrow_mut()
            .insert(account_id.to_string(), transactions);
    }

    /// Add newly confirmed transactions ahead of the existing history.
    pub fn prepend(&self, account_id: &str, mut newer: Vec<FeedTransaction>) {
        let mut histories = self.histories.borrow_mut();
        let history = histories.entry(account_id.to_string()).or_default();
        newer.append(history);
        *history = newer;
    }

    /// Make the `call`-th request (0-based, across all accounts) fail.
    pub fn fail_call(&self, call: usize) {
        self.failing_calls.borrow_mut().insert(call);
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl TransactionFeed for MemoryFeed {
    fn get_address(&self, account_id: &str, limit: u32, offset: u64) -> FeedResult<AddressPage> {
        let call = self.calls.get();
        self.calls.set(call + 1);
        if self.failing_calls.borrow_mut().remove(&call) {
            return Err(FeedError::Unavailable(format!(
                "injected failure on call {call}"
            )));
        }

        let histories = self.histories.borrow();
        let transactions = histories
            .get(account_id)
            .map(|h| {
                h.iter()
                    .skip(offset as usize)
                    .take(limit as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(AddressPage { transactions })
    }
}
