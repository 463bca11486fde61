//! The external transaction feed, seen as a paginated, untrusted source.
//!
//! RULE: A feed only returns data. Deciding what is new, what is
//! corrupt and what to persist belongs to the reconciliation engine.

use crate::{
    error::{FeedError, FeedResult},
    types::{Amount, BlockHeight},
};
use serde::{Deserialize, Serialize};

mod file;
mod memory;
mod synthetic;

pub use file::JsonFileFeed;
pub use memory::MemoryFeed;
pub use synthetic::{SyntheticChain, EXTERNAL_ADDRESS};

/// One input or output leg of a transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxIo {
    pub address: String,
    pub value: Amount,
}

impl TxIo {
    pub fn new(address: &str, value: Amount) -> Self {
        Self {
            address: address.to_string(),
            value,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedTransaction {
    pub hash: String,
    pub block_height: BlockHeight,
    pub inputs: Vec<TxIo>,
    pub outputs: Vec<TxIo>,
}

impl FeedTransaction {
    /// Outputs received by `account_id` minus inputs it spent.
    /// Negative leg values or overflow mean the feed sent garbage.
    pub fn value_change_for(&self, account_id: &str) -> FeedResult<Amount> {
        let received = sum_for(&self.hash, &self.outputs, account_id)?;
        let spent = sum_for(&self.hash, &self.inputs, account_id)?;
        received.checked_sub(spent).ok_or_else(|| {
            FeedError::Malformed(format!("value change of {} overflows", self.hash))
        })
    }
}

fn sum_for(hash: &str, legs: &[TxIo], account_id: &str) -> FeedResult<Amount> {
    legs.iter()
        .filter(|leg| leg.address == account_id)
        .try_fold(0i64, |acc, leg| {
            if leg.value < 0 {
                return Err(FeedError::Malformed(format!(
                    "negative leg value {} in {hash}",
                    leg.value
                )));
            }
            acc.checked_add(leg.value)
                .ok_or_else(|| FeedError::Malformed(format!("leg values of {hash} overflow")))
        })
}

/// One page of an address's history, newest-first.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddressPage {
    pub transactions: Vec<FeedTransaction>,
}

pub trait TransactionFeed {
    /// Up to `limit` transactions touching `account_id`, skipping the
    /// `offset` newest. An empty page means the history is exhausted.
    fn get_address(&self, account_id: &str, limit: u32, offset: u64) -> FeedResult<AddressPage>;
}

/// Iterates an account's history page by page.
///
/// Ends after the first empty page or the first error. The offset advances
/// by the number of transactions actually returned.
pub struct PageCursor<'a, F: TransactionFeed + ?Sized> {
    feed: &'a F,
    account_id: &'a str,
    page_size: u32,
    max_pages: Option<u32>,
    offset: u64,
    pages_fetched: u32,
    done: bool,
}

impl<'a, F: TransactionFeed + ?Sized> PageCursor<'a, F> {
    pub fn new(feed: &'a F, account_id: &'a str, page_size: u32, max_pages: Option<u32>) -> Self {
        Self {
            feed,
            account_id,
            page_size,
            max_pages,
            offset: 0,
            pages_fetched: 0,
            done: false,
        }
    }

    /// Feed calls made so far, including the final empty one.
    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn fail(&mut self, e: FeedError) -> Option<FeedResult<Vec<FeedTransaction>>> {
        self.done = true;
        Some(Err(e))
    }
}

impl<F: TransactionFeed + ?Sized> Iterator for PageCursor<'_, F> {
    type Item = FeedResult<Vec<FeedTransaction>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(max) = self.max_pages {
            if self.pages_fetched >= max {
                return self.fail(FeedError::Malformed(format!(
                    "history of {} did not end within {max} pages",
                    self.account_id
                )));
            }
        }

        let page = match self
            .feed
            .get_address(self.account_id, self.page_size, self.offset)
        {
            Ok(page) => page,
            Err(e) => return self.fail(e),
        };
        self.pages_fetched += 1;

        let len = page.transactions.len();
        if len == 0 {
            self.done = true;
            return None;
        }
        if len > self.page_size as usize {
            return self.fail(FeedError::Malformed(format!(
                "page of {len} transactions exceeds limit {}",
                self.page_size
            )));
        }
        self.offset += len as u64;
        Some(Ok(page.transactions))
    }
}
