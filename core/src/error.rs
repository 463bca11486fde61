use crate::types::{AccountId, Amount, BlockHeight};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Account '{account_id}' not found")]
    AccountNotFound { account_id: AccountId },

    #[error("Account '{account_id}' already exists")]
    AccountExists { account_id: AccountId },

    /// `block_height` is the height of the row already stored.
    #[error("Ledger entry {tx_id} already recorded at block {block_height}")]
    DuplicateEntry { tx_id: String, block_height: BlockHeight },

    #[error("Block height {height} does not fit the ledger's integer range")]
    HeightOutOfRange { height: BlockHeight },

    #[error("Balance total overflows over {accounts} accounts")]
    TotalOverflow { accounts: usize },

    #[error("Watermark regression for '{account_id}': {current} -> {proposed}")]
    WatermarkRegression {
        account_id: AccountId,
        current: BlockHeight,
        proposed: BlockHeight,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Feed unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed feed response: {0}")]
    Malformed(String),

    #[error("Feed I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Feed decode error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type FeedResult<T> = Result<T, FeedError>;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Account '{account_id}' not found")]
    AccountNotFound { account_id: AccountId },

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error("Feed inconsistency: {detail}")]
    FeedInconsistency { detail: String },

    #[error("Transaction {tx_id} at block {block_height} applied twice")]
    DuplicateEntry { tx_id: String, block_height: BlockHeight },

    #[error("Storage error: {0}")]
    Storage(StoreError),

    /// Stored balance plus the new entries leaves the i64 range.
    #[error("Balance of '{account_id}' overflows: {balance} + {delta}")]
    BalanceOverflow {
        account_id: AccountId,
        balance: Amount,
        delta: Amount,
    },

    #[error("Sync cancelled")]
    Cancelled,
}

pub type SyncResult<T> = Result<T, SyncError>;

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::AccountNotFound { account_id } => Self::AccountNotFound { account_id },
            other => Self::Storage(other),
        }
    }
}

/// Stable, serializable error category reported per account.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncErrorKind {
    AccountNotFound,
    FeedError,
    FeedInconsistency,
    DuplicateEntry,
    StorageError,
    BalanceOverflow,
    Cancelled,
}

impl SyncError {
    pub fn kind(&self) -> SyncErrorKind {
        match self {
            Self::AccountNotFound { .. }   => SyncErrorKind::AccountNotFound,
            Self::Feed(_)                  => SyncErrorKind::FeedError,
            Self::FeedInconsistency { .. } => SyncErrorKind::FeedInconsistency,
            Self::DuplicateEntry { .. }    => SyncErrorKind::DuplicateEntry,
            Self::Storage(_)               => SyncErrorKind::StorageError,
            Self::BalanceOverflow { .. }   => SyncErrorKind::BalanceOverflow,
            Self::Cancelled                => SyncErrorKind::Cancelled,
        }
    }

    /// Whether a caller-level retry (with backoff) may succeed.
    /// The engine itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Feed(_) | Self::Storage(_) | Self::Cancelled)
    }
}
