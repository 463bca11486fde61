//! Shared primitive types used across the ledger.

/// An externally assigned account identifier (a chain address).
pub type AccountId = String;

/// A confirmed block height. Zero means "never synced".
pub type BlockHeight = u64;

/// A value in the chain's smallest unit. Signed: spends are negative.
pub type Amount = i64;

/// Identifier grouping the events of one add/remove/sync request.
pub type BatchId = String;
