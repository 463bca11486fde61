//! Audit events for every ledger mutation attempt.
//!
//! RULE: The service records one event per account per request.
//! Events are append-only and never drive ledger state.

use crate::{
    error::SyncErrorKind,
    types::{AccountId, Amount, BatchId, BlockHeight},
};
use serde::{Deserialize, Serialize};

/// Variants are added over time, never removed or reordered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    AccountAdded {
        account_id: AccountId,
    },
    AccountAlreadyExists {
        account_id: AccountId,
    },
    AccountRemoved {
        account_id: AccountId,
        existed: bool,
    },
    AccountSynced {
        account_id: AccountId,
        entries_processed: usize,
        new_balance: Amount,
        new_sync_block: BlockHeight,
    },
    SyncFailed {
        account_id: AccountId,
        kind: SyncErrorKind,
        detail: String,
    },
}

impl LedgerEvent {
    pub fn account_id(&self) -> &str {
        match self {
            Self::AccountAdded { account_id }
            | Self::AccountAlreadyExists { account_id }
            | Self::AccountRemoved { account_id, .. }
            | Self::AccountSynced { account_id, .. }
            | Self::SyncFailed { account_id, .. } => account_id,
        }
    }

    /// Stable name for the `event_type` column.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::AccountAdded { .. }         => "account_added",
            Self::AccountAlreadyExists { .. } => "account_already_exists",
            Self::AccountRemoved { .. }       => "account_removed",
            Self::AccountSynced { .. }        => "account_synced",
            Self::SyncFailed { .. }           => "sync_failed",
        }
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub batch_id: BatchId,
    pub account_id: AccountId,
    pub event_type: String,
    pub payload: String, // JSON-serialized LedgerEvent
    pub created_at: String,
}

impl EventLogEntry {
    pub fn new(batch_id: &str, event: &LedgerEvent) -> serde_json::Result<Self> {
        Ok(Self {
            id: None,
            batch_id: batch_id.to_string(),
            account_id: event.account_id().to_string(),
            event_type: event.type_name().to_string(),
            payload: serde_json::to_string(event)?,
            created_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    pub fn decode(&self) -> serde_json::Result<LedgerEvent> {
        serde_json::from_str(&self.payload)
    }
}
