//! Local ledger of chain account balances, reconciled page by page
//! against an external transaction feed.

pub mod account_service;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod feed;
pub mod frontier;
pub mod store;
pub mod types;
