use super::{AddressPage, FeedTransaction, TransactionFeed, TxIo};
use crate::{
    error::{FeedError, FeedResult},
    types::{Amount, BlockHeight},
};
use serde::Deserialize;
use std::path::PathBuf;

/// Feed backed by block-explorer address dumps on disk:
/// `<dir>/<account_id>.json`, re-read on every call.
///
/// Unconfirmed transactions (no `block_height`) are dropped before paging.
/// A missing dump is an address with no history.
#[derive(Debug, Clone)]
pub struct JsonFileFeed {
    dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct RawAddress {
    #[serde(default)]
    txs: Vec<RawTx>,
}

#[derive(Debug, Deserialize)]
struct RawTx {
    hash: String,
    block_height: Option<BlockHeight>,
    #[serde(default)]
    inputs: Vec<RawInput>,
    #[serde(default)]
    out: Vec<RawOutput>,
}

#[derive(Debug, Deserialize)]
struct RawInput {
    // Coinbase inputs carry no previous output.
    prev_out: Option<RawOutput>,
}

#[derive(Debug, Deserialize)]
struct RawOutput {
    addr: Option<String>,
    value: Amount,
}

impl RawOutput {
    fn into_leg(self) -> Option<TxIo> {
        let value = self.value;
        self.addr.map(|address| TxIo { address, value })
    }
}

impl JsonFileFeed {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn dump_path(&self, account_id: &str) -> FeedResult<PathBuf> {
        if account_id.is_empty()
            || account_id.contains(['/', '\\'])
            || account_id.starts_with('.')
        {
            return Err(FeedError::Malformed(format!(
                "account id {account_id:?} is not a valid dump name"
            )));
        }
        Ok(self.dir.join(format!("{account_id}.json")))
    }

    fn load(&self, account_id: &str) -> FeedResult<Vec<FeedTransaction>> {
        let path = self.dump_path(account_id)?;
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("feed: no dump for {account_id} at {}", path.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        let raw: RawAddress = serde_json::from_str(&content)?;
        Ok(raw
            .txs
            .into_iter()
            .filter_map(|tx| {
                let block_height = tx.block_height?;
                Some(FeedTransaction {
                    hash: tx.hash,
                    block_height,
                    inputs: tx
                        .inputs
                        .into_iter()
                        .filter_map(|i| i.prev_out.and_then(RawOutput::into_leg))
                        .collect(),
                    outputs: tx.out.into_iter().filter_map(RawOutput::into_leg).collect(),
                })
            })
            .collect())
    }
}

impl TransactionFeed for JsonFileFeed {
    fn get_address(&self, account_id: &str, limit: u32, offset: u64) -> FeedResult<AddressPage> {
        let transactions = self
            .load(account_id)?
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok(AddressPage { transactions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = r#"{
        "address": "1Alice",
        "n_tx": 3,
        "txs": [
            { "hash": "pending", "inputs": [], "out": [ { "addr": "1Alice", "value": 7 } ] },
            {
                "hash": "spend",
                "block_height": 120,
                "inputs": [ { "prev_out": { "addr": "1Alice", "value": 500 } } ],
                "out": [
                    { "addr": "1Bob", "value": 300 },
                    { "addr": "1Alice", "value": 150 },
                    { "value": 0 }
                ]
            },
            {
                "hash": "mined",
                "block_height": 100,
                "inputs": [ {} ],
                "out": [ { "addr": "1Alice", "value": 500 } ]
            }
        ]
    }"#;

    fn feed_with_dump() -> (JsonFileFeed, PathBuf) {
        let dir = std::env::temp_dir().join(format!("chainledger-feed-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("1Alice.json"), DUMP).unwrap();
        (JsonFileFeed::new(&dir), dir)
    }

    #[test]
    fn parses_explorer_dump_and_drops_unconfirmed() {
        let (feed, dir) = feed_with_dump();
        let page = feed.get_address("1Alice", 10, 0).unwrap();
        let hashes: Vec<&str> = page.transactions.iter().map(|t| t.hash.as_str()).collect();
        assert_eq!(hashes, vec!["spend", "mined"]);
        assert_eq!(page.transactions[0].value_change_for("1Alice").unwrap(), -350);
        assert_eq!(page.transactions[1].value_change_for("1Alice").unwrap(), 500);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn pages_by_limit_and_offset() {
        let (feed, dir) = feed_with_dump();
        let page = feed.get_address("1Alice", 1, 1).unwrap();
        assert_eq!(page.transactions.len(), 1);
        assert_eq!(page.transactions[0].hash, "mined");
        assert!(feed.get_address("1Alice", 1, 2).unwrap().transactions.is_empty());
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn missing_dump_is_empty_history() {
        let (feed, dir) = feed_with_dump();
        assert!(feed.get_address("1Nobody", 5, 0).unwrap().transactions.is_empty());
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn path_like_ids_rejected() {
        let feed = JsonFileFeed::new("/tmp");
        assert!(matches!(
            feed.get_address("../etc/passwd", 5, 0),
            Err(FeedError::Malformed(_))
        ));
    }
}
