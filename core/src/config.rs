use serde::{Deserialize, Serialize};

/// Page size used against the transaction feed when none is configured.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LedgerConfig {
    /// Transactions requested per feed call.
    pub page_size: u32,
    /// SQLite database path. `:memory:` is accepted.
    pub db_path: String,
    /// Directory of `<account_id>.json` address dumps for the file feed.
    pub feed_dir: Option<String>,
    /// Upper bound on feed calls per account sync. `None` means unbounded.
    pub max_pages: Option<u32>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            db_path: "ledger.db".into(),
            feed_dir: None,
            max_pages: None,
        }
    }
}

impl LedgerConfig {
    /// Load from a JSON file. Missing keys fall back to defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: LedgerConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.page_size == 0 {
            anyhow::bail!("page_size must be at least 1");
        }
        if self.max_pages == Some(0) {
            anyhow::bail!("max_pages must be at least 1 when set");
        }
        Ok(())
    }

    /// Config for unit and integration tests: in-memory database, small pages.
    pub fn default_test() -> Self {
        Self {
            page_size: 2,
            db_path: ":memory:".into(),
            feed_dir: None,
            max_pages: Some(1_000),
        }
    }
}
