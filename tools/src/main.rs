//! ledger-runner: command-line front end for the chain ledger.
//!
//! Usage:
//!   ledger-runner add          --accounts 1Alice|1Bob --db ledger.db
//!   ledger-runner sync         --accounts 1Alice|1Bob --feed-dir ./dumps
//!   ledger-runner balance      --accounts 1Alice|1Bob
//!   ledger-runner transactions --accounts 1Alice --limit 50 --offset 0
//!   ledger-runner remove       --accounts 1Bob
//!   ledger-runner demo         --seed 7 --blocks 200
//!
//! `sync` without `--accounts` reconciles every registered account.
//! Output is one JSON document on stdout.

use anyhow::{bail, Context, Result};
use chainledger_core::{
    account_service::{parse_account_ids, AccountService},
    config::LedgerConfig,
    feed::{JsonFileFeed, SyntheticChain, TransactionFeed},
    store::SqliteLedgerStore,
    types::AccountId,
};
use std::env;

const DEMO_ACCOUNTS: [&str; 3] = ["1Alice", "1Bob", "1Carol"];

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let Some(command) = args.get(1).map(String::as_str) else {
        bail!("usage: ledger-runner <add|remove|balance|sync|transactions|demo> [flags]");
    };

    let mut config = match flag(&args, "--config") {
        Some(path) => LedgerConfig::load(path)?,
        None => LedgerConfig::default(),
    };
    if let Some(db) = flag(&args, "--db") {
        config.db_path = db.to_string();
    }
    if let Some(dir) = flag(&args, "--feed-dir") {
        config.feed_dir = Some(dir.to_string());
    }
    config.page_size = parse_arg(&args, "--page-size", config.page_size)?;
    config.validate()?;

    let accounts = flag(&args, "--accounts")
        .map(parse_account_ids)
        .unwrap_or_default();

    if command == "demo" {
        return run_demo(&args, config);
    }

    let store = SqliteLedgerStore::open(&config.db_path)
        .with_context(|| format!("opening {}", config.db_path))?;
    store.migrate()?;
    let feed = JsonFileFeed::new(config.feed_dir.clone().unwrap_or_else(|| "./feed".into()));
    let service = AccountService::new(&store, &feed, config);

    let output = match command {
        "add" => serde_json::to_value(service.add_accounts(&require(accounts)?)?)?,
        "remove" => serde_json::to_value(service.remove_accounts(&require(accounts)?)?)?,
        "balance" => serde_json::to_value(service.balances(&require(accounts)?)?)?,
        "transactions" => {
            let limit = optional_arg(&args, "--limit")?;
            let offset = parse_arg(&args, "--offset", 0u32)?;
            serde_json::to_value(service.list_transactions(&require(accounts)?, limit, offset)?)?
        }
        "sync" => {
            let targets = if accounts.is_empty() {
                store
                    .all_accounts()?
                    .into_iter()
                    .map(|row| row.account_id)
                    .collect()
            } else {
                accounts
            };
            sync_output(&service, &targets)?
        }
        other => bail!("unknown command: {other}"),
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Reconcile a synthetic chain end to end in a throwaway database and
/// check every account against the chain's own balances.
fn run_demo(args: &[String], mut config: LedgerConfig) -> Result<()> {
    let seed = parse_arg(args, "--seed", 42u64)?;
    let blocks = parse_arg(args, "--blocks", 200u64)?;
    config.db_path = ":memory:".into();

    let store = SqliteLedgerStore::in_memory()?;
    store.migrate()?;
    let mut chain = SyntheticChain::new(seed, &DEMO_ACCOUNTS);
    let accounts: Vec<AccountId> = DEMO_ACCOUNTS.iter().map(|a| a.to_string()).collect();

    // Two rounds: the second only sees blocks mined after the first.
    let mut rounds = Vec::new();
    for round in 0..2 {
        chain.mine_blocks(blocks / 2);
        let service = AccountService::new(&store, &chain, config.clone());
        if round == 0 {
            service.add_accounts(&accounts)?;
        }
        rounds.push(sync_output(&service, &accounts)?);
    }

    for account_id in &accounts {
        let expected = chain.expected_balance(account_id);
        let actual = store.entry_value_sum(account_id)?;
        if expected != actual {
            bail!("{account_id}: ledger holds {actual}, chain says {expected}");
        }
    }
    log::info!("demo: seed={seed} tip={} reconciled", chain.tip());

    let output = serde_json::json!({
        "seed": seed,
        "tip": chain.tip(),
        "transactions": chain.transaction_count(),
        "rounds": rounds,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn sync_output<F: TransactionFeed + ?Sized>(
    service: &AccountService<'_, SqliteLedgerStore, F>,
    accounts: &[AccountId],
) -> Result<serde_json::Value> {
    let report = service.sync_batch(accounts);
    if !report.all_ok() {
        log::warn!("{} of {} accounts failed to sync", report.failed(), accounts.len());
    }
    Ok(serde_json::json!({
        "batch_id": report.batch_id,
        "succeeded": report.succeeded(),
        "failed": report.failed(),
        "results": report.outcomes(),
    }))
}

fn require(accounts: Vec<AccountId>) -> Result<Vec<AccountId>> {
    if accounts.is_empty() {
        bail!("--accounts is required (pipe-separated, e.g. 1Alice|1Bob)");
    }
    Ok(accounts)
}

fn flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == name)
        .map(|w| w[1].as_str())
}

/// A present but unparsable value is an error, never the default.
fn optional_arg<T: std::str::FromStr>(args: &[String], name: &str) -> Result<Option<T>> {
    flag(args, name)
        .map(|v| {
            v.parse()
                .map_err(|_| anyhow::anyhow!("invalid value for {name}: {v:?}"))
        })
        .transpose()
}

fn parse_arg<T: std::str::FromStr>(args: &[String], name: &str, default: T) -> Result<T> {
    Ok(optional_arg(args, name)?.unwrap_or(default))
}
