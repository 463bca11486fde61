use super::{height_to_sql, is_unique_violation, not_found, LedgerEntry, SqliteLedgerStore};
use crate::{
    error::{StoreError, StoreResult},
    types::{Amount, BlockHeight},
};
use rusqlite::{params, OptionalExtension};

impl SqliteLedgerStore {
    // ── Sync commit ───────────────────────────────────────────────

    /// Entries, balance and watermark land together or not at all.
    /// Dropping `tx` on any early return rolls everything back.
    pub(super) fn commit_entries(
        &self,
        account_id: &str,
        new_balance: Amount,
        new_sync_block: BlockHeight,
        entries: &[LedgerEntry],
    ) -> StoreResult<()> {
        let new_sync_block_sql = height_to_sql(new_sync_block)?;
        let tx = self.conn.unchecked_transaction()?;

        let current: u64 = tx
            .query_row(
                "SELECT sync_block FROM account WHERE account_id = ?1",
                params![account_id],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .ok_or_else(|| not_found(account_id))? as u64;
        if new_sync_block < current {
            return Err(StoreError::WatermarkRegression {
                account_id: account_id.to_string(),
                current,
                proposed: new_sync_block,
            });
        }

        {
            let mut insert = tx.prepare(
                "INSERT INTO ledger_entry (tx_id, account_id, value_change, block_height)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for entry in entries {
                let result = insert.execute(params![
                    entry.tx_id,
                    account_id,
                    entry.value_change,
                    height_to_sql(entry.block_height)?,
                ]);
                match result {
                    Ok(_) => {}
                    Err(e) if is_unique_violation(&e) => {
                        let stored: i64 = tx.query_row(
                            "SELECT block_height FROM ledger_entry
                             WHERE account_id = ?1 AND tx_id = ?2",
                            params![account_id, entry.tx_id],
                            |row| row.get(0),
                        )?;
                        return Err(StoreError::DuplicateEntry {
                            tx_id: entry.tx_id.clone(),
                            block_height: stored as u64,
                        });
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        tx.execute(
            "UPDATE account SET balance = ?1, sync_block = ?2, last_synced_at = ?3
             WHERE account_id = ?4",
            params![
                new_balance,
                new_sync_block_sql,
                chrono::Utc::now().to_rfc3339(),
                account_id,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    // ── Ledger entries ────────────────────────────────────────────

    pub(super) fn entries_for_account(
        &self,
        account_id: &str,
        limit: Option<u32>,
        offset: u32,
    ) -> StoreResult<Vec<LedgerEntry>> {
        // SQLite treats a negative LIMIT as "no limit".
        let (limit, skip) = match limit {
            Some(l) => (i64::from(l), i64::from(offset) * i64::from(l)),
            None => (-1, 0),
        };
        let mut stmt = self.conn.prepare(
            "SELECT tx_id, account_id, value_change, block_height
             FROM ledger_entry WHERE account_id = ?1
             ORDER BY block_height DESC, tx_id ASC
             LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt
            .query_map(params![account_id, limit, skip], |row| {
                Ok(LedgerEntry {
                    tx_id: row.get(0)?,
                    account_id: row.get(1)?,
                    value_change: row.get(2)?,
                    block_height: row.get::<_, i64>(3)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Sum of recorded value changes. Equals the account balance whenever
    /// the store is consistent.
    pub fn entry_value_sum(&self, account_id: &str) -> StoreResult<Amount> {
        let total: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(value_change), 0)
             FROM ledger_entry WHERE account_id = ?1",
            params![account_id],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    pub fn entry_count(&self, account_id: &str) -> StoreResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM ledger_entry WHERE account_id = ?1",
            params![account_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Entries across all accounts. Non-zero after removal means orphans.
    pub fn total_entry_count(&self) -> StoreResult<i64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM ledger_entry", [], |row| row.get(0))?;
        Ok(count)
    }
}
