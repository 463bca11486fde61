use super::SqliteLedgerStore;
use crate::{error::StoreResult, event::EventLogEntry};
use rusqlite::params;

impl SqliteLedgerStore {
    // ── Event log ──────────────────────────────────────────────

    pub(super) fn insert_event(&self, entry: &EventLogEntry) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (batch_id, account_id, event_type, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.batch_id,
                entry.account_id,
                entry.event_type,
                entry.payload,
                entry.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn events_for_account(&self, account_id: &str) -> StoreResult<Vec<EventLogEntry>> {
        self.query_events(
            "SELECT id, batch_id, account_id, event_type, payload, created_at
             FROM event_log WHERE account_id = ?1
             ORDER BY id ASC",
            account_id,
        )
    }

    pub fn events_for_batch(&self, batch_id: &str) -> StoreResult<Vec<EventLogEntry>> {
        self.query_events(
            "SELECT id, batch_id, account_id, event_type, payload, created_at
             FROM event_log WHERE batch_id = ?1
             ORDER BY id ASC",
            batch_id,
        )
    }

    fn query_events(&self, sql: &str, key: &str) -> StoreResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(sql)?;
        let entries = stmt
            .query_map(params![key], |row| {
                Ok(EventLogEntry {
                    id: Some(row.get(0)?),
                    batch_id: row.get(1)?,
                    account_id: row.get(2)?,
                    event_type: row.get(3)?,
                    payload: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}
