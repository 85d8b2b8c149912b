//! SQLite connection setup and schema.
//!
//! Plans, claims, locks and transfers are stored as JSON bodies keyed by
//! plan id, with narrow index tables for the discovery queries. Balances
//! and share counts are TEXT because SQLite integers stop at 64 bits.

use rusqlite::{params, Connection, Result as SqlResult};
use std::path::Path;

/// Open (or create) the database at `path` and run migrations.
pub fn open_db(path: &Path) -> SqlResult<Connection> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    migrate(&conn)?;
    Ok(conn)
}

/// Fresh private in-memory database with the schema applied.
pub fn open_in_memory() -> SqlResult<Connection> {
    let conn = Connection::open_in_memory()?;
    migrate(&conn)?;
    Ok(conn)
}

fn migrate(conn: &Connection) -> SqlResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS meta (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS plans (
            id     INTEGER PRIMARY KEY,
            owner  TEXT NOT NULL,
            status TEXT NOT NULL,
            body   TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS plans_by_owner ON plans (owner, id);

        CREATE TABLE IF NOT EXISTS plan_beneficiaries (
            plan_id INTEGER NOT NULL,
            address TEXT NOT NULL,
            PRIMARY KEY (plan_id, address)
        );
        CREATE INDEX IF NOT EXISTS beneficiaries_by_address
            ON plan_beneficiaries (address, plan_id);

        CREATE TABLE IF NOT EXISTS triggers (
            plan_id INTEGER PRIMARY KEY,
            body    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS claims (
            plan_id  INTEGER NOT NULL,
            priority INTEGER NOT NULL,
            body     TEXT NOT NULL,
            PRIMARY KEY (plan_id, priority)
        );

        CREATE TABLE IF NOT EXISTS locks (
            plan_id INTEGER PRIMARY KEY,
            body    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS transfers (
            id      INTEGER PRIMARY KEY AUTOINCREMENT,
            plan_id INTEGER NOT NULL,
            body    TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS transfers_by_plan ON transfers (plan_id, id);

        CREATE TABLE IF NOT EXISTS activity (
            address TEXT PRIMARY KEY,
            height  INTEGER NOT NULL,
            time    INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS balances (
            owner  TEXT NOT NULL,
            denom  TEXT NOT NULL,
            amount TEXT NOT NULL,
            PRIMARY KEY (owner, denom)
        );

        CREATE TABLE IF NOT EXISTS shares (
            owner      TEXT NOT NULL,
            company_id TEXT NOT NULL,
            class_id   TEXT NOT NULL,
            shares     TEXT NOT NULL,
            PRIMARY KEY (owner, company_id, class_id)
        );

        CREATE TABLE IF NOT EXISTS bans (
            address TEXT PRIMARY KEY
        );

        CREATE TABLE IF NOT EXISTS inbox (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            signer      TEXT NOT NULL,
            body        TEXT NOT NULL,
            queued_at   INTEGER NOT NULL,
            applied_at  INTEGER,
            error_msg   TEXT
        );

        CREATE TABLE IF NOT EXISTS event_log (
            id      INTEGER PRIMARY KEY AUTOINCREMENT,
            height  INTEGER NOT NULL,
            time    INTEGER NOT NULL,
            plan_id INTEGER NOT NULL,
            kind    TEXT NOT NULL,
            body    TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS events_by_plan ON event_log (plan_id, id);
        ",
    )
}

// ============================================================================
// Meta helpers (key-value)
// ============================================================================

pub fn meta_get(conn: &Connection, key: &str) -> SqlResult<Option<String>> {
    let mut stmt = conn.prepare_cached("SELECT value FROM meta WHERE key = ?1")?;
    let mut rows = stmt.query(params![key])?;
    match rows.next()? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}

/// Upsert.
pub fn meta_set(conn: &Connection, key: &str, value: &str) -> SqlResult<()> {
    conn.execute(
        "INSERT INTO meta (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_migrations_are_idempotent() {
        let file = NamedTempFile::new().expect("create temp file");
        open_db(file.path()).expect("first open");
        let conn = open_db(file.path()).expect("second open");

        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn test_meta_upsert() {
        let conn = open_in_memory().unwrap();
        assert_eq!(meta_get(&conn, "height").unwrap(), None);
        meta_set(&conn, "height", "1").unwrap();
        meta_set(&conn, "height", "2").unwrap();
        assert_eq!(meta_get(&conn, "height").unwrap(), Some("2".to_string()));
    }
}
