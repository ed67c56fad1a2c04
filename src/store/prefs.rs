// src/store/prefs.rs — Persisted key-value store (SQLite)
//
// Every value is a JSON document keyed by name. Reads may go through `get`,
// but any read-modify-write must go through `update`, which holds the
// connection mutex and an IMMEDIATE transaction for the whole closure. That
// excludes other threads of this process and other processes sharing the file.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::store::schema;

/// How long a writer waits for another process holding the database lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct PrefsStore {
    conn: Mutex<Connection>,
}

impl PrefsStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Open (or create) the database at the given path and run migrations.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        schema::run_migrations(&conn)?;
        Ok(Self::new(conn))
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::run_migrations(&conn)?;
        Ok(Self::new(conn))
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("prefs store mutex poisoned"))
    }

    pub fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let conn = self.lock()?;
        read_value(&conn, key)
    }

    pub fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.update(|txn| txn.set(key, value))
    }

    /// Decode a JSON value. `Ok(None)` when the key is absent; a decode
    /// failure is an error so callers can decide how to degrade.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        match self.get(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw)
    }

    pub fn keys(&self) -> anyhow::Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT key FROM prefs ORDER BY key")?;
        let rows = stmt.query_map([], |row| row.get(0))?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Run `f` as one atomic read-modify-write unit. Returning `Err` from the
    /// closure rolls back every write it made.
    pub fn update<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&mut PrefsTxn<'_>) -> anyhow::Result<T>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut txn = PrefsTxn { tx };
        let out = f(&mut txn)?;
        txn.tx.commit()?;
        Ok(out)
    }
}

/// Handle passed to [`PrefsStore::update`] closures.
pub struct PrefsTxn<'conn> {
    tx: Transaction<'conn>,
}

impl PrefsTxn<'_> {
    pub fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        read_value(&self.tx, key)
    }

    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let now = Utc::now().to_rfc3339();
        self.tx.execute(
            "INSERT INTO prefs (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        match self.get(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn set_json<T: Serialize>(&mut self, key: &str, value: &T) -> anyhow::Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw)
    }
}

fn read_value(conn: &Connection, key: &str) -> anyhow::Result<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM prefs WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_get_set_roundtrip() {
        let store = PrefsStore::in_memory().unwrap();
        assert_eq!(store.get("message").unwrap(), None);

        store.set("message", "\"hello\"").unwrap();
        store.set("message", "\"bye\"").unwrap();
        assert_eq!(store.get("message").unwrap().as_deref(), Some("\"bye\""));
        assert_eq!(store.keys().unwrap(), vec!["message".to_string()]);
    }

    #[test]
    fn test_get_json_reports_corrupt_value() {
        let store = PrefsStore::in_memory().unwrap();
        store.set("counts", "{not json").unwrap();
        assert!(store.get_json::<BTreeMap<String, i64>>("counts").is_err());
    }

    #[test]
    fn test_failed_update_rolls_back() {
        let store = PrefsStore::in_memory().unwrap();
        store.set_json("n", &1).unwrap();

        let result: anyhow::Result<()> = store.update(|txn| {
            txn.set_json("n", &2)?;
            txn.set_json("other", &"x")?;
            anyhow::bail!("abort")
        });
        assert!(result.is_err());
        assert_eq!(store.get_json::<i64>("n").unwrap(), Some(1));
        assert_eq!(store.get("other").unwrap(), None);
    }

    #[test]
    fn test_update_sees_own_writes() {
        let store = PrefsStore::in_memory().unwrap();
        let seen = store
            .update(|txn| {
                txn.set_json("n", &41)?;
                let n: i64 = txn.get_json("n")?.unwrap_or_default();
                txn.set_json("n", &(n + 1))?;
                Ok(n + 1)
            })
            .unwrap();
        assert_eq!(seen, 42);
        assert_eq!(store.get_json::<i64>("n").unwrap(), Some(42));
    }
}
