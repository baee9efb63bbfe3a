use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};

/// Durable key → string storage. Everything the tracker persists goes through it.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Replaces the value under `key` with whatever `apply` derives from the
    /// current one. Stores shared between processes do this atomically.
    fn update(
        &self,
        key: &str,
        apply: &mut dyn FnMut(Option<String>) -> Result<String>,
    ) -> Result<()> {
        let next = apply(self.get(key)?)?;
        self.set(key, &next)
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for &T {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn update(
        &self,
        key: &str,
        apply: &mut dyn FnMut(Option<String>) -> Result<String>,
    ) -> Result<()> {
        (**self).update(key, apply)
    }
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        // The TUI and `ingest` may hold the same file open.
        conn.busy_timeout(Duration::from_secs(5))
            .context("failed to set database busy timeout")?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        Ok(Self { conn })
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }
}

fn read_value(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM kv_store WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
    .with_context(|| format!("failed to read '{key}' from store"))
}

fn write_value(conn: &Connection, key: &str, value: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        r#"
        INSERT INTO kv_store (key, value, updated_at)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = excluded.updated_at
        "#,
        params![key, value, now],
    )
    .with_context(|| format!("failed to write '{key}' to store"))?;
    Ok(())
}

impl KeyValueStore for Database {
    fn get(&self, key: &str) -> Result<Option<String>> {
        read_value(&self.conn, key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        write_value(&self.conn, key, value)
    }

    fn update(
        &self,
        key: &str,
        apply: &mut dyn FnMut(Option<String>) -> Result<String>,
    ) -> Result<()> {
        // IMMEDIATE takes the write lock before the read, so a concurrent
        // writer cannot slip in between.
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)
            .with_context(|| format!("failed to lock '{key}' for update"))?;
        let next = apply(read_value(&tx, key)?)?;
        write_value(&tx, key, &next)?;
        tx.commit()
            .with_context(|| format!("failed to commit update of '{key}'"))
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use std::cell::RefCell;
    use std::collections::HashMap;

    use anyhow::{Result, anyhow};

    use super::KeyValueStore;

    #[derive(Debug, Default)]
    pub(crate) struct MemoryStore {
        values: RefCell<HashMap<String, String>>,
        fail_writes: bool,
    }

    impl MemoryStore {
        pub(crate) fn failing() -> Self {
            Self {
                fail_writes: true,
                ..Self::default()
            }
        }

        pub(crate) fn with_value(key: &str, value: &str) -> Self {
            let store = Self::default();
            store
                .values
                .borrow_mut()
                .insert(key.to_string(), value.to_string());
            store
        }

        pub(crate) fn raw(&self, key: &str) -> Option<String> {
            self.values.borrow().get(key).cloned()
        }
    }

    impl KeyValueStore for MemoryStore {
        fn get(&self, key: &str) -> Result<Option<String>> {
            Ok(self.raw(key))
        }

        fn set(&self, key: &str, value: &str) -> Result<()> {
            if self.fail_writes {
                return Err(anyhow!("disk full"));
            }
            self.values
                .borrow_mut()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }
    }
}
