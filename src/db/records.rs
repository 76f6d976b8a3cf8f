//! Keyed record store used to stage data until the network is back.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};
use serde_json::Value;
use std::sync::Arc;

use super::Database;

/// Durable key → JSON value store. Each operation is atomic on its own;
/// there are no cross-key transactions.
pub trait RecordStore: Send + Sync {
  fn get(&self, key: &str) -> Result<Option<Value>>;

  fn put(&self, key: &str, value: &Value) -> Result<()>;

  /// Remove a record. Returns whether it existed.
  fn delete(&self, key: &str) -> Result<bool>;

  fn keys(&self) -> Result<Vec<String>>;
}

/// SQLite-backed record store.
pub struct SqliteRecordStore {
  db: Arc<Database>,
}

impl SqliteRecordStore {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }
}

impl RecordStore for SqliteRecordStore {
  fn get(&self, key: &str) -> Result<Option<Value>> {
    let conn = self.db.conn()?;

    let raw: Option<String> = conn
      .query_row(
        "SELECT value FROM records WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read record {}: {}", key, e))?;

    raw
      .map(|s| {
        serde_json::from_str(&s).map_err(|e| eyre!("Failed to deserialize record {}: {}", key, e))
      })
      .transpose()
  }

  fn put(&self, key: &str, value: &Value) -> Result<()> {
    let conn = self.db.conn()?;
    let data =
      serde_json::to_string(value).map_err(|e| eyre!("Failed to serialize record: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO records (key, value, updated_at) VALUES (?, ?, datetime('now'))",
        params![key, data],
      )
      .map_err(|e| eyre!("Failed to store record {}: {}", key, e))?;

    Ok(())
  }

  fn delete(&self, key: &str) -> Result<bool> {
    let conn = self.db.conn()?;

    let removed = conn
      .execute("DELETE FROM records WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to delete record {}: {}", key, e))?;

    Ok(removed > 0)
  }

  fn keys(&self) -> Result<Vec<String>> {
    let conn = self.db.conn()?;

    let mut stmt = conn
      .prepare("SELECT key FROM records ORDER BY key")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let keys = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list records: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read record key: {}", e))?;

    Ok(keys)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn store() -> SqliteRecordStore {
    SqliteRecordStore::new(Arc::new(Database::open_in_memory().unwrap()))
  }

  #[test]
  fn test_missing_key_reads_none() {
    assert_eq!(store().get("cartData").unwrap(), None);
  }

  #[test]
  fn test_put_replaces_value() {
    let store = store();
    store.put("cartData", &json!({"items": 1})).unwrap();
    store.put("cartData", &json!({"items": 2})).unwrap();
    assert_eq!(store.get("cartData").unwrap(), Some(json!({"items": 2})));
    assert_eq!(store.keys().unwrap(), vec!["cartData".to_string()]);
  }

  #[test]
  fn test_delete_reports_existence() {
    let store = store();
    store.put("pendingOrders", &json!([])).unwrap();
    assert!(store.delete("pendingOrders").unwrap());
    assert!(!store.delete("pendingOrders").unwrap());
    assert!(store.keys().unwrap().is_empty());
  }
}
