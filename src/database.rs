//! Database operations for the price tracker
//!
//! Uses parameterized queries exclusively for security (no SQL string
//! concatenation). Multi-statement writes are transactional: a product
//! update and its history append commit together or not at all.

use crate::error::{Result, SyncError};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};

/// Result type for plain database operations
pub type DbResult<T> = rusqlite::Result<T>;

/// Lifecycle state of a product record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    /// Created but never synced
    New,
    /// Last sync attempt found the same price
    Unchanged,
    /// Last sync attempt changed the price
    Updated,
    /// Last sync attempt could not recover a price
    Error,
}

impl ProductStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProductStatus::New => "new",
            ProductStatus::Unchanged => "unchanged",
            ProductStatus::Updated => "updated",
            ProductStatus::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "unchanged" => ProductStatus::Unchanged,
            "updated" => ProductStatus::Updated,
            "error" => ProductStatus::Error,
            _ => ProductStatus::New,
        }
    }
}

/// A tracked product and its current price state
#[derive(Debug, Clone, Serialize)]
pub struct ProductRecord {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub supplier: String,
    pub url: String,
    pub current_price: Option<f64>,
    /// Price held immediately before the most recent change
    pub last_price: Option<f64>,
    /// When the price last changed (RFC 3339)
    pub last_updated: Option<String>,
    /// When a sync last looked at this record, changed or not (RFC 3339)
    pub last_sync: Option<String>,
    pub status: ProductStatus,
}

/// One observed price in a product's history log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub date: String,
    pub price: f64,
}

/// Fields supplied when creating a product
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub category: String,
    pub supplier: String,
    pub url: String,
}

/// Optional field overrides for updating a product
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub category: Option<String>,
    pub supplier: Option<String>,
    pub url: Option<String>,
}

/// Initialize the database schema
///
/// Creates tables if they don't exist:
/// - `products`: tracked products with their current price state
/// - `price_history`: one row per product holding its entire history log
///   as a JSON array (a single versioned value, appended via
///   read-modify-write)
/// - `settings`: key/value store for the sync-enabled flag
/// - `suppliers` / `categories`: label lists for the UI
pub fn init_schema(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS products (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            category TEXT NOT NULL DEFAULT '',
            supplier TEXT NOT NULL DEFAULT '',
            url TEXT NOT NULL DEFAULT '',
            current_price REAL,
            last_price REAL,
            last_updated TEXT,
            last_sync TEXT,
            status TEXT NOT NULL DEFAULT 'new'
        );

        CREATE TABLE IF NOT EXISTS price_history (
            product_id INTEGER PRIMARY KEY,
            entries TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (product_id) REFERENCES products(id)
        );

        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS suppliers (
            name TEXT PRIMARY KEY
        );

        CREATE TABLE IF NOT EXISTS categories (
            name TEXT PRIMARY KEY
        );

        INSERT OR IGNORE INTO settings (key, value) VALUES ('sync_enabled', 'enabled');
        ",
    )?;

    log::info!("Database schema initialized");
    Ok(())
}

/// Format a timestamp the way this database stores them (RFC 3339, UTC)
pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Current time as an RFC 3339 string
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

fn row_to_product(row: &rusqlite::Row<'_>) -> DbResult<ProductRecord> {
    Ok(ProductRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        category: row.get(2)?,
        supplier: row.get(3)?,
        url: row.get(4)?,
        current_price: row.get(5)?,
        last_price: row.get(6)?,
        last_updated: row.get(7)?,
        last_sync: row.get(8)?,
        status: ProductStatus::parse(&row.get::<_, String>(9)?),
    })
}

/// Read all tracked products
pub fn read_all_products(conn: &Connection) -> DbResult<Vec<ProductRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, category, supplier, url, current_price, last_price,
                last_updated, last_sync, status
         FROM products ORDER BY id",
    )?;
    let records: DbResult<Vec<ProductRecord>> =
        stmt.query_map([], |row| row_to_product(row))?.collect();
    records
}

/// Look up one product by id
pub fn get_product(conn: &Connection, id: i64) -> DbResult<Option<ProductRecord>> {
    conn.query_row(
        "SELECT id, name, category, supplier, url, current_price, last_price,
                last_updated, last_sync, status
         FROM products WHERE id = ?1",
        params![id],
        |row| row_to_product(row),
    )
    .optional()
}

/// Insert a new product record
///
/// A freshly created record carries the probed price (if any) as both
/// current and last price, `last_updated` set to creation time, and no
/// sync attempt yet.
pub fn insert_product(
    conn: &Connection,
    new: &NewProduct,
    initial_price: Option<f64>,
    now: &str,
) -> DbResult<ProductRecord> {
    conn.execute(
        "INSERT INTO products (name, category, supplier, url, current_price, last_price, last_updated, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            &new.name,
            &new.category,
            &new.supplier,
            &new.url,
            initial_price,
            initial_price,
            now,
            ProductStatus::New.as_str(),
        ],
    )?;

    Ok(ProductRecord {
        id: conn.last_insert_rowid(),
        name: new.name.clone(),
        category: new.category.clone(),
        supplier: new.supplier.clone(),
        url: new.url.clone(),
        current_price: initial_price,
        last_price: initial_price,
        last_updated: Some(now.to_string()),
        last_sync: None,
        status: ProductStatus::New,
    })
}

/// Overwrite a product's descriptive fields. Price state is untouched.
///
/// Returns false when no product with this id exists.
pub fn update_product_fields(conn: &Connection, id: i64, update: &ProductUpdate) -> DbResult<bool> {
    let Some(existing) = get_product(conn, id)? else {
        return Ok(false);
    };

    conn.execute(
        "UPDATE products SET name = ?1, category = ?2, supplier = ?3, url = ?4 WHERE id = ?5",
        params![
            update.name.as_ref().unwrap_or(&existing.name),
            update.category.as_ref().unwrap_or(&existing.category),
            update.supplier.as_ref().unwrap_or(&existing.supplier),
            update.url.as_ref().unwrap_or(&existing.url),
            id,
        ],
    )?;
    Ok(true)
}

/// Delete a product and its history log
///
/// Returns false when no product with this id exists.
pub fn delete_product(conn: &mut Connection, id: i64) -> DbResult<bool> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM price_history WHERE product_id = ?1", params![id])?;
    let deleted = tx.execute("DELETE FROM products WHERE id = ?1", params![id])?;
    tx.commit()?;
    Ok(deleted > 0)
}

/// Persist the outcome of syncing one product
///
/// The product update and its history append are one transaction, so the
/// record's price state and its log cannot diverge on a crash or a store
/// failure between the two.
pub fn apply_sync_result(
    conn: &mut Connection,
    record: &ProductRecord,
    entry: Option<&HistoryEntry>,
) -> Result<()> {
    let tx = conn.transaction().map_err(SyncError::Store)?;

    tx.execute(
        "UPDATE products
         SET current_price = ?1, last_price = ?2, last_updated = ?3, last_sync = ?4, status = ?5
         WHERE id = ?6",
        params![
            record.current_price,
            record.last_price,
            &record.last_updated,
            &record.last_sync,
            record.status.as_str(),
            record.id,
        ],
    )?;

    if let Some(entry) = entry {
        append_history_tx(&tx, record.id, entry)?;
    }

    tx.commit()?;
    Ok(())
}

/// Append one entry to a product's history log
///
/// The log is a single JSON value per product, so the append reads the
/// existing array, pushes, and writes the whole value back inside the
/// caller's transaction. Re-appending the current tail is a no-op, which
/// makes a retried transaction safe.
fn append_history_tx(tx: &Transaction<'_>, product_id: i64, entry: &HistoryEntry) -> Result<()> {
    let existing: Option<String> = tx
        .query_row(
            "SELECT entries FROM price_history WHERE product_id = ?1",
            params![product_id],
            |row| row.get(0),
        )
        .optional()?;

    let mut entries: Vec<HistoryEntry> = match existing.as_deref() {
        Some(json) => match serde_json::from_str(json) {
            Ok(entries) => entries,
            Err(e) => {
                // A malformed stored log cannot be recovered; start fresh
                // rather than propagating the corruption.
                log::warn!(
                    "Stored history for product {} is corrupt ({}), starting a fresh log",
                    product_id,
                    e
                );
                Vec::new()
            }
        },
        None => Vec::new(),
    };

    if entries.last() == Some(entry) {
        return Ok(());
    }
    entries.push(entry.clone());

    let json = serde_json::to_string(&entries).map_err(SyncError::Parse)?;
    tx.execute(
        "INSERT INTO price_history (product_id, entries, updated_at)
         VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(product_id) DO UPDATE SET
             entries = excluded.entries,
             updated_at = excluded.updated_at",
        params![product_id, &json],
    )?;
    Ok(())
}

/// Read a product's history log, oldest entry first
///
/// A product with no recorded history yields an empty list. A malformed
/// stored log is a distinct `HistoryCorrupt` error, never a panic.
pub fn read_history(conn: &Connection, product_id: i64) -> Result<Vec<HistoryEntry>> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT entries FROM price_history WHERE product_id = ?1",
            params![product_id],
            |row| row.get(0),
        )
        .optional()?;

    match stored {
        None => Ok(Vec::new()),
        Some(json) => serde_json::from_str(&json)
            .map_err(|source| SyncError::HistoryCorrupt { product_id, source }),
    }
}

/// Read the scheduler's enabled flag
///
/// The scheduler only reads this; mutation belongs to the admin API.
pub fn read_sync_enabled(conn: &Connection) -> DbResult<bool> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM settings WHERE key = 'sync_enabled'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value.as_deref() == Some("enabled"))
}

/// Set the scheduler's enabled flag
pub fn set_sync_enabled(conn: &Connection, enabled: bool) -> DbResult<()> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES ('sync_enabled', ?1)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![if enabled { "enabled" } else { "disabled" }],
    )?;
    Ok(())
}

/// List supplier labels alphabetically
pub fn list_suppliers(conn: &Connection) -> DbResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM suppliers ORDER BY name")?;
    let names: DbResult<Vec<String>> = stmt.query_map([], |row| row.get(0))?.collect();
    names
}

/// Add a supplier label; duplicates are ignored
pub fn add_supplier(conn: &Connection, name: &str) -> DbResult<()> {
    conn.execute("INSERT OR IGNORE INTO suppliers (name) VALUES (?1)", params![name])?;
    Ok(())
}

/// List category labels alphabetically
pub fn list_categories(conn: &Connection) -> DbResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM categories ORDER BY name")?;
    let names: DbResult<Vec<String>> = stmt.query_map([], |row| row.get(0))?.collect();
    names
}

/// Add a category label; duplicates are ignored
pub fn add_category(conn: &Connection, name: &str) -> DbResult<()> {
    conn.execute("INSERT OR IGNORE INTO categories (name) VALUES (?1)", params![name])?;
    Ok(())
}

/// Average current price per category (for the analytics endpoint)
#[derive(Debug, Clone, Serialize)]
pub struct CategoryAverage {
    pub category: String,
    pub average_price: f64,
    pub product_count: i64,
}

pub fn average_price_by_category(conn: &Connection) -> DbResult<Vec<CategoryAverage>> {
    let mut stmt = conn.prepare(
        "SELECT category, AVG(current_price), COUNT(*)
         FROM products
         WHERE current_price IS NOT NULL
         GROUP BY category
         ORDER BY category",
    )?;
    let rows: DbResult<Vec<CategoryAverage>> = stmt
        .query_map([], |row| {
            Ok(CategoryAverage {
                category: row.get(0)?,
                average_price: row.get(1)?,
                product_count: row.get(2)?,
            })
        })?
        .collect();
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Create an in-memory database for testing
    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn test_product(conn: &Connection, name: &str, price: Option<f64>) -> ProductRecord {
        let new = NewProduct {
            name: name.to_string(),
            category: "Electronics".to_string(),
            supplier: "WooCommerce".to_string(),
            url: format!("https://example.com/{}", name),
        };
        insert_product(conn, &new, price, "2026-03-01T10:00:00Z").unwrap()
    }

    #[test]
    fn init_schema_creates_tables() {
        let conn = test_db();

        for table in ["products", "price_history", "settings", "suppliers", "categories"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    params![table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {}", table);
        }
    }

    #[test]
    fn insert_and_read_product() {
        let conn = test_db();
        let record = test_product(&conn, "USB Hub", Some(19.99));

        assert_eq!(record.status, ProductStatus::New);
        assert_eq!(record.current_price, Some(19.99));
        assert_eq!(record.last_price, Some(19.99));
        assert!(record.last_sync.is_none());

        let all = read_all_products(&conn).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "USB Hub");

        let fetched = get_product(&conn, record.id).unwrap().unwrap();
        assert_eq!(fetched.url, "https://example.com/USB Hub");
    }

    #[test]
    fn insert_product_without_price() {
        let conn = test_db();
        let record = test_product(&conn, "Mystery Item", None);
        assert!(record.current_price.is_none());
        assert!(record.last_price.is_none());
    }

    #[test]
    fn get_product_missing_returns_none() {
        let conn = test_db();
        assert!(get_product(&conn, 42).unwrap().is_none());
    }

    #[test]
    fn update_product_fields_overlays_only_given_fields() {
        let conn = test_db();
        let record = test_product(&conn, "USB Hub", Some(19.99));

        let update = ProductUpdate {
            name: Some("USB-C Hub".to_string()),
            url: Some("https://example.com/usb-c-hub".to_string()),
            ..Default::default()
        };
        assert!(update_product_fields(&conn, record.id, &update).unwrap());

        let fetched = get_product(&conn, record.id).unwrap().unwrap();
        assert_eq!(fetched.name, "USB-C Hub");
        assert_eq!(fetched.url, "https://example.com/usb-c-hub");
        // Untouched fields survive
        assert_eq!(fetched.supplier, "WooCommerce");
        assert_eq!(fetched.current_price, Some(19.99));
    }

    #[test]
    fn update_product_fields_missing_product() {
        let conn = test_db();
        let update = ProductUpdate::default();
        assert!(!update_product_fields(&conn, 42, &update).unwrap());
    }

    #[test]
    fn delete_product_removes_history_too() {
        let mut conn = test_db();
        let record = test_product(&conn, "USB Hub", Some(19.99));

        let mut synced = record.clone();
        synced.current_price = Some(17.50);
        synced.last_price = Some(19.99);
        synced.status = ProductStatus::Updated;
        let entry = HistoryEntry { date: "2026-03-02T10:00:00Z".to_string(), price: 17.50 };
        apply_sync_result(&mut conn, &synced, Some(&entry)).unwrap();

        assert!(delete_product(&mut conn, record.id).unwrap());
        assert!(get_product(&conn, record.id).unwrap().is_none());

        let history_rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM price_history", [], |row| row.get(0))
            .unwrap();
        assert_eq!(history_rows, 0);
    }

    #[test]
    fn apply_sync_result_without_entry_leaves_history_empty() {
        let mut conn = test_db();
        let record = test_product(&conn, "USB Hub", Some(19.99));

        let mut synced = record.clone();
        synced.last_sync = Some("2026-03-02T10:00:00Z".to_string());
        synced.status = ProductStatus::Unchanged;
        apply_sync_result(&mut conn, &synced, None).unwrap();

        let fetched = get_product(&conn, record.id).unwrap().unwrap();
        assert_eq!(fetched.status, ProductStatus::Unchanged);
        assert_eq!(fetched.last_sync.as_deref(), Some("2026-03-02T10:00:00Z"));
        assert!(read_history(&conn, record.id).unwrap().is_empty());
    }

    #[test]
    fn apply_sync_result_appends_history_in_order() {
        let mut conn = test_db();
        let record = test_product(&conn, "USB Hub", Some(19.99));

        for (date, price) in [
            ("2026-03-02T10:00:00Z", 17.50),
            ("2026-03-03T10:00:00Z", 18.25),
            ("2026-03-04T10:00:00Z", 16.00),
        ] {
            let mut synced = record.clone();
            synced.current_price = Some(price);
            synced.last_sync = Some(date.to_string());
            synced.last_updated = Some(date.to_string());
            synced.status = ProductStatus::Updated;
            let entry = HistoryEntry { date: date.to_string(), price };
            apply_sync_result(&mut conn, &synced, Some(&entry)).unwrap();
        }

        let history = read_history(&conn, record.id).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].price, 17.50);
        assert_eq!(history[1].price, 18.25);
        assert_eq!(history[2].price, 16.00);
        // Last entry matches the current price
        let fetched = get_product(&conn, record.id).unwrap().unwrap();
        assert_eq!(fetched.current_price, Some(16.00));
    }

    #[test]
    fn append_history_retry_is_idempotent() {
        let mut conn = test_db();
        let record = test_product(&conn, "USB Hub", Some(19.99));

        let mut synced = record.clone();
        synced.current_price = Some(17.50);
        synced.status = ProductStatus::Updated;
        let entry = HistoryEntry { date: "2026-03-02T10:00:00Z".to_string(), price: 17.50 };

        apply_sync_result(&mut conn, &synced, Some(&entry)).unwrap();
        apply_sync_result(&mut conn, &synced, Some(&entry)).unwrap();

        assert_eq!(read_history(&conn, record.id).unwrap().len(), 1);
    }

    #[test]
    fn read_history_empty_for_unknown_product() {
        let conn = test_db();
        assert!(read_history(&conn, 42).unwrap().is_empty());
    }

    #[test]
    fn read_history_corrupt_log_is_distinct_error() {
        let conn = test_db();
        let record = test_product(&conn, "USB Hub", Some(19.99));
        assert_eq!(record.id, 1);
        conn.execute(
            "INSERT INTO price_history (product_id, entries) VALUES (1, 'not json')",
            [],
        )
        .unwrap();

        match read_history(&conn, 1) {
            Err(SyncError::HistoryCorrupt { product_id, .. }) => assert_eq!(product_id, 1),
            other => panic!("Expected HistoryCorrupt, got: {:?}", other.map(|v| v.len())),
        }
    }

    #[test]
    fn corrupt_log_replaced_by_next_successful_append() {
        let mut conn = test_db();
        let record = test_product(&conn, "USB Hub", Some(19.99));
        conn.execute(
            "INSERT INTO price_history (product_id, entries) VALUES (?1, '{broken')",
            params![record.id],
        )
        .unwrap();

        let mut synced = record.clone();
        synced.current_price = Some(17.50);
        synced.status = ProductStatus::Updated;
        let entry = HistoryEntry { date: "2026-03-02T10:00:00Z".to_string(), price: 17.50 };
        apply_sync_result(&mut conn, &synced, Some(&entry)).unwrap();

        let history = read_history(&conn, record.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].price, 17.50);
    }

    #[test]
    fn sync_enabled_defaults_on_and_toggles() {
        let conn = test_db();
        assert!(read_sync_enabled(&conn).unwrap());

        set_sync_enabled(&conn, false).unwrap();
        assert!(!read_sync_enabled(&conn).unwrap());

        set_sync_enabled(&conn, true).unwrap();
        assert!(read_sync_enabled(&conn).unwrap());
    }

    #[test]
    fn supplier_and_category_lists() {
        let conn = test_db();

        add_supplier(&conn, "AliExpress").unwrap();
        add_supplier(&conn, "Newegg").unwrap();
        add_supplier(&conn, "AliExpress").unwrap();
        assert_eq!(list_suppliers(&conn).unwrap(), vec!["AliExpress", "Newegg"]);

        add_category(&conn, "Electronics").unwrap();
        add_category(&conn, "Clothing").unwrap();
        assert_eq!(list_categories(&conn).unwrap(), vec!["Clothing", "Electronics"]);
    }

    #[test]
    fn average_price_by_category_skips_unpriced() {
        let conn = test_db();
        test_product(&conn, "Hub", Some(10.0));
        test_product(&conn, "Cable", Some(20.0));
        test_product(&conn, "Unpriced", None);

        let averages = average_price_by_category(&conn).unwrap();
        assert_eq!(averages.len(), 1);
        assert_eq!(averages[0].category, "Electronics");
        assert!((averages[0].average_price - 15.0).abs() < 0.001);
        assert_eq!(averages[0].product_count, 2);
    }

    #[test]
    fn data_survives_reopening_the_database() {
        use tempfile::TempDir;
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("prices.db");

        {
            let conn = Connection::open(&db_path).unwrap();
            init_schema(&conn).unwrap();
            test_product(&conn, "USB Hub", Some(19.99));
            set_sync_enabled(&conn, false).unwrap();
        }

        let conn = Connection::open(&db_path).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(read_all_products(&conn).unwrap().len(), 1);
        // Re-running init_schema must not reset the flag to its seed value
        assert!(!read_sync_enabled(&conn).unwrap());
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            ProductStatus::New,
            ProductStatus::Unchanged,
            ProductStatus::Updated,
            ProductStatus::Error,
        ] {
            assert_eq!(ProductStatus::parse(status.as_str()), status);
        }
        assert_eq!(ProductStatus::parse("garbage"), ProductStatus::New);
    }
}
