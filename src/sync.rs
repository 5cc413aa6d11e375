//! Price reconciliation and the sync pass coordinator
//!
//! `reconcile` is the pure decision: given a record and an extracted
//! price, what does the record become and does the history log grow.
//! `SyncEngine` drives one full pass over all tracked products, with
//! per-record failure isolation and pass-level mutual exclusion.

use crate::database::{self, HistoryEntry, ProductRecord, ProductStatus};
use crate::error::{Result, SyncError};
use crate::extract::extract_price;
use crate::fetch;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use std::sync::{Arc, Mutex};

/// Classification of one reconciled record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Unchanged,
    Updated,
}

/// What reconciling one extracted price against a record produced
#[derive(Debug)]
pub struct Reconciliation {
    /// The record as it should be persisted
    pub record: ProductRecord,
    /// History append accompanying a price change
    pub history_entry: Option<HistoryEntry>,
    pub outcome: Outcome,
    /// Delta against the previous current price; reporting only, never stored
    pub change: Option<f64>,
}

/// Decide the state transition for one product
///
/// - No extracted price: only `last_sync` advances; the record is marked
///   `error` so the failed attempt is visible.
/// - Same price: `last_sync` advances, status becomes `unchanged`.
/// - Different price: previous price is kept in `last_price`, the change
///   is stamped into `last_updated`, and a history entry is emitted.
pub fn reconcile(
    record: &ProductRecord,
    extracted: Option<f64>,
    now: DateTime<Utc>,
) -> Reconciliation {
    let now_str = database::format_timestamp(now);
    let mut updated = record.clone();
    updated.last_sync = Some(now_str.clone());

    match extracted {
        None => {
            updated.status = ProductStatus::Error;
            Reconciliation {
                record: updated,
                history_entry: None,
                outcome: Outcome::Unchanged,
                change: None,
            }
        }
        Some(price) if record.current_price == Some(price) => {
            updated.status = ProductStatus::Unchanged;
            Reconciliation {
                record: updated,
                history_entry: None,
                outcome: Outcome::Unchanged,
                change: Some(0.0),
            }
        }
        Some(price) => {
            let change = record.current_price.map(|previous| price - previous);
            updated.last_price = record.current_price;
            updated.current_price = Some(price);
            updated.last_updated = Some(now_str.clone());
            updated.status = ProductStatus::Updated;
            Reconciliation {
                record: updated,
                history_entry: Some(HistoryEntry {
                    date: now_str,
                    price,
                }),
                outcome: Outcome::Updated,
                change,
            }
        }
    }
}

/// Counters for one completed sync pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub updated: usize,
    pub unchanged: usize,
    pub errors: usize,
}

/// Drives sync passes over the tracked products
///
/// Both the scheduler and on-demand API calls funnel through the same
/// engine, so its pass lock is the only mutual-exclusion point.
pub struct SyncEngine {
    db: Arc<Mutex<Connection>>,
    client: reqwest::Client,
    pass_lock: tokio::sync::Mutex<()>,
}

impl SyncEngine {
    pub fn new(db: Arc<Mutex<Connection>>, client: reqwest::Client) -> Self {
        Self {
            db,
            client,
            pass_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Run one full sync pass over all tracked products
    ///
    /// At most one pass runs at a time; a trigger while another pass is
    /// active gets `SyncInProgress` instead of interleaving writes with
    /// it. Failing to enumerate products aborts the pass with a store
    /// error. Everything else is per-record: fetch and extraction
    /// failures degrade to an absent price (counted `unchanged`, the
    /// record marked `error`), and a failed persist bumps `errors`
    /// without touching the records already committed.
    pub async fn run_once(&self) -> Result<SyncSummary> {
        let _pass = self
            .pass_lock
            .try_lock()
            .map_err(|_| SyncError::SyncInProgress)?;

        let products = {
            let conn = self.db.lock().unwrap();
            database::read_all_products(&conn)?
        };
        log::info!("Starting sync pass over {} products", products.len());

        let mut summary = SyncSummary::default();
        for product in products {
            if product.url.is_empty() {
                log::debug!("Product {} ({}) has no URL, skipping", product.id, product.name);
                summary.unchanged += 1;
                continue;
            }

            let extracted = self.probe_price(&product.url, &product.supplier).await;
            let result = reconcile(&product, extracted, Utc::now());

            if result.outcome == Outcome::Updated {
                match result.change {
                    Some(change) => log::info!(
                        "Product {} ({}): price changed to {:.2} ({:+.2})",
                        product.id,
                        product.name,
                        result.record.current_price.unwrap_or(0.0),
                        change
                    ),
                    None => log::info!(
                        "Product {} ({}): first price recorded: {:.2}",
                        product.id,
                        product.name,
                        result.record.current_price.unwrap_or(0.0)
                    ),
                }
            }

            let persisted = {
                let mut conn = self.db.lock().unwrap();
                database::apply_sync_result(&mut conn, &result.record, result.history_entry.as_ref())
            };
            match persisted {
                Ok(()) => match result.outcome {
                    Outcome::Updated => summary.updated += 1,
                    Outcome::Unchanged => summary.unchanged += 1,
                },
                Err(e) => {
                    log::error!(
                        "Failed to persist sync result for product {} ({}): {}",
                        product.id,
                        product.name,
                        e
                    );
                    summary.errors += 1;
                }
            }
        }

        log::info!(
            "Sync pass complete: {} updated, {} unchanged, {} errors",
            summary.updated,
            summary.unchanged,
            summary.errors
        );
        Ok(summary)
    }

    /// Fetch one listing page and extract a price
    ///
    /// Fetch and extraction failures both degrade to `None`; also used
    /// when creating a record so it can start out with a price.
    pub async fn probe_price(&self, url: &str, supplier: &str) -> Option<f64> {
        if url.is_empty() {
            return None;
        }
        match fetch::fetch_page(&self.client, url).await {
            Ok(body) => extract_price(url, supplier, &body),
            Err(e) => {
                log::warn!("Fetch failed for {}: {}", url, e);
                None
            }
        }
    }
}
