//! Price Sync - supplier price tracker
//!
//! Scrapes product listing pages from supplier storefronts, reconciles
//! extracted prices against stored records and keeps an append-only price
//! history per product in SQLite.

pub mod database;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod scheduler;
pub mod sync;
pub mod web;

pub use database::{HistoryEntry, ProductRecord, ProductStatus};
pub use error::{Result, SyncError};
pub use extract::{extract_price, SupplierFamily};
pub use scheduler::Scheduler;
pub use sync::{reconcile, SyncEngine, SyncSummary};
