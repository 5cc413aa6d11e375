//! Price Sync - supplier price tracker
//!
//! Tracks product prices across supplier storefronts and re-scrapes them
//! on a schedule, recording a per-product price history in SQLite.

use clap::Parser;
use price_sync::{database, fetch, Scheduler, SyncEngine};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Supplier price tracker - scrapes listings and records price history
#[derive(Parser, Debug)]
#[command(name = "price_sync")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the SQLite database file
    #[arg(short, long, default_value_t = default_db_path())]
    database: String,

    /// Run one sync pass and exit (default: run continuously)
    #[arg(long, default_value_t = false)]
    once: bool,

    /// Scheduler interval in minutes when running continuously
    #[arg(long, default_value_t = 10)]
    interval_minutes: u64,

    /// Port for the web UI and API
    #[arg(long, default_value_t = 10000)]
    web_port: u16,
}

/// Returns the default database path: ~/.local/share/price_sync/prices.db
fn default_db_path() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("price_sync")
        .join("prices.db")
        .to_string_lossy()
        .to_string()
}

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let db_path = PathBuf::from(&args.database);

    log::info!("Starting price_sync...");
    log::info!("Database path: {}", db_path.display());

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.exists() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::error!("Failed to create database directory: {}", e);
                std::process::exit(1);
            }
            log::info!("Created directory: {}", parent.display());
        }
    }

    // Open database connection
    let conn = match Connection::open(&db_path) {
        Ok(conn) => {
            log::info!("Opened database: {}", db_path.display());
            conn
        }
        Err(e) => {
            log::error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize database schema
    if let Err(e) = database::init_schema(&conn) {
        log::error!("Failed to initialize database schema: {}", e);
        std::process::exit(1);
    }

    let client = match fetch::build_client() {
        Ok(client) => client,
        Err(e) => {
            log::error!("Failed to build HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    // Wrap connection in Arc<Mutex> for thread-safe sharing
    let db = Arc::new(Mutex::new(conn));
    let engine = Arc::new(SyncEngine::new(Arc::clone(&db), client));

    if args.once {
        // Run once and exit
        match engine.run_once().await {
            Ok(summary) => log::info!(
                "Sync complete: {} updated, {} unchanged, {} errors",
                summary.updated,
                summary.unchanged,
                summary.errors
            ),
            Err(e) => {
                log::error!("Sync failed: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    // Spawn web server
    let web_db = Arc::clone(&db);
    let web_engine = Arc::clone(&engine);
    let web_port = args.web_port;
    tokio::spawn(async move {
        if let Err(e) = price_sync::web::serve(web_db, web_engine, web_port).await {
            log::error!("Web server error: {}", e);
        }
    });

    // Scheduler reads the enabled flag from the database on every tick;
    // the web API is the only writer of that flag.
    let flag_db = Arc::clone(&db);
    let enabled = move || {
        let conn = flag_db.lock().unwrap();
        database::read_sync_enabled(&conn).unwrap_or_else(|e| {
            log::error!("Failed to read sync flag: {}", e);
            false
        })
    };

    let scheduler = Scheduler::start(
        engine,
        Duration::from_secs(args.interval_minutes * 60),
        enabled,
    );
    log::info!(
        "Running in daemon mode, checking every {} minute(s)",
        args.interval_minutes
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
    }
    log::info!("Shutdown signal received");
    scheduler.stop().await;
    log::info!("price_sync stopped");
}
