//! Web server for the price tracker UI
//!
//! REST API for product management, manual sync triggering and price
//! history, plus a single-page dashboard.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;

use crate::database::{
    self, CategoryAverage, HistoryEntry, NewProduct, ProductRecord, ProductUpdate,
};
use crate::error::SyncError;
use crate::sync::{SyncEngine, SyncSummary};

/// Shared application state (thread-safe database connection + sync engine)
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    engine: Arc<SyncEngine>,
}

/// API response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }

    fn fail(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: false,
            data: None,
            error: Some(message.into()),
        })
    }
}

/// GET / - Serve the dashboard (single HTML page)
async fn index_handler() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}

/// GET /api/products
async fn list_products(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<ProductRecord>>>, StatusCode> {
    let conn = state.db.lock().unwrap();
    match database::read_all_products(&conn) {
        Ok(products) => Ok(ApiResponse::ok(products)),
        Err(e) => {
            log::error!("Failed to list products: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Payload for POST /api/products
#[derive(Deserialize)]
struct CreateProduct {
    name: String,
    #[serde(default)]
    category: String,
    supplier: String,
    url: String,
}

/// POST /api/products
///
/// Probes the listing once so a new record starts out with a price when
/// the page yields one.
async fn create_product(
    State(state): State<AppState>,
    Json(input): Json<CreateProduct>,
) -> Result<Json<ApiResponse<ProductRecord>>, StatusCode> {
    let initial_price = state.engine.probe_price(&input.url, &input.supplier).await;

    let new = NewProduct {
        name: input.name,
        category: input.category,
        supplier: input.supplier,
        url: input.url,
    };

    let conn = state.db.lock().unwrap();
    match database::insert_product(&conn, &new, initial_price, &database::now_timestamp()) {
        Ok(record) => Ok(ApiResponse::ok(record)),
        Err(e) => {
            log::error!("Failed to create product: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// PUT /api/products/{id}
async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<ProductUpdate>,
) -> Result<Json<ApiResponse<ProductRecord>>, StatusCode> {
    let conn = state.db.lock().unwrap();
    match database::update_product_fields(&conn, id, &update) {
        Ok(false) => Err(StatusCode::NOT_FOUND),
        Ok(true) => match database::get_product(&conn, id) {
            Ok(Some(record)) => Ok(ApiResponse::ok(record)),
            Ok(None) => Err(StatusCode::NOT_FOUND),
            Err(e) => {
                log::error!("Failed to re-read product {}: {}", id, e);
                Err(StatusCode::INTERNAL_SERVER_ERROR)
            }
        },
        Err(e) => {
            log::error!("Failed to update product {}: {}", id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// DELETE /api/products/{id}
async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<()>>, StatusCode> {
    let mut conn = state.db.lock().unwrap();
    match database::delete_product(&mut conn, id) {
        Ok(true) => Ok(ApiResponse::ok(())),
        Ok(false) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            log::error!("Failed to delete product {}: {}", id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /api/history/{id}
///
/// Empty array when nothing was recorded yet; a corrupt stored log is a
/// distinct error body, not a crash.
async fn history_handler(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    let conn = state.db.lock().unwrap();
    match database::read_history(&conn, id) {
        Ok(entries) => ApiResponse::ok(entries).into_response(),
        Err(e @ SyncError::HistoryCorrupt { .. }) => {
            log::error!("{}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiResponse::<Vec<HistoryEntry>>::fail("stored price history is corrupt"),
            )
                .into_response()
        }
        Err(e) => {
            log::error!("Failed to read history for product {}: {}", id, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// POST /api/sync - run one sync pass now
async fn sync_handler(State(state): State<AppState>) -> Response {
    match state.engine.run_once().await {
        Ok(summary) => ApiResponse::ok(summary).into_response(),
        Err(SyncError::SyncInProgress) => (
            StatusCode::CONFLICT,
            ApiResponse::<SyncSummary>::fail("a sync pass is already running"),
        )
            .into_response(),
        Err(e) => {
            log::error!("Manual sync pass failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiResponse::<SyncSummary>::fail("sync pass failed"),
            )
                .into_response()
        }
    }
}

#[derive(Serialize, Deserialize)]
struct SyncEnabled {
    enabled: bool,
}

/// GET /api/sync/enabled
async fn sync_enabled_get(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<SyncEnabled>>, StatusCode> {
    let conn = state.db.lock().unwrap();
    match database::read_sync_enabled(&conn) {
        Ok(enabled) => Ok(ApiResponse::ok(SyncEnabled { enabled })),
        Err(e) => {
            log::error!("Failed to read sync flag: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// POST /api/sync/enabled - the flag's externally-owned mutation path
async fn sync_enabled_set(
    State(state): State<AppState>,
    Json(input): Json<SyncEnabled>,
) -> Result<Json<ApiResponse<SyncEnabled>>, StatusCode> {
    let conn = state.db.lock().unwrap();
    match database::set_sync_enabled(&conn, input.enabled) {
        Ok(()) => {
            log::info!("Sync {}", if input.enabled { "enabled" } else { "disabled" });
            Ok(ApiResponse::ok(input))
        }
        Err(e) => {
            log::error!("Failed to set sync flag: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[derive(Deserialize)]
struct AddSupplier {
    supplier: String,
}

/// GET /api/suppliers
async fn suppliers_get(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<String>>>, StatusCode> {
    let conn = state.db.lock().unwrap();
    match database::list_suppliers(&conn) {
        Ok(names) => Ok(ApiResponse::ok(names)),
        Err(e) => {
            log::error!("Failed to list suppliers: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// POST /api/suppliers
async fn suppliers_post(
    State(state): State<AppState>,
    Json(input): Json<AddSupplier>,
) -> Response {
    if input.supplier.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            ApiResponse::<()>::fail("supplier name required"),
        )
            .into_response();
    }
    let conn = state.db.lock().unwrap();
    match database::add_supplier(&conn, input.supplier.trim()) {
        Ok(()) => ApiResponse::ok(()).into_response(),
        Err(e) => {
            log::error!("Failed to add supplier: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Deserialize)]
struct AddCategory {
    category: String,
}

/// GET /api/categories
async fn categories_get(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<String>>>, StatusCode> {
    let conn = state.db.lock().unwrap();
    match database::list_categories(&conn) {
        Ok(names) => Ok(ApiResponse::ok(names)),
        Err(e) => {
            log::error!("Failed to list categories: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// POST /api/categories
async fn categories_post(
    State(state): State<AppState>,
    Json(input): Json<AddCategory>,
) -> Response {
    if input.category.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            ApiResponse::<()>::fail("category name required"),
        )
            .into_response();
    }
    let conn = state.db.lock().unwrap();
    match database::add_category(&conn, input.category.trim()) {
        Ok(()) => ApiResponse::ok(()).into_response(),
        Err(e) => {
            log::error!("Failed to add category: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// GET /api/analytics - average current price per category
async fn analytics_handler(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<CategoryAverage>>>, StatusCode> {
    let conn = state.db.lock().unwrap();
    match database::average_price_by_category(&conn) {
        Ok(averages) => Ok(ApiResponse::ok(averages)),
        Err(e) => {
            log::error!("Failed to compute analytics: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /api/export - product table as CSV
async fn export_handler(State(state): State<AppState>) -> Response {
    let products = {
        let conn = state.db.lock().unwrap();
        database::read_all_products(&conn)
    };

    let products = match products {
        Ok(products) => products,
        Err(e) => {
            log::error!("Failed to read products for export: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match export_csv(&products) {
        Ok(csv) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/csv")
            .header(
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"products.csv\"",
            )
            .body(Body::from(csv))
            .unwrap(),
        Err(e) => {
            log::error!("Failed to build CSV export: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn export_csv(products: &[ProductRecord]) -> Result<String, Box<dyn std::error::Error>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for product in products {
        writer.serialize(product)?;
    }
    let bytes = writer.into_inner()?;
    Ok(String::from_utf8(bytes)?)
}

/// Build the web server router
pub fn create_router(db: Arc<Mutex<Connection>>, engine: Arc<SyncEngine>) -> Router {
    let state = AppState { db, engine };

    Router::new()
        .route("/", get(index_handler))
        .route("/api/products", get(list_products).post(create_product))
        .route("/api/products/{id}", put(update_product).delete(delete_product))
        .route("/api/history/{id}", get(history_handler))
        .route("/api/sync", post(sync_handler))
        .route("/api/sync/enabled", get(sync_enabled_get).post(sync_enabled_set))
        .route("/api/suppliers", get(suppliers_get).post(suppliers_post))
        .route("/api/categories", get(categories_get).post(categories_post))
        .route("/api/analytics", get(analytics_handler))
        .route("/api/export", get(export_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the web server (async)
///
/// Binds to 0.0.0.0 (all interfaces) to work with Docker port mapping.
/// When running locally, use firewall rules to restrict access.
pub async fn serve(
    db: Arc<Mutex<Connection>>,
    engine: Arc<SyncEngine>,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_router(db, engine);
    let addr = format!("0.0.0.0:{}", port);

    log::info!("Web UI listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
