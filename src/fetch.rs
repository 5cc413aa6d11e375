//! Supplier page fetching
//!
//! One bounded-timeout GET per listing URL. Connection pooling and retry
//! policy are deliberately out of scope; a failed fetch is reported to the
//! caller and the sync pass moves on.

use crate::error::{Result, SyncError};
use std::time::Duration;

/// Per-request timeout. One unresponsive supplier must not stall a pass.
const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Storefronts serve different (or no) markup to obvious bots.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64)";

/// Build the shared HTTP client used for all listing fetches
pub fn build_client() -> Result<reqwest::Client> {
    let client = reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?;
    Ok(client)
}

/// Fetch one listing page as text
pub async fn fetch_page(client: &reqwest::Client, url: &str) -> Result<String> {
    log::debug!("Fetching {}", url);

    let response = client
        .get(url)
        .header("User-Agent", USER_AGENT)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(SyncError::HttpStatus(response.status()));
    }

    Ok(response.text().await?)
}
