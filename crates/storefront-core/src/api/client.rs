//! HTTP client for the catalog feeds and the batch lookup endpoint.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, Url};
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::{AppEntry, SourceKind};

use super::{ApiError, CatalogSource};

// ============================================================================
// Constants
// ============================================================================

/// Host serving both the ranked feeds and the lookup endpoint
pub const CATALOG_HOST: &str = "itunes.apple.com";

/// Storefront region used when none is configured
pub const DEFAULT_REGION: &str = "hk";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_TOP_GROSSING_LIMIT: usize = 10;

pub const DEFAULT_TOP_FREE_LIMIT: usize = 100;

/// Which ranked feed to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ranking {
    TopGrossing,
    TopFree,
}

impl Ranking {
    fn feed_name(&self) -> &'static str {
        match self {
            Ranking::TopGrossing => "topgrossingapplications",
            Ranking::TopFree => "topfreeapplications",
        }
    }
}

/// Catalog client. Clone is cheap - reqwest::Client shares its pool via Arc.
#[derive(Clone)]
pub struct CatalogClient {
    client: Client,
    /// `https://{host}/{region}/`, always ending in a slash
    base_url: Url,
}

impl CatalogClient {
    /// Create a client for the given storefront region on the public host.
    pub fn new(region: &str) -> Result<Self, ApiError> {
        Self::with_base_url(&format!("https://{}", CATALOG_HOST), region)
    }

    /// Create a client against another base URL (mirrors, local fixtures).
    pub fn with_base_url(base: &str, region: &str) -> Result<Self, ApiError> {
        let base_url = Self::build_base_url(base, region)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(ApiError::NoResponse)?;
        Ok(Self { client, base_url })
    }

    fn build_base_url(base: &str, region: &str) -> Result<Url, ApiError> {
        if region.is_empty() || !region.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ApiError::InvalidUrl(format!("invalid region {:?}", region)));
        }
        let raw = format!("{}/{}/", base.trim_end_matches('/'), region.to_ascii_lowercase());
        let url = Url::parse(&raw).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", raw, e)))?;
        if url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(raw));
        }
        Ok(url)
    }

    /// Host name the client talks to, for reachability probing.
    pub fn host(&self) -> Option<&str> {
        self.base_url.host_str()
    }

    pub fn port(&self) -> u16 {
        self.base_url.port_or_known_default().unwrap_or(443)
    }

    fn feed_url(&self, ranking: Ranking, limit: usize) -> Result<Url, ApiError> {
        let path = format!("rss/{}/limit={}/json", ranking.feed_name(), limit);
        self.base_url
            .join(&path)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", path, e)))
    }

    /// Ids go into the query unescaped, so only catalog ids (ASCII digits)
    /// are accepted.
    fn lookup_url(&self, ids: &[String]) -> Result<Url, ApiError> {
        if let Some(bad) = ids
            .iter()
            .find(|id| id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()))
        {
            return Err(ApiError::InvalidUrl(format!("invalid app id {:?}", bad)));
        }
        let mut url = self
            .base_url
            .join("lookup")
            .map_err(|e| ApiError::InvalidUrl(format!("lookup: {}", e)))?;
        url.set_query(Some(&format!("id={}", ids.join(","))));
        Ok(url)
    }

    async fn get_json(&self, url: Url) -> Result<Value, ApiError> {
        debug!(%url, "Sending catalog request");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(ApiError::from_transport)?;

        let status = response.status();
        let text = response.text().await.map_err(ApiError::from_body)?;
        debug!(%url, status = %status, bytes = text.len(), "Catalog response received");

        if !status.is_success() {
            return Err(ApiError::from_status(status, &text));
        }

        Ok(serde_json::from_str(&text)?)
    }

    async fn fetch_ranking(&self, ranking: Ranking, limit: usize) -> Result<Vec<AppEntry>, ApiError> {
        let url = self.feed_url(ranking, limit)?;
        let body = self.get_json(url).await?;
        let apps = parse_feed(&body)?;
        debug!(?ranking, count = apps.len(), "Ranked feed parsed");
        Ok(apps)
    }

    /// Fetch the top-grossing feed.
    pub async fn fetch_top_grossing(&self, limit: usize) -> Result<Vec<AppEntry>, ApiError> {
        self.fetch_ranking(Ranking::TopGrossing, limit).await
    }

    /// Fetch the top-free feed.
    pub async fn fetch_top_free(&self, limit: usize) -> Result<Vec<AppEntry>, ApiError> {
        self.fetch_ranking(Ranking::TopFree, limit).await
    }

    /// Look up full records for `ids` in one request.
    ///
    /// The result has the same length and order as `ids`, with `None` for
    /// ids the catalog did not return (retired or invalid apps).
    pub async fn fetch_details(&self, ids: &[String]) -> Result<Vec<Option<AppEntry>>, ApiError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.lookup_url(ids)?;
        let body = self.get_json(url).await?;
        let apps = parse_lookup(&body)?;

        let ordered = order_by_ids(ids, apps);
        let missing = ordered.iter().filter(|app| app.is_none()).count();
        if missing > 0 {
            warn!(requested = ids.len(), missing, "Lookup did not resolve every id");
        }
        Ok(ordered)
    }
}

impl CatalogSource for CatalogClient {
    async fn top_grossing(&self, limit: usize) -> Result<Vec<AppEntry>, ApiError> {
        self.fetch_top_grossing(limit).await
    }

    async fn top_free(&self, limit: usize) -> Result<Vec<AppEntry>, ApiError> {
        self.fetch_top_free(limit).await
    }

    async fn details(&self, ids: &[String]) -> Result<Vec<Option<AppEntry>>, ApiError> {
        self.fetch_details(ids).await
    }
}

// ============================================================================
// Response decoding
// ============================================================================

/// Decode a `{feed: {entry: [...]}}` envelope. Entries that do not parse are
/// dropped. A feed with a single result carries `entry` as a bare object.
pub fn parse_feed(body: &Value) -> Result<Vec<AppEntry>, ApiError> {
    let entries = match body.pointer("/feed/entry") {
        Some(Value::Array(entries)) => entries.as_slice(),
        Some(entry @ Value::Object(_)) => std::slice::from_ref(entry),
        _ => return Err(ApiError::NoResult("feed has no entry list".to_string())),
    };

    let apps: Vec<AppEntry> = entries
        .iter()
        .filter_map(|entry| AppEntry::parse(entry, SourceKind::FeedEntry))
        .collect();

    if apps.len() < entries.len() {
        debug!(dropped = entries.len() - apps.len(), "Dropped unparseable feed entries");
    }
    Ok(apps)
}

/// Decode a `{results: [...]}` lookup response.
pub fn parse_lookup(body: &Value) -> Result<Vec<AppEntry>, ApiError> {
    let results = body
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::NoResult("lookup has no results list".to_string()))?;

    Ok(results
        .iter()
        .filter_map(|result| AppEntry::parse(result, SourceKind::LookupResult))
        .collect())
}

/// Re-associate lookup results with the requested ids, keeping request order.
pub fn order_by_ids(ids: &[String], apps: Vec<AppEntry>) -> Vec<Option<AppEntry>> {
    let mut by_id: HashMap<String, AppEntry> = HashMap::with_capacity(apps.len());
    for app in apps {
        by_id.entry(app.app_id.clone()).or_insert(app);
    }
    ids.iter().map(|id| by_id.get(id).cloned()).collect()
}
