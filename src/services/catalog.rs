use std::sync::Arc;

use reqwest::Client as HttpClient;
use serde_json::Value;

use crate::{
    error::{AppError, AppResult},
    models::{CoffeeItem, TemperatureMode},
};

const PROVIDER: &str = "sampleapis";

/// Keywords scanned from free-text descriptions; source data mixes English
/// and Portuguese spellings.
const KEYWORD_TAGS: &[(&str, &[&str])] = &[
    ("chocolate", &["chocolate"]),
    ("vanilla", &["vanilla", "baunilha"]),
    ("caramel", &["caramel"]),
    ("milk", &["milk", "leite"]),
    ("espresso", &["espresso"]),
    ("ice", &["ice", "gelado"]),
];

/// Persistent store the normalized catalog is cached in
///
/// `upsert_batch` must be atomic: either the whole refresh lands or none of
/// it. Upserts are idempotent per id, so concurrent refreshes for the same
/// mode may race safely.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait PersistentCatalog: Send + Sync {
    async fn query_by_mode(&self, mode: TemperatureMode) -> AppResult<Vec<CoffeeItem>>;

    async fn upsert_batch(&self, items: &[CoffeeItem]) -> AppResult<()>;
}

/// External source of raw catalog records
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetches the raw candidate list for a temperature mode. Raw records are
    /// loosely typed and narrowed during normalization.
    async fn fetch(&self, mode: TemperatureMode) -> AppResult<Vec<Value>>;
}

/// sampleapis.com coffee catalog
pub struct SampleApisSource {
    http_client: HttpClient,
    api_url: String,
}

impl SampleApisSource {
    pub fn new(api_url: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_url,
        }
    }
}

#[async_trait::async_trait]
impl CatalogSource for SampleApisSource {
    async fn fetch(&self, mode: TemperatureMode) -> AppResult<Vec<Value>> {
        let url = format!("{}/coffee/{}", self.api_url, mode);

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::CatalogFetch(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::CatalogFetch(format!(
                "catalog API returned status {}: {}",
                status, body
            )));
        }

        let records: Vec<Value> = response
            .json()
            .await
            .map_err(|e| AppError::CatalogFetch(format!("invalid catalog response: {}", e)))?;

        tracing::info!(
            mode = %mode,
            records = records.len(),
            provider = PROVIDER,
            "Raw catalog fetched"
        );

        Ok(records)
    }
}

/// Cache-aside loader for the beverage catalog
///
/// The persistent store is consulted first; absence of data for a mode is the
/// only trigger for refreshing from the external source. There is no TTL.
pub struct CatalogStore {
    catalog: Arc<dyn PersistentCatalog>,
    source: Arc<dyn CatalogSource>,
}

impl CatalogStore {
    pub fn new(catalog: Arc<dyn PersistentCatalog>, source: Arc<dyn CatalogSource>) -> Self {
        Self { catalog, source }
    }

    /// Returns every catalog entry supporting the requested mode
    ///
    /// On a cache miss the freshly normalized list is returned directly; the
    /// just-computed values are authoritative for this call.
    pub async fn load(&self, mode: TemperatureMode) -> AppResult<Vec<CoffeeItem>> {
        let cached = self.catalog.query_by_mode(mode).await?;
        if !cached.is_empty() {
            tracing::debug!(mode = %mode, items = cached.len(), "Catalog cache hit");
            return Ok(cached);
        }

        let raw = self.source.fetch(mode).await?;
        let normalized: Vec<CoffeeItem> = raw.iter().map(|r| normalize_item(r, mode)).collect();

        self.catalog.upsert_batch(&normalized).await?;

        tracing::info!(
            mode = %mode,
            items = normalized.len(),
            "Catalog refreshed from external source"
        );

        Ok(normalized)
    }
}

/// Narrows one raw record into a catalog entry
///
/// The id is `{mode}-{externalId}`, so re-importing the same record is an
/// upsert, not a duplicate.
pub fn normalize_item(raw: &Value, mode: TemperatureMode) -> CoffeeItem {
    let external_id = raw.get("id").map(value_to_string).unwrap_or_default();

    let name = raw
        .get("title")
        .and_then(Value::as_str)
        .or_else(|| raw.get("name").and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| format!("Coffee {}", external_id).trim().to_string());

    let mut tags: Vec<String> = Vec::new();
    if let Some(ingredients) = raw.get("ingredients").and_then(Value::as_array) {
        for ingredient in ingredients {
            add_tag(&mut tags, value_to_string(ingredient).to_lowercase());
        }
    }

    let description = raw
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_lowercase();
    for (tag, needles) in KEYWORD_TAGS {
        if needles.iter().any(|needle| description.contains(needle)) {
            add_tag(&mut tags, (*tag).to_string());
        }
    }

    CoffeeItem {
        id: format!("{}-{}", mode, external_id),
        name,
        temp_allowed: vec![mode],
        tags,
        image_url: raw
            .get("image")
            .and_then(Value::as_str)
            .map(str::to_string),
        provider: PROVIDER.to_string(),
        external_id,
    }
}

fn add_tag(tags: &mut Vec<String>, tag: String) {
    if !tag.is_empty() && !tags.contains(&tag) {
        tags.push(tag);
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}
