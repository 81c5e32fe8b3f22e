use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{CoffeeItem, RecommendationRecord, TemperatureMode},
    services::{catalog::PersistentCatalog, recommendation::RecommendationLog},
};

/// Creates a PostgreSQL connection pool
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Database row for a catalog entry; temperature modes and tags are stored as
/// text arrays
#[derive(Debug, sqlx::FromRow)]
struct CoffeeRow {
    id: String,
    name: String,
    temp_allowed: Vec<String>,
    tags: Vec<String>,
    image_url: Option<String>,
    provider: String,
    external_id: String,
}

impl From<CoffeeRow> for CoffeeItem {
    fn from(row: CoffeeRow) -> Self {
        CoffeeItem {
            id: row.id,
            name: row.name,
            temp_allowed: row
                .temp_allowed
                .iter()
                .filter_map(|m| TemperatureMode::parse(m))
                .collect(),
            tags: row.tags,
            image_url: row.image_url,
            provider: row.provider,
            external_id: row.external_id,
        }
    }
}

/// Postgres-backed persistent catalog
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl PersistentCatalog for PgCatalog {
    async fn query_by_mode(&self, mode: TemperatureMode) -> AppResult<Vec<CoffeeItem>> {
        let rows: Vec<CoffeeRow> = sqlx::query_as(
            r#"
            SELECT id, name, temp_allowed, tags, image_url, provider, external_id
            FROM coffees
            WHERE $1 = ANY(temp_allowed)
            ORDER BY id
            "#,
        )
        .bind(mode.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CoffeeItem::from).collect())
    }

    async fn upsert_batch(&self, items: &[CoffeeItem]) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        for item in items {
            let temp_allowed: Vec<String> = item
                .temp_allowed
                .iter()
                .map(|m| m.as_str().to_string())
                .collect();

            sqlx::query(
                r#"
                INSERT INTO coffees (id, name, temp_allowed, tags, image_url, provider, external_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (id) DO UPDATE SET
                    name = EXCLUDED.name,
                    temp_allowed = EXCLUDED.temp_allowed,
                    tags = EXCLUDED.tags,
                    image_url = EXCLUDED.image_url,
                    provider = EXCLUDED.provider,
                    external_id = EXCLUDED.external_id,
                    updated_at = now()
                "#,
            )
            .bind(&item.id)
            .bind(&item.name)
            .bind(&temp_allowed)
            .bind(&item.tags)
            .bind(&item.image_url)
            .bind(&item.provider)
            .bind(&item.external_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

/// Postgres-backed recommendation log
pub struct PgRecommendationLog {
    pool: PgPool,
}

impl PgRecommendationLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RecommendationLog for PgRecommendationLog {
    async fn store(&self, record: &RecommendationRecord) -> AppResult<Uuid> {
        let mut tx = self.pool.begin().await?;

        let weather_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO weather_snapshots
                (id, lat, lon, tz, temp_c, feels_like_c, humidity, is_raining, raw, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(weather_id)
        .bind(record.coords.lat)
        .bind(record.coords.lon)
        .bind(&record.weather.tz)
        .bind(record.weather.temp_c)
        .bind(record.weather.feels_like_c)
        .bind(record.weather.humidity)
        .bind(record.weather.is_raining)
        .bind(serde_json::to_value(&record.weather).unwrap_or_default())
        .bind(record.created_at)
        .execute(&mut *tx)
        .await?;

        let recommendation_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO recommendations
                (id, weather_id, explanation, model_version, raw_model, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(recommendation_id)
        .bind(weather_id)
        .bind(&record.output.explanation)
        .bind(&record.model_version)
        .bind(serde_json::to_value(&record.output).unwrap_or_default())
        .bind(record.created_at)
        .execute(&mut *tx)
        .await?;

        for (position, item) in record.output.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO recommendation_items
                    (id, recommendation_id, coffee_id, score, position)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(recommendation_id)
            .bind(&item.coffee_id)
            .bind(item.score)
            .bind(position as i32)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(recommendation_id)
    }
}
