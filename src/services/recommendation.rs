use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        ClimateBucket, Coords, PreferenceProfile, RecoOutput, RecommendationRecord,
        ScoredCandidate, TemperatureMode, WeatherReading,
    },
    services::{
        catalog::CatalogStore,
        reranker::Reranker,
        scoring::{climate_bucket, select_top_k, DEFAULT_TOP_K},
        weather::WeatherSource,
    },
};

/// Persistence seam for served recommendations
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RecommendationLog: Send + Sync {
    /// Stores the weather snapshot and the recommendation in one transaction,
    /// returning the recommendation id
    async fn store(&self, record: &RecommendationRecord) -> AppResult<Uuid>;
}

/// A served recommendation, with the full scored list kept for auditing
#[derive(Debug, Clone)]
pub struct Recommendation {
    pub id: Uuid,
    pub weather: WeatherReading,
    pub output: RecoOutput,
    pub top_k: Vec<ScoredCandidate>,
}

/// Composes the pipeline: weather, mode selection, catalog, deterministic
/// scoring, reranking, persistence
pub struct RecommendationService {
    weather: Arc<dyn WeatherSource>,
    catalog: Arc<CatalogStore>,
    reranker: Reranker,
    log: Arc<dyn RecommendationLog>,
}

impl RecommendationService {
    pub fn new(
        weather: Arc<dyn WeatherSource>,
        catalog: Arc<CatalogStore>,
        reranker: Reranker,
        log: Arc<dyn RecommendationLog>,
    ) -> Self {
        Self {
            weather,
            catalog,
            reranker,
            log,
        }
    }

    pub async fn recommend(
        &self,
        coords: Coords,
        prefs: &PreferenceProfile,
    ) -> AppResult<Recommendation> {
        let weather = self.weather.current(coords).await?;

        let mode = main_mode(&weather, prefs);
        let catalog = self.catalog.load(mode).await?;

        let top_k = select_top_k(&catalog, &weather, prefs, DEFAULT_TOP_K);

        let outcome = self.reranker.rerank(&top_k, &weather, prefs).await;
        if let Some(reason) = outcome.fallback_reason() {
            tracing::info!(reason = reason.as_str(), "Served deterministic fallback ranking");
        }
        let output = outcome.into_output();

        let record = RecommendationRecord {
            coords,
            weather: weather.clone(),
            output: output.clone(),
            model_version: "v1".to_string(),
            created_at: Utc::now(),
        };
        let id = self.log.store(&record).await?;

        tracing::info!(
            recommendation_id = %id,
            mode = %mode,
            candidates = top_k.len(),
            items = output.items.len(),
            "Recommendation served"
        );

        Ok(Recommendation {
            id,
            weather,
            output,
            top_k,
        })
    }
}

/// Which side of the catalog to recommend from
///
/// An explicit temperature preference wins; otherwise a hot day suggests iced
/// drinks and everything else defaults to hot.
fn main_mode(weather: &WeatherReading, prefs: &PreferenceProfile) -> TemperatureMode {
    prefs
        .temp_pref
        .unwrap_or_else(|| match climate_bucket(weather.temp_c) {
            ClimateBucket::Hot => TemperatureMode::Iced,
            ClimateBucket::Cold | ClimateBucket::Mild => TemperatureMode::Hot,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::CoffeeItem;
    use crate::services::catalog::{MockCatalogSource, MockPersistentCatalog};
    use crate::services::weather::MockWeatherSource;
    use serde_json::json;

    fn reading(temp_c: f64) -> WeatherReading {
        WeatherReading {
            temp_c,
            feels_like_c: None,
            humidity: None,
            precipitation_mm: None,
            is_raining: false,
            is_day: None,
            code: None,
            tz: "GMT".to_string(),
            source: "open-meteo".to_string(),
        }
    }

    fn iced_item(external_id: &str, tags: &[&str]) -> CoffeeItem {
        CoffeeItem {
            id: format!("iced-{}", external_id),
            name: format!("Iced {}", external_id),
            temp_allowed: vec![TemperatureMode::Iced],
            tags: tags.iter().map(|t| t.to_string()).collect(),
            image_url: None,
            provider: "sampleapis".to_string(),
            external_id: external_id.to_string(),
        }
    }

    fn service_with(
        weather: MockWeatherSource,
        catalog: MockPersistentCatalog,
        log: MockRecommendationLog,
    ) -> RecommendationService {
        let mut source = MockCatalogSource::new();
        source.expect_fetch().times(0);
        RecommendationService::new(
            Arc::new(weather),
            Arc::new(CatalogStore::new(Arc::new(catalog), Arc::new(source))),
            Reranker::new(None),
            Arc::new(log),
        )
    }

    #[test]
    fn test_main_mode_prefers_explicit_preference() {
        let prefs = PreferenceProfile {
            temp_pref: Some(TemperatureMode::Hot),
            ..Default::default()
        };
        assert_eq!(main_mode(&reading(30.0), &prefs), TemperatureMode::Hot);
    }

    #[test]
    fn test_main_mode_follows_climate_bucket() {
        let prefs = PreferenceProfile::default();
        assert_eq!(main_mode(&reading(30.0), &prefs), TemperatureMode::Iced);
        assert_eq!(main_mode(&reading(10.0), &prefs), TemperatureMode::Hot);
        assert_eq!(main_mode(&reading(20.0), &prefs), TemperatureMode::Hot);
        assert_eq!(main_mode(&reading(f64::NAN), &prefs), TemperatureMode::Hot);
    }

    #[tokio::test]
    async fn test_recommend_composes_pipeline_with_fallback() {
        let coords = Coords { lat: -23.55, lon: -46.63 };
        let id = Uuid::new_v4();

        let mut weather = MockWeatherSource::new();
        weather
            .expect_current()
            .times(1)
            .returning(|_| Ok(reading(30.0)));

        let mut catalog = MockPersistentCatalog::new();
        catalog
            .expect_query_by_mode()
            .withf(|mode| *mode == TemperatureMode::Iced)
            .times(1)
            .returning(|_| Ok(vec![iced_item("1", &["chocolate"]), iced_item("2", &[])]));

        let mut log = MockRecommendationLog::new();
        log.expect_store()
            .withf(|record: &RecommendationRecord| {
                record.output.items.len() == 2 && record.model_version == "v1"
            })
            .times(1)
            .returning(move |_| Ok(id));

        let service = service_with(weather, catalog, log);
        let prefs = PreferenceProfile {
            temp_pref: Some(TemperatureMode::Iced),
            ..Default::default()
        };

        let recommendation = service.recommend(coords, &prefs).await.unwrap();

        assert_eq!(recommendation.id, id);
        assert_eq!(recommendation.top_k.len(), 2);
        // both candidates score 0.45 (iced match) + 0.20 (preference), stable order
        assert!((recommendation.top_k[0].score - 0.65).abs() < 1e-9);
        assert_eq!(recommendation.output.items[0].coffee_id, "iced-1");
        assert_eq!(recommendation.output.items[1].coffee_id, "iced-2");
    }

    #[tokio::test]
    async fn test_recommend_propagates_weather_failure() {
        let mut weather = MockWeatherSource::new();
        weather
            .expect_current()
            .times(1)
            .returning(|_| Err(AppError::WeatherFetch("weather API returned status 502".into())));

        let catalog = MockPersistentCatalog::new();
        let log = MockRecommendationLog::new();
        let service = service_with(weather, catalog, log);

        let err = service
            .recommend(Coords { lat: 0.0, lon: 0.0 }, &PreferenceProfile::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::WeatherFetch(_)));
    }

    #[tokio::test]
    async fn test_recommend_propagates_catalog_failure() {
        let mut weather = MockWeatherSource::new();
        weather
            .expect_current()
            .times(1)
            .returning(|_| Ok(reading(30.0)));

        let mut catalog = MockPersistentCatalog::new();
        catalog
            .expect_query_by_mode()
            .times(1)
            .returning(|_| Ok(vec![]));

        let mut source = MockCatalogSource::new();
        source
            .expect_fetch()
            .times(1)
            .returning(|_| Err(AppError::CatalogFetch("catalog API returned status 500".into())));

        let log = MockRecommendationLog::new();
        let service = RecommendationService::new(
            Arc::new(weather),
            Arc::new(CatalogStore::new(Arc::new(catalog), Arc::new(source))),
            Reranker::new(None),
            Arc::new(log),
        );

        let err = service
            .recommend(Coords { lat: 0.0, lon: 0.0 }, &PreferenceProfile::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::CatalogFetch(_)));
    }

    #[tokio::test]
    async fn test_recommend_normalizes_on_cache_miss() {
        let id = Uuid::new_v4();

        let mut weather = MockWeatherSource::new();
        weather
            .expect_current()
            .times(1)
            .returning(|_| Ok(reading(10.0)));

        let mut catalog = MockPersistentCatalog::new();
        catalog
            .expect_query_by_mode()
            .withf(|mode| *mode == TemperatureMode::Hot)
            .times(1)
            .returning(|_| Ok(vec![]));
        catalog
            .expect_upsert_batch()
            .withf(|items: &[CoffeeItem]| items.len() == 1 && items[0].id == "hot-1")
            .times(1)
            .returning(|_| Ok(()));

        let mut source = MockCatalogSource::new();
        source.expect_fetch().times(1).returning(|_| {
            Ok(vec![json!({
                "id": 1,
                "title": "Latte",
                "ingredients": ["milk", "espresso"]
            })])
        });

        let mut log = MockRecommendationLog::new();
        log.expect_store().times(1).returning(move |_| Ok(id));

        let service = RecommendationService::new(
            Arc::new(weather),
            Arc::new(CatalogStore::new(Arc::new(catalog), Arc::new(source))),
            Reranker::new(None),
            Arc::new(log),
        );

        let recommendation = service
            .recommend(Coords { lat: 0.0, lon: 0.0 }, &PreferenceProfile::default())
            .await
            .unwrap();

        assert_eq!(recommendation.output.items.len(), 1);
        assert_eq!(recommendation.output.items[0].coffee_id, "hot-1");
        // cold day, hot-capable item
        assert_eq!(recommendation.output.items[0].score, 0.45);
    }
}
