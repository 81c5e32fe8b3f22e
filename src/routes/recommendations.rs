use std::collections::HashMap;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{CoffeeItem, Coords, PreferenceProfile, TemperatureMode, WeatherReading},
};

use super::AppState;

/// Fallback location when the client sends no coordinates (São Paulo)
const DEFAULT_COORDS: Coords = Coords {
    lat: -23.55052,
    lon: -46.633308,
};

#[derive(Debug, Default, Deserialize)]
pub struct RecommendationRequest {
    #[serde(default)]
    pub coords: Option<Coords>,
    #[serde(default)]
    pub preferences: Option<PreferenceProfile>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationResponse {
    pub weather: WeatherSummary,
    pub items: Vec<RecommendedItemView>,
    pub explanation: String,
    pub recommendation_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherSummary {
    pub temp_c: f64,
    pub feels_like_c: Option<f64>,
    pub humidity: Option<f64>,
    pub is_raining: bool,
    pub tz: String,
    pub source: String,
}

impl From<&WeatherReading> for WeatherSummary {
    fn from(weather: &WeatherReading) -> Self {
        Self {
            temp_c: weather.temp_c,
            feels_like_c: weather.feels_like_c,
            humidity: weather.humidity,
            is_raining: weather.is_raining,
            tz: weather.tz.clone(),
            source: weather.source.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecommendedItemView {
    pub coffee: CoffeeView,
    pub score: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoffeeView {
    pub id: String,
    pub name: String,
    pub image_url: Option<String>,
    pub tags: Vec<String>,
    pub temp_allowed: Vec<TemperatureMode>,
}

impl From<&CoffeeItem> for CoffeeView {
    fn from(item: &CoffeeItem) -> Self {
        Self {
            id: item.id.clone(),
            name: item.name.clone(),
            image_url: item.image_url.clone(),
            tags: item.tags.clone(),
            temp_allowed: item.temp_allowed.clone(),
        }
    }
}

impl CoffeeView {
    /// Placeholder view for an id the scored candidate list does not know
    fn placeholder(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            image_url: None,
            tags: vec![],
            temp_allowed: vec![],
        }
    }
}

/// Handler for the recommendation pipeline
///
/// Input validation happens here; the pipeline itself assumes validated
/// coordinates and preferences.
pub async fn recommend(
    State(state): State<AppState>,
    Json(request): Json<RecommendationRequest>,
) -> AppResult<Json<RecommendationResponse>> {
    let coords = request.coords.unwrap_or(DEFAULT_COORDS);
    coords.validate()?;

    let prefs = request.preferences.unwrap_or_default();
    prefs.validate()?;

    let recommendation = state.recommender.recommend(coords, &prefs).await?;

    let by_id: HashMap<&str, &CoffeeItem> = recommendation
        .top_k
        .iter()
        .map(|candidate| (candidate.coffee.id.as_str(), &candidate.coffee))
        .collect();

    let mut items: Vec<RecommendedItemView> = recommendation
        .output
        .items
        .iter()
        .map(|item| RecommendedItemView {
            coffee: by_id
                .get(item.coffee_id.as_str())
                .map(|coffee| CoffeeView::from(*coffee))
                .unwrap_or_else(|| CoffeeView::placeholder(&item.coffee_id)),
            score: item.score,
        })
        .collect();
    items.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    Ok(Json(RecommendationResponse {
        weather: WeatherSummary::from(&recommendation.weather),
        items,
        explanation: recommendation.output.explanation,
        recommendation_id: recommendation.id,
    }))
}
