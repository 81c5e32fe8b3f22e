use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::AppResult,
    models::{CoffeeItem, TemperatureMode},
};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct CatalogQuery {
    #[serde(rename = "type")]
    mode: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CatalogResponse {
    #[serde(rename = "type")]
    pub mode: TemperatureMode,
    pub items: Vec<CoffeeItem>,
}

/// Handler for catalog listing; anything other than `type=iced` means hot
pub async fn get_catalog(
    State(state): State<AppState>,
    Query(params): Query<CatalogQuery>,
) -> AppResult<Json<CatalogResponse>> {
    let mode = params
        .mode
        .as_deref()
        .and_then(TemperatureMode::parse)
        .unwrap_or(TemperatureMode::Hot);

    let items = state.catalog.load(mode).await?;
    Ok(Json(CatalogResponse { mode, items }))
}
