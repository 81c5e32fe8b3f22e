use std::sync::Arc;

use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use barista_api::{
    config::Config,
    db::{self, Cache, PgCatalog, PgRecommendationLog},
    routes::{create_router, AppState},
    services::{
        catalog::{CatalogStore, SampleApisSource},
        recommendation::RecommendationService,
        reranker::{LanguageModel, OpenAiChatModel, Reranker},
        weather::OpenMeteoSource,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let pool = db::create_pool(&config.database_url).await?;
    let redis_client = db::create_redis_client(&config.redis_url)?;
    let (cache, _cache_writer) = Cache::new(redis_client).await;

    let catalog = Arc::new(CatalogStore::new(
        Arc::new(PgCatalog::new(pool.clone())),
        Arc::new(SampleApisSource::new(config.catalog_api_url.clone())),
    ));

    let weather = Arc::new(OpenMeteoSource::new(
        config.weather_api_url.clone(),
        cache.clone(),
    ));

    let model: Option<Arc<dyn LanguageModel>> = match &config.openai_api_key {
        Some(api_key) => Some(Arc::new(OpenAiChatModel::new(
            config.openai_api_url.clone(),
            api_key.clone(),
            config.openai_model.clone(),
        ))),
        None => {
            tracing::warn!("OPENAI_API_KEY not set, reranking will use the rule-based fallback");
            None
        }
    };

    let recommender = Arc::new(RecommendationService::new(
        weather,
        catalog.clone(),
        Reranker::new(model),
        Arc::new(PgRecommendationLog::new(pool)),
    ));

    let state = AppState {
        catalog,
        recommender,
    };

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "barista-api listening");
    axum::serve(listener, app).await?;

    Ok(())
}
