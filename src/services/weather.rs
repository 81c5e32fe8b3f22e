use reqwest::Client as HttpClient;

use crate::{
    cached,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{weather::OpenMeteoResponse, Coords, WeatherReading},
};

/// Current-conditions variables requested from open-meteo
const CURRENT_VARS: &str =
    "temperature_2m,relative_humidity_2m,apparent_temperature,precipitation,is_day,weather_code";

/// open-meteo refreshes observations at roughly 15 minute granularity
const WEATHER_CACHE_TTL: u64 = 600;

/// Supplies the current weather for a pair of coordinates
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait WeatherSource: Send + Sync {
    async fn current(&self, coords: Coords) -> AppResult<WeatherReading>;
}

/// open-meteo forecast API client
pub struct OpenMeteoSource {
    http_client: HttpClient,
    api_url: String,
    cache: Cache,
}

impl OpenMeteoSource {
    pub fn new(api_url: String, cache: Cache) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_url,
            cache,
        }
    }
}

#[async_trait::async_trait]
impl WeatherSource for OpenMeteoSource {
    async fn current(&self, coords: Coords) -> AppResult<WeatherReading> {
        cached!(
            self.cache,
            CacheKey::weather(coords),
            WEATHER_CACHE_TTL,
            async move {
                let url = format!("{}/v1/forecast", self.api_url);

                let response = self
                    .http_client
                    .get(&url)
                    .query(&[
                        ("latitude", coords.lat.to_string()),
                        ("longitude", coords.lon.to_string()),
                        ("current", CURRENT_VARS.to_string()),
                        ("timezone", "auto".to_string()),
                    ])
                    .send()
                    .await
                    .map_err(|e| AppError::WeatherFetch(e.to_string()))?;

                if !response.status().is_success() {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    return Err(AppError::WeatherFetch(format!(
                        "weather API returned status {}: {}",
                        status, body
                    )));
                }

                let payload: OpenMeteoResponse = response
                    .json()
                    .await
                    .map_err(|e| AppError::WeatherFetch(format!("invalid weather response: {}", e)))?;

                let reading = WeatherReading::from(payload);

                tracing::info!(
                    temp_c = reading.temp_c,
                    is_raining = reading.is_raining,
                    tz = %reading.tz,
                    "Current weather fetched"
                );

                Ok(reading)
            }
        )
    }
}
