use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{AppError, AppResult};

/// Geographic coordinates for a weather lookup
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coords {
    pub lat: f64,
    pub lon: f64,
}

impl Coords {
    pub fn validate(&self) -> AppResult<()> {
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(AppError::InvalidInput(format!(
                "latitude out of range: {}",
                self.lat
            )));
        }
        if !(-180.0..=180.0).contains(&self.lon) {
            return Err(AppError::InvalidInput(format!(
                "longitude out of range: {}",
                self.lon
            )));
        }
        Ok(())
    }
}

/// Weather codes open-meteo uses for drizzle, freezing rain, rain and showers
const RAINY_CODES: [i64; 13] = [51, 53, 55, 56, 57, 61, 63, 65, 66, 67, 80, 81, 82];

/// Current weather snapshot used as scoring input
///
/// Created fresh per recommendation request and only ever snapshotted, never
/// mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherReading {
    /// NaN when the source reading is missing or malformed
    #[serde(deserialize_with = "nan_when_null")]
    pub temp_c: f64,
    pub feels_like_c: Option<f64>,
    pub humidity: Option<f64>,
    pub precipitation_mm: Option<f64>,
    pub is_raining: bool,
    pub is_day: Option<bool>,
    pub code: Option<i64>,
    pub tz: String,
    pub source: String,
}

/// serde_json writes non-finite floats as null; read null back as NaN so a
/// malformed reading survives the cache round-trip.
fn nan_when_null<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

/// Raw response from the open-meteo forecast endpoint
#[derive(Debug, Deserialize)]
pub struct OpenMeteoResponse {
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub current: Option<OpenMeteoCurrent>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OpenMeteoCurrent {
    #[serde(default)]
    pub temperature_2m: Option<f64>,
    #[serde(default)]
    pub relative_humidity_2m: Option<f64>,
    #[serde(default)]
    pub apparent_temperature: Option<f64>,
    #[serde(default)]
    pub precipitation: Option<f64>,
    #[serde(default)]
    pub is_day: Option<i64>,
    #[serde(default)]
    pub weather_code: Option<i64>,
}

impl From<OpenMeteoResponse> for WeatherReading {
    fn from(response: OpenMeteoResponse) -> Self {
        let current = response.current.unwrap_or_default();

        let temp_c = current
            .temperature_2m
            .filter(|t| t.is_finite())
            .unwrap_or(f64::NAN);
        let precipitation_mm = current.precipitation.filter(|p| p.is_finite());
        let code = current.weather_code;

        let is_raining = precipitation_mm.unwrap_or(0.0) > 0.0
            || code.is_some_and(|c| RAINY_CODES.contains(&c));

        WeatherReading {
            temp_c,
            feels_like_c: current.apparent_temperature.filter(|t| t.is_finite()),
            humidity: current.relative_humidity_2m.filter(|h| h.is_finite()),
            precipitation_mm,
            is_raining,
            is_day: current.is_day.map(|d| d == 1),
            code,
            tz: response.timezone.unwrap_or_else(|| "GMT".to_string()),
            source: "open-meteo".to_string(),
        }
    }
}
