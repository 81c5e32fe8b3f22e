use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

pub mod preferences;
pub mod weather;

pub use preferences::{CaffeineLevel, DairyPolicy, PreferenceProfile};
pub use weather::{Coords, WeatherReading};

/// Whether a beverage is intended to be served hot or iced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureMode {
    Hot,
    Iced,
}

impl TemperatureMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemperatureMode::Hot => "hot",
            TemperatureMode::Iced => "iced",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hot" => Some(TemperatureMode::Hot),
            "iced" => Some(TemperatureMode::Iced),
            _ => None,
        }
    }
}

impl Display for TemperatureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Discretization of ambient temperature driving beverage-mode preference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClimateBucket {
    Cold,
    Mild,
    Hot,
}

/// A normalized catalog entry
///
/// The id is derived from `(mode, external_id)` so repeated imports of the
/// same source record are idempotent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoffeeItem {
    pub id: String,
    pub name: String,
    pub temp_allowed: Vec<TemperatureMode>,
    pub tags: Vec<String>,
    pub image_url: Option<String>,
    pub provider: String,
    pub external_id: String,
}

impl CoffeeItem {
    pub fn supports(&self, mode: TemperatureMode) -> bool {
        self.temp_allowed.contains(&mode)
    }

    /// Tags are stored lowercase; callers pass a lowercase needle.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// A catalog entry paired with its deterministic base score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub coffee: CoffeeItem,
    pub score: f64,
}

/// One entry of a served recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoItem {
    pub coffee_id: String,
    pub score: f64,
}

/// Final ranking handed back to the caller, either model-produced or the
/// deterministic fallback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoOutput {
    pub items: Vec<RecoItem>,
    pub explanation: String,
}

/// Everything persisted for one served recommendation
#[derive(Debug, Clone, Serialize)]
pub struct RecommendationRecord {
    pub coords: Coords,
    pub weather: WeatherReading,
    pub output: RecoOutput,
    pub model_version: String,
    pub created_at: DateTime<Utc>,
}
