use serde::{Deserialize, Serialize};

use super::TemperatureMode;
use crate::error::{AppError, AppResult};

/// User taste profile; every field is optional and the whole profile is a
/// read-only input to scoring
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceProfile {
    #[serde(default)]
    pub roast: Option<String>,
    #[serde(default)]
    pub temp_pref: Option<TemperatureMode>,
    #[serde(default)]
    pub dairy: Option<DairyPolicy>,
    #[serde(default)]
    pub sweetness: Option<u8>,
    #[serde(default)]
    pub caffeine: Option<CaffeineLevel>,
    #[serde(default)]
    pub flavor_notes: Vec<String>,
}

impl PreferenceProfile {
    /// Validation happens at the request boundary; the scoring core assumes a
    /// validated profile.
    pub fn validate(&self) -> AppResult<()> {
        if let Some(sweetness) = self.sweetness {
            if sweetness > 5 {
                return Err(AppError::InvalidInput(format!(
                    "sweetness must be between 0 and 5, got {}",
                    sweetness
                )));
            }
        }
        Ok(())
    }
}

/// How the user takes dairy. A single field, so the milk penalties in scoring
/// are mutually exclusive by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DairyPolicy {
    Normal,
    LactoseFree,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaffeineLevel {
    Decaf,
    Regular,
    Strong,
}
