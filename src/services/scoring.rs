use std::cmp::Ordering;

use crate::models::{
    ClimateBucket, CoffeeItem, DairyPolicy, PreferenceProfile, ScoredCandidate, TemperatureMode,
    WeatherReading,
};

/// How many candidates survive deterministic scoring and are offered to the
/// reranker
pub const DEFAULT_TOP_K: usize = 8;

/// Maps an ambient temperature to a climate bucket
///
/// Total over all inputs: non-finite readings land in the mild bucket rather
/// than failing the request.
pub fn climate_bucket(temp_c: f64) -> ClimateBucket {
    if !temp_c.is_finite() {
        return ClimateBucket::Mild;
    }
    if temp_c <= 18.0 {
        return ClimateBucket::Cold;
    }
    if temp_c >= 24.0 {
        return ClimateBucket::Hot;
    }
    ClimateBucket::Mild
}

/// Deterministic relevance of one catalog entry for the current weather and
/// preference profile, clamped to [0, 1]
pub fn base_score(
    coffee: &CoffeeItem,
    weather: &WeatherReading,
    prefs: &PreferenceProfile,
) -> f64 {
    let bucket = climate_bucket(weather.temp_c);
    let mut score: f64 = 0.0;

    if bucket == ClimateBucket::Cold && coffee.supports(TemperatureMode::Hot) {
        score += 0.45;
    }
    if bucket == ClimateBucket::Hot && coffee.supports(TemperatureMode::Iced) {
        score += 0.45;
    }
    if weather.is_raining && coffee.has_tag("chocolate") {
        score += 0.10;
    }

    if let Some(pref) = prefs.temp_pref {
        if coffee.supports(pref) {
            score += 0.20;
        }
    }
    if !prefs.flavor_notes.is_empty() {
        let hits = prefs
            .flavor_notes
            .iter()
            .filter(|note| coffee.has_tag(&note.to_lowercase()))
            .count();
        score += (0.05 * hits as f64).min(0.20);
    }

    // A single dairy field, so at most one penalty can ever apply
    match prefs.dairy {
        Some(DairyPolicy::LactoseFree) if coffee.has_tag("milk") => score -= 0.20,
        Some(DairyPolicy::None) if coffee.has_tag("milk") => score -= 0.35,
        _ => {}
    }

    score.clamp(0.0, 1.0)
}

/// Scores the whole catalog and keeps the best `k` candidates
///
/// The sort is stable, so candidates with equal scores keep their catalog
/// order. This ordering is the deterministic baseline the reranker falls back
/// to.
pub fn select_top_k(
    catalog: &[CoffeeItem],
    weather: &WeatherReading,
    prefs: &PreferenceProfile,
    k: usize,
) -> Vec<ScoredCandidate> {
    let mut scored: Vec<ScoredCandidate> = catalog
        .iter()
        .map(|coffee| ScoredCandidate {
            coffee: coffee.clone(),
            score: base_score(coffee, weather, prefs),
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    scored.truncate(k);
    scored
}
