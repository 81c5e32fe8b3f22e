use std::sync::Arc;

use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::json;

use crate::{
    error::{AppError, AppResult},
    models::{PreferenceProfile, RecoItem, RecoOutput, ScoredCandidate, WeatherReading},
};

/// The reranker returns at most this many items
const MAX_ITEMS: usize = 3;
const MAX_EXPLANATION_CHARS: usize = 240;

const RULE_BASED_EXPLANATION: &str =
    "Ranked with simple rules: current weather and your saved preferences.";
const DEGRADED_EXPLANATION: &str =
    "The assistant was unavailable just now, so the baseline weather-and-preference ordering was used.";

const SYSTEM_PROMPT: &str = "You are a barista. Respond ONLY with a valid JSON object matching \
     the provided schema. Do not include comments or any text outside the JSON.";

/// Shown to the model verbatim; validation below enforces the same bounds.
const OUTPUT_SCHEMA: &str = r#"{"items":[{"coffeeId":"string","score":"number in [0,1]"}] (1 to 3 items),"explanation":"string, at most 240 characters"}"#;

/// Minimal chat-completion client seam
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    /// Sends one completion request and returns the raw response text
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> AppResult<String>;
}

/// OpenAI-compatible chat-completions client
pub struct OpenAiChatModel {
    http_client: HttpClient,
    api_url: String,
    api_key: String,
    model: String,
}

impl OpenAiChatModel {
    pub fn new(api_url: String, api_key: String, model: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_url,
            api_key,
            model,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait::async_trait]
impl LanguageModel for OpenAiChatModel {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> AppResult<String> {
        let url = format!("{}/v1/chat/completions", self.api_url);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": [
                    { "role": "system", "content": system_prompt },
                    { "role": "user", "content": user_prompt },
                ],
                "response_format": { "type": "json_object" },
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Internal(format!(
                "model API returned status {}: {}",
                status, body
            )));
        }

        let completion: ChatCompletionResponse = response.json().await?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AppError::Internal("model returned an empty completion".to_string()))
    }
}

/// Why a deterministic fallback was served instead of a model ranking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    NoCredential,
    ModelError,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackReason::NoCredential => "no_credential",
            FallbackReason::ModelError => "model_error",
        }
    }
}

/// Outcome of one rerank attempt
///
/// Both arms carry a complete result: a failed model call degrades to the
/// deterministic ordering instead of surfacing an error, and the reason stays
/// available for logging until the outcome collapses at the service boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum RerankOutcome {
    Validated(RecoOutput),
    Fallback(RecoOutput, FallbackReason),
}

impl RerankOutcome {
    pub fn fallback_reason(&self) -> Option<FallbackReason> {
        match self {
            RerankOutcome::Validated(_) => None,
            RerankOutcome::Fallback(_, reason) => Some(*reason),
        }
    }

    pub fn into_output(self) -> RecoOutput {
        match self {
            RerankOutcome::Validated(output) | RerankOutcome::Fallback(output, _) => output,
        }
    }
}

/// Reorders the deterministic top-k through a language model, with strict
/// output validation and a deterministic fallback
///
/// Single attempt only: any transport error, parse failure or schema
/// violation falls back immediately, it is never retried or propagated.
pub struct Reranker {
    model: Option<Arc<dyn LanguageModel>>,
}

impl Reranker {
    /// `model` is `None` when no credential is configured; every rerank then
    /// returns the rule-based fallback without calling out.
    pub fn new(model: Option<Arc<dyn LanguageModel>>) -> Self {
        Self { model }
    }

    pub async fn rerank(
        &self,
        top_k: &[ScoredCandidate],
        weather: &WeatherReading,
        prefs: &PreferenceProfile,
    ) -> RerankOutcome {
        let Some(model) = &self.model else {
            return RerankOutcome::Fallback(
                fallback_output(top_k, RULE_BASED_EXPLANATION),
                FallbackReason::NoCredential,
            );
        };

        match call_model(model.as_ref(), top_k, weather, prefs).await {
            Ok(output) => RerankOutcome::Validated(output),
            Err(err) => {
                tracing::warn!(error = %err, "Rerank failed, serving deterministic fallback");
                RerankOutcome::Fallback(
                    fallback_output(top_k, DEGRADED_EXPLANATION),
                    FallbackReason::ModelError,
                )
            }
        }
    }
}

async fn call_model(
    model: &dyn LanguageModel,
    top_k: &[ScoredCandidate],
    weather: &WeatherReading,
    prefs: &PreferenceProfile,
) -> AppResult<RecoOutput> {
    let payload = build_payload(top_k, weather, prefs);
    let user_prompt = format!(
        "SCHEMA: {}\n\nINPUT:\n{}",
        OUTPUT_SCHEMA,
        serde_json::to_string(&payload)
            .map_err(|e| AppError::Internal(format!("payload serialization failed: {}", e)))?
    );

    let raw = model.complete(SYSTEM_PROMPT, &user_prompt).await?;

    let parsed: RecoOutput = serde_json::from_str(&raw)
        .map_err(|e| AppError::Internal(format!("model returned invalid JSON: {}", e)))?;

    validate_output(&parsed).map_err(AppError::Internal)?;

    Ok(parsed)
}

fn build_payload(
    top_k: &[ScoredCandidate],
    weather: &WeatherReading,
    prefs: &PreferenceProfile,
) -> serde_json::Value {
    json!({
        "weather": {
            "tempC": weather.temp_c,
            "feelsLikeC": weather.feels_like_c,
            "humidity": weather.humidity,
            "isRaining": weather.is_raining,
            "tz": weather.tz,
        },
        "preferences": prefs,
        "candidates": top_k
            .iter()
            .map(|candidate| {
                json!({
                    "id": candidate.coffee.id,
                    "name": candidate.coffee.name,
                    "tags": candidate.coffee.tags,
                    "tempAllowed": candidate.coffee.temp_allowed,
                    "base": candidate.score,
                })
            })
            .collect::<Vec<_>>(),
        "task": "Reorder and return at most 3 items in the requested format, \
                 with a short explanation (<= 240 characters).",
    })
}

/// First <= 3 candidates with their baseline scores unchanged
fn fallback_output(top_k: &[ScoredCandidate], explanation: &str) -> RecoOutput {
    RecoOutput {
        items: top_k
            .iter()
            .take(MAX_ITEMS)
            .map(|candidate| RecoItem {
                coffee_id: candidate.coffee.id.clone(),
                score: candidate.score,
            })
            .collect(),
        explanation: explanation.to_string(),
    }
}

/// The item-count bound is enforced atomically: one bad item rejects the
/// whole response.
fn validate_output(output: &RecoOutput) -> Result<(), String> {
    if output.items.is_empty() || output.items.len() > MAX_ITEMS {
        return Err(format!(
            "expected 1 to {} items, got {}",
            MAX_ITEMS,
            output.items.len()
        ));
    }
    for item in &output.items {
        if !item.score.is_finite() || !(0.0..=1.0).contains(&item.score) {
            return Err(format!(
                "score out of range for {}: {}",
                item.coffee_id, item.score
            ));
        }
    }
    if output.explanation.chars().count() > MAX_EXPLANATION_CHARS {
        return Err(format!(
            "explanation longer than {} characters",
            MAX_EXPLANATION_CHARS
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CoffeeItem, TemperatureMode};

    fn candidate(id: &str, score: f64) -> ScoredCandidate {
        ScoredCandidate {
            coffee: CoffeeItem {
                id: id.to_string(),
                name: id.to_string(),
                temp_allowed: vec![TemperatureMode::Iced],
                tags: vec![],
                image_url: None,
                provider: "sampleapis".to_string(),
                external_id: id.to_string(),
            },
            score,
        }
    }

    fn top_k() -> Vec<ScoredCandidate> {
        vec![
            candidate("iced-1", 0.65),
            candidate("iced-2", 0.65),
            candidate("iced-3", 0.45),
            candidate("iced-4", 0.20),
        ]
    }

    fn weather() -> WeatherReading {
        WeatherReading {
            temp_c: 30.0,
            feels_like_c: Some(32.0),
            humidity: Some(60.0),
            precipitation_mm: None,
            is_raining: false,
            is_day: Some(true),
            code: Some(0),
            tz: "America/Sao_Paulo".to_string(),
            source: "open-meteo".to_string(),
        }
    }

    fn model_returning(raw: &str) -> MockLanguageModel {
        let raw = raw.to_string();
        let mut model = MockLanguageModel::new();
        model
            .expect_complete()
            .times(1)
            .returning(move |_, _| Ok(raw.clone()));
        model
    }

    #[tokio::test]
    async fn test_no_credential_skips_model_and_falls_back() {
        let reranker = Reranker::new(None);
        let outcome = reranker
            .rerank(&top_k(), &weather(), &PreferenceProfile::default())
            .await;

        assert_eq!(outcome.fallback_reason(), Some(FallbackReason::NoCredential));
        let output = outcome.into_output();
        assert_eq!(output.items.len(), 3);
        assert_eq!(output.items[0].coffee_id, "iced-1");
        assert_eq!(output.items[0].score, 0.65);
        assert_eq!(output.items[1].coffee_id, "iced-2");
        assert_eq!(output.items[2].coffee_id, "iced-3");
        assert_eq!(output.explanation, RULE_BASED_EXPLANATION);
    }

    #[tokio::test]
    async fn test_valid_model_output_is_returned_unchanged() {
        let model = model_returning(
            r#"{"items":[{"coffeeId":"iced-2","score":0.9},{"coffeeId":"iced-1","score":0.8}],"explanation":"Hot afternoon, something cold."}"#,
        );
        let reranker = Reranker::new(Some(Arc::new(model)));

        let outcome = reranker
            .rerank(&top_k(), &weather(), &PreferenceProfile::default())
            .await;

        assert_eq!(outcome.fallback_reason(), None);
        let output = outcome.into_output();
        // model scores, not baseline scores
        assert_eq!(output.items[0].coffee_id, "iced-2");
        assert_eq!(output.items[0].score, 0.9);
        assert_eq!(output.items[1].coffee_id, "iced-1");
        assert_eq!(output.items[1].score, 0.8);
        assert_eq!(output.explanation, "Hot afternoon, something cold.");
    }

    #[tokio::test]
    async fn test_empty_item_list_falls_back() {
        let model = model_returning(r#"{"items":[],"explanation_pt":"x"}"#);
        let reranker = Reranker::new(Some(Arc::new(model)));

        let outcome = reranker
            .rerank(&top_k(), &weather(), &PreferenceProfile::default())
            .await;

        assert_eq!(outcome.fallback_reason(), Some(FallbackReason::ModelError));
        let output = outcome.into_output();
        assert_eq!(output.items.len(), 3);
        assert_eq!(output.items[0].coffee_id, "iced-1");
        assert_eq!(output.items[0].score, 0.65);
        assert_eq!(output.explanation, DEGRADED_EXPLANATION);
    }

    #[tokio::test]
    async fn test_invalid_json_falls_back() {
        let model = model_returning("sure! here are my picks:");
        let reranker = Reranker::new(Some(Arc::new(model)));

        let outcome = reranker
            .rerank(&top_k(), &weather(), &PreferenceProfile::default())
            .await;

        assert_eq!(outcome.fallback_reason(), Some(FallbackReason::ModelError));
    }

    #[tokio::test]
    async fn test_too_many_items_falls_back() {
        let model = model_returning(
            r#"{"items":[
                {"coffeeId":"iced-1","score":0.9},
                {"coffeeId":"iced-2","score":0.8},
                {"coffeeId":"iced-3","score":0.7},
                {"coffeeId":"iced-4","score":0.6}
            ],"explanation":"too many"}"#,
        );
        let reranker = Reranker::new(Some(Arc::new(model)));

        let outcome = reranker
            .rerank(&top_k(), &weather(), &PreferenceProfile::default())
            .await;

        assert_eq!(outcome.fallback_reason(), Some(FallbackReason::ModelError));
    }

    #[tokio::test]
    async fn test_score_out_of_range_falls_back() {
        let model =
            model_returning(r#"{"items":[{"coffeeId":"iced-1","score":1.2}],"explanation":"x"}"#);
        let reranker = Reranker::new(Some(Arc::new(model)));

        let outcome = reranker
            .rerank(&top_k(), &weather(), &PreferenceProfile::default())
            .await;

        assert_eq!(outcome.fallback_reason(), Some(FallbackReason::ModelError));
    }

    #[tokio::test]
    async fn test_oversized_explanation_falls_back() {
        let long = "x".repeat(241);
        let raw = format!(
            r#"{{"items":[{{"coffeeId":"iced-1","score":0.9}}],"explanation":"{}"}}"#,
            long
        );
        let model = model_returning(&raw);
        let reranker = Reranker::new(Some(Arc::new(model)));

        let outcome = reranker
            .rerank(&top_k(), &weather(), &PreferenceProfile::default())
            .await;

        assert_eq!(outcome.fallback_reason(), Some(FallbackReason::ModelError));
    }

    #[tokio::test]
    async fn test_transport_error_falls_back() {
        let mut model = MockLanguageModel::new();
        model
            .expect_complete()
            .times(1)
            .returning(|_, _| Err(AppError::Internal("model API returned status 500".into())));
        let reranker = Reranker::new(Some(Arc::new(model)));

        let outcome = reranker
            .rerank(&top_k(), &weather(), &PreferenceProfile::default())
            .await;

        assert_eq!(outcome.fallback_reason(), Some(FallbackReason::ModelError));
        assert_eq!(outcome.into_output().explanation, DEGRADED_EXPLANATION);
    }

    #[tokio::test]
    async fn test_fallback_with_fewer_than_three_candidates() {
        let reranker = Reranker::new(None);
        let short = vec![candidate("iced-1", 0.65)];
        let outcome = reranker
            .rerank(&short, &weather(), &PreferenceProfile::default())
            .await;

        let output = outcome.into_output();
        assert_eq!(output.items.len(), 1);
        assert_eq!(output.items[0].coffee_id, "iced-1");
    }

    #[test]
    fn test_two_fallback_explanations_are_distinct() {
        assert_ne!(RULE_BASED_EXPLANATION, DEGRADED_EXPLANATION);
    }
}
