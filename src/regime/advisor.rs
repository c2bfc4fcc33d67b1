/// Advisory collaborator: a second opinion on the regime plus seed parameters
///
/// The language-model client is never trusted as-is. Its regime label is
/// parsed leniently, its parameters are merged over the current ones and
/// repaired, and every failure degrades to the deterministic offline advisor.
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::backtest::BacktestResult;
use crate::config::AdvisorConfig;
use crate::error::EngineError;
use crate::models::Candle;
use crate::regime::{detect_regime, MarketRegime};
use crate::strategy::StrategyParams;
use crate::Result;

const PROMPT_CANDLES: usize = 30;
const OFFLINE_CONFIDENCE: f64 = 0.5;
const MAX_TOKENS: u32 = 1024;
const SYSTEM_PROMPT: &str = "You are a quantitative crypto trader. \
    Always respond with valid JSON only, no markdown formatting.";

type AdvisorRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Opaque analysis payload stored next to optimized parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Advisory {
    pub symbol: String,
    pub regime: MarketRegime,
    /// 0.0 - 1.0
    pub confidence: f64,
    pub reasoning: String,
    pub suggested_params: StrategyParams,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backtest_result: Option<BacktestResult>,
}

#[async_trait]
pub trait Advisor: Send + Sync {
    /// Always yields an advisory; implementations degrade instead of failing
    async fn advise(&self, symbol: &str, candles: &[Candle], current: &StrategyParams) -> Advisory;

    fn name(&self) -> &str;
}

/// Deterministic advisor built on the local regime detector
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineAdvisor;

impl OfflineAdvisor {
    pub fn analyze(&self, symbol: &str, candles: &[Candle], current: &StrategyParams) -> Advisory {
        self.analyze_with_note(symbol, candles, current, "Offline")
    }

    fn analyze_with_note(
        &self,
        symbol: &str,
        candles: &[Candle],
        current: &StrategyParams,
        note: &str,
    ) -> Advisory {
        let assessment = detect_regime(candles);
        Advisory {
            symbol: symbol.to_string(),
            regime: assessment.regime,
            confidence: OFFLINE_CONFIDENCE,
            reasoning: format!("({}) {}", note, assessment.reason),
            suggested_params: current.repaired(),
            timestamp: crate::now_ms(),
            backtest_result: None,
        }
    }
}

#[async_trait]
impl Advisor for OfflineAdvisor {
    async fn advise(&self, symbol: &str, candles: &[Candle], current: &StrategyParams) -> Advisory {
        self.analyze(symbol, candles, current)
    }

    fn name(&self) -> &str {
        "offline"
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Debug, Deserialize)]
struct ChatContent {
    content: String,
}

/// Shape the model is asked to answer with
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdvisoryResponse {
    regime: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    suggested_params: Option<Value>,
}

/// OpenAI-compatible chat-completions advisor
///
/// Calls closer together than `min_call_interval_secs` and calls during a
/// post-429 cooldown are answered by the offline advisor without touching
/// the network.
pub struct LlmAdvisor {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
    model: String,
    max_retries: u32,
    retry_backoff: Duration,
    cooldown: Duration,
    cooldown_until: Mutex<Option<Instant>>,
    rate_limiter: Option<Arc<AdvisorRateLimiter>>,
    fallback: OfflineAdvisor,
}

impl LlmAdvisor {
    pub fn new(config: &AdvisorConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        // Burst of one: a second call inside the interval is rejected
        let rate_limiter = Quota::with_period(Duration::from_secs(config.min_call_interval_secs))
            .map(|quota| Arc::new(RateLimiter::direct(quota.allow_burst(NonZeroU32::MIN))));

        Ok(Self {
            client,
            api_key: config.resolved_api_key(),
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            max_retries: config.max_retries.max(1),
            retry_backoff: Duration::from_millis(500),
            cooldown: Duration::from_secs(config.cooldown_secs),
            cooldown_until: Mutex::new(None),
            rate_limiter,
            fallback: OfflineAdvisor,
        })
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    async fn in_cooldown(&self) -> bool {
        let until = self.cooldown_until.lock().await;
        matches!(*until, Some(deadline) if Instant::now() < deadline)
    }

    async fn start_cooldown(&self) {
        let mut until = self.cooldown_until.lock().await;
        *until = Some(Instant::now() + self.cooldown);
        tracing::warn!("Advisor rate limited, cooling down for {}s", self.cooldown.as_secs());
    }

    fn create_prompt(
        &self,
        symbol: &str,
        candles: &[Candle],
        current: &StrategyParams,
    ) -> Result<String> {
        let start = candles.len().saturating_sub(PROMPT_CANDLES);
        let summary: Vec<Value> = candles[start..]
            .iter()
            .map(|c| {
                serde_json::json!({
                    "c": format!("{:.2}", c.close),
                    "v": format!("{:.0}", c.volume)
                })
            })
            .collect();

        Ok(format!(
            "Asset: {symbol}\n\
             Recent 1m candles (close/volume): {candles}\n\
             Current parameters: {params}\n\n\
             1. Classify the market regime as one of \
             TRENDING_UP, TRENDING_DOWN, RANGING, VOLATILE.\n\
             2. Suggest strategy parameters for the next hour using the same field names.\n\
             3. Explain in at most two sentences.\n\n\
             Respond with JSON only: {{\"regime\": string, \"confidence\": number between 0 and 1, \
             \"reasoning\": string, \"suggestedParams\": object}}",
            symbol = symbol,
            candles = serde_json::to_string(&summary)?,
            params = serde_json::to_string(current)?,
        ))
    }

    /// One advisory round trip with retries on transport and server errors
    async fn request_advisory(
        &self,
        api_key: &str,
        symbol: &str,
        candles: &[Candle],
        current: &StrategyParams,
    ) -> Result<Advisory> {
        let request = ChatRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            temperature: 0.0,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: self.create_prompt(symbol, candles, current)?,
                },
            ],
        };

        let mut last_error = String::new();
        for attempt in 1..=self.max_retries {
            if attempt > 1 {
                let delay = self.retry_backoff * 2u32.pow(attempt - 2);
                tokio::time::sleep(delay).await;
            }

            let response = match self
                .client
                .post(&self.endpoint)
                .bearer_auth(api_key)
                .json(&request)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    last_error = format!("network error: {}", e);
                    tracing::warn!(
                        "Advisor request failed (attempt {}/{}): {}",
                        attempt,
                        self.max_retries,
                        e
                    );
                    continue;
                }
            };

            let status = response.status();
            if status.as_u16() == 429 {
                self.start_cooldown().await;
                return Err(EngineError::Advisor("rate limited (429)".to_string()));
            }
            if status.is_server_error() {
                last_error = format!("server error {}", status);
                tracing::warn!(
                    "Advisor server error {} (attempt {}/{})",
                    status,
                    attempt,
                    self.max_retries
                );
                continue;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(EngineError::Advisor(format!("API error {}: {}", status, body)));
            }

            let chat: ChatResponse = response.json().await?;
            let content = chat
                .choices
                .first()
                .map(|choice| choice.message.content.as_str())
                .ok_or_else(|| EngineError::Advisor("empty response".to_string()))?;

            return parse_advisory(symbol, content, current);
        }

        Err(EngineError::Advisor(format!(
            "giving up after {} attempts: {}",
            self.max_retries, last_error
        )))
    }
}

#[async_trait]
impl Advisor for LlmAdvisor {
    async fn advise(&self, symbol: &str, candles: &[Candle], current: &StrategyParams) -> Advisory {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::debug!("No advisor API key, using offline analysis for {}", symbol);
            return self.fallback.analyze(symbol, candles, current);
        };

        if self.in_cooldown().await {
            return self.fallback.analyze_with_note(symbol, candles, current, "Offline: cooldown");
        }

        if let Some(limiter) = &self.rate_limiter {
            if limiter.check().is_err() {
                tracing::debug!("Advisor call interval not elapsed for {}", symbol);
                return self
                    .fallback
                    .analyze_with_note(symbol, candles, current, "Offline: throttled");
            }
        }

        match self.request_advisory(api_key, symbol, candles, current).await {
            Ok(advisory) => {
                tracing::info!(
                    "Advisor for {}: {} (confidence {:.2})",
                    symbol,
                    advisory.regime,
                    advisory.confidence
                );
                advisory
            }
            Err(e) => {
                tracing::warn!(
                    "Advisor failed for {}, falling back to offline analysis: {}",
                    symbol,
                    e
                );
                self.fallback
                    .analyze_with_note(symbol, candles, current, "Offline: advisor unavailable")
            }
        }
    }

    fn name(&self) -> &str {
        "llm"
    }
}

/// Strip ```json ... ``` fences some models wrap around their answer
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    trimmed
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

fn parse_advisory(symbol: &str, content: &str, current: &StrategyParams) -> Result<Advisory> {
    let response: AdvisoryResponse = serde_json::from_str(strip_code_fences(content))?;

    let confidence = if response.confidence.is_finite() {
        response.confidence.clamp(0.0, 1.0)
    } else {
        0.0
    };

    Ok(Advisory {
        symbol: symbol.to_string(),
        regime: MarketRegime::from_label(&response.regime),
        confidence,
        reasoning: response.reasoning,
        suggested_params: merge_params(current, response.suggested_params.as_ref()),
        timestamp: crate::now_ms(),
        backtest_result: None,
    })
}

/// Overlay numeric suggestions onto `current`, ignoring unknown or
/// non-numeric fields, then repair the result
pub fn merge_params(current: &StrategyParams, suggested: Option<&Value>) -> StrategyParams {
    let Some(Value::Object(overrides)) = suggested else {
        return current.repaired();
    };
    let Ok(Value::Object(mut merged)) = serde_json::to_value(current) else {
        return current.repaired();
    };

    for (key, value) in overrides {
        let Some(existing) = merged.get(key) else {
            continue;
        };
        let Some(number) = value.as_f64().filter(|n| n.is_finite()) else {
            continue;
        };
        let replacement = if existing.is_u64() {
            Value::from(number.round().max(0.0) as u64)
        } else {
            Value::from(number)
        };
        merged.insert(key.clone(), replacement);
    }

    match serde_json::from_value::<StrategyParams>(Value::Object(merged)) {
        Ok(params) => params.repaired(),
        Err(e) => {
            tracing::warn!("Discarding suggested parameters: {}", e);
            current.repaired()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::params::MAX_PERIOD;

    fn create_test_candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let phase = 2.0 * std::f64::consts::PI * i as f64 / 30.0;
                let close = 100.0 + 0.04 * i as f64 + 0.8 * phase.sin();
                Candle::new(i as i64 * 60_000, close, close + 0.05, close - 0.05, close, 1000.0)
            })
            .collect()
    }

    fn test_config(endpoint: String, min_call_interval_secs: u64) -> AdvisorConfig {
        AdvisorConfig {
            api_key: Some("test-key".to_string()),
            endpoint,
            min_call_interval_secs,
            max_retries: 2,
            ..AdvisorConfig::default()
        }
    }

    fn chat_body(content: &str) -> String {
        serde_json::json!({ "choices": [{ "message": { "content": content } }] }).to_string()
    }

    const ADVISORY_JSON: &str = "```json\n{\"regime\": \"TRENDING_UP\", \"confidence\": 1.4, \
        \"reasoning\": \"Higher highs.\", \"suggestedParams\": {\"rsiPeriod\": 10.0, \
        \"emaShort\": 30, \"emaLong\": 20, \"stopLoss\": 0.025, \"leverage\": 5}}\n```";

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("  {}  "), "{}");
    }

    #[test]
    fn test_merge_params_repairs_and_ignores_unknown() {
        let suggested = serde_json::json!({
            "rsiPeriod": 10.4,
            "emaShort": 30,
            "emaLong": 20,
            "rsiOverbought": "high",
            "leverage": 5
        });

        let merged = merge_params(&StrategyParams::default(), Some(&suggested));

        assert_eq!(merged.rsi_period, 10);
        assert_eq!(merged.ema_short, 30);
        assert_eq!(merged.ema_long, 35);
        assert_eq!(merged.rsi_overbought, 70.0);
        assert!(merged.is_well_formed());
    }

    #[test]
    fn test_merge_without_suggestions_keeps_current() {
        let current = StrategyParams::default();
        assert_eq!(merge_params(&current, None), current);
        assert_eq!(merge_params(&current, Some(&Value::Null)), current);
    }

    #[test]
    fn test_merge_caps_huge_periods() {
        let suggested = serde_json::json!({
            "emaShort": 1e30,
            "adxPeriod": 1e30,
            "rsiPeriod": 1e30
        });

        let merged = merge_params(&StrategyParams::default(), Some(&suggested));

        assert!(merged.is_well_formed());
        assert_eq!(merged.ema_short, MAX_PERIOD - 5);
        assert_eq!(merged.ema_long, MAX_PERIOD);
        assert_eq!(merged.adx_period, MAX_PERIOD);
        assert_eq!(merged.warmup(), MAX_PERIOD + 20);
    }

    #[test]
    fn test_parse_unknown_regime_label() {
        let advisory = parse_advisory(
            "BTC",
            r#"{"regime": "MOONING", "confidence": 0.9, "reasoning": "?"}"#,
            &StrategyParams::default(),
        )
        .unwrap();
        assert_eq!(advisory.regime, MarketRegime::Unknown);
        assert_eq!(advisory.suggested_params, StrategyParams::default());
    }

    #[tokio::test]
    async fn test_offline_advisor_is_deterministic() {
        let candles = create_test_candles(300);
        let params = StrategyParams::default();

        let advisory = OfflineAdvisor.advise("BTC", &candles, &params).await;

        assert_eq!(advisory.regime, MarketRegime::TrendingUp);
        assert_eq!(advisory.confidence, 0.5);
        assert_eq!(advisory.suggested_params, params);
        assert!(advisory.reasoning.starts_with("(Offline)"));
    }

    #[tokio::test]
    async fn test_llm_advisor_parses_response() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(chat_body(ADVISORY_JSON))
            .expect(1)
            .create_async()
            .await;

        let endpoint = format!("{}/v1/chat/completions", server.url());
        let advisor = LlmAdvisor::new(&test_config(endpoint, 0)).unwrap();
        let advisory = advisor
            .advise("ETH", &create_test_candles(60), &StrategyParams::default())
            .await;

        mock.assert_async().await;
        assert_eq!(advisory.symbol, "ETH");
        assert_eq!(advisory.regime, MarketRegime::TrendingUp);
        assert_eq!(advisory.confidence, 1.0);
        assert_eq!(advisory.reasoning, "Higher highs.");
        assert_eq!(advisory.suggested_params.rsi_period, 10);
        assert_eq!(advisory.suggested_params.ema_long, 35);
        assert_eq!(advisory.suggested_params.stop_loss, 0.025);
        assert_eq!(advisory.suggested_params.take_profit, 0.04);
    }

    #[tokio::test]
    async fn test_rate_limit_starts_cooldown() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(429)
            .expect(1)
            .create_async()
            .await;

        let endpoint = format!("{}/v1/chat/completions", server.url());
        let advisor = LlmAdvisor::new(&test_config(endpoint, 0)).unwrap();
        let candles = create_test_candles(60);

        let first = advisor.advise("SOL", &candles, &StrategyParams::default()).await;
        assert!(first.reasoning.starts_with("(Offline"));

        // Cooldown: answered locally, no second request
        let second = advisor.advise("SOL", &candles, &StrategyParams::default()).await;
        assert!(second.reasoning.starts_with("(Offline: cooldown)"));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_min_call_interval_throttles() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(chat_body(ADVISORY_JSON))
            .expect(1)
            .create_async()
            .await;

        let endpoint = format!("{}/v1/chat/completions", server.url());
        let advisor = LlmAdvisor::new(&test_config(endpoint, 30)).unwrap();
        let candles = create_test_candles(60);

        let first = advisor.advise("BTC", &candles, &StrategyParams::default()).await;
        assert_eq!(first.reasoning, "Higher highs.");

        let second = advisor.advise("BTC", &candles, &StrategyParams::default()).await;
        assert!(second.reasoning.starts_with("(Offline: throttled)"));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_errors_exhaust_retries() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;

        let endpoint = format!("{}/v1/chat/completions", server.url());
        let advisor = LlmAdvisor::new(&test_config(endpoint, 0))
            .unwrap()
            .with_retry_backoff(Duration::from_millis(1));

        let advisory = advisor
            .advise("BTC", &create_test_candles(60), &StrategyParams::default())
            .await;

        assert!(advisory.reasoning.starts_with("(Offline: advisor unavailable)"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_api_key_uses_offline() {
        let config = AdvisorConfig {
            api_key: None,
            endpoint: "http://127.0.0.1:9/unused".to_string(),
            ..AdvisorConfig::default()
        };
        let advisor = LlmAdvisor::new(&config).unwrap();
        // OPENAI_API_KEY may be set in the environment; only check the contract
        let advisory = advisor
            .advise("BTC", &create_test_candles(30), &StrategyParams::default())
            .await;
        assert_eq!(advisory.regime, MarketRegime::Unknown);
    }
}
