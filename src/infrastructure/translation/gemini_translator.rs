//! Rate-limited Gemini translation client.
//!
//! One JSON-mode API call per batch: the input is a JSON array of source
//! strings, the response schema pins the output to an array of strings of
//! the same length.

use super::rate_limiter::RateLimiter;
use super::traits::Translator;
use crate::domain::text_box::contains_chinese;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

const SYSTEM_INSTRUCTION: &str = "You are a helpful translation assistant for e-commerce. \
     Translate the texts from product detail images into Korean. \
     The translation should be natural, polite, and concise, suitable for marketing content.";

pub struct GeminiTranslator {
    client: reqwest::Client,
    api_url: String,
    rate_limiter: Arc<RateLimiter>,
}

impl GeminiTranslator {
    pub fn new(
        api_key: &str,
        model_name: &str,
        rate_limiter: Arc<RateLimiter>,
    ) -> anyhow::Result<Self> {
        if api_key.is_empty() {
            anyhow::bail!("GEMINI_API_KEY is empty");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            api_url: format!(
                "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
                model_name, api_key
            ),
            rate_limiter,
        })
    }

    /// Build one JSON-mode request body for a batch of texts.
    pub fn request_body(texts: &[String]) -> Value {
        json!({
            "system_instruction": {
                "parts": [{ "text": SYSTEM_INSTRUCTION }]
            },
            "contents": [{
                "role": "user",
                "parts": [{ "text": serde_json::to_string(texts).unwrap_or_default() }]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "ARRAY",
                    "items": { "type": "STRING" }
                }
            }
        })
    }

    async fn call_once(&self, texts: &[String], request_id: &str) -> anyhow::Result<Vec<String>> {
        self.rate_limiter.acquire(request_id).await;

        let response = self
            .client
            .post(&self.api_url)
            .json(&Self::request_body(texts))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("translation endpoint returned HTTP {}: {}", status, body);
        }

        let parsed: Value = serde_json::from_str(&body)
            .map_err(|e| anyhow::anyhow!("failed to parse translation response JSON: {}", e))?;

        let inner = parsed
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                if let Some(reason) = parsed.pointer("/promptFeedback/blockReason") {
                    anyhow::anyhow!("translation request blocked: {}", reason)
                } else {
                    anyhow::anyhow!("unexpected translation response structure")
                }
            })?;

        let translated: Vec<String> = serde_json::from_str(inner)
            .map_err(|e| anyhow::anyhow!("failed to parse inner translation array: {}", e))?;

        if translated.len() != texts.len() {
            anyhow::bail!(
                "translation length mismatch: sent {}, received {}",
                texts.len(),
                translated.len()
            );
        }
        Ok(translated)
    }
}

/// Blank out translations the endpoint echoed back untranslated. An empty
/// string means "inpaint the box, draw nothing" downstream; leftover
/// Chinese would be a visual regression.
pub fn strip_untranslated(translations: Vec<String>, request_id: &str) -> Vec<String> {
    translations
        .into_iter()
        .map(|text| {
            if contains_chinese(&text) {
                tracing::debug!(request_id, "Dropping untranslated output: {:?}", text);
                String::new()
            } else {
                text
            }
        })
        .collect()
}

#[async_trait]
impl Translator for GeminiTranslator {
    async fn translate_many(&self, texts: &[String], request_id: &str) -> Vec<String> {
        if texts.is_empty() {
            return Vec::new();
        }

        const MAX_RETRIES: u32 = 1;
        for attempt in 0..=MAX_RETRIES {
            match self.call_once(texts, request_id).await {
                Ok(translated) => {
                    tracing::info!(
                        request_id,
                        "Translated {} texts on attempt {}",
                        texts.len(),
                        attempt + 1
                    );
                    return strip_untranslated(translated, request_id);
                }
                Err(e) if attempt < MAX_RETRIES => {
                    tracing::warn!(request_id, "Translation attempt {} failed: {}", attempt + 1, e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Err(e) => {
                    tracing::error!(request_id, "All translation attempts failed: {}", e);
                }
            }
        }
        Vec::new()
    }
}
