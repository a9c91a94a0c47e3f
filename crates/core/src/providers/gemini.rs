use crate::embeddings::Embedder;
use crate::traits::LanguageModel;
use crate::ExamError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com/";
pub const DEFAULT_GENERATION_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";
pub const DEFAULT_TEMPERATURE: f32 = 0.1;
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

// batchEmbedContents rejects larger batches
const MAX_EMBED_BATCH: usize = 100;

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub base_url: Url,
    pub api_key: String,
    pub model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Result<Self, ExamError> {
        Ok(Self {
            base_url: parse_base_url(DEFAULT_GEMINI_URL)?,
            api_key: api_key.into(),
            model: DEFAULT_GENERATION_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        })
    }
}

pub fn parse_base_url(raw: &str) -> Result<Url, ExamError> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&with_slash)
        .map_err(|err| ExamError::Configuration(format!("invalid Gemini base url '{raw}': {err}")))
}

/// Talks to the Gemini REST API for both text generation and embeddings.
pub struct GeminiClient {
    config: GeminiConfig,
    client: Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, ExamError> {
        if config.api_key.trim().is_empty() {
            return Err(ExamError::Configuration("Gemini API key is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| ExamError::Configuration(format!("http client: {err}")))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn model_url(&self, model: &str, method: &str) -> Result<Url, ExamError> {
        self.config
            .base_url
            .join(&format!("v1beta/models/{model}:{method}"))
            .map_err(|err| ExamError::Configuration(format!("invalid model url: {err}")))
    }

    async fn post_json(&self, url: Url, body: &Value) -> Result<Value, String> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|err| format!("request failed: {err}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("gemini returned {status}: {body}"));
        }

        response
            .json::<Value>()
            .await
            .map_err(|err| format!("invalid JSON body: {err}"))
    }

    async fn embed_request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ExamError> {
        let model_path = format!("models/{}", self.config.embedding_model);
        let requests = texts
            .iter()
            .map(|text| {
                json!({
                    "model": model_path,
                    "content": { "parts": [{ "text": text }] },
                })
            })
            .collect::<Vec<_>>();

        let url = self.model_url(&self.config.embedding_model, "batchEmbedContents")?;
        let parsed = self
            .post_json(url, &json!({ "requests": requests }))
            .await
            .map_err(ExamError::Embedding)?;

        let vectors = embeddings_from_response(&parsed)?;
        if vectors.len() != texts.len() {
            return Err(ExamError::Embedding(format!(
                "requested {} embeddings, received {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn generate(&self, prompt: &str) -> Result<Value, ExamError> {
        let url = self.model_url(&self.config.model, "generateContent")?;
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": self.config.temperature,
                "responseMimeType": "application/json",
            },
        });

        let parsed = self.post_json(url, &body).await.map_err(ExamError::Generation)?;
        let text = candidate_text(&parsed)?;
        debug!(model = %self.config.model, chars = text.len(), "gemini responded");

        Ok(parse_model_output(&text))
    }
}

#[async_trait]
impl Embedder for GeminiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ExamError> {
        let mut vectors = self.embed_request(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| ExamError::Embedding("gemini returned no embedding".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ExamError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in embedding_batches(texts) {
            embeddings.extend(self.embed_request(batch).await?);
        }
        Ok(embeddings)
    }
}

fn embedding_batches(texts: &[String]) -> std::slice::Chunks<'_, String> {
    texts.chunks(MAX_EMBED_BATCH)
}

fn candidate_text(response: &Value) -> Result<String, ExamError> {
    if let Some(reason) = response
        .pointer("/promptFeedback/blockReason")
        .and_then(Value::as_str)
    {
        return Err(ExamError::Generation(format!("prompt blocked: {reason}")));
    }

    let parts = response
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .ok_or_else(|| ExamError::Generation("gemini response has no candidates".to_string()))?;

    Ok(parts
        .iter()
        .filter_map(|part| part.pointer("/text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join(""))
}

fn embeddings_from_response(response: &Value) -> Result<Vec<Vec<f32>>, ExamError> {
    let listed = response
        .pointer("/embeddings")
        .and_then(Value::as_array)
        .ok_or_else(|| ExamError::Embedding("response has no 'embeddings' list".to_string()))?;

    listed
        .iter()
        .enumerate()
        .map(|(position, entry)| {
            entry
                .pointer("/values")
                .and_then(Value::as_array)
                .map(|values| {
                    values
                        .iter()
                        .filter_map(Value::as_f64)
                        .map(|value| value as f32)
                        .collect::<Vec<_>>()
                })
                .ok_or_else(|| {
                    ExamError::Embedding(format!("embedding {position} has no 'values'"))
                })
        })
        .collect()
}

static RE_CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*\n?(.*?)\n?```").unwrap());

/// Best-effort JSON parse of model text.
///
/// Tries the text as-is, then the body of a markdown code fence, then the
/// outermost `[...]` or `{...}` span. Text that never parses comes back as
/// `Value::String` for the normalizer to reject.
pub fn parse_model_output(text: &str) -> Value {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return value;
    }

    if let Some(body) = RE_CODE_FENCE
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .map(|body| body.as_str().trim())
    {
        if let Ok(value) = serde_json::from_str::<Value>(body) {
            return value;
        }
    }

    for (open, close) in [('[', ']'), ('{', '}')] {
        if let (Some(start), Some(end)) = (trimmed.find(open), trimmed.rfind(close)) {
            if start < end {
                if let Ok(value) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                    return value;
                }
            }
        }
    }

    warn!(chars = trimmed.len(), "model output is not JSON, passing raw text on");
    Value::String(trimmed.to_string())
}
