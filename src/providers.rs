//! HTTP-backed capability adapters.
//!
//! Implements the [`crate::capability`] traits against an inference
//! server exposing embedding, rerank, classification, and completion
//! endpoints, plus a webhook adapter for crisis events. Transient
//! failures (HTTP 429, 5xx, network errors) are retried with
//! exponential backoff; other client errors fail immediately. Retry
//! lives here, in the capability's own client; the engine above only
//! ever sees success or a single failure to absorb.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::capability::{
    CrisisNotifier, DecodingParams, Reranker, SentimentClassifier, TextEmbedder, TextGenerator,
};
use crate::config::{CapabilitiesConfig, NotifyConfig};
use crate::index::l2_normalize;

/// POST a JSON body with retry/backoff, returning the parsed response.
///
/// Retry strategy:
/// - HTTP 429 or 5xx → retry with exponential backoff (1s, 2s, 4s, ...)
/// - other HTTP 4xx → fail immediately
/// - network error → retry
async fn post_with_retry(
    client: &reqwest::Client,
    url: &str,
    body: &serde_json::Value,
    max_retries: u32,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let resp = client.post(url).json(body).send().await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response
                        .json()
                        .await
                        .with_context(|| format!("Invalid JSON from {url}"));
                }

                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    warn!("Retryable error from {url}: {status} {body_text}");
                    last_err = Some(anyhow::anyhow!("API error {status}: {body_text}"));
                    continue;
                }

                let body_text = response.text().await.unwrap_or_default();
                bail!("API error {status} from {url}: {body_text}");
            }
            Err(e) => {
                warn!("Network error calling {url}: {e}");
                last_err = Some(e.into());
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Request to {url} failed after retries")))
}

fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("Failed to build HTTP client")
}

// ============ Embedder ============

/// [`TextEmbedder`] over a `POST /v1/embeddings` endpoint
/// (OpenAI-compatible request/response shape).
pub struct HttpEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl HttpEmbedder {
    pub fn new(config: &CapabilitiesConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            url: format!("{}/v1/embeddings", config.base_url.trim_end_matches('/')),
            model: config.embedding_model.clone(),
            dims: config.embedding_dims,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl TextEmbedder for HttpEmbedder {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let json = post_with_retry(&self.client, &self.url, &body, self.max_retries).await?;
        let mut vectors = parse_embeddings_response(&json)?;

        if vectors.len() != texts.len() {
            bail!(
                "Embedding count mismatch: {} vectors for {} texts",
                vectors.len(),
                texts.len()
            );
        }

        // The engine's similarity math assumes unit-length vectors;
        // normalize here rather than trusting the server to.
        for v in vectors.iter_mut() {
            l2_normalize(v);
        }

        debug!("Embedded {} texts", vectors.len());
        Ok(vectors)
    }
}

fn parse_embeddings_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid embeddings response: missing data array"))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid embeddings response: missing embedding"))?;
        embeddings.push(
            embedding
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect(),
        );
    }
    Ok(embeddings)
}

// ============ Reranker ============

/// [`Reranker`] over a `POST /v1/rerank` endpoint (Cohere-compatible
/// shape: scores come back index-tagged and possibly reordered).
pub struct HttpReranker {
    client: reqwest::Client,
    url: String,
    model: String,
    max_retries: u32,
}

impl HttpReranker {
    pub fn new(config: &CapabilitiesConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            url: format!("{}/v1/rerank", config.base_url.trim_end_matches('/')),
            model: config.rerank_model.clone(),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn score(&self, query: &str, candidates: &[String]) -> Result<Vec<f32>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({
            "model": self.model,
            "query": query,
            "documents": candidates,
        });

        let json = post_with_retry(&self.client, &self.url, &body, self.max_retries).await?;
        parse_rerank_response(&json, candidates.len())
    }
}

fn parse_rerank_response(json: &serde_json::Value, expected: usize) -> Result<Vec<f32>> {
    let results = json
        .get("results")
        .and_then(|r| r.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid rerank response: missing results array"))?;

    let mut scores = vec![0.0f32; expected];
    let mut seen = 0usize;

    for item in results {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .ok_or_else(|| anyhow::anyhow!("Invalid rerank response: missing index"))?
            as usize;
        let score = item
            .get("relevance_score")
            .and_then(|s| s.as_f64())
            .ok_or_else(|| anyhow::anyhow!("Invalid rerank response: missing relevance_score"))?;

        if index >= expected {
            bail!("Rerank response index {index} out of range ({expected} documents)");
        }
        scores[index] = score as f32;
        seen += 1;
    }

    if seen != expected {
        bail!("Rerank response covered {seen} of {expected} documents");
    }
    Ok(scores)
}

// ============ Sentiment classifier ============

/// [`SentimentClassifier`] over a `POST /v1/classify` endpoint returning
/// all label scores for the input.
pub struct HttpSentimentClassifier {
    client: reqwest::Client,
    url: String,
    model: String,
    max_retries: u32,
}

impl HttpSentimentClassifier {
    pub fn new(config: &CapabilitiesConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            url: format!("{}/v1/classify", config.base_url.trim_end_matches('/')),
            model: config.sentiment_model.clone(),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl SentimentClassifier for HttpSentimentClassifier {
    async fn classify(&self, text: &str) -> Result<HashMap<String, f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let json = post_with_retry(&self.client, &self.url, &body, self.max_retries).await?;
        parse_classify_response(&json)
    }
}

fn parse_classify_response(json: &serde_json::Value) -> Result<HashMap<String, f32>> {
    let labels = json
        .get("labels")
        .and_then(|l| l.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid classify response: missing labels array"))?;

    let mut scores = HashMap::with_capacity(labels.len());
    for item in labels {
        let label = item
            .get("label")
            .and_then(|l| l.as_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid classify response: missing label"))?;
        let score = item
            .get("score")
            .and_then(|s| s.as_f64())
            .ok_or_else(|| anyhow::anyhow!("Invalid classify response: missing score"))?;
        scores.insert(label.to_lowercase(), score as f32);
    }
    Ok(scores)
}

// ============ Generator ============

/// [`TextGenerator`] over a `POST /v1/completions` endpoint. The input
/// token budget is passed as `truncate`; tokenization and end-of-sequence
/// handling are the server's concern.
pub struct HttpGenerator {
    client: reqwest::Client,
    url: String,
    model: String,
    max_retries: u32,
}

impl HttpGenerator {
    pub fn new(config: &CapabilitiesConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            url: format!("{}/v1/completions", config.base_url.trim_end_matches('/')),
            model: config.generation_model.clone(),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl TextGenerator for HttpGenerator {
    async fn generate(&self, prompt: &str, params: &DecodingParams) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "max_tokens": params.max_new_tokens,
            "truncate": params.max_input_tokens,
            "temperature": params.temperature,
            "top_p": params.top_p,
            "repetition_penalty": params.repetition_penalty,
        });

        let json = post_with_retry(&self.client, &self.url, &body, self.max_retries).await?;
        parse_completion_response(&json)
    }
}

fn parse_completion_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("text"))
        .and_then(|t| t.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid completion response: missing choices[0].text"))
}

// ============ Crisis notifier ============

/// [`CrisisNotifier`] that POSTs the crisis event to a webhook. Single
/// attempt, no retry: the event is fire-and-forget and a stale alert is
/// worse than a dropped one.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    /// Returns `None` when no webhook is configured.
    pub fn from_config(config: &NotifyConfig, timeout_secs: u64) -> Result<Option<Self>> {
        let Some(url) = &config.webhook_url else {
            return Ok(None);
        };
        Ok(Some(Self {
            client: build_client(timeout_secs)?,
            url: url.clone(),
        }))
    }
}

#[async_trait]
impl CrisisNotifier for WebhookNotifier {
    async fn notify(&self, session_id: &str, user_text: &str) -> Result<()> {
        let body = serde_json::json!({
            "event": "crisis_detected",
            "session_id": session_id,
            "text": user_text,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .context("Crisis webhook unreachable")?;

        if !response.status().is_success() {
            bail!("Crisis webhook returned {}", response.status());
        }
        Ok(())
    }
}
