//! Model capability interfaces.
//!
//! The dialogue engine consumes its models through a fixed set of narrow
//! traits: text → vector ([`TextEmbedder`]), (query, candidate) → score
//! ([`Reranker`]), text → label scores ([`SentimentClassifier`]),
//! prompt → text ([`TextGenerator`]), and the fire-and-forget crisis
//! event sink ([`CrisisNotifier`]). Concrete HTTP-backed implementations
//! live in [`crate::providers`]; tests supply scripted in-memory doubles.
//!
//! The engine depends only on these traits, never on a dynamically
//! resolved symbol, so a capability can be swapped without touching any
//! decision logic.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// Fixed decoding policy for the generation capability.
///
/// These values are engine policy, not user configuration. The input is
/// truncated to `max_input_tokens`, sampling is always enabled, and
/// generation stops at the model's end-of-sequence marker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodingParams {
    /// Token budget for the assembled prompt.
    pub max_input_tokens: usize,
    /// Cap on newly generated tokens.
    pub max_new_tokens: usize,
    pub temperature: f32,
    /// Nucleus sampling threshold.
    pub top_p: f32,
    pub repetition_penalty: f32,
}

impl Default for DecodingParams {
    fn default() -> Self {
        Self {
            max_input_tokens: 1024,
            max_new_tokens: 150,
            temperature: 0.7,
            top_p: 0.9,
            repetition_penalty: 1.15,
        }
    }
}

/// Embeds text into fixed-dimension, L2-normalized vectors.
///
/// Deterministic for a given model; the dimensionality is constant for
/// the process lifetime.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    /// Returns the embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Scores the relevance of a candidate text to a query.
///
/// A second, more precise pass applied to a small candidate set after
/// index search. Deterministic given frozen model weights.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Score each (query, candidate) pair, one score per candidate.
    async fn score(&self, query: &str, candidates: &[String]) -> Result<Vec<f32>>;
}

/// Classifies an utterance into emotion label scores.
#[async_trait]
pub trait SentimentClassifier: Send + Sync {
    /// Returns a map of emotion label → score in `[0.0, 1.0]`. The set
    /// of labels is model-defined; callers extract what they need.
    async fn classify(&self, text: &str) -> Result<HashMap<String, f32>>;
}

/// Generates a text completion for a prompt.
///
/// Stochastic under sampling; repeated calls with the same prompt may
/// return different text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, params: &DecodingParams) -> Result<String>;
}

/// Receives crisis events for external notification delivery.
///
/// Delivery is fire-and-forget from the engine's perspective: the
/// user-visible reply never blocks on this call succeeding.
#[async_trait]
pub trait CrisisNotifier: Send + Sync {
    async fn notify(&self, session_id: &str, user_text: &str) -> Result<()>;
}
