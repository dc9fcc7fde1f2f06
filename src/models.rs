//! Core data models used throughout Serene.
//!
//! These types represent the corpus records, retrieval candidates, and
//! per-turn verdicts that flow through the dialogue pipeline.

use serde::Deserialize;

/// A stored (prior question, prior answer, emotion tag) triple used as
/// retrieval ground truth.
///
/// Records are immutable once loaded; the query text is lower-cased and
/// trimmed at load time. A record's identity is its position in the
/// corpus, which doubles as its slot in the embedding index.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CorpusRecord {
    /// Prior user question, normalized at load time.
    #[serde(rename = "user_input")]
    pub query: String,
    /// The answer that was given for that question.
    #[serde(rename = "bot_response")]
    pub answer: String,
    /// Coarse emotion label attached to the exchange.
    #[serde(rename = "emotion_tag", default = "default_emotion_tag")]
    pub emotion_tag: String,
}

pub(crate) fn default_emotion_tag() -> String {
    "neutral".to_string()
}

/// A corpus record paired with its retrieval score.
///
/// `score` is cosine similarity after index search, and the reranker's
/// relevance score after the rerank pass.
#[derive(Debug, Clone)]
pub struct RetrievedCandidate {
    /// Position of the record in the corpus.
    pub index: usize,
    /// The matched record.
    pub record: CorpusRecord,
    /// Similarity or rerank relevance, higher is better.
    pub score: f32,
}

/// Sadness/fear scores extracted from the sentiment capability.
///
/// Both values are in `[0.0, 1.0]`. Labels other than sadness and fear
/// returned by the classifier are ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SentimentScores {
    pub sadness: f32,
    pub fear: f32,
}

/// The safety determination for one utterance.
///
/// Computed fresh per turn, never persisted. Exactly one of
/// `matched_keyword` / `sentiment` is populated when `is_crisis` is true
/// (keyword matches short-circuit before scoring); both may be absent
/// for a non-crisis verdict reached without scoring.
#[derive(Debug, Clone, Default)]
pub struct CrisisVerdict {
    /// Whether the utterance signals self-harm risk.
    pub is_crisis: bool,
    /// The harm keyword that triggered the verdict, if any.
    pub matched_keyword: Option<&'static str>,
    /// Sentiment scores, when the sentiment gate was consulted.
    pub sentiment: Option<SentimentScores>,
}

/// One (user, assistant) exchange held in conversation memory.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub user_text: String,
    pub bot_text: String,
}

/// The four labeled segments assembled into a generation prompt.
///
/// Built per request and discarded after use.
#[derive(Debug, Clone)]
pub struct PromptBundle {
    /// Fixed persona and behavioral instructions.
    pub system_instructions: String,
    /// Retrieved context block (may be empty when no grounding exists).
    pub context_block: String,
    /// Rendered conversation history (may be empty on a first turn).
    pub history_block: String,
    /// The current user utterance.
    pub user_turn: String,
}

impl PromptBundle {
    /// Render the bundle into the wire prompt handed to the generator.
    pub fn render(&self) -> String {
        format!(
            "<system>{}</system>\n<context>{}</context>\n<history>{}</history>\nUser: {}\nAssistant:",
            self.system_instructions, self.context_block, self.history_block, self.user_turn
        )
    }
}
