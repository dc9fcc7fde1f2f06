//! Crisis assessment: keyword gate plus sentiment threshold policy.
//!
//! Assessment runs in two stages. The keyword gate scans the lower-cased
//! utterance for a fixed harm vocabulary and short-circuits on any match,
//! so the clearest cases never wait on (or depend on) the sentiment
//! model. Only when no keyword matches is the sentiment capability
//! consulted, with deliberately extreme thresholds to keep false
//! positives rare.
//!
//! Degradation policy: if the sentiment capability is unavailable, the
//! assessor degrades to keyword-only and reports no crisis for unmatched
//! text. Failing open on the secondary signal is the chosen tradeoff:
//! a storm of false crisis alerts would do more harm than relying on the
//! keyword gate alone. The degraded path is logged, never silent.
//!
//! The assessor performs no I/O side effects; emitting the crisis event
//! belongs to the dialogue controller.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::capability::SentimentClassifier;
use crate::models::{CrisisVerdict, SentimentScores};

/// Harm vocabulary checked by substring containment against the
/// lower-cased utterance.
pub const HARM_KEYWORDS: &[&str] = &[
    "suicide",
    "kill myself",
    "hurt myself",
    "self-harm",
    "cut myself",
    "die",
    "overdose",
    "end it all",
    "no longer want to live",
    "give up on life",
    "want to suicide",
];

// Extreme-only sentiment triggers.
const SADNESS_HARD: f32 = 0.98;
const SADNESS_SOFT: f32 = 0.95;
const FEAR_SOFT: f32 = 0.8;
const FEAR_HARD: f32 = 0.98;

/// Deterministic crisis decision function over one utterance.
pub struct CrisisAssessor {
    classifier: Arc<dyn SentimentClassifier>,
}

impl CrisisAssessor {
    pub fn new(classifier: Arc<dyn SentimentClassifier>) -> Self {
        Self { classifier }
    }

    /// Assess one utterance. Never errors: empty input yields a
    /// no-crisis verdict without scoring, and a classifier outage
    /// degrades to the keyword-only result.
    pub async fn assess(&self, text: &str) -> CrisisVerdict {
        if text.trim().is_empty() {
            return CrisisVerdict::default();
        }

        let lowered = text.to_lowercase();
        if let Some(kw) = HARM_KEYWORDS.iter().find(|kw| lowered.contains(**kw)) {
            debug!("Crisis keyword matched");
            return CrisisVerdict {
                is_crisis: true,
                matched_keyword: Some(kw),
                sentiment: None,
            };
        }

        let labels = match self.classifier.classify(text).await {
            Ok(labels) => labels,
            Err(e) => {
                warn!("Sentiment capability unavailable, keyword-only assessment: {e:#}");
                return CrisisVerdict::default();
            }
        };

        let scores = SentimentScores {
            sadness: labels.get("sadness").copied().unwrap_or(0.0),
            fear: labels.get("fear").copied().unwrap_or(0.0),
        };

        let is_crisis = scores.sadness > SADNESS_HARD
            || (scores.sadness > SADNESS_SOFT && scores.fear > FEAR_SOFT)
            || scores.fear > FEAR_HARD;

        CrisisVerdict {
            is_crisis,
            matched_keyword: None,
            sentiment: Some(scores),
        }
    }
}
