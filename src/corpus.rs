//! Load-time corpus construction.
//!
//! The corpus is an immutable set of prior (question, answer, emotion)
//! exchanges read once at startup from a JSON array. Query text is
//! lower-cased and whitespace-trimmed so lookups and embeddings see the
//! same normalization the index was built with. Records missing a usable
//! question or answer are skipped with a warning rather than failing the
//! load.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{info, warn};

use crate::models::CorpusRecord;

/// The immutable retrieval corpus, built once per process.
#[derive(Debug, Default)]
pub struct Corpus {
    records: Vec<CorpusRecord>,
}

impl Corpus {
    /// Build a corpus from pre-normalized records. Mainly for tests;
    /// production loads go through [`load_corpus`].
    pub fn from_records(records: Vec<CorpusRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record at `index`, if within bounds.
    pub fn get(&self, index: usize) -> Option<&CorpusRecord> {
        self.records.get(index)
    }

    /// All stored prior questions, in index order.
    pub fn queries(&self) -> Vec<String> {
        self.records.iter().map(|r| r.query.clone()).collect()
    }
}

/// Load and normalize the corpus from a JSON file.
///
/// The file is a JSON array of objects with `user_input`, `bot_response`,
/// and optional `emotion_tag` fields. Normalization applied per record:
/// query lower-cased and trimmed, answer trimmed, emotion tag lower-cased
/// and trimmed (defaulting to `"neutral"`).
///
/// # Errors
///
/// Fails if the file cannot be read or is not a JSON array of records.
/// Individual unusable records (empty query or answer after trimming)
/// are skipped, not fatal.
pub fn load_corpus(path: &Path) -> Result<Corpus> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read corpus file: {}", path.display()))?;

    let raw: Vec<CorpusRecord> =
        serde_json::from_str(&content).with_context(|| "Failed to parse corpus JSON")?;

    let total = raw.len();
    let mut records = Vec::with_capacity(total);

    for (i, rec) in raw.into_iter().enumerate() {
        let query = rec.query.trim().to_lowercase();
        let answer = rec.answer.trim().to_string();
        if query.is_empty() || answer.is_empty() {
            warn!("Skipping corpus record {}: empty question or answer", i);
            continue;
        }
        records.push(CorpusRecord {
            query,
            answer,
            emotion_tag: rec.emotion_tag.trim().to_lowercase(),
        });
    }

    info!(
        "Loaded corpus: {} records ({} skipped) from {}",
        records.len(),
        total - records.len(),
        path.display()
    );

    Ok(Corpus { records })
}
