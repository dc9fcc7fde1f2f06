//! Semantic context retrieval with optional reranking.
//!
//! The retriever embeds the user's query, pulls the `k_retrieve` nearest
//! prior questions from the [`EmbeddingIndex`], optionally rescores them
//! with the cross-encoder capability, and keeps the top `k_rerank`.
//!
//! Degradation policy: a capability outage lowers answer quality but
//! never fails the turn. An embedding failure yields an empty candidate
//! set ("no grounding available"); a rerank failure falls back to the
//! similarity ordering. Both paths are logged.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::capability::{Reranker, TextEmbedder};
use crate::config::RetrievalConfig;
use crate::corpus::Corpus;
use crate::index::EmbeddingIndex;
use crate::models::RetrievedCandidate;

/// Queries the embedding index and reranks candidates for one turn.
pub struct ContextRetriever {
    corpus: Arc<Corpus>,
    index: Arc<EmbeddingIndex>,
    embedder: Arc<dyn TextEmbedder>,
    reranker: Option<Arc<dyn Reranker>>,
    params: RetrievalConfig,
}

impl ContextRetriever {
    /// `reranker` is `None` when reranking is disabled by configuration;
    /// the first `k_rerank` similarity-ordered candidates are then
    /// returned directly.
    pub fn new(
        corpus: Arc<Corpus>,
        index: Arc<EmbeddingIndex>,
        embedder: Arc<dyn TextEmbedder>,
        reranker: Option<Arc<dyn Reranker>>,
        params: RetrievalConfig,
    ) -> Self {
        Self {
            corpus,
            index,
            embedder,
            reranker,
            params,
        }
    }

    /// Retrieve up to `k_rerank` grounding candidates for `query`,
    /// best first. An empty result means no grounding is available,
    /// not an error.
    pub async fn retrieve(&self, query: &str) -> Vec<RetrievedCandidate> {
        if query.trim().is_empty() || self.corpus.is_empty() {
            return Vec::new();
        }

        let query_vec = match self.embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                warn!("Query embedding failed, proceeding ungrounded: {e:#}");
                return Vec::new();
            }
        };

        let hits = self.index.search(&query_vec, self.params.k_retrieve);

        // Out-of-bounds indices should not occur; drop them if they do.
        let mut candidates: Vec<RetrievedCandidate> = hits
            .into_iter()
            .filter_map(|(idx, score)| {
                self.corpus.get(idx).map(|record| RetrievedCandidate {
                    index: idx,
                    record: record.clone(),
                    score,
                })
            })
            .collect();

        if candidates.is_empty() {
            return Vec::new();
        }

        if let Some(reranker) = &self.reranker {
            self.rerank(query, &mut candidates, reranker.as_ref()).await;
        }

        candidates.truncate(self.params.k_rerank);
        debug!(
            "Retrieved {} candidates for query ({} chars)",
            candidates.len(),
            query.len()
        );
        candidates
    }

    /// Rescore candidates with the cross-encoder and sort descending.
    /// The sort is stable: ties keep the similarity-search order.
    async fn rerank(
        &self,
        query: &str,
        candidates: &mut [RetrievedCandidate],
        reranker: &dyn Reranker,
    ) {
        let texts: Vec<String> = candidates.iter().map(|c| c.record.query.clone()).collect();

        let scores = match reranker.score(query, &texts).await {
            Ok(s) if s.len() == candidates.len() => s,
            Ok(s) => {
                warn!(
                    "Reranker returned {} scores for {} candidates, keeping similarity order",
                    s.len(),
                    candidates.len()
                );
                return;
            }
            Err(e) => {
                warn!("Rerank failed, keeping similarity order: {e:#}");
                return;
            }
        };

        for (cand, score) in candidates.iter_mut().zip(scores) {
            cand.score = score;
        }

        candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    }
}

/// Flatten retrieved candidates into the context block fed to the
/// generator. Empty input renders as an empty block.
pub fn render_context_block(candidates: &[RetrievedCandidate]) -> String {
    candidates
        .iter()
        .map(|c| {
            format!(
                "- USER said: {}\n  BOT replied: {}",
                c.record.query, c.record.answer
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
