//! Integration tests for the dialogue engine.
//!
//! These tests drive `handle_turn` end-to-end through the real gate
//! sequence (crisis, greeting, retrieval, generation, templating,
//! memory) with scripted in-memory capability doubles, proving the
//! degradation and short-circuit policies hold at the engine boundary.

use anyhow::Result;
use async_trait::async_trait;
use serene::capability::{
    CrisisNotifier, DecodingParams, Reranker, SentimentClassifier, TextEmbedder, TextGenerator,
};
use serene::config::RetrievalConfig;
use serene::corpus::Corpus;
use serene::crisis::CrisisAssessor;
use serene::engine::{DialogueEngine, CRISIS_MESSAGE, EMPTY_INPUT_REPLY, GREETING_REPLY};
use serene::generate::GenerationOrchestrator;
use serene::index::EmbeddingIndex;
use serene::models::CorpusRecord;
use serene::retrieve::ContextRetriever;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ─── Capability Doubles ─────────────────────────────────────────────

/// Embedder that maps known texts to fixed unit vectors and counts
/// calls. Unknown texts get a default off-axis vector.
struct MappedEmbedder {
    dims: usize,
    vectors: HashMap<String, Vec<f32>>,
    calls: AtomicUsize,
}

impl MappedEmbedder {
    fn new(dims: usize, entries: Vec<(&str, Vec<f32>)>) -> Self {
        Self {
            dims,
            vectors: entries
                .into_iter()
                .map(|(text, v)| (text.to_string(), v))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn lookup(&self, text: &str) -> Vec<f32> {
        self.vectors.get(text).cloned().unwrap_or_else(|| {
            let mut v = vec![0.1; self.dims];
            v[0] = 0.5;
            v
        })
    }
}

#[async_trait]
impl TextEmbedder for MappedEmbedder {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.lookup(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.lookup(t)).collect())
    }
}

/// Reranker that scores by candidate position in a preference list.
struct PreferenceReranker {
    preferred: Vec<String>,
}

#[async_trait]
impl Reranker for PreferenceReranker {
    async fn score(&self, _query: &str, candidates: &[String]) -> Result<Vec<f32>> {
        Ok(candidates
            .iter()
            .map(|c| {
                self.preferred
                    .iter()
                    .position(|p| p == c)
                    .map(|pos| 10.0 - pos as f32)
                    .unwrap_or(0.0)
            })
            .collect())
    }
}

/// Classifier returning fixed sadness/fear scores, with a call counter.
struct FixedClassifier {
    sadness: f32,
    fear: f32,
    calls: AtomicUsize,
}

impl FixedClassifier {
    fn new(sadness: f32, fear: f32) -> Self {
        Self {
            sadness,
            fear,
            calls: AtomicUsize::new(0),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SentimentClassifier for FixedClassifier {
    async fn classify(&self, _text: &str) -> Result<HashMap<String, f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(HashMap::from([
            ("sadness".to_string(), self.sadness),
            ("fear".to_string(), self.fear),
        ]))
    }
}

/// Generator that returns a fixed reply (or fails), capturing the last
/// prompt it was given.
struct ScriptedGenerator {
    reply: Option<String>,
    calls: AtomicUsize,
    last_prompt: std::sync::Mutex<String>,
}

impl ScriptedGenerator {
    fn ok(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            calls: AtomicUsize::new(0),
            last_prompt: std::sync::Mutex::new(String::new()),
        }
    }

    fn failing() -> Self {
        Self {
            reply: None,
            calls: AtomicUsize::new(0),
            last_prompt: std::sync::Mutex::new(String::new()),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_prompt(&self) -> String {
        self.last_prompt.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str, _params: &DecodingParams) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = prompt.to_string();
        match &self.reply {
            Some(text) => Ok(text.clone()),
            None => anyhow::bail!("generation backend unavailable"),
        }
    }
}

/// Notifier that counts deliveries.
struct CountingNotifier {
    deliveries: AtomicUsize,
}

impl CountingNotifier {
    fn new() -> Self {
        Self {
            deliveries: AtomicUsize::new(0),
        }
    }

    fn delivery_count(&self) -> usize {
        self.deliveries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CrisisNotifier for CountingNotifier {
    async fn notify(&self, _session_id: &str, _user_text: &str) -> Result<()> {
        self.deliveries.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ─── Test Fixture ───────────────────────────────────────────────────

fn test_corpus() -> Corpus {
    Corpus::from_records(vec![
        CorpusRecord {
            query: "i am stressed about my exams".to_string(),
            answer: "Break revision into short blocks with real breaks.".to_string(),
            emotion_tag: "anxious".to_string(),
        },
        CorpusRecord {
            query: "i cant sleep at night".to_string(),
            answer: "A consistent wind-down routine helps a lot.".to_string(),
            emotion_tag: "tired".to_string(),
        },
        CorpusRecord {
            query: "my roommate and i keep fighting".to_string(),
            answer: "Try naming the specific behavior, not the person.".to_string(),
            emotion_tag: "frustrated".to_string(),
        },
    ])
}

struct EngineParts {
    embedder: Arc<MappedEmbedder>,
    classifier: Arc<FixedClassifier>,
    generator: Arc<ScriptedGenerator>,
    notifier: Arc<CountingNotifier>,
}

/// Wire an engine over the three-record corpus with orthonormal
/// embeddings. Query text "i cant sleep at night" lands exactly on
/// record 1's axis.
fn build_engine(
    generator: ScriptedGenerator,
    classifier: FixedClassifier,
    use_reranker: bool,
) -> (DialogueEngine, EngineParts) {
    let embedder = Arc::new(MappedEmbedder::new(
        3,
        vec![
            ("i am stressed about my exams", vec![1.0, 0.0, 0.0]),
            ("i cant sleep at night", vec![0.0, 1.0, 0.0]),
            ("my roommate and i keep fighting", vec![0.0, 0.0, 1.0]),
        ],
    ));

    let corpus = Arc::new(test_corpus());
    let index = Arc::new(EmbeddingIndex::from_vectors(
        vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
        ],
        3,
    ));

    let reranker: Option<Arc<dyn Reranker>> = if use_reranker {
        Some(Arc::new(PreferenceReranker {
            preferred: vec!["my roommate and i keep fighting".to_string()],
        }))
    } else {
        None
    };

    let retriever = ContextRetriever::new(
        corpus,
        index,
        embedder.clone(),
        reranker,
        RetrievalConfig {
            k_retrieve: 3,
            k_rerank: 2,
            use_reranker,
        },
    );

    let classifier = Arc::new(classifier);
    let assessor = CrisisAssessor::new(classifier.clone());

    let generator = Arc::new(generator);
    let orchestrator = GenerationOrchestrator::new(generator.clone());

    let notifier = Arc::new(CountingNotifier::new());

    let engine = DialogueEngine::new(
        assessor,
        retriever,
        orchestrator,
        Some(notifier.clone() as Arc<dyn CrisisNotifier>),
    );

    (
        engine,
        EngineParts {
            embedder,
            classifier,
            generator,
            notifier,
        },
    )
}

/// Wait for the fire-and-forget notification task to run.
async fn wait_for_delivery(notifier: &CountingNotifier) -> usize {
    for _ in 0..100 {
        let count = notifier.delivery_count();
        if count > 0 {
            return count;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    notifier.delivery_count()
}

// ─── Gate Sequence ──────────────────────────────────────────────────

#[tokio::test]
async fn test_crisis_keyword_returns_safety_message_and_notifies() {
    let (engine, parts) = build_engine(
        ScriptedGenerator::ok("should never be used"),
        FixedClassifier::new(0.1, 0.1),
        true,
    );

    let outcome = engine.handle_turn("s1", "I want to kill myself").await;

    assert!(outcome.is_crisis);
    assert_eq!(outcome.reply, CRISIS_MESSAGE);
    // Keyword match short-circuits the sentiment gate.
    assert_eq!(parts.classifier.call_count(), 0);
    assert_eq!(parts.generator.call_count(), 0);
    assert_eq!(wait_for_delivery(&parts.notifier).await, 1);
}

#[tokio::test]
async fn test_extreme_sentiment_triggers_crisis() {
    let (engine, parts) = build_engine(
        ScriptedGenerator::ok("should never be used"),
        FixedClassifier::new(0.99, 0.2),
        true,
    );

    let outcome = engine.handle_turn("s1", "everything feels pointless lately").await;

    assert!(outcome.is_crisis);
    assert_eq!(outcome.reply, CRISIS_MESSAGE);
    assert_eq!(parts.classifier.call_count(), 1);
    assert_eq!(wait_for_delivery(&parts.notifier).await, 1);
}

#[tokio::test]
async fn test_greeting_short_circuits_retrieval_and_generation() {
    let (engine, parts) = build_engine(
        ScriptedGenerator::ok("should never be used"),
        FixedClassifier::new(0.1, 0.1),
        true,
    );

    let outcome = engine.handle_turn("s1", "hello").await;

    assert!(!outcome.is_crisis);
    assert_eq!(outcome.reply, GREETING_REPLY);
    assert_eq!(parts.embedder.call_count(), 0);
    assert_eq!(parts.generator.call_count(), 0);
    assert_eq!(parts.notifier.delivery_count(), 0);
}

#[tokio::test]
async fn test_empty_input_prompts_without_side_effects() {
    let (engine, parts) = build_engine(
        ScriptedGenerator::ok("should never be used"),
        FixedClassifier::new(0.99, 0.99),
        true,
    );

    let outcome = engine.handle_turn("s1", "   ").await;

    assert!(!outcome.is_crisis);
    assert_eq!(outcome.reply, EMPTY_INPUT_REPLY);
    assert_eq!(parts.classifier.call_count(), 0);
    assert_eq!(parts.embedder.call_count(), 0);
}

// ─── Retrieval Grounding ────────────────────────────────────────────

#[tokio::test]
async fn test_retrieve_ranks_matching_record_first_without_reranker() {
    let (engine, _parts) = build_engine(
        ScriptedGenerator::ok("unused"),
        FixedClassifier::new(0.1, 0.1),
        false,
    );

    let candidates = engine.retrieve("i cant sleep at night").await;

    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].record.query, "i cant sleep at night");
    assert!(candidates[0].score > candidates[1].score);
}

#[tokio::test]
async fn test_reranker_reorders_similarity_candidates() {
    let (engine, _parts) = build_engine(
        ScriptedGenerator::ok("unused"),
        FixedClassifier::new(0.1, 0.1),
        true,
    );

    // By similarity the sleep record wins; the preference reranker
    // promotes the roommate record instead.
    let candidates = engine.retrieve("i cant sleep at night").await;

    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].record.query, "my roommate and i keep fighting");
}

#[tokio::test]
async fn test_retrieved_context_reaches_the_prompt() {
    let (engine, parts) = build_engine(
        ScriptedGenerator::ok("That sounds exhausting, and it makes sense you want rest."),
        FixedClassifier::new(0.1, 0.1),
        false,
    );

    let outcome = engine.handle_turn("s1", "i cant sleep at night").await;

    assert!(!outcome.is_crisis);
    let prompt = parts.generator.last_prompt();
    assert!(prompt.contains("<context>"));
    assert!(prompt.contains("- USER said: i cant sleep at night"));
    assert!(prompt.contains("BOT replied: A consistent wind-down routine helps a lot."));
    assert!(prompt.contains("User: i cant sleep at night"));
}

// ─── Degradation And Templating ─────────────────────────────────────

#[tokio::test]
async fn test_generator_outage_still_yields_wrapped_reply() {
    let (engine, parts) = build_engine(
        ScriptedGenerator::failing(),
        FixedClassifier::new(0.1, 0.1),
        false,
    );

    let outcome = engine.handle_turn("s1", "i bombed my exam today").await;

    assert!(!outcome.is_crisis);
    assert_eq!(parts.generator.call_count(), 1);
    // The turn survives the outage: the fallback is still wrapped in
    // the empathetic template scaffolding.
    assert!(outcome.reply.contains("It sounds like you're feeling"));
    assert!(outcome.reply.contains("I'm here to listen and support you"));
}

#[tokio::test]
async fn test_normal_reply_carries_generated_core() {
    let (engine, _parts) = build_engine(
        ScriptedGenerator::ok("Missing one deadline doesn't define your semester."),
        FixedClassifier::new(0.1, 0.1),
        false,
    );

    let outcome = engine.handle_turn("s1", "i missed an assignment deadline").await;

    assert!(!outcome.is_crisis);
    assert!(outcome
        .reply
        .contains("Missing one deadline doesn't define your semester."));
    assert!(outcome.reply.contains("It sounds like you're feeling"));
}

// ─── Session Memory ─────────────────────────────────────────────────

#[tokio::test]
async fn test_history_persists_across_turns_in_one_session() {
    let (engine, parts) = build_engine(
        ScriptedGenerator::ok("One step at a time is still progress."),
        FixedClassifier::new(0.1, 0.1),
        false,
    );

    engine.handle_turn("s1", "i am behind on coursework").await;
    engine.handle_turn("s1", "and i feel guilty about it").await;

    let prompt = parts.generator.last_prompt();
    // The first turn's exchange appears in the second turn's history.
    assert!(prompt.contains("User: i am behind on coursework"));
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let (engine, parts) = build_engine(
        ScriptedGenerator::ok("That is worth taking seriously."),
        FixedClassifier::new(0.1, 0.1),
        false,
    );

    engine.handle_turn("s1", "i am behind on coursework").await;
    engine.handle_turn("s2", "my roommate is loud").await;

    let prompt = parts.generator.last_prompt();
    // Session s2's prompt must not carry s1's history.
    assert!(!prompt.contains("i am behind on coursework"));
    assert!(prompt.contains("User: my roommate is loud"));
}

#[tokio::test]
async fn test_end_session_clears_history() {
    let (engine, parts) = build_engine(
        ScriptedGenerator::ok("Starting fresh is allowed."),
        FixedClassifier::new(0.1, 0.1),
        false,
    );

    engine.handle_turn("s1", "i am behind on coursework").await;
    engine.end_session("s1");
    engine.handle_turn("s1", "new topic entirely").await;

    let prompt = parts.generator.last_prompt();
    assert!(!prompt.contains("i am behind on coursework"));
}

#[tokio::test]
async fn test_crisis_turn_lands_in_history() {
    let (engine, parts) = build_engine(
        ScriptedGenerator::ok("You've been carrying a lot."),
        FixedClassifier::new(0.1, 0.1),
        false,
    );

    engine.handle_turn("s1", "i want to give up on life").await;
    engine.handle_turn("s1", "sorry, i just had a bad day").await;

    let prompt = parts.generator.last_prompt();
    assert!(prompt.contains("i want to give up on life"));
    assert_eq!(wait_for_delivery(&parts.notifier).await, 1);
}
