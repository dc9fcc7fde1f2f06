//! The dialogue controller.
//!
//! `handle_turn` is the engine's single entry point. Each turn walks a
//! short gate sequence: empty input, crisis assessment, greeting match,
//! then the normal retrieval-grounded generation flow. Every exit path
//! returns a reply plus the crisis flag, and no state survives a turn
//! except what lands in the session's [`SessionState`].
//!
//! On a crisis verdict the controller returns the fixed safety message
//! immediately, emits the crisis event fire-and-forget, and still
//! appends the turn to memory so the moment stays visible in transcript
//! context for later turns.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::{error, info};

use crate::capability::CrisisNotifier;
use crate::crisis::CrisisAssessor;
use crate::generate::GenerationOrchestrator;
use crate::memory::SessionArena;
use crate::models::{CrisisVerdict, RetrievedCandidate};
use crate::retrieve::{render_context_block, ContextRetriever};
use crate::template;

/// Fixed reply for a crisis turn.
pub const CRISIS_MESSAGE: &str = "I'm really glad you told me. Your safety matters. If you're in immediate danger, please contact local emergency services. Would you like resources for your area?";

/// Canned greeting-and-menu reply.
pub const GREETING_REPLY: &str = "Hi! I'm here for you. What would you like to talk about: study stress, motivation, sleep, relationships, or something else?";

/// Prompting reply for empty or whitespace-only input.
pub const EMPTY_INPUT_REPLY: &str =
    "I'm here whenever you're ready. What's on your mind today?";

fn greeting_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(hi|hello|hey|yo|hiya|hii+|good\s*(morning|afternoon|evening))\b")
            .unwrap()
    })
}

/// The reply and crisis flag returned for every turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub reply: String,
    pub is_crisis: bool,
}

/// Top-level dialogue engine shared by all sessions.
///
/// Everything inside is read-only after construction except the session
/// arena, whose per-session state is guarded by per-session mutexes, so
/// one engine instance serves concurrent sessions without further
/// locking.
pub struct DialogueEngine {
    arena: SessionArena,
    assessor: CrisisAssessor,
    retriever: ContextRetriever,
    orchestrator: GenerationOrchestrator,
    notifier: Option<Arc<dyn CrisisNotifier>>,
}

impl DialogueEngine {
    pub fn new(
        assessor: CrisisAssessor,
        retriever: ContextRetriever,
        orchestrator: GenerationOrchestrator,
        notifier: Option<Arc<dyn CrisisNotifier>>,
    ) -> Self {
        Self {
            arena: SessionArena::new(),
            assessor,
            retriever,
            orchestrator,
            notifier,
        }
    }

    /// Run one conversation turn for `session_id`.
    ///
    /// Never errors: capability outages surface as degraded replies, not
    /// failures. A concurrent second turn for the same session waits for
    /// the in-flight one to finish.
    pub async fn handle_turn(&self, session_id: &str, user_text: &str) -> TurnOutcome {
        let handle = self.arena.session(session_id);
        let mut state = handle.lock().await;

        if user_text.trim().is_empty() {
            return TurnOutcome {
                reply: EMPTY_INPUT_REPLY.to_string(),
                is_crisis: false,
            };
        }

        let verdict = self.assessor.assess(user_text).await;
        if verdict.is_crisis {
            info!("Crisis verdict for session, returning safety message");
            self.emit_crisis_event(session_id, user_text);
            state.append(user_text, CRISIS_MESSAGE);
            return TurnOutcome {
                reply: CRISIS_MESSAGE.to_string(),
                is_crisis: true,
            };
        }

        if greeting_re().is_match(user_text.trim()) {
            state.append(user_text, GREETING_REPLY);
            return TurnOutcome {
                reply: GREETING_REPLY.to_string(),
                is_crisis: false,
            };
        }

        let candidates = self.retriever.retrieve(user_text).await;
        let context_block = render_context_block(&candidates);
        let history_block = state.render_history();

        let candidate_reply = self
            .orchestrator
            .generate(user_text, &context_block, &history_block)
            .await;

        let final_reply = template::wrap_reply(
            user_text,
            &candidate_reply,
            &mut state.templates,
            &mut rand::thread_rng(),
        );

        state.append(user_text, final_reply.clone());
        TurnOutcome {
            reply: final_reply,
            is_crisis: false,
        }
    }

    /// Assess an utterance without running a turn.
    pub async fn assess(&self, text: &str) -> CrisisVerdict {
        self.assessor.assess(text).await
    }

    /// Retrieve grounding candidates without running a turn.
    pub async fn retrieve(&self, query: &str) -> Vec<RetrievedCandidate> {
        self.retriever.retrieve(query).await
    }

    /// Discard a session's memory and template state.
    pub fn end_session(&self, session_id: &str) {
        self.arena.end_session(session_id);
    }

    /// The user-visible reply never blocks on delivery; failures are
    /// logged and otherwise dropped.
    fn emit_crisis_event(&self, session_id: &str, user_text: &str) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        let notifier = notifier.clone();
        let session_id = session_id.to_string();
        let user_text = user_text.to_string();
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&session_id, &user_text).await {
                error!("Crisis notification delivery failed: {e:#}");
            }
        });
    }
}
