//! Generation orchestration: prompt assembly, decoding policy, output
//! sanitization, and fallback substitution.
//!
//! The orchestrator is the only component that talks to the generation
//! capability, and it never lets that capability's failures escape: a
//! timeout or error substitutes a fixed listening fallback, and
//! degenerate output (too short, or a bare greeting echo) substitutes an
//! acknowledgment-and-probe sentence. A conversation turn cannot be
//! aborted by the model.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::{debug, warn};

use crate::capability::{DecodingParams, TextGenerator};
use crate::models::PromptBundle;

/// Persona and behavioral constraints for the generation capability.
pub const SYSTEM_INSTRUCTIONS: &str = "You are a warm, empathetic student mental health assistant supporting college and university students with everyday challenges like academic stress, relationships, sleep issues, motivation, and mild anxiety. Always start by validating their feelings, reflect key details from their message, and offer one or two gentle, practical suggestions tailored to student life. Keep responses hopeful, encouraging, and four to six sentences long; focus on small steps rather than overwhelming plans. End every reply with an open question that invites more sharing. Be conversational and friendly, like a supportive peer, and avoid clinical language, diagnoses, or dismissive phrases. If the user mentions harm or crisis, respond supportively and urge professional help. Do not role-play, use tags, or go off-topic.";

/// Substituted when the generation capability fails outright.
pub const GENERATION_FAILED_FALLBACK: &str =
    "I'm here to listen and support you. What's on your mind?";

/// Substituted when sanitized output is degenerate.
pub const DEGENERATE_FALLBACK: &str =
    "Thanks for sharing. What feels toughest right now? We can take it one small step at a time.";

/// Sanitized output shorter than this is considered degenerate.
const MIN_REPLY_CHARS: usize = 3;

/// Bare greeting echoes that count as degenerate output.
const BARE_GREETINGS: &[&str] = &["hi", "hello", "hey"];

fn role_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\n(?:user|assistant|system)\s*:").unwrap())
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"</?[\w\s]*>").unwrap())
}

fn blank_lines_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{2,}").unwrap())
}

/// Assembles prompts and drives the generation capability for one turn.
pub struct GenerationOrchestrator {
    generator: Arc<dyn TextGenerator>,
    params: DecodingParams,
}

impl GenerationOrchestrator {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            params: DecodingParams::default(),
        }
    }

    /// Produce a candidate reply for the user's turn. Infallible by
    /// policy: every failure mode maps to a fixed fallback string.
    pub async fn generate(
        &self,
        user_text: &str,
        context_block: &str,
        history_block: &str,
    ) -> String {
        let bundle = PromptBundle {
            system_instructions: SYSTEM_INSTRUCTIONS.to_string(),
            context_block: context_block.to_string(),
            history_block: history_block.to_string(),
            user_turn: user_text.to_string(),
        };
        let prompt = bundle.render();

        let raw = match self.generator.generate(&prompt, &self.params).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Generation failed, using listening fallback: {e:#}");
                return GENERATION_FAILED_FALLBACK.to_string();
            }
        };

        let cleaned = sanitize(&raw);

        if is_degenerate(&cleaned) {
            debug!("Degenerate generation output ({} chars), probing instead", cleaned.len());
            return DEGENERATE_FALLBACK.to_string();
        }

        cleaned
    }
}

/// Strip hallucinated role markers and tag-like tokens from raw model
/// output, collapse repeated blank lines, and trim.
pub fn sanitize(raw: &str) -> String {
    // Anything after a re-emitted role marker is the model talking to
    // itself; keep only the text before the first one.
    let cut = match role_marker_re().find(raw) {
        Some(m) => &raw[..m.start()],
        None => raw,
    };

    let without_tags = tag_re().replace_all(cut, "");
    let collapsed = blank_lines_re().replace_all(&without_tags, " ");
    collapsed.trim().to_string()
}

/// Output too short to be a reply, or an echo of a bare greeting.
pub fn is_degenerate(cleaned: &str) -> bool {
    cleaned.len() < MIN_REPLY_CHARS || BARE_GREETINGS.contains(&cleaned.to_lowercase().as_str())
}
