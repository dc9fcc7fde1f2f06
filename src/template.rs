//! Empathetic response templating.
//!
//! Every normal-flow reply is wrapped in a fixed scaffold: an opening
//! that names what the user is carrying, a feeling label, the generated
//! reply itself, then an inquiry, a validation, and an exploration
//! fragment. Fragment selection is uniform over each category's pool,
//! excluding whatever was chosen for that category on the previous turn
//! of the same session, so two consecutive replies never open or
//! validate with the identical phrasing.
//!
//! Selection is a pure function of (category, session's last choice,
//! RNG); callers pass the random source in, so tests run it with a
//! seeded generator.

use rand::Rng;

/// Maximum sentence units kept in an assembled reply. Anything beyond
/// is discarded with no ellipsis.
pub const MAX_REPLY_SENTENCES: usize = 5;

/// Focus slot fallback when no salient phrase is found.
const DEFAULT_FOCUS: &str = "your situation";

/// Focus slot used when the utterance contains harm-adjacent words,
/// an extra safety net even on the non-crisis path.
const SAFE_FOCUS: &str = "what you're going through";

/// Words that swap the focus slot to [`SAFE_FOCUS`].
const HARM_ADJACENT: &[&str] = &["suicide", "hurt", "die", "kill"];

const OPENING_POOL: &[&str] = &[
    "I hear how {focus} is weighing on you right now.",
    "It's tough when {focus} feels so heavy; I'm here with you.",
    "Thanks for sharing about {focus}. That sounds really challenging.",
    "It makes sense that {focus} would feel intense.",
];

const VALIDATION_POOL: &[&str] = &[
    "It's completely valid to feel this way; many students do.",
    "You're not alone in this; it's okay to struggle.",
    "Taking a moment to acknowledge this is a strong step.",
    "You're not overreacting; what you're facing would challenge anyone.",
];

const INQUIRY_POOL: &[&str] = &[
    "What part of this feels the hardest for you?",
    "How has this been affecting your day?",
    "Would you like some ideas to make it a bit easier?",
    "When does it spike the most: at night, before class, or while studying?",
];

const EXPLORATION_POOL: &[&str] = &[
    "We can break it down together if you'd like.",
    "Small steps can help; want to try one?",
    "I'm listening without judgment.",
    "How about a tiny reset: sip water, stretch, then one focused study block?",
];

/// Trigger word → feeling label, scanned in order; first match wins.
const FEELINGS: &[(&str, &str)] = &[
    ("stressed", "stressed"),
    ("anxious", "anxious"),
    ("overwhelmed", "overwhelmed"),
    ("tired", "exhausted"),
    ("sad", "sad"),
    ("upset", "upset"),
    ("angry", "frustrated"),
    ("scared", "fearful"),
    ("worried", "worried"),
    ("happy", "positive"),
    ("excited", "excited"),
    ("calm", "calm"),
    ("exams", "stressed"),
    ("study", "overwhelmed"),
    ("fail", "anxious"),
];

const DEFAULT_FEELING: &str = "overwhelmed";

/// Domain vocabulary scanned for the opening's focus slot.
const SALIENT_VOCAB: &[&str] = &[
    "stressed",
    "anxious",
    "exams",
    "study",
    "tips",
    "fail",
    "pass",
    "sleep",
    "relationship",
    "motivation",
    "upcoming",
    "properly",
];

/// Maximum salient terms joined into the focus slot.
const MAX_FOCUS_TERMS: usize = 2;

/// The four fragment categories with independent anti-repeat state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateCategory {
    Opening,
    Validation,
    Inquiry,
    Exploration,
}

impl TemplateCategory {
    /// The fixed candidate pool for this category.
    pub fn pool(self) -> &'static [&'static str] {
        match self {
            TemplateCategory::Opening => OPENING_POOL,
            TemplateCategory::Validation => VALIDATION_POOL,
            TemplateCategory::Inquiry => INQUIRY_POOL,
            TemplateCategory::Exploration => EXPLORATION_POOL,
        }
    }

    fn slot(self) -> usize {
        match self {
            TemplateCategory::Opening => 0,
            TemplateCategory::Validation => 1,
            TemplateCategory::Inquiry => 2,
            TemplateCategory::Exploration => 3,
        }
    }
}

/// Per-session record of the last fragment chosen in each category.
#[derive(Debug, Clone, Default)]
pub struct TemplateMemory {
    last: [Option<usize>; 4],
}

impl TemplateMemory {
    pub fn last(&self, category: TemplateCategory) -> Option<usize> {
        self.last[category.slot()]
    }

    fn record(&mut self, category: TemplateCategory, index: usize) {
        self.last[category.slot()] = Some(index);
    }
}

/// Pick a fragment for `category`, excluding the session's previous
/// pick for that category. The exclusion is waived when it would empty
/// the pool.
pub fn choose(
    category: TemplateCategory,
    memory: &mut TemplateMemory,
    rng: &mut impl Rng,
) -> &'static str {
    let pool = category.pool();
    let excluded = memory.last(category).filter(|_| pool.len() > 1);

    let candidates: Vec<usize> = (0..pool.len())
        .filter(|i| Some(*i) != excluded)
        .collect();

    let index = candidates[rng.gen_range(0..candidates.len())];
    memory.record(category, index);
    pool[index]
}

/// Map an utterance to a feeling label via the trigger table; first
/// match in table order wins. Unmatched text defaults to "overwhelmed",
/// the common case in student chats.
pub fn infer_feeling(text: &str) -> &'static str {
    let lowered = text.to_lowercase();
    FEELINGS
        .iter()
        .find(|(trigger, _)| lowered.contains(trigger))
        .map(|(_, feeling)| *feeling)
        .unwrap_or(DEFAULT_FEELING)
}

/// Extract the opening's focus phrase from the utterance.
///
/// Takes up to two salient vocabulary terms in order of first occurrence
/// in the text, joined with ", ". Falls back to a generic phrase when
/// nothing matches, and to a harm-safe phrase when the raw text contains
/// harm-adjacent words.
pub fn salient_focus(text: &str) -> String {
    let lowered = text.to_lowercase();

    if HARM_ADJACENT.iter().any(|w| lowered.contains(w)) {
        return SAFE_FOCUS.to_string();
    }

    let mut found: Vec<(usize, &str)> = SALIENT_VOCAB
        .iter()
        .filter_map(|term| lowered.find(term).map(|pos| (pos, *term)))
        .collect();
    found.sort_by_key(|(pos, _)| *pos);
    found.truncate(MAX_FOCUS_TERMS);

    if found.is_empty() {
        DEFAULT_FOCUS.to_string()
    } else {
        found
            .iter()
            .map(|(_, term)| *term)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Wrap a sanitized generated reply in the empathetic scaffold for one
/// turn, advancing the session's anti-repeat state.
pub fn wrap_reply(
    user_text: &str,
    generated_reply: &str,
    memory: &mut TemplateMemory,
    rng: &mut impl Rng,
) -> String {
    let focus = salient_focus(user_text);
    let feeling = infer_feeling(user_text);

    let opening = choose(TemplateCategory::Opening, memory, rng).replace("{focus}", &focus);
    let inquiry = choose(TemplateCategory::Inquiry, memory, rng);
    let validation = choose(TemplateCategory::Validation, memory, rng);
    let exploration = choose(TemplateCategory::Exploration, memory, rng);

    assemble(
        &opening,
        feeling,
        generated_reply,
        inquiry,
        validation,
        exploration,
    )
}

/// Concatenate the six scaffold pieces in fixed order and truncate to
/// [`MAX_REPLY_SENTENCES`] sentence units.
pub fn assemble(
    opening: &str,
    feeling: &str,
    generated_reply: &str,
    inquiry: &str,
    validation: &str,
    exploration: &str,
) -> String {
    let mut reply = generated_reply.trim().to_string();
    if !reply.is_empty() && !reply.ends_with(['.', '!', '?']) {
        reply.push('.');
    }

    let label = format!("It sounds like you're feeling {feeling} about this.");
    let combined = [opening, &label, &reply, inquiry, validation, exploration]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .map(str::to_string)
        .collect::<Vec<_>>()
        .join(" ");

    truncate_sentences(&combined, MAX_REPLY_SENTENCES)
}

/// Split `text` into sentence units (a `.`, `!`, or `?` followed by
/// whitespace ends a unit), keep the first `max`, and rejoin with
/// single spaces.
pub fn truncate_sentences(text: &str, max: usize) -> String {
    split_sentences(text)
        .into_iter()
        .take(max)
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek().is_some_and(|n| n.is_whitespace()) {
            // Consume the run of whitespace separating sentence units.
            while chars.peek().is_some_and(|n| n.is_whitespace()) {
                chars.next();
            }
            sentences.push(std::mem::take(&mut current));
        }
    }

    if !current.trim().is_empty() {
        sentences.push(current);
    }
    sentences
}
