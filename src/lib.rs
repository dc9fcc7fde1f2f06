//! # Serene
//!
//! **A crisis-aware, retrieval-augmented dialogue engine for student
//! support chat.**
//!
//! Given a user utterance, Serene decides whether it signals self-harm
//! risk, retrieves semantically similar prior exchanges to ground a
//! reply, invokes a text-generation capability, and wraps the candidate
//! in non-repeating empathetic templating, all while maintaining a short
//! bounded conversation memory per session.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ handle_turn   │
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐  crisis   ┌────────────────────────────┐
//! │ CrisisAssessor│─────────▶│ safety message + event emit │
//! └──────┬───────┘           └────────────────────────────┘
//!        │ greeting ──▶ canned menu reply
//!        ▼
//! ┌──────────────┐   ┌───────────────────┐   ┌───────────────┐
//! │  Retriever    │──▶│   Orchestrator     │──▶│ TemplateEngine │
//! │ index+rerank │   │ prompt+decode+fix  │   │  wrap 5 sent.  │
//! └──────────────┘   └───────────────────┘   └──────┬────────┘
//!                                                    ▼
//!                                            session memory append
//! ```
//!
//! ## Control Flow Per Turn
//!
//! 1. Empty input short-circuits to a prompting reply.
//! 2. The **crisis assessor** ([`crisis`]) gates the turn: a keyword or
//!    extreme-sentiment verdict returns the fixed safety message and
//!    emits a fire-and-forget crisis event.
//! 3. A **greeting** pattern returns a canned menu reply.
//! 4. Otherwise the **retriever** ([`retrieve`]) pulls reranked prior
//!    exchanges from the [`index`], the **orchestrator** ([`generate`])
//!    produces and sanitizes a candidate reply, and the **template
//!    engine** ([`template`]) wraps it before the turn is appended to
//!    the session's [`memory`].
//!
//! Every capability (embedding, reranking, sentiment, generation,
//! notification) is consumed through a narrow trait in [`capability`];
//! HTTP-backed adapters live in [`providers`]. A capability outage
//! degrades the reply, never fails the turn.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types: `CorpusRecord`, `CrisisVerdict`, `PromptBundle` |
//! | [`corpus`] | Load-time corpus construction with normalization |
//! | [`capability`] | Capability traits and the fixed decoding policy |
//! | [`providers`] | HTTP capability adapters with retry/backoff |
//! | [`index`] | In-memory embedding index (inner-product top-k) |
//! | [`retrieve`] | Context retrieval and cross-encoder reranking |
//! | [`crisis`] | Keyword + sentiment crisis assessment |
//! | [`memory`] | Bounded per-session history and the session arena |
//! | [`template`] | Non-repeating empathetic response templating |
//! | [`generate`] | Prompt assembly, sanitization, fallback policy |
//! | [`engine`] | The dialogue controller: `handle_turn` |

pub mod capability;
pub mod config;
pub mod corpus;
pub mod crisis;
pub mod engine;
pub mod generate;
pub mod index;
pub mod memory;
pub mod models;
pub mod providers;
pub mod retrieve;
pub mod template;

pub use engine::{DialogueEngine, TurnOutcome};
pub use models::{CorpusRecord, CrisisVerdict, RetrievedCandidate};
