//! # Serene CLI (`serene`)
//!
//! The `serene` binary is a thin host around the dialogue engine. It
//! wires the HTTP capability adapters from configuration, loads the
//! corpus, builds the embedding index, and exposes the engine's
//! operations.
//!
//! ## Usage
//!
//! ```bash
//! serene --config ./config/serene.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `serene chat` | Interactive support-chat session in the terminal |
//! | `serene assess "<text>"` | Print the crisis verdict for one utterance |
//! | `serene retrieve "<query>"` | Print reranked grounding candidates |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use serene::capability::CrisisNotifier;
use serene::config::{self, Config};
use serene::corpus::load_corpus;
use serene::crisis::CrisisAssessor;
use serene::engine::DialogueEngine;
use serene::generate::GenerationOrchestrator;
use serene::index::EmbeddingIndex;
use serene::providers::{
    HttpEmbedder, HttpGenerator, HttpReranker, HttpSentimentClassifier, WebhookNotifier,
};
use serene::retrieve::ContextRetriever;

/// Phrases that end an interactive chat session.
const EXIT_PHRASES: &[&str] = &[
    "bye", "goodbye", "quit", "exit", "cya", "see you", "farewell", "i am done", "i'm done",
    "done", "later", "talk to you soon", "good night", "take care", "leave", "i'm leaving",
    "see ya", "thanks bye", "ok bye",
];

const FAREWELL: &str = "Goodbye! Take care.";

/// Serene: a crisis-aware, retrieval-augmented dialogue engine for
/// student support chat.
#[derive(Parser)]
#[command(
    name = "serene",
    about = "A crisis-aware, retrieval-augmented support chat engine",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/serene.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session.
    ///
    /// Reads user turns from stdin until an exit phrase ("bye", "quit",
    /// ...) or end of input. One session per run.
    Chat,

    /// Assess one utterance for crisis signals.
    ///
    /// Prints the verdict, the matched keyword (if any), and the
    /// sentiment scores (if the sentiment gate was consulted).
    Assess {
        /// The utterance to assess.
        text: String,
    },

    /// Retrieve grounding candidates for a query.
    ///
    /// Prints the reranked prior exchanges the engine would use as
    /// context, with their relevance scores.
    Retrieve {
        /// The query text.
        query: String,
    },
}

/// Wire the engine from configuration: load the corpus, embed it, and
/// connect the HTTP capability adapters.
async fn build_engine(cfg: &Config) -> Result<DialogueEngine> {
    let corpus = Arc::new(load_corpus(&cfg.corpus.path)?);

    let embedder = Arc::new(HttpEmbedder::new(&cfg.capabilities)?);
    let index = Arc::new(EmbeddingIndex::build(&corpus, embedder.as_ref()).await?);

    let reranker = if cfg.retrieval.use_reranker {
        Some(Arc::new(HttpReranker::new(&cfg.capabilities)?) as Arc<dyn serene::capability::Reranker>)
    } else {
        None
    };

    let retriever = ContextRetriever::new(
        corpus,
        index,
        embedder,
        reranker,
        cfg.retrieval.clone(),
    );

    let assessor = CrisisAssessor::new(Arc::new(HttpSentimentClassifier::new(&cfg.capabilities)?));
    let orchestrator =
        GenerationOrchestrator::new(Arc::new(HttpGenerator::new(&cfg.capabilities)?));

    let notifier = WebhookNotifier::from_config(&cfg.notify, cfg.capabilities.timeout_secs)?
        .map(|n| Arc::new(n) as Arc<dyn CrisisNotifier>);

    Ok(DialogueEngine::new(assessor, retriever, orchestrator, notifier))
}

async fn run_chat(engine: &DialogueEngine) -> Result<()> {
    let session_id = uuid::Uuid::new_v4().to_string();
    println!("Bot: Hi! I'm here to listen and support you, no judgment. What's on your mind today?");

    let stdin = std::io::stdin();
    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            println!("\nBot: {FAREWELL}");
            break;
        }
        let text = line.trim();

        if EXIT_PHRASES.contains(&text.to_lowercase().as_str()) {
            println!("Bot: {FAREWELL}");
            break;
        }

        let outcome = engine.handle_turn(&session_id, text).await;
        println!("Bot: {}", outcome.reply);
    }

    engine.end_session(&session_id);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let engine = build_engine(&cfg).await?;

    match cli.command {
        Commands::Chat => {
            run_chat(&engine).await?;
        }
        Commands::Assess { text } => {
            let verdict = engine.assess(&text).await;
            println!("crisis: {}", verdict.is_crisis);
            if let Some(kw) = verdict.matched_keyword {
                println!("matched keyword: {kw}");
            }
            if let Some(scores) = verdict.sentiment {
                println!("sadness: {:.4}  fear: {:.4}", scores.sadness, scores.fear);
            }
        }
        Commands::Retrieve { query } => {
            let candidates = engine.retrieve(&query).await;
            if candidates.is_empty() {
                println!("No grounding candidates.");
            }
            for (rank, c) in candidates.iter().enumerate() {
                println!("{:>2}. [{:.4}] {}", rank + 1, c.score, c.record.query);
                println!("    reply: {}", c.record.answer);
            }
        }
    }

    Ok(())
}
