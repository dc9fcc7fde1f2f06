use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    pub capabilities: CapabilitiesConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    /// Path to the corpus JSON file (array of prior exchanges).
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Number of nearest neighbors fetched from the index.
    #[serde(default = "default_k_retrieve")]
    pub k_retrieve: usize,
    /// Number of candidates kept after reranking.
    #[serde(default = "default_k_rerank")]
    pub k_rerank: usize,
    /// Whether to apply the cross-encoder rerank pass.
    #[serde(default = "default_use_reranker")]
    pub use_reranker: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k_retrieve: default_k_retrieve(),
            k_rerank: default_k_rerank(),
            use_reranker: default_use_reranker(),
        }
    }
}

fn default_k_retrieve() -> usize {
    6
}
fn default_k_rerank() -> usize {
    2
}
fn default_use_reranker() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct CapabilitiesConfig {
    /// Base URL of the inference server hosting all model capabilities.
    pub base_url: String,
    /// Embedding model identifier.
    pub embedding_model: String,
    /// Embedding vector dimensionality.
    pub embedding_dims: usize,
    /// Cross-encoder rerank model identifier.
    pub rerank_model: String,
    /// Emotion classification model identifier.
    pub sentiment_model: String,
    /// Causal generation model identifier.
    pub generation_model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct NotifyConfig {
    /// Webhook URL that receives crisis events. Disabled when unset.
    pub webhook_url: Option<String>,
}

impl NotifyConfig {
    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.retrieval.k_retrieve == 0 {
        anyhow::bail!("retrieval.k_retrieve must be >= 1");
    }

    if config.retrieval.k_rerank == 0 {
        anyhow::bail!("retrieval.k_rerank must be >= 1");
    }

    if config.retrieval.k_rerank > config.retrieval.k_retrieve {
        anyhow::bail!(
            "retrieval.k_rerank ({}) must not exceed retrieval.k_retrieve ({})",
            config.retrieval.k_rerank,
            config.retrieval.k_retrieve
        );
    }

    if config.capabilities.embedding_dims == 0 {
        anyhow::bail!("capabilities.embedding_dims must be > 0");
    }

    if config.capabilities.base_url.trim().is_empty() {
        anyhow::bail!("capabilities.base_url must be set");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(body: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    const MINIMAL: &str = r#"
[corpus]
path = "data/corpus.json"

[capabilities]
base_url = "http://localhost:8080"
embedding_model = "all-MiniLM-L6-v2"
embedding_dims = 384
rerank_model = "ms-marco-MiniLM-L-6-v2"
sentiment_model = "emotion-english-distilroberta-base"
generation_model = "TinyLlama-1.1B-Chat-v1.0"
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let file = write_config(MINIMAL);
        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.retrieval.k_retrieve, 6);
        assert_eq!(cfg.retrieval.k_rerank, 2);
        assert!(cfg.retrieval.use_reranker);
        assert_eq!(cfg.capabilities.timeout_secs, 30);
        assert!(!cfg.notify.is_enabled());
    }

    #[test]
    fn test_rerank_exceeds_retrieve_rejected() {
        let body = format!("{MINIMAL}\n[retrieval]\nk_retrieve = 2\nk_rerank = 4\n");
        let file = write_config(&body);
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("k_rerank"));
    }

    #[test]
    fn test_zero_dims_rejected() {
        let body = MINIMAL.replace("embedding_dims = 384", "embedding_dims = 0");
        let file = write_config(&body);
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = load_config(Path::new("/nonexistent/serene.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_notify_webhook_enables() {
        let body = format!("{MINIMAL}\n[notify]\nwebhook_url = \"http://localhost:9000/crisis\"\n");
        let file = write_config(&body);
        let cfg = load_config(file.path()).unwrap();
        assert!(cfg.notify.is_enabled());
    }
}
