use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the ragserve process.
///
/// Loaded once in `main` and handed to every component constructor by
/// reference or `Arc`; there is no ambient global.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string for documents and original chunks.
    pub database_url: String,
    /// Base URL of the similarity index that stores summary vectors.
    pub vector_url: String,
    /// Optional API key required to access the similarity index.
    pub vector_api_key: Option<String>,
    /// Base URL of the layout/OCR partitioning service.
    pub partitioner_url: String,
    /// Base URL of the generation runtime (Ollama wire format).
    pub generation_url: String,
    /// Model identifier passed to the generation runtime.
    pub generation_model: String,
    /// Embedding backend used for summary vectors and queries.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
    /// Optional file receiving a copy of every log event.
    pub log_file: Option<PathBuf>,
    /// Time-to-live of a per-document processing lock.
    pub lock_ttl: Duration,
    /// Number of candidates requested from the similarity index per query.
    pub retrieval_top_k: usize,
    /// Default similarity score cutoff applied during retrieval.
    pub score_threshold: f32,
    /// Maximum in-flight generation calls during summarization.
    pub summary_concurrency: usize,
    /// Hard character ceiling forcing a chunk boundary during partitioning.
    pub partition_max_characters: usize,
    /// Soft character count after which a new heading starts a new chunk.
    pub partition_new_after_n_chars: usize,
    /// Fragments below this size are merged into the preceding chunk.
    pub partition_combine_under_n_chars: usize,
    /// Whether the partitioner should extract structured tables.
    pub partition_tables: bool,
    /// Whether the partitioner should extract embedded images.
    pub partition_images: bool,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local Ollama runtime reached over HTTP.
    Ollama,
    /// Deterministic hash embedding, useful offline and in tests.
    Deterministic,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Ok(Self {
            database_url: load_env("DATABASE_URL")?,
            vector_url: load_env("VECTOR_INDEX_URL")?,
            vector_api_key: load_env_optional("VECTOR_INDEX_API_KEY"),
            partitioner_url: load_env("PARTITIONER_URL")?,
            generation_url: load_env("GENERATION_URL")?,
            generation_model: load_env("GENERATION_MODEL")?,
            embedding_provider: load_env_optional("EMBEDDING_PROVIDER")
                .unwrap_or_else(|| "ollama".to_string())
                .parse()
                .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string()))?,
            embedding_model: load_env("EMBEDDING_MODEL")?,
            embedding_dimension: parse_env("EMBEDDING_DIMENSION")?
                .ok_or_else(|| ConfigError::MissingVariable("EMBEDDING_DIMENSION".to_string()))?,
            server_port: parse_env("SERVER_PORT")?,
            log_file: load_env_optional("LOG_FILE").map(PathBuf::from),
            lock_ttl: Duration::from_secs(parse_env("LOCK_TTL_SECS")?.unwrap_or(600)),
            retrieval_top_k: parse_env("RETRIEVAL_TOP_K")?.unwrap_or(10),
            score_threshold: parse_env("SCORE_THRESHOLD")?.unwrap_or(0.3),
            summary_concurrency: parse_env("SUMMARY_MAX_CONCURRENCY")?.unwrap_or(5),
            partition_max_characters: parse_env("PARTITION_MAX_CHARACTERS")?.unwrap_or(10_000),
            partition_new_after_n_chars: parse_env("PARTITION_NEW_AFTER_N_CHARS")?.unwrap_or(6_000),
            partition_combine_under_n_chars: parse_env("PARTITION_COMBINE_UNDER_N_CHARS")?
                .unwrap_or(2_000),
            partition_tables: parse_env("PARTITION_TABLES")?.unwrap_or(true),
            partition_images: parse_env("PARTITION_IMAGES")?.unwrap_or(true),
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "deterministic" => Ok(Self::Deterministic),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_parses_known_values() {
        assert_eq!(
            "ollama".parse::<EmbeddingProvider>(),
            Ok(EmbeddingProvider::Ollama)
        );
        assert_eq!(
            "Deterministic".parse::<EmbeddingProvider>(),
            Ok(EmbeddingProvider::Deterministic)
        );
        assert!("pgvector".parse::<EmbeddingProvider>().is_err());
    }
}

#[cfg(test)]
impl Config {
    /// Baseline configuration for unit tests; override fields as needed.
    pub(crate) fn for_tests() -> Self {
        Self {
            database_url: "postgres://localhost/ragserve".into(),
            vector_url: "http://127.0.0.1:6333".into(),
            vector_api_key: None,
            partitioner_url: "http://127.0.0.1:8500".into(),
            generation_url: "http://127.0.0.1:11434".into(),
            generation_model: "test-model".into(),
            embedding_provider: EmbeddingProvider::Deterministic,
            embedding_model: "test-embed".into(),
            embedding_dimension: 64,
            server_port: None,
            log_file: None,
            lock_ttl: Duration::from_secs(600),
            retrieval_top_k: 10,
            score_threshold: 0.3,
            summary_concurrency: 5,
            partition_max_characters: 10_000,
            partition_new_after_n_chars: 6_000,
            partition_combine_under_n_chars: 2_000,
            partition_tables: true,
            partition_images: true,
        }
    }
}
