use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub locales_path: PathBuf,
    /// Store name used in the assistant's system prompt.
    pub store_name: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub tei_url: String,
    pub qdrant_url: String,
    /// Per-kind collections are named `{prefix}_{products|categories|orders}`.
    pub qdrant_collection_prefix: String,
    pub embedding_dim: u64,
    pub llm_base_url: String,
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    pub llm_max_tokens: u32,
    pub llm_temperature: f32,
    pub llm_timeout_secs: u64,
    pub llm_max_retries: u32,
    pub llm_retry_backoff_base_ms: u64,
    /// Minimum spacing between two generation requests.
    pub llm_min_request_interval_ms: u64,
    pub translate_url: Option<String>,
    pub translate_api_key: Option<String>,
    /// Language the catalog data is written in.
    pub catalog_language: String,
    pub retrieval_top_k: usize,
    pub retrieval_min_score: f32,
    pub history_turns: usize,
    pub reindex_cron: String,
    /// Key rate limits on the first `x-forwarded-for` hop instead of the
    /// socket peer. Only safe behind a proxy that overwrites the header.
    pub trust_forwarded_for: bool,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("locales_path", &self.locales_path)
            .field("store_name", &self.store_name)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("tei_url", &self.tei_url)
            .field("qdrant_url", &self.qdrant_url)
            .field("qdrant_collection_prefix", &self.qdrant_collection_prefix)
            .field("embedding_dim", &self.embedding_dim)
            .field("llm_base_url", &self.llm_base_url)
            .field(
                "llm_api_key",
                &self.llm_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("llm_model", &self.llm_model)
            .field("llm_max_tokens", &self.llm_max_tokens)
            .field("llm_temperature", &self.llm_temperature)
            .field("llm_timeout_secs", &self.llm_timeout_secs)
            .field("llm_max_retries", &self.llm_max_retries)
            .field("llm_retry_backoff_base_ms", &self.llm_retry_backoff_base_ms)
            .field(
                "llm_min_request_interval_ms",
                &self.llm_min_request_interval_ms,
            )
            .field("translate_url", &self.translate_url)
            .field(
                "translate_api_key",
                &self.translate_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("catalog_language", &self.catalog_language)
            .field("retrieval_top_k", &self.retrieval_top_k)
            .field("retrieval_min_score", &self.retrieval_min_score)
            .field("history_turns", &self.history_turns)
            .field("reindex_cron", &self.reindex_cron)
            .field("trust_forwarded_for", &self.trust_forwarded_for)
            .finish()
    }
}
