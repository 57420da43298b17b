use rust_decimal::Decimal;
use serde::Serialize;
use shopdb_core::{AppConfig, EntityKind};

/// Configuration for the assistant pipeline and indexer.
#[derive(Clone)]
pub struct AssistantConfig {
    pub store_name: String,
    pub tei_url: String,
    pub qdrant_url: String,
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
    pub llm_min_request_interval_ms: u64,
    pub translate_url: Option<String>,
    pub translate_api_key: Option<String>,
    /// Language the catalog text is written in.
    pub catalog_language: String,
    pub retrieval_top_k: usize,
    pub retrieval_min_score: f32,
}

impl AssistantConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            store_name: config.store_name.clone(),
            tei_url: config.tei_url.clone(),
            qdrant_url: config.qdrant_url.clone(),
            qdrant_collection_prefix: config.qdrant_collection_prefix.clone(),
            embedding_dim: config.embedding_dim,
            llm_base_url: config.llm_base_url.clone(),
            llm_api_key: config.llm_api_key.clone(),
            llm_model: config.llm_model.clone(),
            llm_max_tokens: config.llm_max_tokens,
            llm_temperature: config.llm_temperature,
            llm_timeout_secs: config.llm_timeout_secs,
            llm_max_retries: config.llm_max_retries,
            llm_retry_backoff_base_ms: config.llm_retry_backoff_base_ms,
            llm_min_request_interval_ms: config.llm_min_request_interval_ms,
            translate_url: config.translate_url.clone(),
            translate_api_key: config.translate_api_key.clone(),
            catalog_language: config.catalog_language.clone(),
            retrieval_top_k: config.retrieval_top_k,
            retrieval_min_score: config.retrieval_min_score,
        }
    }
}

impl std::fmt::Debug for AssistantConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistantConfig")
            .field("store_name", &self.store_name)
            .field("tei_url", &self.tei_url)
            .field("qdrant_url", &self.qdrant_url)
            .field("qdrant_collection_prefix", &self.qdrant_collection_prefix)
            .field("llm_base_url", &self.llm_base_url)
            .field("llm_api_key", &self.llm_api_key.as_ref().map(|_| "[redacted]"))
            .field("llm_model", &self.llm_model)
            .field("llm_max_retries", &self.llm_max_retries)
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
            .finish_non_exhaustive()
    }
}

/// A catalog document returned by similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedDoc {
    pub kind: EntityKind,
    pub entity_id: i64,
    /// Product or category name; order reference for orders.
    pub name: String,
    /// The indexed text, in the catalog language.
    pub text: String,
    /// Cosine similarity in [-1, 1].
    pub score: f32,
    /// Display price (`"49.90 USD"`) for products.
    pub price: Option<String>,
}

/// Public reference to a document an answer was grounded on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRef {
    pub kind: EntityKind,
    pub id: i64,
    pub name: String,
    pub score: f32,
}

impl From<&RetrievedDoc> for SourceRef {
    fn from(doc: &RetrievedDoc) -> Self {
        Self {
            kind: doc.kind,
            id: doc.entity_id,
            name: doc.name.clone(),
            score: doc.score,
        }
    }
}

/// A prior turn of the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    /// Parses the stored role string. Unknown roles yield `None`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Input to [`crate::Assistant::answer`].
#[derive(Debug, Clone, Default)]
pub struct ChatQuery {
    pub message: String,
    /// Explicit language from the client; skips detection when set.
    pub language_hint: Option<String>,
    /// Enables order search scoped to this user.
    pub user_id: Option<i64>,
    pub history: Vec<ChatTurn>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    /// The model's answer passed validation.
    Valid,
    /// The answer was rejected and replaced by a listing of retrieved products.
    Fallback,
    /// Generation failed; the localized unavailable message was returned.
    Unavailable,
}

impl ValidationStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Fallback => "fallback",
            Self::Unavailable => "unavailable",
        }
    }
}

/// Result of one assistant exchange.
#[derive(Debug, Clone)]
pub struct ChatAnswer {
    pub answer: String,
    /// Language code the answer is written in.
    pub language: String,
    pub sources: Vec<SourceRef>,
    pub validation: ValidationStatus,
    /// Post-processed model output before validation, when the model answered.
    pub raw_completion: Option<String>,
}

/// Format a money amount for prompts and fallback listings.
#[must_use]
pub fn format_price(amount: Decimal, currency: &str) -> String {
    format!("{:.2} {currency}", amount.round_dp(2))
}
