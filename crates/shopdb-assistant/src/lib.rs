//! Catalog-grounded chat assistant for shopdb.
//!
//! Answers shopper questions with a retrieval-augmented pipeline: detect the
//! query language, embed it via TEI, search the per-kind Qdrant collections,
//! build and translate a grounding context, ask a hosted model under retry and
//! request pacing, clean the completion, and validate it against the catalog.
//! The indexer keeps the collections in sync with Postgres.

pub mod error;
pub mod indexer;
pub mod language;
pub mod llm;
pub mod pipeline;
pub mod postprocess;
pub mod prompt;
pub mod retrieval;
pub mod retry;
pub mod translate;
pub mod types;
pub mod validate;

mod embeddings;
mod vector_store;

pub use embeddings::TeiClient;
pub use error::AssistantError;
pub use indexer::{
    collect_documents, run_full_index, run_index, IndexDocument, IndexStats, Indexer,
};
pub use language::{detect_language, DetectedLanguage};
pub use llm::{ChatMessage, ChatModelClient, ChatRole, ModelSettings};
pub use pipeline::Assistant;
pub use retrieval::Retriever;
pub use retry::{retry_with_backoff, RequestPacer};
pub use translate::Translator;
pub use types::{
    AssistantConfig, ChatAnswer, ChatQuery, ChatTurn, RetrievedDoc, SourceRef, TurnRole,
    ValidationStatus,
};
pub use validate::{fallback_listing, validate_answer, RejectReason, Validation};
pub use vector_store::{entity_point_id, Point, QdrantClient, ScoredPoint};
