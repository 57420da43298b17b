//! Chat answer orchestration.

use std::sync::Arc;

use shopdb_core::{LocaleMessages, LocalesFile};

use crate::embeddings::TeiClient;
use crate::error::AssistantError;
use crate::language::detect_language;
use crate::llm::{ChatModelClient, ModelSettings};
use crate::postprocess::clean_completion;
use crate::prompt::{build_messages, build_system_prompt};
use crate::retrieval::{build_context, Retriever};
use crate::translate::Translator;
use crate::types::{AssistantConfig, ChatAnswer, ChatQuery, SourceRef, ValidationStatus};
use crate::validate::{fallback_listing, validate_answer, Validation};
use crate::vector_store::QdrantClient;

/// Upper bound on the grounding context handed to the model.
pub const MAX_CONTEXT_CHARS: usize = 6_000;

/// Timeout for query embedding, which runs on the request path.
const QUERY_EMBED_TIMEOUT_SECS: u64 = 15;
const TRANSLATE_TIMEOUT_SECS: u64 = 15;

/// The grounded chat assistant.
#[derive(Debug)]
pub struct Assistant {
    retriever: Retriever,
    translator: Translator,
    llm: ChatModelClient,
    locales: Arc<LocalesFile>,
    store_name: String,
    catalog_language: String,
}

impl Assistant {
    #[must_use]
    pub fn new(
        retriever: Retriever,
        translator: Translator,
        llm: ChatModelClient,
        locales: Arc<LocalesFile>,
        store_name: &str,
        catalog_language: &str,
    ) -> Self {
        Self {
            retriever,
            translator,
            llm,
            locales,
            store_name: store_name.to_string(),
            catalog_language: catalog_language.to_ascii_lowercase(),
        }
    }

    /// Build every client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Http`] if an HTTP client cannot be built.
    pub fn from_config(
        config: &AssistantConfig,
        locales: Arc<LocalesFile>,
    ) -> Result<Self, AssistantError> {
        let retriever = Retriever::new(
            TeiClient::new(&config.tei_url, QUERY_EMBED_TIMEOUT_SECS)?,
            QdrantClient::new(
                &config.qdrant_url,
                &config.qdrant_collection_prefix,
                config.embedding_dim,
            )?,
            config.retrieval_top_k,
            config.retrieval_min_score,
        );
        let translator = Translator::new(
            config.translate_url.as_deref(),
            config.translate_api_key.clone(),
            TRANSLATE_TIMEOUT_SECS,
        )?;
        let llm = ChatModelClient::new(
            &config.llm_base_url,
            config.llm_api_key.clone(),
            config.llm_timeout_secs,
            ModelSettings::from_config(config),
        )?;

        Ok(Self::new(
            retriever,
            translator,
            llm,
            locales,
            &config.store_name,
            &config.catalog_language,
        ))
    }

    #[must_use]
    pub fn catalog_language(&self) -> &str {
        &self.catalog_language
    }

    /// Language the answer to `query` will be written in: the client's hint
    /// when given, otherwise the detected language.
    #[must_use]
    pub fn resolve_language(&self, query: &ChatQuery) -> String {
        query
            .language_hint
            .as_deref()
            .map(str::trim)
            .filter(|hint| !hint.is_empty())
            .map_or_else(
                || detect_language(&query.message, &self.catalog_language).code,
                str::to_ascii_lowercase,
            )
    }

    /// Answer `query`, grounded on the catalog.
    ///
    /// `catalog_names` holds every product name in the catalog, used to catch
    /// answers that mention products outside the retrieved context.
    ///
    /// Never fails: retrieval errors produce an empty context, generation
    /// errors produce the localized `unavailable` message, and rejected
    /// answers are replaced by a listing of the retrieved products.
    pub async fn answer(&self, query: &ChatQuery, catalog_names: &[String]) -> ChatAnswer {
        let language = self.resolve_language(query);

        let docs = match self.retriever.retrieve(&query.message, query.user_id).await {
            Ok(docs) => docs,
            Err(e) => {
                tracing::warn!(error = %e, "retrieval failed, answering without context");
                Vec::new()
            }
        };
        let sources: Vec<SourceRef> = docs.iter().map(SourceRef::from).collect();

        let context = build_context(&docs, MAX_CONTEXT_CHARS);
        let translated_context = self
            .translator
            .translate(&context, &self.catalog_language, &language)
            .await;

        let system = build_system_prompt(
            &self.store_name,
            self.locales.language_name(&language),
            &translated_context,
        );
        let messages = build_messages(system, &query.history, &query.message);

        let raw = match self.llm.complete(&messages).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(model = self.llm.model(), error = %e, "generation failed");
                let messages = self.messages_for(&language).await;
                return ChatAnswer {
                    answer: messages.unavailable,
                    language,
                    sources,
                    validation: ValidationStatus::Unavailable,
                    raw_completion: None,
                };
            }
        };

        let cleaned = clean_completion(&raw);
        let grounding = format!("{context}\n{translated_context}");
        let (answer, validation) =
            match validate_answer(&cleaned, &docs, catalog_names, &grounding) {
                Validation::Valid => (cleaned.clone(), ValidationStatus::Valid),
                Validation::Rejected { reason, unknown } => {
                    tracing::warn!(
                        ?reason,
                        unknown = ?unknown,
                        "answer failed validation, returning fallback listing"
                    );
                    let messages = self.messages_for(&language).await;
                    (
                        fallback_listing(&messages.fallback_intro, &messages.no_results, &docs),
                        ValidationStatus::Fallback,
                    )
                }
            };

        tracing::info!(
            language = %language,
            hits = docs.len(),
            validation = validation.as_str(),
            "answered chat query"
        );

        ChatAnswer {
            answer,
            language,
            sources,
            validation,
            raw_completion: Some(cleaned),
        }
    }

    /// Default messages for `language`.
    ///
    /// Languages missing from the locale file get the catalog language's
    /// messages, translated when a translator is configured.
    pub async fn messages_for(&self, language: &str) -> LocaleMessages {
        if let Some(messages) = self.locales.messages_for(language) {
            return messages.clone();
        }

        let (source_language, base) = match self.locales.messages_for(&self.catalog_language) {
            Some(messages) => (self.catalog_language.as_str(), messages.clone()),
            None => (
                "en",
                LocalesFile::builtin()
                    .messages_for("en")
                    .cloned()
                    .unwrap_or_default(),
            ),
        };

        LocaleMessages {
            fallback_intro: self
                .translator
                .translate(&base.fallback_intro, source_language, language)
                .await,
            no_results: self
                .translator
                .translate(&base.no_results, source_language, language)
                .await,
            unavailable: self
                .translator
                .translate(&base.unavailable, source_language, language)
                .await,
        }
    }
}
