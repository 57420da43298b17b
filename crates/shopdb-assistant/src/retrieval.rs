//! Similarity search across the per-kind collections and context assembly.

use serde_json::Value;
use shopdb_core::EntityKind;

use crate::embeddings::TeiClient;
use crate::error::AssistantError;
use crate::types::RetrievedDoc;
use crate::vector_store::{QdrantClient, ScoredPoint};

/// Embeds queries and searches the catalog collections.
#[derive(Debug, Clone)]
pub struct Retriever {
    tei: TeiClient,
    qdrant: QdrantClient,
    top_k: usize,
    min_score: f32,
}

impl Retriever {
    #[must_use]
    pub fn new(tei: TeiClient, qdrant: QdrantClient, top_k: usize, min_score: f32) -> Self {
        Self {
            tei,
            qdrant,
            top_k: top_k.max(1),
            min_score,
        }
    }

    /// Number of hits requested from the collection for `kind`.
    ///
    /// Orders are only searched for a known user.
    #[must_use]
    pub fn limit_for(&self, kind: EntityKind, user_id: Option<i64>) -> usize {
        match kind {
            EntityKind::Product => self.top_k,
            EntityKind::Category => self.top_k.div_ceil(2),
            EntityKind::Order => {
                if user_id.is_some() {
                    self.top_k
                } else {
                    0
                }
            }
        }
    }

    /// Embed `query` and return the best matches across all kinds, ordered by
    /// descending score (ties by kind, then entity id).
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Tei`] or [`AssistantError::Qdrant`] if
    /// embedding or any search fails.
    pub async fn retrieve(
        &self,
        query: &str,
        user_id: Option<i64>,
    ) -> Result<Vec<RetrievedDoc>, AssistantError> {
        let vector = self.tei.embed_one(query).await?;

        let searches = EntityKind::ALL.into_iter().filter_map(|kind| {
            let limit = self.limit_for(kind, user_id);
            if limit == 0 {
                return None;
            }
            let filter = if kind == EntityKind::Order { user_id } else { None };
            let vector = &vector;
            Some(async move {
                let hits = self
                    .qdrant
                    .search(kind, vector, limit, self.min_score, filter)
                    .await?;
                Ok::<_, AssistantError>(
                    hits.iter()
                        .filter(|hit| hit.score >= self.min_score)
                        .filter_map(|hit| doc_from_hit(kind, hit))
                        .collect::<Vec<_>>(),
                )
            })
        });

        let mut docs: Vec<RetrievedDoc> = futures::future::try_join_all(searches)
            .await?
            .into_iter()
            .flatten()
            .collect();

        sort_docs(&mut docs);
        tracing::debug!(hits = docs.len(), "retrieved catalog documents");
        Ok(docs)
    }
}

fn doc_from_hit(kind: EntityKind, hit: &ScoredPoint) -> Option<RetrievedDoc> {
    let entity_id = hit.payload.get("entity_id").and_then(Value::as_i64);
    let text = hit.payload.get("text").and_then(Value::as_str);
    let (Some(entity_id), Some(text)) = (entity_id, text) else {
        tracing::warn!(kind = %kind, point_id = hit.id, "skipping point with incomplete payload");
        return None;
    };

    let name = hit
        .payload
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let price = hit
        .payload
        .get("price")
        .and_then(Value::as_str)
        .map(str::to_string);

    Some(RetrievedDoc {
        kind,
        entity_id,
        name,
        text: text.to_string(),
        score: hit.score,
        price,
    })
}

pub(crate) fn sort_docs(docs: &mut [RetrievedDoc]) {
    docs.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.kind.cmp(&b.kind))
            .then(a.entity_id.cmp(&b.entity_id))
    });
}

fn section_title(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Product => "Products:",
        EntityKind::Category => "Categories:",
        EntityKind::Order => "Orders:",
    }
}

/// Render retrieved documents as the grounding context.
///
/// Documents are grouped under `Products:`, `Categories:` and `Orders:` in
/// score order. A document that would push the context past `max_chars` is
/// left out whole. No documents yields an empty string.
#[must_use]
pub fn build_context(docs: &[RetrievedDoc], max_chars: usize) -> String {
    let mut out = String::new();
    let mut used = 0usize;

    for kind in EntityKind::ALL {
        let mut section = String::new();
        let title = section_title(kind);
        // Title, newline and a blank separator line before non-first sections.
        let overhead = title.chars().count() + 1 + usize::from(!out.is_empty());

        for doc in docs.iter().filter(|d| d.kind == kind) {
            let line = format!("- {}\n", doc.text.trim());
            let cost = line.chars().count() + if section.is_empty() { overhead } else { 0 };
            if used + cost > max_chars {
                continue;
            }
            used += cost;
            section.push_str(&line);
        }

        if !section.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(title);
            out.push('\n');
            out.push_str(&section);
        }
    }

    out.trim_end().to_string()
}
