//! Catalog indexing: builds one text document per product, category and
//! order, embeds the ones whose content changed, and keeps the per-kind
//! collections in sync with the database.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use shopdb_core::EntityKind;
use shopdb_db::{CategoryIndexRow, OrderIndexRow, ProductIndexRow};
use sqlx::PgPool;

use crate::embeddings::TeiClient;
use crate::error::AssistantError;
use crate::types::{format_price, AssistantConfig};
use crate::vector_store::{entity_point_id, Point, QdrantClient};

/// Points per upsert request.
const UPSERT_BATCH_SIZE: usize = 64;
/// Ids per stored-hash lookup.
const LOOKUP_BATCH_SIZE: usize = 256;
const MAX_DESCRIPTION_CHARS: usize = 500;

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Text and payload for one catalog entity.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDocument {
    pub kind: EntityKind,
    pub entity_id: i64,
    pub name: String,
    /// The embedded text, also stored in the payload for context building.
    pub text: String,
    /// Display price, products only.
    pub price: Option<String>,
    /// Owner, orders only. Used as a search filter.
    pub user_id: Option<i64>,
}

impl IndexDocument {
    #[must_use]
    pub fn point_id(&self) -> u64 {
        entity_point_id(self.kind, self.entity_id)
    }

    /// Hex SHA-256 over everything stored for the point.
    #[must_use]
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.name.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.text.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.price.as_deref().unwrap_or_default().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.user_id.map(|u| u.to_string()).unwrap_or_default().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn payload(&self) -> HashMap<String, Value> {
        let mut payload = HashMap::new();
        payload.insert("kind".to_string(), json!(self.kind));
        payload.insert("entity_id".to_string(), json!(self.entity_id));
        payload.insert("name".to_string(), json!(self.name));
        payload.insert("text".to_string(), json!(self.text));
        payload.insert("content_hash".to_string(), json!(self.content_hash()));
        if let Some(price) = &self.price {
            payload.insert("price".to_string(), json!(price));
        }
        if let Some(user_id) = self.user_id {
            payload.insert("user_id".to_string(), json!(user_id));
        }
        payload
    }
}

/// Counts reported by [`Indexer::index`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct IndexStats {
    /// Documents embedded and upserted.
    pub indexed: usize,
    /// Documents skipped because their content hash matched.
    pub unchanged: usize,
    /// Points removed because their row is gone or inactive.
    pub deleted: usize,
}

impl IndexStats {
    pub fn merge(&mut self, other: IndexStats) {
        self.indexed += other.indexed;
        self.unchanged += other.unchanged;
        self.deleted += other.deleted;
    }

    #[must_use]
    pub fn processed(&self) -> usize {
        self.indexed + self.unchanged
    }
}

/// Remove HTML tags and collapse whitespace.
#[must_use]
pub fn strip_html(input: &str) -> String {
    let without_tags = HTML_TAG.replace_all(input, " ");
    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    WHITESPACE.replace_all(&decoded, " ").trim().to_string()
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    // Prefer ending on a word boundary.
    let trimmed = match cut.rfind(' ') {
        Some(pos) if pos > max / 2 => &cut[..pos],
        _ => cut.as_str(),
    };
    format!("{}…", trimmed.trim_end())
}

fn clean_description(description: Option<&str>) -> Option<String> {
    let text = strip_html(description?);
    if text.is_empty() {
        None
    } else {
        Some(truncate_chars(&text, MAX_DESCRIPTION_CHARS))
    }
}

/// Documents for active products. Inactive rows get none, so their points
/// are swept by [`Indexer::index`].
#[must_use]
pub fn product_documents(rows: &[ProductIndexRow]) -> Vec<IndexDocument> {
    let mut docs = Vec::new();

    for row in rows.iter().filter(|row| row.is_active) {

        let price = format_price(row.price, &row.currency);
        let mut text = row.name.clone();
        if let Some(category) = &row.category_name {
            text.push_str(&format!(" (category: {category})"));
        }
        text.push('.');
        if let Some(description) = clean_description(row.description.as_deref()) {
            text.push(' ');
            text.push_str(&description);
            if !description.ends_with(['.', '!', '?', '…']) {
                text.push('.');
            }
        }
        text.push_str(&format!(" Price: {price}."));
        if row.stock_quantity > 0 {
            text.push_str(&format!(" In stock: {}.", row.stock_quantity));
        } else {
            text.push_str(" Out of stock.");
        }

        docs.push(IndexDocument {
            kind: EntityKind::Product,
            entity_id: row.id,
            name: row.name.clone(),
            text,
            price: Some(price),
            user_id: None,
        });
    }

    docs
}

#[must_use]
pub fn category_documents(rows: &[CategoryIndexRow]) -> Vec<IndexDocument> {
    rows.iter()
        .map(|row| {
            let mut text = format!("Category {}", row.name);
            if let Some(parent) = &row.parent_name {
                text.push_str(&format!(" (in {parent})"));
            }
            text.push('.');
            if let Some(description) = clean_description(row.description.as_deref()) {
                text.push(' ');
                text.push_str(&description);
                if !description.ends_with(['.', '!', '?', '…']) {
                    text.push('.');
                }
            }
            let noun = if row.product_count == 1 { "product" } else { "products" };
            text.push_str(&format!(" {} {noun} available.", row.product_count));

            IndexDocument {
                kind: EntityKind::Category,
                entity_id: row.id,
                name: row.name.clone(),
                text,
                price: None,
                user_id: None,
            }
        })
        .collect()
}

#[must_use]
pub fn order_documents(rows: &[OrderIndexRow]) -> Vec<IndexDocument> {
    rows.iter()
        .map(|row| {
            let name = format!("Order {}", row.public_id);
            let items = row
                .items
                .iter()
                .map(|item| {
                    format!(
                        "{} x {} ({})",
                        item.quantity,
                        item.product_name,
                        format_price(item.unit_price, &row.currency)
                    )
                })
                .collect::<Vec<_>>()
                .join(", ");
            let mut text = format!(
                "{name} placed on {}: status {}, total {}.",
                row.created_at.format("%Y-%m-%d"),
                row.status,
                format_price(row.total, &row.currency)
            );
            if !items.is_empty() {
                text.push_str(&format!(" Items: {items}."));
            }

            IndexDocument {
                kind: EntityKind::Order,
                entity_id: row.id,
                name,
                text,
                price: None,
                user_id: Some(row.user_id),
            }
        })
        .collect()
}

/// Load the rows for `kind` and build its documents.
///
/// # Errors
///
/// Returns [`AssistantError::Db`] if a catalog query fails.
pub async fn collect_documents(
    pool: &PgPool,
    kind: EntityKind,
) -> Result<Vec<IndexDocument>, AssistantError> {
    let docs = match kind {
        EntityKind::Product => product_documents(&shopdb_db::list_products_for_index(pool).await?),
        EntityKind::Category => {
            category_documents(&shopdb_db::list_categories_for_index(pool).await?)
        }
        EntityKind::Order => order_documents(&shopdb_db::list_orders_for_index(pool).await?),
    };
    Ok(docs)
}

/// Writes catalog documents into the vector store.
#[derive(Debug, Clone)]
pub struct Indexer {
    tei: TeiClient,
    qdrant: QdrantClient,
}

impl Indexer {
    #[must_use]
    pub fn new(tei: TeiClient, qdrant: QdrantClient) -> Self {
        Self { tei, qdrant }
    }

    /// Build the TEI and Qdrant clients from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Http`] if an HTTP client cannot be built.
    pub fn from_config(config: &AssistantConfig) -> Result<Self, AssistantError> {
        Ok(Self::new(
            TeiClient::new(&config.tei_url, 120)?,
            QdrantClient::new(
                &config.qdrant_url,
                &config.qdrant_collection_prefix,
                config.embedding_dim,
            )?,
        ))
    }

    /// Make the collection for `kind` hold exactly `docs`.
    ///
    /// Documents whose stored `content_hash` matches are not re-embedded.
    /// Stored points with no document in `docs` (deleted or inactive rows)
    /// are removed.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Tei`] or [`AssistantError::Qdrant`] on
    /// service failure.
    pub async fn index(
        &self,
        kind: EntityKind,
        docs: &[IndexDocument],
    ) -> Result<IndexStats, AssistantError> {
        self.qdrant.ensure_collection(kind).await?;

        let ids: Vec<u64> = docs.iter().map(IndexDocument::point_id).collect();
        let mut stored = HashMap::new();
        for chunk in ids.chunks(LOOKUP_BATCH_SIZE) {
            stored.extend(self.qdrant.stored_hashes(kind, chunk).await?);
        }

        let changed: Vec<&IndexDocument> = docs
            .iter()
            .filter(|doc| stored.get(&doc.point_id()) != Some(&doc.content_hash()))
            .collect();
        let mut stats = IndexStats {
            unchanged: docs.len() - changed.len(),
            ..IndexStats::default()
        };

        for batch in changed.chunks(UPSERT_BATCH_SIZE) {
            let texts: Vec<&str> = batch.iter().map(|d| d.text.as_str()).collect();
            let vectors = self.tei.embed(&texts).await?;
            let points: Vec<Point> = batch
                .iter()
                .zip(vectors)
                .map(|(doc, vector)| Point {
                    id: doc.point_id(),
                    vector,
                    payload: doc.payload(),
                })
                .collect();
            self.qdrant.upsert(kind, &points).await?;
            stats.indexed += points.len();
        }

        let current: HashSet<u64> = ids.into_iter().collect();
        let stale_points: Vec<u64> = self
            .qdrant
            .point_ids(kind)
            .await?
            .into_iter()
            .filter(|id| !current.contains(id))
            .collect();
        for chunk in stale_points.chunks(LOOKUP_BATCH_SIZE) {
            self.qdrant.delete(kind, chunk).await?;
        }
        stats.deleted = stale_points.len();

        tracing::info!(
            kind = %kind,
            indexed = stats.indexed,
            unchanged = stats.unchanged,
            deleted = stats.deleted,
            "collection synced"
        );
        Ok(stats)
    }
}

/// Run an already-created index run to completion, recording the outcome in
/// `index_runs`.
///
/// # Errors
///
/// Returns the first [`AssistantError`] encountered. The run is marked
/// `failed` with the error message before returning.
pub async fn run_index(
    pool: &PgPool,
    indexer: &Indexer,
    run_id: i64,
    kinds: &[EntityKind],
) -> Result<IndexStats, AssistantError> {
    shopdb_db::start_index_run(pool, run_id).await?;

    let mut total = IndexStats::default();
    for &kind in kinds {
        let result = match collect_documents(pool, kind).await {
            Ok(docs) => indexer.index(kind, &docs).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(stats) => total.merge(stats),
            Err(e) => {
                tracing::error!(run_id, kind = %kind, error = %e, "index run failed");
                if let Err(mark_err) = shopdb_db::fail_index_run(pool, run_id, &e.to_string()).await
                {
                    tracing::error!(run_id, error = %mark_err, "failed to mark index run as failed");
                }
                return Err(e);
            }
        }
    }

    let records = i32::try_from(total.processed()).unwrap_or(i32::MAX);
    shopdb_db::complete_index_run(pool, run_id, records).await?;
    tracing::info!(
        run_id,
        indexed = total.indexed,
        unchanged = total.unchanged,
        deleted = total.deleted,
        "index run succeeded"
    );
    Ok(total)
}

/// Create an index run for `trigger_source` and execute it.
///
/// # Errors
///
/// Returns [`AssistantError::Db`] if the run cannot be created, or any error
/// from [`run_index`].
pub async fn run_full_index(
    pool: &PgPool,
    indexer: &Indexer,
    trigger_source: &str,
    kinds: &[EntityKind],
) -> Result<(i64, IndexStats), AssistantError> {
    let run = shopdb_db::create_index_run(pool, trigger_source).await?;
    let stats = run_index(pool, indexer, run.id, kinds).await?;
    Ok((run.id, stats))
}
