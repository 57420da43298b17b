//! Qdrant vector store client with one collection per catalog entity kind.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use shopdb_core::EntityKind;

use crate::error::AssistantError;

const SCROLL_PAGE_SIZE: usize = 256;

/// Qdrant HTTP client.
#[derive(Debug, Clone)]
pub struct QdrantClient {
    client: reqwest::Client,
    base_url: String,
    collection_prefix: String,
    vector_dim: u64,
}

#[derive(Serialize)]
struct CreateCollectionRequest {
    vectors: VectorsConfig,
}

#[derive(Serialize)]
struct VectorsConfig {
    size: u64,
    distance: &'static str,
}

#[derive(Serialize)]
struct UpsertPointsRequest<'a> {
    points: &'a [Point],
}

/// A vector with its payload, ready to upsert.
#[derive(Debug, Clone, Serialize)]
pub struct Point {
    pub id: u64,
    pub vector: Vec<f32>,
    pub payload: HashMap<String, Value>,
}

/// A search hit.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoredPoint {
    pub id: u64,
    pub score: f32,
    #[serde(default)]
    pub payload: HashMap<String, Value>,
}

#[derive(Deserialize)]
struct QdrantResponse<T> {
    result: T,
}

#[derive(Deserialize)]
struct ScrollPage {
    points: Vec<PointId>,
    next_page_offset: Option<u64>,
}

#[derive(Deserialize)]
struct PointId {
    id: u64,
}

#[derive(Deserialize)]
struct StoredPoint {
    id: u64,
    #[serde(default)]
    payload: HashMap<String, Value>,
}

impl QdrantClient {
    /// Create a new `QdrantClient`.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Http`] if the HTTP client cannot be built.
    pub fn new(
        qdrant_url: &str,
        collection_prefix: &str,
        vector_dim: u64,
    ) -> Result<Self, AssistantError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: qdrant_url.trim_end_matches('/').to_string(),
            collection_prefix: collection_prefix.to_string(),
            vector_dim,
        })
    }

    /// Collection name for `kind`, e.g. `shopdb_products`.
    #[must_use]
    pub fn collection_name(&self, kind: EntityKind) -> String {
        format!("{}_{}", self.collection_prefix, kind.collection_suffix())
    }

    fn collection_url(&self, kind: EntityKind) -> String {
        format!("{}/collections/{}", self.base_url, self.collection_name(kind))
    }

    /// Ensure the collection for `kind` exists, creating it if absent.
    ///
    /// Uses cosine distance and the configured vector dimension.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Qdrant`] on network or API failure.
    pub async fn ensure_collection(&self, kind: EntityKind) -> Result<(), AssistantError> {
        let url = self.collection_url(kind);

        if let Ok(resp) = self.client.get(&url).send().await {
            if resp.status().is_success() {
                return Ok(());
            }
        }

        let body = CreateCollectionRequest {
            vectors: VectorsConfig {
                size: self.vector_dim,
                distance: "Cosine",
            },
        };

        let resp = self
            .client
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AssistantError::Qdrant(format!("collection create request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(AssistantError::Qdrant(format!(
                "collection create for {} returned status {}",
                self.collection_name(kind),
                resp.status()
            )));
        }

        tracing::info!(collection = %self.collection_name(kind), "created vector collection");
        Ok(())
    }

    /// Fetch the stored `content_hash` payload for each of `ids` that exists.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Qdrant`] on network or API failure.
    pub async fn stored_hashes(
        &self,
        kind: EntityKind,
        ids: &[u64],
    ) -> Result<HashMap<u64, String>, AssistantError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let resp = self
            .client
            .post(format!("{}/points", self.collection_url(kind)))
            .json(&json!({
                "ids": ids,
                "with_payload": ["content_hash"],
                "with_vector": false,
            }))
            .send()
            .await
            .map_err(|e| AssistantError::Qdrant(format!("point lookup request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(AssistantError::Qdrant(format!(
                "point lookup returned status {}",
                resp.status()
            )));
        }

        let body: QdrantResponse<Vec<StoredPoint>> = resp
            .json()
            .await
            .map_err(|e| AssistantError::Qdrant(format!("point lookup parse error: {e}")))?;

        Ok(body
            .result
            .into_iter()
            .filter_map(|p| {
                p.payload
                    .get("content_hash")
                    .and_then(Value::as_str)
                    .map(|h| (p.id, h.to_string()))
            })
            .collect())
    }

    /// List every point id stored in the collection for `kind`.
    ///
    /// Pages through `/points/scroll` without payloads or vectors. A missing
    /// collection has no points.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Qdrant`] on network or API failure.
    pub async fn point_ids(&self, kind: EntityKind) -> Result<Vec<u64>, AssistantError> {
        let url = format!("{}/points/scroll", self.collection_url(kind));
        let mut ids = Vec::new();
        let mut offset: Option<u64> = None;

        loop {
            let mut body = json!({
                "limit": SCROLL_PAGE_SIZE,
                "with_payload": false,
                "with_vector": false,
            });
            if let Some(offset) = offset {
                body["offset"] = json!(offset);
            }

            let resp = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| AssistantError::Qdrant(format!("scroll request failed: {e}")))?;

            if resp.status() == reqwest::StatusCode::NOT_FOUND {
                return Ok(ids);
            }
            if !resp.status().is_success() {
                return Err(AssistantError::Qdrant(format!(
                    "scroll returned status {}",
                    resp.status()
                )));
            }

            let page: QdrantResponse<ScrollPage> = resp
                .json()
                .await
                .map_err(|e| AssistantError::Qdrant(format!("scroll parse error: {e}")))?;
            ids.extend(page.result.points.into_iter().map(|p| p.id));

            match page.result.next_page_offset {
                Some(next) if offset != Some(next) => offset = Some(next),
                _ => return Ok(ids),
            }
        }
    }

    /// Upsert points into the collection for `kind`, waiting for the write.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Qdrant`] on network or API failure.
    pub async fn upsert(&self, kind: EntityKind, points: &[Point]) -> Result<(), AssistantError> {
        if points.is_empty() {
            return Ok(());
        }

        let resp = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url(kind)))
            .json(&UpsertPointsRequest { points })
            .send()
            .await
            .map_err(|e| AssistantError::Qdrant(format!("upsert request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(AssistantError::Qdrant(format!(
                "upsert returned status {}",
                resp.status()
            )));
        }

        Ok(())
    }

    /// Delete points by id from the collection for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Qdrant`] on network or API failure.
    pub async fn delete(&self, kind: EntityKind, ids: &[u64]) -> Result<(), AssistantError> {
        if ids.is_empty() {
            return Ok(());
        }

        let resp = self
            .client
            .post(format!("{}/points/delete?wait=true", self.collection_url(kind)))
            .json(&json!({ "points": ids }))
            .send()
            .await
            .map_err(|e| AssistantError::Qdrant(format!("delete request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(AssistantError::Qdrant(format!(
                "delete returned status {}",
                resp.status()
            )));
        }

        Ok(())
    }

    /// Cosine similarity search in the collection for `kind`.
    ///
    /// Hits scoring below `score_threshold` are dropped by Qdrant. With
    /// `user_id = Some(..)` only points whose `user_id` payload matches are
    /// returned. A missing collection yields no hits.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Qdrant`] on network or API failure.
    pub async fn search(
        &self,
        kind: EntityKind,
        vector: &[f32],
        limit: usize,
        score_threshold: f32,
        user_id: Option<i64>,
    ) -> Result<Vec<ScoredPoint>, AssistantError> {
        let mut body = json!({
            "vector": vector,
            "limit": limit,
            "score_threshold": score_threshold,
            "with_payload": true,
        });
        if let Some(user_id) = user_id {
            body["filter"] = json!({
                "must": [{ "key": "user_id", "match": { "value": user_id } }]
            });
        }

        let resp = self
            .client
            .post(format!("{}/points/search", self.collection_url(kind)))
            .json(&body)
            .send()
            .await
            .map_err(|e| AssistantError::Qdrant(format!("search request failed: {e}")))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            tracing::warn!(collection = %self.collection_name(kind), "collection missing, run the indexer");
            return Ok(Vec::new());
        }
        if !resp.status().is_success() {
            return Err(AssistantError::Qdrant(format!(
                "search returned status {}",
                resp.status()
            )));
        }

        let body: QdrantResponse<Vec<ScoredPoint>> = resp
            .json()
            .await
            .map_err(|e| AssistantError::Qdrant(format!("search parse error: {e}")))?;

        Ok(body.result)
    }
}

/// Derive a stable Qdrant point ID (u64) for a catalog entity.
///
/// Takes the first 8 bytes of SHA-256(`"{kind}:{id}"`) as a big-endian u64.
#[must_use]
pub fn entity_point_id(kind: EntityKind, id: i64) -> u64 {
    let hash = Sha256::digest(format!("{kind}:{id}").as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash[..8]);
    u64::from_be_bytes(bytes)
}
