//! TEI (Text Embeddings Inference) client for query and document vectors.

use std::time::Duration;

use serde::Serialize;

use crate::error::AssistantError;

/// Maximum number of texts per /embed call.
const BATCH_SIZE: usize = 64;

/// TEI HTTP client.
#[derive(Debug, Clone)]
pub struct TeiClient {
    client: reqwest::Client,
    url: String,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [&'a str],
}

impl TeiClient {
    /// Create a new `TeiClient` for the server at `tei_url`.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Http`] if the HTTP client cannot be built.
    pub fn new(tei_url: &str, timeout_secs: u64) -> Result<Self, AssistantError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: format!("{}/embed", tei_url.trim_end_matches('/')),
        })
    }

    /// Generate embeddings for a batch of texts.
    ///
    /// Texts are batched into groups of [`BATCH_SIZE`] (64) per request.
    /// Returns one embedding vector per input text, in the same order.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Tei`] if a request fails, the response cannot
    /// be parsed, or TEI returns a different number of vectors than inputs.
    pub async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, AssistantError> {
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(BATCH_SIZE) {
            let request = EmbedRequest { inputs: chunk };
            let response = self
                .client
                .post(&self.url)
                .json(&request)
                .send()
                .await
                .map_err(|e| AssistantError::Tei(format!("TEI request failed: {e}")))?;

            if !response.status().is_success() {
                return Err(AssistantError::Tei(format!(
                    "TEI returned status {}",
                    response.status()
                )));
            }

            let embeddings: Vec<Vec<f32>> = response
                .json()
                .await
                .map_err(|e| AssistantError::Tei(format!("TEI response parse error: {e}")))?;

            if embeddings.len() != chunk.len() {
                return Err(AssistantError::Tei(format!(
                    "TEI returned {} embeddings for {} inputs",
                    embeddings.len(),
                    chunk.len()
                )));
            }

            all_embeddings.extend(embeddings);
        }

        Ok(all_embeddings)
    }

    /// Embed a single text.
    ///
    /// # Errors
    ///
    /// Same as [`TeiClient::embed`].
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, AssistantError> {
        self.embed(&[text])
            .await?
            .pop()
            .ok_or_else(|| AssistantError::Tei("TEI returned no embedding".to_string()))
    }
}
