//! Machine translation with a safe pass-through fallback.
//!
//! Talks to a LibreTranslate-compatible `/translate` endpoint. Any failure
//! returns the input unchanged, so callers never need an error path.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use lru::LruCache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AssistantError;

const CACHE_CAPACITY: NonZeroUsize = NonZeroUsize::new(512).unwrap();

#[derive(Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

/// (source, target, SHA-256 of the text).
type CacheKey = (String, String, [u8; 32]);

/// Translation client. Disabled when no endpoint is configured.
#[derive(Debug)]
pub struct Translator {
    client: reqwest::Client,
    url: Option<String>,
    api_key: Option<String>,
    cache: Mutex<LruCache<CacheKey, String>>,
}

impl Translator {
    /// Create a translator for the endpoint at `base_url`; `None` disables translation.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Http`] if the HTTP client cannot be built.
    pub fn new(
        base_url: Option<&str>,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, AssistantError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            url: base_url.map(|u| format!("{}/translate", u.trim_end_matches('/'))),
            api_key,
            cache: Mutex::new(LruCache::new(CACHE_CAPACITY)),
        })
    }

    /// A translator that always returns its input.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            client: reqwest::Client::new(),
            url: None,
            api_key: None,
            cache: Mutex::new(LruCache::new(NonZeroUsize::MIN)),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }

    /// Translate `text` from `source` to `target`.
    ///
    /// Returns `text` unchanged when translation is disabled, the languages
    /// match, the text is blank, or the provider fails. Successful results
    /// are cached, so repeated calls return the same string.
    pub async fn translate(&self, text: &str, source: &str, target: &str) -> String {
        let Some(url) = self.url.as_deref() else {
            return text.to_string();
        };
        if text.trim().is_empty() || source.eq_ignore_ascii_case(target) {
            return text.to_string();
        }

        let mut digest = [0u8; 32];
        digest.copy_from_slice(&Sha256::digest(text.as_bytes()));
        let key: CacheKey = (source.to_ascii_lowercase(), target.to_ascii_lowercase(), digest);
        let cached = self.cache_lock().get(&key).cloned();
        if let Some(hit) = cached {
            return hit;
        }

        match self.request(url, text, &key.0, &key.1).await {
            Ok(translated) => {
                self.cache_lock().put(key, translated.clone());
                translated
            }
            Err(e) => {
                tracing::warn!(source, target, error = %e, "translation failed, using original text");
                text.to_string()
            }
        }
    }

    fn cache_lock(&self) -> MutexGuard<'_, LruCache<CacheKey, String>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn request(
        &self,
        url: &str,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, AssistantError> {
        let body = TranslateRequest {
            q: text,
            source,
            target,
            format: "text",
            api_key: self.api_key.as_deref(),
        };

        let response = self.client.post(url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AssistantError::UnexpectedStatus {
                service: "translate",
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let bytes = response.bytes().await?;
        let parsed: TranslateResponse =
            serde_json::from_slice(&bytes).map_err(|source| AssistantError::Deserialize {
                context: "translate response".to_string(),
                source,
            })?;

        if parsed.translated_text.trim().is_empty() {
            return Err(AssistantError::UnexpectedStatus {
                service: "translate",
                status: status.as_u16(),
                body: "empty translation".to_string(),
            });
        }
        Ok(parsed.translated_text)
    }
}
