use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssistantError {
    /// Network, TLS, or body-decoding failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TEI embed error: {0}")]
    Tei(String),

    #[error("Qdrant error: {0}")]
    Qdrant(String),

    /// HTTP 429 from a provider. `retry_after_secs` is 0 when no header was sent.
    #[error("rate limited by {service} (retry after {retry_after_secs}s)")]
    RateLimited {
        service: &'static str,
        retry_after_secs: u64,
    },

    #[error("unexpected HTTP status {status} from {service}: {body}")]
    UnexpectedStatus {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("model returned an empty completion")]
    EmptyCompletion,

    #[error("database error: {0}")]
    Db(#[from] shopdb_db::DbError),
}
