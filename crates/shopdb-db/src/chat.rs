//! Database operations for `chat_sessions` and `chat_messages`.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChatSessionRow {
    pub id: i64,
    pub public_id: Uuid,
    pub user_id: Option<i64>,
    /// Language of the most recent user message.
    pub language: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChatMessageRow {
    pub id: i64,
    pub session_id: i64,
    /// `user` or `assistant`.
    pub role: String,
    pub content: String,
    pub language: String,
    /// `valid`, `fallback` or `unavailable`; `NULL` for user messages.
    pub validation_status: Option<String>,
    /// JSON array of the documents the answer was grounded on.
    pub sources: Value,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for [`insert_chat_message`].
#[derive(Debug, Clone)]
pub struct NewChatMessage<'a> {
    pub session_id: i64,
    pub role: &'a str,
    pub content: &'a str,
    pub language: &'a str,
    pub validation_status: Option<&'a str>,
    pub sources: Value,
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Look up a session by its public id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_chat_session(
    pool: &PgPool,
    public_id: Uuid,
) -> Result<Option<ChatSessionRow>, DbError> {
    let row = sqlx::query_as::<_, ChatSessionRow>(
        "SELECT id, public_id, user_id, language, created_at, updated_at \
         FROM chat_sessions \
         WHERE public_id = $1",
    )
    .bind(public_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Resume an existing session or start a new one.
///
/// With `public_id = Some(..)` the session must already exist; its language is
/// updated to `language`. A session owned by one user is not visible to a
/// caller acting as another user. An ownerless session is claimed by the first
/// `user_id` that resumes it. With `None` a new session is created.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] for an unknown or foreign `public_id`,
/// [`DbError::UnknownUser`] if `user_id` has no row in `users`, or
/// [`DbError::Sqlx`] if a query fails.
pub async fn get_or_create_chat_session(
    pool: &PgPool,
    public_id: Option<Uuid>,
    user_id: Option<i64>,
    language: &str,
) -> Result<ChatSessionRow, DbError> {
    if let Some(public_id) = public_id {
        let row = sqlx::query_as::<_, ChatSessionRow>(
            "UPDATE chat_sessions \
             SET language = $1, user_id = COALESCE(user_id, $2), updated_at = NOW() \
             WHERE public_id = $3 \
               AND (user_id IS NULL OR $2::BIGINT IS NULL OR user_id = $2) \
             RETURNING id, public_id, user_id, language, created_at, updated_at",
        )
        .bind(language)
        .bind(user_id)
        .bind(public_id)
        .fetch_optional(pool)
        .await
        .map_err(unknown_user(user_id))?
        .ok_or(DbError::NotFound)?;

        return Ok(row);
    }

    let row = sqlx::query_as::<_, ChatSessionRow>(
        "INSERT INTO chat_sessions (public_id, user_id, language) \
         VALUES ($1, $2, $3) \
         RETURNING id, public_id, user_id, language, created_at, updated_at",
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(language)
    .fetch_one(pool)
    .await
    .map_err(unknown_user(user_id))?;

    Ok(row)
}

/// Maps the `chat_sessions.user_id` foreign-key violation to
/// [`DbError::UnknownUser`].
fn unknown_user(user_id: Option<i64>) -> impl FnOnce(sqlx::Error) -> DbError {
    move |error| {
        if let (sqlx::Error::Database(db), Some(id)) = (&error, user_id) {
            if db.is_foreign_key_violation() {
                return DbError::UnknownUser(id);
            }
        }
        DbError::Sqlx(error)
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Append a message to a session and return its id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_chat_message(
    pool: &PgPool,
    message: NewChatMessage<'_>,
) -> Result<i64, DbError> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO chat_messages \
             (session_id, role, content, language, validation_status, sources) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING id",
    )
    .bind(message.session_id)
    .bind(message.role)
    .bind(message.content)
    .bind(message.language)
    .bind(message.validation_status)
    .bind(message.sources)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// The most recent `limit` messages of a session, returned oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_chat_messages(
    pool: &PgPool,
    session_id: i64,
    limit: i64,
) -> Result<Vec<ChatMessageRow>, DbError> {
    let rows = sqlx::query_as::<_, ChatMessageRow>(
        "SELECT id, session_id, role, content, language, validation_status, sources, created_at \
         FROM ( \
             SELECT id, session_id, role, content, language, validation_status, sources, created_at \
             FROM chat_messages \
             WHERE session_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2 \
         ) recent \
         ORDER BY created_at ASC, id ASC",
    )
    .bind(session_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// One prior exchange line fed back to the model as conversation history.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ChatTurnRow {
    pub role: String,
    pub content: String,
}

/// The most recent `limit` turns of a session for prompt history, oldest first.
///
/// Assistant replies marked `unavailable` carry no grounded content and are
/// skipped.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn recent_chat_turns(
    pool: &PgPool,
    session_id: i64,
    limit: i64,
) -> Result<Vec<ChatTurnRow>, DbError> {
    let rows = sqlx::query_as::<_, ChatTurnRow>(
        "SELECT role, content \
         FROM ( \
             SELECT id, role, content, created_at \
             FROM chat_messages \
             WHERE session_id = $1 \
               AND (validation_status IS NULL OR validation_status <> 'unavailable') \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2 \
         ) recent \
         ORDER BY created_at ASC, id ASC",
    )
    .bind(session_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
