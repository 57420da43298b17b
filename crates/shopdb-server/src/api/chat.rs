//! Shopper chat endpoints.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shopdb_assistant::{ChatAnswer, ChatQuery, ChatTurn, SourceRef, TurnRole, ValidationStatus};
use shopdb_db::{DbError, NewChatMessage};
use uuid::Uuid;

use crate::middleware::{RequestId, TrustedCaller};

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

pub(super) const MAX_MESSAGE_CHARS: usize = 2_000;

#[derive(Debug, Deserialize)]
pub(super) struct ChatRequest {
    pub message: String,
    pub session_id: Option<Uuid>,
    /// Shopper the request acts for. Ignored unless the caller is trusted.
    pub user_id: Option<i64>,
    /// Optional ISO 639 hint; detected from the message when absent.
    pub language: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct ChatReply {
    session_id: Uuid,
    answer: String,
    language: String,
    validation: ValidationStatus,
    sources: Vec<SourceRef>,
}

#[derive(Debug, Deserialize)]
pub(super) struct MessagesQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct ChatMessageItem {
    role: String,
    content: String,
    language: String,
    validation_status: Option<String>,
    sources: serde_json::Value,
    created_at: DateTime<Utc>,
}

fn validate_message(message: &str) -> Result<&str, &'static str> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Err("message must not be empty");
    }
    if trimmed.chars().count() > MAX_MESSAGE_CHARS {
        return Err("message must be at most 2000 characters");
    }
    Ok(trimmed)
}

/// Lowercased language hint; blank counts as absent.
fn validate_language(language: Option<&str>) -> Result<Option<String>, &'static str> {
    let Some(code) = language.map(str::trim).filter(|c| !c.is_empty()) else {
        return Ok(None);
    };
    let code = code.to_ascii_lowercase();
    if !shopdb_core::is_language_code(&code) {
        return Err("language must be a 2-3 letter language code");
    }
    Ok(Some(code))
}

pub(super) async fn post_chat(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(TrustedCaller(trusted)): Extension<TrustedCaller>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ApiResponse<ChatReply>>, ApiError> {
    let message = validate_message(&body.message)
        .map_err(|msg| ApiError::new(req_id.0.clone(), "validation_error", msg))?;
    let language_hint = validate_language(body.language.as_deref())
        .map_err(|msg| ApiError::new(req_id.0.clone(), "validation_error", msg))?;

    let user_id = body.user_id.filter(|_| trusted);
    if body.user_id.is_some() && user_id.is_none() {
        tracing::debug!(request_id = %req_id.0, "ignoring user_id from unauthenticated caller");
    }

    let mut query = ChatQuery {
        message: message.to_string(),
        language_hint,
        user_id,
        history: Vec::new(),
    };
    let language = state.assistant.resolve_language(&query);

    let session =
        shopdb_db::get_or_create_chat_session(&state.pool, body.session_id, user_id, &language)
            .await
            .map_err(|e| match e {
                DbError::NotFound => {
                    ApiError::new(req_id.0.clone(), "not_found", "chat session not found")
                }
                DbError::UnknownUser(_) => {
                    ApiError::new(req_id.0.clone(), "validation_error", "unknown user_id")
                }
                other => map_db_error(req_id.0.clone(), &other),
            })?;
    query.language_hint = Some(language);

    query.history = match shopdb_db::recent_chat_turns(&state.pool, session.id, state.history_turns)
        .await
    {
        Ok(rows) => rows
            .into_iter()
            .filter_map(|row| {
                TurnRole::parse(&row.role).map(|role| ChatTurn {
                    role,
                    content: row.content,
                })
            })
            .collect(),
        Err(e) => {
            tracing::warn!(error = %e, session_id = session.id, "failed to load chat history");
            Vec::new()
        }
    };

    let catalog_names = match shopdb_db::list_product_names(&state.pool).await {
        Ok(names) => names,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load catalog names for validation");
            Vec::new()
        }
    };

    let answer = state.assistant.answer(&query, &catalog_names).await;

    if let Err(e) = persist_exchange(&state, session.id, &query.message, &answer).await {
        tracing::error!(error = %e, session_id = session.id, "failed to persist chat exchange");
    }

    Ok(Json(ApiResponse {
        data: ChatReply {
            session_id: session.public_id,
            answer: answer.answer,
            language: answer.language,
            validation: answer.validation,
            sources: answer.sources,
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}

async fn persist_exchange(
    state: &AppState,
    session_id: i64,
    question: &str,
    answer: &ChatAnswer,
) -> Result<(), DbError> {
    shopdb_db::insert_chat_message(
        &state.pool,
        NewChatMessage {
            session_id,
            role: TurnRole::User.as_str(),
            content: question,
            language: &answer.language,
            validation_status: None,
            sources: serde_json::json!([]),
        },
    )
    .await?;

    shopdb_db::insert_chat_message(
        &state.pool,
        NewChatMessage {
            session_id,
            role: TurnRole::Assistant.as_str(),
            content: &answer.answer,
            language: &answer.language,
            validation_status: Some(answer.validation.as_str()),
            sources: serde_json::to_value(&answer.sources).unwrap_or_default(),
        },
    )
    .await?;

    Ok(())
}

/// Messages of a session, oldest first. Sessions owned by a user are only
/// listed for trusted callers.
pub(super) async fn list_session_messages(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(TrustedCaller(trusted)): Extension<TrustedCaller>,
    Path(session_id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<ApiResponse<Vec<ChatMessageItem>>>, ApiError> {
    let public_id = Uuid::parse_str(&session_id).map_err(|_| {
        ApiError::new(
            req_id.0.clone(),
            "validation_error",
            "session_id must be a UUID",
        )
    })?;

    let session = shopdb_db::get_chat_session(&state.pool, public_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .filter(|session| trusted || session.user_id.is_none())
        .ok_or_else(|| ApiError::new(req_id.0.clone(), "not_found", "chat session not found"))?;

    let rows = shopdb_db::list_chat_messages(&state.pool, session.id, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows
        .into_iter()
        .map(|row| ChatMessageItem {
            role: row.role,
            content: row.content,
            language: row.language,
            validation_status: row.validation_status,
            sources: row.sources,
            created_at: row.created_at,
        })
        .collect();

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::build_app;
    use crate::api::test_support::{lazy_pool, state_for};
    use crate::middleware::{AuthState, RateLimitState};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use std::time::Duration;
    use tower::ServiceExt;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn validate_message_trims_and_bounds_length() {
        assert_eq!(validate_message("  hi  "), Ok("hi"));
        assert!(validate_message(" \n ").is_err());
        assert!(validate_message(&"ß".repeat(MAX_MESSAGE_CHARS)).is_ok());
        assert!(validate_message(&"a".repeat(MAX_MESSAGE_CHARS + 1)).is_err());
    }

    #[test]
    fn validate_language_lowercases_and_checks_shape() {
        assert_eq!(validate_language(None), Ok(None));
        assert_eq!(validate_language(Some("  ")), Ok(None));
        assert_eq!(validate_language(Some(" DE ")), Ok(Some("de".to_string())));
        assert_eq!(validate_language(Some("fil")), Ok(Some("fil".to_string())));
        assert!(validate_language(Some("english")).is_err());
        assert!(validate_language(Some("pt-BR")).is_err());
        assert!(validate_language(Some("d")).is_err());
    }

    const STOREFRONT_KEY: &str = "storefront-key";

    fn app(state: AppState) -> axum::Router {
        build_app(
            state,
            AuthState::with_keys(std::iter::empty::<&str>()),
            RateLimitState::new(100, Duration::from_secs(60)),
        )
    }

    fn authenticated_app(state: AppState) -> axum::Router {
        build_app(
            state,
            AuthState::with_keys([STOREFRONT_KEY]),
            RateLimitState::new(100, Duration::from_secs(60)),
        )
    }

    fn post_json(body: &serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn post_json_as_storefront(body: &serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/chat")
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {STOREFRONT_KEY}"))
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn insert_user(pool: &sqlx::PgPool) -> i64 {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO users (email) VALUES ('shopper@example.com') RETURNING id",
        )
        .fetch_one(pool)
        .await
        .expect("insert user")
    }

    async fn session_owner(pool: &sqlx::PgPool, public_id: &str) -> Option<i64> {
        let public_id = Uuid::parse_str(public_id).expect("uuid");
        shopdb_db::get_chat_session(pool, public_id)
            .await
            .expect("query session")
            .expect("session exists")
            .user_id
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&body).expect("json parse")
    }

    async fn mount_assistant_backends(server: &MockServer, completion: &str) {
        Mock::given(method("POST"))
            .and(path("/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([[0.6, 0.8]])))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/collections/shop_products/points/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": [{
                    "id": 7,
                    "score": 0.9,
                    "payload": {
                        "kind": "product",
                        "entity_id": 1,
                        "name": "Trail Runner",
                        "text": "Trail Runner (category: Shoes). Price: 49.90 USD.",
                        "price": "49.90 USD"
                    }
                }]
            })))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/collections/shop_categories/points/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "result": [] })))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "content": completion } }]
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn oversized_message_is_a_validation_error() {
        let response = app(state_for(lazy_pool(), "http://127.0.0.1:1"))
            .oneshot(post_json(&serde_json::json!({
                "message": "x".repeat(MAX_MESSAGE_CHARS + 1)
            })))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["error"]["code"], "validation_error");
    }

    #[tokio::test]
    async fn malformed_language_is_a_validation_error() {
        let response = app(state_for(lazy_pool(), "http://127.0.0.1:1"))
            .oneshot(post_json(&serde_json::json!({
                "message": "hello",
                "language": "x".repeat(500)
            })))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["error"]["code"], "validation_error");
    }

    #[tokio::test]
    async fn malformed_session_id_is_rejected() {
        let response = app(state_for(lazy_pool(), "http://127.0.0.1:1"))
            .oneshot(
                Request::builder()
                    .uri("/api/v1/chat/sessions/not-a-uuid/messages")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn chat_answers_and_persists_both_turns(pool: sqlx::PgPool) {
        sqlx::query(
            "INSERT INTO products (name, slug, price) VALUES ('Trail Runner', 'trail-runner', 49.90)",
        )
        .execute(&pool)
        .await
        .expect("insert product");

        let server = MockServer::start().await;
        mount_assistant_backends(&server, "The Trail Runner costs 49.90 USD.").await;
        let app = app(state_for(pool, &server.uri()));

        let response = app
            .clone()
            .oneshot(post_json(&serde_json::json!({
                "message": "Do you have trail shoes?"
            })))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["data"]["answer"], "The Trail Runner costs 49.90 USD.");
        assert_eq!(json["data"]["language"], "en");
        assert_eq!(json["data"]["validation"], "valid");
        assert_eq!(json["data"]["sources"][0]["name"], "Trail Runner");
        let session_id = json["data"]["session_id"]
            .as_str()
            .expect("session id")
            .to_string();

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/v1/chat/sessions/{session_id}/messages"))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        let messages = json["data"].as_array().expect("data array");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"], "Do you have trail shoes?");
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[1]["validation_status"], "valid");
        assert_eq!(messages[1]["sources"][0]["id"], 1);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn unknown_session_is_not_found(pool: sqlx::PgPool) {
        let server = MockServer::start().await;
        mount_assistant_backends(&server, "unused").await;

        let response = app(state_for(pool, &server.uri()))
            .oneshot(post_json(&serde_json::json!({
                "message": "hello",
                "session_id": Uuid::new_v4(),
            })))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn anonymous_user_id_is_ignored(pool: sqlx::PgPool) {
        let user_id = insert_user(&pool).await;
        let server = MockServer::start().await;
        mount_assistant_backends(&server, "The Trail Runner costs 49.90 USD.").await;
        Mock::given(method("POST"))
            .and(path("/collections/shop_orders/points/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "result": [] })))
            .expect(0)
            .mount(&server)
            .await;

        let response = authenticated_app(state_for(pool.clone(), &server.uri()))
            .oneshot(post_json(&serde_json::json!({
                "message": "Where is my order?",
                "user_id": user_id
            })))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        let sources = json["data"]["sources"].as_array().expect("sources");
        assert!(sources.iter().all(|s| s["kind"] != "order"));
        let session_id = json["data"]["session_id"].as_str().expect("session id");
        assert_eq!(session_owner(&pool, session_id).await, None);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn trusted_caller_gets_order_context(pool: sqlx::PgPool) {
        let user_id = insert_user(&pool).await;
        let server = MockServer::start().await;
        mount_assistant_backends(&server, "Your order has shipped.").await;
        Mock::given(method("POST"))
            .and(path("/collections/shop_orders/points/search"))
            .and(body_partial_json(serde_json::json!({
                "filter": { "must": [{ "key": "user_id", "match": { "value": user_id } }] }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": [{
                    "id": 12,
                    "score": 0.95,
                    "payload": {
                        "kind": "order",
                        "entity_id": 77,
                        "name": "Order X",
                        "text": "Order X placed on 2026-03-01: status shipped, total 49.90 USD.",
                        "user_id": user_id
                    }
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let app = authenticated_app(state_for(pool.clone(), &server.uri()));
        let response = app
            .clone()
            .oneshot(post_json_as_storefront(&serde_json::json!({
                "message": "Where is my order?",
                "user_id": user_id
            })))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        let sources = json["data"]["sources"].as_array().expect("sources");
        assert!(sources.iter().any(|s| s["kind"] == "order" && s["id"] == 77));
        let session_id = json["data"]["session_id"]
            .as_str()
            .expect("session id")
            .to_string();
        assert_eq!(session_owner(&pool, &session_id).await, Some(user_id));

        let anonymous_history = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/v1/chat/sessions/{session_id}/messages"))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(anonymous_history.status(), StatusCode::NOT_FOUND);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn unknown_user_is_a_validation_error(pool: sqlx::PgPool) {
        let server = MockServer::start().await;
        mount_assistant_backends(&server, "unused").await;

        let response = authenticated_app(state_for(pool, &server.uri()))
            .oneshot(post_json_as_storefront(&serde_json::json!({
                "message": "Where is my order?",
                "user_id": 424_242
            })))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["error"]["code"], "validation_error");
    }
}
