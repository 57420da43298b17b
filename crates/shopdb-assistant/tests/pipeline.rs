//! End-to-end tests for `Assistant::answer` against mocked TEI, Qdrant,
//! translation and chat model servers.

use std::sync::Arc;
use std::time::Duration;

use shopdb_assistant::{
    Assistant, ChatModelClient, ChatQuery, ChatTurn, ModelSettings, QdrantClient, Retriever,
    TeiClient, Translator, TurnRole, ValidationStatus,
};
use shopdb_core::{EntityKind, LocaleEntry, LocaleMessages, LocalesFile};
use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TRAIL_RUNNER_TEXT: &str =
    "Trail Runner (category: Shoes). Grippy sole. Price: 49.90 USD. In stock: 3.";

fn catalog() -> Vec<String> {
    vec!["Trail Runner".to_string(), "Cloud Racer".to_string()]
}

fn locales() -> Arc<LocalesFile> {
    let mut locales = LocalesFile::builtin();
    locales.languages.push(LocaleEntry {
        code: "de".to_string(),
        name: "German".to_string(),
        messages: LocaleMessages {
            fallback_intro: "Diese Produkte habe ich gefunden:".to_string(),
            no_results: "Dazu habe ich nichts gefunden.".to_string(),
            unavailable: "Der Assistent ist gerade nicht erreichbar.".to_string(),
        },
    });
    Arc::new(locales)
}

fn assistant(server: &MockServer, max_retries: u32) -> Assistant {
    assistant_with_translator(server, max_retries, Translator::disabled())
}

/// An assistant whose translator also points at `server`.
fn translating_assistant(server: &MockServer) -> Assistant {
    let translator = Translator::new(Some(&server.uri()), None, 5).expect("translator");
    assistant_with_translator(server, 0, translator)
}

fn assistant_with_translator(
    server: &MockServer,
    max_retries: u32,
    translator: Translator,
) -> Assistant {
    let retriever = Retriever::new(
        TeiClient::new(&server.uri(), 5).expect("tei"),
        QdrantClient::new(&server.uri(), "shop", 2).expect("qdrant"),
        3,
        0.3,
    );
    let llm = ChatModelClient::new(
        &server.uri(),
        None,
        5,
        ModelSettings {
            model: "test-model".to_string(),
            max_tokens: 256,
            temperature: 0.0,
            max_retries,
            retry_backoff_base_ms: 0,
            min_request_interval: Duration::ZERO,
        },
    )
    .expect("llm");
    Assistant::new(retriever, translator, llm, locales(), "Acme", "en")
}

async fn mount_embeddings(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([[0.6, 0.8]])))
        .mount(server)
        .await;
}

async fn mount_catalog_search(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/collections/shop_products/points/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "result": [{
                "id": 101,
                "score": 0.91,
                "payload": {
                    "kind": "product",
                    "entity_id": 1,
                    "name": "Trail Runner",
                    "text": TRAIL_RUNNER_TEXT,
                    "price": "49.90 USD"
                }
            }]
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/collections/shop_categories/points/search"))
        .and(body_partial_json(serde_json::json!({ "limit": 2 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "result": [] })))
        .mount(server)
        .await;
}

async fn mount_completion(server: &MockServer, text: &str) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": text } }]
        })))
        .mount(server)
        .await;
}

fn query(message: &str) -> ChatQuery {
    ChatQuery {
        message: message.to_string(),
        ..ChatQuery::default()
    }
}

#[tokio::test]
async fn grounded_answer_is_cleaned_and_returned() {
    let server = MockServer::start().await;
    mount_embeddings(&server).await;
    mount_catalog_search(&server).await;
    mount_completion(&server, "Assistant: \"The Trail Runner costs 49.90 USD.\"").await;

    let answer = assistant(&server, 0)
        .answer(&query("Do you have trail shoes?"), &catalog())
        .await;

    assert_eq!(answer.validation, ValidationStatus::Valid);
    assert_eq!(answer.answer, "The Trail Runner costs 49.90 USD.");
    assert_eq!(answer.language, "en");
    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].kind, EntityKind::Product);
    assert_eq!(answer.sources[0].id, 1);
}

#[tokio::test]
async fn prompt_carries_context_and_history() {
    let server = MockServer::start().await;
    mount_embeddings(&server).await;
    mount_catalog_search(&server).await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains(TRAIL_RUNNER_TEXT))
        .and(body_string_contains("Reply in English"))
        .and(body_partial_json(serde_json::json!({
            "messages": [
                { "role": "system" },
                { "role": "user", "content": "hi" },
                { "role": "assistant", "content": "Hello!" },
                { "role": "user", "content": "Do you have trail shoes?" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{ "message": { "content": "Yes, the Trail Runner." } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut q = query("Do you have trail shoes?");
    q.history = vec![
        ChatTurn {
            role: TurnRole::User,
            content: "hi".to_string(),
        },
        ChatTurn {
            role: TurnRole::Assistant,
            content: "Hello!".to_string(),
        },
    ];
    let answer = assistant(&server, 0).answer(&q, &catalog()).await;
    assert_eq!(answer.validation, ValidationStatus::Valid);
}

#[tokio::test]
async fn hallucinated_product_is_replaced_by_fallback_listing() {
    let server = MockServer::start().await;
    mount_embeddings(&server).await;
    mount_catalog_search(&server).await;
    mount_completion(&server, "You should try the Cloud Racer, it is our best shoe.").await;

    let answer = assistant(&server, 0)
        .answer(&query("Do you have trail shoes?"), &catalog())
        .await;

    assert_eq!(answer.validation, ValidationStatus::Fallback);
    assert_eq!(
        answer.answer,
        "Here are the products I found for your question:\n- Trail Runner (49.90 USD)"
    );
    assert_eq!(
        answer.raw_completion.as_deref(),
        Some("You should try the Cloud Racer, it is our best shoe.")
    );
}

#[tokio::test]
async fn fallback_uses_the_query_language() {
    let server = MockServer::start().await;
    mount_embeddings(&server).await;
    mount_catalog_search(&server).await;
    mount_completion(&server, "Der Cloud Racer ist ideal.").await;

    let answer = assistant(&server, 0)
        .answer(&query("Haben Sie Schuhe für mich?"), &catalog())
        .await;

    assert_eq!(answer.language, "de");
    assert_eq!(answer.validation, ValidationStatus::Fallback);
    assert!(answer.answer.starts_with("Diese Produkte habe ich gefunden:\n"));
}

#[tokio::test]
async fn generation_failure_returns_unavailable_message() {
    let server = MockServer::start().await;
    mount_embeddings(&server).await;
    mount_catalog_search(&server).await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let mut q = query("Do you have trail shoes?");
    q.language_hint = Some("DE".to_string());
    let answer = assistant(&server, 1).answer(&q, &catalog()).await;

    assert_eq!(answer.validation, ValidationStatus::Unavailable);
    assert_eq!(answer.language, "de");
    assert_eq!(answer.answer, "Der Assistent ist gerade nicht erreichbar.");
    assert!(answer.raw_completion.is_none());
    assert_eq!(answer.sources.len(), 1);
}

#[tokio::test]
async fn retrieval_failure_degrades_to_empty_context() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("(no matching catalog entries)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{ "message": { "content": "I don't know, sorry." } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let answer = assistant(&server, 0)
        .answer(&query("Do you have trail shoes?"), &catalog())
        .await;

    assert_eq!(answer.validation, ValidationStatus::Valid);
    assert_eq!(answer.answer, "I don't know, sorry.");
    assert!(answer.sources.is_empty());
}

#[tokio::test]
async fn orders_are_searched_only_for_known_users() {
    let server = MockServer::start().await;
    mount_embeddings(&server).await;
    mount_catalog_search(&server).await;
    mount_completion(&server, "Your order has shipped.").await;
    Mock::given(method("POST"))
        .and(path("/collections/shop_orders/points/search"))
        .and(body_partial_json(serde_json::json!({
            "filter": { "must": [{ "key": "user_id", "match": { "value": 42 } }] }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "result": [{
                "id": 900,
                "score": 0.95,
                "payload": {
                    "kind": "order",
                    "entity_id": 9,
                    "name": "Order 1",
                    "text": "Order 1 placed on 2026-03-01: status shipped, total 49.90 USD.",
                    "user_id": 42
                }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let assistant = assistant(&server, 0);
    let anonymous = assistant
        .answer(&query("Where is my order?"), &catalog())
        .await;
    assert!(anonymous.sources.iter().all(|s| s.kind != EntityKind::Order));

    let mut q = query("Where is my order?");
    q.user_id = Some(42);
    let known = assistant.answer(&q, &catalog()).await;
    assert_eq!(known.sources[0].kind, EntityKind::Order);
    assert_eq!(known.validation, ValidationStatus::Valid);
}

// ---------------------------------------------------------------------------
// Translation
// ---------------------------------------------------------------------------

const EN_FALLBACK_INTRO: &str = "Here are the products I found for your question:";

fn french_query(message: &str) -> ChatQuery {
    ChatQuery {
        message: message.to_string(),
        language_hint: Some("fr".to_string()),
        ..ChatQuery::default()
    }
}

#[tokio::test]
async fn context_is_translated_before_prompting() {
    let server = MockServer::start().await;
    mount_embeddings(&server).await;
    mount_catalog_search(&server).await;
    Mock::given(method("POST"))
        .and(path("/translate"))
        .and(body_partial_json(serde_json::json!({ "source": "en", "target": "fr" })))
        .and(body_string_contains(TRAIL_RUNNER_TEXT))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "translatedText": "Produits:\n- Trail Runner (categorie: Chaussures). Semelle adherente. Prix: 49.90 USD."
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("categorie: Chaussures"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{ "message": { "content": "Le Trail Runner coute 49.90 USD." } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let answer = translating_assistant(&server)
        .answer(&french_query("Avez-vous des chaussures de trail ?"), &catalog())
        .await;

    assert_eq!(answer.language, "fr");
    assert_eq!(answer.validation, ValidationStatus::Valid);
    assert_eq!(answer.answer, "Le Trail Runner coute 49.90 USD.");
}

#[tokio::test]
async fn fallback_messages_are_translated_for_unlisted_language() {
    let server = MockServer::start().await;
    mount_embeddings(&server).await;
    mount_catalog_search(&server).await;
    Mock::given(method("POST"))
        .and(path("/translate"))
        .and(body_partial_json(serde_json::json!({ "q": EN_FALLBACK_INTRO, "target": "fr" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "translatedText": "Voici les produits trouves pour votre question :"
        })))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/translate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "translatedText": "Texte traduit."
        })))
        .mount(&server)
        .await;
    mount_completion(&server, "You should try the Cloud Racer.").await;

    let answer = translating_assistant(&server)
        .answer(&french_query("Que me conseillez-vous ?"), &catalog())
        .await;

    assert_eq!(answer.validation, ValidationStatus::Fallback);
    assert_eq!(
        answer.answer,
        "Voici les produits trouves pour votre question :\n- Trail Runner (49.90 USD)"
    );
}

#[tokio::test]
async fn translation_outage_passes_text_through() {
    let server = MockServer::start().await;
    mount_embeddings(&server).await;
    mount_catalog_search(&server).await;
    Mock::given(method("POST"))
        .and(path("/translate"))
        .respond_with(ResponseTemplate::new(500).set_body_string("translator down"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains(TRAIL_RUNNER_TEXT))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{ "message": { "content": "You should try the Cloud Racer." } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let answer = translating_assistant(&server)
        .answer(&french_query("Que me conseillez-vous ?"), &catalog())
        .await;

    assert_eq!(answer.language, "fr");
    assert_eq!(answer.validation, ValidationStatus::Fallback);
    assert_eq!(
        answer.answer,
        format!("{EN_FALLBACK_INTRO}\n- Trail Runner (49.90 USD)")
    );
}
