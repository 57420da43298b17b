use std::sync::Arc;

use shopdb_assistant::{Assistant, AssistantConfig, ChatAnswer, ChatQuery};

/// Answer one question and print the answer with its sources.
///
/// # Errors
///
/// Returns an error if the locales file is invalid or a client cannot be
/// built. Provider failures are reported in the answer itself.
pub(crate) async fn run_ask(
    pool: &sqlx::PgPool,
    config: &shopdb_core::AppConfig,
    question: &str,
    user_id: Option<i64>,
    language: Option<String>,
) -> anyhow::Result<()> {
    let question = question.trim();
    if question.is_empty() {
        anyhow::bail!("question must not be empty");
    }

    let locales =
        shopdb_core::load_locales_or_builtin(&config.locales_path, &config.catalog_language)?;
    let assistant =
        Assistant::from_config(&AssistantConfig::from_app_config(config), Arc::new(locales))?;
    let catalog_names = shopdb_db::list_product_names(pool).await?;

    let query = ChatQuery {
        message: question.to_string(),
        language_hint: language,
        user_id,
        history: Vec::new(),
    };
    let answer = assistant.answer(&query, &catalog_names).await;

    print!("{}", render_answer(&answer));
    Ok(())
}

fn render_answer(answer: &ChatAnswer) -> String {
    let mut out = format!(
        "{}\n\n[language: {}, validation: {}]\n",
        answer.answer,
        answer.language,
        answer.validation.as_str()
    );
    if !answer.sources.is_empty() {
        out.push_str("sources:\n");
        for source in &answer.sources {
            out.push_str(&format!(
                "  {} #{} {} ({:.2})\n",
                source.kind, source.id, source.name, source.score
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopdb_assistant::{SourceRef, ValidationStatus};
    use shopdb_core::EntityKind;

    #[test]
    fn render_answer_lists_sources() {
        let answer = ChatAnswer {
            answer: "The Trail Runner costs 49.90 USD.".to_string(),
            language: "en".to_string(),
            sources: vec![SourceRef {
                kind: EntityKind::Product,
                id: 1,
                name: "Trail Runner".to_string(),
                score: 0.912,
            }],
            validation: ValidationStatus::Valid,
            raw_completion: None,
        };

        let rendered = render_answer(&answer);
        assert!(rendered.starts_with("The Trail Runner costs 49.90 USD.\n\n"));
        assert!(rendered.contains("[language: en, validation: valid]"));
        assert!(rendered.contains("  product #1 Trail Runner (0.91)\n"));
    }

    #[test]
    fn render_answer_omits_empty_source_list() {
        let answer = ChatAnswer {
            answer: "Sorry.".to_string(),
            language: "en".to_string(),
            sources: Vec::new(),
            validation: ValidationStatus::Unavailable,
            raw_completion: None,
        };

        assert!(!render_answer(&answer).contains("sources:"));
    }
}
