//! Grounding checks on the cleaned model answer, and the fallback listing
//! used when an answer is rejected.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use shopdb_core::EntityKind;

use crate::types::RetrievedDoc;

static BOLD_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*\n]+?)\*\*").expect("valid regex"));

/// Names shorter than this are too ambiguous to match as mentions.
const MIN_NAME_CHARS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Nothing left after post-processing.
    Empty,
    /// Names a catalog product that was not retrieved.
    UnknownProduct,
    /// Emphasizes a proper-noun name that appears nowhere in the context.
    UnverifiedEntity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Valid,
    Rejected {
        reason: RejectReason,
        /// The offending names, as written in the catalog or the answer.
        unknown: Vec<String>,
    },
}

impl Validation {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Check `answer` against the retrieved documents.
///
/// `catalog_names` is every product name in the catalog. A catalog name
/// mentioned in the answer (whole word, case-insensitive) must also appear
/// among the retrieved documents or in `context`. Longer names are matched
/// first, so `Trail Runner Pro` is not excused by a retrieved `Trail Runner`.
#[must_use]
pub fn validate_answer(
    answer: &str,
    retrieved: &[RetrievedDoc],
    catalog_names: &[String],
    context: &str,
) -> Validation {
    if answer.trim().is_empty() {
        return Validation::Rejected {
            reason: RejectReason::Empty,
            unknown: Vec::new(),
        };
    }

    let grounding = grounding_text(retrieved, context);

    let mut candidates: Vec<&str> = catalog_names
        .iter()
        .map(String::as_str)
        .chain(retrieved.iter().map(|d| d.name.as_str()))
        .map(str::trim)
        .filter(|n| n.chars().count() >= MIN_NAME_CHARS)
        .collect();
    candidates.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    let mut seen = HashSet::new();
    candidates.retain(|n| seen.insert(n.to_lowercase()));

    let mut masked = answer.to_lowercase();
    let mut unknown = Vec::new();
    for name in candidates {
        let needle = name.to_lowercase();
        let hits = whole_word_matches(&masked, &needle);
        if hits.is_empty() {
            continue;
        }
        if whole_word_matches(&grounding, &needle).is_empty() {
            unknown.push(name.to_string());
        }
        for (start, end) in hits.into_iter().rev() {
            masked.replace_range(start..end, &" ".repeat(end - start));
        }
    }
    if !unknown.is_empty() {
        return Validation::Rejected {
            reason: RejectReason::UnknownProduct,
            unknown,
        };
    }

    let unverified: Vec<String> = BOLD_SPAN
        .captures_iter(answer)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|span| looks_like_proper_name(span))
        .filter(|span| !grounding.contains(&span.to_lowercase()))
        .map(str::to_string)
        .collect();
    if !unverified.is_empty() {
        return Validation::Rejected {
            reason: RejectReason::UnverifiedEntity,
            unknown: unverified,
        };
    }

    Validation::Valid
}

/// A plain-text answer listing the retrieved products, or `no_results` when
/// none were retrieved.
#[must_use]
pub fn fallback_listing(intro: &str, no_results: &str, retrieved: &[RetrievedDoc]) -> String {
    let lines: Vec<String> = retrieved
        .iter()
        .filter(|d| d.kind == EntityKind::Product && !d.name.trim().is_empty())
        .map(|d| match &d.price {
            Some(price) => format!("- {} ({price})", d.name.trim()),
            None => format!("- {}", d.name.trim()),
        })
        .collect();

    if lines.is_empty() {
        return no_results.to_string();
    }
    format!("{intro}\n{}", lines.join("\n"))
}

fn grounding_text(retrieved: &[RetrievedDoc], context: &str) -> String {
    let mut text = String::with_capacity(context.len() + retrieved.len() * 64);
    for doc in retrieved {
        text.push_str(&doc.name);
        text.push('\n');
        text.push_str(&doc.text);
        text.push('\n');
    }
    text.push_str(context);
    text.to_lowercase()
}

/// Two or more words, each starting with an uppercase letter or a digit.
fn looks_like_proper_name(span: &str) -> bool {
    let words: Vec<&str> = span.split_whitespace().collect();
    words.len() >= 2
        && words.iter().all(|w| {
            w.chars()
                .next()
                .is_some_and(|c| c.is_uppercase() || c.is_ascii_digit())
        })
        && words
            .first()
            .and_then(|w| w.chars().next())
            .is_some_and(char::is_uppercase)
}

/// Byte ranges of `needle` in `haystack` not adjacent to other alphanumerics.
fn whole_word_matches(haystack: &str, needle: &str) -> Vec<(usize, usize)> {
    if needle.is_empty() {
        return Vec::new();
    }
    haystack
        .match_indices(needle)
        .map(|(start, m)| (start, start + m.len()))
        .filter(|&(start, end)| {
            let before = haystack[..start].chars().next_back();
            let after = haystack[end..].chars().next();
            !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: i64, name: &str, price: &str) -> RetrievedDoc {
        RetrievedDoc {
            kind: EntityKind::Product,
            entity_id: id,
            name: name.to_string(),
            text: format!("{name}: running shoe. Price: {price}."),
            score: 0.8,
            price: Some(price.to_string()),
        }
    }

    fn catalog() -> Vec<String> {
        ["Trail Runner", "Trail Runner Pro", "Road Racer", "Go"]
            .iter()
            .map(|s| (*s).to_string())
            .collect()
    }

    #[test]
    fn accepts_answers_naming_retrieved_products() {
        let docs = vec![product(1, "Trail Runner", "49.90 USD")];
        let answer = "Yes! The trail runner costs 49.90 USD.";
        assert_eq!(validate_answer(answer, &docs, &catalog(), ""), Validation::Valid);
    }

    #[test]
    fn rejects_unretrieved_catalog_products() {
        let docs = vec![product(1, "Trail Runner", "49.90 USD")];
        let result = validate_answer(
            "Try the Trail Runner or the Road Racer.",
            &docs,
            &catalog(),
            "",
        );
        assert_eq!(
            result,
            Validation::Rejected {
                reason: RejectReason::UnknownProduct,
                unknown: vec!["Road Racer".to_string()],
            }
        );
    }

    #[test]
    fn longer_unknown_name_is_not_excused_by_a_shorter_known_one() {
        let docs = vec![product(1, "Trail Runner", "49.90 USD")];
        let result = validate_answer("The Trail Runner Pro is great.", &docs, &catalog(), "");
        assert!(matches!(
            result,
            Validation::Rejected { reason: RejectReason::UnknownProduct, ref unknown }
                if unknown == &vec!["Trail Runner Pro".to_string()]
        ));
    }

    #[test]
    fn names_are_matched_as_whole_words() {
        let docs = vec![product(1, "Trail Runner", "49.90 USD")];
        // "Go" is too short to track; "Road Racers" is not "Road Racer".
        let answer = "Go for the Trail Runner. Our Road Racers section is empty.";
        assert_eq!(validate_answer(answer, &docs, &catalog(), ""), Validation::Valid);
    }

    #[test]
    fn context_mentions_count_as_grounded() {
        let context = "Categories:\n- Shoes: includes Road Racer";
        let result = validate_answer("The Road Racer is in Shoes.", &[], &catalog(), context);
        assert_eq!(result, Validation::Valid);
    }

    #[test]
    fn rejects_empty_answers() {
        assert_eq!(
            validate_answer("   ", &[], &catalog(), ""),
            Validation::Rejected {
                reason: RejectReason::Empty,
                unknown: Vec::new(),
            }
        );
    }

    #[test]
    fn rejects_emphasized_names_not_in_context() {
        let docs = vec![product(1, "Trail Runner", "49.90 USD")];
        let result = validate_answer(
            "We recommend **Cloud Walker X** and **Trail Runner**.",
            &docs,
            &catalog(),
            "",
        );
        assert_eq!(
            result,
            Validation::Rejected {
                reason: RejectReason::UnverifiedEntity,
                unknown: vec!["Cloud Walker X".to_string()],
            }
        );
    }

    #[test]
    fn ordinary_emphasis_is_allowed() {
        let docs = vec![product(1, "Trail Runner", "49.90 USD")];
        let answer = "The Trail Runner is **in stock** and **Waterproof**.";
        assert_eq!(validate_answer(answer, &docs, &catalog(), ""), Validation::Valid);
    }

    #[test]
    fn fallback_lists_retrieved_products() {
        let mut category = product(9, "Shoes", "0");
        category.kind = EntityKind::Category;
        let mut unpriced = product(3, "Gift Card", "");
        unpriced.price = None;
        let docs = vec![
            product(1, "Trail Runner", "49.90 USD"),
            category,
            unpriced,
        ];
        assert_eq!(
            fallback_listing("Here is what I found:", "Nothing found.", &docs),
            "Here is what I found:\n- Trail Runner (49.90 USD)\n- Gift Card"
        );
    }

    #[test]
    fn fallback_without_products_uses_no_results() {
        assert_eq!(fallback_listing("Intro", "Nothing found.", &[]), "Nothing found.");
    }

    #[test]
    fn whole_word_matching_respects_boundaries() {
        assert_eq!(whole_word_matches("road racer, road racers", "road racer"), vec![(0, 10)]);
        assert!(whole_word_matches("abc", "").is_empty());
    }
}
