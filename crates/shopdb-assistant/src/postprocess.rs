//! Cleanup of raw model output before validation.

use std::sync::LazyLock;

use regex::Regex;

static ROLE_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:assistant|ai|answer|response|bot)\s*:\s*").expect("valid regex")
});
static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^```[A-Za-z0-9_-]*\s*\n?(.*?)\n?\s*```$").expect("valid regex")
});
static EXTRA_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").expect("valid regex"));

const QUOTE_PAIRS: &[(char, char)] = &[
    ('"', '"'),
    ('\'', '\''),
    ('“', '”'),
    ('«', '»'),
    ('„', '“'),
];

/// Strip role prefixes, wrapping code fences and wrapping quotes, then
/// collapse runs of blank lines. Applying it twice yields the same string.
#[must_use]
pub fn clean_completion(raw: &str) -> String {
    let mut text = raw.trim().to_string();

    loop {
        let before = text.clone();

        text = ROLE_PREFIX.replace(&text, "").trim().to_string();
        if let Some(inner) = CODE_FENCE.captures(&text).and_then(|c| c.get(1)) {
            text = inner.as_str().trim().to_string();
        }
        text = strip_wrapping_quotes(&text).trim().to_string();

        if text == before {
            break;
        }
    }

    EXTRA_BLANK_LINES
        .replace_all(&text, "\n\n")
        .trim()
        .to_string()
}

fn strip_wrapping_quotes(text: &str) -> &str {
    for &(open, close) in QUOTE_PAIRS {
        if let Some(inner) = text
            .strip_prefix(open)
            .and_then(|rest| rest.strip_suffix(close))
        {
            // Only strip when the quotes wrap the whole text, not two quoted parts.
            if !inner.contains(open) && !inner.contains(close) {
                return inner;
            }
        }
    }
    text
}
