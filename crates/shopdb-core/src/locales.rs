//! Assistant locale file: per-language display names and default messages.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Default messages the assistant falls back to when it cannot produce a
/// grounded answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocaleMessages {
    /// Heading placed above the fallback product listing.
    pub fallback_intro: String,
    /// Shown when nothing relevant was retrieved.
    pub no_results: String,
    /// Shown when the generation provider could not be reached.
    pub unavailable: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocaleEntry {
    /// ISO 639-1 code, e.g. `en`.
    pub code: String,
    /// English display name used in prompts, e.g. `German`.
    pub name: String,
    pub messages: LocaleMessages,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalesFile {
    pub languages: Vec<LocaleEntry>,
}

impl LocalesFile {
    #[must_use]
    pub fn entry(&self, code: &str) -> Option<&LocaleEntry> {
        self.languages
            .iter()
            .find(|l| l.code.eq_ignore_ascii_case(code))
    }

    #[must_use]
    pub fn messages_for(&self, code: &str) -> Option<&LocaleMessages> {
        self.entry(code).map(|l| &l.messages)
    }

    /// Display name for `code`, or the code itself when the language is not listed.
    #[must_use]
    pub fn language_name<'a>(&'a self, code: &'a str) -> &'a str {
        self.entry(code).map_or(code, |l| l.name.as_str())
    }

    /// Built-in English-only locales, used when no file is configured.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            languages: vec![LocaleEntry {
                code: "en".to_string(),
                name: "English".to_string(),
                messages: LocaleMessages {
                    fallback_intro: "Here are the products I found for your question:".to_string(),
                    no_results: "I could not find anything in our catalog that matches your question."
                        .to_string(),
                    unavailable:
                        "The assistant is temporarily unavailable. Please try again in a moment."
                            .to_string(),
                },
            }],
        }
    }
}

/// Load and validate the locales file, requiring an entry for `catalog_language`.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_locales(path: &Path, catalog_language: &str) -> Result<LocalesFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::LocalesFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let locales: LocalesFile = serde_yaml::from_str(&content)?;
    validate_locales(&locales, catalog_language)?;

    Ok(locales)
}

/// Like [`load_locales`], but a missing file yields [`LocalesFile::builtin`].
///
/// # Errors
///
/// Returns `ConfigError` if an existing file cannot be read, parsed, or fails
/// validation.
pub fn load_locales_or_builtin(
    path: &Path,
    catalog_language: &str,
) -> Result<LocalesFile, ConfigError> {
    if path.exists() {
        return load_locales(path, catalog_language);
    }

    tracing::warn!(
        path = %path.display(),
        "locales file not found; using built-in English messages"
    );
    Ok(LocalesFile::builtin())
}

/// A language code is 2-3 lowercase ASCII letters (`en`, `de`, `fil`).
#[must_use]
pub fn is_language_code(code: &str) -> bool {
    (2..=3).contains(&code.len()) && code.chars().all(|c| c.is_ascii_lowercase())
}

fn validate_locales(locales: &LocalesFile, catalog_language: &str) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for entry in &locales.languages {
        if !is_language_code(&entry.code) {
            return Err(ConfigError::Validation(format!(
                "language code '{}' must be 2-3 lowercase ASCII letters",
                entry.code
            )));
        }

        if !seen.insert(entry.code.clone()) {
            return Err(ConfigError::Validation(format!(
                "duplicate language code: '{}'",
                entry.code
            )));
        }

        if entry.name.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "language '{}' has an empty name",
                entry.code
            )));
        }

        let m = &entry.messages;
        for (field, value) in [
            ("fallback_intro", &m.fallback_intro),
            ("no_results", &m.no_results),
            ("unavailable", &m.unavailable),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "language '{}' has an empty {field} message",
                    entry.code
                )));
            }
        }
    }

    if !seen.contains(catalog_language) {
        return Err(ConfigError::Validation(format!(
            "locales must include the catalog language '{catalog_language}'"
        )));
    }

    Ok(())
}
