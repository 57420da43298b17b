//! Lightweight query language detection.
//!
//! Non-Latin scripts are identified by Unicode block. Latin-script text is
//! scored against short per-language stop-word lists plus distinctive
//! diacritics. Words shared by several languages (`de`, `la`, `en`, `con`...)
//! are left out of every list so they never tip the balance.

/// Result of [`detect_language`].
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedLanguage {
    /// ISO 639-1 code.
    pub code: String,
    /// Share of the evidence supporting `code`, in [0, 1]. 0 when the default was used.
    pub confidence: f32,
}

const STOPWORDS: &[(&str, &[&str])] = &[
    (
        "en",
        &[
            "the", "and", "is", "are", "what", "do", "you", "have", "how", "much", "does", "with",
            "for", "my", "which", "where", "can", "any", "of", "to", "this", "it", "i", "show",
            "there", "your", "order", "cost",
        ],
    ),
    (
        "es",
        &[
            "el", "los", "las", "del", "hay", "tiene", "tienen", "cuánto", "cuanto", "cuesta",
            "por", "y", "dónde", "donde", "cuál", "tengo", "quiero", "está", "usted", "ustedes",
            "mis", "tienes",
        ],
    ),
    (
        "fr",
        &[
            "le", "les", "des", "est", "vous", "avez", "je", "une", "pour", "avec", "combien",
            "coûte", "quel", "quelle", "où", "mon", "mes", "et", "au", "sont", "ce", "cette",
            "dans", "ma", "commande",
        ],
    ),
    (
        "de",
        &[
            "der", "die", "das", "und", "ist", "ich", "habe", "haben", "sie", "nicht", "ein",
            "eine", "wie", "viel", "kostet", "für", "mit", "mein", "meine", "bestellung", "gibt",
            "welche", "wo",
        ],
    ),
    (
        "it",
        &[
            "gli", "sono", "è", "avete", "costa", "per", "di", "che", "questo", "mio", "mia",
            "ordine", "cosa", "ci", "della", "delle", "dove", "quale", "vorrei",
        ],
    ),
    (
        "pt",
        &[
            "o", "os", "você", "vocês", "tem", "têm", "não", "é", "meu", "minha", "da", "uma",
            "com", "qual", "onde", "custa", "são", "isso", "quero",
        ],
    ),
    (
        "nl",
        &[
            "het", "een", "ik", "wat", "hoeveel", "kost", "hebben", "jullie", "mijn",
            "bestelling", "niet", "van", "voor", "zijn", "met", "heeft", "hebt", "waar",
        ],
    ),
    (
        "pl",
        &[
            "jest", "nie", "czy", "ile", "kosztuje", "mam", "moje", "moja", "zamówienie", "się",
            "jak", "co", "na", "macie", "gdzie", "jaki",
        ],
    ),
];

fn diacritic_language(c: char) -> Option<&'static str> {
    match c {
        'ñ' | '¿' | '¡' => Some("es"),
        'ê' | 'œ' | 'ù' | 'î' => Some("fr"),
        'ß' | 'ä' | 'ö' | 'ü' => Some("de"),
        'ì' | 'ò' => Some("it"),
        'ã' | 'õ' => Some("pt"),
        'ł' | 'ą' | 'ę' | 'ś' | 'ź' | 'ż' | 'ć' | 'ń' => Some("pl"),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Script {
    Latin,
    Cyrillic,
    Greek,
    Arabic,
    Hebrew,
    Han,
    Kana,
    Hangul,
    Thai,
    Devanagari,
}

fn script_of(c: char) -> Option<Script> {
    let script = match u32::from(c) {
        0x0041..=0x005A | 0x0061..=0x007A | 0x00C0..=0x024F => Script::Latin,
        0x0370..=0x03FF => Script::Greek,
        0x0400..=0x04FF => Script::Cyrillic,
        0x0590..=0x05FF => Script::Hebrew,
        0x0600..=0x06FF => Script::Arabic,
        0x0900..=0x097F => Script::Devanagari,
        0x0E00..=0x0E7F => Script::Thai,
        0x3040..=0x30FF => Script::Kana,
        0x4E00..=0x9FFF => Script::Han,
        0xAC00..=0xD7AF | 0x1100..=0x11FF => Script::Hangul,
        _ => return None,
    };
    Some(script)
}

/// Detect the language of `text`, returning `default` when the evidence is
/// missing or tied.
#[must_use]
pub fn detect_language(text: &str, default: &str) -> DetectedLanguage {
    let fallback = || DetectedLanguage {
        code: default.to_string(),
        confidence: 0.0,
    };

    let mut counts: Vec<(Script, usize)> = Vec::new();
    let mut total = 0usize;
    for script in text.chars().filter_map(script_of) {
        total += 1;
        match counts.iter_mut().find(|(s, _)| *s == script) {
            Some((_, n)) => *n += 1,
            None => counts.push((script, 1)),
        }
    }
    if total == 0 {
        return fallback();
    }

    let count_of = |script: Script| {
        counts
            .iter()
            .find(|(s, _)| *s == script)
            .map_or(0, |(_, n)| *n)
    };

    // Japanese mixes kana with han; any kana means Japanese.
    if count_of(Script::Kana) > 0 {
        return scripted("ja", count_of(Script::Kana) + count_of(Script::Han), total);
    }

    let Some(&(dominant, dominant_count)) = counts.iter().max_by_key(|(_, n)| *n) else {
        return fallback();
    };

    let code = match dominant {
        Script::Latin => return detect_latin(text, default),
        Script::Cyrillic => {
            if text
                .chars()
                .any(|c| matches!(c, 'і' | 'ї' | 'є' | 'ґ' | 'І' | 'Ї' | 'Є' | 'Ґ'))
            {
                "uk"
            } else {
                "ru"
            }
        }
        Script::Greek => "el",
        Script::Arabic => "ar",
        Script::Hebrew => "he",
        Script::Han => "zh",
        Script::Kana => "ja",
        Script::Hangul => "ko",
        Script::Thai => "th",
        Script::Devanagari => "hi",
    };
    scripted(code, dominant_count, total)
}

#[allow(clippy::cast_precision_loss)]
fn scripted(code: &str, hits: usize, total: usize) -> DetectedLanguage {
    DetectedLanguage {
        code: code.to_string(),
        confidence: (hits as f32 / total as f32).min(1.0),
    }
}

fn detect_latin(text: &str, default: &str) -> DetectedLanguage {
    let lowered = text.to_lowercase();
    let mut scores: Vec<(&str, usize)> = STOPWORDS.iter().map(|(code, _)| (*code, 0)).collect();

    for word in lowered
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
    {
        for (i, (_, words)) in STOPWORDS.iter().enumerate() {
            if words.contains(&word) {
                scores[i].1 += 1;
            }
        }
    }

    for lang in lowered.chars().filter_map(diacritic_language) {
        if let Some(entry) = scores.iter_mut().find(|(code, _)| *code == lang) {
            entry.1 += 1;
        }
    }

    let total: usize = scores.iter().map(|(_, n)| n).sum();
    let best = scores.iter().map(|(_, n)| *n).max().unwrap_or(0);
    let leaders: Vec<&str> = scores
        .iter()
        .filter(|(_, n)| *n == best)
        .map(|(code, _)| *code)
        .collect();

    if best == 0 || leaders.len() > 1 {
        return DetectedLanguage {
            code: default.to_string(),
            confidence: 0.0,
        };
    }

    scripted(leaders[0], best, total)
}
