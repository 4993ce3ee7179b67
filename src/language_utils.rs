//! Language utilities for the translation endpoint
//!
//! Review sources tag languages with vendor-specific regional codes
//! (`zhCN`, `frCA`, `iw`, ...). The translation endpoint only understands
//! its own two-letter codes, so every source tag goes through this map
//! before a request is built.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;

/// Language every review is translated into
pub const TARGET_LANGUAGE: &str = "en";

static LANGUAGE_MAP: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("in", "id"),
        ("zhCN", "zh"),
        ("zhTW", "zh"),
        ("iw", "he"),
        ("aeAE", "ar"),
        ("enAU", "en"),
        ("enCA", "en"),
        ("enHK", "en"),
        ("enIN", "en"),
        ("enIE", "en"),
        ("enMY", "en"),
        ("enNZ", "en"),
        ("enPH", "en"),
        ("enSG", "en"),
        ("enZA", "en"),
        ("enUK", "en"),
        ("frBE", "fr"),
        ("frCA", "fr"),
        ("frCH", "fr"),
        ("deAT", "de"),
        ("itCH", "it"),
        ("ptPT", "pt"),
        ("esAR", "es"),
        ("esCO", "es"),
        ("esMX", "es"),
        ("esPE", "es"),
        ("esVE", "es"),
        ("esCL", "es"),
    ])
});

/// Look up the canonical endpoint code for a vendor tag
pub fn canonical_code(tag: &str) -> Option<&'static str> {
    LANGUAGE_MAP.get(tag).copied()
}

/// Normalize a source tag, falling back to the raw tag when it is unmapped
pub fn normalize_source_language(tag: &str) -> &str {
    canonical_code(tag).unwrap_or(tag)
}

/// Whether a review tagged with `tag` is already in the target language
pub fn is_target_language(tag: &str) -> bool {
    normalize_source_language(tag) == TARGET_LANGUAGE
}

/// Language parameter of a translation request
///
/// Renders as `"en"` when the source is unknown (the endpoint detects it)
/// and as `"<source>-en"` otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguagePair {
    source: Option<String>,
    target: &'static str,
}

impl LanguagePair {
    /// Build the pair for translating `source` into English
    ///
    /// Empty tags count as unknown.
    pub fn to_english(source: Option<&str>) -> Self {
        let source = source
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(|tag| normalize_source_language(tag).to_string());

        Self {
            source,
            target: TARGET_LANGUAGE,
        }
    }

    /// Canonical source code, if one was given
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Target code
    pub fn target(&self) -> &str {
        self.target
    }
}

impl fmt::Display for LanguagePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}-{}", source, self.target),
            None => write!(f, "{}", self.target),
        }
    }
}
