/*!
 * Provider implementations for the translation endpoint.
 *
 * This module contains the client used in production and a mock used by
 * tests:
 * - `yandex`: query-parameter HTTP translation API
 * - `mock`: scripted provider that records every request
 */

use async_trait::async_trait;
use std::fmt::Debug;

use crate::errors::ProviderError;
use crate::language_utils::LanguagePair;

/// One text to translate with one credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationRequest {
    /// Text to translate
    pub text: String,
    /// Language parameter, `"en"` or `"<source>-en"`
    pub language: LanguagePair,
    /// API key used for this call
    pub api_key: String,
}

/// Common trait for translation providers
///
/// Implementations build all request state per call; nothing except the
/// caller's credential rotation is shared between in-flight translations.
#[async_trait]
pub trait TranslationProvider: Send + Sync + Debug {
    /// Translate the request text, returning the first translation
    async fn translate(&self, request: &TranslationRequest) -> Result<String, ProviderError>;
}

pub mod mock;
pub mod yandex;
