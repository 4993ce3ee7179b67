/*!
 * Core translation service implementation.
 *
 * This module contains the TranslationService struct, which turns a review
 * into its English text: English reviews pass through untouched, anything
 * else goes to the provider with a single fallback to the next API key.
 */

use log::{debug, info, warn};
use std::sync::Arc;

use crate::errors::{ProviderError, TranslationError};
use crate::language_utils::{self, LanguagePair};
use crate::models::Review;
use crate::providers::{TranslationProvider, TranslationRequest};
use super::credentials::{Credential, CredentialRotation};

/// Translation service with credential fallback
#[derive(Debug, Clone)]
pub struct TranslationService {
    /// Provider performing the HTTP call
    provider: Arc<dyn TranslationProvider>,
    /// Shared rotation over the configured API keys
    credentials: Arc<CredentialRotation>,
}

impl TranslationService {
    /// Create a new translation service
    pub fn new(provider: Arc<dyn TranslationProvider>, credentials: Arc<CredentialRotation>) -> Self {
        Self { provider, credentials }
    }

    /// Credential rotation used by this service
    pub fn credentials(&self) -> &CredentialRotation {
        &self.credentials
    }

    /// Whether the review is already English and skips the provider
    pub fn is_passthrough(review: &Review) -> bool {
        language_utils::is_target_language(review.lang.trim())
    }

    /// Produce the English text of a review
    pub async fn translate(&self, review: &Review) -> Result<String, TranslationError> {
        if Self::is_passthrough(review) {
            debug!("Review already in English, skipping translation");
            return Ok(review.text.clone());
        }

        let language = LanguagePair::to_english(Some(review.lang.as_str()));
        let credential = self.credentials.current();

        let first_error = match self.call(review, &language, &credential).await {
            Ok(text) => return Ok(text),
            Err(e) => e,
        };

        let Some(next) = self.credentials.advance_from(credential.index) else {
            return Err(TranslationError::Provider(first_error));
        };

        warn!(
            "Translation with API key #{} failed ({}), switching to API key #{}",
            credential.number(),
            first_error,
            next.number()
        );

        self.call(review, &language, &next)
            .await
            .map_err(|source| TranslationError::FallbackFailed {
                credential: next.number(),
                source,
            })
    }

    async fn call(
        &self,
        review: &Review,
        language: &LanguagePair,
        credential: &Credential,
    ) -> Result<String, ProviderError> {
        let request = TranslationRequest {
            text: review.text.clone(),
            language: language.clone(),
            api_key: credential.key.clone(),
        };

        let translated = self.provider.translate(&request).await?;
        info!("Translated review ({}) with API key #{}", language, credential.number());
        Ok(translated)
    }
}
