/*!
 * Translation of review text into English.
 *
 * - `core`: Translation service with the English short-circuit and key fallback
 * - `credentials`: Sticky rotation over the configured API keys
 * - `retry`: Retry policy consumed by the HTTP provider
 */

// Re-export main types for easier usage
pub use self::core::TranslationService;
pub use self::credentials::{Credential, CredentialRotation};
pub use self::retry::{Backoff, RetryPolicy};

// Submodules
pub mod core;
pub mod credentials;
pub mod retry;
