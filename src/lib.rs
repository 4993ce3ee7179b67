/*!
 * # review-translator
 *
 * A streaming worker that consumes restaurant reviews from Kafka, translates
 * them into English and republishes the enriched record.
 *
 * ## Features
 *
 * - Consumer-group processing with at-least-once delivery: an offset is only
 *   marked after the translated record was acknowledged by the broker
 * - Query-parameter HTTP translation with bounded retries
 * - Sticky fallback across up to four API keys
 * - Regional language tags normalized to the endpoint's codes
 * - Graceful shutdown on SIGINT/SIGTERM with a bounded drain
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration, defaults and validation
 * - `broker`: Consumer-group and producer abstraction:
 *   - `broker::kafka`: rdkafka implementation
 *   - `broker::memory`: In-memory implementation for tests
 * - `codec`: JSON encoding of the inbound and outbound records
 * - `models`: Review records
 * - `translation`: English translation with credential fallback
 * - `providers`: Translation endpoint clients:
 *   - `providers::yandex`: Query-parameter HTTP client
 *   - `providers::mock`: Mock provider for tests
 * - `pipeline`: Consumption session, publisher and supervisor
 * - `language_utils`: Language tag normalization
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod broker;
pub mod codec;
pub mod errors;
pub mod language_utils;
pub mod models;
pub mod pipeline;
pub mod providers;
pub mod translation;

// Re-export main types for easier usage
pub use app_config::Config;
pub use models::{Review, ReviewRecord, TranslatedRecord};
pub use pipeline::{PipelineSupervisor, SupervisorOptions};
pub use translation::TranslationService;
