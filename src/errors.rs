/*!
 * Error types for the review translator.
 *
 * This module contains custom error types for the different stages of the
 * consume → translate → publish pipeline, using the thiserror crate for
 * ergonomic error definitions.
 */

use thiserror::Error;

/// Errors raised while building or validating the worker configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required value was empty or missing
    #[error("Missing configuration value: {0}")]
    Missing(&'static str),

    /// The broker protocol version could not be parsed
    #[error("Invalid broker protocol version '{0}'")]
    InvalidVersion(String),

    /// The broker address could not be used
    #[error("Invalid broker address: {0}")]
    InvalidBrokerAddress(String),

    /// The translation endpoint is not a valid URL
    #[error("Invalid translation endpoint '{endpoint}': {message}")]
    InvalidEndpoint {
        /// Endpoint as configured
        endpoint: String,
        /// Parser message
        message: String,
    },

    /// Too many translation credentials were configured
    #[error("At most {max} translation API keys are supported, got {count}")]
    TooManyCredentials {
        /// Number of keys configured
        count: usize,
        /// Supported maximum
        max: usize,
    },
}

/// Errors that can occur when calling the translation endpoint
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Error when making an API request fails at the transport level
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code or the code reported in the response body
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// The endpoint answered without any translated text
    #[error("API returned no translated text")]
    EmptyTranslation,

    /// Error establishing the HTTP client
    #[error("Connection error: {0}")]
    ConnectionError(String),
}

/// Errors that can occur while translating a review
#[derive(Error, Debug)]
pub enum TranslationError {
    /// Error from the provider API with the only usable credential
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The fallback credential failed as well
    #[error("Translation failed with fallback credential #{credential}: {source}")]
    FallbackFailed {
        /// One-based number of the credential used for the final attempt
        credential: usize,
        /// Failure reported for that credential
        #[source]
        source: ProviderError,
    },
}

/// Errors converting between wire payloads and records
#[derive(Error, Debug)]
pub enum CodecError {
    /// The inbound message carried no payload
    #[error("Message has no payload")]
    EmptyPayload,

    /// The inbound payload is not a valid review record
    #[error("Failed to decode review record: {0}")]
    Decode(#[source] serde_json::Error),

    /// The outbound record could not be serialized
    #[error("Failed to encode translated record: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Errors reported by the message broker client
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Creating a consumer or producer failed
    #[error("Failed to create broker client: {0}")]
    Client(String),

    /// Subscribing to the source topics failed
    #[error("Failed to subscribe to {topics:?}: {message}")]
    Subscribe {
        /// Topics requested
        topics: Vec<String>,
        /// Broker message
        message: String,
    },

    /// An unrecoverable consumer error, the group client must be abandoned
    #[error("Fatal consumer error: {0}")]
    Fatal(String),

    /// Storing a processed offset failed
    #[error("Failed to mark offset {offset} on {topic}/{partition}: {message}")]
    Mark {
        /// Topic name
        topic: String,
        /// Partition number
        partition: i32,
        /// Offset that was being marked
        offset: i64,
        /// Broker message
        message: String,
    },

    /// Delivering a message failed
    #[error("Failed to deliver message to '{topic}': {message}")]
    Delivery {
        /// Destination topic
        topic: String,
        /// Broker message
        message: String,
    },

    /// Closing a client failed
    #[error("Failed to close broker client: {0}")]
    Close(String),

    /// A claim stopped on an unacknowledged message; the generation must
    /// end so the group resumes from the last marked offset
    #[error("Claim {topic}/{partition} stopped at offset {offset}: {reason}")]
    ClaimAborted {
        /// Topic name
        topic: String,
        /// Partition number
        partition: i32,
        /// Offset of the message that was not acknowledged
        offset: i64,
        /// Why processing stopped
        reason: String,
    },
}

/// Errors publishing a translated record
#[derive(Error, Debug)]
pub enum PublishError {
    /// No outbound channel could be opened
    #[error("Unable to open outbound channel: {0}")]
    Open(#[source] BrokerError),

    /// The channel was opened but the send failed
    #[error("Unable to send to '{destination}': {source}")]
    Send {
        /// Destination topic
        destination: String,
        /// Underlying broker failure
        #[source]
        source: BrokerError,
    },
}

/// Errors that abort the processing of one inbound message
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The inbound payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[source] CodecError),

    /// The review could not be translated
    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),

    /// The translated record could not be encoded
    #[error("Encode error: {0}")]
    Encode(#[source] CodecError),

    /// The translated record could not be published
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),
}

impl PipelineError {
    /// Whether redelivering the same message can never succeed
    pub fn is_permanent(&self) -> bool {
        matches!(self, PipelineError::Decode(_))
    }
}

/// Errors that end the supervisor and the process
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// The consume loop hit an unrecoverable broker error
    #[error("Consumer group failed: {0}")]
    Consumer(#[source] BrokerError),

    /// Closing the consumer group client failed
    #[error("Error closing client: {0}")]
    Close(#[source] BrokerError),

    /// The consume task panicked or was aborted
    #[error("Consume task terminated abnormally: {0}")]
    Task(String),
}
