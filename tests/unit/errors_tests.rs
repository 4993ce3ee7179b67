/*!
 * Tests for error types and conversions
 */

use review_translator::errors::{
    BrokerError, CodecError, ConfigError, PipelineError, ProviderError, PublishError, SupervisorError,
    TranslationError,
};
use std::error::Error;

#[test]
fn test_providerError_apiError_shouldDisplayStatusAndMessage() {
    let error = ProviderError::ApiError {
        status_code: 403,
        message: "API key is blocked".to_string(),
    };
    let display = format!("{}", error);
    assert!(display.contains("403"));
    assert!(display.contains("API key is blocked"));
}

#[test]
fn test_translationError_fromProviderError_shouldWrapCorrectly() {
    let error: TranslationError = ProviderError::EmptyTranslation.into();
    assert!(matches!(error, TranslationError::Provider(ProviderError::EmptyTranslation)));
    assert!(error.to_string().contains("no translated text"));
}

#[test]
fn test_translationError_fallbackFailed_shouldExposeSecondFailure() {
    let error = TranslationError::FallbackFailed {
        credential: 2,
        source: ProviderError::RequestFailed("timeout".to_string()),
    };
    assert!(error.to_string().contains("#2"));
    let source = error.source().map(|s| s.to_string()).unwrap_or_default();
    assert!(source.contains("timeout"));
}

#[test]
fn test_pipelineError_fromPublishError_shouldKeepDestination() {
    let error: PipelineError = PublishError::Send {
        destination: "translated".to_string(),
        source: BrokerError::Delivery {
            topic: "translated".to_string(),
            message: "broker down".to_string(),
        },
    }
    .into();

    assert!(matches!(error, PipelineError::Publish(_)));
    assert!(error.to_string().contains("translated"));
}

#[test]
fn test_codecError_emptyPayload_shouldDisplayCorrectly() {
    let error = PipelineError::Decode(CodecError::EmptyPayload);
    assert_eq!(error.to_string(), "Decode error: Message has no payload");
}

#[test]
fn test_brokerError_mark_shouldDisplayPosition() {
    let error = BrokerError::Mark {
        topic: "reviews".to_string(),
        partition: 2,
        offset: 41,
        message: "not assigned".to_string(),
    };
    assert_eq!(error.to_string(), "Failed to mark offset 41 on reviews/2: not assigned");
}

#[test]
fn test_supervisorError_close_shouldChainBrokerError() {
    let error = SupervisorError::Close(BrokerError::Close("timed out".to_string()));
    assert!(error.to_string().starts_with("Error closing client"));
    assert!(error.source().is_some());
}

#[test]
fn test_configError_tooManyCredentials_shouldDisplayLimit() {
    let error = ConfigError::TooManyCredentials { count: 6, max: 4 };
    assert_eq!(error.to_string(), "At most 4 translation API keys are supported, got 6");
}

#[test]
fn test_pipelineError_isPermanent_shouldOnlyHoldForDecodeFailures() {
    assert!(PipelineError::Decode(CodecError::EmptyPayload).is_permanent());

    let translation: PipelineError = TranslationError::Provider(ProviderError::EmptyTranslation).into();
    assert!(!translation.is_permanent());

    let publish: PipelineError = PublishError::Open(BrokerError::Client("down".to_string())).into();
    assert!(!publish.is_permanent());
}

#[test]
fn test_brokerError_claimAborted_shouldDisplayPositionAndReason() {
    let error = BrokerError::ClaimAborted {
        topic: "reviews".to_string(),
        partition: 1,
        offset: 7,
        reason: "Translation error: empty".to_string(),
    };
    assert_eq!(
        error.to_string(),
        "Claim reviews/1 stopped at offset 7: Translation error: empty"
    );
}
