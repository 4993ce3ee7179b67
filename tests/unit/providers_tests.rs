/*!
 * Tests for the HTTP translation client against a loopback endpoint
 */

use review_translator::errors::ProviderError;
use review_translator::language_utils::LanguagePair;
use review_translator::providers::{TranslationProvider, TranslationRequest};

use crate::common::{self, FakeEndpoint};

fn request(text: &str, lang: Option<&str>) -> TranslationRequest {
    TranslationRequest {
        text: text.to_string(),
        language: LanguagePair::to_english(lang),
        api_key: "key-1".to_string(),
    }
}

#[tokio::test]
async fn test_yandexClient_withSuccessfulResponse_shouldReturnFirstText() {
    common::init_logging();
    let endpoint = FakeEndpoint::replying(200, r#"{"code":200,"lang":"fr-en","text":["Hello"]}"#).await;
    let client = common::yandex_client(&endpoint);

    let text = client.translate(&request("Bonjour", Some("fr"))).await.unwrap();

    assert_eq!(text, "Hello");
    assert_eq!(endpoint.request_count(), 1);
    assert_eq!(endpoint.query_param(0, "lang").as_deref(), Some("fr-en"));
    assert_eq!(endpoint.query_param(0, "key").as_deref(), Some("key-1"));
    assert_eq!(endpoint.query_param(0, "text").as_deref(), Some("Bonjour"));
}

#[tokio::test]
async fn test_yandexClient_withEmptyTextList_shouldFail() {
    let endpoint = FakeEndpoint::replying(200, r#"{"code":200,"lang":"fr-en","text":[]}"#).await;
    let client = common::yandex_client(&endpoint);

    let result = client.translate(&request("Bonjour", Some("fr"))).await;
    assert!(matches!(result, Err(ProviderError::EmptyTranslation)));
}

#[tokio::test]
async fn test_yandexClient_withDroppedConnections_shouldRetryThreeTimes() {
    let endpoint = FakeEndpoint::start(|_, _| None).await;
    let client = common::yandex_client(&endpoint);

    let result = client.translate(&request("Hallo", Some("de"))).await;

    assert!(matches!(result, Err(ProviderError::RequestFailed(_))));
    assert_eq!(endpoint.request_count(), 3);
}

#[tokio::test]
async fn test_yandexClient_withTransientFailure_shouldSucceedOnRetry() {
    let endpoint = FakeEndpoint::start(|number, _| {
        (number > 1).then(|| (200, r#"{"code":200,"lang":"de-en","text":["Hello"]}"#.to_string()))
    })
    .await;
    let client = common::yandex_client(&endpoint);

    assert_eq!(client.translate(&request("Hallo", Some("de"))).await.unwrap(), "Hello");
    assert_eq!(endpoint.request_count(), 2);
}

#[tokio::test]
async fn test_yandexClient_withErrorStatus_shouldNotRetryAndHideKey() {
    let endpoint = FakeEndpoint::replying(403, r#"{"code":403,"message":"API key is blocked"}"#).await;
    let client = common::yandex_client(&endpoint);

    let error = client.translate(&request("Hola", Some("es"))).await.unwrap_err();

    match &error {
        ProviderError::ApiError { status_code, message } => {
            assert_eq!(*status_code, 403);
            assert_eq!(message, "API key is blocked");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(endpoint.request_count(), 1);
    assert!(!error.to_string().contains("key-1"));
}

#[tokio::test]
async fn test_yandexClient_withMalformedBody_shouldReportParseError() {
    let endpoint = FakeEndpoint::replying(200, "<html>").await;
    let client = common::yandex_client(&endpoint);

    let result = client.translate(&request("Hola", None)).await;
    assert!(matches!(result, Err(ProviderError::ParseError(_))));
    assert_eq!(endpoint.query_param(0, "lang").as_deref(), Some("en"));
}

#[tokio::test]
async fn test_yandexClient_withUnreachableEndpoint_shouldSurfaceTransportErrorWithoutKey() {
    let endpoint = FakeEndpoint::replying(200, "{}").await;
    let url = endpoint.url.clone();
    drop(endpoint);
    // Give the aborted accept loop a moment to release the port.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let client = review_translator::providers::yandex::YandexClient::new(
        &url,
        Default::default(),
        review_translator::translation::RetryPolicy::immediate(2),
    )
    .unwrap();

    let error = client.translate(&request("Hola", Some("es"))).await.unwrap_err();
    assert!(matches!(error, ProviderError::RequestFailed(_)));
    assert!(!error.to_string().contains("key-1"));
}
