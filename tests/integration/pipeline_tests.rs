/*!
 * End-to-end tests of the consume -> translate -> publish pipeline against the
 * in-memory broker and a loopback translation endpoint
 */

use std::sync::Arc;

use review_translator::broker::memory::MemoryChannelFactory;
use review_translator::providers::mock::MockProvider;

use crate::common::{self, DESTINATION_TOPIC, FakeEndpoint, RunningPipeline, SOURCE_TOPIC};

#[tokio::test]
async fn test_pipeline_withFrenchReview_shouldPublishTranslationThenAcknowledge() {
    common::init_logging();
    let endpoint = FakeEndpoint::replying(200, r#"{"code":200,"lang":"fr-en","text":["Hello"]}"#).await;
    let translator = common::translation_service(Arc::new(common::yandex_client(&endpoint)), &["k1"]);
    let channels = MemoryChannelFactory::new();
    let group = common::memory_group();

    group.produce(
        SOURCE_TOPIC,
        0,
        r#"{"location":"L1","restaurant":"R1","review":{"text":"Bonjour","lang":"fr"}}"#,
    );

    let pipeline = RunningPipeline::start_default(group.clone(), common::processor(translator, &channels));

    assert!(common::eventually(|| group.committed(SOURCE_TOPIC, 0) == Some(1)).await);
    pipeline.shutdown().await.unwrap();

    assert_eq!(endpoint.request_count(), 1);
    assert_eq!(endpoint.query_param(0, "lang").as_deref(), Some("fr-en"));
    assert_eq!(endpoint.query_param(0, "text").as_deref(), Some("Bonjour"));

    let sent = channels.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, DESTINATION_TOPIC);
    assert_eq!(
        String::from_utf8(sent[0].1.clone()).unwrap(),
        r#"{"location":"L1","restaurant":"R1","review":{"text":"Bonjour","lang":"fr"},"translated":"Hello"}"#
    );
    assert_eq!(channels.opened(), channels.closed());
}

#[tokio::test]
async fn test_pipeline_withEmptyTranslation_shouldNotAcknowledge() {
    let endpoint = FakeEndpoint::replying(200, r#"{"code":200,"lang":"fr-en","text":[]}"#).await;
    let translator = common::translation_service(Arc::new(common::yandex_client(&endpoint)), &["k1"]);
    let channels = MemoryChannelFactory::new();
    let processor = common::processor(translator, &channels);
    let stats = Arc::clone(processor.stats());
    let group = common::memory_group();

    group.produce(SOURCE_TOPIC, 0, common::review_payload("Bonjour", "fr"));
    let pipeline = RunningPipeline::start_default(group.clone(), processor);

    assert!(common::eventually(|| stats.snapshot().translation_failures >= 1).await);
    pipeline.shutdown().await.unwrap();

    assert_eq!(group.committed(SOURCE_TOPIC, 0), None);
    assert!(channels.sent().is_empty());
    assert_eq!(channels.opened(), 0);
}

#[tokio::test]
async fn test_pipeline_withPublishFailure_shouldNotAcknowledge() {
    let channels = MemoryChannelFactory::new();
    channels.set_fail_sends(true);
    let translator = common::translation_service(Arc::new(MockProvider::working()), &["k1"]);
    let processor = common::processor(translator, &channels);
    let stats = Arc::clone(processor.stats());
    let group = common::memory_group();

    group.produce(SOURCE_TOPIC, 0, common::review_payload("Hallo", "de"));
    let pipeline = RunningPipeline::start_default(group.clone(), processor);

    assert!(common::eventually(|| stats.snapshot().publish_failures >= 1).await);
    pipeline.shutdown().await.unwrap();

    assert_eq!(group.committed(SOURCE_TOPIC, 0), None);
    assert_eq!(stats.snapshot().marked, 0);
    // The channel is released even though the send failed.
    assert!(channels.opened() >= 1);
    assert_eq!(channels.opened(), channels.closed());
}

#[tokio::test]
async fn test_pipeline_withUndecodableMessage_shouldProcessNextMessage() {
    let provider = MockProvider::working();
    let translator = common::translation_service(Arc::new(provider.clone()), &["k1"]);
    let channels = MemoryChannelFactory::new();
    let processor = common::processor(translator, &channels);
    let stats = Arc::clone(processor.stats());
    let group = common::memory_group();

    group.produce(SOURCE_TOPIC, 0, "{\"location\": ");
    group.produce(SOURCE_TOPIC, 0, Vec::new());
    group.produce(SOURCE_TOPIC, 0, common::review_payload("Gracias", "esMX"));
    let pipeline = RunningPipeline::start_default(group.clone(), processor);

    assert!(common::eventually(|| stats.snapshot().marked == 1).await);
    pipeline.shutdown().await.unwrap();

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.decode_failures, 2);
    assert_eq!(snapshot.published, 1);
    assert_eq!(group.committed(SOURCE_TOPIC, 0), Some(3));
    assert_eq!(provider.requests()[0].language.to_string(), "es-en");

    let published: serde_json::Value = serde_json::from_slice(&channels.sent()[0].1).unwrap();
    assert_eq!(published["translated"], "[es-en] Gracias");
}

#[tokio::test]
async fn test_pipeline_withRejectedFirstKey_shouldFallBackAndStayOnSecondKey() {
    let endpoint = FakeEndpoint::start(|_, target| {
        if target.contains("key=k1&") {
            Some((401, r#"{"code":401,"message":"API key is invalid"}"#.to_string()))
        } else {
            Some((200, r#"{"code":200,"lang":"it-en","text":["Delicious"]}"#.to_string()))
        }
    })
    .await;
    let translator = common::translation_service(Arc::new(common::yandex_client(&endpoint)), &["k1", "k2"]);
    let channels = MemoryChannelFactory::new();
    let group = common::memory_group();

    group.produce(SOURCE_TOPIC, 0, common::review_payload("Delizioso", "itCH"));
    group.produce(SOURCE_TOPIC, 0, common::review_payload("Buonissimo", "it"));
    let pipeline = RunningPipeline::start_default(group.clone(), common::processor(translator, &channels));

    assert!(common::eventually(|| group.committed(SOURCE_TOPIC, 0) == Some(2)).await);
    pipeline.shutdown().await.unwrap();

    let keys: Vec<String> = (0..endpoint.request_count())
        .filter_map(|i| endpoint.query_param(i, "key"))
        .collect();
    assert_eq!(keys, vec!["k1", "k2", "k2"]);
    assert_eq!(endpoint.query_param(0, "lang").as_deref(), Some("it-en"));
    assert_eq!(channels.sent().len(), 2);
}

#[tokio::test]
async fn test_pipeline_withEnglishReview_shouldRepublishWithoutCallingEndpoint() {
    let endpoint = FakeEndpoint::replying(500, "{}").await;
    let translator = common::translation_service(Arc::new(common::yandex_client(&endpoint)), &["k1"]);
    let channels = MemoryChannelFactory::new();
    let group = common::memory_group();

    group.produce(SOURCE_TOPIC, 0, common::review_payload("Best burger in town", "enUK"));
    let pipeline = RunningPipeline::start_default(group.clone(), common::processor(translator, &channels));

    assert!(common::eventually(|| group.committed(SOURCE_TOPIC, 0) == Some(1)).await);
    pipeline.shutdown().await.unwrap();

    assert_eq!(endpoint.request_count(), 0);
    let published: serde_json::Value = serde_json::from_slice(&channels.sent()[0].1).unwrap();
    assert_eq!(published["translated"], "Best burger in town");
}

#[tokio::test]
async fn test_pipeline_withSeveralPartitions_shouldKeepOrderWithinEachPartition() {
    let provider = MockProvider::working().with_custom_response(|request| request.text.clone());
    let translator = common::translation_service(Arc::new(provider), &["k1"]);
    let channels = MemoryChannelFactory::new();
    let group = common::memory_group();

    for i in 0..5 {
        group.produce(SOURCE_TOPIC, 0, common::review_payload(&format!("p0-{}", i), "fr"));
        group.produce(SOURCE_TOPIC, 1, common::review_payload(&format!("p1-{}", i), "fr"));
    }
    let pipeline = RunningPipeline::start_default(group.clone(), common::processor(translator, &channels));

    assert!(
        common::eventually(|| {
            group.committed(SOURCE_TOPIC, 0) == Some(5) && group.committed(SOURCE_TOPIC, 1) == Some(5)
        })
        .await
    );
    pipeline.shutdown().await.unwrap();

    let translated: Vec<String> = channels
        .sent()
        .iter()
        .map(|(_, payload)| {
            let value: serde_json::Value = serde_json::from_slice(payload).unwrap();
            value["translated"].as_str().unwrap_or_default().to_string()
        })
        .collect();

    for partition in ["p0", "p1"] {
        let order: Vec<&String> = translated.iter().filter(|t| t.starts_with(partition)).collect();
        let expected: Vec<String> = (0..5).map(|i| format!("{}-{}", partition, i)).collect();
        assert_eq!(order, expected.iter().collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn test_pipeline_withTransientOutage_shouldRedeliverFailedMessageBeforeLaterOnes() {
    let endpoint = FakeEndpoint::start(|number, _| {
        if number == 1 {
            Some((503, r#"{"code":503,"message":"Service unavailable"}"#.to_string()))
        } else {
            Some((200, r#"{"code":200,"lang":"fr-en","text":["Translated"]}"#.to_string()))
        }
    })
    .await;
    let translator = common::translation_service(Arc::new(common::yandex_client(&endpoint)), &["k1"]);
    let channels = MemoryChannelFactory::new();
    let processor = common::processor(translator, &channels);
    let stats = Arc::clone(processor.stats());
    let group = common::memory_group();

    group.produce(SOURCE_TOPIC, 0, common::review_payload("outage", "fr"));
    group.produce(SOURCE_TOPIC, 0, common::review_payload("fine", "fr"));
    let pipeline = RunningPipeline::start_default(group.clone(), processor);

    assert!(common::eventually(|| group.committed(SOURCE_TOPIC, 0) == Some(2)).await);
    pipeline.shutdown().await.unwrap();

    let texts: Vec<String> = (0..endpoint.request_count())
        .filter_map(|i| endpoint.query_param(i, "text"))
        .collect();
    assert_eq!(texts, vec!["outage", "outage", "fine"]);
    assert_eq!(stats.snapshot().translation_failures, 1);
    assert!(group.generations() >= 2);

    let published: Vec<serde_json::Value> = channels
        .sent()
        .iter()
        .map(|(_, payload)| serde_json::from_slice(payload).unwrap())
        .collect();
    assert_eq!(published.len(), 2);
    assert_eq!(published[0]["review"]["text"], "outage");
    assert_eq!(published[1]["review"]["text"], "fine");
}

#[tokio::test]
async fn test_pipeline_withPersistentFailure_shouldNeverAcknowledgeLaterMessages() {
    let endpoint = FakeEndpoint::start(|_, target| {
        if target.contains("text=outage") {
            Some((503, r#"{"code":503,"message":"Service unavailable"}"#.to_string()))
        } else {
            Some((200, r#"{"code":200,"lang":"fr-en","text":["Translated"]}"#.to_string()))
        }
    })
    .await;
    let translator = common::translation_service(Arc::new(common::yandex_client(&endpoint)), &["k1"]);
    let channels = MemoryChannelFactory::new();
    let processor = common::processor(translator, &channels);
    let stats = Arc::clone(processor.stats());
    let group = common::memory_group();

    group.produce(SOURCE_TOPIC, 0, common::review_payload("outage", "fr"));
    group.produce(SOURCE_TOPIC, 0, common::review_payload("fine", "fr"));
    let pipeline = RunningPipeline::start_default(group.clone(), processor);

    assert!(common::eventually(|| stats.snapshot().translation_failures >= 3).await);
    pipeline.shutdown().await.unwrap();

    assert_eq!(group.committed(SOURCE_TOPIC, 0), None);
    assert!(channels.sent().is_empty());
    assert!(
        (0..endpoint.request_count()).all(|i| endpoint.query_param(i, "text").as_deref() == Some("outage"))
    );
}
