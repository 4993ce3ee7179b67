/*!
 * Common test utilities for the review-translator test suite
 */

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use review_translator::broker::ConsumerGroup;
use review_translator::broker::memory::{MemoryChannelFactory, MemoryConsumerGroup};
use review_translator::errors::SupervisorError;
use review_translator::pipeline::{
    ConsumptionSession, MessageProcessor, PipelineStats, PipelineSupervisor, Publisher, SupervisorOptions,
};
use review_translator::providers::TranslationProvider;
use review_translator::providers::yandex::{ClientTimeouts, YandexClient};
use review_translator::translation::{CredentialRotation, RetryPolicy, TranslationService};

pub const SOURCE_TOPIC: &str = "reviews";
pub const DESTINATION_TOPIC: &str = "translated";

/// Route log output through the test harness
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Canned answer of the fake endpoint, `None` drops the connection
pub type Reply = Option<(u16, String)>;

type Responder = Arc<dyn Fn(usize, &str) -> Reply + Send + Sync>;

/// Loopback HTTP server standing in for the translation endpoint
///
/// The responder gets the 1-based request number and the request target
/// (path and query).
pub struct FakeEndpoint {
    pub url: String,
    targets: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl FakeEndpoint {
    pub async fn start<F>(responder: F) -> Self
    where
        F: Fn(usize, &str) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback listener");
        let address = listener.local_addr().expect("listener address");
        let targets = Arc::new(Mutex::new(Vec::new()));
        let responder: Responder = Arc::new(responder);

        let handle = {
            let targets = Arc::clone(&targets);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let targets = Arc::clone(&targets);
                    let responder = Arc::clone(&responder);
                    tokio::spawn(async move {
                        let _ = serve(stream, targets, responder).await;
                    });
                }
            })
        };

        Self {
            url: format!("http://{}/api/v1.5/tr.json/translate", address),
            targets,
            handle,
        }
    }

    /// Always answer with the given status and body
    pub async fn replying(status: u16, body: &str) -> Self {
        let body = body.to_string();
        Self::start(move |_, _| Some((status, body.clone()))).await
    }

    /// Request targets received so far
    pub fn targets(&self) -> Vec<String> {
        self.targets.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.targets.lock().len()
    }

    /// Value of a query parameter of the n-th request
    pub fn query_param(&self, index: usize, name: &str) -> Option<String> {
        let target = self.targets().get(index)?.clone();
        let url = url::Url::parse(&format!("http://localhost{}", target)).ok()?;
        url.query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }
}

impl Drop for FakeEndpoint {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(mut stream: TcpStream, targets: Arc<Mutex<Vec<String>>>, responder: Responder) -> std::io::Result<()> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buffer.windows(4).any(|window| window == b"\r\n\r\n") {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            return Ok(());
        }
        buffer.extend_from_slice(&chunk[..read]);
    }

    let head = String::from_utf8_lossy(&buffer).to_string();
    let target = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or_default()
        .to_string();

    let number = {
        let mut targets = targets.lock();
        targets.push(target.clone());
        targets.len()
    };

    let Some((status, body)) = responder(number, &target) else {
        return Ok(());
    };

    let response = format!(
        "HTTP/1.1 {} Fake\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

/// HTTP client pointed at a fake endpoint
pub fn yandex_client(endpoint: &FakeEndpoint) -> YandexClient {
    let timeouts = ClientTimeouts {
        connect: Duration::from_secs(2),
        request: Duration::from_secs(5),
        keep_alive: Duration::from_secs(10),
    };
    YandexClient::new(&endpoint.url, timeouts, RetryPolicy::default()).expect("client for fake endpoint")
}

pub fn translation_service(provider: Arc<dyn TranslationProvider>, keys: &[&str]) -> TranslationService {
    let rotation = CredentialRotation::new(keys.iter().map(|key| key.to_string()).collect()).expect("valid keys");
    TranslationService::new(provider, Arc::new(rotation))
}

/// Processor publishing into a memory channel factory
pub fn processor(translator: TranslationService, channels: &MemoryChannelFactory) -> MessageProcessor {
    MessageProcessor::new(
        translator,
        Publisher::new(Arc::new(channels.clone())),
        DESTINATION_TOPIC,
        Arc::new(PipelineStats::new()),
    )
}

pub fn review_payload(text: &str, lang: &str) -> String {
    serde_json::json!({
        "location": "L1",
        "restaurant": "R1",
        "review": { "text": text, "lang": lang }
    })
    .to_string()
}

pub fn memory_group() -> Arc<MemoryConsumerGroup> {
    Arc::new(MemoryConsumerGroup::new(16))
}

/// Poll `condition` until it holds or two seconds passed
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Supervisor running on a background task
pub struct RunningPipeline {
    pub token: CancellationToken,
    pub session: Arc<ConsumptionSession>,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<(), SupervisorError>>,
}

impl RunningPipeline {
    /// Start a supervisor consuming `SOURCE_TOPIC`
    pub fn start(group: Arc<dyn ConsumerGroup>, processor: MessageProcessor, options: SupervisorOptions) -> Self {
        let supervisor = PipelineSupervisor::new(group, processor, vec![SOURCE_TOPIC.to_string()], options);
        let token = supervisor.cancellation_token();
        let session = Arc::clone(supervisor.session());
        let (stop, stopped) = oneshot::channel::<()>();

        let handle = tokio::spawn(supervisor.run(async move {
            let _ = stopped.await;
        }));

        Self {
            token,
            session,
            stop: Some(stop),
            handle,
        }
    }

    /// Start with a short drain timeout and no statistics task
    pub fn start_default(group: Arc<dyn ConsumerGroup>, processor: MessageProcessor) -> Self {
        Self::start(
            group,
            processor,
            SupervisorOptions {
                drain_timeout: Some(Duration::from_secs(5)),
                stats_interval: None,
                rejoin_backoff: Duration::from_millis(10),
            },
        )
    }

    /// Deliver the shutdown signal and wait for the supervisor
    pub async fn shutdown(mut self) -> Result<(), SupervisorError> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.join().await
    }

    /// Wait for the supervisor to return on its own
    pub async fn join(self) -> Result<(), SupervisorError> {
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("supervisor did not stop in time")
            .expect("supervisor task panicked")
    }
}
