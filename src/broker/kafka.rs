//! Kafka implementation of the broker traits
//!
//! This module adapts rdkafka to the consumer-group contract of the
//! pipeline:
//! - Rebalance callbacks end the current generation
//! - One sequential claim task per assigned partition
//! - Offsets are stored explicitly and committed by the auto-commit timer
//! - A failed claim ends the generation and rewinds every partition it fed
//!   to the first unacknowledged offset
//! - One short-lived producer per publish call

use async_trait::async_trait;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, ConsumerContext, Rebalance, StreamConsumer};
use rdkafka::error::{KafkaError, KafkaResult};
use rdkafka::message::BorrowedMessage;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::util::Timeout;
use rdkafka::{ClientContext, Message, Offset, TopicPartitionList};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::app_config::{BrokerConfig, ProtocolVersion};
use crate::broker::{
    ChannelFactory, Claim, ConsumerGroup, ConsumerGroupHandler, Delivery, GroupSession, InboundMessage, OutboundChannel,
    QueuedClaim, feed_claim,
};
use crate::errors::{BrokerError, ConfigError};

/// Partition assignment change reported by librdkafka
#[derive(Debug, Clone, PartialEq, Eq)]
enum RebalanceEvent {
    Assigned(Vec<(String, i32)>),
    Revoked(Vec<(String, i32)>),
}

/// Consumer context forwarding rebalance callbacks to the consume loop
struct GroupContext {
    events: mpsc::UnboundedSender<RebalanceEvent>,
}

fn partitions(tpl: &TopicPartitionList) -> Vec<(String, i32)> {
    tpl.elements()
        .iter()
        .map(|elem| (elem.topic().to_string(), elem.partition()))
        .collect()
}

impl ClientContext for GroupContext {}

impl ConsumerContext for GroupContext {
    fn pre_rebalance(&self, rebalance: &Rebalance) {
        match rebalance {
            Rebalance::Revoke(tpl) => {
                info!("Partition revocation: {:?}", partitions(tpl));
                if tpl.count() > 0 {
                    let _ = self.events.send(RebalanceEvent::Revoked(partitions(tpl)));
                }
            }
            Rebalance::Assign(tpl) => {
                debug!("Partition assignment: {:?}", partitions(tpl));
            }
            Rebalance::Error(err) => {
                error!("Rebalance error: {}", err);
            }
        }
    }

    fn post_rebalance(&self, rebalance: &Rebalance) {
        match rebalance {
            Rebalance::Assign(tpl) => {
                info!("Successfully assigned partitions: {:?}", partitions(tpl));
                let _ = self.events.send(RebalanceEvent::Assigned(partitions(tpl)));
            }
            Rebalance::Revoke(_) => {
                info!("Partitions revoked successfully");
            }
            Rebalance::Error(err) => {
                error!("Post-rebalance error: {}", err);
            }
        }
    }

    fn commit_callback(&self, result: KafkaResult<()>, offsets: &TopicPartitionList) {
        match result {
            Ok(()) => debug!("Committed offsets for {:?}", partitions(offsets)),
            Err(KafkaError::ConsumerCommit(RDKafkaErrorCode::NoOffset)) => {}
            Err(err) => error!("Commit callback error: {}", err),
        }
    }
}

type GroupConsumer = StreamConsumer<GroupContext>;

const SEEK_TIMEOUT: Duration = Duration::from_secs(10);

fn apply_common_settings(client_config: &mut ClientConfig, config: &BrokerConfig, version: &ProtocolVersion) -> Result<(), ConfigError> {
    client_config
        .set("bootstrap.servers", config.bootstrap_servers()?)
        .set("socket.timeout.ms", (config.socket_timeout_secs * 1000).to_string())
        .set("broker.version.fallback", version.to_string())
        .set("api.version.request", version.supports_api_version_request().to_string());

    if let Some(sasl) = config.sasl.as_ref().filter(|sasl| !sasl.username.is_empty()) {
        client_config
            .set("security.protocol", "SASL_PLAINTEXT")
            .set("sasl.mechanisms", "PLAIN")
            .set("sasl.username", &sasl.username)
            .set("sasl.password", &sasl.password);
    }

    Ok(())
}

/// Client configuration of the group consumer
///
/// Offsets are only stored by `GroupSession::mark_message`; the
/// auto-commit timer then commits whatever was stored.
pub fn consumer_config(config: &BrokerConfig) -> Result<ClientConfig, ConfigError> {
    let version = config.protocol_version()?;
    let mut client_config = ClientConfig::new();

    client_config
        .set("group.id", &config.group_id)
        .set("enable.auto.commit", "true")
        .set("enable.auto.offset.store", "false")
        .set("auto.offset.reset", "earliest")
        .set("partition.assignment.strategy", "roundrobin")
        .set("enable.partition.eof", "false");

    apply_common_settings(&mut client_config, config, &version)?;
    Ok(client_config)
}

/// Client configuration of the per-publish producers
pub fn producer_config(config: &BrokerConfig) -> Result<ClientConfig, ConfigError> {
    let version = config.protocol_version()?;
    let mut client_config = ClientConfig::new();

    client_config
        .set("acks", "1")
        .set("message.send.max.retries", config.producer_retries.to_string())
        .set("message.timeout.ms", (config.send_timeout_secs * 1000).to_string());

    apply_common_settings(&mut client_config, config, &version)?;
    Ok(client_config)
}

fn to_inbound(message: &BorrowedMessage<'_>) -> InboundMessage {
    InboundMessage {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
    }
}

async fn receive(consumer: &GroupConsumer) -> KafkaResult<InboundMessage> {
    consumer.recv().await.map(|message| to_inbound(&message))
}

fn is_fatal(error: &KafkaError) -> bool {
    matches!(error.rdkafka_error_code(), Some(RDKafkaErrorCode::Fatal))
}

type PartitionKey = (String, i32);

/// Session handed to the handler for one generation
struct KafkaGroupSession {
    consumer: Arc<GroupConsumer>,
    generation: u64,
    /// Next unacknowledged offset of every partition fed this generation
    resume: Mutex<HashMap<PartitionKey, i64>>,
}

impl KafkaGroupSession {
    fn received(&self, message: &InboundMessage) {
        self.resume
            .lock()
            .entry((message.topic.clone(), message.partition))
            .or_insert(message.offset);
    }

    /// Move the fetch position back to the first unacknowledged offsets
    fn rewind(&self) -> Result<(), BrokerError> {
        for ((topic, partition), offset) in self.resume.lock().iter() {
            debug!("Rewinding {}/{} to offset {}", topic, partition, offset);
            self.consumer
                .seek(topic, *partition, Offset::Offset(*offset), Timeout::After(SEEK_TIMEOUT))
                .map_err(|e| BrokerError::Client(format!("Unable to rewind {}/{}: {}", topic, partition, e)))?;
        }
        Ok(())
    }
}

impl GroupSession for KafkaGroupSession {
    fn generation(&self) -> u64 {
        self.generation
    }

    fn mark_message(&self, message: &InboundMessage) -> Result<(), BrokerError> {
        let mark_error = |e: KafkaError| BrokerError::Mark {
            topic: message.topic.clone(),
            partition: message.partition,
            offset: message.offset,
            message: e.to_string(),
        };

        // Stored offsets point at the next message to consume.
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(&message.topic, message.partition, Offset::Offset(message.offset + 1))
            .map_err(mark_error)?;
        self.consumer.store_offsets(&offsets).map_err(mark_error)?;

        let mut resume = self.resume.lock();
        let next = resume
            .entry((message.topic.clone(), message.partition))
            .or_insert(message.offset + 1);
        *next = (*next).max(message.offset + 1);
        Ok(())
    }
}

/// Kafka consumer-group client
pub struct KafkaConsumerGroup {
    consumer: Arc<GroupConsumer>,
    events: tokio::sync::Mutex<mpsc::UnboundedReceiver<RebalanceEvent>>,
    subscription: Mutex<Vec<String>>,
    generation: AtomicU64,
    claim_buffer: usize,
}

impl KafkaConsumerGroup {
    /// Create the group consumer; nothing is joined until `consume`
    pub fn new(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let client_config = consumer_config(config).map_err(|e| BrokerError::Client(e.to_string()))?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let consumer: GroupConsumer = client_config
            .create_with_context(GroupContext { events: events_tx })
            .map_err(|e| BrokerError::Client(e.to_string()))?;

        Ok(Self {
            consumer: Arc::new(consumer),
            events: tokio::sync::Mutex::new(events_rx),
            subscription: Mutex::new(Vec::new()),
            generation: AtomicU64::new(0),
            claim_buffer: config.claim_buffer,
        })
    }

    fn ensure_subscribed(&self, topics: &[String]) -> Result<(), BrokerError> {
        let mut subscription = self.subscription.lock();
        if subscription.as_slice() == topics {
            return Ok(());
        }

        let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
        self.consumer
            .subscribe(&topic_refs)
            .map_err(|e| BrokerError::Subscribe {
                topics: topics.to_vec(),
                message: e.to_string(),
            })?;

        info!("Subscribed to topics: {:?}", topics);
        *subscription = topics.to_vec();
        Ok(())
    }
}

#[async_trait]
impl ConsumerGroup for KafkaConsumerGroup {
    async fn consume(
        &self,
        topics: &[String],
        handler: Arc<dyn ConsumerGroupHandler>,
        shutdown: CancellationToken,
    ) -> Result<(), BrokerError> {
        self.ensure_subscribed(topics)?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let group_session = Arc::new(KafkaGroupSession {
            consumer: Arc::clone(&self.consumer),
            generation,
            resume: Mutex::new(HashMap::new()),
        });
        let session: Arc<dyn GroupSession> = group_session.clone();
        let generation_token = shutdown.child_token();
        let claims = TaskTracker::new();
        let mut feeds: HashMap<PartitionKey, mpsc::Sender<InboundMessage>> = HashMap::new();
        let mut events = self.events.lock().await;
        let mut set_up = false;
        let mut aborted = false;

        let outcome = loop {
            tokio::select! {
                biased;
                _ = generation_token.cancelled() => {
                    if !shutdown.is_cancelled() {
                        info!("A claim stopped, ending generation {}", generation);
                        aborted = true;
                    }
                    break Ok(());
                }
                Some(event) = events.recv() => match event {
                    RebalanceEvent::Assigned(assigned) => {
                        if !set_up {
                            info!("Generation {} assigned {:?}", generation, assigned);
                            if let Err(e) = handler.setup(session.as_ref()).await {
                                break Err(e);
                            }
                            set_up = true;
                        }
                    }
                    RebalanceEvent::Revoked(revoked) => {
                        if set_up || !feeds.is_empty() {
                            info!("Rebalance revoked {:?}, ending generation {}", revoked, generation);
                            break Ok(());
                        }
                    }
                },
                received = receive(&self.consumer) => match received {
                    Ok(message) => {
                        if !set_up {
                            if let Err(e) = handler.setup(session.as_ref()).await {
                                break Err(e);
                            }
                            set_up = true;
                        }

                        let feed = feeds
                            .entry((message.topic.clone(), message.partition))
                            .or_insert_with(|| {
                                let (tx, mut claim) = QueuedClaim::channel(
                                    message.topic.clone(),
                                    message.partition,
                                    self.claim_buffer,
                                    generation_token.clone(),
                                );
                                let handler = Arc::clone(&handler);
                                let session = Arc::clone(&session);
                                let generation_token = generation_token.clone();
                                claims.spawn(async move {
                                    if let Err(e) = handler.consume_claim(session.as_ref(), &mut claim).await {
                                        error!("Claim {}/{} failed: {}", claim.topic(), claim.partition(), e);
                                        generation_token.cancel();
                                    }
                                });
                                tx
                            });

                        group_session.received(&message);
                        feed_claim(feed, message, &generation_token).await;
                    }
                    Err(e) if is_fatal(&e) => break Err(BrokerError::Fatal(e.to_string())),
                    Err(e) => warn!("Error polling message: {}", e),
                },
            }
        };

        generation_token.cancel();
        drop(feeds);
        claims.close();
        claims.wait().await;

        if set_up {
            if let Err(e) = handler.cleanup(session.as_ref()).await {
                warn!("Cleanup of generation {} failed: {}", generation, e);
            }
        }

        // No rebalance happened, so the consumer keeps its assignment and
        // would otherwise continue after the dropped messages.
        if aborted {
            group_session.rewind()?;
        }

        outcome
    }

    async fn close(&self) -> Result<(), BrokerError> {
        match self.consumer.commit_consumer_state(CommitMode::Sync) {
            Ok(()) | Err(KafkaError::ConsumerCommit(RDKafkaErrorCode::NoOffset)) => {}
            Err(e) => return Err(BrokerError::Close(e.to_string())),
        }

        self.consumer.unsubscribe();
        info!("Consumer group client closed");
        Ok(())
    }
}

/// Opens one producer per publish call
pub struct KafkaChannelFactory {
    config: ClientConfig,
    send_timeout: Duration,
}

impl KafkaChannelFactory {
    pub fn new(config: &BrokerConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            config: producer_config(config)?,
            send_timeout: Duration::from_secs(config.send_timeout_secs),
        })
    }
}

#[async_trait]
impl ChannelFactory for KafkaChannelFactory {
    async fn open(&self) -> Result<Box<dyn OutboundChannel>, BrokerError> {
        let producer: FutureProducer = self
            .config
            .create()
            .map_err(|e| BrokerError::Client(format!("Unable to create kafka producer: {}", e)))?;

        debug!("Created kafka producer");
        Ok(Box::new(KafkaChannel {
            producer,
            send_timeout: self.send_timeout,
        }))
    }
}

/// Producer owned by a single publish call
struct KafkaChannel {
    producer: FutureProducer,
    send_timeout: Duration,
}

#[async_trait]
impl OutboundChannel for KafkaChannel {
    async fn send(&mut self, topic: &str, payload: &[u8]) -> Result<Delivery, BrokerError> {
        let record = FutureRecord::<(), [u8]>::to(topic).payload(payload);

        match self.producer.send(record, Timeout::After(self.send_timeout)).await {
            Ok((partition, offset)) => Ok(Delivery { partition, offset }),
            Err((err, _)) => Err(BrokerError::Delivery {
                topic: topic.to_string(),
                message: err.to_string(),
            }),
        }
    }

    async fn close(self: Box<Self>) -> Result<(), BrokerError> {
        let KafkaChannel { producer, send_timeout } = *self;

        // flush blocks on librdkafka, and so does dropping the producer.
        tokio::task::spawn_blocking(move || producer.flush(Timeout::After(send_timeout)))
            .await
            .map_err(|e| BrokerError::Close(e.to_string()))?
            .map_err(|e| BrokerError::Close(e.to_string()))
    }
}
