/*!
 * Broker abstraction for the consumer-group pipeline.
 *
 * The pipeline only talks to these traits, so it runs the same against
 * Kafka (`kafka`) and against the in-memory broker used by tests
 * (`memory`):
 * - `ConsumerGroup`: joins the group and drives one session generation per `consume` call
 * - `ConsumerGroupHandler`: setup / consume_claim / cleanup callbacks
 * - `GroupSession`: offset marking for the current generation
 * - `Claim`: ordered message stream of one partition
 * - `ChannelFactory` / `OutboundChannel`: per-publish producer channels
 */

use async_trait::async_trait;
use log::debug;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::errors::BrokerError;

/// Message received from a source topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Topic name
    pub topic: String,
    /// Partition
    pub partition: i32,
    /// Offset
    pub offset: i64,
    /// Raw payload, empty when the message carried none
    pub payload: Vec<u8>,
}

/// Broker acknowledgment of a published message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub partition: i32,
    pub offset: i64,
}

/// One generation of a consumer-group session
pub trait GroupSession: Send + Sync {
    /// Generation counter, incremented on every rebalance
    fn generation(&self) -> u64;

    /// Mark a message as processed so the group does not redeliver it
    fn mark_message(&self, message: &InboundMessage) -> Result<(), BrokerError>;
}

/// Messages of one partition assigned to this member for one generation
#[async_trait]
pub trait Claim: Send {
    fn topic(&self) -> &str;

    fn partition(&self) -> i32;

    /// Next message in partition order, `None` once the generation ends
    async fn next_message(&mut self) -> Option<InboundMessage>;
}

/// Consumer-group participant callbacks
#[async_trait]
pub trait ConsumerGroupHandler: Send + Sync {
    /// Called once a generation starts, before any claim is consumed
    async fn setup(&self, session: &dyn GroupSession) -> Result<(), BrokerError>;

    /// Called after every claim of the generation has returned
    async fn cleanup(&self, session: &dyn GroupSession) -> Result<(), BrokerError>;

    /// Process one claim; claims of the same generation run concurrently
    async fn consume_claim(&self, session: &dyn GroupSession, claim: &mut dyn Claim) -> Result<(), BrokerError>;
}

/// Consumer-group client
#[async_trait]
pub trait ConsumerGroup: Send + Sync {
    /// Join the group and run one session generation
    ///
    /// Returns `Ok(())` when the generation ends because of a rebalance, a
    /// failed claim or because `shutdown` was cancelled; callers loop to join
    /// the next generation. An `Err` is unrecoverable.
    async fn consume(
        &self,
        topics: &[String],
        handler: Arc<dyn ConsumerGroupHandler>,
        shutdown: CancellationToken,
    ) -> Result<(), BrokerError>;

    /// Leave the group and release the client
    async fn close(&self) -> Result<(), BrokerError>;
}

/// Producer channel dedicated to a single publish call
#[async_trait]
pub trait OutboundChannel: Send {
    /// Send one payload and wait for the broker acknowledgment
    async fn send(&mut self, topic: &str, payload: &[u8]) -> Result<Delivery, BrokerError>;

    /// Flush and release the channel
    async fn close(self: Box<Self>) -> Result<(), BrokerError>;
}

/// Opens outbound channels
#[async_trait]
pub trait ChannelFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn OutboundChannel>, BrokerError>;
}

/// Claim fed through a bounded channel by the consume loop
///
/// Ends when the feeding side is dropped or the generation token is
/// cancelled; cancellation wins over pending messages.
pub struct QueuedClaim {
    topic: String,
    partition: i32,
    messages: mpsc::Receiver<InboundMessage>,
    generation: CancellationToken,
}

impl QueuedClaim {
    /// Create a claim and the sender feeding it
    pub fn channel(
        topic: impl Into<String>,
        partition: i32,
        buffer: usize,
        generation: CancellationToken,
    ) -> (mpsc::Sender<InboundMessage>, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let claim = Self {
            topic: topic.into(),
            partition,
            messages: rx,
            generation,
        };
        (tx, claim)
    }
}

#[async_trait]
impl Claim for QueuedClaim {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn partition(&self) -> i32 {
        self.partition
    }

    async fn next_message(&mut self) -> Option<InboundMessage> {
        tokio::select! {
            biased;
            _ = self.generation.cancelled() => None,
            message = self.messages.recv() => message,
        }
    }
}

/// Hand a message to its claim, waiting for room while the generation lasts
///
/// Returns `false` when the message was not queued: the claim has ended or
/// the generation was cancelled while its buffer was full.
pub async fn feed_claim(
    feed: &mpsc::Sender<InboundMessage>,
    message: InboundMessage,
    generation: &CancellationToken,
) -> bool {
    let message = match feed.try_send(message) {
        Ok(()) => return true,
        Err(TrySendError::Closed(message)) => {
            debug!("[{}/{}/{}] Claim already ended", message.topic, message.partition, message.offset);
            return false;
        }
        Err(TrySendError::Full(message)) => message,
    };

    debug!(
        "Claim {}/{} is full ({} queued), waiting before polling again",
        message.topic,
        message.partition,
        feed.max_capacity()
    );
    tokio::select! {
        biased;
        _ = generation.cancelled() => false,
        sent = feed.send(message) => sent.is_ok(),
    }
}

pub mod kafka;
pub mod memory;
