/*!
 * In-memory broker used by tests and local runs.
 *
 * `MemoryConsumerGroup` keeps an append-only log per partition and the
 * committed position of the group. Every generation starts each claim at
 * the committed position, so unmarked messages come back after a
 * rebalance the same way they would with a real broker.
 */

use async_trait::async_trait;
use log::{debug, error, info};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{Notify, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::broker::{
    ChannelFactory, Claim, ConsumerGroup, ConsumerGroupHandler, Delivery, GroupSession, InboundMessage, OutboundChannel,
    QueuedClaim, feed_claim,
};
use crate::errors::BrokerError;

type PartitionKey = (String, i32);

#[derive(Debug, Default)]
struct GroupState {
    logs: BTreeMap<PartitionKey, Vec<InboundMessage>>,
    committed: HashMap<PartitionKey, i64>,
    pending_failure: Option<BrokerError>,
    fail_close: bool,
}

/// In-memory consumer group with a single member
#[derive(Debug)]
pub struct MemoryConsumerGroup {
    state: Arc<Mutex<GroupState>>,
    appended: Notify,
    current: Mutex<Option<CancellationToken>>,
    generations: AtomicU64,
    closed: AtomicBool,
    claim_buffer: usize,
}

impl Default for MemoryConsumerGroup {
    fn default() -> Self {
        Self::new(16)
    }
}

impl MemoryConsumerGroup {
    pub fn new(claim_buffer: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(GroupState::default())),
            appended: Notify::new(),
            current: Mutex::new(None),
            generations: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            claim_buffer,
        }
    }

    /// Append a message to a partition and return its offset
    pub fn produce(&self, topic: &str, partition: i32, payload: impl Into<Vec<u8>>) -> i64 {
        let offset = {
            let mut state = self.state.lock();
            let log = state.logs.entry((topic.to_string(), partition)).or_default();
            let offset = log.len() as i64;
            log.push(InboundMessage {
                topic: topic.to_string(),
                partition,
                offset,
                payload: payload.into(),
            });
            offset
        };

        self.appended.notify_waiters();
        offset
    }

    /// End the running generation as if the group rebalanced
    pub fn trigger_rebalance(&self) {
        if let Some(token) = self.current.lock().as_ref() {
            info!("Triggering rebalance");
            token.cancel();
        }
    }

    /// Make the running (or next) `consume` call fail with `error`
    pub fn fail_next(&self, error: BrokerError) {
        self.state.lock().pending_failure = Some(error);
        self.appended.notify_waiters();
    }

    /// Make `close` fail
    pub fn fail_close(&self) {
        self.state.lock().fail_close = true;
    }

    /// Next offset the group resumes from, if anything was marked
    pub fn committed(&self, topic: &str, partition: i32) -> Option<i64> {
        self.state.lock().committed.get(&(topic.to_string(), partition)).copied()
    }

    /// Number of generations started so far
    pub fn generations(&self) -> u64 {
        self.generations.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn take_new_messages(&self, topics: &[String], positions: &mut HashMap<PartitionKey, i64>) -> Vec<InboundMessage> {
        let state = self.state.lock();
        let mut batch = Vec::new();

        for (key, log) in state.logs.iter().filter(|(key, _)| topics.contains(&key.0)) {
            let position = positions
                .entry(key.clone())
                .or_insert_with(|| state.committed.get(key).copied().unwrap_or(0));
            let start = (*position).max(0) as usize;
            if start < log.len() {
                batch.extend_from_slice(&log[start..]);
                *position = log.len() as i64;
            }
        }

        batch
    }
}

#[derive(Debug)]
struct MemorySession {
    state: Arc<Mutex<GroupState>>,
    generation: u64,
}

impl GroupSession for MemorySession {
    fn generation(&self) -> u64 {
        self.generation
    }

    fn mark_message(&self, message: &InboundMessage) -> Result<(), BrokerError> {
        let mut state = self.state.lock();
        let next = message.offset + 1;
        let committed = state
            .committed
            .entry((message.topic.clone(), message.partition))
            .or_insert(next);
        *committed = (*committed).max(next);
        Ok(())
    }
}

#[async_trait]
impl ConsumerGroup for MemoryConsumerGroup {
    async fn consume(
        &self,
        topics: &[String],
        handler: Arc<dyn ConsumerGroupHandler>,
        shutdown: CancellationToken,
    ) -> Result<(), BrokerError> {
        if self.is_closed() {
            return Err(BrokerError::Client("consumer group is closed".to_string()));
        }
        if let Some(err) = self.state.lock().pending_failure.take() {
            return Err(err);
        }

        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        let session: Arc<dyn GroupSession> = Arc::new(MemorySession {
            state: Arc::clone(&self.state),
            generation,
        });
        handler.setup(session.as_ref()).await?;

        let generation_token = shutdown.child_token();
        *self.current.lock() = Some(generation_token.clone());
        debug!("Generation {} started", generation);

        let claims = TaskTracker::new();
        let mut feeds: HashMap<PartitionKey, mpsc::Sender<InboundMessage>> = HashMap::new();
        let mut positions = HashMap::new();

        let outcome = loop {
            let notified = self.appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(err) = self.state.lock().pending_failure.take() {
                break Err(err);
            }

            for message in self.take_new_messages(topics, &mut positions) {
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
                                error!("Claim {}/{} failed, ending generation: {}", claim.topic(), claim.partition(), e);
                                generation_token.cancel();
                            }
                        });
                        tx
                    });

                if !feed_claim(feed, message, &generation_token).await {
                    break;
                }
            }

            tokio::select! {
                biased;
                _ = generation_token.cancelled() => break Ok(()),
                _ = &mut notified => {}
            }
        };

        generation_token.cancel();
        drop(feeds);
        claims.close();
        claims.wait().await;
        *self.current.lock() = None;

        if let Err(e) = handler.cleanup(session.as_ref()).await {
            error!("Cleanup of generation {} failed: {}", generation, e);
        }
        debug!("Generation {} ended", generation);

        outcome
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.closed.store(true, Ordering::SeqCst);
        self.trigger_rebalance();

        if self.state.lock().fail_close {
            return Err(BrokerError::Close("simulated close failure".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ChannelLog {
    sent: Vec<(String, Vec<u8>)>,
    opened: usize,
    closed: usize,
    fail_sends: bool,
    fail_opens: bool,
}

/// Channel factory recording everything published through it
#[derive(Debug, Clone, Default)]
pub struct MemoryChannelFactory {
    log: Arc<Mutex<ChannelLog>>,
}

impl MemoryChannelFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every (topic, payload) acknowledged so far
    pub fn sent(&self) -> Vec<(String, Vec<u8>)> {
        self.log.lock().sent.clone()
    }

    pub fn opened(&self) -> usize {
        self.log.lock().opened
    }

    pub fn closed(&self) -> usize {
        self.log.lock().closed
    }

    /// Make subsequent sends fail with a delivery error
    pub fn set_fail_sends(&self, fail: bool) {
        self.log.lock().fail_sends = fail;
    }

    /// Make subsequent opens fail
    pub fn set_fail_opens(&self, fail: bool) {
        self.log.lock().fail_opens = fail;
    }
}

#[async_trait]
impl ChannelFactory for MemoryChannelFactory {
    async fn open(&self) -> Result<Box<dyn OutboundChannel>, BrokerError> {
        let mut log = self.log.lock();
        if log.fail_opens {
            return Err(BrokerError::Client("simulated producer failure".to_string()));
        }
        log.opened += 1;

        Ok(Box::new(MemoryChannel {
            log: Arc::clone(&self.log),
        }))
    }
}

struct MemoryChannel {
    log: Arc<Mutex<ChannelLog>>,
}

#[async_trait]
impl OutboundChannel for MemoryChannel {
    async fn send(&mut self, topic: &str, payload: &[u8]) -> Result<Delivery, BrokerError> {
        let mut log = self.log.lock();
        if log.fail_sends {
            return Err(BrokerError::Delivery {
                topic: topic.to_string(),
                message: "simulated delivery failure".to_string(),
            });
        }

        log.sent.push((topic.to_string(), payload.to_vec()));
        Ok(Delivery {
            partition: 0,
            offset: log.sent.len() as i64 - 1,
        })
    }

    async fn close(self: Box<Self>) -> Result<(), BrokerError> {
        self.log.lock().closed += 1;
        Ok(())
    }
}
