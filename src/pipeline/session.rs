/*!
 * Consumer-group participant.
 *
 * `ConsumptionSession` implements the setup / consume_claim / cleanup
 * callbacks. Each claim is processed strictly in arrival order and an
 * offset is marked only after its translated record was published.
 * Undecodable messages are skipped. Any other failure stops the claim,
 * which ends the generation so the group resumes from the last marked
 * offset.
 *
 * Lifecycle per generation:
 * `NotReady -> Ready -> Consuming -> Draining -> Closed`, then back to
 * `NotReady` when the supervisor arms the next generation.
 */

use async_trait::async_trait;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::broker::{Claim, ConsumerGroupHandler, GroupSession};
use crate::errors::BrokerError;
use crate::pipeline::processor::MessageProcessor;
use crate::pipeline::readiness::ReadinessGate;

/// Lifecycle state of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the group to assign partitions
    NotReady,
    /// Generation set up, readiness gate released
    Ready,
    /// At least one claim is being processed
    Consuming,
    /// Claims are finishing their in-flight message
    Draining,
    /// Generation cleaned up
    Closed,
}

impl SessionState {
    /// Whether the lifecycle allows moving from `self` to `next`
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, next),
            (NotReady, Ready)
                | (Ready, Consuming)
                | (Ready, Draining)
                | (Ready, Closed)
                | (Consuming, Draining)
                | (Consuming, Closed)
                | (Draining, Closed)
                | (Closed, NotReady)
        )
    }
}

/// Pipeline side of the consumer-group contract
pub struct ConsumptionSession {
    processor: MessageProcessor,
    state: Mutex<SessionState>,
    gate: Mutex<Option<ReadinessGate>>,
    shutdown: CancellationToken,
}

impl ConsumptionSession {
    pub fn new(processor: MessageProcessor, shutdown: CancellationToken) -> Self {
        Self {
            processor,
            state: Mutex::new(SessionState::NotReady),
            gate: Mutex::new(None),
            shutdown,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Prepare the session for the next generation
    pub fn arm(&self, gate: ReadinessGate) {
        *self.gate.lock() = Some(gate);
        if self.state() == SessionState::Closed {
            self.transition(SessionState::NotReady);
        }
    }

    fn transition(&self, next: SessionState) -> bool {
        let mut state = self.state.lock();
        if *state == next {
            return true;
        }
        if !state.can_transition_to(next) {
            warn!("Ignoring session transition {:?} -> {:?}", *state, next);
            return false;
        }

        debug!("Session state {:?} -> {:?}", *state, next);
        *state = next;
        true
    }
}

#[async_trait]
impl ConsumerGroupHandler for ConsumptionSession {
    async fn setup(&self, session: &dyn GroupSession) -> Result<(), BrokerError> {
        if self.state() == SessionState::Closed {
            self.transition(SessionState::NotReady);
        }
        self.transition(SessionState::Ready);

        match self.gate.lock().as_ref() {
            Some(gate) => {
                if gate.release() {
                    info!("Session ready for generation {}", session.generation());
                }
            }
            None => warn!("Generation {} started without a readiness gate", session.generation()),
        }
        Ok(())
    }

    async fn cleanup(&self, session: &dyn GroupSession) -> Result<(), BrokerError> {
        self.transition(SessionState::Closed);
        self.gate.lock().take();
        info!("Session cleaned up for generation {}", session.generation());
        Ok(())
    }

    async fn consume_claim(&self, session: &dyn GroupSession, claim: &mut dyn Claim) -> Result<(), BrokerError> {
        self.transition(SessionState::Consuming);
        info!(
            "Consuming {}/{} (generation {}) into '{}'",
            claim.topic(),
            claim.partition(),
            session.generation(),
            self.processor.destination()
        );

        while let Some(message) = claim.next_message().await {
            info!("[{}/{}/{}] Message received", message.topic, message.partition, message.offset);

            match self.processor.process(&message).await {
                Ok(_) => {
                    session.mark_message(&message)?;
                    self.processor.stats().record_marked();
                    debug!("[{}/{}/{}] Offset marked", message.topic, message.partition, message.offset);
                }
                Err(e) if e.is_permanent() => {
                    warn!(
                        "[{}/{}/{}] Skipping undecodable message: {}",
                        message.topic, message.partition, message.offset, e
                    );
                }
                Err(e) => {
                    // Commits are cumulative: marking anything after this
                    // offset would acknowledge it too.
                    error!(
                        "[{}/{}/{}] Message not acknowledged, stopping claim: {}",
                        message.topic, message.partition, message.offset, e
                    );
                    self.transition(SessionState::Draining);
                    return Err(BrokerError::ClaimAborted {
                        topic: message.topic.clone(),
                        partition: message.partition,
                        offset: message.offset,
                        reason: e.to_string(),
                    });
                }
            }
        }

        self.transition(SessionState::Draining);
        if self.shutdown.is_cancelled() {
            info!("Stopped consuming {}/{}: shutting down", claim.topic(), claim.partition());
        } else {
            info!("Stopped consuming {}/{}: generation ended", claim.topic(), claim.partition());
        }
        Ok(())
    }
}
