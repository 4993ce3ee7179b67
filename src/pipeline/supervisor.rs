/*!
 * Pipeline supervisor.
 *
 * Owns the root cancellation token, the consumer-group client and the
 * tracker of background tasks:
 * - the consume loop, which rejoins the group after every rebalance
 * - the housekeeping task logging periodic statistics
 */

use log::{error, info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::broker::{ConsumerGroup, ConsumerGroupHandler};
use crate::errors::SupervisorError;
use crate::pipeline::processor::MessageProcessor;
use crate::pipeline::readiness::ReadinessGate;
use crate::pipeline::session::ConsumptionSession;
use crate::pipeline::stats::PipelineStats;

/// Shutdown and housekeeping settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorOptions {
    /// Upper bound for background tasks to finish, `None` waits forever
    pub drain_timeout: Option<Duration>,

    /// Period of the statistics summary, `None` disables it
    pub stats_interval: Option<Duration>,

    /// Pause between a generation ending and rejoining the group
    pub rejoin_backoff: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            drain_timeout: Some(Duration::from_secs(30)),
            stats_interval: Some(Duration::from_secs(60)),
            rejoin_backoff: Duration::from_secs(2),
        }
    }
}

/// Runs the consumption session until shutdown
pub struct PipelineSupervisor {
    group: Arc<dyn ConsumerGroup>,
    session: Arc<ConsumptionSession>,
    stats: Arc<PipelineStats>,
    topics: Vec<String>,
    options: SupervisorOptions,
    token: CancellationToken,
    tracker: TaskTracker,
}

impl PipelineSupervisor {
    pub fn new(
        group: Arc<dyn ConsumerGroup>,
        processor: MessageProcessor,
        topics: Vec<String>,
        options: SupervisorOptions,
    ) -> Self {
        let token = CancellationToken::new();
        let stats = Arc::clone(processor.stats());
        let session = Arc::new(ConsumptionSession::new(processor, token.clone()));

        Self {
            group,
            session,
            stats,
            topics,
            options,
            token,
            tracker: TaskTracker::new(),
        }
    }

    /// Root token; cancelling it shuts the pipeline down
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn session(&self) -> &Arc<ConsumptionSession> {
        &self.session
    }

    /// Run until `shutdown_signal` completes or the root token is cancelled
    pub async fn run<F>(self, shutdown_signal: F) -> Result<(), SupervisorError>
    where
        F: Future<Output = ()>,
    {
        let ready = ReadinessGate::new();

        let consume_task = self.tracker.spawn(consume_loop(
            Arc::clone(&self.group),
            Arc::clone(&self.session),
            self.topics.clone(),
            self.token.clone(),
            ready.clone(),
            self.options.rejoin_backoff,
        ));

        if let Some(interval) = self.options.stats_interval.filter(|interval| !interval.is_zero()) {
            self.tracker
                .spawn(report_stats(Arc::clone(&self.stats), interval, self.token.clone()));
        }
        self.tracker.close();

        tokio::pin!(shutdown_signal);

        tokio::select! {
            _ = ready.wait() => info!("Pipeline up and running, consuming {:?}", self.topics),
            _ = self.token.cancelled() => {}
            _ = &mut shutdown_signal => info!("Shutdown requested before the pipeline became ready"),
        }

        if !self.token.is_cancelled() && ready.is_released() {
            tokio::select! {
                _ = self.token.cancelled() => info!("Terminating: context cancelled"),
                _ = &mut shutdown_signal => info!("Terminating: via signal"),
            }
        }
        self.token.cancel();

        match self.options.drain_timeout {
            Some(limit) => {
                if tokio::time::timeout(limit, self.tracker.wait()).await.is_err() {
                    warn!("Background tasks still running after {:?}, closing anyway", limit);
                }
            }
            None => self.tracker.wait().await,
        }

        let consumed = if consume_task.is_finished() {
            consume_task
                .await
                .unwrap_or_else(|e| Err(SupervisorError::Task(e.to_string())))
        } else {
            consume_task.abort();
            Ok(())
        };

        let closed = self.group.close().await;
        info!("{}", self.stats.summary());

        if let Err(e) = consumed {
            if let Err(close_error) = closed {
                error!("Error closing client: {}", close_error);
            }
            return Err(e);
        }

        closed.map_err(SupervisorError::Close)?;
        info!("Pipeline stopped");
        Ok(())
    }
}

/// Join the group generation after generation until cancelled
async fn consume_loop(
    group: Arc<dyn ConsumerGroup>,
    session: Arc<ConsumptionSession>,
    topics: Vec<String>,
    token: CancellationToken,
    first_gate: ReadinessGate,
    rejoin_backoff: Duration,
) -> Result<(), SupervisorError> {
    let mut gate = first_gate;

    loop {
        session.arm(gate);

        let handler: Arc<dyn ConsumerGroupHandler> = session.clone();
        if let Err(e) = group.consume(&topics, handler, token.clone()).await {
            error!("Error from consumer: {}", e);
            token.cancel();
            return Err(SupervisorError::Consumer(e));
        }

        if token.is_cancelled() {
            return Ok(());
        }

        info!("Consumer group generation ended, rejoining in {:?}", rejoin_backoff);
        tokio::select! {
            _ = token.cancelled() => return Ok(()),
            _ = tokio::time::sleep(rejoin_backoff) => {}
        }
        gate = ReadinessGate::new();
    }
}

async fn report_stats(stats: Arc<PipelineStats>, period: Duration, token: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => info!("{}", stats.summary()),
        }
    }
}
