/*!
 * Pipeline statistics.
 *
 * Counters are shared by every claim task and read by the housekeeping
 * task that logs the periodic summary.
 */

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Point-in-time copy of the pipeline counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Messages received from the source topics
    pub received: u64,

    /// Messages whose payload could not be decoded
    pub decode_failures: u64,

    /// Reviews republished without calling the translation endpoint
    pub passthrough: u64,

    /// Reviews translated by the endpoint
    pub translated: u64,

    /// Reviews the endpoint failed to translate
    pub translation_failures: u64,

    /// Records published to the destination topic
    pub published: u64,

    /// Records that failed to encode or publish
    pub publish_failures: u64,

    /// Offsets marked as processed
    pub marked: u64,
}

impl StatsSnapshot {
    /// Messages that did not make it to the destination topic
    pub fn failed(&self) -> u64 {
        self.decode_failures + self.translation_failures + self.publish_failures
    }

    /// Percentage of received messages that were published
    pub fn success_rate(&self) -> f32 {
        if self.received == 0 {
            return 100.0;
        }
        (self.published as f32 / self.received as f32) * 100.0
    }
}

/// Live pipeline counters
#[derive(Debug)]
pub struct PipelineStats {
    started: Instant,
    received: AtomicU64,
    decode_failures: AtomicU64,
    passthrough: AtomicU64,
    translated: AtomicU64,
    translation_failures: AtomicU64,
    published: AtomicU64,
    publish_failures: AtomicU64,
    marked: AtomicU64,
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            received: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            passthrough: AtomicU64::new(0),
            translated: AtomicU64::new(0),
            translation_failures: AtomicU64::new(0),
            published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            marked: AtomicU64::new(0),
        }
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_passthrough(&self) {
        self.passthrough.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_translated(&self) {
        self.translated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_translation_failure(&self) {
        self.translation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_marked(&self) {
        self.marked.fetch_add(1, Ordering::Relaxed);
    }

    /// Time since the counters were created
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            passthrough: self.passthrough.load(Ordering::Relaxed),
            translated: self.translated.load(Ordering::Relaxed),
            translation_failures: self.translation_failures.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            marked: self.marked.load(Ordering::Relaxed),
        }
    }

    /// One-line summary for the periodic log
    pub fn summary(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            "Pipeline stats after {}s: received {}, translated {}, passthrough {}, published {}, marked {}, failed {} ({:.1}% published)",
            self.uptime().as_secs(),
            snapshot.received,
            snapshot.translated,
            snapshot.passthrough,
            snapshot.published,
            snapshot.marked,
            snapshot.failed(),
            snapshot.success_rate()
        )
    }
}
