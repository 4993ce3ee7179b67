/*!
 * Consume -> translate -> publish pipeline.
 *
 * - `processor`: Per-message decode, translate, encode and publish
 * - `publisher`: Scoped per-call publishing
 * - `session`: Consumer-group callbacks and lifecycle state
 * - `readiness`: One-shot readiness gate per generation
 * - `supervisor`: Task ownership and graceful shutdown
 * - `stats`: Shared counters and the periodic summary
 */

pub use self::processor::{MessageProcessor, Processed};
pub use self::publisher::Publisher;
pub use self::readiness::ReadinessGate;
pub use self::session::{ConsumptionSession, SessionState};
pub use self::stats::{PipelineStats, StatsSnapshot};
pub use self::supervisor::{PipelineSupervisor, SupervisorOptions};

pub mod processor;
pub mod publisher;
pub mod readiness;
pub mod session;
pub mod stats;
pub mod supervisor;
