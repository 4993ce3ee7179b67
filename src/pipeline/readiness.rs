//! One-shot readiness signal for a consumer-group generation

use tokio::sync::watch;

/// Released once the generation's session is set up
///
/// A gate is never reused: the supervisor arms a new one for every
/// generation and waits on the one it armed.
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    sender: watch::Sender<bool>,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessGate {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    /// Release the gate; returns `true` only for the call that released it
    pub fn release(&self) -> bool {
        self.sender.send_if_modified(|released| {
            if *released {
                false
            } else {
                *released = true;
                true
            }
        })
    }

    pub fn is_released(&self) -> bool {
        *self.sender.borrow()
    }

    /// Wait until the gate is released
    pub async fn wait(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives in self, so the channel cannot close while waiting.
        let _ = receiver.wait_for(|released| *released).await;
    }
}
