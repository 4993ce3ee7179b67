/*!
 * Publisher of translated records.
 *
 * Every publish call owns its outbound channel: it is opened for the call,
 * used for exactly one send and closed before the call returns. If the
 * publish future is dropped mid-send the channel is released by its drop.
 */

use log::{debug, warn};
use std::sync::Arc;

use crate::broker::{ChannelFactory, Delivery};
use crate::errors::PublishError;

/// Scoped publisher over a channel factory
#[derive(Clone)]
pub struct Publisher {
    factory: Arc<dyn ChannelFactory>,
}

impl Publisher {
    pub fn new(factory: Arc<dyn ChannelFactory>) -> Self {
        Self { factory }
    }

    /// Send one payload to `destination` and wait for the acknowledgment
    pub async fn publish(&self, destination: &str, payload: &[u8]) -> Result<Delivery, PublishError> {
        let mut channel = self.factory.open().await.map_err(PublishError::Open)?;

        let result = channel.send(destination, payload).await;

        if let Err(e) = channel.close().await {
            warn!("Failed to close outbound channel for '{}': {}", destination, e);
        }

        let delivery = result.map_err(|source| PublishError::Send {
            destination: destination.to_string(),
            source,
        })?;

        debug!(
            "Published {} bytes to {}/{} at offset {}",
            payload.len(),
            destination,
            delivery.partition,
            delivery.offset
        );
        Ok(delivery)
    }
}
