/*!
 * Processing of a single inbound message.
 *
 * decode -> translate (with credential fallback) -> encode -> publish.
 * The caller marks the offset only when this returns `Ok`.
 */

use log::{debug, error, info};
use std::sync::Arc;

use crate::broker::{Delivery, InboundMessage};
use crate::codec;
use crate::errors::PipelineError;
use crate::models::TranslatedRecord;
use crate::pipeline::publisher::Publisher;
use crate::pipeline::stats::PipelineStats;
use crate::translation::TranslationService;

/// Result of a successfully processed message
#[derive(Debug, Clone, PartialEq)]
pub struct Processed {
    /// Record that was published
    pub record: TranslatedRecord,
    /// Acknowledgment of the destination topic
    pub delivery: Delivery,
}

/// Stateless per-message pipeline, shared by every claim
#[derive(Clone)]
pub struct MessageProcessor {
    translator: TranslationService,
    publisher: Publisher,
    destination: String,
    stats: Arc<PipelineStats>,
}

impl MessageProcessor {
    pub fn new(
        translator: TranslationService,
        publisher: Publisher,
        destination: impl Into<String>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            translator,
            publisher,
            destination: destination.into(),
            stats,
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }

    /// Run one message through the pipeline
    pub async fn process(&self, message: &InboundMessage) -> Result<Processed, PipelineError> {
        self.stats.record_received();

        let record = codec::decode(&message.payload).map_err(|e| {
            self.stats.record_decode_failure();
            PipelineError::Decode(e)
        })?;

        let passthrough = TranslationService::is_passthrough(&record.review);
        let translated = match self.translator.translate(&record.review).await {
            Ok(text) => text,
            Err(e) => {
                self.stats.record_translation_failure();
                return Err(e.into());
            }
        };

        if passthrough {
            self.stats.record_passthrough();
            debug!("Review for {}/{} is already English", record.location, record.restaurant);
        } else {
            self.stats.record_translated();
            info!(
                "Translated review for {}/{} from '{}'",
                record.location, record.restaurant, record.review.lang
            );
        }

        let translated = TranslatedRecord::from_review(record, translated);
        let payload = codec::encode(&translated).map_err(|e| {
            self.stats.record_publish_failure();
            error!("Encoding translated record failed, nothing will be published: {}", e);
            PipelineError::Encode(e)
        })?;

        let delivery = match self.publisher.publish(&self.destination, &payload).await {
            Ok(delivery) => delivery,
            Err(e) => {
                self.stats.record_publish_failure();
                return Err(e.into());
            }
        };
        self.stats.record_published();

        info!(
            "Published translated review to {}/{} at offset {}",
            self.destination, delivery.partition, delivery.offset
        );

        Ok(Processed {
            record: translated,
            delivery,
        })
    }
}
