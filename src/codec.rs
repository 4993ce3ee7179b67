/*!
 * JSON codec between broker payloads and pipeline records.
 */

use crate::errors::CodecError;
use crate::models::{ReviewRecord, TranslatedRecord};

/// Decode an inbound payload into a review record
pub fn decode(payload: &[u8]) -> Result<ReviewRecord, CodecError> {
    if payload.is_empty() {
        return Err(CodecError::EmptyPayload);
    }

    serde_json::from_slice(payload).map_err(CodecError::Decode)
}

/// Encode a translated record for the destination topic
pub fn encode(record: &TranslatedRecord) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(record).map_err(CodecError::Encode)
}
