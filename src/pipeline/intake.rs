//! Decoding of mail-delivery notification batches.
//!
//! A batch is `{"Records":[{"Sns":{"Message":"<notification json>"}}]}`.
//! Each record is decoded on its own; a bad record is logged and skipped.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::pipeline::types::{InboundMessage, Notification, STORED_OBJECT_ACTION};

#[derive(Debug, Deserialize)]
struct Batch {
    #[serde(rename = "Records", default)]
    records: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Record {
    #[serde(rename = "Sns")]
    sns: Envelope,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "Message")]
    message: String,
}

/// Decode a batch into the messages the pipeline can act on.
///
/// Fails only when the batch itself is not valid JSON of the expected shape.
pub fn decode_batch(json: &str) -> Result<Vec<InboundMessage>, serde_json::Error> {
    let batch: Batch = serde_json::from_str(json)?;
    let total = batch.records.len();

    let messages: Vec<InboundMessage> = batch
        .records
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| decode_record(index, record))
        .collect();

    debug!(total, accepted = messages.len(), "Decoded notification batch");
    Ok(messages)
}

fn decode_record(index: usize, record: serde_json::Value) -> Option<InboundMessage> {
    let record: Record = match serde_json::from_value(record) {
        Ok(r) => r,
        Err(e) => {
            warn!(index, error = %e, "Discarding malformed record");
            return None;
        }
    };

    let notification: Notification = match serde_json::from_str(&record.sns.message) {
        Ok(n) => n,
        Err(e) => {
            warn!(index, error = %e, "Discarding undecodable notification");
            return None;
        }
    };

    let action = &notification.receipt.action.action_type;
    if action != STORED_OBJECT_ACTION {
        warn!(index, action = %action, "Skipping notification without a stored message");
        return None;
    }

    Some(InboundMessage::from(notification))
}
