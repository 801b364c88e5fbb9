//! Shared types for the attachment pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, UnitError};

// ── Inbound message ─────────────────────────────────────────────────

/// Receipt action type the pipeline can act on.
pub const STORED_OBJECT_ACTION: &str = "S3";

/// Mail-delivery notification, as published by the receiving provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(default)]
    pub notification_type: String,
    pub mail: MailInfo,
    pub receipt: Receipt,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailInfo {
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub common_headers: CommonHeaders,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonHeaders {
    #[serde(default)]
    pub return_path: String,
    #[serde(default)]
    pub from: Vec<String>,
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub subject: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    #[serde(default)]
    pub recipients: Vec<String>,
    pub action: ReceiptAction,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptAction {
    #[serde(rename = "type", default)]
    pub action_type: String,
    pub bucket_name: String,
    pub object_key: String,
}

/// One inbound email, flattened to what the pipeline needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Bucket holding the raw message.
    pub bucket: String,
    /// Object key of the raw message.
    pub object_key: String,
    /// Envelope sender; the reply goes here.
    pub return_path: String,
    /// `From` header addresses (informational).
    pub from: Vec<String>,
    pub message_id: String,
    pub subject: String,
    /// Addresses the message was delivered to.
    pub recipients: Vec<String>,
    pub received_at: Option<DateTime<Utc>>,
}

impl InboundMessage {
    /// Address the reply is sent from: the first declared recipient.
    pub fn reply_from(&self) -> Result<&str, PipelineError> {
        self.recipients
            .first()
            .map(String::as_str)
            .ok_or_else(|| PipelineError::MissingRecipients {
                message_id: self.message_id.clone(),
            })
    }
}

impl From<Notification> for InboundMessage {
    fn from(n: Notification) -> Self {
        let headers = n.mail.common_headers;
        Self {
            bucket: n.receipt.action.bucket_name,
            object_key: n.receipt.action.object_key,
            return_path: headers.return_path,
            from: headers.from,
            message_id: headers.message_id,
            subject: headers.subject,
            recipients: n.receipt.recipients,
            received_at: n.mail.timestamp,
        }
    }
}

// ── Attachments ─────────────────────────────────────────────────────

/// A file extracted from the raw email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Display name as declared by the sender.
    pub name: String,
    /// Lowercased `type/subtype`.
    pub content_type: String,
    pub content: Vec<u8>,
}

impl Attachment {
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            content: content.into(),
        }
    }

    /// Whether this attachment can serve as a QR background.
    pub fn is_image(&self) -> bool {
        let ct = self.content_type.as_str();
        ct.eq_ignore_ascii_case("image/jpeg") || ct.eq_ignore_ascii_case("image/png")
    }
}

// ── Results ─────────────────────────────────────────────────────────

/// Public locations of one published attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedUrls {
    pub attachment_url: String,
    pub qr_image_url: String,
}

/// Outcome of one attachment unit.
#[derive(Debug)]
pub struct ProcessingResult {
    pub attachment_name: String,
    pub outcome: Result<PublishedUrls, UnitError>,
}

impl ProcessingResult {
    pub fn published(name: impl Into<String>, urls: PublishedUrls) -> Self {
        Self {
            attachment_name: name.into(),
            outcome: Ok(urls),
        }
    }

    pub fn failed(name: impl Into<String>, error: UnitError) -> Self {
        Self {
            attachment_name: name.into(),
            outcome: Err(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Sort results by display name (byte order) for stable output.
pub fn sort_results(results: &mut [ProcessingResult]) {
    results.sort_by(|a, b| a.attachment_name.cmp(&b.attachment_name));
}

/// How a pipeline run finished.
#[derive(Debug)]
pub enum RunOutcome {
    /// The message had no attachments; the apology reply was sent.
    NoAttachments,
    /// Results were generated and the reply was sent.
    Replied { results: Vec<ProcessingResult> },
}

impl RunOutcome {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoAttachments => "no_attachments",
            Self::Replied { .. } => "replied",
        }
    }
}
