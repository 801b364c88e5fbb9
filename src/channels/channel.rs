//! Reply sender abstraction.

use async_trait::async_trait;

use crate::error::MailError;

/// A threaded reply to an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingReply {
    /// Message-ID of the message being answered.
    pub in_reply_to: String,
    /// Address the reply is sent from.
    pub from: String,
    /// Address the reply is sent to.
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Outbound mail delivery.
#[async_trait]
pub trait ReplySender: Send + Sync {
    /// Transport name for logging (e.g. "smtp", "outbox").
    fn name(&self) -> &str;

    /// Deliver a reply.
    async fn send_reply(&self, reply: &OutgoingReply) -> Result<(), MailError>;
}
