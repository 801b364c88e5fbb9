//! Email I/O: attachment extraction via mail-parser, replies via lettre.
//!
//! Replies go out over SMTP, or into an `.eml` outbox directory when no
//! SMTP host is configured.

use std::path::PathBuf;

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, FileTransport, Message, SmtpTransport, Transport};
use mail_parser::{MessageParser, MessagePart, MimeHeaders};
use secrecy::ExposeSecret;

use crate::channels::{OutgoingReply, ReplySender};
use crate::config::{ReplyConfig, ReplyTransport};
use crate::error::{MailError, PipelineError};
use crate::pipeline::types::Attachment;

/// Name used for attachments that don't declare one.
const DEFAULT_ATTACHMENT_NAME: &str = "attachment";

/// Content type used for attachments that don't declare one.
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

// ── Extraction ──────────────────────────────────────────────────────

/// Extract attachments from a raw RFC 822 message, in declaration order.
pub fn parse_attachments(raw: &[u8]) -> Result<Vec<Attachment>, PipelineError> {
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| PipelineError::Parse("not a MIME message".into()))?;

    let attachments = parsed
        .attachments()
        .filter(|part| !is_inline(part))
        .map(|part| {
            let name = MimeHeaders::attachment_name(part).unwrap_or(DEFAULT_ATTACHMENT_NAME);
            Attachment::new(name, content_type_of(part), part.contents().to_vec())
        })
        .collect::<Vec<_>>();

    for a in &attachments {
        tracing::info!(name = %a.name, content_type = %a.content_type, "attachment");
    }
    Ok(attachments)
}

/// Inline parts (signature logos, embedded images) are part of the body.
///
/// A part is inline when its disposition says so, or when it has no
/// disposition but carries a Content-ID for the HTML body to reference.
fn is_inline(part: &MessagePart) -> bool {
    match MimeHeaders::content_disposition(part) {
        Some(disposition) => disposition.ctype().eq_ignore_ascii_case("inline"),
        None => MimeHeaders::content_id(part).is_some(),
    }
}

fn content_type_of(part: &MessagePart) -> String {
    MimeHeaders::content_type(part)
        .map(|ct| match ct.subtype() {
            Some(sub) => format!("{}/{}", ct.ctype(), sub),
            None => ct.ctype().to_string(),
        })
        .map(|ct| ct.to_ascii_lowercase())
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string())
}

// ── Reply sender ────────────────────────────────────────────────────

enum Outbound {
    Smtp(SmtpTransport),
    Outbox { dir: PathBuf, transport: FileTransport },
}

/// Sends replies as multipart/alternative (text + HTML) emails.
pub struct EmailReplySender {
    from_name: String,
    outbound: Outbound,
}

impl EmailReplySender {
    /// Build a sender from the reply configuration.
    pub fn from_config(config: &ReplyConfig) -> Result<Self, MailError> {
        match &config.transport {
            ReplyTransport::Smtp {
                host,
                port,
                username,
                password,
            } => {
                let mut builder = SmtpTransport::relay(host)
                    .map_err(|e| MailError::SendFailed(format!("SMTP relay error: {e}")))?
                    .port(*port);
                if !username.is_empty() {
                    builder = builder.credentials(Credentials::new(
                        username.clone(),
                        password.expose_secret().to_string(),
                    ));
                }
                Ok(Self {
                    from_name: config.from_name.clone(),
                    outbound: Outbound::Smtp(builder.build()),
                })
            }
            ReplyTransport::Outbox { dir } => Ok(Self::outbox(dir.clone(), &config.from_name)),
        }
    }

    /// Sender that writes `.eml` files into `dir`.
    pub fn outbox(dir: impl Into<PathBuf>, from_name: &str) -> Self {
        let dir = dir.into();
        Self {
            from_name: from_name.to_string(),
            outbound: Outbound::Outbox {
                transport: FileTransport::new(&dir),
                dir,
            },
        }
    }
}

fn parse_address(raw: &str) -> Result<Address, MailError> {
    raw.trim()
        .parse::<Address>()
        .map_err(|e| MailError::InvalidAddress {
            address: raw.to_string(),
            reason: e.to_string(),
        })
}

/// Build the reply email. Threading headers point at the original message.
pub fn build_reply_message(reply: &OutgoingReply, from_name: &str) -> Result<Message, MailError> {
    let from = Mailbox::new(Some(from_name.to_string()), parse_address(&reply.from)?);
    let to = Mailbox::new(None, parse_address(&reply.to)?);

    let mut builder = Message::builder()
        .from(from)
        .reply_to(to.clone())
        .to(to)
        .subject(reply.subject.clone());
    if !reply.in_reply_to.is_empty() {
        builder = builder
            .in_reply_to(reply.in_reply_to.clone())
            .references(reply.in_reply_to.clone());
    }

    builder
        .multipart(MultiPart::alternative_plain_html(
            reply.text.clone(),
            reply.html.clone(),
        ))
        .map_err(|e| MailError::Build(e.to_string()))
}

#[async_trait]
impl ReplySender for EmailReplySender {
    fn name(&self) -> &str {
        match self.outbound {
            Outbound::Smtp(_) => "smtp",
            Outbound::Outbox { .. } => "outbox",
        }
    }

    async fn send_reply(&self, reply: &OutgoingReply) -> Result<(), MailError> {
        let email = build_reply_message(reply, &self.from_name)?;

        let id = match &self.outbound {
            Outbound::Smtp(transport) => {
                let transport = transport.clone();
                tokio::task::spawn_blocking(move || transport.send(&email))
                    .await
                    .map_err(|e| MailError::SendFailed(format!("send task failed: {e}")))?
                    .map(|response| response.message().collect::<Vec<_>>().join(" "))
                    .map_err(|e| MailError::SendFailed(format!("SMTP send failed: {e}")))?
            }
            Outbound::Outbox { dir, transport } => {
                tokio::fs::create_dir_all(dir).await.map_err(|e| {
                    MailError::SendFailed(format!("outbox {}: {e}", dir.display()))
                })?;
                let transport = transport.clone();
                tokio::task::spawn_blocking(move || transport.send(&email))
                    .await
                    .map_err(|e| MailError::SendFailed(format!("send task failed: {e}")))?
                    .map_err(|e| MailError::SendFailed(format!("outbox write failed: {e}")))?
            }
        };

        tracing::debug!(
            transport = self.name(),
            in_reply_to = %reply.in_reply_to,
            id = %id,
            "Reply handed to transport"
        );
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const MULTIPART: &str = "From: Alice <alice@example.com>\r\n\
To: qr@mydomain.com\r\n\
Subject: files\r\n\
Message-ID: <abc@example.com>\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"XYZ\"\r\n\
\r\n\
--XYZ\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
hola\r\n\
--XYZ\r\n\
Content-Type: application/pdf; name=\"historia-social-el-circo.pdf\"\r\n\
Content-Disposition: attachment; filename=\"historia-social-el-circo.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQK\r\n\
--XYZ\r\n\
Content-Type: IMAGE/JPEG\r\n\
Content-Disposition: attachment; filename=\"toos-leen.jpeg\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
/9j/4AAQ\r\n\
--XYZ--\r\n";

    const PLAIN: &str = "From: Alice <alice@example.com>\r\n\
To: qr@mydomain.com\r\n\
Subject: nothing\r\n\
\r\n\
no files here\r\n";

    const SIGNATURE_ONLY: &str = "From: Alice <alice@example.com>\r\n\
To: qr@mydomain.com\r\n\
Subject: hola\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/related; boundary=\"REL\"\r\n\
\r\n\
--REL\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>hola</p><img src=\"cid:logo@x\">\r\n\
--REL\r\n\
Content-Type: image/png; name=\"logo.png\"\r\n\
Content-Disposition: inline; filename=\"logo.png\"\r\n\
Content-ID: <logo@x>\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
iVBORw0KGgo=\r\n\
--REL--\r\n";

    const SIGNATURE_AND_DOCUMENT: &str = "From: Alice <alice@example.com>\r\n\
To: qr@mydomain.com\r\n\
Subject: informe\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"MIX\"\r\n\
\r\n\
--MIX\r\n\
Content-Type: multipart/related; boundary=\"REL\"\r\n\
\r\n\
--REL\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>adjunto</p><img src=\"cid:logo@x\">\r\n\
--REL\r\n\
Content-Type: image/png\r\n\
Content-ID: <logo@x>\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
iVBORw0KGgo=\r\n\
--REL--\r\n\
--MIX\r\n\
Content-Type: application/pdf; name=\"informe.pdf\"\r\n\
Content-Disposition: attachment; filename=\"informe.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQK\r\n\
--MIX--\r\n";

    fn reply() -> OutgoingReply {
        OutgoingReply {
            in_reply_to: "<abc123@mail.example.com>".into(),
            from: "qr@mydomain.com".into(),
            to: "alice@example.com".into(),
            subject: "mis archivos".into(),
            text: "plain body".into(),
            html: "<p>html body</p>".into(),
        }
    }

    // ── Extraction tests ────────────────────────────────────────────

    #[test]
    fn extracts_attachments_in_order() {
        let attachments = parse_attachments(MULTIPART.as_bytes()).unwrap();
        assert_eq!(attachments.len(), 2);

        assert_eq!(attachments[0].name, "historia-social-el-circo.pdf");
        assert_eq!(attachments[0].content_type, "application/pdf");
        assert_eq!(attachments[0].content, b"%PDF-1.4\n");

        assert_eq!(attachments[1].name, "toos-leen.jpeg");
        assert_eq!(attachments[1].content_type, "image/jpeg");
        assert!(attachments[1].is_image());
    }

    #[test]
    fn message_without_attachments_yields_none() {
        let attachments = parse_attachments(PLAIN.as_bytes()).unwrap();
        assert!(attachments.is_empty());
    }

    #[test]
    fn inline_signature_image_is_not_an_attachment() {
        let attachments = parse_attachments(SIGNATURE_ONLY.as_bytes()).unwrap();
        assert!(attachments.is_empty(), "got {attachments:?}");
    }

    #[test]
    fn inline_image_without_disposition_is_skipped_next_to_a_document() {
        let attachments = parse_attachments(SIGNATURE_AND_DOCUMENT.as_bytes()).unwrap();
        let names: Vec<_> = attachments.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["informe.pdf"]);
    }

    // ── Reply building tests ────────────────────────────────────────

    #[test]
    fn reply_carries_threading_headers() {
        let message = build_reply_message(&reply(), "QR App").unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("In-Reply-To: <abc123@mail.example.com>"));
        assert!(raw.contains("References: <abc123@mail.example.com>"));
        assert!(raw.contains("To: alice@example.com"));
        assert!(raw.contains("Reply-To: alice@example.com"));
        assert!(raw.contains("qr@mydomain.com"));
        assert!(raw.contains("Subject: mis archivos"));
        assert!(raw.contains("multipart/alternative"));
    }

    #[test]
    fn reply_without_message_id_skips_threading() {
        let mut r = reply();
        r.in_reply_to.clear();
        let raw = String::from_utf8(build_reply_message(&r, "QR App").unwrap().formatted()).unwrap();
        assert!(!raw.contains("In-Reply-To"));
    }

    #[test]
    fn invalid_address_is_rejected() {
        let mut r = reply();
        r.to = "not an address".into();
        let err = build_reply_message(&r, "QR App").unwrap_err();
        assert!(matches!(err, MailError::InvalidAddress { .. }));
    }

    // ── Outbox tests ────────────────────────────────────────────────

    #[tokio::test]
    async fn outbox_writes_eml_file() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = dir.path().join("outbox");
        let sender = EmailReplySender::outbox(&outbox, "QR App");
        assert_eq!(sender.name(), "outbox");

        sender.send_reply(&reply()).await.unwrap();

        let files: Vec<_> = std::fs::read_dir(&outbox)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "eml"))
            .collect();
        assert_eq!(files.len(), 1);
        let raw = std::fs::read_to_string(files[0].path()).unwrap();
        assert!(raw.contains("In-Reply-To: <abc123@mail.example.com>"));
    }

    #[test]
    fn smtp_sender_from_config() {
        let config = ReplyConfig {
            from_name: "QR App".into(),
            transport: ReplyTransport::Smtp {
                host: "smtp.test.com".into(),
                port: 587,
                username: "user".into(),
                password: secrecy::SecretString::from("pass"),
            },
        };
        let sender = EmailReplySender::from_config(&config).unwrap();
        assert_eq!(sender.name(), "smtp");
    }
}
