//! Attachment pipeline: turns one inbound email into published files, QR
//! codes and a threaded reply.
//!
//! Flow:
//! 1. Fetch the raw message and extract its attachments
//! 2. No attachments → apology reply, done
//! 3. Classify → optional shared background image
//! 4. One concurrent unit per selected attachment (upload, render, upload QR)
//! 5. Sort results by name, compose, reply
//!
//! Unit failures end up in the reply. Fetch, parse, missing recipients,
//! reply failures and cancellation fail the whole run.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::channels::{OutgoingReply, ReplySender, parse_attachments};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, StorageError, UnitError};
use crate::pipeline::classifier::{BackgroundSelection, Classification, classify};
use crate::pipeline::reply::{ReplyBody, compose};
use crate::pipeline::sanitize::sanitize;
use crate::pipeline::types::{
    Attachment, InboundMessage, ProcessingResult, PublishedUrls, RunOutcome, sort_results,
};
use crate::render::{DEFAULT_MODULE_WIDTH, QrRenderer};
use crate::store::{BlobStore, LocalHandle};

/// Suffix appended to an attachment key for its QR image.
pub const QR_SUFFIX: &str = ".qr.png";

/// Content type of uploaded QR images.
const QR_CONTENT_TYPE: &str = "image/png";

/// Resolve `fut` unless `cancel` fires first.
async fn until_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}

/// Public URL of `key`: the base URL's path joined with the key by exactly one `/`.
pub fn public_url(base: &Url, key: &str) -> String {
    let mut url = base.clone();
    let path = format!(
        "{}/{}",
        base.path().trim_end_matches('/'),
        key.trim_start_matches('/')
    );
    url.set_path(&path);
    url.to_string()
}

/// Orchestrates one run per inbound email.
pub struct AttachmentPipeline {
    store: Arc<dyn BlobStore>,
    mailer: Arc<dyn ReplySender>,
    renderer: Arc<dyn QrRenderer>,
    config: PipelineConfig,
    unit_permits: Option<Arc<Semaphore>>,
}

impl AttachmentPipeline {
    pub fn new(
        store: Arc<dyn BlobStore>,
        mailer: Arc<dyn ReplySender>,
        renderer: Arc<dyn QrRenderer>,
        config: PipelineConfig,
    ) -> Self {
        let unit_permits = config
            .max_concurrent_units
            .map(|n| Arc::new(Semaphore::new(n.max(1))));
        Self {
            store,
            mailer,
            renderer,
            config,
            unit_permits,
        }
    }

    /// Process one inbound email end to end.
    ///
    /// The downloaded raw message is removed before returning, whatever the
    /// outcome.
    pub async fn process_email(
        &self,
        message: &InboundMessage,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, PipelineError> {
        info!(
            bucket = %message.bucket,
            key = %message.object_key,
            sender = %message.return_path,
            from = ?message.from,
            received_at = ?message.received_at,
            subject = %message.subject,
            "Processing inbound email"
        );

        let handle = until_cancelled(
            cancel,
            self.store
                .download_to_local(&message.bucket, &message.object_key),
        )
        .await
        .ok_or(PipelineError::Cancelled)?
        .map_err(PipelineError::Fetch)?;

        let outcome = self.run(message, &handle, cancel).await;

        if let Err(e) = self.store.remove_local(&handle).await {
            warn!(path = %handle.path().display(), error = %e, "Failed to remove raw message copy");
        }

        match &outcome {
            Ok(o) => info!(
                message_id = %message.message_id,
                outcome = o.label(),
                "Run finished"
            ),
            Err(e) => error!(
                message_id = %message.message_id,
                error = %e,
                "Run failed"
            ),
        }
        outcome
    }

    async fn run(
        &self,
        message: &InboundMessage,
        handle: &LocalHandle,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, PipelineError> {
        let raw = tokio::fs::read(handle.path())
            .await
            .map_err(|e| PipelineError::Fetch(StorageError::io(handle.path(), e)))?;
        let attachments = parse_attachments(&raw)?;
        let reply_from = message.reply_from()?;

        info!(
            sender = %message.return_path,
            subject = %message.subject,
            attachments = attachments.len(),
            "Extracted attachments"
        );

        if attachments.is_empty() {
            self.send_reply(message, reply_from, ReplyBody::no_attachments(), cancel)
                .await?;
            return Ok(RunOutcome::NoAttachments);
        }

        let Classification {
            selected,
            background,
        } = classify(attachments);
        info!(
            selected = selected.len(),
            background = background.image().map(|a| a.name.as_str()).unwrap_or("none"),
            "Classified attachments"
        );

        let run_dir = self.config.work_dir.join(format!("run-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&run_dir)
            .await
            .map_err(|source| PipelineError::WorkDir {
                path: run_dir.clone(),
                source,
            })?;

        let generated = self.generate(&run_dir, &selected, &background, cancel).await;

        if let Err(e) = tokio::fs::remove_dir_all(&run_dir).await {
            warn!(path = %run_dir.display(), error = %e, "Failed to remove work directory");
        }

        let mut results = generated?;
        sort_results(&mut results);

        let body = compose(&results);
        self.send_reply(message, reply_from, body, cancel).await?;
        Ok(RunOutcome::Replied { results })
    }

    /// Fan out one unit per selected attachment and wait for all of them.
    async fn generate(
        &self,
        run_dir: &Path,
        selected: &[Attachment],
        background: &BackgroundSelection,
        cancel: &CancellationToken,
    ) -> Result<Vec<ProcessingResult>, PipelineError> {
        let background_path = match background.image() {
            Some(image) => {
                let path = run_dir.join(format!("background-{}", sanitize(&image.name)));
                tokio::fs::write(&path, &image.content)
                    .await
                    .map_err(|source| PipelineError::Background {
                        path: path.clone(),
                        source,
                    })?;
                Some(path)
            }
            None => None,
        };

        let units = selected.iter().enumerate().map(|(index, attachment)| {
            self.run_unit(index, attachment, background_path.as_deref(), run_dir, cancel)
        });
        let results = join_all(units).await;

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(results)
    }

    async fn run_unit(
        &self,
        index: usize,
        attachment: &Attachment,
        background: Option<&Path>,
        run_dir: &Path,
        cancel: &CancellationToken,
    ) -> ProcessingResult {
        let _permit = match &self.unit_permits {
            Some(permits) => match until_cancelled(cancel, permits.acquire()).await {
                Some(Ok(permit)) => Some(permit),
                _ => return ProcessingResult::failed(&attachment.name, UnitError::Cancelled),
            },
            None => None,
        };

        match self
            .publish(index, attachment, background, run_dir, cancel)
            .await
        {
            Ok(urls) => {
                debug!(
                    name = %attachment.name,
                    url = %urls.attachment_url,
                    qr = %urls.qr_image_url,
                    "Published attachment"
                );
                ProcessingResult::published(&attachment.name, urls)
            }
            Err(e) => {
                warn!(name = %attachment.name, error = %e, "Attachment unit failed");
                ProcessingResult::failed(&attachment.name, e)
            }
        }
    }

    /// Upload the attachment, then its QR. Rolls back the attachment upload
    /// if anything after it fails.
    async fn publish(
        &self,
        index: usize,
        attachment: &Attachment,
        background: Option<&Path>,
        run_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PublishedUrls, UnitError> {
        let bucket = self.config.files_bucket.as_str();
        let key = sanitize(&attachment.name);

        until_cancelled(
            cancel,
            self.store
                .upload(bucket, &key, &attachment.content_type, &attachment.content),
        )
        .await
        .ok_or(UnitError::Cancelled)??;

        let attachment_url = public_url(&self.config.public_base_url, &key);
        let qr_key = format!("{key}{QR_SUFFIX}");
        let temp = run_dir.join(format!("{index}-{qr_key}"));

        match self
            .publish_qr(&attachment_url, &qr_key, background, &temp, cancel)
            .await
        {
            Ok(qr_image_url) => Ok(PublishedUrls {
                attachment_url,
                qr_image_url,
            }),
            Err(e) => {
                // Not bound to the token: must run while cancelling too.
                match self.store.delete(bucket, &key).await {
                    Ok(()) => debug!(key = %key, "Rolled back attachment upload"),
                    Err(del) => warn!(key = %key, error = %del, "Rollback delete failed"),
                }
                Err(e)
            }
        }
    }

    async fn publish_qr(
        &self,
        url: &str,
        qr_key: &str,
        background: Option<&Path>,
        temp: &Path,
        cancel: &CancellationToken,
    ) -> Result<String, UnitError> {
        let result = async {
            until_cancelled(
                cancel,
                self.renderer
                    .render(url, background, temp, DEFAULT_MODULE_WIDTH),
            )
            .await
            .ok_or(UnitError::Cancelled)??;

            let bytes = tokio::fs::read(temp)
                .await
                .map_err(|source| UnitError::Io {
                    path: temp.to_path_buf(),
                    source,
                })?;

            until_cancelled(
                cancel,
                self.store
                    .upload(&self.config.files_bucket, qr_key, QR_CONTENT_TYPE, &bytes),
            )
            .await
            .ok_or(UnitError::Cancelled)??;

            Ok::<_, UnitError>(public_url(&self.config.public_base_url, qr_key))
        }
        .await;

        match tokio::fs::remove_file(temp).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                warn!(path = %temp.display(), error = %e, "Failed to remove QR temp file");
            }
            _ => {}
        }
        result
    }

    async fn send_reply(
        &self,
        message: &InboundMessage,
        from: &str,
        body: ReplyBody,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let reply = OutgoingReply {
            in_reply_to: message.message_id.clone(),
            from: from.to_string(),
            to: message.return_path.clone(),
            subject: message.subject.clone(),
            text: body.text,
            html: body.html,
        };

        until_cancelled(cancel, self.mailer.send_reply(&reply))
            .await
            .ok_or(PipelineError::Cancelled)??;

        info!(
            to = %reply.to,
            transport = self.mailer.name(),
            "Reply sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_url_joins_with_single_slash() {
        let base = Url::parse("http://qr.mydomain.com").unwrap();
        assert_eq!(
            public_url(&base, "historia-social-el-circo.pdf"),
            "http://qr.mydomain.com/historia-social-el-circo.pdf"
        );

        let nested = Url::parse("https://cdn.example.com/files/").unwrap();
        assert_eq!(
            public_url(&nested, "/a-text-file.qr.png"),
            "https://cdn.example.com/files/a-text-file.qr.png"
        );

        let no_trailing = Url::parse("https://cdn.example.com/files").unwrap();
        assert_eq!(
            public_url(&no_trailing, "x.pdf"),
            "https://cdn.example.com/files/x.pdf"
        );
    }

    #[test]
    fn public_url_percent_encodes_raw_extensions() {
        let base = Url::parse("http://qr.mydomain.com").unwrap();
        assert_eq!(
            public_url(&base, "scan.tar gz"),
            "http://qr.mydomain.com/scan.tar%20gz"
        );
        assert_eq!(
            public_url(&base, "x.p\"d#f"),
            "http://qr.mydomain.com/x.p%22d%23f"
        );
    }

    #[tokio::test]
    async fn until_cancelled_prefers_cancellation() {
        let cancel = CancellationToken::new();
        assert_eq!(until_cancelled(&cancel, async { 7 }).await, Some(7));
        cancel.cancel();
        assert_eq!(until_cancelled(&cancel, async { 7 }).await, None);
    }
}
