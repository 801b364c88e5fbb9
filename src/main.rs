use std::sync::Arc;

use anyhow::Context;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use qr_reply::channels::EmailReplySender;
use qr_reply::config::AppConfig;
use qr_reply::pipeline::{AttachmentPipeline, decode_batch};
use qr_reply::render::ImageQrRenderer;
use qr_reply::store::FsBlobStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().context("Invalid configuration")?;

    eprintln!("📨 QR Reply v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Files bucket: {}", config.pipeline.files_bucket);
    eprintln!("   Public URL: {}", config.pipeline.public_base_url);
    eprintln!("   Storage root: {}", config.storage_root.display());

    // ── Collaborators ────────────────────────────────────────────────────
    let store = Arc::new(FsBlobStore::new(
        &config.storage_root,
        &config.pipeline.work_dir,
    ));
    let mailer =
        Arc::new(EmailReplySender::from_config(&config.reply).context("Invalid reply transport")?);
    let renderer = Arc::new(ImageQrRenderer::new());
    let pipeline = AttachmentPipeline::new(store, mailer, renderer, config.pipeline.clone());

    // ── Input batch ──────────────────────────────────────────────────────
    let raw = match std::env::args().nth(1) {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read batch from {path}"))?,
        None => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("Failed to read batch from stdin")?;
            buf
        }
    };
    let messages = decode_batch(&raw).context("Invalid notification batch")?;
    tracing::info!(count = messages.len(), "Notification batch decoded");

    // ── Cancellation ─────────────────────────────────────────────────────
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, cancelling");
                cancel.cancel();
            }
        });
    }

    for message in &messages {
        if cancel.is_cancelled() {
            tracing::warn!(key = %message.object_key, "Skipping message after cancellation");
            continue;
        }
        if let Err(e) = pipeline.process_email(message, &cancel).await {
            tracing::error!(key = %message.object_key, error = %e, "Message failed");
        }
    }

    Ok(())
}
