//! Configuration types.
//!
//! Everything is read from environment variables. `from_lookup` exists so
//! tests can feed a map instead of mutating the process environment.

use std::path::PathBuf;

use secrecy::SecretString;
use url::Url;

use crate::error::ConfigError;

const DEFAULT_STORAGE_ROOT: &str = "./data/buckets";
const DEFAULT_OUTBOX_DIR: &str = "./data/outbox";
const DEFAULT_FROM_NAME: &str = "QR App";
const DEFAULT_SMTP_PORT: u16 = 587;

/// Full service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    /// Root directory of the filesystem blob store.
    pub storage_root: PathBuf,
    pub reply: ReplyConfig,
}

/// Settings consumed by the attachment pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Bucket that receives artifacts and QR images.
    pub files_bucket: String,
    /// Public base URL under which `files_bucket` objects are served.
    pub public_base_url: Url,
    /// Scratch directory for per-run temp files.
    pub work_dir: PathBuf,
    /// Upper bound on simultaneous attachment units. `None` = one per attachment.
    pub max_concurrent_units: Option<usize>,
}

impl PipelineConfig {
    pub fn new(files_bucket: impl Into<String>, public_base_url: Url) -> Self {
        Self {
            files_bucket: files_bucket.into(),
            public_base_url,
            work_dir: std::env::temp_dir(),
            max_concurrent_units: None,
        }
    }
}

/// Reply transport settings.
#[derive(Debug, Clone)]
pub struct ReplyConfig {
    /// Display name used in the reply's `From` header.
    pub from_name: String,
    pub transport: ReplyTransport,
}

/// Where replies go.
#[derive(Debug, Clone)]
pub enum ReplyTransport {
    Smtp {
        host: String,
        port: u16,
        username: String,
        password: SecretString,
    },
    /// Write `.eml` files into a directory instead of sending.
    Outbox { dir: PathBuf },
}

impl AppConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let files_bucket =
            var("FILES_BUCKET").ok_or_else(|| ConfigError::MissingEnvVar("FILES_BUCKET".into()))?;

        let raw_url = var("FILES_BUCKET_URL").unwrap_or_else(|| format!("http://{files_bucket}"));
        let public_base_url = parse_base_url(&raw_url)?;

        let work_dir = var("QR_WORK_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);

        let max_concurrent_units = match var("QR_MAX_CONCURRENT_UNITS") {
            Some(raw) => Some(parse_positive(&raw, "QR_MAX_CONCURRENT_UNITS")?),
            None => None,
        };

        let storage_root = var("QR_STORAGE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_ROOT));

        let from_name = var("QR_REPLY_FROM_NAME").unwrap_or_else(|| DEFAULT_FROM_NAME.to_string());

        let transport = if let Some(host) = var("SMTP_HOST") {
            let port = match var("SMTP_PORT") {
                Some(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
                    key: "SMTP_PORT".into(),
                    message: format!("{e}"),
                })?,
                None => DEFAULT_SMTP_PORT,
            };
            ReplyTransport::Smtp {
                host,
                port,
                username: var("SMTP_USERNAME").unwrap_or_default(),
                password: SecretString::from(var("SMTP_PASSWORD").unwrap_or_default()),
            }
        } else {
            ReplyTransport::Outbox {
                dir: var("QR_OUTBOX_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTBOX_DIR)),
            }
        };

        Ok(Self {
            pipeline: PipelineConfig {
                files_bucket,
                public_base_url,
                work_dir,
                max_concurrent_units,
            },
            storage_root,
            reply: ReplyConfig {
                from_name,
                transport,
            },
        })
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidValue {
        key: "FILES_BUCKET_URL".into(),
        message: format!("{e}"),
    })?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidValue {
            key: "FILES_BUCKET_URL".into(),
            message: format!("{raw} cannot be used as a base URL"),
        });
    }
    Ok(url)
}

fn parse_positive(raw: &str, key: &str) -> Result<usize, ConfigError> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        Ok(_) => Err(ConfigError::InvalidValue {
            key: key.into(),
            message: "must be greater than zero".into(),
        }),
        Err(e) => Err(ConfigError::InvalidValue {
            key: key.into(),
            message: format!("{e}"),
        }),
    }
}
