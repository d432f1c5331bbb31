//! Attachment download and persistence into the inbox.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::MediaError;
use crate::pipeline::types::{MediaArtifact, MediaSource, RawMessage};
use crate::vault::Vault;

/// Prefix for generated attachment names.
const GENERATED_PREFIX: &str = "media";

/// MIME type used when the source does not report one.
const FALLBACK_MIME: &str = "application/octet-stream";

/// Characters that are unsafe in filenames on common filesystems.
static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\x00-\x1f/\\:*?"<>|]"#).unwrap());

/// Decoded attachment before it is written.
#[derive(Debug)]
struct DownloadedMedia {
    mime_type: String,
    filename: Option<String>,
    bytes: Vec<u8>,
}

/// Downloads attachments and writes them into the vault inbox.
#[derive(Debug, Clone)]
pub struct MediaExtractor {
    inbox: PathBuf,
    vault: Vault,
    client: reqwest::Client,
}

impl MediaExtractor {
    pub fn new(vault: &Vault) -> Self {
        Self {
            inbox: vault.inbox_dir(),
            vault: vault.clone(),
            client: reqwest::Client::new(),
        }
    }

    /// Extract and persist the message's attachment.
    ///
    /// Failures are logged, appended to the vault error log and reported as
    /// `None`; the caller carries on as if the message had no media.
    pub async fn extract(&self, message: &RawMessage) -> Option<MediaArtifact> {
        match self.try_extract(message).await {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!(from = %message.from, error = %e, "Continuing without media");
                self.vault
                    .record_error(&format!("Error downloading media: {e}"))
                    .await;
                None
            }
        }
    }

    /// Like [`MediaExtractor::extract`] but surfaces the failure.
    pub async fn try_extract(
        &self,
        message: &RawMessage,
    ) -> Result<Option<MediaArtifact>, MediaError> {
        if !message.has_media {
            return Ok(None);
        }
        let source = message.media.as_ref().ok_or(MediaError::MissingSource)?;

        debug!(from = %message.from, "Downloading media");
        let media = self.download(source).await?;

        let filename = media
            .filename
            .as_deref()
            .and_then(sanitize_filename)
            .unwrap_or_else(|| generated_filename(&message.timestamp));

        let path = self.inbox.join(&filename);
        write_bytes(&path, &media.bytes).await?;

        info!(
            filename = %filename,
            mime_type = %media.mime_type,
            bytes = media.bytes.len(),
            "Media saved"
        );

        Ok(Some(MediaArtifact {
            mime_type: media.mime_type,
            filename,
            path,
        }))
    }

    async fn download(&self, source: &MediaSource) -> Result<DownloadedMedia, MediaError> {
        match source {
            MediaSource::Inline {
                mimetype,
                filename,
                data,
            } => {
                let bytes = STANDARD.decode(data.trim())?;
                Ok(DownloadedMedia {
                    mime_type: mimetype.clone(),
                    filename: filename.clone(),
                    bytes,
                })
            }
            MediaSource::Url {
                url,
                mimetype,
                filename,
            } => {
                let resp = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .and_then(reqwest::Response::error_for_status)
                    .map_err(|e| MediaError::Download(e.to_string()))?;

                let header_mime = resp
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(String::from);

                let bytes = resp
                    .bytes()
                    .await
                    .map_err(|e| MediaError::Download(e.to_string()))?;

                Ok(DownloadedMedia {
                    mime_type: mimetype
                        .clone()
                        .or(header_mime)
                        .unwrap_or_else(|| FALLBACK_MIME.to_string()),
                    filename: filename.clone(),
                    bytes: bytes.to_vec(),
                })
            }
        }
    }
}

async fn write_bytes(path: &Path, bytes: &[u8]) -> Result<(), MediaError> {
    let io_err = |source| MediaError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    fs::write(path, bytes).await.map_err(io_err)
}

/// Reduce an attachment-provided name to a single safe path component.
fn sanitize_filename(raw: &str) -> Option<String> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let cleaned = UNSAFE_FILENAME_CHARS.replace_all(base.trim(), "_");
    let cleaned = cleaned.trim_matches('.');
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// `media_<timestamp>` with a filesystem-safe, second-granularity stamp.
fn generated_filename(timestamp: &DateTime<Utc>) -> String {
    let iso = timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);
    let safe = iso.replace(':', "-");
    let safe = safe.split('.').next().unwrap_or(&safe);
    format!("{GENERATED_PREFIX}_{safe}")
}
