//! File-backed vault layout shared with the external processor.
//!
//! The vault is a directory on disk containing:
//! - `Inbox/whatsapp/`: persisted media and fallback event files
//! - `Logs/whatsapp_errors.log`: append-only error log

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::VaultError;

/// Well-known vault paths, relative to the root.
pub mod paths {
    pub const INBOX: &str = "Inbox/whatsapp";
    pub const LOGS: &str = "Logs";
    pub const ERROR_LOG: &str = "Logs/whatsapp_errors.log";
}

/// Vault rooted at a directory on disk.
#[derive(Debug, Clone)]
pub struct Vault {
    root: PathBuf,
}

impl Vault {
    /// Create a vault handle rooted at `root`. Nothing is touched on disk.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory receiving media artifacts and fallback files.
    pub fn inbox_dir(&self) -> PathBuf {
        self.root.join(paths::INBOX)
    }

    pub fn error_log_path(&self) -> PathBuf {
        self.root.join(paths::ERROR_LOG)
    }

    /// Ensure the inbox and log directories exist.
    pub async fn ensure_dirs(&self) -> Result<(), VaultError> {
        fs::create_dir_all(self.inbox_dir()).await?;
        fs::create_dir_all(self.root.join(paths::LOGS)).await?;
        Ok(())
    }

    /// Append one `[<timestamp>] ERROR: <message>` line to the error log.
    pub async fn append_error(&self, message: &str) -> Result<(), VaultError> {
        let path = self.error_log_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let line = format_error_line(&now, message);
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Append to the error log, reporting (not propagating) a failure.
    pub async fn record_error(&self, message: &str) {
        if let Err(e) = self.append_error(message).await {
            tracing::warn!(error = %e, "Failed to append to error log");
        }
    }
}

/// Error-log lines are single-line; embedded newlines are flattened.
fn format_error_line(timestamp: &str, message: &str) -> String {
    let flat = message.replace(['\r', '\n'], " ");
    format!("[{timestamp}] ERROR: {}\n", flat.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_under_root() {
        let vault = Vault::new("/srv/vault");
        assert_eq!(vault.inbox_dir(), PathBuf::from("/srv/vault/Inbox/whatsapp"));
        assert_eq!(
            vault.error_log_path(),
            PathBuf::from("/srv/vault/Logs/whatsapp_errors.log")
        );
    }

    #[test]
    fn error_line_format() {
        let line = format_error_line("2026-01-02T03:04:05.000Z", "boom\nsecond line\n");
        assert_eq!(line, "[2026-01-02T03:04:05.000Z] ERROR: boom second line\n");
    }

    #[tokio::test]
    async fn ensure_dirs_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let vault = Vault::new(dir.path());
        vault.ensure_dirs().await.unwrap();
        assert!(vault.inbox_dir().is_dir());
        assert!(dir.path().join("Logs").is_dir());
    }

    #[tokio::test]
    async fn append_error_is_line_oriented() {
        let dir = tempfile::tempdir().unwrap();
        let vault = Vault::new(dir.path());

        vault.append_error("first").await.unwrap();
        vault.append_error("second").await.unwrap();

        let content = std::fs::read_to_string(vault.error_log_path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] ERROR: first"));
        assert!(lines[1].ends_with("] ERROR: second"));
    }
}
