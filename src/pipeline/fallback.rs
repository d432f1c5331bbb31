//! Durable fallback for events the processor could not take.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::error::FallbackError;
use crate::pipeline::types::CanonicalEvent;

/// Give up on finding a free name after this many collisions.
const MAX_NAME_ATTEMPTS: i64 = 1000;

/// Writes undeliverable events as `fallback_<epoch-millis>.json`.
#[derive(Debug, Clone)]
pub struct FallbackPersister {
    inbox: PathBuf,
}

impl FallbackPersister {
    pub fn new(inbox: impl Into<PathBuf>) -> Self {
        Self {
            inbox: inbox.into(),
        }
    }

    /// Persist the event and return where it was written.
    ///
    /// Never overwrites an existing file: on a name collision the
    /// millisecond stamp is bumped until a free name is found.
    pub async fn persist_fallback(&self, event: &CanonicalEvent) -> Result<PathBuf, FallbackError> {
        let content = serde_json::to_vec_pretty(event)?;

        fs::create_dir_all(&self.inbox)
            .await
            .map_err(|source| FallbackError::Write {
                path: self.inbox.clone(),
                source,
            })?;

        let base = Utc::now().timestamp_millis();
        let mut attempt = 0;
        loop {
            let path = fallback_path(&self.inbox, base + attempt);
            match create_new(&path, &content).await {
                Ok(()) => {
                    info!(path = %path.display(), "Saved fallback event");
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists && attempt < MAX_NAME_ATTEMPTS => {
                    attempt += 1;
                }
                Err(source) => return Err(FallbackError::Write { path, source }),
            }
        }
    }
}

fn fallback_path(inbox: &Path, millis: i64) -> PathBuf {
    inbox.join(format!("fallback_{millis}.json"))
}

async fn create_new(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(content).await?;
    file.sync_all().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::ChatType;

    fn event(body: &str) -> CanonicalEvent {
        CanonicalEvent {
            from: "15551234567".into(),
            name: "Alice".into(),
            body: body.into(),
            timestamp: "2026-03-01T10:15:30.000Z".into(),
            chat_type: ChatType::Direct,
            has_media: false,
            group_name: None,
            mentioned: None,
            media_type: None,
            media_filename: None,
            media_files: vec![],
        }
    }

    #[tokio::test]
    async fn writes_decodable_event() {
        let dir = tempfile::tempdir().unwrap();
        let persister = FallbackPersister::new(dir.path());

        let path = persister.persist_fallback(&event("hello")).await.unwrap();

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("fallback_"));
        assert!(name.ends_with(".json"));
        let millis = &name["fallback_".len()..name.len() - ".json".len()];
        assert!(millis.parse::<i64>().is_ok());

        let decoded: CanonicalEvent =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(decoded, event("hello"));
    }

    #[tokio::test]
    async fn creates_missing_inbox() {
        let dir = tempfile::tempdir().unwrap();
        let inbox = dir.path().join("Inbox/whatsapp");
        let persister = FallbackPersister::new(&inbox);
        let path = persister.persist_fallback(&event("x")).await.unwrap();
        assert!(path.starts_with(&inbox));
    }

    #[tokio::test]
    async fn rapid_writes_never_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let persister = FallbackPersister::new(dir.path());

        let mut paths = Vec::new();
        for i in 0..5 {
            paths.push(persister.persist_fallback(&event(&i.to_string())).await.unwrap());
        }
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 5);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 5);
    }

    #[tokio::test]
    async fn unwritable_inbox_surfaces_error() {
        let dir = tempfile::tempdir().unwrap();
        // a regular file where the inbox directory should be
        let blocker = dir.path().join("inbox");
        std::fs::write(&blocker, b"not a dir").unwrap();

        let persister = FallbackPersister::new(&blocker);
        let err = persister.persist_fallback(&event("x")).await.unwrap_err();
        assert!(matches!(err, FallbackError::Write { .. }));
    }
}
