use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info, warn};

use super::{
    CheckpointMetadata, CheckpointReason, Continuation, ContinuationStore, PersistenceError,
    CONTINUATION_VERSION,
};
use crate::config::PersistenceConfig;

const FILE_SUFFIX: &str = ".continuation.json";

/// One JSON file per analysis under the configured directory
pub struct FileSystemContinuationStore {
    config: PersistenceConfig,
}

impl FileSystemContinuationStore {
    pub fn new(config: PersistenceConfig) -> Self {
        Self { config }
    }

    /// Analysis ids are caller supplied. Bytes outside `[A-Za-z0-9_-]` are
    /// percent-encoded so distinct ids never share a file.
    fn file_path(&self, analysis_id: &str) -> PathBuf {
        let mut encoded = String::with_capacity(analysis_id.len());
        for byte in analysis_id.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
                encoded.push(char::from(byte));
            } else {
                encoded.push_str(&format!("%{byte:02X}"));
            }
        }
        self.config.directory.join(format!("{encoded}{FILE_SUFFIX}"))
    }

    fn calculate_integrity_hash(continuation: &Continuation) -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        continuation.analysis_id.hash(&mut hasher);
        continuation.version.hash(&mut hasher);
        continuation.state.hash(&mut hasher);
        continuation.history.len().hash(&mut hasher);
        continuation.poll_count.hash(&mut hasher);
        continuation.created_at.timestamp().hash(&mut hasher);
        if let Some(resume_at) = continuation.resume_at {
            resume_at.timestamp().hash(&mut hasher);
        }

        format!("{:x}", hasher.finish())
    }

    fn verify(&self, continuation: &Continuation) -> Result<(), PersistenceError> {
        if continuation.version != CONTINUATION_VERSION {
            return Err(PersistenceError::VersionMismatch {
                expected: CONTINUATION_VERSION.to_string(),
                found: continuation.version.clone(),
            });
        }

        let expected = Self::calculate_integrity_hash(continuation);
        if self.config.enable_integrity_checks && continuation.checkpoint.integrity_hash != expected
        {
            return Err(PersistenceError::Corruption {
                analysis_id: continuation.analysis_id.clone(),
                reason: "Integrity check failed".to_string(),
            });
        }

        Ok(())
    }

    async fn read(&self, path: &PathBuf) -> Result<Continuation, PersistenceError> {
        let contents = fs::read_to_string(path).await?;
        let continuation: Continuation = serde_json::from_str(&contents)?;
        self.verify(&continuation)?;
        Ok(continuation)
    }
}

#[async_trait]
impl ContinuationStore for FileSystemContinuationStore {
    async fn save(
        &self,
        continuation: &Continuation,
        reason: CheckpointReason,
    ) -> Result<String, PersistenceError> {
        fs::create_dir_all(&self.config.directory).await?;

        let mut to_save = continuation.clone();
        to_save.last_persisted = Utc::now();

        let integrity_hash = if self.config.enable_integrity_checks {
            Self::calculate_integrity_hash(&to_save)
        } else {
            "integrity_disabled".to_string()
        };
        to_save.checkpoint = CheckpointMetadata::capture(reason, integrity_hash);
        let checkpoint_id = to_save.checkpoint.checkpoint_id.clone();

        let path = self.file_path(&continuation.analysis_id);
        let serialized = serde_json::to_string_pretty(&to_save)?;

        // Write to temporary file first, then rename
        let temp_file = format!("{}.tmp", path.display());
        fs::write(&temp_file, serialized).await?;
        fs::rename(&temp_file, &path).await?;

        debug!(
            analysis_id = %continuation.analysis_id,
            checkpoint_id = %checkpoint_id,
            state = %continuation.state,
            reason = ?reason,
            file = ?path,
            "Continuation saved"
        );

        Ok(checkpoint_id)
    }

    async fn load(&self, analysis_id: &str) -> Result<Option<Continuation>, PersistenceError> {
        let path = self.file_path(analysis_id);
        if !fs::try_exists(&path).await? {
            debug!(analysis_id = %analysis_id, file = ?path, "No continuation found");
            return Ok(None);
        }

        let continuation = self.read(&path).await?;
        if continuation.analysis_id != analysis_id {
            return Err(PersistenceError::Corruption {
                analysis_id: analysis_id.to_string(),
                reason: format!("File holds analysis '{}'", continuation.analysis_id),
            });
        }
        info!(
            analysis_id = %analysis_id,
            checkpoint_id = %continuation.checkpoint.checkpoint_id,
            state = %continuation.state,
            "Continuation loaded"
        );
        Ok(Some(continuation))
    }

    async fn remove(&self, analysis_id: &str) -> Result<bool, PersistenceError> {
        let path = self.file_path(analysis_id);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(analysis_id = %analysis_id, "Continuation removed");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<Continuation>, PersistenceError> {
        let mut entries = match fs::read_dir(&self.config.directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut continuations = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_continuation = path
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.ends_with(FILE_SUFFIX))
                .unwrap_or(false);
            if !is_continuation {
                continue;
            }

            match self.read(&path).await {
                Ok(continuation) => continuations.push(continuation),
                Err(e) => warn!(file = ?path, error = %e, "Skipping unreadable continuation"),
            }
        }

        continuations.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(continuations)
    }
}
