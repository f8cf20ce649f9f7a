use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{
    CheckpointMetadata, CheckpointReason, Continuation, ContinuationStore, PersistenceError,
};

/// Process-local store, used by tests and one-shot runs
#[derive(Default)]
pub struct InMemoryContinuationStore {
    continuations: RwLock<HashMap<String, Continuation>>,
}

impl InMemoryContinuationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.continuations.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.continuations.read().await.is_empty()
    }
}

#[async_trait]
impl ContinuationStore for InMemoryContinuationStore {
    async fn save(
        &self,
        continuation: &Continuation,
        reason: CheckpointReason,
    ) -> Result<String, PersistenceError> {
        let mut to_save = continuation.clone();
        to_save.last_persisted = Utc::now();
        to_save.checkpoint = CheckpointMetadata::capture(reason, String::new());
        let checkpoint_id = to_save.checkpoint.checkpoint_id.clone();

        self.continuations
            .write()
            .await
            .insert(to_save.analysis_id.clone(), to_save);
        Ok(checkpoint_id)
    }

    async fn load(&self, analysis_id: &str) -> Result<Option<Continuation>, PersistenceError> {
        Ok(self.continuations.read().await.get(analysis_id).cloned())
    }

    async fn remove(&self, analysis_id: &str) -> Result<bool, PersistenceError> {
        Ok(self.continuations.write().await.remove(analysis_id).is_some())
    }

    async fn list(&self) -> Result<Vec<Continuation>, PersistenceError> {
        let mut continuations: Vec<Continuation> =
            self.continuations.read().await.values().cloned().collect();
        continuations.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(continuations)
    }
}
