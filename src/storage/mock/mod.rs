//! Mock storage implementations for testing.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CanonicalStore, Result, StorageError};
use crate::model::CanonicalDataset;

/// Mock canonical store that keeps the last written dataset in memory.
#[derive(Default)]
pub struct MockCanonicalStore {
    dataset: RwLock<Option<CanonicalDataset>>,
    fail_on_replace: RwLock<bool>,
    fail_on_load: RwLock<bool>,
    replace_calls: RwLock<usize>,
}

impl MockCanonicalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_replace(&self, fail: bool) {
        *self.fail_on_replace.write().await = fail;
    }

    pub async fn set_fail_on_load(&self, fail: bool) {
        *self.fail_on_load.write().await = fail;
    }

    pub async fn get_stored(&self) -> Option<CanonicalDataset> {
        self.dataset.read().await.clone()
    }

    pub async fn replace_calls(&self) -> usize {
        *self.replace_calls.read().await
    }
}

#[async_trait]
impl CanonicalStore for MockCanonicalStore {
    async fn replace(&self, dataset: &CanonicalDataset) -> Result<()> {
        *self.replace_calls.write().await += 1;
        if *self.fail_on_replace.read().await {
            return Err(StorageError::Unavailable("replace disabled".to_string()));
        }
        *self.dataset.write().await = Some(dataset.clone());
        Ok(())
    }

    async fn load(&self) -> Result<CanonicalDataset> {
        if *self.fail_on_load.read().await {
            return Err(StorageError::Unavailable("load disabled".to_string()));
        }
        Ok(self.dataset.read().await.clone().unwrap_or_default())
    }
}
