//! In-memory key store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{KeyHistory, KeyStore};
use crate::error::E2eResult;

/// Process-local key store.
///
/// Clones share the same map, so a clone handed to another component
/// observes every write. Contents are lost when the last clone drops.
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyStore {
    histories: Arc<RwLock<HashMap<String, KeyHistory>>>,
}

impl MemoryKeyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of users with at least one stored generation.
    pub async fn len(&self) -> usize {
        self.histories.read().await.len()
    }

    /// Whether no user has a stored key pair.
    pub async fn is_empty(&self) -> bool {
        self.histories.read().await.is_empty()
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn load_history(&self, user_id: &str) -> E2eResult<Option<KeyHistory>> {
        Ok(self.histories.read().await.get(user_id).cloned())
    }

    async fn save_history(&self, history: &KeyHistory) -> E2eResult<()> {
        self.histories
            .write()
            .await
            .insert(history.user_id.clone(), history.clone());
        Ok(())
    }
}
