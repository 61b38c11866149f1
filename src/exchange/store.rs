use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use super::types::{ProducerId, Publication};
use crate::server::ServerName;
use crate::{Error, Result};

/// Shared storage behind the exchange broker.
///
/// Keys are `(producer, identifier)`; a `put` on an existing key replaces the
/// stored publication. `list` is a point-in-time snapshot and never waits for
/// writes in progress.
#[async_trait]
pub trait ExchangeStore: Send + Sync {
    async fn put(&self, publication: &Publication) -> Result<()>;

    async fn get(&self, producer: &ProducerId, identifier: &ServerName)
        -> Result<Option<Publication>>;

    /// Returns `true` when a publication was removed.
    async fn remove(&self, producer: &ProducerId, identifier: &ServerName) -> Result<bool>;

    async fn list(&self) -> Result<Vec<Publication>>;

    async fn list_producer(&self, producer: &ProducerId) -> Result<Vec<Publication>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|p| &p.producer == producer)
            .collect())
    }
}

type Key = (ProducerId, ServerName);

/// In-process store, mainly for tests and single-host setups.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<Key, Publication>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> Error {
    Error::Store {
        message: "memory store lock poisoned".to_string(),
    }
}

#[async_trait]
impl ExchangeStore for MemoryStore {
    async fn put(&self, publication: &Publication) -> Result<()> {
        let key = (publication.producer.clone(), publication.identifier().clone());
        self.entries
            .write()
            .map_err(|_| poisoned())?
            .insert(key, publication.clone());
        Ok(())
    }

    async fn get(
        &self,
        producer: &ProducerId,
        identifier: &ServerName,
    ) -> Result<Option<Publication>> {
        let key = (producer.clone(), identifier.clone());
        Ok(self.entries.read().map_err(|_| poisoned())?.get(&key).cloned())
    }

    async fn remove(&self, producer: &ProducerId, identifier: &ServerName) -> Result<bool> {
        let key = (producer.clone(), identifier.clone());
        Ok(self
            .entries
            .write()
            .map_err(|_| poisoned())?
            .remove(&key)
            .is_some())
    }

    async fn list(&self) -> Result<Vec<Publication>> {
        Ok(self
            .entries
            .read()
            .map_err(|_| poisoned())?
            .values()
            .cloned()
            .collect())
    }
}
