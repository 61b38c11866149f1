//! File-backed exchange store.
//!
//! Publications live in a directory shared between producers and consumers
//! (NFS, a synced volume, or a local path on a single host):
//!
//! ```text
//! <root>/<producer>/<identifier>.json
//! ```
//!
//! Each key is its own file, so producers writing different keys never
//! contend. Writes are atomic, which means a concurrent `list` sees either
//! the previous or the new publication, never a torn one.
//!
//! # Example
//!
//! ```rust,no_run
//! use barman_conf::exchange::{ExchangeStore, FileStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = FileStore::new("/var/lib/barman-conf/exchange");
//!     for publication in store.list().await? {
//!         println!("{} from {}", publication.identifier(), publication.producer);
//!     }
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::store::ExchangeStore;
use super::types::{ProducerId, Publication};
use crate::server::ServerName;
use crate::Result;

const EXTENSION: &str = "json";

pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn producer_dir(&self, producer: &ProducerId) -> PathBuf {
        self.root.join(producer.as_str())
    }

    fn entry_path(&self, producer: &ProducerId, identifier: &ServerName) -> PathBuf {
        self.producer_dir(producer)
            .join(format!("{}.{}", identifier, EXTENSION))
    }

    async fn read_entry(path: &Path) -> Option<Publication> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable publication");
                return None;
            }
        };
        match serde_json::from_str::<Publication>(&content) {
            Ok(publication) => Some(publication),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping invalid publication");
                None
            }
        }
    }

    async fn list_dir(&self, dir: &Path, producer: &ProducerId) -> Result<Vec<Publication>> {
        let mut publications = Vec::new();
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(publications),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(publication) = Self::read_entry(&path).await else {
                continue;
            };

            let expected = self.entry_path(&publication.producer, publication.identifier());
            if &publication.producer != producer || expected != path {
                warn!(
                    path = %path.display(),
                    producer = %publication.producer,
                    identifier = %publication.identifier(),
                    "Skipping publication stored under a foreign key"
                );
                continue;
            }
            publications.push(publication);
        }

        Ok(publications)
    }
}

#[async_trait]
impl ExchangeStore for FileStore {
    /// Writes the publication atomically.
    ///
    /// The document goes to a temporary file in the producer directory,
    /// is synced, then renamed over the final path.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the directory cannot be created or any filesystem
    /// step fails.
    async fn put(&self, publication: &Publication) -> Result<()> {
        let dir = self.producer_dir(&publication.producer);
        fs::create_dir_all(&dir).await?;

        let path = self.entry_path(&publication.producer, publication.identifier());
        let temp_path = path.with_extension("tmp");

        let json = serde_json::to_string_pretty(publication)?;
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;

        fs::rename(&temp_path, &path).await?;

        debug!(
            producer = %publication.producer,
            identifier = %publication.identifier(),
            "Publication written"
        );
        Ok(())
    }

    async fn get(
        &self,
        producer: &ProducerId,
        identifier: &ServerName,
    ) -> Result<Option<Publication>> {
        let path = self.entry_path(producer, identifier);
        match fs::metadata(&path).await {
            Ok(_) => Ok(Self::read_entry(&path).await),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, producer: &ProducerId, identifier: &ServerName) -> Result<bool> {
        let path = self.entry_path(producer, identifier);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(producer = %producer, identifier = %identifier, "Publication removed");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<Publication>> {
        let mut publications = Vec::new();
        let mut producers = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(root = %self.root.display(), "Exchange directory does not exist yet");
                return Ok(publications);
            }
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = producers.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let producer = match ProducerId::new(name.as_str()) {
                Ok(producer) => producer,
                Err(_) => {
                    warn!(dir = %name, "Skipping directory that is not a producer id");
                    continue;
                }
            };
            publications.extend(self.list_dir(&entry.path(), &producer).await?);
        }

        Ok(publications)
    }

    async fn list_producer(&self, producer: &ProducerId) -> Result<Vec<Publication>> {
        self.list_dir(&self.producer_dir(producer), producer).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{ServerDeclaration, ServerRecord};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn publication(producer: &str, name: &str) -> Publication {
        let decl = ServerDeclaration {
            conninfo: Some(format!("host={}", producer)),
            ssh_command: Some(format!("ssh postgres@{}", producer)),
            ..ServerDeclaration::new(name)
        };
        Publication::new(
            ProducerId::new(producer).unwrap(),
            ServerRecord::new(&decl, None).unwrap(),
            BTreeMap::new(),
        )
    }

    #[tokio::test]
    async fn test_put_get_remove() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path().join("exchange"));

        assert!(store.list().await.unwrap().is_empty());

        let p = publication("db1.example.com", "server1");
        store.put(&p).await.unwrap();
        assert!(temp_dir
            .path()
            .join("exchange/db1.example.com/server1.json")
            .exists());

        let loaded = store.get(&p.producer, p.identifier()).await.unwrap().unwrap();
        assert_eq!(loaded, p);

        assert!(store.remove(&p.producer, p.identifier()).await.unwrap());
        assert!(!store.remove(&p.producer, p.identifier()).await.unwrap());
        assert!(store.get(&p.producer, p.identifier()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_replaces_existing_key() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path());

        let first = publication("db1", "server1");
        store.put(&first).await.unwrap();

        let mut second = publication("db1", "server1");
        second.record.description = "updated".to_string();
        store.put(&second).await.unwrap();

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].record.description, "updated");
        assert!(!temp_dir.path().join("db1/server1.tmp").exists());
    }

    #[tokio::test]
    async fn test_list_skips_garbage() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path());
        store.put(&publication("db1", "server1")).await.unwrap();

        std::fs::write(temp_dir.path().join("db1/broken.json"), "{not json").unwrap();
        std::fs::write(temp_dir.path().join("db1/notes.txt"), "ignored").unwrap();
        std::fs::write(temp_dir.path().join("stray.json"), "{}").unwrap();

        // A valid document filed under the wrong producer directory.
        let foreign = serde_json::to_string(&publication("db2", "server2")).unwrap();
        std::fs::write(temp_dir.path().join("db1/server2.json"), foreign).unwrap();

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].identifier().as_str(), "server1");
    }

    #[tokio::test]
    async fn test_list_skips_records_failing_validation() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path());
        store.put(&publication("db1", "server1")).await.unwrap();

        let mut hand_written = serde_json::to_value(publication("db1", "server2")).unwrap();
        hand_written["record"]["ssh_command"] = serde_json::Value::String(String::new());
        std::fs::write(
            temp_dir.path().join("db1/server2.json"),
            serde_json::to_string(&hand_written).unwrap(),
        )
        .unwrap();

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].identifier().as_str(), "server1");
    }

    #[tokio::test]
    async fn test_list_producer() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path());
        store.put(&publication("db1", "a")).await.unwrap();
        store.put(&publication("db1", "b")).await.unwrap();
        store.put(&publication("db2", "c")).await.unwrap();

        let db1 = ProducerId::new("db1").unwrap();
        let mut names: Vec<String> = store
            .list_producer(&db1)
            .await
            .unwrap()
            .iter()
            .map(|p| p.identifier().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);

        let missing = ProducerId::new("db9").unwrap();
        assert!(store.list_producer(&missing).await.unwrap().is_empty());
    }
}
