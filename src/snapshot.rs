//! Consumer snapshot persistence.
//!
//! The backup host remembers which records it materialized on its last run
//! so that the next run can tell creations, updates and retractions apart.
//!
//! # Example
//!
//! ```rust,no_run
//! use barman_conf::snapshot::{Snapshot, SnapshotManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = SnapshotManager::new("snapshot.json");
//!
//!     let previous = manager.load().await?.unwrap_or_default();
//!     println!("{} servers materialized last time", previous.records.len());
//!
//!     manager.save(&Snapshot::new(Vec::new(), Default::default(), previous.generation + 1)).await?;
//!     Ok(())
//! }
//! ```

use crate::exchange::Collection;
use crate::server::{ServerName, ServerRecord};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

/// The set of records materialized by one consumer run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Records as written to disk, ordered by identifier
    pub records: Vec<ServerRecord>,
    /// Publication time of each record when it was collected
    #[serde(default)]
    pub published: BTreeMap<ServerName, DateTime<Utc>>,
    /// Monotonic run counter
    pub generation: u64,
    /// When this snapshot was taken
    pub timestamp: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn new(
        records: Vec<ServerRecord>,
        published: BTreeMap<ServerName, DateTime<Utc>>,
        generation: u64,
    ) -> Self {
        Self {
            records,
            published,
            generation,
            timestamp: Some(Utc::now()),
        }
    }

    /// Builds the snapshot that follows this one.
    ///
    /// `records` is the settled set of the run. Publication times come from
    /// `collection`, except for identifiers in `failed`: those kept their
    /// previous record, so they also keep the time recorded here.
    pub fn advance(
        &self,
        records: Vec<ServerRecord>,
        collection: &Collection,
        failed: &[ServerName],
    ) -> Snapshot {
        let published = records
            .iter()
            .filter_map(|record| {
                let identifier = &record.identifier;
                let at = if failed.contains(identifier) {
                    self.published.get(identifier).copied()
                } else {
                    collection
                        .publications
                        .iter()
                        .find(|p| p.identifier() == identifier)
                        .map(|p| p.published_at)
                };
                at.map(|at| (identifier.clone(), at))
            })
            .collect();

        Snapshot::new(records, published, self.generation + 1)
    }

    /// Identifiers whose collected publication is older than the one seen
    /// on the previous run.
    ///
    /// This happens when a producer's clock or store replica lags behind.
    /// Stale records still go through the normal update path.
    pub fn stale_identifiers(&self, collection: &Collection) -> Vec<ServerName> {
        collection
            .publications
            .iter()
            .filter(|p| {
                self.published
                    .get(p.identifier())
                    .is_some_and(|seen| p.published_at < *seen)
            })
            .map(|p| p.identifier().clone())
            .collect()
    }
}

/// Manages snapshot persistence to disk.
///
/// Writes are atomic: the snapshot file is never partially written even if
/// the process dies mid-save.
pub struct SnapshotManager {
    file_path: PathBuf,
}

impl SnapshotManager {
    pub fn new(snapshot_path: impl AsRef<Path>) -> Self {
        Self {
            file_path: snapshot_path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Loads the snapshot if it exists.
    ///
    /// Returns `None` on the first run.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the file exists but cannot be read or parsed. A
    /// corrupt snapshot is not silently replaced by an empty one, since that
    /// would hide every retraction since the last good run.
    pub async fn load(&self) -> Result<Option<Snapshot>> {
        if !self.file_path.exists() {
            debug!("No snapshot file found at {:?}", self.file_path);
            return Ok(None);
        }

        match fs::read_to_string(&self.file_path).await {
            Ok(content) => match serde_json::from_str::<Snapshot>(&content) {
                Ok(snapshot) => {
                    info!(
                        generation = snapshot.generation,
                        records = snapshot.records.len(),
                        "Loaded snapshot"
                    );
                    Ok(Some(snapshot))
                }
                Err(e) => {
                    error!("Failed to parse snapshot file: {}", e);
                    Err(Error::Serialization(e))
                }
            },
            Err(e) => {
                error!("Failed to read snapshot file: {}", e);
                Err(Error::Io(e))
            }
        }
    }

    /// Saves the snapshot atomically.
    ///
    /// Writes a temporary file, syncs it, then renames it over the final
    /// location.
    pub async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        debug!(generation = snapshot.generation, "Saving snapshot");

        if let Some(parent) = self.file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = self.file_path.with_extension("tmp");

        let json = serde_json::to_string_pretty(snapshot)?;
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;

        fs::rename(&temp_path, &self.file_path).await?;

        debug!("Snapshot saved successfully");
        Ok(())
    }

    /// Deletes the snapshot file if it exists.
    ///
    /// The next run then treats every collected record as new.
    pub async fn delete(&self) -> Result<()> {
        if self.file_path.exists() {
            fs::remove_file(&self.file_path).await?;
            info!("Deleted snapshot file");
        }
        Ok(())
    }
}
