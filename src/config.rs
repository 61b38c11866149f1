use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::exchange::{Labels, ProducerId, Selector};
use crate::reconcile::apply::DEFAULT_BARMAN_BIN;
use crate::reconcile::fs::DEFAULT_CONFIG_DIR;
use crate::reconcile::ApplyOptions;
use crate::server::postgres::{DEFAULT_HOST_GROUP, HOST_GROUP_LABEL};
use crate::server::{PostgresProfile, ServerDeclaration, ServerRecord};
use crate::{Error, Result};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub producer: Option<ProducerConfig>,
    #[serde(default)]
    pub consumer: Option<ConsumerConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExchangeConfig {
    pub path: PathBuf,
}

/// Settings for a database host publishing its servers.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProducerConfig {
    /// Host identity; also the default `host` for structured connections
    pub id: String,
    #[serde(default = "default_labels")]
    pub labels: Labels,
    #[serde(default)]
    pub servers: Vec<ServerDeclaration>,
    #[serde(default)]
    pub postgres: Option<PostgresProfile>,
}

/// Settings for the backup host collecting servers.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConsumerConfig {
    #[serde(default = "default_selector")]
    pub selector: Selector,
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,
    #[serde(default = "default_snapshot_file")]
    pub snapshot_file: PathBuf,
    #[serde(default = "default_barman_bin")]
    pub barman_bin: String,
    #[serde(default = "default_run_checks")]
    pub run_checks: bool,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("BARMAN_CONF")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn producer(&self) -> Result<&ProducerConfig> {
        self.producer
            .as_ref()
            .ok_or_else(|| Error::Config("missing [producer] section".to_string()))
    }

    pub fn consumer(&self) -> Result<&ConsumerConfig> {
        self.consumer
            .as_ref()
            .ok_or_else(|| Error::Config("missing [consumer] section".to_string()))
    }
}

impl ProducerConfig {
    pub fn producer_id(&self) -> Result<ProducerId> {
        ProducerId::new(self.id.as_str())
    }

    /// Validates every declaration of this host.
    ///
    /// Stops at the first invalid declaration, so a host with any bad
    /// declaration publishes nothing.
    pub fn records(&self) -> Result<Vec<(ServerRecord, Labels)>> {
        let mut records = Vec::with_capacity(self.servers.len() + 1);

        if let Some(profile) = &self.postgres {
            let mut labels = self.labels.clone();
            labels.extend(profile.labels());
            records.push((profile.record(&self.id)?, labels));
        }
        for declaration in &self.servers {
            records.push((ServerRecord::new(declaration, Some(self.id.as_str()))?, self.labels.clone()));
        }

        Ok(records)
    }
}

impl ConsumerConfig {
    pub fn apply_options(&self) -> ApplyOptions {
        ApplyOptions {
            barman_bin: self.barman_bin.clone(),
            run_checks: self.run_checks,
        }
    }
}

fn default_labels() -> Labels {
    BTreeMap::from([(HOST_GROUP_LABEL.to_string(), DEFAULT_HOST_GROUP.to_string())])
}

fn default_selector() -> Selector {
    Selector::all().with(HOST_GROUP_LABEL, DEFAULT_HOST_GROUP)
}

fn default_config_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_DIR)
}

fn default_snapshot_file() -> PathBuf {
    PathBuf::from("/var/lib/barman-conf/snapshot.json")
}

fn default_barman_bin() -> String {
    DEFAULT_BARMAN_BIN.to_string()
}

fn default_run_checks() -> bool {
    true
}
