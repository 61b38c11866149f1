//! Producer profile for a PostgreSQL host.
//!
//! A database host usually declares exactly one Barman server for itself.
//! This profile fills in what such a host knows about itself (its name, the
//! local `postgres` account) and leaves the rest to [`ServerRecord::new`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::conninfo::{DEFAULT_DBNAME, DEFAULT_PORT, DEFAULT_USER};
use super::record::{ServerDeclaration, ServerRecord};
use crate::Result;

pub const DEFAULT_HOST_GROUP: &str = "global";
pub const DEFAULT_POSTGRES_USER: &str = "postgres";

/// Label key used to route publications to backup hosts.
pub const HOST_GROUP_LABEL: &str = "host_group";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostgresProfile {
    pub server_id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_dbuser")]
    pub dbuser: String,
    #[serde(default = "default_dbname")]
    pub dbname: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub conninfo_options: Option<String>,
    #[serde(default = "default_postgres_user")]
    pub postgres_user: String,
    #[serde(default)]
    pub ssh_command: Option<String>,
    #[serde(default)]
    pub compression: Option<String>,
    #[serde(default)]
    pub pre_backup_script: Option<String>,
    #[serde(default)]
    pub post_backup_script: Option<String>,
    #[serde(default)]
    pub custom_lines: Option<String>,
    #[serde(default = "default_host_group")]
    pub host_group: String,
}

impl PostgresProfile {
    pub fn new(server_id: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            description: None,
            dbuser: default_dbuser(),
            dbname: default_dbname(),
            host: None,
            port: default_port(),
            conninfo_options: None,
            postgres_user: default_postgres_user(),
            ssh_command: None,
            compression: None,
            pre_backup_script: None,
            post_backup_script: None,
            custom_lines: None,
            host_group: default_host_group(),
        }
    }

    /// Expands the profile into a generic declaration for `producer_host`.
    pub fn declaration(&self, producer_host: &str) -> ServerDeclaration {
        let host = self
            .host
            .clone()
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| producer_host.to_string());
        let ssh_command = self
            .ssh_command
            .clone()
            .unwrap_or_else(|| format!("ssh {}@{}", self.postgres_user, host));

        ServerDeclaration {
            name: self.server_id.clone(),
            description: self.description.clone(),
            conninfo: None,
            user: Some(self.dbuser.clone()),
            dbname: Some(self.dbname.clone()),
            host: Some(host),
            port: Some(self.port),
            conninfo_options: self.conninfo_options.clone(),
            ssh_command: Some(ssh_command),
            compression: self.compression.clone(),
            pre_backup_script: self.pre_backup_script.clone(),
            post_backup_script: self.post_backup_script.clone(),
            custom_lines: self.custom_lines.clone(),
        }
    }

    pub fn record(&self, producer_host: &str) -> Result<ServerRecord> {
        ServerRecord::new(&self.declaration(producer_host), Some(producer_host))
    }

    /// Labels attached to the publication of this profile's record.
    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(HOST_GROUP_LABEL.to_string(), self.host_group.clone())])
    }
}

fn default_dbuser() -> String {
    DEFAULT_USER.to_string()
}

fn default_dbname() -> String {
    DEFAULT_DBNAME.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_postgres_user() -> String {
    DEFAULT_POSTGRES_USER.to_string()
}

fn default_host_group() -> String {
    DEFAULT_HOST_GROUP.to_string()
}
