use serde::{Deserialize, Serialize};
use std::fmt;

use super::conninfo::{ConnFields, ConnSpec};
use super::name::ServerName;
use crate::{Error, Result};

/// WAL/backup compression setting.
///
/// Unknown values are kept as [`Compression::Other`] and rendered as given,
/// so newer Barman releases can be targeted without a code change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Compression {
    None,
    #[default]
    Gzip,
    Bzip2,
    Pigz,
    Pygzip,
    Pybzip2,
    Custom,
    Other(String),
}

impl Compression {
    pub fn as_str(&self) -> &str {
        match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Bzip2 => "bzip2",
            Compression::Pigz => "pigz",
            Compression::Pygzip => "pygzip",
            Compression::Pybzip2 => "pybzip2",
            Compression::Custom => "custom",
            Compression::Other(value) => value,
        }
    }
}

impl From<&str> for Compression {
    fn from(value: &str) -> Self {
        match value.trim() {
            "" | "gzip" => Compression::Gzip,
            "none" => Compression::None,
            "bzip2" => Compression::Bzip2,
            "pigz" => Compression::Pigz,
            "pygzip" => Compression::Pygzip,
            "pybzip2" => Compression::Pybzip2,
            "custom" => Compression::Custom,
            other => Compression::Other(other.to_string()),
        }
    }
}

impl From<String> for Compression {
    fn from(value: String) -> Self {
        Compression::from(value.as_str())
    }
}

impl From<Compression> for String {
    fn from(value: Compression) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Loosely typed server declaration, as written in configuration.
///
/// Either `conninfo` or the structured fields (`user`, `dbname`, `host`,
/// `port`, `conninfo_options`) describe the connection; see
/// [`ConnSpec::resolve`] for how the two interact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDeclaration {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub conninfo: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub dbname: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub conninfo_options: Option<String>,
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
}

impl ServerDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn conn_fields(&self) -> ConnFields {
        ConnFields {
            user: self.user.clone(),
            dbname: self.dbname.clone(),
            host: self.host.clone(),
            port: self.port,
            options: self.conninfo_options.clone(),
        }
    }
}

/// One validated Barman server configuration.
///
/// This is the unit that producers publish and the backup host renders to
/// `<config_dir>/<identifier>.conf`. Deserialized records go through the
/// same field checks as [`ServerRecord::new`], so an entry read back from
/// the exchange or a snapshot is as trustworthy as a freshly built one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredRecord")]
pub struct ServerRecord {
    pub identifier: ServerName,
    pub description: String,
    pub conninfo: String,
    pub ssh_command: String,
    pub compression: Compression,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_backup_script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_backup_script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_lines: Option<String>,
}

impl ServerRecord {
    /// Validates a declaration and builds the record.
    ///
    /// Checks run in order: server name, `ssh_command`, connection string.
    /// `default_host` is the producing host's name, used when the
    /// declaration has neither `conninfo` nor `host`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidIdentifier`] for a malformed name
    /// - [`Error::MissingRequiredField`] for `ssh_command`, or `host` when no
    ///   default is available
    /// - [`Error::EmptyConninfo`] when the connection string is blank
    /// - [`Error::ConninfoConflict`] when `conninfo` and structured fields disagree
    /// - [`Error::MultilineValue`] when any field other than `custom_lines`
    ///   contains a line break
    pub fn new(declaration: &ServerDeclaration, default_host: Option<&str>) -> Result<Self> {
        let identifier = ServerName::new(declaration.name.as_str())?;

        let ssh_command = present(&declaration.ssh_command)
            .ok_or(Error::MissingRequiredField { field: "ssh_command" })?
            .to_string();

        let conn = ConnSpec::resolve(
            declaration.conninfo.as_deref(),
            &declaration.conn_fields(),
            default_host,
        )?;
        let conninfo = conn.to_conninfo();
        if conninfo.trim().is_empty() {
            return Err(Error::EmptyConninfo);
        }

        let description = present(&declaration.description)
            .map(str::to_string)
            .unwrap_or_else(|| identifier.to_string());

        let compression = declaration
            .compression
            .as_deref()
            .map(Compression::from)
            .unwrap_or_default();

        let record = Self {
            identifier,
            description,
            conninfo,
            ssh_command,
            compression,
            pre_backup_script: present(&declaration.pre_backup_script).map(str::to_string),
            post_backup_script: present(&declaration.post_backup_script).map(str::to_string),
            custom_lines: declaration.custom_lines.clone().filter(|l| !l.is_empty()),
        };
        record.validate()?;
        Ok(record)
    }

    /// Checks the invariants every record must hold before it is rendered.
    pub fn validate(&self) -> Result<()> {
        if self.ssh_command.trim().is_empty() {
            return Err(Error::MissingRequiredField { field: "ssh_command" });
        }
        if self.conninfo.trim().is_empty() {
            return Err(Error::EmptyConninfo);
        }

        single_line("description", &self.description)?;
        single_line("conninfo", &self.conninfo)?;
        single_line("ssh_command", &self.ssh_command)?;
        single_line("compression", self.compression.as_str())?;
        if let Some(script) = &self.pre_backup_script {
            single_line("pre_backup_script", script)?;
        }
        if let Some(script) = &self.post_backup_script {
            single_line("post_backup_script", script)?;
        }
        Ok(())
    }
}

/// Wire shape of [`ServerRecord`]; converted through [`ServerRecord::validate`].
#[derive(Deserialize)]
struct StoredRecord {
    identifier: ServerName,
    description: String,
    conninfo: String,
    ssh_command: String,
    compression: Compression,
    #[serde(default)]
    pre_backup_script: Option<String>,
    #[serde(default)]
    post_backup_script: Option<String>,
    #[serde(default)]
    custom_lines: Option<String>,
}

impl TryFrom<StoredRecord> for ServerRecord {
    type Error = Error;

    fn try_from(stored: StoredRecord) -> Result<Self> {
        let record = ServerRecord {
            identifier: stored.identifier,
            description: stored.description,
            conninfo: stored.conninfo,
            ssh_command: stored.ssh_command,
            compression: stored.compression,
            pre_backup_script: stored.pre_backup_script,
            post_backup_script: stored.post_backup_script,
            custom_lines: stored.custom_lines,
        };
        record.validate()?;
        Ok(record)
    }
}

fn single_line(field: &'static str, value: &str) -> Result<()> {
    if value.contains(|c| c == '\n' || c == '\r') {
        return Err(Error::MultilineValue {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}
