use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::server::{ServerName, ServerRecord};
use crate::{Error, Result};

/// Label set attached to a publication.
pub type Labels = BTreeMap<String, String>;

/// Identity of a publishing host, usually its fully qualified name.
///
/// Also used as a directory name by the file-backed store, hence the
/// restriction to `[0-9A-Za-z._-]` without a leading dot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProducerId(String);

impl ProducerId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let valid = !id.is_empty()
            && !id.starts_with('.')
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if valid {
            Ok(Self(id))
        } else {
            Err(Error::InvalidProducerId { value: id })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProducerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ProducerId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ProducerId> for String {
    fn from(id: ProducerId) -> Self {
        id.0
    }
}

/// Label predicate used by a consumer to pick publications.
///
/// Every `key=value` pair must be present in the publication's labels. An
/// empty selector matches everything.
///
/// ```rust
/// use barman_conf::exchange::Selector;
///
/// let selector: Selector = "host_group=global".parse().unwrap();
/// let labels = [("host_group".to_string(), "global".to_string())].into();
/// assert!(selector.matches(&labels));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selector {
    match_labels: Labels,
}

impl Selector {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(match_labels: Labels) -> Self {
        Self { match_labels }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.match_labels.insert(key.into(), value.into());
        self
    }

    pub fn matches(&self, labels: &Labels) -> bool {
        self.match_labels
            .iter()
            .all(|(key, value)| labels.get(key) == Some(value))
    }
}

impl FromStr for Selector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut match_labels = Labels::new();
        for pair in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .map(|(k, v)| (k.trim(), v.trim()))
                .filter(|(k, _)| !k.is_empty())
                .ok_or_else(|| Error::InvalidSelector {
                    value: s.to_string(),
                })?;
            match_labels.insert(key.to_string(), value.to_string());
        }
        Ok(Self { match_labels })
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs: Vec<String> = self
            .match_labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        f.write_str(&pairs.join(","))
    }
}

/// A record as stored in the exchange, keyed by `(producer, identifier)`.
///
/// `published_at` moves forward whenever the producer changes the record;
/// `first_published_at` is set once when the key is first published and
/// survives later updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publication {
    pub producer: ProducerId,
    #[serde(default)]
    pub labels: Labels,
    pub record: ServerRecord,
    pub published_at: DateTime<Utc>,
    pub first_published_at: DateTime<Utc>,
}

impl Publication {
    pub fn new(producer: ProducerId, record: ServerRecord, labels: Labels) -> Self {
        let now = Utc::now();
        Self {
            producer,
            labels,
            record,
            published_at: now,
            first_published_at: now,
        }
    }

    /// Replaces `previous` under the same key, keeping its first publication time.
    pub fn superseding(previous: &Publication, record: ServerRecord, labels: Labels) -> Self {
        Self {
            first_published_at: previous.first_published_at,
            ..Self::new(previous.producer.clone(), record, labels)
        }
    }

    pub fn identifier(&self) -> &ServerName {
        &self.record.identifier
    }
}

/// Same server name published by more than one producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierConflict {
    pub identifier: ServerName,
    pub kept: ProducerId,
    pub rejected: Vec<ProducerId>,
}

impl From<&IdentifierConflict> for Error {
    fn from(conflict: &IdentifierConflict) -> Self {
        Error::IdentifierConflict {
            identifier: conflict.identifier.to_string(),
            kept: conflict.kept.to_string(),
            rejected: conflict.rejected.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Result of a collect: one publication per server name, sorted by name.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    pub publications: Vec<Publication>,
    pub conflicts: Vec<IdentifierConflict>,
}

impl Collection {
    pub fn records(&self) -> Vec<ServerRecord> {
        self.publications.iter().map(|p| p.record.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.publications.is_empty()
    }
}
