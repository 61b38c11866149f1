//! Connection string synthesis.
//!
//! A server declaration reaches the backup host with a libpq connection
//! string. Producers either hand over a complete string (`conninfo`) or the
//! structured pieces (`user`, `dbname`, `host`, `port`) plus an optional
//! `conninfo_options` suffix. The two modes are resolved once into a
//! [`ConnSpec`] and never mixed afterwards.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const DEFAULT_USER: &str = "barman";
pub const DEFAULT_DBNAME: &str = "postgres";
pub const DEFAULT_PORT: u16 = 5432;

/// Fully resolved structured connection parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredConn {
    pub user: String,
    pub dbname: String,
    pub host: String,
    pub port: u16,
}

/// Structured connection fields as they appear in a declaration.
///
/// Every field is optional; missing values are defaulted during
/// [`ConnSpec::resolve`]. Empty strings count as missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnFields {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub dbname: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default, rename = "conninfo_options")]
    pub options: Option<String>,
}

impl ConnFields {
    fn is_empty(&self) -> bool {
        non_empty(&self.user).is_none()
            && non_empty(&self.dbname).is_none()
            && non_empty(&self.host).is_none()
            && self.port.is_none()
            && non_empty(&self.options).is_none()
    }
}

/// The connection input mode chosen by a declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnSpec {
    /// A complete connection string, used unmodified.
    Override(String),
    /// Structured parameters with an optional verbatim options suffix.
    Structured {
        conn: StructuredConn,
        options: Option<String>,
    },
}

impl ConnSpec {
    /// Picks the input mode and applies defaults.
    ///
    /// `default_host` is the resolved name of the producing host; it is only
    /// consulted when the declaration carries no explicit `host`.
    ///
    /// A full `conninfo` next to structured fields is accepted only when every
    /// structured value is already present, with the same value, in the full
    /// string. Anything else is a [`Error::ConninfoConflict`].
    pub fn resolve(
        conninfo: Option<&str>,
        fields: &ConnFields,
        default_host: Option<&str>,
    ) -> Result<Self> {
        if let Some(conninfo) = conninfo {
            if conninfo.trim().is_empty() {
                return Err(Error::EmptyConninfo);
            }
            if !fields.is_empty() {
                check_agreement(conninfo, fields)?;
            }
            return Ok(ConnSpec::Override(conninfo.to_string()));
        }

        let host = non_empty(&fields.host)
            .or_else(|| default_host.filter(|h| !h.trim().is_empty()))
            .ok_or(Error::MissingRequiredField { field: "host" })?;

        let conn = StructuredConn {
            user: non_empty(&fields.user).unwrap_or(DEFAULT_USER).to_string(),
            dbname: non_empty(&fields.dbname).unwrap_or(DEFAULT_DBNAME).to_string(),
            host: host.to_string(),
            port: fields.port.unwrap_or(DEFAULT_PORT),
        };

        Ok(ConnSpec::Structured {
            conn,
            options: non_empty(&fields.options).map(str::to_string),
        })
    }

    /// Returns the final connection string.
    pub fn to_conninfo(&self) -> String {
        match self {
            ConnSpec::Override(conninfo) => conninfo.clone(),
            ConnSpec::Structured { conn, options } => synthesize(conn, options.as_deref()),
        }
    }
}

/// Builds `user=<u> dbname=<d> host=<h> port=<p>[ <options>]`.
///
/// ```rust
/// use barman_conf::server::conninfo::{synthesize, StructuredConn};
///
/// let conn = StructuredConn {
///     user: "user1".into(),
///     dbname: "db1".into(),
///     host: "server1".into(),
///     port: 5432,
/// };
/// assert_eq!(synthesize(&conn, None), "user=user1 dbname=db1 host=server1 port=5432");
/// assert_eq!(
///     synthesize(&conn, Some("sslmode=require")),
///     "user=user1 dbname=db1 host=server1 port=5432 sslmode=require"
/// );
/// ```
pub fn synthesize(conn: &StructuredConn, options: Option<&str>) -> String {
    let mut conninfo = format!(
        "user={} dbname={} host={} port={}",
        conn.user, conn.dbname, conn.host, conn.port
    );
    if let Some(options) = options.filter(|o| !o.trim().is_empty()) {
        conninfo.push(' ');
        conninfo.push_str(options);
    }
    conninfo
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn check_agreement(conninfo: &str, fields: &ConnFields) -> Result<()> {
    let params = parse_params(conninfo);
    let lookup = |key: &str| {
        params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    };

    let port = fields.port.map(|p| p.to_string());
    let structured = [
        ("user", non_empty(&fields.user)),
        ("dbname", non_empty(&fields.dbname)),
        ("host", non_empty(&fields.host)),
        ("port", port.as_deref()),
    ];

    for (field, value) in structured {
        let Some(value) = value else { continue };
        match lookup(field) {
            Some(existing) if existing == value => {}
            existing => {
                return Err(Error::ConninfoConflict {
                    field: field.to_string(),
                    structured: value.to_string(),
                    conninfo: existing.unwrap_or_default().to_string(),
                })
            }
        }
    }

    if let Some(options) = non_empty(&fields.options) {
        if !conninfo.trim_end().ends_with(options.trim()) {
            return Err(Error::ConninfoConflict {
                field: "conninfo_options".to_string(),
                structured: options.to_string(),
                conninfo: conninfo.to_string(),
            });
        }
    }

    Ok(())
}

/// Splits a libpq keyword/value string into pairs.
///
/// Handles `key=value`, `key = value` and single-quoted values with
/// backslash escapes. Words without `=` are skipped.
fn parse_params(conninfo: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut chars = conninfo.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }

        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c.is_whitespace() {
                break;
            }
            key.push(c);
            chars.next();
        }

        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }

        match chars.peek() {
            None if key.is_empty() => break,
            Some('=') => {
                chars.next();
            }
            _ => continue,
        }

        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }

        let mut value = String::new();
        if chars.peek() == Some(&'\'') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '\'' => break,
                    _ => value.push(c),
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                value.push(c);
                chars.next();
            }
        }

        if !key.is_empty() {
            params.push((key, value));
        }
    }

    params
}
