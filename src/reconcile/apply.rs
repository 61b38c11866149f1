use async_trait::async_trait;
use tracing::{info, warn};

use super::plan::ReconcilePlan;
use crate::server::{render, ServerName};
use crate::Result;

pub const DEFAULT_BARMAN_BIN: &str = "barman";

/// Verification command scheduled for each written server file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheck {
    pub name: String,
    pub identifier: ServerName,
    pub program: String,
    pub args: Vec<String>,
}

impl HealthCheck {
    /// `barman check <identifier>`, named `barman-check-<identifier>`.
    pub fn for_server(identifier: &ServerName, barman_bin: &str) -> Self {
        Self {
            name: format!("barman-check-{}", identifier),
            identifier: identifier.clone(),
            program: barman_bin.to_string(),
            args: vec!["check".to_string(), identifier.to_string()],
        }
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Passed,
    Failed { code: Option<i32>, output: String },
}

/// The filesystem/process side of reconciliation.
#[async_trait]
pub trait Materializer: Send + Sync {
    async fn write_config(&self, identifier: &ServerName, contents: &str) -> Result<()>;

    /// Removing the file also retires the server's check: checks are only
    /// scheduled for servers written in the same run.
    async fn remove_config(&self, identifier: &ServerName) -> Result<()>;

    async fn run_check(&self, check: &HealthCheck) -> Result<CheckStatus>;
}

#[derive(Debug, Clone)]
pub struct ApplyOptions {
    pub barman_bin: String,
    pub run_checks: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            barman_bin: DEFAULT_BARMAN_BIN.to_string(),
            run_checks: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyFailure {
    pub identifier: ServerName,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub written: Vec<ServerName>,
    pub removed: Vec<ServerName>,
    pub failed: Vec<ApplyFailure>,
    pub checks_failed: Vec<ServerName>,
}

impl ApplyReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.checks_failed.is_empty()
    }
}

/// Applies `plan` one identifier at a time.
///
/// A failure on one identifier is recorded and logged, and the remaining
/// identifiers are still applied. Health checks run after a successful
/// write; a failing check is reported but does not mark the write as failed.
pub async fn apply<M: Materializer + ?Sized>(
    plan: &ReconcilePlan,
    materializer: &M,
    options: &ApplyOptions,
) -> ApplyReport {
    let mut report = ApplyReport::default();

    for record in plan.to_create.iter().chain(&plan.to_update) {
        let identifier = &record.identifier;
        let contents = render(record);

        if let Err(e) = materializer.write_config(identifier, &contents).await {
            warn!(identifier = %identifier, error = %e, "Failed to write server configuration");
            report.failed.push(ApplyFailure {
                identifier: identifier.clone(),
                error: e.to_string(),
            });
            continue;
        }
        info!(identifier = %identifier, "Server configuration written");
        report.written.push(identifier.clone());

        if !options.run_checks {
            continue;
        }
        let check = HealthCheck::for_server(identifier, &options.barman_bin);
        match materializer.run_check(&check).await {
            Ok(CheckStatus::Passed) => {
                info!(check = %check.name, "Health check passed");
            }
            Ok(CheckStatus::Failed { code, output }) => {
                warn!(
                    check = %check.name,
                    code = ?code,
                    output = %output.trim(),
                    "Health check failed"
                );
                report.checks_failed.push(identifier.clone());
            }
            Err(e) => {
                warn!(check = %check.name, error = %e, "Health check could not run");
                report.checks_failed.push(identifier.clone());
            }
        }
    }

    for identifier in &plan.to_delete {
        if let Err(e) = materializer.remove_config(identifier).await {
            warn!(identifier = %identifier, error = %e, "Failed to remove server configuration");
            report.failed.push(ApplyFailure {
                identifier: identifier.clone(),
                error: e.to_string(),
            });
            continue;
        }
        info!(identifier = %identifier, "Server configuration removed");
        report.removed.push(identifier.clone());
    }

    report
}
