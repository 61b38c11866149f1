use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::apply::{CheckStatus, HealthCheck, Materializer};
use crate::server::ServerName;
use crate::Result;

pub const DEFAULT_CONFIG_DIR: &str = "/etc/barman.d";

/// Writes server files to `<config_dir>/<identifier>.conf` and runs checks
/// as child processes.
pub struct FsMaterializer {
    config_dir: PathBuf,
}

impl FsMaterializer {
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        Self {
            config_dir: config_dir.as_ref().to_path_buf(),
        }
    }

    pub fn config_path(&self, identifier: &ServerName) -> PathBuf {
        self.config_dir.join(format!("{}.conf", identifier))
    }
}

#[async_trait]
impl Materializer for FsMaterializer {
    async fn write_config(&self, identifier: &ServerName, contents: &str) -> Result<()> {
        fs::create_dir_all(&self.config_dir).await?;

        let path = self.config_path(identifier);
        let temp_path = path.with_extension("conf.tmp");

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(contents.as_bytes()).await?;
        file.sync_all().await?;
        fs::rename(&temp_path, &path).await?;

        debug!(path = %path.display(), "Wrote server file");
        Ok(())
    }

    async fn remove_config(&self, identifier: &ServerName) -> Result<()> {
        let path = self.config_path(identifier);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Removed server file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn run_check(&self, check: &HealthCheck) -> Result<CheckStatus> {
        debug!(check = %check.name, command = %check.command_line(), "Running health check");
        let output = Command::new(&check.program).args(&check.args).output().await?;

        if output.status.success() {
            Ok(CheckStatus::Passed)
        } else {
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            Ok(CheckStatus::Failed {
                code: output.status.code(),
                output: text,
            })
        }
    }
}
