//! Client for the host relay's `strfry delete` command.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

const DELETE_TIMEOUT: Duration = Duration::from_secs(30);

/// Interface over the relay's bulk-delete operation, mockable in tests.
#[async_trait]
pub trait StrfryClient: Send + Sync {
    async fn delete_events_by_author(&self, author: &str) -> Result<()>;
}

/// Production client shelling out to the strfry binary.
pub struct CommandClient {
    executable_path: PathBuf,
    config_path: PathBuf,
}

impl CommandClient {
    pub fn new(executable_path: PathBuf, config_path: PathBuf) -> Self {
        Self {
            executable_path,
            config_path,
        }
    }
}

#[async_trait]
impl StrfryClient for CommandClient {
    async fn delete_events_by_author(&self, author: &str) -> Result<()> {
        let filter = serde_json::json!({ "authors": [author] }).to_string();
        info!(author, "executing strfry delete");

        let output = tokio::time::timeout(
            DELETE_TIMEOUT,
            Command::new(&self.executable_path)
                .arg(format!("--config={}", self.config_path.display()))
                .arg("delete")
                .arg(format!("--filter={filter}"))
                .output(),
        )
        .await
        .context("strfry delete timed out")?
        .context("failed to spawn strfry")?;

        if !output.status.success() {
            bail!(
                "strfry delete command failed: {}, stderr: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        info!(author, "deleted events for author");
        Ok(())
    }
}
