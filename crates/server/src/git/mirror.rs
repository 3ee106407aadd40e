// Mirror synchronization.
//
// One local mirror workspace per configured repository sits under the mirror
// base directory as `<name>.git`. Pull brings the workspace up to date with
// the source remote (mirror clone on first contact, remote update after
// that); push forwards everything to the destination remote. A per-name
// async mutex serializes syncs for the same repository while distinct
// repositories proceed independently.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::git::runner::{CommandOutput, CommandRunner, RunnerError};

/// Stage of a sync attempt that can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pull,
    Push,
}

impl Stage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pull => "pull",
            Self::Push => "push",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("repository {0} is not in the configured list")]
    UnknownRepository(String),

    #[error("{stage} failed for {repository} with exit code {code:?}")]
    Command { repository: String, stage: Stage, code: Option<i32> },

    #[error("{stage} failed for {repository}: {source}")]
    Runner { repository: String, stage: Stage, source: RunnerError },
}

/// Result of a pass over several repositories, in configured order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncSummary {
    pub updated: Vec<String>,
    pub failed: Vec<String>,
}

impl SyncSummary {
    pub fn all_failed(&self) -> bool {
        self.updated.is_empty() && !self.failed.is_empty()
    }
}

/// Keeps the destination remote in step with the source remote, one local
/// mirror workspace per configured repository.
pub struct MirrorSync {
    runner: CommandRunner,
    source_url: String,
    destination_url: String,
    mirror_dir: PathBuf,
    repositories: Vec<String>,
    locks: HashMap<String, tokio::sync::Mutex<()>>,
}

impl MirrorSync {
    pub fn new(config: &ServerConfig, runner: CommandRunner) -> Self {
        let locks = config
            .repositories
            .iter()
            .map(|name| (name.clone(), tokio::sync::Mutex::new(())))
            .collect();

        Self {
            runner,
            source_url: config.source_url.clone(),
            destination_url: config.destination_url.clone(),
            mirror_dir: config.mirror_dir.clone(),
            repositories: config.repositories.clone(),
            locks,
        }
    }

    /// Pull then push one repository, holding its lock for the whole pair.
    ///
    /// An unknown name is rejected before any command runs.
    pub async fn sync(&self, name: &str) -> Result<(), SyncError> {
        let lock = self
            .locks
            .get(name)
            .ok_or_else(|| SyncError::UnknownRepository(name.to_string()))?;

        let _guard = lock.lock().await;
        self.pull(name).await?;
        self.push(name).await?;
        info!(repository = name, "mirror sync complete");
        Ok(())
    }

    /// Sequential pass over every configured repository.
    ///
    /// A failing repository is reported and skipped; it never stops the
    /// rest of the pass.
    pub async fn sync_all(&self) -> SyncSummary {
        let mut summary = SyncSummary::default();
        for name in &self.repositories {
            match self.sync(name).await {
                Ok(()) => summary.updated.push(name.clone()),
                Err(sync_error) => {
                    error!(repository = %name, error = %sync_error, "mirror sync failed");
                    summary.failed.push(name.clone());
                }
            }
        }
        summary
    }

    async fn pull(&self, name: &str) -> Result<CommandOutput, SyncError> {
        let workspace = self.workspace(name);
        let workspace_arg = workspace.to_string_lossy().into_owned();

        let argv = if workspace.is_dir() {
            info!(repository = name, "already cloned, updating");
            vec![
                "git".to_string(),
                "--git-dir".to_string(),
                workspace_arg,
                "remote".to_string(),
                "update".to_string(),
                "origin".to_string(),
            ]
        } else {
            info!(repository = name, "cloning for the first time");
            vec![
                "git".to_string(),
                "clone".to_string(),
                "--mirror".to_string(),
                format!("{}/{name}", self.source_url),
                workspace_arg,
            ]
        };

        self.run_stage(name, Stage::Pull, &argv).await
    }

    async fn push(&self, name: &str) -> Result<CommandOutput, SyncError> {
        let workspace_arg = self.workspace(name).to_string_lossy().into_owned();
        let argv = vec![
            "git".to_string(),
            "--git-dir".to_string(),
            workspace_arg,
            "push".to_string(),
            "--mirror".to_string(),
            format!("{}/{name}", self.destination_url),
        ];

        self.run_stage(name, Stage::Push, &argv).await
    }

    async fn run_stage(
        &self,
        name: &str,
        stage: Stage,
        argv: &[String],
    ) -> Result<CommandOutput, SyncError> {
        let output = self.runner.run(argv).await.map_err(|source| SyncError::Runner {
            repository: name.to_string(),
            stage,
            source,
        })?;

        if !output.success() {
            return Err(SyncError::Command {
                repository: name.to_string(),
                stage,
                code: output.code,
            });
        }

        Ok(output)
    }

    fn workspace(&self, name: &str) -> PathBuf {
        self.mirror_dir.join(format!("{name}.git"))
    }
}
