//! Optional external mesh repair (ADMesh by default).
//!
//! The tool runs as a child process on a freshly written STL. Any failure is
//! reported to the caller, which keeps the unrepaired file.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;

use crate::error::ConfigError;

/// Errors from running the repair tool.
#[derive(Error, Debug)]
pub enum RepairError {
    /// The command could not be started.
    #[error("cannot start '{command}': {source}")]
    Spawn {
        /// Program name.
        command: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The command ran past its time limit and was killed.
    #[error("timed out after {0}s")]
    Timeout(u64),

    /// The command exited unsuccessfully.
    #[error("exited with {}: {stderr}", code.map_or("signal".to_string(), |c| format!("code {c}")))]
    Failed {
        /// Exit code, if any.
        code: Option<i32>,
        /// Captured stderr.
        stderr: String,
    },

    /// The command succeeded but left no output file.
    #[error("no output written to {}", .0.display())]
    OutputMissing(PathBuf),

    /// Waiting on or reading from the child failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// External repair hook settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    /// Run the repair tool after each export.
    pub enabled: bool,
    /// Program to run.
    pub command: String,
    /// Arguments; `{input}` and `{output}` are replaced with file paths.
    pub args: Vec<String>,
    /// Kill the tool after this many seconds.
    pub timeout_secs: u64,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            command: "admesh".to_string(),
            args: [
                "-n", "-f", "-d", "-v", "-u", "-i", "3", "-t", "0.001", "-b", "{output}", "{input}",
            ]
            .map(String::from)
            .to_vec(),
            timeout_secs: 300,
        }
    }
}

impl RepairConfig {
    /// Reject an enabled hook with no command or no time limit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        if self.command.trim().is_empty() {
            return Err(ConfigError::InvalidRepair("command is empty".into()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidRepair("timeout_secs must be positive".into()));
        }
        if !self.args.iter().any(|a| a.contains("{output}")) {
            return Err(ConfigError::InvalidRepair(
                "args must reference {output}".into(),
            ));
        }
        Ok(())
    }
}

/// Replace `{input}` and `{output}` placeholders in an argument template.
pub fn substitute_args(template: &[String], input: &Path, output: &Path) -> Vec<String> {
    let input = input.to_string_lossy();
    let output = output.to_string_lossy();
    template
        .iter()
        .map(|arg| arg.replace("{input}", &input).replace("{output}", &output))
        .collect()
}

/// Run the repair tool on `input`, writing `output`.
///
/// Any file already at `output` is removed first, so success always means
/// the tool wrote it. Returns the tool's stdout on success.
pub fn run_repair(config: &RepairConfig, input: &Path, output: &Path) -> Result<String, RepairError> {
    match std::fs::remove_file(output) {
        Ok(()) => tracing::debug!(path = %output.display(), "removed stale repair output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(execute(config, input, output))
}

async fn execute(config: &RepairConfig, input: &Path, output: &Path) -> Result<String, RepairError> {
    let args = substitute_args(&config.args, input, output);
    tracing::debug!(command = %config.command, ?args, "running repair");

    let mut cmd = Command::new(&config.command);
    cmd.args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    let child = cmd.spawn().map_err(|source| RepairError::Spawn {
        command: config.command.clone(),
        source,
    })?;

    // Both pipes are drained while waiting; on timeout the child is dropped and killed.
    let timeout = Duration::from_secs(config.timeout_secs);
    let result = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result?,
        Err(_) => return Err(RepairError::Timeout(config.timeout_secs)),
    };

    if !result.status.success() {
        return Err(RepairError::Failed {
            code: result.status.code(),
            stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
        });
    }
    if !output.exists() {
        return Err(RepairError::OutputMissing(output.to_path_buf()));
    }
    Ok(String::from_utf8_lossy(&result.stdout).into_owned())
}

/// Lines of ADMesh output worth logging: fixes and facet counts.
pub fn summary_lines(stdout: &str) -> Vec<&str> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| {
            let lower = line.to_lowercase();
            ["edges fixed", "facets", "normals"]
                .iter()
                .any(|key| lower.contains(key))
        })
        .collect()
}
