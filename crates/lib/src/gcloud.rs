//! Thin wrapper around the `gcloud` command-line tool.

use tokio::process::Command;
use tracing::debug;

/// The program name used when no override is configured.
pub const DEFAULT_GCLOUD_PROGRAM: &str = "gcloud";

/// Captured result of a gcloud invocation.
#[derive(Debug, Clone)]
pub struct GcloudOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

impl GcloudOutput {
    /// Trimmed stdout, or `None` when it is blank or gcloud's `(unset)` marker.
    pub fn value(&self) -> Option<String> {
        let value = self.stdout.trim();
        if value.is_empty() || value == "(unset)" {
            None
        } else {
            Some(value.to_string())
        }
    }
}

/// Runs `program` with `args` and captures its output.
pub async fn run(program: &str, args: &[&str]) -> std::io::Result<GcloudOutput> {
    debug!(program, ?args, "Running gcloud");
    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await?;
    Ok(GcloudOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        success: output.status.success(),
    })
}
