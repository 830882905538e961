use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("`{0}` not found in PATH")]
    NotFound(String),
    #[error("Failed to execute `{cmd}`: {source}")]
    Spawn {
        cmd: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{cmd}` exited with {status}: {stderr}")]
    NonZeroExit {
        cmd: String,
        status: String,
        stderr: String,
    },
    #[error("Command `{0}` timed out after {1:?}")]
    Timeout(String, Duration),
    #[error("Non-UTF8 output from `{0}`")]
    NonUtf8(String),
}

/// Run a command with arguments and a timeout, returning trimmed stdout.
///
/// The child is killed if the timeout elapses.
pub async fn run_command(cmd: &str, args: &[&str], timeout: Duration) -> Result<String, ProcessError> {
    tracing::debug!(cmd, ?args, "running command");
    let output = tokio::time::timeout(
        timeout,
        tokio::process::Command::new(cmd)
            .args(args)
            .kill_on_drop(true)
            .output(),
    )
    .await
    .map_err(|_| ProcessError::Timeout(cmd.to_string(), timeout))?
    .map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ProcessError::NotFound(cmd.to_string())
        } else {
            ProcessError::Spawn {
                cmd: cmd.to_string(),
                source,
            }
        }
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProcessError::NonZeroExit {
            cmd: cmd.to_string(),
            status: output.status.to_string(),
            stderr: stderr.trim().to_string(),
        });
    }

    let stdout = String::from_utf8(output.stdout).map_err(|_| ProcessError::NonUtf8(cmd.to_string()))?;
    Ok(stdout.trim().to_string())
}

/// Check if a binary exists in PATH. Returns the full path if found.
pub fn which(binary: &str) -> Option<PathBuf> {
    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths)
            .map(|dir| dir.join(binary))
            .find(|p| p.is_file())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn which_finds_existing_binary() {
        assert!(which("sh").is_some());
    }

    #[test]
    fn which_returns_none_for_nonexistent() {
        assert!(which("totally_nonexistent_binary_xyz").is_none());
    }

    #[tokio::test]
    async fn run_command_echo() {
        let result = run_command("echo", &["hello"], Duration::from_secs(5)).await;
        assert_eq!(result.unwrap(), "hello");
    }

    #[tokio::test]
    async fn run_command_nonzero_exit_keeps_stderr() {
        let err = run_command("sh", &["-c", "echo boom >&2; exit 3"], Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            ProcessError::NonZeroExit { stderr, .. } => assert_eq!(stderr, "boom"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn run_command_missing_binary() {
        let err = run_command("totally_nonexistent_binary_xyz", &[], Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::NotFound(_)));
    }

    #[tokio::test]
    async fn run_command_times_out() {
        let err = run_command("sleep", &["5"], Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Timeout(..)));
    }
}
