use crate::error::{Result, SubmagicError};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Run an external tool to completion, killing it if `cancel` fires.
///
/// `fail` builds the error for spawn failures and non-zero exits; the message carries
/// the tool's stderr when it printed any.
pub(crate) async fn run_tool(
    program: &Path,
    args: &[OsString],
    cancel: &CancellationToken,
    fail: fn(String) -> SubmagicError,
) -> Result<Output> {
    debug!(program = %program.display(), ?args, "spawning");

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| fail(format!("could not start {}: {e}", program.display())))?;

    // Dropping the wait future drops the child, which kills it.
    let output = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(SubmagicError::Cancelled),
        output = child.wait_with_output() => {
            output.map_err(|e| fail(format!("{} did not finish: {e}", program.display())))?
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        let detail = if stderr.is_empty() {
            format!("{} exited with {}", program.display(), output.status)
        } else {
            format!("{} exited with {}: {stderr}", program.display(), output.status)
        };
        return Err(fail(detail));
    }

    Ok(output)
}

/// `path` with `suffix` appended to the full file name, e.g. `movie.mp4` -> `movie.mp4.srt`.
pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

pub(crate) async fn remove_if_exists(path: &Path) {
    if let Err(err) = tokio::fs::remove_file(path).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %err, "failed to remove file");
        }
    }
}
