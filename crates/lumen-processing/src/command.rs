//! External tool invocation

use std::ffi::OsStr;
use std::process::{Output, Stdio};
use tokio::process::Command;

/// Run an external tool to completion and capture its output.
///
/// The child is killed when the returned future is dropped, so cancelling a
/// job never leaves an orphaned ffmpeg behind.
#[tracing::instrument(skip(args), fields(process.executable.name = %program))]
pub(crate) async fn run_tool<I, S>(program: &str, args: I) -> std::io::Result<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let start = std::time::Instant::now();

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;

    tracing::debug!(
        exit_code = ?output.status.code(),
        duration_ms = start.elapsed().as_millis(),
        "External tool finished"
    );

    Ok(output)
}

/// Whether a tool can be resolved (absolute path or PATH lookup).
pub fn tool_available(program: &str) -> bool {
    which::which(program).is_ok()
}

/// Last few lines of a tool's stderr, for error messages.
pub(crate) fn stderr_tail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(5);
    lines[start..].join("\n")
}
