#![forbid(unsafe_code)]

//! Thin helpers around the external programs the pipeline shells out to.

use anyhow::{Context, Result, bail};
use std::path::Path;
use std::process::{Command, Stdio};

/// Runs `<program> <probe_arg>` to fail loudly when yt-dlp or ffmpeg are
/// missing instead of failing on the first job.
pub fn ensure_program_available(program: &Path, probe_arg: &str) -> Result<()> {
    let status = Command::new(program)
        .arg(probe_arg)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .with_context(|| format!("{} is not installed or not in PATH", program.display()))?;
    if !status.success() {
        bail!(
            "{} {} exited with {}",
            program.display(),
            probe_arg,
            status
        );
    }
    Ok(())
}

/// Runs a command to completion and returns its stdout.
///
/// A non-zero exit turns into an error carrying the last line yt-dlp or
/// ffmpeg printed on stderr, which is usually the actual reason.
pub fn run_captured(mut command: Command, label: &str) -> Result<Vec<u8>> {
    let output = command
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("launching {label}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        match last_line(&stderr) {
            Some(line) => bail!("{label} exited with {}: {line}", output.status),
            None => bail!("{label} exited with {}", output.status),
        }
    }
    Ok(output.stdout)
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).rfind(|line| !line.is_empty())
}
