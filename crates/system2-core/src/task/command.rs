//! Local command execution

use super::TaskOutput;
use crate::error::{Error, Result};
use crate::types::{CommandOutput, Settings};
use crate::utils::bounded_text;
use std::io::{self, Read};
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncRead, AsyncReadExt};

const READ_CHUNK: usize = 8 * 1024;

fn shell_command(command: &str) -> std::process::Command {
    #[cfg(windows)]
    let mut cmd = {
        let mut cmd = std::process::Command::new("cmd");
        cmd.arg("/C");
        cmd
    };
    #[cfg(not(windows))]
    let mut cmd = {
        let mut cmd = std::process::Command::new("sh");
        cmd.arg("-c");
        cmd
    };
    cmd.arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd
}

/// Exit code, or -1 when the process was killed by a signal
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

fn describe_failure(status: i32, stderr: &[u8], capacity: usize) -> String {
    let stderr = String::from_utf8_lossy(stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("command exited with status {}", status)
    } else {
        bounded_text(stderr.as_bytes(), capacity)
    }
}

/// Append as much of `chunk` as still fits in `capacity`
fn keep(kept: &mut Vec<u8>, chunk: &[u8], capacity: usize) {
    let room = capacity.saturating_sub(kept.len());
    kept.extend_from_slice(&chunk[..chunk.len().min(room)]);
}

/// Read a pipe to EOF, keeping at most `capacity` bytes.
///
/// The rest is read and dropped so the child never blocks on a full pipe.
async fn read_capped<R: AsyncRead + Unpin>(mut reader: R, capacity: usize) -> io::Result<Vec<u8>> {
    let mut kept = Vec::new();
    let mut buf = [0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(kept);
        }
        keep(&mut kept, &buf[..n], capacity);
    }
}

fn read_capped_blocking<R: Read>(mut reader: R, capacity: usize) -> io::Result<Vec<u8>> {
    let mut kept = Vec::new();
    let mut buf = [0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            return Ok(kept);
        }
        keep(&mut kept, &buf[..n], capacity);
    }
}

fn missing_pipe(name: &str) -> Error {
    Error::Spawn(format!("{} of child process was not captured", name))
}

pub(crate) async fn run(command: &str, settings: &Settings) -> Result<TaskOutput> {
    let mut child = tokio::process::Command::from(shell_command(command))
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::Spawn(e.to_string()))?;
    let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
    let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

    let (stdout, stderr, exit) = tokio::try_join!(
        read_capped(stdout, settings.result_capacity),
        read_capped(stderr, settings.error_capacity),
        child.wait(),
    )?;

    let status = exit_code(exit);
    let error = if status == 0 {
        String::new()
    } else {
        describe_failure(status, &stderr, settings.error_capacity)
    };

    Ok(TaskOutput {
        text: bounded_text(&stdout, settings.result_capacity),
        error,
        status,
        ..Default::default()
    })
}

/// Run a command on the calling thread and wait for it
pub fn run_blocking(command: &str, settings: &Settings) -> Result<CommandOutput> {
    let mut cmd = shell_command(command);
    cmd.stderr(Stdio::null());
    let mut child = cmd.spawn().map_err(|e| Error::Spawn(e.to_string()))?;
    let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;

    let output = read_capped_blocking(stdout, settings.result_capacity)?;
    let exit = child.wait()?;

    Ok(CommandOutput {
        output: bounded_text(&output, settings.result_capacity),
        status: exit_code(exit),
    })
}
