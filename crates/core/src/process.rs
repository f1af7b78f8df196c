//! Supervised execution of external tools.
//!
//! Every external process the pipeline launches goes through [`run_tool`],
//! which bounds it with a timeout, kills it when the owning run is
//! cancelled, and captures a bounded tail of its stderr for diagnostics.

use std::collections::VecDeque;
use std::ffi::OsStr;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Maximum number of stderr lines retained for diagnostics.
const STDERR_TAIL_LINES: usize = 40;

/// Errors from running an external tool.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The binary could not be found.
    #[error("binary not found: {0}")]
    NotFound(String),

    /// The process could not be spawned or its output could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The process exceeded its time budget and was killed.
    #[error("process timed out after {0:?}")]
    Timeout(Duration),

    /// The owning run was cancelled and the process was killed.
    #[error("process cancelled")]
    Cancelled,
}

/// Output of a process that ran to completion.
#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    /// Full stdout, only populated when capture was requested.
    pub stdout: String,
    /// Last lines written to stderr.
    pub stderr_tail: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// How a tool's stdout should be handled.
pub enum StdoutMode<'a> {
    /// Accumulate stdout into [`ToolOutput::stdout`].
    Capture,
    /// Hand each line to the callback as it arrives; nothing is retained.
    Lines(&'a mut (dyn FnMut(&str) + Send)),
}

/// Runs `program` with `args` until it exits, times out, or `cancel` fires.
///
/// On unix the child leads a new process group. The whole group is killed
/// and the child reaped on timeout or cancellation, and the group is also
/// killed if the returned future is dropped before the child exits.
pub async fn run_tool<I, S>(
    program: &Path,
    args: I,
    limit: Duration,
    cancel: &CancellationToken,
    mut stdout_mode: StdoutMode<'_>,
) -> Result<ToolOutput, ProcessError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    if cancel.is_cancelled() {
        return Err(ProcessError::Cancelled);
    }

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // The child leads its own group so helpers it launches die with it.
    #[cfg(unix)]
    command.process_group(0);

    let mut child = command
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProcessError::NotFound(program.display().to_string())
            } else {
                ProcessError::Io(e)
            }
        })?;

    let pid = child.id();
    debug!("Spawned {} (pid {:?})", program.display(), pid);
    let mut group = GroupGuard { pgid: pid };

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let stderr_task = tokio::spawn(async move {
        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
        if let Some(stderr) = stderr {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        }
        tail.into_iter().collect::<Vec<_>>().join("\n")
    });

    enum Finish {
        Exited(std::io::Result<(ExitStatus, String)>),
        TimedOut,
        Cancelled,
    }

    let finish = {
        let drive = async {
            let mut captured = String::new();
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Some(line) = lines.next_line().await? {
                    match &mut stdout_mode {
                        StdoutMode::Capture => {
                            captured.push_str(&line);
                            captured.push('\n');
                        }
                        StdoutMode::Lines(on_line) => on_line(&line),
                    }
                }
            }
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, captured))
        };

        tokio::select! {
            result = timeout(limit, drive) => match result {
                Ok(exited) => Finish::Exited(exited),
                Err(_) => Finish::TimedOut,
            },
            _ = cancel.cancelled() => Finish::Cancelled,
        }
    };

    match finish {
        Finish::Exited(result) => {
            let (status, stdout) = result?;
            group.disarm();
            let stderr_tail = stderr_task.await.unwrap_or_default();
            Ok(ToolOutput {
                status,
                stdout,
                stderr_tail,
            })
        }
        Finish::TimedOut => {
            warn!("{} (pid {:?}) timed out after {:?}, killing", program.display(), pid, limit);
            terminate(&mut child, &mut group).await;
            stderr_task.abort();
            Err(ProcessError::Timeout(limit))
        }
        Finish::Cancelled => {
            debug!("{} (pid {:?}) cancelled, killing", program.display(), pid);
            terminate(&mut child, &mut group).await;
            stderr_task.abort();
            Err(ProcessError::Cancelled)
        }
    }
}

async fn terminate(child: &mut tokio::process::Child, group: &mut GroupGuard) {
    group.kill();
    if let Err(e) = child.kill().await {
        // Already exited between the select and the kill.
        debug!("kill failed: {}", e);
    }
}

/// Kills the child's process group when dropped, unless disarmed.
///
/// `kill_on_drop` only reaches the direct child; yt-dlp runs ffmpeg as
/// its own child, which would otherwise outlive a dropped or cancelled run.
struct GroupGuard {
    pgid: Option<u32>,
}

impl GroupGuard {
    fn disarm(&mut self) {
        self.pgid = None;
    }

    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_group(pgid);
        }
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pgid) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        // ESRCH: every member already exited.
        debug!("killpg({}) failed: {}", pgid, e);
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}
