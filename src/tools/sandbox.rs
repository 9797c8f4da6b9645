use std::ffi::OsStr;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};

use crate::constants::MAX_PROCESS_OUTPUT_BYTES;
use crate::logging::{log_debug, log_warn};

/// How long to keep draining pipes once the direct child has exited
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("process timed out after {} seconds", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("failed while waiting for process: {0}")]
    Wait(#[from] io::Error),
}

/// Captured result of a finished subprocess
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    /// Set when either stream exceeded the capture limit
    pub truncated: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs one subprocess per call under a wall-clock timeout
///
/// On unix the child leads its own process group. The whole group is killed
/// when the timeout fires, when waiting fails, and once the child has exited,
/// so background processes it started do not outlive the call. The child is
/// also spawned with `kill_on_drop`, so cancelling the future returned by
/// [`ProcessSandbox::run`] does not leave it running.
#[derive(Debug, Clone)]
pub struct ProcessSandbox {
    timeout: Duration,
    max_output_bytes: usize,
}

impl ProcessSandbox {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            max_output_bytes: MAX_PROCESS_OUTPUT_BYTES,
        }
    }

    pub fn with_max_output_bytes(mut self, limit: usize) -> Self {
        self.max_output_bytes = limit;
        self
    }

    pub async fn run<S: AsRef<OsStr>>(
        &self,
        program: impl AsRef<OsStr>,
        args: &[S],
        cwd: &Path,
    ) -> Result<ProcessOutput, SandboxError> {
        let program = program.as_ref();
        log_debug(&format!(
            "Spawning {} with {} argument(s) in {}",
            program.to_string_lossy(),
            args.len(),
            cwd.display()
        ));

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| SandboxError::Spawn {
            program: program.to_string_lossy().into_owned(),
            source,
        })?;
        let group = child.id();

        let (Some(mut stdout), Some(mut stderr)) = (child.stdout.take(), child.stderr.take())
        else {
            terminate(&mut child, group).await;
            return Err(SandboxError::Wait(io::Error::other(
                "child output streams were not captured",
            )));
        };

        let mut out = Capture::new(self.max_output_bytes);
        let mut err = Capture::new(self.max_output_bytes);

        // The timeout covers the child's exit; pipes drain alongside so a
        // chatty child never blocks on a full pipe
        let exited = tokio::time::timeout(self.timeout, async {
            let reading = async {
                tokio::try_join!(out.drain(&mut stdout), err.drain(&mut stderr))
            };
            tokio::pin!(reading);
            let mut pipes_closed = false;

            loop {
                tokio::select! {
                    status = child.wait() => return status,
                    result = &mut reading, if !pipes_closed => {
                        result?;
                        pipes_closed = true;
                    }
                }
            }
        })
        .await;

        let status = match exited {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                terminate(&mut child, group).await;
                return Err(SandboxError::Wait(e));
            }
            Err(_) => {
                log_warn(&format!(
                    "{} exceeded {:?}, killing its process group",
                    program.to_string_lossy(),
                    self.timeout
                ));
                terminate(&mut child, group).await;
                return Err(SandboxError::Timeout(self.timeout));
            }
        };

        // Anything still holding the pipes is a leftover descendant
        kill_group(group);
        let rest = async { tokio::try_join!(out.drain(&mut stdout), err.drain(&mut stderr)) };
        match tokio::time::timeout(PIPE_DRAIN_GRACE, rest).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => log_warn(&format!("Failed to read remaining output: {e}")),
            Err(_) => log_warn("Output pipes still open after the process exited"),
        }

        Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&out.bytes).into_owned(),
            stderr: String::from_utf8_lossy(&err.bytes).into_owned(),
            exit_code: status.code(),
            truncated: out.truncated || err.truncated,
        })
    }
}

/// Kill the process group, then kill and reap the direct child
async fn terminate(child: &mut Child, group: Option<u32>) {
    kill_group(group);
    if let Err(e) = child.kill().await {
        log_debug(&format!("kill after failure returned: {e}"));
    }
}

#[cfg(unix)]
fn kill_group(group: Option<u32>) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Some(group) = group else {
        return;
    };

    #[allow(clippy::cast_possible_wrap)]
    let target = Pid::from_raw(group as i32);
    match killpg(target, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => log_debug(&format!("killpg({group}) failed: {e}")),
    }
}

#[cfg(not(unix))]
fn kill_group(_group: Option<u32>) {}

/// Bytes kept from one output stream
///
/// Draining can be cancelled and resumed; everything read so far stays here.
struct Capture {
    bytes: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl Capture {
    fn new(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            limit,
            truncated: false,
        }
    }

    /// Read to EOF, keeping at most `limit` bytes and discarding the rest
    async fn drain<R: AsyncRead + Unpin>(&mut self, reader: &mut R) -> io::Result<()> {
        let mut buf = [0u8; 8192];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                return Ok(());
            }
            let room = self.limit.saturating_sub(self.bytes.len());
            self.bytes.extend_from_slice(&buf[..n.min(room)]);
            if n > room {
                self.truncated = true;
            }
        }
    }
}
