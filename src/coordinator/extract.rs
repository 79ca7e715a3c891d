//! Runs the external backup job for one key.
//!
//! The job leads its own process group. Whether it exits, fails or is cancelled, the whole group
//! is killed and the child reaped before [`ExtractionInvoker::run`] returns, so nothing the job
//! started can write into the workspace afterwards.

use log::{debug, warn};
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::Key;
use crate::coordinator::workspace::Workspace;
use crate::utils::config::STDERR_TAIL_BYTES;

/// Resolves once the owning request is gone. Nothing is ever sent: dropping the paired
/// sender is the signal.
pub type CancelSignal = oneshot::Receiver<()>;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("couldn't start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("couldn't wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
    /// `stderr` is for the log only; it is not part of the message.
    #[error("{program} {status}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("{program} cancelled")]
    Cancelled { program: String },
}

impl ExtractError {
    /// Tail of the job's stderr, if it wrote any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            ExtractError::Failed { stderr, .. } if !stderr.is_empty() => Some(stderr),
            _ => None,
        }
    }
}

/// Command line of the job. The key is appended as the last argument.
#[derive(Debug, Clone)]
pub struct ExtractionInvoker {
    program: String,
    args: Vec<String>,
    cwd: PathBuf,
}

impl ExtractionInvoker {
    /// `cwd` is the directory the job is expected to create `<key>/` in.
    pub fn new(program: impl Into<String>, args: Vec<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: cwd.into(),
        }
    }

    /// Run to completion, or until `cancel` fires. Either way the job's process group is gone
    /// when this returns.
    pub async fn run(
        &self,
        key: &Key,
        workspace: &Workspace,
        cancel: &mut CancelSignal,
    ) -> Result<(), ExtractError> {
        debug!(
            "running {} {:?} {} (expecting {})",
            self.program,
            self.args,
            key,
            workspace.path().display()
        );
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(key.as_str())
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| ExtractError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        let pgid = child.id();
        let stderr = collect_stderr(&mut child);

        let waited = tokio::select! {
            biased;
            _ = &mut *cancel => None,
            status = child.wait() => Some(status),
        };
        kill_job(&mut child, pgid).await;

        let status = match waited {
            None => {
                if let Some(task) = stderr {
                    task.abort();
                }
                debug!("{} cancelled for {}", self.program, key);
                return Err(ExtractError::Cancelled {
                    program: self.program.clone(),
                });
            }
            Some(Err(source)) => {
                return Err(ExtractError::Wait {
                    program: self.program.clone(),
                    source,
                });
            }
            Some(Ok(status)) => status,
        };

        if status.success() {
            if !workspace.path().is_dir() {
                warn!(
                    "{} succeeded but {} is missing",
                    self.program,
                    workspace.path().display()
                );
            }
            return Ok(());
        }
        let stderr = match stderr {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        };
        Err(ExtractError::Failed {
            program: self.program.clone(),
            status,
            stderr: stderr_tail(&stderr),
        })
    }
}

/// Drain the child's stderr on its own task so a chatty job can't block on a full pipe.
fn collect_stderr(child: &mut Child) -> Option<JoinHandle<Vec<u8>>> {
    let mut pipe = child.stderr.take()?;
    Some(tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            debug!("couldn't read job stderr: {e}");
        }
        buf
    }))
}

/// Kill everything in the job's process group, then reap the child.
async fn kill_job(child: &mut Child, pgid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pgid) = pgid {
        kill_group(pgid);
    }
    #[cfg(not(unix))]
    let _ = pgid;
    // Errors once the child has already exited.
    let _ = child.start_kill();
    if let Err(e) = child.wait().await {
        warn!("couldn't reap backup job: {e}");
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
        let err = io::Error::last_os_error();
        // ESRCH: the group is already empty.
        if err.raw_os_error() != Some(libc::ESRCH) {
            warn!("couldn't kill process group {pgid}: {err}");
        }
    }
}

/// Last [`STDERR_TAIL_BYTES`] of the job's stderr, trimmed, lossy UTF-8.
fn stderr_tail(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&stderr[start..]).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stderr_tail_keeps_end() {
        let mut buf = vec![b'a'; STDERR_TAIL_BYTES];
        buf.extend_from_slice(b"boom\n");
        let tail = stderr_tail(&buf);
        assert!(tail.ends_with("boom"));
        assert_eq!(tail.len(), STDERR_TAIL_BYTES - 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_message_leaves_out_stderr() {
        use std::os::unix::process::ExitStatusExt;
        let err = ExtractError::Failed {
            program: "sh".into(),
            status: ExitStatus::from_raw(3 << 8),
            stderr: "token=secret /srv/work/blog".into(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("sh exit status: 3"), "{msg}");
        assert!(!msg.contains("secret"));
        assert_eq!(err.stderr(), Some("token=secret /srv/work/blog"));
    }
}
