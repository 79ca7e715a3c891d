//! One download request: validate → lock → reset → extract → stream zip → destroy → unlock.
//!
//! Everything up to the archive step runs as a [`Cycle`] on its own task, owning the lock guard,
//! the workspace and the job. The request side only holds a cancel sender: when the request
//! future is dropped or its deadline passes, the cycle kills the job, removes the workspace and
//! then releases the key. Filesystem work runs on blocking threads.

use bytes::Bytes;
use log::{error, info};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tokio_stream::wrappers::ReceiverStream;

use crate::coordinator::archive::{ArchiveError, ChannelWriter, write_zip};
use crate::coordinator::extract::{CancelSignal, ExtractError, ExtractionInvoker};
use crate::coordinator::locks::{KeyLockGuard, KeyLockRegistry};
use crate::coordinator::workspace::{Workspace, WorkspaceError, WorkspaceManager};
use crate::{Key, KeyError, ServerConfig};

/// Why a request ended before any archive bytes were produced.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error(transparent)]
    Validation(#[from] KeyError),
    #[error(transparent)]
    WorkspaceReset(#[from] WorkspaceError),
    #[error("couldn't retrieve tumblr: {0}")]
    Extraction(#[from] ExtractError),
    #[error("timed out after {0:?} waiting for lock or backup job")]
    Timeout(Duration),
    /// The request went away before the archive step.
    #[error("request cancelled")]
    Cancelled,
    #[error("request task failed: {0}")]
    Task(#[from] JoinError),
}

/// Locked span of one cycle. Fields drop in order: workspace removed, then key released.
struct CriticalSection {
    workspace: Workspace,
    guard: KeyLockGuard,
}

impl CriticalSection {
    /// Remove the workspace and release the key from a blocking thread.
    async fn close(self) {
        if let Err(e) = tokio::task::spawn_blocking(move || drop(self)).await {
            error!("cleanup task failed: {e}");
        }
    }
}

/// A cycle that reached the archive step.
pub struct ArchiveDownload {
    pub key: Key,
    /// Zip bytes. An `Err` item means the archive failed mid-stream.
    pub body: ReceiverStream<io::Result<Bytes>>,
    /// Encoder task; resolves after cleanup with the byte count or the archive error.
    pub task: JoinHandle<Result<u64, ArchiveError>>,
}

pub struct RequestCoordinator {
    locks: Arc<KeyLockRegistry>,
    workspaces: WorkspaceManager,
    extractor: Arc<ExtractionInvoker>,
    timeout: Option<Duration>,
    channel_chunks: usize,
    next_id: AtomicU64,
}

impl RequestCoordinator {
    pub fn new(cfg: &ServerConfig) -> Self {
        Self {
            locks: Arc::new(KeyLockRegistry::new()),
            workspaces: WorkspaceManager::new(cfg.workspace_root.clone()),
            extractor: Arc::new(ExtractionInvoker::new(
                cfg.extractor_program.clone(),
                cfg.extractor_args.clone(),
                cfg.workspace_root.clone(),
            )),
            timeout: cfg.request_timeout,
            channel_chunks: cfg.archive_channel_chunks.max(1),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn locks(&self) -> &KeyLockRegistry {
        &self.locks
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    /// Run a cycle for `raw` (the query value, `None` when absent). On `Ok`, the body must be
    /// drained or dropped; the key stays locked until the encoder task ends. If this future is
    /// dropped first, the cycle cleans up in the background and keeps the key until it is done.
    pub async fn handle(&self, raw: Option<&str>) -> Result<ArchiveDownload, RequestError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        info!("[{id}] new request: tumblr={}", quoted(raw));

        let key = Key::parse(raw.unwrap_or("")).inspect_err(|e| {
            error!("[{id}] bad request: {e}");
        })?;

        let (cancel_tx, cancel) = oneshot::channel::<()>();
        let cycle = Cycle {
            id,
            key: key.clone(),
            locks: Arc::clone(&self.locks),
            workspaces: self.workspaces.clone(),
            extractor: Arc::clone(&self.extractor),
        };
        let mut task = tokio::spawn(cycle.run(cancel));

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    error!("[{id}] timed out after {limit:?} for {key}");
                    drop(cancel_tx);
                    // Report only once the job is dead and the key released.
                    if let Ok(Ok(section)) = task.await {
                        section.close().await;
                    }
                    return Err(RequestError::Timeout(limit));
                }
            },
            None => task.await,
        };
        drop(cancel_tx);
        let section = joined??;

        Ok(self.start_archive(id, key, section))
    }

    fn start_archive(&self, id: u64, key: Key, section: CriticalSection) -> ArchiveDownload {
        let (tx, rx) = mpsc::channel(self.channel_chunks);
        let task = tokio::task::spawn_blocking(move || {
            let mut sink = ChannelWriter::new(tx);
            let result = write_zip(section.workspace.path(), &mut sink);
            let key = section.guard.key().clone();
            // Cleanup before the body ends so a finished download implies a removed workspace.
            drop(section);
            match result {
                Ok(()) => {
                    let written = sink.written();
                    info!("[{id}] complete: {key} ({written} bytes)");
                    Ok(written)
                }
                Err(e) => {
                    error!("[{id}] couldn't write zip for {key}: {e}");
                    sink.abort(&e);
                    Err(e)
                }
            }
        });
        ArchiveDownload {
            key,
            body: ReceiverStream::new(rx),
            task,
        }
    }
}

/// Everything one cycle needs up to the archive step, owned so it can run on its own task.
struct Cycle {
    id: u64,
    key: Key,
    locks: Arc<KeyLockRegistry>,
    workspaces: WorkspaceManager,
    extractor: Arc<ExtractionInvoker>,
}

impl Cycle {
    /// Lock, reset and extract. On any failure or cancellation the section taken so far is
    /// closed before this returns.
    async fn run(self, mut cancel: CancelSignal) -> Result<CriticalSection, RequestError> {
        let id = self.id;
        let key = &self.key;

        info!("[{id}] acquiring name lock for {key}");
        let guard = tokio::select! {
            biased;
            _ = &mut cancel => {
                info!("[{id}] gave up waiting for {key}");
                return Err(RequestError::Cancelled);
            }
            guard = self.locks.acquire(key) => guard,
        };
        info!("[{id}] acquired name lock for {key}");

        let workspace = self.reset().await.inspect_err(|e| {
            error!("[{id}] {e}");
        })?;
        let section = CriticalSection { workspace, guard };

        let extracted = self
            .extractor
            .run(key, &section.workspace, &mut cancel)
            .await;
        match extracted {
            Ok(()) => Ok(section),
            Err(ExtractError::Cancelled { .. }) => {
                info!("[{id}] cancelled while retrieving {key}");
                section.close().await;
                Err(RequestError::Cancelled)
            }
            Err(e) => {
                error!("[{id}] couldn't retrieve tumblr: {e}");
                if let Some(stderr) = e.stderr() {
                    error!("[{id}] backup job stderr: {stderr}");
                }
                section.close().await;
                Err(e.into())
            }
        }
    }

    async fn reset(&self) -> Result<Workspace, WorkspaceError> {
        let workspaces = self.workspaces.clone();
        let key = self.key.clone();
        tokio::task::spawn_blocking(move || workspaces.reset(&key))
            .await
            .map_err(|e| WorkspaceError {
                path: self.workspaces.path_for(&self.key),
                source: io::Error::other(e),
            })?
    }
}

/// Raw query value as it goes into the log: quoted, control characters escaped.
fn quoted(raw: Option<&str>) -> String {
    format!("{:?}", raw.unwrap_or(""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoted_escapes_line_breaks() {
        let logged = quoted(Some("blog\n[9] complete: other (1 bytes)"));
        assert_eq!(logged.lines().count(), 1);
        assert!(logged.starts_with('"') && logged.ends_with('"'));
        assert!(logged.contains("\\n"));
        assert_eq!(quoted(None), "\"\"");
    }
}
