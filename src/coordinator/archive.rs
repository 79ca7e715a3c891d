//! Zip encoding of a workspace directory, written straight into the response body.
//!
//! The encoder runs on a blocking thread and writes through [`ChannelWriter`] into a bounded
//! channel that backs the HTTP body. A closed channel (caller went away) turns into a write
//! error, which stops the walk.

use bytes::Bytes;
use log::debug;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use walkdir::WalkDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::utils::config::ArchiveConsts;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("couldn't walk {}: {source}", .path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("couldn't read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("couldn't write zip: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("couldn't write zip: {0}")]
    Io(#[from] io::Error),
}

/// Write `dir` as a zip to `sink`. Entries are rooted at the directory's own name
/// (`myblog/...`), directories get their own entries. The sink is flushed after the central
/// directory is written.
pub fn write_zip<W: Write>(dir: &Path, sink: &mut W) -> Result<(), ArchiveError> {
    let base = dir.parent().unwrap_or(Path::new(""));
    let mut zip = ZipWriter::new_stream(&mut *sink);
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|source| ArchiveError::Walk {
            path: source
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| dir.to_path_buf()),
            source,
        })?;
        let name = entry_name(entry.path(), base);
        if entry.file_type().is_dir() {
            zip.add_directory(name, options)?;
            continue;
        }
        if !entry.file_type().is_file() {
            debug!("skipping non-regular entry {}", entry.path().display());
            continue;
        }
        let mut file = std::fs::File::open(entry.path()).map_err(|source| ArchiveError::Read {
            path: entry.path().to_path_buf(),
            source,
        })?;
        let size = file.metadata().map(|m| m.len()).unwrap_or(0);
        zip.start_file(name, options.large_file(size >= ArchiveConsts::LARGE_FILE_THRESHOLD))?;
        io::copy(&mut file, &mut zip)?;
    }

    zip.finish()?;
    sink.flush()?;
    Ok(())
}

/// Archive-internal name: path relative to `base`, forward slashes.
fn entry_name(path: &Path, base: &Path) -> String {
    let rel = path.strip_prefix(base).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Sink half of the body channel. Buffers writes into chunks of [`ArchiveConsts::CHUNK_SIZE`].
/// Must be used from a blocking context.
pub struct ChannelWriter {
    tx: mpsc::Sender<io::Result<Bytes>>,
    buf: Vec<u8>,
    written: u64,
}

impl ChannelWriter {
    pub fn new(tx: mpsc::Sender<io::Result<Bytes>>) -> Self {
        Self {
            tx,
            buf: Vec::with_capacity(ArchiveConsts::CHUNK_SIZE),
            written: 0,
        }
    }

    /// Bytes handed to the body so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    fn send_buf(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = Bytes::from(std::mem::replace(
            &mut self.buf,
            Vec::with_capacity(ArchiveConsts::CHUNK_SIZE),
        ));
        let len = chunk.len() as u64;
        self.tx
            .blocking_send(Ok(chunk))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected"))?;
        self.written += len;
        Ok(())
    }

    /// Abort the body: the receiving side sees an error item and the response is cut off.
    pub fn abort(self, err: &ArchiveError) {
        let _ = self
            .tx
            .blocking_send(Err(io::Error::other(err.to_string())));
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        if self.buf.len() >= ArchiveConsts::CHUNK_SIZE {
            self.send_buf()?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_name_rooted_at_dir() {
        let base = Path::new("/srv/work");
        assert_eq!(
            entry_name(Path::new("/srv/work/myblog/posts/1.html"), base),
            "myblog/posts/1.html"
        );
        assert_eq!(entry_name(Path::new("/srv/work/myblog"), base), "myblog");
    }
}
