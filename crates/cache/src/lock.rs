//! Advisory per-key write locks.

use crate::error::{ErrorKind, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Error as IoError;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const INITIAL_BACKOFF: Duration = Duration::from_millis(10);
const MAX_BACKOFF: Duration = Duration::from_millis(500);

/// An exclusive `flock`-style lock on `<key>.lock`, released on drop.
///
/// The lock file itself is left in place: deleting it while another process
/// is waiting on it would let two writers hold "the" lock at once.
#[derive(Debug)]
pub(crate) struct KeyLock {
    file: File,
    path: PathBuf,
}

impl KeyLock {
    /// Wait for the lock with exponential backoff, up to `timeout`.
    ///
    /// Blocks the calling thread; run it on a blocking pool from async code.
    pub(crate) fn acquire(path: &Path, key: &str, timeout: Duration, cancel: &CancellationToken) -> Result<Self> {
        let file = open(path)?;
        let start = Instant::now();
        let mut backoff = INITIAL_BACKOFF;
        let mut contended = false;
        loop {
            if cancel.is_cancelled() {
                exn::bail!(ErrorKind::Cancelled);
            }
            match file.try_lock_exclusive() {
                Ok(()) => {
                    tracing::trace!(path = %path.display(), waited_ms = start.elapsed().as_millis() as u64, "acquired cache lock");
                    return Ok(Self { file, path: path.to_path_buf() });
                },
                Err(e) if is_contended(&e) => {
                    if start.elapsed() >= timeout {
                        exn::bail!(ErrorKind::LockTimeout { key: key.to_string(), waited_secs: timeout.as_secs() });
                    }
                    if !contended {
                        tracing::debug!(%key, "waiting for another writer to release the cache lock");
                        contended = true;
                    }
                    std::thread::sleep(backoff);
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                },
                Err(e) => exn::bail!(ErrorKind::Io(e)),
            }
        }
    }

    /// Take the lock only if nobody holds it right now.
    pub(crate) fn try_acquire(path: &Path) -> Result<Option<Self>> {
        let file = open(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { file, path: path.to_path_buf() })),
            Err(e) if is_contended(&e) => Ok(None),
            Err(e) => exn::bail!(ErrorKind::Io(e)),
        }
    }
}

impl Drop for KeyLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release cache lock");
        }
    }
}

fn open(path: &Path) -> Result<File> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .map_err(|e| ErrorKind::from_io(e, path))?;
    Ok(file)
}

fn is_contended(err: &IoError) -> bool {
    err.kind() == std::io::ErrorKind::WouldBlock || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
