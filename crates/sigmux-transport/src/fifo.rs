use std::ffi::CString;
use std::fs;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::interrupt::Interrupt;

/// Permission mode for created pipes.
pub const DEFAULT_PIPE_MODE: u32 = 0o600;

/// Readiness poll timeout at pipe suspension points. Bounds the latency
/// with which the interrupt flag is observed.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Create a named pipe, resolving `path` to an absolute path.
///
/// Creation is idempotent: an existing FIFO at the path is reused, not
/// recreated. Missing parent directories are created. An existing
/// non-FIFO file at the path is an error.
pub fn create_fifo(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = std::path::absolute(path.as_ref()).map_err(|e| TransportError::Create {
        path: path.as_ref().to_path_buf(),
        source: e,
    })?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| TransportError::Create {
            path: path.clone(),
            source: e,
        })?;
    }

    let c_path = cstring_path(&path)?;
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), DEFAULT_PIPE_MODE as libc::mode_t) };
    if rc == 0 {
        info!(?path, "created fifo");
        return Ok(path);
    }

    let err = io::Error::last_os_error();
    if err.raw_os_error() != Some(libc::EEXIST) {
        return Err(TransportError::Create { path, source: err });
    }
    let metadata = fs::metadata(&path).map_err(|e| TransportError::Create {
        path: path.clone(),
        source: e,
    })?;
    if !metadata.file_type().is_fifo() {
        return Err(TransportError::NotAFifo { path });
    }
    debug!(?path, "reusing existing fifo");
    Ok(path)
}

/// Write end of a named pipe.
///
/// Opening blocks until a reader attaches. Writes are bounded to the
/// OS-atomic `PIPE_BUF` chunk size and gated on a writability poll so
/// the interrupt flag is observed at least once per [`POLL_INTERVAL`].
pub struct PipeWriter {
    fd: OwnedFd,
    path: PathBuf,
}

impl PipeWriter {
    /// Open the pipe for writing. Blocks until a reader end exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let c_path = cstring_path(&path)?;
        let fd = unsafe { libc::open(c_path.as_ptr(), libc::O_WRONLY) };
        if fd < 0 {
            return Err(TransportError::Open {
                path,
                source: io::Error::last_os_error(),
            });
        }
        debug!(?path, fd, "opened pipe for writing");
        // SAFETY: fd was just returned by a successful open() and is owned here.
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Self { fd, path })
    }

    /// Write all of `data`, advancing by at most one atomic chunk per
    /// syscall.
    pub fn send(&mut self, data: &[u8], interrupt: &Interrupt) -> Result<()> {
        let mut pos = 0usize;
        while pos < data.len() {
            if interrupt.is_set() {
                return Err(TransportError::Interrupted);
            }
            if !poll_fd(self.fd.as_raw_fd(), libc::POLLOUT, POLL_INTERVAL)? {
                continue;
            }
            let end = data.len().min(pos + libc::PIPE_BUF);
            let chunk = &data[pos..end];
            // SAFETY: the pointer/length pair describes a live slice and the
            // fd is owned by self.
            let written = unsafe {
                libc::write(
                    self.fd.as_raw_fd(),
                    chunk.as_ptr().cast::<libc::c_void>(),
                    chunk.len(),
                )
            };
            if written < 0 {
                let err = io::Error::last_os_error();
                match err.raw_os_error() {
                    Some(libc::EINTR) | Some(libc::EAGAIN) => continue,
                    Some(libc::EPIPE) => return Err(TransportError::Closed),
                    _ => return Err(TransportError::Io(err)),
                }
            }
            pos += written as usize;
        }
        Ok(())
    }

    /// Flush kernel buffers to bound data loss on abrupt termination.
    ///
    /// Some kernels reject fsync on a pipe; that is not a fault.
    pub fn sync(&self) -> Result<()> {
        let rc = unsafe { libc::fsync(self.fd.as_raw_fd()) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINVAL) | Some(libc::EROFS) | Some(libc::ENOSYS) => return Ok(()),
                _ => return Err(TransportError::Io(err)),
            }
        }
        Ok(())
    }

    /// The pipe path this endpoint writes to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read end of a named pipe.
///
/// Opened nonblocking so the opener never deadlocks waiting for a
/// writer. Reads are gated on a readability poll: the poll stays quiet
/// until a writer has attached, reports data as it arrives, and reports
/// hangup once every writer has closed its end.
pub struct PipeReader {
    fd: OwnedFd,
    path: PathBuf,
}

impl PipeReader {
    /// Open the pipe for reading without waiting for a writer.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let c_path = cstring_path(&path)?;
        let fd = unsafe { libc::open(c_path.as_ptr(), libc::O_RDONLY | libc::O_NONBLOCK) };
        if fd < 0 {
            return Err(TransportError::Open {
                path,
                source: io::Error::last_os_error(),
            });
        }
        debug!(?path, fd, "opened pipe for reading");
        // SAFETY: fd was just returned by a successful open() and is owned here.
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Self { fd, path })
    }

    /// Read the next chunk into `buf`.
    ///
    /// Blocks (in poll-sized slices) until data arrives. Returns
    /// `Ok(None)` at end-of-stream, i.e. once all writers have closed.
    pub fn recv(&mut self, buf: &mut [u8], interrupt: &Interrupt) -> Result<Option<usize>> {
        loop {
            if interrupt.is_set() {
                return Err(TransportError::Interrupted);
            }
            if !poll_fd(
                self.fd.as_raw_fd(),
                libc::POLLIN,
                POLL_INTERVAL,
            )? {
                continue;
            }
            // SAFETY: the pointer/length pair describes a live mutable slice
            // and the fd is owned by self.
            let read = unsafe {
                libc::read(
                    self.fd.as_raw_fd(),
                    buf.as_mut_ptr().cast::<libc::c_void>(),
                    buf.len(),
                )
            };
            if read < 0 {
                let err = io::Error::last_os_error();
                match err.raw_os_error() {
                    Some(libc::EINTR) | Some(libc::EAGAIN) => continue,
                    _ => return Err(TransportError::Io(err)),
                }
            }
            if read == 0 {
                debug!(path = ?self.path, "pipe end of stream");
                return Ok(None);
            }
            return Ok(Some(read as usize));
        }
    }

    /// The pipe path this endpoint reads from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Poll one fd for the given events. Returns whether the fd is ready.
/// Hangup and error conditions count as ready so the caller's read
/// observes them.
fn poll_fd(fd: RawFd, events: libc::c_short, timeout: Duration) -> Result<bool> {
    let mut pollfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };
    let rc = unsafe { libc::poll(&mut pollfd, 1, timeout.as_millis() as libc::c_int) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            return Ok(false);
        }
        return Err(TransportError::Io(err));
    }
    Ok(rc > 0 && pollfd.revents != 0)
}

fn cstring_path(path: &Path) -> Result<CString> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| TransportError::Open {
        path: path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"),
    })
}
