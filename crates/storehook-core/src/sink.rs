//! Append-only destinations for transaction record lines
//!
//! A sink is either the process's stdout (the default output channel) or a
//! file opened lazily on first append with `O_APPEND`. Each record line goes
//! out in a single `write_all` followed by a flush or a durable sync, so
//! concurrent appenders from other processes never see half a line from us.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::config::SyncMode;
use crate::error::{PluginError, PluginResult};

/// Where record lines go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget {
    /// Default output channel
    Stdout,
    /// Append-only file
    File(PathBuf),
}

/// An armed sink. Owns the open file handle, if any.
#[derive(Debug)]
pub struct Sink {
    target: SinkTarget,
    file: Option<File>,
    sync_mode: SyncMode,
}

impl Sink {
    /// Sink writing to stdout
    pub fn stdout(sync_mode: SyncMode) -> Self {
        Self { target: SinkTarget::Stdout, file: None, sync_mode }
    }

    /// Sink appending to `path`. The file is not opened until the first append.
    pub fn file<P: AsRef<Path>>(path: P, sync_mode: SyncMode) -> Self {
        Self {
            target: SinkTarget::File(path.as_ref().to_path_buf()),
            file: None,
            sync_mode,
        }
    }

    /// Target of this sink
    pub fn target(&self) -> &SinkTarget {
        &self.target
    }

    /// File path, `None` for stdout
    pub fn path(&self) -> Option<&Path> {
        match &self.target {
            SinkTarget::File(path) => Some(path),
            SinkTarget::Stdout => None,
        }
    }

    /// Whether the backing file is currently open
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Append one complete line.
    ///
    /// On failure the file handle is dropped so the next append reopens it.
    pub fn append(&mut self, line: &[u8]) -> PluginResult<()> {
        let Sink { target, file, sync_mode } = self;

        let path = match target {
            SinkTarget::Stdout => {
                let mut out = io::stdout().lock();
                return out
                    .write_all(line)
                    .and_then(|_| out.flush())
                    .map_err(|e| PluginError::sink(None, &e, "stdout write failed"));
            }
            SinkTarget::File(path) => path,
        };

        if file.is_none() {
            let opened = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&*path)
                .map_err(|e| PluginError::sink(Some(path.clone()), &e, "failed to open sink"))?;
            *file = Some(opened);
        }
        let Some(handle) = file.as_mut() else {
            return Err(PluginError::SinkWriteFailure {
                path: Some(path.clone()),
                kind: io::ErrorKind::NotFound,
                message: "sink handle missing after open".into(),
            });
        };

        let result = handle.write_all(line).and_then(|_| match sync_mode {
            SyncMode::Flush => handle.flush(),
            SyncMode::Durable => durable_sync(handle),
        });

        if let Err(e) = result {
            *file = None;
            return Err(PluginError::sink(Some(path.clone()), &e, "sink append failed"));
        }
        Ok(())
    }

    /// Close the backing file. The sink stays usable and reopens on the next append.
    pub fn close(&mut self) {
        self.file = None;
    }
}

/// Force written data to persistent media.
///
/// - Linux: fdatasync()
/// - macOS/iOS: fcntl(F_FULLFSYNC), plain fsync only reaches the drive cache
/// - Windows: FlushFileBuffers()
/// - Other: File::sync_data()
///
/// May block for a long time under heavy I/O. Callers holding the capture
/// lock stall every other appender for that long.
pub fn durable_sync(file: &File) -> io::Result<()> {
    #[cfg(target_os = "linux")]
    {
        use std::os::unix::io::AsRawFd;
        // SAFETY: the fd comes from a live File borrowed for the whole call.
        let result = unsafe { libc::fdatasync(file.as_raw_fd()) };
        if result == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(any(target_os = "macos", target_os = "ios"))]
    {
        use std::os::unix::io::AsRawFd;
        // SAFETY: the fd comes from a live File borrowed for the whole call.
        let result = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_FULLFSYNC) };
        if result == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(target_os = "windows")]
    {
        use std::os::windows::io::AsRawHandle;
        use winapi::um::fileapi::FlushFileBuffers;
        // SAFETY: the handle comes from a live File borrowed for the whole call.
        let result = unsafe { FlushFileBuffers(file.as_raw_handle() as *mut _) };
        if result != 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(not(any(
        target_os = "linux",
        target_os = "macos",
        target_os = "ios",
        target_os = "windows"
    )))]
    {
        file.sync_data()
    }
}
