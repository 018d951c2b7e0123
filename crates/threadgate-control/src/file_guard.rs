//! Sandboxed file reads.
//!
//! A file is opened once and every check runs against that handle, so the
//! object that is validated is the object that is read. Renaming or swapping
//! the path between the checks and the read has no effect.

use std::fs::{File, Metadata};
use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::ThreadgateConfig;

/// Suffix the kernel appends to a descriptor's link target once the file has
/// been unlinked.
const DELETED_SUFFIX: &str = " (deleted)";

/// Reasons a file read was refused.
#[derive(Debug, Error)]
pub enum FileAccessError {
    /// The path could not be opened.
    #[error("cannot open {path}: {source}")]
    Open {
        /// Requested path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file was unlinked after it was opened.
    #[error("file {path} was deleted while being accessed")]
    Deleted {
        /// Requested path.
        path: PathBuf,
    },

    /// The resolved location is not under any allowed prefix.
    #[error("access denied: {real_path} is outside the allowed directories")]
    OutsideSandbox {
        /// Canonical location of the opened file.
        real_path: PathBuf,
    },

    /// The opened object is a directory, device, socket or similar.
    #[error("access denied: {real_path} is not a regular file")]
    NotRegularFile {
        /// Canonical location of the opened object.
        real_path: PathBuf,
    },

    /// The file has more than one hard link, so its canonical path does not
    /// identify it uniquely.
    #[error("access denied: {real_path} has {links} hard links")]
    HardLinked {
        /// Canonical location of the opened file.
        real_path: PathBuf,
        /// Link count reported by the filesystem.
        links: u64,
    },

    /// The file exceeds the configured maximum.
    #[error("file is too large: {size} bytes exceeds the limit of {max} bytes")]
    TooLarge {
        /// Actual size in bytes.
        size: u64,
        /// Configured maximum in bytes.
        max: u64,
    },

    /// Reading the content failed.
    #[error("failed to read {real_path}: {source}")]
    Read {
        /// Canonical location of the opened file.
        real_path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Content of a file that passed every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedFile {
    /// Full file content.
    pub buffer: Vec<u8>,
    /// Canonical, symlink-free location of the file.
    pub real_path: PathBuf,
}

impl ValidatedFile {
    /// Final path component, used as the upload name.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.real_path
            .file_name()
            .map_or_else(|| "file".to_string(), |n| n.to_string_lossy().into_owned())
    }
}

/// Validates and reads files under a fixed set of allowed prefixes.
#[derive(Debug, Clone)]
pub struct FileAccessGuard {
    prefixes: Vec<PathBuf>,
    max_bytes: u64,
}

impl FileAccessGuard {
    /// Create a guard. Prefixes are canonicalized where they exist so that a
    /// prefix which is itself a symlink (such as `/tmp` on some systems)
    /// matches the resolved paths beneath it.
    #[must_use]
    pub fn new(prefixes: &[PathBuf], max_bytes: u64) -> Self {
        let prefixes = prefixes
            .iter()
            .map(|p| std::fs::canonicalize(p).unwrap_or_else(|_| p.clone()))
            .collect();
        Self { prefixes, max_bytes }
    }

    /// Build a guard from the configured prefixes and size limit.
    #[must_use]
    pub fn from_config(config: &ThreadgateConfig) -> Self {
        Self::new(&config.allowed_prefixes, config.max_file_bytes)
    }

    /// Open, check and read `path`.
    ///
    /// # Errors
    ///
    /// Returns the first [`FileAccessError`] that applies; nothing is read
    /// unless every check passes.
    pub fn validate(&self, path: &Path) -> Result<ValidatedFile, FileAccessError> {
        let file = open_nonblocking(path).map_err(|source| FileAccessError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        self.check_open(file, path)
    }

    /// Run every check against an already opened handle, then read through it.
    fn check_open(&self, file: File, path: &Path) -> Result<ValidatedFile, FileAccessError> {
        let real_path = descriptor_path(&file, path).map_err(|source| FileAccessError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        if is_deleted_target(&real_path) {
            return Err(FileAccessError::Deleted {
                path: path.to_path_buf(),
            });
        }

        if !is_within(&real_path, &self.prefixes) {
            tracing::warn!(
                requested = %path.display(),
                real_path = %real_path.display(),
                "File access outside sandbox rejected"
            );
            return Err(FileAccessError::OutsideSandbox { real_path });
        }

        let metadata = file.metadata().map_err(|source| FileAccessError::Read {
            real_path: real_path.clone(),
            source,
        })?;

        if !metadata.is_file() {
            return Err(FileAccessError::NotRegularFile { real_path });
        }

        let links = link_count(&metadata);
        if links > 1 {
            tracing::warn!(real_path = %real_path.display(), links, "Hard-linked file rejected");
            return Err(FileAccessError::HardLinked { real_path, links });
        }

        let size = metadata.len();
        if size > self.max_bytes {
            return Err(FileAccessError::TooLarge {
                size,
                max: self.max_bytes,
            });
        }

        let buffer = read_bounded(file, size, self.max_bytes).map_err(|err| match err {
            BoundedReadError::Io(source) => FileAccessError::Read {
                real_path: real_path.clone(),
                source,
            },
            BoundedReadError::Grew(size) => FileAccessError::TooLarge {
                size,
                max: self.max_bytes,
            },
        })?;

        tracing::debug!(real_path = %real_path.display(), bytes = buffer.len(), "File validated");
        Ok(ValidatedFile { buffer, real_path })
    }
}

/// Validate and read `path` against `allowed_prefixes` and `max_bytes`.
///
/// # Errors
///
/// See [`FileAccessGuard::validate`].
pub fn validate(
    path: &Path,
    allowed_prefixes: &[PathBuf],
    max_bytes: u64,
) -> Result<ValidatedFile, FileAccessError> {
    FileAccessGuard::new(allowed_prefixes, max_bytes).validate(path)
}

enum BoundedReadError {
    Io(std::io::Error),
    Grew(u64),
}

/// Read at most `max + 1` bytes so a file that grew after the size check is
/// caught without reading it whole.
fn read_bounded(file: File, expected: u64, max: u64) -> Result<Vec<u8>, BoundedReadError> {
    let capacity = usize::try_from(expected).unwrap_or(0);
    let mut buffer = Vec::with_capacity(capacity);
    file.take(max.saturating_add(1))
        .read_to_end(&mut buffer)
        .map_err(BoundedReadError::Io)?;

    let read = buffer.len() as u64;
    if read > max {
        return Err(BoundedReadError::Grew(read));
    }
    Ok(buffer)
}

/// Open for reading without blocking, so a FIFO with no writer returns a
/// handle (later rejected as not a regular file) instead of hanging.
#[cfg(unix)]
fn open_nonblocking(path: &Path) -> std::io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;

    std::fs::OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
}

#[cfg(not(unix))]
fn open_nonblocking(path: &Path) -> std::io::Result<File> {
    File::open(path)
}

/// Resolve the path the kernel associates with an open descriptor.
///
/// Fails closed when `/proc` is unavailable; the requested path is never
/// re-resolved.
#[cfg(target_os = "linux")]
fn descriptor_path(file: &File, _requested: &Path) -> std::io::Result<PathBuf> {
    use std::os::unix::io::AsRawFd;

    std::fs::read_link(format!("/proc/self/fd/{}", file.as_raw_fd()))
}

#[cfg(not(target_os = "linux"))]
fn descriptor_path(_file: &File, requested: &Path) -> std::io::Result<PathBuf> {
    std::fs::canonicalize(requested)
}

#[cfg(unix)]
fn link_count(metadata: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.nlink()
}

#[cfg(not(unix))]
fn link_count(_metadata: &Metadata) -> u64 {
    1
}

fn is_deleted_target(path: &Path) -> bool {
    path.to_string_lossy().ends_with(DELETED_SUFFIX)
}

/// Component-wise containment: `/tmp/a` is within `/tmp`, `/tmpx/a` is not.
fn is_within(path: &Path, prefixes: &[PathBuf]) -> bool {
    prefixes.iter().any(|prefix| path.starts_with(prefix))
}
