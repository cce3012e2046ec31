//! VFS error types.
//!
//! Registration errors come back from `add`/`remove`/`queue_or_register`
//! directly. Everything else is the `Err` arm of a dispatched request;
//! backend errors pass through untouched.

use std::io;
use thiserror::Error;

use super::ops::Operation;

/// VFS error type.
#[derive(Debug, Error)]
pub enum VfsError {
    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------
    /// A mountpoint with this name is already registered.
    #[error("mountpoint already registered: {0}")]
    DuplicateMount(String),

    /// No transport factory registered for this kind.
    #[error("unknown transport kind: {0}")]
    UnknownTransport(String),

    /// The transport kind needs authorization fields that weren't supplied.
    #[error("transport {transport} requires option {field}")]
    MissingCredentials { transport: String, field: String },

    /// Mount options failed the transport's validation.
    #[error("invalid options for transport {transport}: {reason}")]
    InvalidOptions { transport: String, reason: String },

    /// Mount names must be non-empty and free of `/` and `://`.
    #[error("invalid mount name: {0:?}")]
    InvalidName(String),

    /// Ownership pattern didn't compile.
    #[error("invalid ownership pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// No mountpoint with this name is registered.
    #[error("mountpoint not registered: {0}")]
    NotMounted(String),

    // ------------------------------------------------------------------------
    // Resolution / authorization / contract
    // ------------------------------------------------------------------------
    /// No mount point owns this path and no default applies.
    #[error("no mount point for path: {0}")]
    NoMountPoint(String),

    /// Blocked by read-only policy.
    #[error("{op} denied: mountpoint {mount} is read-only")]
    ReadOnly { op: Operation, mount: String },

    /// The mountpoint record has no transport bound to it.
    #[error("invalid transport {transport} for mountpoint {mount}")]
    InvalidTransport { transport: String, mount: String },

    /// The transport doesn't implement this operation.
    #[error("operation {0} is unavailable on this transport")]
    Unavailable(Operation),

    // ------------------------------------------------------------------------
    // Backend
    // ------------------------------------------------------------------------
    /// File or directory not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Path already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Permission denied.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Expected a file.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// Directory not empty.
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// Path escapes root (security violation).
    #[error("path escapes root: {0}")]
    PathEscapesRoot(String),

    /// Invalid path.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Source and destination live on different backends.
    #[error("cross-device link")]
    CrossDeviceLink,

    /// The caller's cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl VfsError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    pub fn permission_denied(path: impl Into<String>) -> Self {
        Self::PermissionDenied(path.into())
    }

    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::IsADirectory(path.into())
    }

    pub fn directory_not_empty(path: impl Into<String>) -> Self {
        Self::DirectoryNotEmpty(path.into())
    }

    pub fn path_escapes_root(path: impl Into<String>) -> Self {
        Self::PathEscapesRoot(path.into())
    }

    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    pub fn no_mount_point(path: impl Into<String>) -> Self {
        Self::NoMountPoint(path.into())
    }

    pub fn unavailable(op: Operation) -> Self {
        Self::Unavailable(op)
    }

    pub fn read_only(op: Operation, mount: impl Into<String>) -> Self {
        Self::ReadOnly {
            op,
            mount: mount.into(),
        }
    }

    pub fn invalid_options(transport: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidOptions {
            transport: transport.into(),
            reason: reason.to_string(),
        }
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// True for the registration-time errors.
    pub fn is_registration(&self) -> bool {
        matches!(
            self,
            VfsError::DuplicateMount(_)
                | VfsError::UnknownTransport(_)
                | VfsError::MissingCredentials { .. }
                | VfsError::InvalidOptions { .. }
                | VfsError::InvalidName(_)
                | VfsError::InvalidPattern { .. }
                | VfsError::NotMounted(_)
        )
    }
}

/// Convert VfsError to std::io::Error for compatibility.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::AlreadyExists(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            VfsError::PermissionDenied(msg) => {
                io::Error::new(io::ErrorKind::PermissionDenied, msg)
            }
            e @ VfsError::ReadOnly { .. } => {
                io::Error::new(io::ErrorKind::PermissionDenied, e.to_string())
            }
            VfsError::NotADirectory(msg) => io::Error::new(io::ErrorKind::NotADirectory, msg),
            VfsError::IsADirectory(msg) => io::Error::new(io::ErrorKind::IsADirectory, msg),
            VfsError::DirectoryNotEmpty(msg) => {
                io::Error::new(io::ErrorKind::DirectoryNotEmpty, msg)
            }
            VfsError::PathEscapesRoot(msg) => {
                io::Error::new(io::ErrorKind::PermissionDenied, msg)
            }
            VfsError::InvalidPath(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            VfsError::NoMountPoint(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            e @ VfsError::Unavailable(_) => {
                io::Error::new(io::ErrorKind::Unsupported, e.to_string())
            }
            VfsError::Cancelled => io::Error::new(io::ErrorKind::Interrupted, "operation cancelled"),
            VfsError::CrossDeviceLink => io::Error::other("cross-device link"),
            VfsError::Io(e) => e,
            other => io::Error::other(other.to_string()),
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;
