//! Transport contract and operation vocabulary.
//!
//! Every backend implements [`Transport`]. The operation set is fixed; a
//! backend that doesn't support an operation simply doesn't override it and
//! the default body fails with [`VfsError::Unavailable`], so the dispatcher
//! can treat every transport the same way.
//!
//! Each method takes its file arguments, then the per-request
//! [`RequestOptions`], then a read-only [`MountSnapshot`] of the mountpoint
//! the request was routed through.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};
use tokio_util::sync::CancellationToken;

use vmount_types::FileMetadata;

use super::mount::MountSnapshot;
use super::{VfsError, VfsResult};

// ============================================================================
// Operation
// ============================================================================

/// Named filesystem operation.
///
/// String forms match the wire names: `scandir`, `emptyTrash`, ...
/// `Upload` is known to the authorization guard but is not part of the
/// transport contract; dispatching it yields `Unavailable`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum Operation {
    Scandir,
    Read,
    Write,
    Copy,
    Move,
    Unlink,
    Mkdir,
    Exists,
    Fileinfo,
    Url,
    Trash,
    Untrash,
    EmptyTrash,
    Upload,
}

impl Operation {
    /// Operations blocked outright on a read-only mountpoint.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Operation::Upload
                | Operation::Unlink
                | Operation::Write
                | Operation::Mkdir
                | Operation::Move
                | Operation::Trash
                | Operation::Untrash
                | Operation::EmptyTrash
        )
    }

    /// True if [`Transport`] has a method for this operation.
    pub fn is_transport_op(&self) -> bool {
        !matches!(self, Operation::Upload)
    }

    /// The operations every transport exposes.
    pub fn transport_ops() -> impl Iterator<Item = Operation> {
        Operation::iter().filter(Operation::is_transport_op)
    }
}

// ============================================================================
// Request / Response
// ============================================================================

/// One operation plus its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Scandir { dir: FileMetadata },
    Read { file: FileMetadata },
    Write { file: FileMetadata, data: Vec<u8> },
    Copy { from: FileMetadata, to: FileMetadata },
    Move { from: FileMetadata, to: FileMetadata },
    Unlink { file: FileMetadata },
    Mkdir { dir: FileMetadata },
    Exists { file: FileMetadata },
    Fileinfo { file: FileMetadata },
    Url { file: FileMetadata },
    Trash { file: FileMetadata },
    Untrash { file: FileMetadata },
    EmptyTrash,
    Upload { dest: FileMetadata, data: Vec<u8> },
}

impl Request {
    pub fn operation(&self) -> Operation {
        match self {
            Request::Scandir { .. } => Operation::Scandir,
            Request::Read { .. } => Operation::Read,
            Request::Write { .. } => Operation::Write,
            Request::Copy { .. } => Operation::Copy,
            Request::Move { .. } => Operation::Move,
            Request::Unlink { .. } => Operation::Unlink,
            Request::Mkdir { .. } => Operation::Mkdir,
            Request::Exists { .. } => Operation::Exists,
            Request::Fileinfo { .. } => Operation::Fileinfo,
            Request::Url { .. } => Operation::Url,
            Request::Trash { .. } => Operation::Trash,
            Request::Untrash { .. } => Operation::Untrash,
            Request::EmptyTrash => Operation::EmptyTrash,
            Request::Upload { .. } => Operation::Upload,
        }
    }

    /// The entry the request is about (the source, for copy/move).
    pub fn target(&self) -> Option<&FileMetadata> {
        match self {
            Request::Scandir { dir } | Request::Mkdir { dir } => Some(dir),
            Request::Read { file }
            | Request::Write { file, .. }
            | Request::Unlink { file }
            | Request::Exists { file }
            | Request::Fileinfo { file }
            | Request::Url { file }
            | Request::Trash { file }
            | Request::Untrash { file } => Some(file),
            Request::Copy { from, .. } | Request::Move { from, .. } => Some(from),
            Request::Upload { dest, .. } => Some(dest),
            Request::EmptyTrash => None,
        }
    }

    /// The destination of a copy or move.
    pub fn destination(&self) -> Option<&FileMetadata> {
        match self {
            Request::Copy { to, .. } | Request::Move { to, .. } => Some(to),
            _ => None,
        }
    }
}

/// Result of a dispatched request.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Directory listing.
    Entries(Vec<FileMetadata>),
    /// File contents.
    Data(Vec<u8>),
    /// Bytes written.
    Written(u64),
    /// Existence check.
    Exists(bool),
    /// Single entry metadata.
    Info(FileMetadata),
    /// Resolved URL.
    Url(String),
    /// Completed with nothing to return.
    Done,
}

impl Response {
    pub fn into_entries(self) -> Option<Vec<FileMetadata>> {
        match self {
            Response::Entries(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn into_data(self) -> Option<Vec<u8>> {
        match self {
            Response::Data(data) => Some(data),
            _ => None,
        }
    }

    pub fn into_info(self) -> Option<FileMetadata> {
        match self {
            Response::Info(meta) => Some(meta),
            _ => None,
        }
    }
}

// ============================================================================
// RequestOptions
// ============================================================================

/// Per-request options bag.
///
/// The dispatcher hands this to the transport untouched. `cancel` is how a
/// caller asks a backend to give up; honoring it is up to the backend.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub cancel: Option<CancellationToken>,
    pub extra: Map<String, Value>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// `Err(Cancelled)` once the token has fired.
    pub fn check_cancelled(&self) -> VfsResult<()> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(VfsError::Cancelled),
            _ => Ok(()),
        }
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Backend contract.
///
/// All paths are fully qualified (`<mount>://...`); backends strip
/// `mount.root` themselves. Every default body fails with `Unavailable`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// List a directory.
    async fn scandir(
        &self,
        _dir: &FileMetadata,
        _options: &RequestOptions,
        _mount: &MountSnapshot,
    ) -> VfsResult<Vec<FileMetadata>> {
        Err(VfsError::unavailable(Operation::Scandir))
    }

    /// Read a whole file.
    async fn read(
        &self,
        _file: &FileMetadata,
        _options: &RequestOptions,
        _mount: &MountSnapshot,
    ) -> VfsResult<Vec<u8>> {
        Err(VfsError::unavailable(Operation::Read))
    }

    /// Create or replace a file. Returns bytes written.
    async fn write(
        &self,
        _file: &FileMetadata,
        _data: &[u8],
        _options: &RequestOptions,
        _mount: &MountSnapshot,
    ) -> VfsResult<u64> {
        Err(VfsError::unavailable(Operation::Write))
    }

    /// Copy `from` to `to`. `to` may belong to a different mountpoint.
    async fn copy(
        &self,
        _from: &FileMetadata,
        _to: &FileMetadata,
        _options: &RequestOptions,
        _mount: &MountSnapshot,
    ) -> VfsResult<()> {
        Err(VfsError::unavailable(Operation::Copy))
    }

    /// The `move` operation.
    async fn rename(
        &self,
        _from: &FileMetadata,
        _to: &FileMetadata,
        _options: &RequestOptions,
        _mount: &MountSnapshot,
    ) -> VfsResult<()> {
        Err(VfsError::unavailable(Operation::Move))
    }

    /// Remove a file or directory tree.
    async fn unlink(
        &self,
        _file: &FileMetadata,
        _options: &RequestOptions,
        _mount: &MountSnapshot,
    ) -> VfsResult<()> {
        Err(VfsError::unavailable(Operation::Unlink))
    }

    async fn mkdir(
        &self,
        _dir: &FileMetadata,
        _options: &RequestOptions,
        _mount: &MountSnapshot,
    ) -> VfsResult<()> {
        Err(VfsError::unavailable(Operation::Mkdir))
    }

    async fn exists(
        &self,
        _file: &FileMetadata,
        _options: &RequestOptions,
        _mount: &MountSnapshot,
    ) -> VfsResult<bool> {
        Err(VfsError::unavailable(Operation::Exists))
    }

    async fn fileinfo(
        &self,
        _file: &FileMetadata,
        _options: &RequestOptions,
        _mount: &MountSnapshot,
    ) -> VfsResult<FileMetadata> {
        Err(VfsError::unavailable(Operation::Fileinfo))
    }

    /// Resolve a URL the entry can be fetched from.
    async fn url(
        &self,
        _file: &FileMetadata,
        _options: &RequestOptions,
        _mount: &MountSnapshot,
    ) -> VfsResult<String> {
        Err(VfsError::unavailable(Operation::Url))
    }

    async fn trash(
        &self,
        _file: &FileMetadata,
        _options: &RequestOptions,
        _mount: &MountSnapshot,
    ) -> VfsResult<()> {
        Err(VfsError::unavailable(Operation::Trash))
    }

    async fn untrash(
        &self,
        _file: &FileMetadata,
        _options: &RequestOptions,
        _mount: &MountSnapshot,
    ) -> VfsResult<()> {
        Err(VfsError::unavailable(Operation::Untrash))
    }

    async fn empty_trash(
        &self,
        _options: &RequestOptions,
        _mount: &MountSnapshot,
    ) -> VfsResult<()> {
        Err(VfsError::unavailable(Operation::EmptyTrash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_names() {
        assert_eq!(Operation::EmptyTrash.to_string(), "emptyTrash");
        assert_eq!(Operation::Scandir.as_ref(), "scandir");
        assert_eq!("fileinfo".parse::<Operation>().unwrap(), Operation::Fileinfo);
        assert_eq!("emptyTrash".parse::<Operation>().unwrap(), Operation::EmptyTrash);
        assert!("rmdir".parse::<Operation>().is_err());
    }

    #[test]
    fn test_transport_ops() {
        let ops: Vec<_> = Operation::transport_ops().collect();
        assert_eq!(ops.len(), 13);
        assert!(!ops.contains(&Operation::Upload));
    }

    #[test]
    fn test_mutating_set() {
        let mutating: Vec<_> = Operation::iter().filter(Operation::is_mutating).collect();
        assert_eq!(
            mutating,
            vec![
                Operation::Write,
                Operation::Move,
                Operation::Unlink,
                Operation::Mkdir,
                Operation::Trash,
                Operation::Untrash,
                Operation::EmptyTrash,
                Operation::Upload,
            ]
        );
        assert!(!Operation::Copy.is_mutating());
        assert!(!Operation::Read.is_mutating());
    }

    #[test]
    fn test_request_target_and_destination() {
        let from = FileMetadata::new("home:///a.txt");
        let to = FileMetadata::new("share:///a.txt");
        let req = Request::Copy {
            from: from.clone(),
            to: to.clone(),
        };
        assert_eq!(req.operation(), Operation::Copy);
        assert_eq!(req.target(), Some(&from));
        assert_eq!(req.destination(), Some(&to));

        assert_eq!(Request::EmptyTrash.target(), None);
        assert_eq!(Request::Read { file: from }.destination(), None);
    }

    #[test]
    fn test_cancellation() {
        let token = CancellationToken::new();
        let opts = RequestOptions::new().with_cancel(token.clone()).with("overwrite", true);
        assert!(opts.check_cancelled().is_ok());
        assert_eq!(opts.get("overwrite"), Some(&Value::Bool(true)));
        token.cancel();
        assert!(matches!(opts.check_cancelled(), Err(VfsError::Cancelled)));
    }
}
