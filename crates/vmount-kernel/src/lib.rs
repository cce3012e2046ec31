//! # vmount-kernel
//!
//! Mount and dispatch layer for a virtual filesystem.
//!
//! Storage backends register as named mountpoints. A request names a path
//! like `home:///docs/a.txt`; the registry finds the mountpoint that owns
//! it, the guard applies the mountpoint's read-only policy, and the
//! dispatcher forwards the operation to the bound backend.
//!
//! ```ignore
//! let registry = Arc::new(MountRegistry::with_config(VfsConfig::load("vmount.toml")?));
//! registry.init().await?;
//! let dispatcher = Dispatcher::new(registry.clone());
//! let listing = dispatcher
//!     .request_path(Request::Scandir { dir: FileMetadata::directory("home:///") }, RequestOptions::new())
//!     .await?;
//! ```

pub mod config;
pub mod flows;
pub mod vfs;

pub use config::{ConfigError, MountConfig, VfsConfig};
pub use flows::{
    FlowBus, FlowMessage, HasSubject, MountFlow, MountSource, SharedMountFlowBus, Subscription,
    matches_pattern, shared_mount_flow_bus,
};
pub use vfs::{
    DefaultLifecycle, Dispatcher, ListFilter, LocalBackend, MemoryBackend, MountInfo,
    MountLifecycle, MountParams, MountRegistry, MountSnapshot, Mountpoint, Operation,
    RegistryState, Request, RequestOptions, Response, Transport, TransportFactory, TransportKind,
    TransportTable, VfsError, VfsResult,
};

pub use vmount_types::{FileKind, FileMetadata, MetadataFields, MimeTable};
