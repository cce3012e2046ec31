//! Virtual filesystem mount layer.
//!
//! Heterogeneous backends are registered as named mountpoints and addressed
//! as `<mount>://<relative-path>`. Key components:
//!
//! - [`Transport`] - Fixed operation set every backend implements
//! - [`MountRegistry`] - Live mountpoints, path ownership, boot queue
//! - [`guard`] - Read-only authorization
//! - [`Dispatcher`] - Resolve, authorize, forward
//! - [`TransportTable`] - Transport kinds, bound once per mountpoint
//! - [`MemoryBackend`] / [`LocalBackend`] - Built-in backends
//!
//! ## Design Decisions
//!
//! - **First match wins**: ownership patterns are tried in registration
//!   order; register specific patterns before broad ones.
//! - **Bound at creation**: a mountpoint carries its `Arc<dyn Transport>`;
//!   dispatch never looks a transport up by name.
//! - **Snapshot context**: backends receive a read-only copy of the
//!   mountpoint's static fields with every call.

pub mod backends;
pub mod dispatch;
mod error;
pub mod guard;
mod mount;
mod ops;
pub mod registry;
pub mod transport;

pub use backends::{LocalBackend, MemoryBackend};
pub use dispatch::{Dispatcher, invoke};
pub use error::{VfsError, VfsResult};
pub use mount::{
    DefaultLifecycle, MountInfo, MountLifecycle, MountParams, MountSnapshot, Mountpoint,
    default_pattern,
};
pub use ops::{Operation, Request, RequestOptions, Response, Transport};
pub use registry::{ListFilter, MountRegistry, RegistryState};
pub use transport::{
    LocalFactory, LocalOptions, MemoryFactory, TransportFactory, TransportKind, TransportTable,
    parse_options,
};
