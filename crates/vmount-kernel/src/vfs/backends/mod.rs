//! VFS backends.
//!
//! Backends implement [`Transport`](super::Transport) for different storage types.

mod local;
mod memory;

pub use local::{LocalBackend, TRASH_DIR};
pub use memory::MemoryBackend;
