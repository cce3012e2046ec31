//! Shared file metadata types for vmount.
//!
//! This crate is the currency passed between the dispatcher and every
//! transport: [`FileMetadata`] describes one filesystem entry addressed as
//! `<mount>://<relative-path>`. It has no async and no I/O, so backends and
//! front ends can depend on it without pulling in the mount layer.
//!
//! # Key Types
//!
//! | Type               | Purpose                                        |
//! |--------------------|------------------------------------------------|
//! | [`FileMetadata`]   | One entry: path, filename, kind, size, type    |
//! | [`MetadataFields`] | Structured (partial) input for construction    |
//! | [`MetadataInput`]  | Path string or structured fields               |
//! | [`FileKind`]       | `file` or `directory`                          |
//! | [`MimeTable`]      | Extension → content-type lookup                |

pub mod metadata;
pub mod mime;

pub use metadata::{FileKind, FileMetadata, MetadataFields, MetadataInput, basename, split_scheme};
pub use mime::{DEFAULT_CONTENT_TYPE, MimeTable};
