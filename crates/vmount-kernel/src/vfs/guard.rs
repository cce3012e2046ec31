//! Read-only authorization.
//!
//! Decides, before any backend method runs, whether an operation is allowed
//! on a mountpoint. Pure: the only outside knowledge it needs (the
//! `internal` flag of a copy's destination owner) comes in as a closure.
//!
//! Truth table for `copy` out of a read-only mount:
//!
//! | source internal | destination internal | blocked |
//! |-----------------|----------------------|---------|
//! | true            | true                 | no      |
//! | true            | false                | yes     |
//! | false           | true                 | yes     |
//! | false           | false                | no      |
//!
//! The destination's own `read_only` flag is not consulted here.

use super::mount::MountSnapshot;
use super::ops::{Operation, Request};
use super::{VfsError, VfsResult};

/// True if `op` must not run against `mount`.
///
/// `destination` is the target path of a copy; `destination_internal`
/// reports whether that path's owner is an internal mount (an unresolved
/// destination counts as not internal).
pub fn is_blocked<F>(
    op: Operation,
    mount: &MountSnapshot,
    destination: Option<&str>,
    destination_internal: F,
) -> bool
where
    F: FnOnce(&str) -> bool,
{
    if !mount.read_only {
        return false;
    }
    if op.is_mutating() {
        return true;
    }
    if op == Operation::Copy {
        let dest_internal = destination.map(destination_internal).unwrap_or(false);
        return dest_internal != mount.internal;
    }
    false
}

/// [`is_blocked`] for a whole request, as an error.
pub fn check<F>(request: &Request, mount: &MountSnapshot, destination_internal: F) -> VfsResult<()>
where
    F: FnOnce(&str) -> bool,
{
    let op = request.operation();
    let destination = request.destination().map(|to| to.path());
    if is_blocked(op, mount, destination, destination_internal) {
        Err(VfsError::read_only(op, &mount.name))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::mount::{DefaultLifecycle, MountParams, Mountpoint};
    use std::sync::Arc;
    use strum::IntoEnumIterator;
    use vmount_types::FileMetadata;

    fn snapshot(read_only: bool, internal: bool) -> MountSnapshot {
        let params = MountParams::new("src", "memory")
            .read_only(read_only)
            .internal(internal);
        let lifecycle = Arc::new(DefaultLifecycle::new("src"));
        Mountpoint::new(params, true, None, lifecycle)
            .unwrap()
            .snapshot()
            .clone()
    }

    #[test]
    fn test_writable_mount_never_blocked() {
        let mount = snapshot(false, true);
        for op in Operation::iter() {
            assert!(!is_blocked(op, &mount, Some("other:///x"), |_| false), "{op}");
        }
    }

    #[test]
    fn test_read_only_blocks_mutating_set() {
        for internal in [true, false] {
            let mount = snapshot(true, internal);
            for op in [
                Operation::Upload,
                Operation::Unlink,
                Operation::Write,
                Operation::Mkdir,
                Operation::Move,
                Operation::Trash,
                Operation::Untrash,
                Operation::EmptyTrash,
            ] {
                assert!(is_blocked(op, &mount, None, |_| internal), "{op}");
            }
        }
    }

    #[test]
    fn test_read_only_allows_reads() {
        let mount = snapshot(true, true);
        for op in [
            Operation::Scandir,
            Operation::Read,
            Operation::Exists,
            Operation::Fileinfo,
            Operation::Url,
        ] {
            assert!(!is_blocked(op, &mount, None, |_| false), "{op}");
        }
    }

    #[test]
    fn test_copy_truth_table() {
        let cases = [
            (true, true, false),
            (true, false, true),
            (false, true, true),
            (false, false, false),
        ];
        for (src_internal, dst_internal, blocked) in cases {
            let mount = snapshot(true, src_internal);
            assert_eq!(
                is_blocked(Operation::Copy, &mount, Some("dst:///a"), |_| dst_internal),
                blocked,
                "src internal={src_internal} dst internal={dst_internal}"
            );
        }
    }

    #[test]
    fn test_copy_unresolved_destination_counts_as_external() {
        let mount = snapshot(true, true);
        assert!(is_blocked(Operation::Copy, &mount, None, |_| true));
        let mount = snapshot(true, false);
        assert!(!is_blocked(Operation::Copy, &mount, None, |_| true));
    }

    #[test]
    fn test_check_reports_read_only() {
        let mount = snapshot(true, true);
        let request = Request::Write {
            file: FileMetadata::new("src:///a.txt"),
            data: b"x".to_vec(),
        };
        let err = check(&request, &mount, |_| true).unwrap_err();
        assert!(matches!(err, VfsError::ReadOnly { op: Operation::Write, ref mount } if mount == "src"));

        let request = Request::Copy {
            from: FileMetadata::new("src:///a.txt"),
            to: FileMetadata::new("dst:///a.txt"),
        };
        let mut seen = None;
        check(&request, &mount, |path| {
            seen = Some(path.to_string());
            true
        })
        .unwrap();
        assert_eq!(seen.as_deref(), Some("dst:///a.txt"));
    }
}
