//! Request dispatch.
//!
//! Every filesystem operation goes through [`Dispatcher::request`]:
//!
//! 1. the mountpoint must carry a bound transport (`InvalidTransport`)
//! 2. the read-only guard must allow the operation (`ReadOnly`)
//! 3. the transport method runs with the request's options and the
//!    mountpoint's snapshot as trailing context
//!
//! Operations outside the transport contract (`upload`) and methods a
//! backend doesn't override fail with `Unavailable`. Backend results and
//! errors come back untouched.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::guard;
use super::mount::{MountSnapshot, Mountpoint};
use super::ops::{Operation, Request, RequestOptions, Response, Transport};
use super::registry::MountRegistry;
use super::{VfsError, VfsResult};

/// Call one transport method for `request`.
///
/// No resolution and no guard: this is the path a single backend wrapper
/// uses directly, and the last step of [`Dispatcher::request`].
pub async fn invoke(
    transport: &dyn Transport,
    request: Request,
    options: &RequestOptions,
    mount: &MountSnapshot,
) -> VfsResult<Response> {
    match request {
        Request::Scandir { dir } => transport
            .scandir(&dir, options, mount)
            .await
            .map(Response::Entries),
        Request::Read { file } => transport.read(&file, options, mount).await.map(Response::Data),
        Request::Write { file, data } => transport
            .write(&file, &data, options, mount)
            .await
            .map(Response::Written),
        Request::Copy { from, to } => transport
            .copy(&from, &to, options, mount)
            .await
            .map(|()| Response::Done),
        Request::Move { from, to } => transport
            .rename(&from, &to, options, mount)
            .await
            .map(|()| Response::Done),
        Request::Unlink { file } => transport
            .unlink(&file, options, mount)
            .await
            .map(|()| Response::Done),
        Request::Mkdir { dir } => transport
            .mkdir(&dir, options, mount)
            .await
            .map(|()| Response::Done),
        Request::Exists { file } => transport
            .exists(&file, options, mount)
            .await
            .map(Response::Exists),
        Request::Fileinfo { file } => transport
            .fileinfo(&file, options, mount)
            .await
            .map(Response::Info),
        Request::Url { file } => transport.url(&file, options, mount).await.map(Response::Url),
        Request::Trash { file } => transport
            .trash(&file, options, mount)
            .await
            .map(|()| Response::Done),
        Request::Untrash { file } => transport
            .untrash(&file, options, mount)
            .await
            .map(|()| Response::Done),
        Request::EmptyTrash => transport
            .empty_trash(options, mount)
            .await
            .map(|()| Response::Done),
        Request::Upload { .. } => Err(VfsError::unavailable(Operation::Upload)),
    }
}

/// Resolves, authorizes and forwards requests.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<MountRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<MountRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<MountRegistry> {
        &self.registry
    }

    /// Run `request` against `mount`.
    pub async fn request(
        &self,
        mount: &Mountpoint,
        request: Request,
        options: RequestOptions,
    ) -> VfsResult<Response> {
        let op = request.operation();

        let Some(transport) = mount.transport() else {
            return Err(VfsError::InvalidTransport {
                transport: mount.transport_kind().to_string(),
                mount: mount.name().to_string(),
            });
        };

        guard::check(&request, mount.snapshot(), |dest| {
            self.registry.is_owned_by_internal_mount(dest)
        })?;

        let snapshot = mount.snapshot().clone();
        debug!(mount = %snapshot.name, op = %op, "Dispatching request");
        invoke(transport.as_ref(), request, &options, &snapshot).await
    }

    /// Run `request` against the mountpoint registered as `name`.
    pub async fn request_mount(
        &self,
        name: &str,
        request: Request,
        options: RequestOptions,
    ) -> VfsResult<Response> {
        let mount = self
            .registry
            .get(name)
            .ok_or_else(|| VfsError::NotMounted(name.to_string()))?;
        self.request(&mount, request, options).await
    }

    /// Resolve the owner of the request's primary path (default mount
    /// included), then dispatch.
    pub async fn request_path(&self, request: Request, options: RequestOptions) -> VfsResult<Response> {
        let Some(target) = request.target() else {
            return Err(VfsError::invalid_path(format!(
                "{} has no path to resolve",
                request.operation()
            )));
        };
        let path = target.path().to_string();
        let mount = self
            .registry
            .resolve_mount(&path, true)
            .ok_or_else(|| VfsError::no_mount_point(path))?;
        self.request(&mount, request, options).await
    }

    /// Fire-and-forget form of [`request`](Self::request).
    ///
    /// The result goes to `reply` when given. Without a reply channel, or
    /// when the receiver is gone, the outcome is logged instead.
    pub fn submit(
        &self,
        mount: Arc<Mountpoint>,
        request: Request,
        options: RequestOptions,
        reply: Option<oneshot::Sender<VfsResult<Response>>>,
    ) -> JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let op = request.operation();
            let result = dispatcher.request(&mount, request, options).await;
            match reply {
                Some(tx) => {
                    if tx.send(result).is_err() {
                        warn!(mount = %mount.name(), op = %op, "Request result dropped: receiver gone");
                    }
                }
                None => match result {
                    Ok(_) => warn!(mount = %mount.name(), op = %op, "Request completed with no reply channel"),
                    Err(e) => warn!(
                        mount = %mount.name(),
                        op = %op,
                        error = %e,
                        "Request failed with no reply channel"
                    ),
                },
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::mount::{DefaultLifecycle, MountParams};
    use vmount_types::FileMetadata;

    async fn setup() -> Dispatcher {
        let registry = Arc::new(MountRegistry::new());
        registry.init().await.unwrap();
        registry.add(MountParams::new("home", "memory")).await.unwrap();
        registry
            .add(MountParams::new("share", "memory").read_only(true).internal(false))
            .await
            .unwrap();
        registry.set_default_mount(Some("home".into()));
        Dispatcher::new(registry)
    }

    fn write(path: &str, data: &[u8]) -> Request {
        Request::Write {
            file: FileMetadata::new(path),
            data: data.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dispatcher = setup().await;
        let res = dispatcher
            .request_mount("home", write("home:///a.txt", b"hi"), RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(res, Response::Written(2));

        let res = dispatcher
            .request_path(
                Request::Read {
                    file: FileMetadata::new("home:///a.txt"),
                },
                RequestOptions::new(),
            )
            .await
            .unwrap();
        assert_eq!(res.into_data().unwrap(), b"hi");
    }

    #[tokio::test]
    async fn test_read_only_blocks_write() {
        let dispatcher = setup().await;
        let err = dispatcher
            .request_mount("share", write("share:///a.txt", b"x"), RequestOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, VfsError::ReadOnly { op: Operation::Write, .. }));
    }

    #[tokio::test]
    async fn test_unbound_mount_is_invalid_transport() {
        let dispatcher = setup().await;
        let lifecycle = Arc::new(DefaultLifecycle::new("ghost"));
        let mount = Mountpoint::new(MountParams::new("ghost", "gone"), true, None, lifecycle).unwrap();
        let err = dispatcher
            .request(&mount, Request::EmptyTrash, RequestOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, VfsError::InvalidTransport { ref transport, .. } if transport == "gone"));
    }

    #[tokio::test]
    async fn test_upload_is_unavailable() {
        let dispatcher = setup().await;
        let request = Request::Upload {
            dest: FileMetadata::new("home:///up.bin"),
            data: vec![1, 2, 3],
        };
        let err = dispatcher
            .request_mount("home", request, RequestOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, VfsError::Unavailable(Operation::Upload)));
    }

    #[tokio::test]
    async fn test_upload_blocked_before_unavailable() {
        let dispatcher = setup().await;
        let request = Request::Upload {
            dest: FileMetadata::new("share:///up.bin"),
            data: vec![],
        };
        let err = dispatcher
            .request_mount("share", request, RequestOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, VfsError::ReadOnly { op: Operation::Upload, .. }));
    }

    #[tokio::test]
    async fn test_request_path_fallback_and_unresolved() {
        let dispatcher = setup().await;
        // Unmatched path falls back to home
        let res = dispatcher
            .request_path(
                Request::Exists {
                    file: FileMetadata::new("elsewhere:///x"),
                },
                RequestOptions::new(),
            )
            .await
            .unwrap();
        assert_eq!(res, Response::Exists(false));

        dispatcher.registry().set_default_mount(None);
        let err = dispatcher
            .request_path(
                Request::Exists {
                    file: FileMetadata::new("elsewhere:///x"),
                },
                RequestOptions::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, VfsError::NoMountPoint(ref p) if p == "elsewhere:///x"));
    }

    #[tokio::test]
    async fn test_submit_with_reply() {
        let dispatcher = setup().await;
        let mount = dispatcher.registry().get("home").unwrap();
        let (tx, rx) = oneshot::channel();
        dispatcher.submit(
            mount,
            Request::Mkdir {
                dir: FileMetadata::directory("home:///docs"),
            },
            RequestOptions::new(),
            Some(tx),
        );
        assert_eq!(rx.await.unwrap().unwrap(), Response::Done);
    }

    #[tokio::test]
    async fn test_submit_without_reply_still_runs() {
        let dispatcher = setup().await;
        let mount = dispatcher.registry().get("home").unwrap();
        dispatcher
            .submit(mount, write("home:///bg.txt", b"bg"), RequestOptions::new(), None)
            .await
            .unwrap();

        let res = dispatcher
            .request_mount(
                "home",
                Request::Exists {
                    file: FileMetadata::new("home:///bg.txt"),
                },
                RequestOptions::new(),
            )
            .await
            .unwrap();
        assert_eq!(res, Response::Exists(true));
    }
}
