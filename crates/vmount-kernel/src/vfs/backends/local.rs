//! Local filesystem backend.
//!
//! Provides access to real filesystem paths, with path security
//! to prevent escaping the root directory. Trashed entries are moved under
//! a hidden `.trash` directory at the root, keeping their relative path.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

use vmount_types::{FileKind, FileMetadata, MetadataFields, split_scheme};

use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::mount::MountSnapshot;
use crate::vfs::ops::{RequestOptions, Transport};

/// Directory (under the root) holding trashed entries.
pub const TRASH_DIR: &str = ".trash";

/// Local filesystem backend.
///
/// All operations are relative to `root`. For example, if `root` is
/// `/srv/home`, then reading `home:///docs/a.txt` reads
/// `/srv/home/docs/a.txt`.
///
/// Path security is enforced: attempts to escape via `..` are blocked.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Create a new local filesystem rooted at the given path.
    ///
    /// The root is canonicalized at construction time to handle symlinks
    /// (e.g. macOS `/tmp` → `/private/tmp`).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        let root = root.canonicalize().unwrap_or(root);
        Self { root }
    }

    /// Get the root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path below the root for a qualified `name:///a/b` path.
    fn relative(path: &str) -> PathBuf {
        let rest = split_scheme(path).map(|(_, rest)| rest).unwrap_or(path);
        let rest = rest.trim_start_matches('/');
        PathBuf::from(rest)
    }

    /// Resolve a qualified path to an absolute path within the root.
    ///
    /// Returns an error if the path escapes the root (via `..` or symlinks).
    fn resolve(&self, path: &str) -> VfsResult<PathBuf> {
        let relative = Self::relative(path);

        // Handle empty path (root)
        if relative.as_os_str().is_empty() {
            return Ok(self.root.clone());
        }

        let full = self.root.join(&relative);

        // Canonicalize to resolve symlinks and ..
        // For non-existent paths, we need to check parent
        let canonical = if full.exists() {
            full.canonicalize()?
        } else {
            let parent = full
                .parent()
                .ok_or_else(|| VfsError::invalid_path("no parent"))?;
            let filename = full
                .file_name()
                .ok_or_else(|| VfsError::invalid_path(path))?;

            if parent.exists() {
                parent.canonicalize()?.join(filename)
            } else {
                // Parent doesn't exist; reject lexical escapes now,
                // the operation itself will fail or create it.
                if relative
                    .components()
                    .any(|c| matches!(c, Component::ParentDir))
                {
                    return Err(VfsError::path_escapes_root(path));
                }
                full
            }
        };

        if !canonical.starts_with(&self.root) {
            return Err(VfsError::path_escapes_root(format!(
                "{} is not under {}",
                canonical.display(),
                self.root.display()
            )));
        }

        Ok(canonical)
    }

    fn trash_root(&self) -> PathBuf {
        self.root.join(TRASH_DIR)
    }

    /// Location of `path` inside the trash directory.
    fn trash_path(&self, path: &str) -> VfsResult<PathBuf> {
        let relative = Self::relative(path);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(VfsError::invalid_path(path));
        }
        if relative.as_os_str().is_empty() {
            return Err(VfsError::permission_denied("cannot trash root"));
        }
        Ok(self.trash_root().join(relative))
    }

    fn metadata(mount: &MountSnapshot, relative: &str, meta: &std::fs::Metadata) -> FileMetadata {
        let kind = if meta.is_dir() {
            FileKind::Directory
        } else {
            FileKind::File
        };
        FileMetadata::build(
            MetadataFields {
                path: mount.qualify(relative),
                kind: Some(kind),
                size: Some(if meta.is_dir() { 0 } else { meta.len() }),
                ..Default::default()
            },
            None,
            &mount.mime,
        )
    }

    /// Relative path (with leading `/`) of an absolute path under the root.
    fn relative_of(&self, full: &Path) -> String {
        let rel = full.strip_prefix(&self.root).unwrap_or(full);
        format!("/{}", rel.display())
    }

    fn check_same_device(from: &FileMetadata, to: &FileMetadata, mount: &MountSnapshot) -> VfsResult<()> {
        match to.mount_name() {
            Some(name) if name == mount.name || Some(name) == from.mount_name() => Ok(()),
            None => Ok(()),
            Some(_) => Err(VfsError::CrossDeviceLink),
        }
    }

    async fn ensure_parent(full: &Path) -> VfsResult<()> {
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Copy a file or a directory tree.
    async fn copy_tree(from: &Path, to: &Path, options: &RequestOptions) -> VfsResult<()> {
        let mut pending = vec![(from.to_path_buf(), to.to_path_buf())];
        while let Some((src, dst)) = pending.pop() {
            options.check_cancelled()?;
            let meta = fs::metadata(&src).await?;
            if meta.is_dir() {
                fs::create_dir_all(&dst).await?;
                let mut dir = fs::read_dir(&src).await?;
                while let Some(entry) = dir.next_entry().await? {
                    pending.push((entry.path(), dst.join(entry.file_name())));
                }
            } else {
                fs::copy(&src, &dst).await?;
            }
        }
        Ok(())
    }

    async fn remove_any(full: &Path) -> VfsResult<()> {
        let meta = fs::symlink_metadata(full).await?;
        if meta.is_dir() {
            fs::remove_dir_all(full).await?;
        } else {
            fs::remove_file(full).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for LocalBackend {
    async fn scandir(
        &self,
        dir: &FileMetadata,
        options: &RequestOptions,
        mount: &MountSnapshot,
    ) -> VfsResult<Vec<FileMetadata>> {
        options.check_cancelled()?;
        let full_path = self.resolve(dir.path())?;
        let meta = fs::metadata(&full_path)
            .await
            .map_err(|_| VfsError::not_found(dir.path()))?;
        if !meta.is_dir() {
            return Err(VfsError::not_a_directory(dir.path()));
        }

        let trash = self.trash_root();
        let mut entries = Vec::new();
        let mut listing = fs::read_dir(&full_path).await?;
        while let Some(entry) = listing.next_entry().await? {
            let path = entry.path();
            if path == trash {
                continue;
            }
            let meta = entry.metadata().await?;
            entries.push(Self::metadata(mount, &self.relative_of(&path), &meta));
        }

        entries.sort_by(|a, b| a.filename().cmp(b.filename()));
        Ok(entries)
    }

    async fn read(
        &self,
        file: &FileMetadata,
        options: &RequestOptions,
        _mount: &MountSnapshot,
    ) -> VfsResult<Vec<u8>> {
        options.check_cancelled()?;
        let full_path = self.resolve(file.path())?;
        if full_path.is_dir() {
            return Err(VfsError::is_a_directory(file.path()));
        }
        fs::read(&full_path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => VfsError::not_found(file.path()),
            _ => VfsError::from(e),
        })
    }

    async fn write(
        &self,
        file: &FileMetadata,
        data: &[u8],
        options: &RequestOptions,
        _mount: &MountSnapshot,
    ) -> VfsResult<u64> {
        options.check_cancelled()?;
        let full_path = self.resolve(file.path())?;
        if full_path.is_dir() {
            return Err(VfsError::is_a_directory(file.path()));
        }
        Self::ensure_parent(&full_path).await?;
        fs::write(&full_path, data).await?;
        Ok(data.len() as u64)
    }

    async fn copy(
        &self,
        from: &FileMetadata,
        to: &FileMetadata,
        options: &RequestOptions,
        mount: &MountSnapshot,
    ) -> VfsResult<()> {
        options.check_cancelled()?;
        Self::check_same_device(from, to, mount)?;
        let src = self.resolve(from.path())?;
        let dst = self.resolve(to.path())?;
        if !src.exists() {
            return Err(VfsError::not_found(from.path()));
        }
        if dst.starts_with(&src) && dst != src {
            return Err(VfsError::invalid_path(format!(
                "cannot copy {} into itself",
                from.path()
            )));
        }
        Self::ensure_parent(&dst).await?;
        Self::copy_tree(&src, &dst, options).await
    }

    async fn rename(
        &self,
        from: &FileMetadata,
        to: &FileMetadata,
        options: &RequestOptions,
        mount: &MountSnapshot,
    ) -> VfsResult<()> {
        options.check_cancelled()?;
        Self::check_same_device(from, to, mount)?;
        let src = self.resolve(from.path())?;
        let dst = self.resolve(to.path())?;
        if src == self.root {
            return Err(VfsError::permission_denied("cannot move root"));
        }
        if !src.exists() {
            return Err(VfsError::not_found(from.path()));
        }
        Self::ensure_parent(&dst).await?;
        fs::rename(&src, &dst).await?;
        Ok(())
    }

    async fn unlink(
        &self,
        file: &FileMetadata,
        options: &RequestOptions,
        _mount: &MountSnapshot,
    ) -> VfsResult<()> {
        options.check_cancelled()?;
        let full_path = self.resolve(file.path())?;
        if full_path == self.root {
            return Err(VfsError::permission_denied("cannot remove root"));
        }
        if !full_path.exists() {
            return Err(VfsError::not_found(file.path()));
        }
        Self::remove_any(&full_path).await
    }

    async fn mkdir(
        &self,
        dir: &FileMetadata,
        options: &RequestOptions,
        _mount: &MountSnapshot,
    ) -> VfsResult<()> {
        options.check_cancelled()?;
        let full_path = self.resolve(dir.path())?;
        if full_path.is_file() {
            return Err(VfsError::already_exists(dir.path()));
        }
        fs::create_dir_all(&full_path).await?;
        Ok(())
    }

    async fn exists(
        &self,
        file: &FileMetadata,
        options: &RequestOptions,
        _mount: &MountSnapshot,
    ) -> VfsResult<bool> {
        options.check_cancelled()?;
        match self.resolve(file.path()) {
            Ok(full_path) => Ok(fs::try_exists(&full_path).await?),
            Err(VfsError::PathEscapesRoot(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn fileinfo(
        &self,
        file: &FileMetadata,
        options: &RequestOptions,
        mount: &MountSnapshot,
    ) -> VfsResult<FileMetadata> {
        options.check_cancelled()?;
        let full_path = self.resolve(file.path())?;
        let meta = fs::metadata(&full_path)
            .await
            .map_err(|_| VfsError::not_found(file.path()))?;
        Ok(Self::metadata(mount, &self.relative_of(&full_path), &meta))
    }

    async fn url(
        &self,
        file: &FileMetadata,
        options: &RequestOptions,
        _mount: &MountSnapshot,
    ) -> VfsResult<String> {
        options.check_cancelled()?;
        let full_path = self.resolve(file.path())?;
        Ok(format!("file://{}", full_path.display()))
    }

    async fn trash(
        &self,
        file: &FileMetadata,
        options: &RequestOptions,
        _mount: &MountSnapshot,
    ) -> VfsResult<()> {
        options.check_cancelled()?;
        let src = self.resolve(file.path())?;
        if !src.exists() {
            return Err(VfsError::not_found(file.path()));
        }
        let dst = self.trash_path(file.path())?;
        if dst.exists() {
            Self::remove_any(&dst).await?;
        }
        Self::ensure_parent(&dst).await?;
        fs::rename(&src, &dst).await?;
        Ok(())
    }

    async fn untrash(
        &self,
        file: &FileMetadata,
        options: &RequestOptions,
        _mount: &MountSnapshot,
    ) -> VfsResult<()> {
        options.check_cancelled()?;
        let src = self.trash_path(file.path())?;
        if !src.exists() {
            return Err(VfsError::not_found(file.path()));
        }
        let dst = self.resolve(file.path())?;
        if dst.exists() {
            return Err(VfsError::already_exists(file.path()));
        }
        Self::ensure_parent(&dst).await?;
        fs::rename(&src, &dst).await?;
        Ok(())
    }

    async fn empty_trash(&self, options: &RequestOptions, _mount: &MountSnapshot) -> VfsResult<()> {
        options.check_cancelled()?;
        let trash = self.trash_root();
        if trash.exists() {
            fs::remove_dir_all(&trash).await?;
        }
        Ok(())
    }
}
