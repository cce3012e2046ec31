//! In-memory filesystem backend.
//!
//! Used for scratch mounts and testing. All data is ephemeral.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;

use vmount_types::{FileKind, FileMetadata, MetadataFields, split_scheme};

use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::mount::MountSnapshot;
use crate::vfs::ops::{RequestOptions, Transport};

/// Entry in the memory filesystem.
#[derive(Debug, Clone)]
enum Entry {
    File { data: Vec<u8> },
    Directory,
}

impl Entry {
    fn kind(&self) -> FileKind {
        match self {
            Entry::File { .. } => FileKind::File,
            Entry::Directory => FileKind::Directory,
        }
    }

    fn size(&self) -> u64 {
        match self {
            Entry::File { data } => data.len() as u64,
            Entry::Directory => 0,
        }
    }
}

/// In-memory filesystem backend.
///
/// Thread-safe via internal `RwLock`. All data is lost when dropped.
#[derive(Debug)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<PathBuf, Entry>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create a new empty in-memory filesystem.
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        // Root directory always exists
        entries.insert(PathBuf::new(), Entry::Directory);
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Storage key for a qualified path: scheme dropped, `.`/`..` resolved,
    /// no leading `/`.
    fn key(path: &str) -> PathBuf {
        let rest = split_scheme(path).map(|(_, rest)| rest).unwrap_or(path);
        let mut result = PathBuf::new();
        for component in Path::new(rest).components() {
            match component {
                Component::ParentDir => {
                    result.pop();
                }
                Component::Normal(s) => result.push(s),
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            }
        }
        result
    }

    fn key_str(key: &Path) -> String {
        format!("/{}", key.display())
    }

    fn metadata(mount: &MountSnapshot, key: &Path, entry: &Entry) -> FileMetadata {
        FileMetadata::build(
            MetadataFields {
                path: mount.qualify(&Self::key_str(key)),
                kind: Some(entry.kind()),
                size: Some(entry.size()),
                ..Default::default()
            },
            None,
            &mount.mime,
        )
    }

    fn read_lock(
        &self,
    ) -> VfsResult<std::sync::RwLockReadGuard<'_, HashMap<PathBuf, Entry>>> {
        self.entries
            .read()
            .map_err(|_| VfsError::other("lock poisoned"))
    }

    fn write_lock(
        &self,
    ) -> VfsResult<std::sync::RwLockWriteGuard<'_, HashMap<PathBuf, Entry>>> {
        self.entries
            .write()
            .map_err(|_| VfsError::other("lock poisoned"))
    }

    /// Create every missing ancestor of `key` as a directory.
    fn ensure_parents(entries: &mut HashMap<PathBuf, Entry>, key: &Path) -> VfsResult<()> {
        let mut current = PathBuf::new();
        for component in key.parent().into_iter().flat_map(|p| p.components()) {
            if let Component::Normal(s) = component {
                current.push(s);
                match entries.get(&current) {
                    Some(Entry::Directory) => {}
                    Some(Entry::File { .. }) => {
                        return Err(VfsError::not_a_directory(Self::key_str(&current)));
                    }
                    None => {
                        entries.insert(current.clone(), Entry::Directory);
                    }
                }
            }
        }
        Ok(())
    }

    /// Keys at or below `key`.
    fn subtree(entries: &HashMap<PathBuf, Entry>, key: &Path) -> Vec<PathBuf> {
        entries
            .keys()
            .filter(|k| k.starts_with(key))
            .cloned()
            .collect()
    }

    /// Move `child` from under `from` to under `to`.
    fn rebase(child: &Path, from: &Path, to: &Path) -> PathBuf {
        match child.strip_prefix(from) {
            Ok(rest) if !rest.as_os_str().is_empty() => to.join(rest),
            _ => to.to_path_buf(),
        }
    }

    /// Reject a destination that lives on another mount.
    fn check_same_device(from: &FileMetadata, to: &FileMetadata, mount: &MountSnapshot) -> VfsResult<()> {
        match to.mount_name() {
            Some(name) if name == mount.name || Some(name) == from.mount_name() => Ok(()),
            None => Ok(()),
            Some(_) => Err(VfsError::CrossDeviceLink),
        }
    }
}

#[async_trait]
impl Transport for MemoryBackend {
    async fn scandir(
        &self,
        dir: &FileMetadata,
        options: &RequestOptions,
        mount: &MountSnapshot,
    ) -> VfsResult<Vec<FileMetadata>> {
        options.check_cancelled()?;
        let key = Self::key(dir.path());
        let entries = self.read_lock()?;

        match entries.get(&key) {
            Some(Entry::Directory) => {}
            Some(_) => return Err(VfsError::not_a_directory(dir.path())),
            None => return Err(VfsError::not_found(dir.path())),
        }

        let mut result: Vec<FileMetadata> = entries
            .iter()
            .filter(|(path, _)| path.parent() == Some(key.as_path()) && **path != key)
            .map(|(path, entry)| Self::metadata(mount, path, entry))
            .collect();

        // Sort for consistent ordering
        result.sort_by(|a, b| a.filename().cmp(b.filename()));
        Ok(result)
    }

    async fn read(
        &self,
        file: &FileMetadata,
        options: &RequestOptions,
        _mount: &MountSnapshot,
    ) -> VfsResult<Vec<u8>> {
        options.check_cancelled()?;
        let entries = self.read_lock()?;
        match entries.get(&Self::key(file.path())) {
            Some(Entry::File { data }) => Ok(data.clone()),
            Some(Entry::Directory) => Err(VfsError::is_a_directory(file.path())),
            None => Err(VfsError::not_found(file.path())),
        }
    }

    async fn write(
        &self,
        file: &FileMetadata,
        data: &[u8],
        options: &RequestOptions,
        _mount: &MountSnapshot,
    ) -> VfsResult<u64> {
        options.check_cancelled()?;
        let key = Self::key(file.path());
        if key.as_os_str().is_empty() {
            return Err(VfsError::is_a_directory(file.path()));
        }

        let mut entries = self.write_lock()?;
        if let Some(Entry::Directory) = entries.get(&key) {
            return Err(VfsError::is_a_directory(file.path()));
        }
        Self::ensure_parents(&mut entries, &key)?;
        entries.insert(
            key,
            Entry::File {
                data: data.to_vec(),
            },
        );
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
        let from_key = Self::key(from.path());
        let to_key = Self::key(to.path());
        if to_key.starts_with(&from_key) && to_key != from_key {
            return Err(VfsError::invalid_path(format!(
                "cannot copy {} into itself",
                from.path()
            )));
        }

        let mut entries = self.write_lock()?;
        if !entries.contains_key(&from_key) {
            return Err(VfsError::not_found(from.path()));
        }
        Self::ensure_parents(&mut entries, &to_key)?;

        for child in Self::subtree(&entries, &from_key) {
            if let Some(entry) = entries.get(&child).cloned() {
                entries.insert(Self::rebase(&child, &from_key, &to_key), entry);
            }
        }
        Ok(())
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
        let from_key = Self::key(from.path());
        let to_key = Self::key(to.path());
        if from_key.as_os_str().is_empty() {
            return Err(VfsError::permission_denied("cannot move root"));
        }
        if to_key.starts_with(&from_key) && to_key != from_key {
            return Err(VfsError::invalid_path(format!(
                "cannot move {} into itself",
                from.path()
            )));
        }

        let mut entries = self.write_lock()?;
        if !entries.contains_key(&from_key) {
            return Err(VfsError::not_found(from.path()));
        }
        Self::ensure_parents(&mut entries, &to_key)?;

        // Directories carry their children along
        for child in Self::subtree(&entries, &from_key) {
            if let Some(entry) = entries.remove(&child) {
                entries.insert(Self::rebase(&child, &from_key, &to_key), entry);
            }
        }
        Ok(())
    }

    async fn unlink(
        &self,
        file: &FileMetadata,
        options: &RequestOptions,
        _mount: &MountSnapshot,
    ) -> VfsResult<()> {
        options.check_cancelled()?;
        let key = Self::key(file.path());
        if key.as_os_str().is_empty() {
            return Err(VfsError::permission_denied("cannot remove root"));
        }

        let mut entries = self.write_lock()?;
        if !entries.contains_key(&key) {
            return Err(VfsError::not_found(file.path()));
        }
        for child in Self::subtree(&entries, &key) {
            entries.remove(&child);
        }
        Ok(())
    }

    async fn mkdir(
        &self,
        dir: &FileMetadata,
        options: &RequestOptions,
        _mount: &MountSnapshot,
    ) -> VfsResult<()> {
        options.check_cancelled()?;
        let key = Self::key(dir.path());
        let mut entries = self.write_lock()?;

        if let Some(existing) = entries.get(&key) {
            return match existing {
                Entry::Directory => Ok(()),
                Entry::File { .. } => Err(VfsError::already_exists(dir.path())),
            };
        }
        Self::ensure_parents(&mut entries, &key)?;
        entries.insert(key, Entry::Directory);
        Ok(())
    }

    async fn exists(
        &self,
        file: &FileMetadata,
        options: &RequestOptions,
        _mount: &MountSnapshot,
    ) -> VfsResult<bool> {
        options.check_cancelled()?;
        Ok(self.read_lock()?.contains_key(&Self::key(file.path())))
    }

    async fn fileinfo(
        &self,
        file: &FileMetadata,
        options: &RequestOptions,
        mount: &MountSnapshot,
    ) -> VfsResult<FileMetadata> {
        options.check_cancelled()?;
        let key = Self::key(file.path());
        let entries = self.read_lock()?;
        entries
            .get(&key)
            .map(|entry| Self::metadata(mount, &key, entry))
            .ok_or_else(|| VfsError::not_found(file.path()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::mount::{DefaultLifecycle, MountParams, Mountpoint};
    use std::sync::Arc;

    fn snapshot(name: &str) -> MountSnapshot {
        let lifecycle = Arc::new(DefaultLifecycle::new(name));
        Mountpoint::new(MountParams::new(name, "memory"), true, None, lifecycle)
            .unwrap()
            .snapshot()
            .clone()
    }

    fn meta(path: &str) -> FileMetadata {
        FileMetadata::new(path)
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let fs = MemoryBackend::new();
        let mount = snapshot("mem");
        let opts = RequestOptions::new();

        let n = fs.write(&meta("mem:///a/b.txt"), b"hello", &opts, &mount).await.unwrap();
        assert_eq!(n, 5);
        let data = fs.read(&meta("mem:///a/b.txt"), &opts, &mount).await.unwrap();
        assert_eq!(data, b"hello");

        // Parent was created implicitly
        assert!(fs.exists(&meta("mem:///a"), &opts, &mount).await.unwrap());
    }

    #[tokio::test]
    async fn test_scandir() {
        let fs = MemoryBackend::new();
        let mount = snapshot("mem");
        let opts = RequestOptions::new();

        fs.write(&meta("mem:///b.txt"), b"b", &opts, &mount).await.unwrap();
        fs.write(&meta("mem:///a.pdf"), b"aa", &opts, &mount).await.unwrap();
        fs.mkdir(&meta("mem:///sub"), &opts, &mount).await.unwrap();
        fs.write(&meta("mem:///sub/deep.txt"), b"x", &opts, &mount).await.unwrap();

        let entries = fs.scandir(&meta("mem:///"), &opts, &mount).await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.filename()).collect();
        assert_eq!(names, vec!["a.pdf", "b.txt", "sub"]);

        assert_eq!(entries[0].path(), "mem:///a.pdf");
        assert_eq!(entries[0].size(), 2);
        assert_eq!(entries[0].content_type(), Some("application/pdf"));
        assert!(entries[2].is_dir());
        assert_eq!(entries[2].content_type(), None);
    }

    #[tokio::test]
    async fn test_scandir_errors() {
        let fs = MemoryBackend::new();
        let mount = snapshot("mem");
        let opts = RequestOptions::new();
        fs.write(&meta("mem:///f"), b"", &opts, &mount).await.unwrap();

        assert!(matches!(
            fs.scandir(&meta("mem:///nope"), &opts, &mount).await,
            Err(VfsError::NotFound(_))
        ));
        assert!(matches!(
            fs.scandir(&meta("mem:///f"), &opts, &mount).await,
            Err(VfsError::NotADirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_copy_and_move_tree() {
        let fs = MemoryBackend::new();
        let mount = snapshot("mem");
        let opts = RequestOptions::new();
        fs.write(&meta("mem:///src/one.txt"), b"1", &opts, &mount).await.unwrap();
        fs.write(&meta("mem:///src/two/three.txt"), b"3", &opts, &mount).await.unwrap();

        fs.copy(&meta("mem:///src"), &meta("mem:///dst"), &opts, &mount).await.unwrap();
        assert_eq!(fs.read(&meta("mem:///dst/two/three.txt"), &opts, &mount).await.unwrap(), b"3");
        assert!(fs.exists(&meta("mem:///src/one.txt"), &opts, &mount).await.unwrap());

        fs.rename(&meta("mem:///src"), &meta("mem:///moved"), &opts, &mount).await.unwrap();
        assert!(!fs.exists(&meta("mem:///src"), &opts, &mount).await.unwrap());
        assert_eq!(fs.read(&meta("mem:///moved/one.txt"), &opts, &mount).await.unwrap(), b"1");
    }

    #[tokio::test]
    async fn test_cross_mount_copy_fails() {
        let fs = MemoryBackend::new();
        let mount = snapshot("mem");
        let opts = RequestOptions::new();
        fs.write(&meta("mem:///a"), b"a", &opts, &mount).await.unwrap();

        let result = fs.copy(&meta("mem:///a"), &meta("other:///a"), &opts, &mount).await;
        assert!(matches!(result, Err(VfsError::CrossDeviceLink)));
    }

    #[tokio::test]
    async fn test_unlink_tree_and_root() {
        let fs = MemoryBackend::new();
        let mount = snapshot("mem");
        let opts = RequestOptions::new();
        fs.write(&meta("mem:///d/x"), b"x", &opts, &mount).await.unwrap();

        fs.unlink(&meta("mem:///d"), &opts, &mount).await.unwrap();
        assert!(!fs.exists(&meta("mem:///d/x"), &opts, &mount).await.unwrap());
        assert!(matches!(
            fs.unlink(&meta("mem:///"), &opts, &mount).await,
            Err(VfsError::PermissionDenied(_))
        ));
        assert!(matches!(
            fs.unlink(&meta("mem:///d"), &opts, &mount).await,
            Err(VfsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_fileinfo() {
        let fs = MemoryBackend::new();
        let mount = snapshot("mem");
        let opts = RequestOptions::new();
        fs.write(&meta("mem:///report.pdf"), b"%PDF", &opts, &mount).await.unwrap();

        let info = fs.fileinfo(&meta("mem:///report.pdf"), &opts, &mount).await.unwrap();
        assert_eq!(info.filename(), "report.pdf");
        assert_eq!(info.size(), 4);
        assert_eq!(info.content_type(), Some("application/pdf"));
    }

    #[tokio::test]
    async fn test_metadata_uses_mount_mime_table() {
        let fs = MemoryBackend::new();
        let lifecycle = Arc::new(DefaultLifecycle::new("mem"));
        let table = vmount_types::MimeTable::with_overrides([("foo", "application/x-foo")]);
        let mount = Mountpoint::new(MountParams::new("mem", "memory"), true, None, lifecycle)
            .unwrap()
            .with_mime(Arc::new(table))
            .snapshot()
            .clone();
        let opts = RequestOptions::new();
        fs.write(&meta("mem:///a.foo"), b"foo", &opts, &mount).await.unwrap();

        let info = fs.fileinfo(&meta("mem:///a.foo"), &opts, &mount).await.unwrap();
        assert_eq!(info.content_type(), Some("application/x-foo"));
        let entries = fs.scandir(&meta("mem:///"), &opts, &mount).await.unwrap();
        assert_eq!(entries[0].content_type(), Some("application/x-foo"));
    }

    #[tokio::test]
    async fn test_unsupported_ops_are_unavailable() {
        let fs = MemoryBackend::new();
        let mount = snapshot("mem");
        let opts = RequestOptions::new();
        assert!(matches!(
            fs.url(&meta("mem:///a"), &opts, &mount).await,
            Err(VfsError::Unavailable(_))
        ));
        assert!(matches!(
            fs.empty_trash(&opts, &mount).await,
            Err(VfsError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_request() {
        let fs = MemoryBackend::new();
        let mount = snapshot("mem");
        let token = tokio_util::sync::CancellationToken::new();
        token.cancel();
        let opts = RequestOptions::new().with_cancel(token);
        assert!(matches!(
            fs.read(&meta("mem:///a"), &opts, &mount).await,
            Err(VfsError::Cancelled)
        ));
    }
}
