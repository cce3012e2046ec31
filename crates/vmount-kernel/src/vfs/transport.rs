//! Transport kinds.
//!
//! A [`TransportFactory`] turns a mountpoint's options into a bound
//! [`Transport`]. Factories are looked up by kind name exactly once, when
//! the mountpoint record is created; after that the record carries the
//! bound `Arc<dyn Transport>` and dispatch never touches this table.
//!
//! Built-in kinds:
//!
//! | Kind     | Internal | Options                           |
//! |----------|----------|-----------------------------------|
//! | `memory` | yes      | none                              |
//! | `local`  | yes      | `root` (required), `create`       |
//!
//! Remote, cloud and mirror backends register their own kinds, usually as
//! a [`TransportKind`] with `requires(...)` naming the credential fields
//! that must be present before a mount can be created.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::backends::{LocalBackend, MemoryBackend};
use super::ops::Transport;
use super::{VfsError, VfsResult};

/// Builds transports of one kind.
pub trait TransportFactory: Send + Sync {
    /// Kind name referenced by `MountParams::transport`.
    fn kind(&self) -> &str;

    /// Default `internal` flag for mounts of this kind.
    fn internal(&self) -> bool;

    /// Option fields that must be present (and non-empty) before a mount of
    /// this kind may be created.
    fn required_options(&self) -> &[String] {
        &[]
    }

    /// Validate options and build the backend.
    fn build(&self, options: &Map<String, Value>) -> VfsResult<Arc<dyn Transport>>;
}

/// Deserialize a mount's options into a backend-specific struct.
pub fn parse_options<T: DeserializeOwned>(kind: &str, options: &Map<String, Value>) -> VfsResult<T> {
    serde_json::from_value(Value::Object(options.clone()))
        .map_err(|e| VfsError::invalid_options(kind, e))
}

// ============================================================================
// Built-in kinds
// ============================================================================

/// `memory`: a fresh in-memory backend per mount.
#[derive(Debug, Default)]
pub struct MemoryFactory;

impl TransportFactory for MemoryFactory {
    fn kind(&self) -> &str {
        "memory"
    }

    fn internal(&self) -> bool {
        true
    }

    fn build(&self, _options: &Map<String, Value>) -> VfsResult<Arc<dyn Transport>> {
        Ok(Arc::new(MemoryBackend::new()))
    }
}

/// Options accepted by the `local` kind.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalOptions {
    /// Directory the mount is rooted at.
    pub root: PathBuf,
    /// Create `root` at mount time if it doesn't exist.
    #[serde(default)]
    pub create: bool,
}

/// `local`: a directory on the host filesystem.
#[derive(Debug, Default)]
pub struct LocalFactory;

impl TransportFactory for LocalFactory {
    fn kind(&self) -> &str {
        "local"
    }

    fn internal(&self) -> bool {
        true
    }

    fn required_options(&self) -> &[String] {
        static REQUIRED: OnceLock<Vec<String>> = OnceLock::new();
        REQUIRED.get_or_init(|| vec!["root".to_string()])
    }

    fn build(&self, options: &Map<String, Value>) -> VfsResult<Arc<dyn Transport>> {
        let opts: LocalOptions = parse_options(self.kind(), options)?;
        if opts.create {
            std::fs::create_dir_all(&opts.root)?;
        }
        if !opts.root.is_dir() {
            return Err(VfsError::invalid_options(
                self.kind(),
                format!("root {} is not a directory", opts.root.display()),
            ));
        }
        Ok(Arc::new(LocalBackend::new(opts.root)))
    }
}

// ============================================================================
// TransportKind: closure-backed factory
// ============================================================================

type BuildFn = dyn Fn(&Map<String, Value>) -> VfsResult<Arc<dyn Transport>> + Send + Sync;

/// A transport kind defined by a build closure.
///
/// ```ignore
/// let kind = TransportKind::new("dropbox", false, |opts| {
///     let creds: DropboxOptions = parse_options("dropbox", opts)?;
///     Ok(Arc::new(DropboxTransport::connect(creds)))
/// })
/// .requires(["access_token"]);
/// ```
pub struct TransportKind {
    kind: String,
    internal: bool,
    required: Vec<String>,
    build: Box<BuildFn>,
}

impl TransportKind {
    pub fn new<F>(kind: impl Into<String>, internal: bool, build: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> VfsResult<Arc<dyn Transport>> + Send + Sync + 'static,
    {
        Self {
            kind: kind.into(),
            internal,
            required: Vec::new(),
            build: Box::new(build),
        }
    }

    /// A kind whose every mount shares one backend instance.
    pub fn shared(kind: impl Into<String>, internal: bool, transport: Arc<dyn Transport>) -> Self {
        Self::new(kind, internal, move |_| Ok(Arc::clone(&transport)))
    }

    /// Option fields that must be present before a mount may be created.
    pub fn requires<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required.extend(fields.into_iter().map(Into::into));
        self
    }
}

impl fmt::Debug for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportKind")
            .field("kind", &self.kind)
            .field("internal", &self.internal)
            .field("required", &self.required)
            .finish_non_exhaustive()
    }
}

impl TransportFactory for TransportKind {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn internal(&self) -> bool {
        self.internal
    }

    fn required_options(&self) -> &[String] {
        &self.required
    }

    fn build(&self, options: &Map<String, Value>) -> VfsResult<Arc<dyn Transport>> {
        (self.build)(options)
    }
}

// ============================================================================
// TransportTable
// ============================================================================

/// Transport factories keyed by kind.
#[derive(Clone, Default)]
pub struct TransportTable {
    factories: HashMap<String, Arc<dyn TransportFactory>>,
}

impl fmt::Debug for TransportTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportTable")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl TransportTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the `memory` and `local` kinds.
    pub fn with_builtins() -> Self {
        let mut table = Self::new();
        table.register(MemoryFactory);
        table.register(LocalFactory);
        table
    }

    /// Register a factory, replacing any previous one of the same kind.
    pub fn register(&mut self, factory: impl TransportFactory + 'static) {
        self.register_arc(Arc::new(factory));
    }

    pub fn register_arc(&mut self, factory: Arc<dyn TransportFactory>) {
        self.factories.insert(factory.kind().to_string(), factory);
    }

    /// Remove a kind. Mounts already bound to it keep working.
    pub fn unregister(&mut self, kind: &str) -> bool {
        self.factories.remove(kind).is_some()
    }

    pub fn get(&self, kind: &str) -> Option<&Arc<dyn TransportFactory>> {
        self.factories.get(kind)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<_> = self.factories.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Validate `options` against `kind` and build the backend.
    ///
    /// Returns the bound transport and the kind's default `internal` flag.
    pub fn bind(
        &self,
        kind: &str,
        options: &Map<String, Value>,
    ) -> VfsResult<(Arc<dyn Transport>, bool)> {
        let factory = self
            .get(kind)
            .ok_or_else(|| VfsError::UnknownTransport(kind.to_string()))?;

        for field in factory.required_options() {
            let present = match options.get(field) {
                None | Some(Value::Null) => false,
                Some(Value::String(s)) => !s.is_empty(),
                Some(_) => true,
            };
            if !present {
                return Err(VfsError::MissingCredentials {
                    transport: kind.to_string(),
                    field: field.clone(),
                });
            }
        }

        let transport = factory.build(options)?;
        Ok((transport, factory.internal()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cloud_kind() -> TransportKind {
        TransportKind::new("cloud", false, |_| Ok(Arc::new(MemoryBackend::new()) as Arc<dyn Transport>))
            .requires(["client_id", "token"])
    }

    #[test]
    fn test_builtins() {
        let table = TransportTable::with_builtins();
        assert_eq!(table.kinds(), vec!["local", "memory"]);
        let (_, internal) = table.bind("memory", &Map::new()).unwrap();
        assert!(internal);
    }

    #[test]
    fn test_unknown_kind() {
        let table = TransportTable::with_builtins();
        let err = table.bind("ftp", &Map::new()).err().unwrap();
        assert!(matches!(err, VfsError::UnknownTransport(kind) if kind == "ftp"));
    }

    #[test]
    fn test_missing_credentials() {
        let mut table = TransportTable::new();
        table.register(cloud_kind());

        let mut options = Map::new();
        options.insert("client_id".into(), Value::from("abc"));
        options.insert("token".into(), Value::from(""));
        let err = table.bind("cloud", &options).err().unwrap();
        assert!(matches!(
            err,
            VfsError::MissingCredentials { ref field, .. } if field == "token"
        ));

        options.insert("token".into(), Value::from("t0k"));
        let (_, internal) = table.bind("cloud", &options).unwrap();
        assert!(!internal);
    }

    #[test]
    fn test_local_requires_root() {
        let table = TransportTable::with_builtins();
        let err = table.bind("local", &Map::new()).err().unwrap();
        assert!(matches!(
            err,
            VfsError::MissingCredentials { ref transport, ref field } if transport == "local" && field == "root"
        ));
        assert!(err.is_registration());

        let mut options = Map::new();
        options.insert("root".into(), Value::from(""));
        let err = table.bind("local", &options).err().unwrap();
        assert!(matches!(err, VfsError::MissingCredentials { .. }));

        let mut options = Map::new();
        options.insert("root".into(), Value::from("/definitely/not/here/vmount"));
        let err = table.bind("local", &options).err().unwrap();
        assert!(matches!(err, VfsError::InvalidOptions { .. }));
    }

    #[test]
    fn test_local_binds_tempdir() {
        let dir = tempfile::tempdir().unwrap();
        let table = TransportTable::with_builtins();
        let mut options = Map::new();
        options.insert("root".into(), Value::from(dir.path().to_string_lossy().to_string()));
        assert!(table.bind("local", &options).is_ok());

        options.insert("bogus".into(), Value::from(1));
        assert!(matches!(
            table.bind("local", &options).err().unwrap(),
            VfsError::InvalidOptions { .. }
        ));
    }

    #[test]
    fn test_shared_kind_reuses_instance() {
        let backend: Arc<dyn Transport> = Arc::new(MemoryBackend::new());
        let kind = TransportKind::shared("fixed", true, backend.clone());
        let a = kind.build(&Map::new()).unwrap();
        let b = kind.build(&Map::new()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &backend));
    }

    #[test]
    fn test_unregister() {
        let mut table = TransportTable::with_builtins();
        assert!(table.unregister("local"));
        assert!(!table.unregister("local"));
        assert!(!table.contains("local"));
    }
}
