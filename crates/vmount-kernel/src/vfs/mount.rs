//! Mountpoint records.
//!
//! A [`Mountpoint`] binds a name, a root prefix and an ownership pattern to
//! a transport. Its static fields live in a [`MountSnapshot`] built once at
//! construction; the snapshot is what transports see as context. Runtime
//! state (mounted, enabled) lives behind the [`MountLifecycle`] hooks.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;
use vmount_types::MimeTable;

use super::ops::Transport;
use super::{VfsError, VfsResult};

// ============================================================================
// MountParams
// ============================================================================

/// Everything needed to build a mountpoint.
///
/// Produced by static configuration or by a runtime `add` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountParams {
    /// Unique key, also the path scheme (`home` for `home://...`).
    pub name: String,
    /// Transport kind (`memory`, `local`, or any registered factory).
    pub transport: String,
    /// Opaque, transport-specific options (root dir, host, credentials).
    pub options: Map<String, Value>,
    pub read_only: bool,
    /// UI-facing only; passed through, not enforced.
    pub visible: bool,
    /// Overrides the transport kind's default.
    pub internal: Option<bool>,
    /// Overrides the default `^<name>://` ownership pattern.
    pub pattern: Option<String>,
    /// Non-standard mountpoint (trash bin and friends); hidden from listings by default.
    pub special: bool,
    /// Added at runtime rather than at boot. Set by the registry.
    pub dynamic: bool,
}

impl Default for MountParams {
    fn default() -> Self {
        Self {
            name: String::new(),
            transport: String::new(),
            options: Map::new(),
            read_only: false,
            visible: true,
            internal: None,
            pattern: None,
            special: false,
            dynamic: false,
        }
    }
}

impl MountParams {
    pub fn new(name: impl Into<String>, transport: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: transport.into(),
            ..Default::default()
        }
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn internal(mut self, internal: bool) -> Self {
        self.internal = Some(internal);
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn special(mut self, special: bool) -> Self {
        self.special = special;
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

/// Default ownership pattern for a mount name: `^<escaped-name>://`.
pub fn default_pattern(name: &str) -> String {
    format!("^{}://", regex::escape(name))
}

// ============================================================================
// MountSnapshot
// ============================================================================

/// Read-only view of a mountpoint's static fields.
///
/// Handed to every transport call as context. Transports get a shared
/// reference, so they can read but never alter it.
#[derive(Debug, Clone, PartialEq)]
pub struct MountSnapshot {
    pub name: String,
    /// Canonical `name://` prefix.
    pub root: String,
    /// Ownership pattern source.
    pub pattern: String,
    /// Transport kind.
    pub transport: String,
    pub read_only: bool,
    pub visible: bool,
    pub internal: bool,
    pub dynamic: bool,
    pub special: bool,
    pub options: Arc<Map<String, Value>>,
    /// Content types for metadata the transport builds.
    pub mime: Arc<MimeTable>,
}

impl MountSnapshot {
    /// Strip this mount's root from a fully qualified path.
    ///
    /// `home:///a/b` → `/a/b`. Paths from another scheme come back unchanged.
    pub fn relative<'a>(&self, path: &'a str) -> &'a str {
        path.strip_prefix(self.root.as_str()).unwrap_or(path)
    }

    /// Qualify a relative path with this mount's root.
    pub fn qualify(&self, relative: &str) -> String {
        if relative.starts_with('/') {
            format!("{}{}", self.root, relative)
        } else {
            format!("{}/{}", self.root, relative)
        }
    }

    /// String option, if present.
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Mount/unmount hooks plus liveness and policy probes.
#[async_trait]
pub trait MountLifecycle: Send + Sync {
    /// Called once before the mountpoint joins the registry.
    async fn mount(&self) -> VfsResult<()>;

    /// Called by `remove`; the registry entry is deleted only if this succeeds.
    async fn unmount(&self) -> VfsResult<()>;

    /// Liveness probe.
    fn mounted(&self) -> bool;

    /// Policy-level kill switch, independent of mount/unmount.
    fn enabled(&self) -> bool {
        true
    }
}

/// Lifecycle used when none is supplied: a pair of flags.
#[derive(Debug)]
pub struct DefaultLifecycle {
    name: String,
    mounted: AtomicBool,
    enabled: AtomicBool,
}

impl DefaultLifecycle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mounted: AtomicBool::new(false),
            enabled: AtomicBool::new(true),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }
}

#[async_trait]
impl MountLifecycle for DefaultLifecycle {
    async fn mount(&self) -> VfsResult<()> {
        self.mounted.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn unmount(&self) -> VfsResult<()> {
        self.mounted.store(false, Ordering::SeqCst);
        info!(mount = %self.name, "Unmounted");
        Ok(())
    }

    fn mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Mountpoint
// ============================================================================

/// A registered (or registrable) mountpoint.
///
/// Static fields never change after construction; replacing policy means
/// removing and re-adding the record.
pub struct Mountpoint {
    snapshot: MountSnapshot,
    pattern: Regex,
    transport: Option<Arc<dyn Transport>>,
    lifecycle: Arc<dyn MountLifecycle>,
}

impl fmt::Debug for Mountpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mountpoint")
            .field("snapshot", &self.snapshot)
            .field("bound", &self.transport.is_some())
            .field("mounted", &self.lifecycle.mounted())
            .finish()
    }
}

impl Mountpoint {
    /// Build a record from params.
    ///
    /// `internal_default` applies when `params.internal` is unset (the
    /// registry passes the transport kind's default). `transport` is the
    /// bound backend; `None` builds an unbound record that the dispatcher
    /// will reject.
    pub fn new(
        params: MountParams,
        internal_default: bool,
        transport: Option<Arc<dyn Transport>>,
        lifecycle: Arc<dyn MountLifecycle>,
    ) -> VfsResult<Self> {
        if params.name.is_empty() || params.name.contains("://") || params.name.contains('/') {
            return Err(VfsError::InvalidName(params.name));
        }

        let pattern_src = params
            .pattern
            .clone()
            .unwrap_or_else(|| default_pattern(&params.name));
        let pattern = Regex::new(&pattern_src).map_err(|e| VfsError::InvalidPattern {
            pattern: pattern_src.clone(),
            reason: e.to_string(),
        })?;

        let snapshot = MountSnapshot {
            root: format!("{}://", params.name),
            name: params.name,
            pattern: pattern_src,
            transport: params.transport,
            read_only: params.read_only,
            visible: params.visible,
            internal: params.internal.unwrap_or(internal_default),
            dynamic: params.dynamic,
            special: params.special,
            options: Arc::new(params.options),
            mime: Arc::new(MimeTable::builtin()),
        };

        Ok(Self {
            snapshot,
            pattern,
            transport,
            lifecycle,
        })
    }

    /// Replace the content-type table handed to the transport.
    pub fn with_mime(mut self, mime: Arc<MimeTable>) -> Self {
        self.snapshot.mime = mime;
        self
    }

    pub fn name(&self) -> &str {
        &self.snapshot.name
    }

    pub fn root(&self) -> &str {
        &self.snapshot.root
    }

    pub fn transport_kind(&self) -> &str {
        &self.snapshot.transport
    }

    pub fn is_read_only(&self) -> bool {
        self.snapshot.read_only
    }

    pub fn is_visible(&self) -> bool {
        self.snapshot.visible
    }

    pub fn is_internal(&self) -> bool {
        self.snapshot.internal
    }

    pub fn is_dynamic(&self) -> bool {
        self.snapshot.dynamic
    }

    pub fn is_special(&self) -> bool {
        self.snapshot.special
    }

    /// Immutable view of the static fields.
    pub fn snapshot(&self) -> &MountSnapshot {
        &self.snapshot
    }

    /// Bound backend, if any.
    pub fn transport(&self) -> Option<&Arc<dyn Transport>> {
        self.transport.as_ref()
    }

    pub fn lifecycle(&self) -> &Arc<dyn MountLifecycle> {
        &self.lifecycle
    }

    /// True if this mount's ownership pattern matches `path`.
    pub fn owns(&self, path: &str) -> bool {
        self.pattern.is_match(path)
    }

    pub async fn mount(&self) -> VfsResult<()> {
        self.lifecycle.mount().await
    }

    pub async fn unmount(&self) -> VfsResult<()> {
        self.lifecycle.unmount().await
    }

    pub fn mounted(&self) -> bool {
        self.lifecycle.mounted()
    }

    pub fn enabled(&self) -> bool {
        self.lifecycle.enabled()
    }

    /// Summary row for listings.
    pub fn info(&self) -> MountInfo {
        MountInfo {
            name: self.snapshot.name.clone(),
            root: self.snapshot.root.clone(),
            transport: self.snapshot.transport.clone(),
            read_only: self.snapshot.read_only,
            visible: self.snapshot.visible,
            internal: self.snapshot.internal,
            dynamic: self.snapshot.dynamic,
            special: self.snapshot.special,
            mounted: self.mounted(),
            enabled: self.enabled(),
        }
    }
}

/// Information about a mount point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountInfo {
    pub name: String,
    pub root: String,
    pub transport: String,
    pub read_only: bool,
    pub visible: bool,
    pub internal: bool,
    pub dynamic: bool,
    pub special: bool,
    pub mounted: bool,
    pub enabled: bool,
}
