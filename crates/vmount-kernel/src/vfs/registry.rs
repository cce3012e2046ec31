//! Mountpoint registry.
//!
//! The single source of truth for which mountpoints exist and which one
//! owns a path. Registration is two-phase: before [`MountRegistry::init`]
//! completes, [`MountRegistry::queue_or_register`] only queues; `init`
//! flushes the queue in arrival order, materializes the static
//! configuration, and moves the registry to [`RegistryState::Ready`].
//!
//! Resolution scans mountpoints in registration order and returns the
//! first whose ownership pattern matches. Overlapping patterns are settled
//! by insertion order, not specificity.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{debug, info, warn};

use vmount_types::{FileMetadata, MetadataInput, MimeTable};

use super::mount::{DefaultLifecycle, MountInfo, MountLifecycle, MountParams, Mountpoint};
use super::transport::{TransportFactory, TransportTable};
use super::{VfsError, VfsResult};
use crate::config::VfsConfig;
use crate::flows::{MountFlow, MountSource, SharedMountFlowBus, shared_mount_flow_bus};

/// Default capacity of the registry's mount event bus.
pub const DEFAULT_FLOW_CAPACITY: usize = 64;

/// Initialization phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RegistryState {
    Uninitialized,
    Initializing,
    Ready,
}

/// Filter for [`MountRegistry::list_mountpoints`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// Only mounts with `visible = true`.
    pub visible_only: bool,
    /// Include `special` mounts (trash bin and friends).
    pub include_special: bool,
}

impl ListFilter {
    pub fn all() -> Self {
        Self {
            visible_only: false,
            include_special: true,
        }
    }

    pub fn visible() -> Self {
        Self {
            visible_only: true,
            include_special: false,
        }
    }
}

/// A registration waiting for `init`.
struct Pending {
    params: MountParams,
    lifecycle: Option<Arc<dyn MountLifecycle>>,
    emit: bool,
}

/// Holds a name in the registry's removal set until dropped.
struct Removal<'a> {
    removing: &'a Mutex<HashSet<String>>,
    name: &'a str,
}

impl Drop for Removal<'_> {
    fn drop(&mut self) {
        self.removing.lock().remove(self.name);
    }
}

/// The live set of mountpoints.
///
/// Share it behind an `Arc`; every method takes `&self`. Locks are never
/// held across a lifecycle hook.
pub struct MountRegistry {
    mounts: RwLock<IndexMap<String, Arc<Mountpoint>>>,
    /// Names whose unmount hook is running.
    removing: Mutex<HashSet<String>>,
    transports: RwLock<TransportTable>,
    queue: Mutex<Vec<Pending>>,
    state: RwLock<RegistryState>,
    init_lock: tokio::sync::Mutex<()>,
    config: VfsConfig,
    default_mount: RwLock<Option<String>>,
    mime: Arc<MimeTable>,
    flows: SharedMountFlowBus,
}

impl std::fmt::Debug for MountRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountRegistry")
            .field("state", &self.state())
            .field("mounts", &self.names())
            .field("transports", &*self.transports.read())
            .field("default_mount", &self.default_mount())
            .finish_non_exhaustive()
    }
}

impl Default for MountRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MountRegistry {
    /// Empty registry with the built-in transport kinds and no static config.
    pub fn new() -> Self {
        Self::with_config(VfsConfig::default())
    }

    /// Registry that will materialize `config` during `init`.
    pub fn with_config(config: VfsConfig) -> Self {
        let mime = Arc::new(config.mime_table());
        Self {
            mounts: RwLock::new(IndexMap::new()),
            removing: Mutex::new(HashSet::new()),
            transports: RwLock::new(TransportTable::with_builtins()),
            queue: Mutex::new(Vec::new()),
            state: RwLock::new(RegistryState::Uninitialized),
            init_lock: tokio::sync::Mutex::new(()),
            default_mount: RwLock::new(config.default_mount.clone()),
            config,
            mime,
            flows: shared_mount_flow_bus(DEFAULT_FLOW_CAPACITY),
        }
    }

    /// Replace the transport table.
    pub fn with_transports(self, transports: TransportTable) -> Self {
        *self.transports.write() = transports;
        self
    }

    /// Publish mount events on an existing bus.
    pub fn with_flows(mut self, flows: SharedMountFlowBus) -> Self {
        self.flows = flows;
        self
    }

    /// Register an additional transport kind.
    pub fn register_transport(&self, factory: impl TransportFactory + 'static) {
        let mut transports = self.transports.write();
        debug!(kind = factory.kind(), "Registered transport kind");
        transports.register(factory);
    }

    pub fn transport_kinds(&self) -> Vec<String> {
        self.transports.read().kinds()
    }

    pub fn state(&self) -> RegistryState {
        *self.state.read()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == RegistryState::Ready
    }

    pub fn flows(&self) -> &SharedMountFlowBus {
        &self.flows
    }

    pub fn config(&self) -> &VfsConfig {
        &self.config
    }

    /// Content-type table (built-ins plus configured overrides).
    pub fn mime(&self) -> &MimeTable {
        &self.mime
    }

    /// Build metadata for a path using this registry's content-type table.
    pub fn metadata(&self, input: impl Into<MetadataInput>, hint: Option<&str>) -> FileMetadata {
        FileMetadata::build(input, hint, &self.mime)
    }

    pub fn default_mount(&self) -> Option<String> {
        self.default_mount.read().clone()
    }

    pub fn set_default_mount(&self, name: Option<String>) {
        *self.default_mount.write() = name;
    }

    // ========================================================================
    // Record creation
    // ========================================================================

    /// Build a mountpoint record without registering it.
    ///
    /// Validates the transport kind, its required option fields and its
    /// options, and binds the backend. No lifecycle hook runs.
    pub fn create(
        &self,
        params: MountParams,
        lifecycle: Option<Arc<dyn MountLifecycle>>,
    ) -> VfsResult<Mountpoint> {
        let (transport, internal_default) = self
            .transports
            .read()
            .bind(&params.transport, &params.options)?;
        let lifecycle: Arc<dyn MountLifecycle> = match lifecycle {
            Some(lifecycle) => lifecycle,
            None => Arc::new(DefaultLifecycle::new(&params.name)),
        };
        Ok(Mountpoint::new(params, internal_default, Some(transport), lifecycle)?
            .with_mime(self.mime.clone()))
    }

    /// Mount and insert a record. Shared by every registration path.
    async fn register(
        &self,
        params: MountParams,
        lifecycle: Option<Arc<dyn MountLifecycle>>,
        source: MountSource,
        emit: bool,
    ) -> VfsResult<Arc<Mountpoint>> {
        if self.mounts.read().contains_key(&params.name) {
            return Err(VfsError::DuplicateMount(params.name));
        }

        let mountpoint = Arc::new(self.create(params, lifecycle)?);
        mountpoint.mount().await?;
        self.insert(Arc::clone(&mountpoint)).await?;

        info!(
            mount = %mountpoint.name(),
            transport = %mountpoint.transport_kind(),
            read_only = mountpoint.is_read_only(),
            internal = mountpoint.is_internal(),
            "Mounted"
        );
        if emit {
            self.flows.publish(MountFlow::Added {
                name: mountpoint.name().to_string(),
                source,
            });
        }
        Ok(mountpoint)
    }

    /// Insert an already-mounted record. A racing registration of the same
    /// name wins; this record is unmounted again.
    async fn insert(&self, mountpoint: Arc<Mountpoint>) -> VfsResult<()> {
        let duplicate = {
            let mut mounts = self.mounts.write();
            if mounts.contains_key(mountpoint.name()) {
                true
            } else {
                mounts.insert(mountpoint.name().to_string(), Arc::clone(&mountpoint));
                false
            }
        };
        if duplicate {
            if let Err(e) = mountpoint.unmount().await {
                warn!(mount = %mountpoint.name(), error = %e, "Failed to unmount duplicate record");
            }
            return Err(VfsError::DuplicateMount(mountpoint.name().to_string()));
        }
        Ok(())
    }

    // ========================================================================
    // Boot-time registration
    // ========================================================================

    /// Queue a registration until `init` completes, or apply it now.
    ///
    /// Returns `Ok(None)` when queued. Queued entries are validated during
    /// `init`; failures there are logged and skipped.
    pub async fn queue_or_register(
        &self,
        params: MountParams,
        lifecycle: Option<Arc<dyn MountLifecycle>>,
        emit: bool,
    ) -> VfsResult<Option<Arc<Mountpoint>>> {
        {
            let mut queue = self.queue.lock();
            if self.state() != RegistryState::Ready {
                debug!(mount = %params.name, "Queued mount until init");
                queue.push(Pending {
                    params,
                    lifecycle,
                    emit,
                });
                return Ok(None);
            }
        }
        self.register(params, lifecycle, MountSource::Boot, emit)
            .await
            .map(Some)
    }

    /// Number of registrations waiting for `init`.
    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    /// One-time initialization. Idempotent.
    ///
    /// Flushes queued registrations in arrival order, then every enabled
    /// mount of the static configuration, then moves to `Ready`. Entries
    /// that fail validation are logged and skipped. A second call returns
    /// immediately; a concurrent call waits for the first.
    pub async fn init(&self) -> VfsResult<()> {
        let _guard = self.init_lock.lock().await;
        if self.is_ready() {
            return Ok(());
        }
        *self.state.write() = RegistryState::Initializing;
        info!("Initializing mount registry");

        self.flush_queue().await;

        for name in self.config.disabled_mounts() {
            debug!(mount = %name, "Skipping disabled mount");
        }
        let configured: Vec<MountParams> = self.config.enabled_mounts().collect();
        for params in configured {
            let name = params.name.clone();
            if let Err(e) = self.register(params, None, MountSource::Boot, true).await {
                warn!(mount = %name, error = %e, "Skipping configured mount");
            }
        }

        // Anything queued while the config was being materialized
        loop {
            let batch = {
                let mut queue = self.queue.lock();
                if queue.is_empty() {
                    *self.state.write() = RegistryState::Ready;
                    break;
                }
                std::mem::take(&mut *queue)
            };
            self.register_batch(batch).await;
        }

        info!(mounts = self.len(), "Mount registry ready");
        Ok(())
    }

    async fn flush_queue(&self) {
        loop {
            let batch = std::mem::take(&mut *self.queue.lock());
            if batch.is_empty() {
                break;
            }
            self.register_batch(batch).await;
        }
    }

    async fn register_batch(&self, batch: Vec<Pending>) {
        for pending in batch {
            let name = pending.params.name.clone();
            if let Err(e) = self
                .register(pending.params, pending.lifecycle, MountSource::Boot, pending.emit)
                .await
            {
                warn!(mount = %name, error = %e, "Skipping queued mount");
            }
        }
    }

    // ========================================================================
    // Runtime registration
    // ========================================================================

    /// Register a mountpoint at runtime with the default lifecycle.
    ///
    /// The record is marked dynamic. Validation failures register nothing.
    pub async fn add(&self, params: MountParams) -> VfsResult<Arc<Mountpoint>> {
        self.add_with(params, None).await
    }

    /// [`add`](Self::add) with a caller-supplied lifecycle.
    pub async fn add_with(
        &self,
        mut params: MountParams,
        lifecycle: Option<Arc<dyn MountLifecycle>>,
    ) -> VfsResult<Arc<Mountpoint>> {
        params.dynamic = true;
        self.register(params, lifecycle, MountSource::Runtime, true)
            .await
    }

    /// Unmount and remove a mountpoint.
    ///
    /// The entry is deleted only if the unmount hook succeeds; the hook's
    /// error is returned otherwise and the entry stays. While the hook runs,
    /// another `remove` of the same name fails with `NotMounted`.
    pub async fn remove(&self, name: &str) -> VfsResult<()> {
        // Reserve the name so overlapping removes run the hook only once
        let (mountpoint, _removal) = {
            let mounts = self.mounts.read();
            let mountpoint = mounts
                .get(name)
                .cloned()
                .ok_or_else(|| VfsError::NotMounted(name.to_string()))?;
            if !self.removing.lock().insert(name.to_string()) {
                debug!(mount = %name, "Removal already in progress");
                return Err(VfsError::NotMounted(name.to_string()));
            }
            let removal = Removal {
                removing: &self.removing,
                name,
            };
            (mountpoint, removal)
        };

        mountpoint.unmount().await?;

        {
            let mut mounts = self.mounts.write();
            // Replaced while the hook ran: leave the newcomer alone
            if mounts
                .get(name)
                .is_some_and(|current| Arc::ptr_eq(current, &mountpoint))
            {
                mounts.shift_remove(name);
            }
        }

        info!(mount = %name, "Removed mountpoint");
        let source = if mountpoint.is_dynamic() {
            MountSource::Runtime
        } else {
            MountSource::Boot
        };
        self.flows.publish(MountFlow::Removed {
            name: name.to_string(),
            source,
        });
        Ok(())
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub fn get(&self, name: &str) -> Option<Arc<Mountpoint>> {
        self.mounts.read().get(name).cloned()
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.mounts.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.mounts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.read().is_empty()
    }

    /// Name of the first mountpoint (in registration order) owning `path`.
    ///
    /// With `fallback`, an unmatched path resolves to the default mount
    /// name, if one is configured. `None` means unresolved.
    pub fn resolve(&self, path: &str, fallback: bool) -> Option<String> {
        let owner = self
            .mounts
            .read()
            .values()
            .find(|mp| mp.owns(path))
            .map(|mp| mp.name().to_string());
        match owner {
            Some(name) => Some(name),
            None if fallback => self.default_mount(),
            None => None,
        }
    }

    /// Like [`resolve`](Self::resolve), returning the record.
    ///
    /// A default name that isn't registered resolves to `None`.
    pub fn resolve_mount(&self, path: &str, fallback: bool) -> Option<Arc<Mountpoint>> {
        let name = self.resolve(path, fallback)?;
        self.get(&name)
    }

    /// True iff `path`'s owner (default included) is an internal mount.
    pub fn is_owned_by_internal_mount(&self, path: &str) -> bool {
        self.resolve_mount(path, true)
            .is_some_and(|mp| mp.is_internal())
    }

    /// Enabled mountpoints passing `filter`, in registration order.
    pub fn list_mountpoints(&self, filter: ListFilter) -> Vec<Arc<Mountpoint>> {
        self.mounts
            .read()
            .values()
            .filter(|mp| mp.enabled())
            .filter(|mp| !filter.visible_only || mp.is_visible())
            .filter(|mp| filter.include_special || !mp.is_special())
            .cloned()
            .collect()
    }

    /// Summary rows for [`list_mountpoints`](Self::list_mountpoints).
    pub fn mount_info(&self, filter: ListFilter) -> Vec<MountInfo> {
        self.list_mountpoints(filter)
            .iter()
            .map(|mp| mp.info())
            .collect()
    }
}
