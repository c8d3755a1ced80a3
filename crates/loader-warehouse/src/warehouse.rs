use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime;
use tokio::task::AbortHandle;
use tokio::time::{self, Instant};

use crate::config::WarehouseConfig;
use crate::error::{ConfigError, WarehouseError};
use crate::handle::Handle;
use crate::types::{EvictionReason, OperationId};

/// A hook that scrubs a loader before it is shared with other operations.
pub type Sanitizer<T> = Arc<dyn Fn(&mut T) + Send + Sync>;

/// A pending eviction of an [`Entry`].
///
/// Dropping this aborts the timer task, so replacing or removing it never leaks a task that
/// would evict later than intended.
struct ArmedEviction {
    generation: u64,
    task: AbortHandle,
}

impl Drop for ArmedEviction {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A registered loader.
struct Entry<T> {
    payload: T,
    /// Set once by `share`, never reset.
    shared: bool,
    /// The ttl that applies once the entry is shared.
    ttl: Duration,
    created: Instant,
    eviction: Option<ArmedEviction>,
}

/// The entries and aliases owned by a single [`Warehouse`].
pub(crate) struct Registry<T> {
    next_id: u64,
    next_generation: u64,
    entries: HashMap<OperationId, Entry<T>>,
    /// Maps dependent operations to the operation whose entry they read through.
    aliases: HashMap<OperationId, OperationId>,
}

impl<T> Registry<T> {
    fn new() -> Self {
        Registry {
            next_id: 0,
            next_generation: 0,
            entries: HashMap::new(),
            aliases: HashMap::new(),
        }
    }

    /// Follows a single alias hop for `id`.
    pub(crate) fn resolve(&self, id: OperationId) -> OperationId {
        self.aliases.get(&id).copied().unwrap_or(id)
    }

    pub(crate) fn payload(&self, id: OperationId) -> Option<&T> {
        self.entries.get(&id).map(|entry| &entry.payload)
    }

    pub(crate) fn payload_mut(&mut self, id: OperationId) -> Option<&mut T> {
        self.entries.get_mut(&id).map(|entry| &mut entry.payload)
    }

    pub(crate) fn contains(&self, id: OperationId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Returns the `shared` flag of the entry for `id`, if there is one.
    pub(crate) fn is_shared(&self, id: OperationId) -> Option<bool> {
        self.entries.get(&id).map(|entry| entry.shared)
    }

    /// Points lookups for `id` at the entry of `target`.
    pub(crate) fn set_alias(&mut self, id: OperationId, target: OperationId) {
        self.aliases.insert(id, target);
    }

    pub(crate) fn remove_alias(&mut self, id: OperationId) {
        self.aliases.remove(&id);
    }

    /// Marks the entry for `id` as shared with the given `ttl`, scrubbing it first.
    ///
    /// Returns `false` if there is no such entry.
    pub(crate) fn publish(
        &mut self,
        id: OperationId,
        ttl: Duration,
        sanitizer: Option<&Sanitizer<T>>,
    ) -> bool {
        let Some(entry) = self.entries.get_mut(&id) else {
            return false;
        };
        // the sanitizer has to run before anyone can alias to this entry
        if let Some(sanitizer) = sanitizer {
            sanitizer(&mut entry.payload);
        }
        entry.shared = true;
        entry.ttl = ttl;
        true
    }

    /// Returns the ttl of the entry for `id` if it is shared.
    pub(crate) fn shared_ttl(&self, id: OperationId) -> Option<Duration> {
        self.entries
            .get(&id)
            .and_then(|entry| entry.shared.then_some(entry.ttl))
    }

    /// Removes the entry and the alias for `id`.
    ///
    /// This is idempotent, evicting an absent id does nothing.
    pub(crate) fn evict(&mut self, id: OperationId, reason: EvictionReason) {
        self.aliases.remove(&id);
        let Some(entry) = self.entries.remove(&id) else {
            return;
        };

        tracing::debug!(operation_id = %id, %reason, shared = entry.shared, "Evicted loader");
        metric!(counter("warehouse.entries.evicted") += 1, "reason" => reason.as_ref());
        metric!(
            timer("warehouse.entries.lifetime") = entry.created.elapsed(),
            "shared" => if entry.shared { "true" } else { "false" },
        );
        metric!(gauge("warehouse.entries") = self.entries.len() as u64);
    }

    pub(crate) fn armed_generation(&self, id: OperationId) -> Option<u64> {
        self.entries
            .get(&id)
            .and_then(|entry| entry.eviction.as_ref())
            .map(|eviction| eviction.generation)
    }
}

/// State shared between a [`Warehouse`], its clones, and all of its [`Handle`]s.
pub(crate) struct WarehouseInner<T> {
    registry: Mutex<Registry<T>>,
    ttl: Duration,
    production: bool,
    on_share: Option<Sanitizer<T>>,
    runtime: runtime::Handle,
}

impl<T: Send + 'static> WarehouseInner<T> {
    /// Locks the registry.
    ///
    /// A panicking sanitizer or accessor can only poison the lock between two complete registry
    /// steps, so the registry is still consistent and we keep using it.
    pub(crate) fn registry(&self) -> MutexGuard<'_, Registry<T>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn ttl(&self) -> Duration {
        self.ttl
    }

    pub(crate) fn is_production(&self) -> bool {
        self.production
    }

    /// The error policy for a registry miss on `id`.
    ///
    /// Raises [`WarehouseError::EntryNotFound`] in development mode, and reports the entry as
    /// absent in production mode.
    pub(crate) fn lookup_entry<'r>(
        &self,
        registry: &'r Registry<T>,
        id: OperationId,
    ) -> Result<Option<&'r T>, WarehouseError> {
        let resolved = registry.resolve(id);
        match registry.payload(resolved) {
            Some(payload) => Ok(Some(payload)),
            None if self.production => Ok(None),
            None => Err(WarehouseError::EntryNotFound(resolved)),
        }
    }

    /// Schedules the eviction of the entry for `id` after `ttl`.
    ///
    /// This replaces (and aborts) any eviction that was scheduled before. A timer that fires
    /// after it has been replaced does nothing.
    pub(crate) fn arm_eviction(
        self: &Arc<Self>,
        registry: &mut Registry<T>,
        id: OperationId,
        ttl: Duration,
    ) {
        if !registry.contains(id) {
            return;
        }
        let generation = registry.next_generation;
        registry.next_generation += 1;

        let deadline = Instant::now() + ttl;
        let inner = Arc::downgrade(self);
        let task = self.runtime.spawn(async move {
            time::sleep_until(deadline).await;
            expire(inner, id, generation);
        });

        let eviction = ArmedEviction {
            generation,
            task: task.abort_handle(),
        };
        if let Some(entry) = registry.entries.get_mut(&id) {
            entry.eviction = Some(eviction);
        }
        tracing::trace!(operation_id = %id, ?ttl, "Scheduled loader eviction");
    }
}

/// Evicts the entry for `id` once its ttl elapsed, unless the timer has been re-armed since.
fn expire<T: Send + 'static>(inner: Weak<WarehouseInner<T>>, id: OperationId, generation: u64) {
    // the warehouse and all its handles are gone, and the registry with them
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let mut registry = inner.registry();
    // aborting the task we are running in is fine, there are no more yield points
    if registry.armed_generation(id) == Some(generation) {
        registry.evict(id, EvictionReason::Ttl);
    }
}

/// Owns the loaders of all in-flight operations.
///
/// Each operation registers its loader with [`add`](Self::add) and gets back a [`Handle`], which
/// is the only way to access that loader afterwards. A mutation can [`share`](Handle::share) its
/// loader, after which other operations (like the subscriptions it triggers) can read through to
/// it via [`use_shared`](Handle::use_shared) until the ttl runs out.
///
/// The warehouse is cheap to clone, all clones refer to the same registry. Separately constructed
/// warehouses never share any state.
pub struct Warehouse<T> {
    pub(crate) inner: Arc<WarehouseInner<T>>,
}

impl<T> Clone for Warehouse<T> {
    fn clone(&self) -> Self {
        Warehouse {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Warehouse<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Warehouse");
        debug
            .field("ttl", &self.inner.ttl)
            .field("production", &self.inner.production)
            .field("on_share", &self.inner.on_share.is_some());
        if let Ok(registry) = self.inner.registry.try_lock() {
            debug
                .field("entries", &registry.entries.len())
                .field("aliases", &registry.aliases.len());
        }
        debug.finish()
    }
}

impl<T: Send + 'static> Warehouse<T> {
    /// Creates a new warehouse from the given configuration.
    ///
    /// This has to be called from within a Tokio runtime, which will drive the eviction timers.
    /// Use [`builder`](Self::builder) to configure an on-share hook or an explicit runtime.
    pub fn new(config: WarehouseConfig) -> Result<Self, ConfigError> {
        Self::builder(config).build()
    }

    /// Starts building a warehouse from the given configuration.
    pub fn builder(config: WarehouseConfig) -> WarehouseBuilder<T> {
        WarehouseBuilder {
            config,
            on_share: None,
            runtime: None,
        }
    }

    /// Registers the loader of a new operation.
    ///
    /// The warehouse-wide on-share hook, if any, is bound to the returned [`Handle`] as its
    /// sanitizer.
    pub fn add(&self, payload: T) -> Handle<T> {
        let sanitizer = self.inner.on_share.clone();
        self.add_with_sanitizer(payload, sanitizer)
    }

    /// Registers the loader of a new operation with an explicit sanitizer.
    ///
    /// Passing `None` registers a loader that is shared as-is, even if the warehouse has an
    /// on-share hook.
    pub fn add_with_sanitizer(&self, payload: T, sanitizer: Option<Sanitizer<T>>) -> Handle<T> {
        let mut registry = self.inner.registry();
        let operation_id = OperationId::from(registry.next_id);
        registry.next_id += 1;

        registry.entries.insert(
            operation_id,
            Entry {
                payload,
                shared: false,
                ttl: self.inner.ttl,
                created: Instant::now(),
                eviction: None,
            },
        );

        metric!(counter("warehouse.entries.added") += 1);
        metric!(gauge("warehouse.entries") = registry.entries.len() as u64);
        tracing::trace!(%operation_id, "Registered loader");

        Handle::new(Arc::clone(&self.inner), operation_id, sanitizer)
    }

    /// The number of loaders currently registered.
    pub fn len(&self) -> usize {
        self.inner.registry().entries.len()
    }

    /// Whether no loaders are registered at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a loader is registered for exactly this operation, without following aliases.
    pub fn contains(&self, operation_id: OperationId) -> bool {
        self.inner.registry().contains(operation_id)
    }

    /// The default ttl of shared loaders.
    pub fn ttl(&self) -> Duration {
        self.inner.ttl()
    }

    /// Whether missing entries degrade gracefully instead of raising errors.
    pub fn is_production(&self) -> bool {
        self.inner.is_production()
    }
}

/// Builds a [`Warehouse`] with optional settings that cannot be expressed in a config file.
pub struct WarehouseBuilder<T> {
    config: WarehouseConfig,
    on_share: Option<Sanitizer<T>>,
    runtime: Option<runtime::Handle>,
}

impl<T: Send + 'static> WarehouseBuilder<T> {
    /// Sets the hook every loader is scrubbed with before it is shared.
    pub fn on_share<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut T) + Send + Sync + 'static,
    {
        self.on_share = Some(Arc::new(hook));
        self
    }

    /// Sets the runtime that drives eviction timers.
    ///
    /// Defaults to the runtime the warehouse is built in.
    pub fn runtime(mut self, runtime: runtime::Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Validates the configuration and creates the warehouse.
    pub fn build(self) -> Result<Warehouse<T>, ConfigError> {
        let ttl = self.config.validated_ttl()?;
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => runtime::Handle::try_current().map_err(|_| ConfigError::NoRuntime)?,
        };

        tracing::debug!(
            ?ttl,
            production = self.config.production_mode,
            "Created loader warehouse"
        );

        Ok(Warehouse {
            inner: Arc::new(WarehouseInner {
                registry: Mutex::new(Registry::new()),
                ttl,
                production: self.config.production_mode,
                on_share: self.on_share,
                runtime,
            }),
        })
    }
}

impl<T> fmt::Debug for WarehouseBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarehouseBuilder")
            .field("config", &self.config)
            .field("on_share", &self.on_share.is_some())
            .field("runtime", &self.runtime.is_some())
            .finish()
    }
}
