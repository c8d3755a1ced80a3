use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::validate_ttl;
use crate::error::WarehouseError;
use crate::types::{DisposeOptions, EvictionReason, OperationId};
use crate::warehouse::{Sanitizer, WarehouseInner};

/// Access to the loader of a single operation.
///
/// Returned from [`Warehouse::add`](crate::Warehouse::add). All reads, sharing and disposal of the
/// operation's loader go through this handle.
pub struct Handle<T> {
    warehouse: Arc<WarehouseInner<T>>,
    operation_id: OperationId,
    sanitizer: Option<Sanitizer<T>>,
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("operation_id", &self.operation_id)
            .field("sanitizer", &self.sanitizer.is_some())
            .finish()
    }
}

impl<T: Send + 'static> Handle<T> {
    pub(crate) fn new(
        warehouse: Arc<WarehouseInner<T>>,
        operation_id: OperationId,
        sanitizer: Option<Sanitizer<T>>,
    ) -> Self {
        Handle {
            warehouse,
            operation_id,
            sanitizer,
        }
    }

    /// Reads from the loader of this operation.
    ///
    /// If [`use_shared`](Self::use_shared) pointed this operation at another one, this reads from
    /// that operation's loader instead.
    ///
    /// Fails with [`WarehouseError::EntryNotFound`] if the loader is gone, in production mode as
    /// well, since there is nothing meaningful to read from.
    pub fn get<R, F>(&self, f: F) -> Result<R, WarehouseError>
    where
        F: FnOnce(&T) -> R,
    {
        let registry = self.warehouse.registry();
        match self.warehouse.lookup_entry(&registry, self.operation_id)? {
            Some(payload) => Ok(f(payload)),
            None => {
                let id = registry.resolve(self.operation_id);
                tracing::warn!(operation_id = %self.operation_id, resolved = %id, "Loader not found");
                Err(WarehouseError::EntryNotFound(id))
            }
        }
    }

    /// The id of this operation.
    pub fn operation_id(&self) -> OperationId {
        self.operation_id
    }

    /// Whether the loader of this operation has been shared.
    ///
    /// This does not follow [`use_shared`](Self::use_shared), and is `false` once the loader is
    /// gone.
    pub fn is_shared(&self) -> bool {
        self.warehouse
            .registry()
            .is_shared(self.operation_id)
            .unwrap_or(false)
    }

    /// Runs the sanitizer bound to this handle on its own loader.
    pub fn sanitize(&self) {
        let Some(sanitizer) = &self.sanitizer else {
            return;
        };
        if let Some(payload) = self.warehouse.registry().payload_mut(self.operation_id) {
            sanitizer(payload);
        }
    }

    /// Makes the loader of this operation available to other operations.
    ///
    /// The loader is sanitized first, and then stays alive for `ttl`, or the warehouse's default
    /// ttl if `None` is given. Calling this again sanitizes again and restarts the ttl.
    ///
    /// Returns the token other operations pass to [`use_shared`](Self::use_shared). If the loader
    /// has already been disposed, this fails with [`WarehouseError::AlreadyDisposed`], or returns
    /// `Ok(None)` in production mode.
    pub fn share(&self, ttl: Option<Duration>) -> Result<Option<OperationId>, WarehouseError> {
        let ttl = match ttl {
            Some(ttl) => validate_ttl(ttl).ok_or(WarehouseError::InvalidTtl(ttl))?,
            None => self.warehouse.ttl(),
        };

        let mut registry = self.warehouse.registry();
        if !registry.publish(self.operation_id, ttl, self.sanitizer.as_ref()) {
            if self.warehouse.is_production() {
                tracing::warn!(operation_id = %self.operation_id, "Tried to share a disposed loader");
                return Ok(None);
            }
            return Err(WarehouseError::AlreadyDisposed(self.operation_id));
        }
        self.warehouse
            .arm_eviction(&mut registry, self.operation_id, ttl);

        metric!(counter("warehouse.entries.shared") += 1);
        tracing::debug!(operation_id = %self.operation_id, ?ttl, "Shared loader");

        Ok(Some(self.operation_id))
    }

    /// Reads through to the shared loader of the operation `target` from now on.
    ///
    /// `target` is the token returned from [`share`](Self::share). If that loader is gone
    /// already, this operation keeps reading from its own loader. If it exists but was never
    /// shared, this fails with [`WarehouseError::UnsharedAccess`], regardless of mode.
    ///
    /// Once this operation's own loader is disposed, nothing is aliased anymore. This fails with
    /// [`WarehouseError::EntryNotFound`], or does nothing in production mode.
    pub fn use_shared(&self, target: OperationId) -> Result<(), WarehouseError> {
        let mut registry = self.warehouse.registry();
        if !registry.contains(self.operation_id) {
            metric!(counter("warehouse.use_shared") += 1, "outcome" => "disposed");
            if self.warehouse.is_production() {
                tracing::warn!(
                    operation_id = %self.operation_id,
                    %target,
                    "Tried to alias a disposed loader"
                );
                return Ok(());
            }
            return Err(WarehouseError::EntryNotFound(self.operation_id));
        }

        match registry.is_shared(target) {
            None => {
                // don't leave a dangling alias around for the reads that follow
                registry.set_alias(self.operation_id, self.operation_id);
                if !self.warehouse.is_production() {
                    tracing::warn!(
                        operation_id = %self.operation_id,
                        %target,
                        "Shared loader was already disposed"
                    );
                }
                metric!(counter("warehouse.use_shared") += 1, "outcome" => "missing");
                Ok(())
            }
            Some(false) => {
                metric!(counter("warehouse.use_shared") += 1, "outcome" => "unshared");
                Err(WarehouseError::UnsharedAccess(target))
            }
            Some(true) => {
                registry.set_alias(self.operation_id, target);
                metric!(counter("warehouse.use_shared") += 1, "outcome" => "aliased");
                Ok(())
            }
        }
    }

    /// Disposes of the loader of this operation.
    ///
    /// An unshared loader is removed right away, before this returns, so a following
    /// [`get`](Self::get) or [`share`](Self::share) already finds it gone. A shared loader stays
    /// around for its ttl, counted from now, so that dependent operations can still read from
    /// it. With `force`, the loader is removed right away in any case.
    ///
    /// This never touches the loader of another operation this one reads through to. Disposing
    /// an already removed loader fails with [`WarehouseError::EntryNotFound`] unless `force` is
    /// set or the warehouse is in production mode.
    pub fn dispose(&self, force: bool) -> Result<(), WarehouseError> {
        let mut registry = self.warehouse.registry();
        if force {
            registry.evict(self.operation_id, EvictionReason::Force);
            return Ok(());
        }

        if !registry.contains(self.operation_id) {
            registry.remove_alias(self.operation_id);
            if self.warehouse.is_production() {
                return Ok(());
            }
            return Err(WarehouseError::EntryNotFound(self.operation_id));
        }

        match registry.shared_ttl(self.operation_id) {
            Some(ttl) => self
                .warehouse
                .arm_eviction(&mut registry, self.operation_id, ttl),
            None => registry.evict(self.operation_id, EvictionReason::Dispose),
        }
        Ok(())
    }

    /// Same as [`dispose`](Self::dispose), taking [`DisposeOptions`].
    pub fn dispose_with(&self, options: DisposeOptions) -> Result<(), WarehouseError> {
        self.dispose(options.force)
    }
}
