use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::config::MAX_TTL;
use crate::types::OperationId;

/// An error that prevents a [`Warehouse`](crate::Warehouse) from being constructed.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No `ttl` was configured.
    #[error("ttl is required")]
    MissingTtl,
    /// The configured `ttl` is zero or larger than [`MAX_TTL`].
    #[error(
        "ttl must be positive and no greater than {}ms, got {:?}",
        MAX_TTL.as_millis(),
        .0
    )]
    InvalidTtl(Duration),
    /// The warehouse was constructed outside of a Tokio runtime and no runtime handle was given.
    #[error("no tokio runtime available to drive eviction timers")]
    NoRuntime,
    /// The configuration file could not be read.
    #[error("failed reading config file")]
    Io(#[from] io::Error),
    /// The configuration file is not valid YAML, or contains invalid values.
    #[error("failed to parse config YAML")]
    Parse(#[from] serde_yaml::Error),
    /// The configuration file is empty.
    #[error("config file empty")]
    Empty,
}

/// An error returned from the per-operation [`Handle`](crate::Handle) API.
///
/// Which of these are raised depends on the warehouse mode. In production mode, missing entries
/// mostly degrade gracefully, see the individual [`Handle`](crate::Handle) methods.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WarehouseError {
    /// There is no loader registered for the operation.
    ///
    /// This usually means the operation was disposed early, or the ttl is too short.
    #[error("loader for operation {0} not found, perhaps it was disposed early or the ttl is too short")]
    EntryNotFound(OperationId),
    /// [`share`](crate::Handle::share) was called after the loader had been disposed.
    #[error("loader for operation {0} has already been disposed")]
    AlreadyDisposed(OperationId),
    /// [`use_shared`](crate::Handle::use_shared) pointed at a loader that was never shared.
    ///
    /// This is always raised, as it can only be caused by calling things in the wrong order.
    #[error("invalid access to unshared loader of operation {0}, call share() on it first")]
    UnsharedAccess(OperationId),
    /// A ttl override passed to [`share`](crate::Handle::share) is out of range.
    #[error(
        "ttl must be positive and no greater than {}ms, got {:?}",
        MAX_TTL.as_millis(),
        .0
    )]
    InvalidTtl(Duration),
}
