//! Per-operation loader storage with cross-operation sharing.
//!
//! A server creates one [`Warehouse`] and registers the loader of every operation it runs with
//! [`Warehouse::add`]. The returned [`Handle`] gives the operation access to its loader, and lets
//! a mutation [`share`](Handle::share) its loader with the operations it triggers, which then
//! [`use_shared`](Handle::use_shared) it for a bounded time.
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use std::time::Duration;
//! use loader_warehouse::{Warehouse, WarehouseConfig};
//!
//! let warehouse = Warehouse::<Vec<String>>::new(WarehouseConfig::new(Duration::from_secs(1)))?;
//!
//! let mutation = warehouse.add(vec!["alice".to_owned()]);
//! let token = mutation.share(None)?.expect("not disposed");
//!
//! let subscription = warehouse.add(Vec::new());
//! subscription.use_shared(token)?;
//! assert_eq!(subscription.get(|users| users.len())?, 1);
//!
//! subscription.dispose(false)?;
//! mutation.dispose(false)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

#[macro_use]
#[allow(missing_docs)]
pub mod metrics;

mod config;
mod error;
mod handle;
mod types;
mod warehouse;

pub use config::*;
pub use error::*;
pub use handle::*;
pub use types::{DisposeOptions, OperationId};
pub use warehouse::{Sanitizer, Warehouse, WarehouseBuilder};
