use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies one operation registered with a [`Warehouse`](crate::Warehouse).
///
/// Ids are handed out in strictly increasing order and never reused by the same warehouse.
/// The id returned from [`Handle::share`](crate::Handle::share) doubles as the token other
/// operations pass to [`Handle::use_shared`](crate::Handle::use_shared), so it serializes as a
/// plain integer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(u64);

impl OperationId {
    /// Returns the raw integer value of this id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for OperationId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<OperationId> for u64 {
    fn from(id: OperationId) -> Self {
        id.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Options for [`Handle::dispose_with`](crate::Handle::dispose_with).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DisposeOptions {
    /// Removes the entry immediately, even if it has been shared.
    pub force: bool,
}

/// The reason an entry left the registry, used to tag metrics and logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum EvictionReason {
    Dispose,
    Force,
    Ttl,
}

impl AsRef<str> for EvictionReason {
    fn as_ref(&self) -> &str {
        match self {
            Self::Dispose => "dispose",
            Self::Force => "force",
            Self::Ttl => "ttl",
        }
    }
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}
