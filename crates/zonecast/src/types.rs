//! Identifiers and the crate error type.

use std::sync::Arc;

use zonecast_geometry::Zone;

/// Process-wide unique identifier of a peer, stable for the peer's lifetime.
///
/// Besides identity, the id provides the deterministic tie-break of the
/// mutual-exclusion protocol and the map keys of the neighbor table.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    derive_more::From,
    derive_more::Into,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct OverlayId(uuid::Uuid);

impl OverlayId {
    /// Generate a fresh peer identifier.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl std::fmt::Display for OverlayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The first group is enough to tell peers apart in logs.
        write!(f, "{}", &self.0.as_simple().to_string()[..8])
    }
}

/// Identifier of a request/response exchange.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    derive_more::From,
    derive_more::Into,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct MessageId(uuid::Uuid);

impl MessageId {
    /// Generate a fresh message identifier.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.as_simple().to_string()[..8])
    }
}

/// Correlation token of an in-flight topology-changing operation (join,
/// leave, split, merge).
///
/// Every neighbor-table mutation is tagged with the maintenance id of the
/// operation that caused it, so conflicting concurrent maintenance can be
/// told apart and stale control messages can be dropped.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    derive_more::From,
    derive_more::Into,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct MaintenanceId(uuid::Uuid);

impl MaintenanceId {
    /// Generate a fresh maintenance token.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl std::fmt::Display for MaintenanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.as_simple().to_string()[..8])
    }
}

/// Zonecast error type.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ZonecastError {
    /// Geometry error (invalid split/merge, dimension mismatch).
    #[error(transparent)]
    Zone(#[from] zonecast_geometry::ZoneError),

    /// No eligible neighbor was found for a key that should be reachable.
    /// Evidence of a topology invariant violation.
    #[error("routing error: {0}")]
    Routing(Box<str>),

    /// The peer is no longer part of the overlay.
    #[error("peer {0} is not active")]
    PeerNotActive(OverlayId),

    /// A topology change was requested while another one targeting the same
    /// peer is still in flight.
    #[error("maintenance {0} already in progress")]
    ConcurrentMaintenance(MaintenanceId),

    /// The last peer of an overlay cannot donate its zone to anyone.
    #[error("no mergeable neighbor for zone {0}")]
    NoMergeableNeighbor(Arc<Zone>),

    /// The in-process channel to a peer is gone; the remote handle is dead.
    #[error("transport failure towards {0}")]
    Transport(OverlayId),

    /// Other
    #[error("other: {0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl ZonecastError {
    /// Promote a custom error type to a ZonecastError.
    pub fn other(e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Other(e.into())
    }

    /// Build a routing error from a rendered reason.
    pub fn routing(reason: impl Into<String>) -> Self {
        Self::Routing(reason.into().into_boxed_str())
    }
}

impl From<String> for ZonecastError {
    fn from(s: String) -> Self {
        ZonecastError::routing(s)
    }
}

impl From<&str> for ZonecastError {
    fn from(s: &str) -> Self {
        ZonecastError::routing(s)
    }
}

/// Result alias used throughout the crate.
pub type ZonecastResult<T> = Result<T, ZonecastError>;
