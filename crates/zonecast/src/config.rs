//! Peer configuration.

use zonecast_geometry::{Alphabet, SpaceDescriptor};

/// One-to-many dissemination strategy, chosen per deployment and injected
/// into every peer at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastStrategy {
    /// Forward to every neighbor not already on the message path. Peers may
    /// receive the same message several times; used as a baseline.
    Flooding,
    /// M-CAN: forward only towards the sub-region of the space not provably
    /// covered yet. Exactly-once delivery under a consistent neighbor table,
    /// minimizing message count.
    Efficient,
    /// Same coverage guarantee as [`BroadcastStrategy::Efficient`], with the
    /// fan-out chosen to minimize the maximum hop distance from the source.
    Optimal,
}

/// Configure a zonecast peer.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OverlayConfig {
    /// Shape of the coordinate space. A network-wide constant: every peer of
    /// one overlay instance must be configured with the same descriptor.
    pub space: SpaceDescriptor,

    /// The broadcast strategy used by this peer when fanning out
    /// one-to-many requests.
    pub broadcast_strategy: BroadcastStrategy,

    /// Capacity of each of the peer's two inboxes (control and application
    /// traffic). Senders suspend while an inbox is full.
    pub inbox_capacity: usize,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            space: SpaceDescriptor::numeric(2),
            broadcast_strategy: BroadcastStrategy::Efficient,
            inbox_capacity: 1024,
        }
    }
}

impl OverlayConfig {
    /// A numeric space of `dimensions` axes.
    pub fn numeric(dimensions: usize) -> Self {
        Self {
            space: SpaceDescriptor::numeric(dimensions),
            ..Self::default()
        }
    }

    /// A lexicographic space of `dimensions` axes over `alphabet`.
    pub fn lexicographic(dimensions: usize, alphabet: Alphabet) -> Self {
        Self {
            space: SpaceDescriptor::lexicographic(dimensions, alphabet),
            ..Self::default()
        }
    }

    /// Return a copy using the given broadcast strategy.
    pub fn with_strategy(mut self, strategy: BroadcastStrategy) -> Self {
        self.broadcast_strategy = strategy;
        self
    }
}
