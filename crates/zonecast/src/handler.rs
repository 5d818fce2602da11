//! Local data handling at destination peers.
//!
//! The overlay core stays storage-agnostic: a peer executes request actions
//! against whatever [`DataHandler`] it was built with, and shapes responses
//! through a [`ResponseProvider`]. The in-memory implementations here back
//! the tests and small deployments.

use std::sync::Arc;

use parking_lot::Mutex;
use zonecast_geometry::{Coordinate, Key, Zone};

use crate::message::{Aggregate, RequestAction, RequestMessage};
use crate::peer::PeerRef;

/// A datum addressed by a point of the coordinate space.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DataItem {
    /// Where the item lives in the space. Determines the owning peer.
    pub coordinate: Coordinate,
    /// Opaque payload.
    pub value: String,
}

impl DataItem {
    /// Build an item.
    pub fn new(coordinate: Coordinate, value: impl Into<String>) -> Self {
        Self {
            coordinate,
            value: value.into(),
        }
    }
}

/// Storage operations a peer performs on the data it owns.
///
/// Implementations must be safe to call from the peer task and from
/// maintenance tasks; interior synchronization is the implementor's job.
pub trait DataHandler: Send + Sync + 'static {
    /// Take ownership of an item that routed here.
    fn affect_data_received(&self, item: DataItem);

    /// Every item currently owned.
    fn retrieve_all_data(&self) -> Vec<DataItem>;

    /// The owned items whose coordinates fall inside `zone`.
    fn retrieve_data_in(&self, zone: &Zone) -> Vec<DataItem>;

    /// Remove and return the owned items whose coordinates fall inside
    /// `zone`. Used when a zone half is handed over during a split.
    fn remove_data_in(&self, zone: &Zone) -> Vec<DataItem>;
}

/// Grow-only in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<Vec<DataItem>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items held.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// True when no item is held.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl DataHandler for MemoryStore {
    fn affect_data_received(&self, item: DataItem) {
        self.items.lock().push(item);
    }

    fn retrieve_all_data(&self) -> Vec<DataItem> {
        self.items.lock().clone()
    }

    fn retrieve_data_in(&self, zone: &Zone) -> Vec<DataItem> {
        self.items
            .lock()
            .iter()
            .filter(|i| zone.contains(&i.coordinate))
            .cloned()
            .collect()
    }

    fn remove_data_in(&self, zone: &Zone) -> Vec<DataItem> {
        let mut items = self.items.lock();
        let (removed, kept) = std::mem::take(&mut *items)
            .into_iter()
            .partition(|i| zone.contains(&i.coordinate));
        *items = kept;
        removed
    }
}

/// Builds the local sub-response of a request that reached its destination,
/// and folds arriving sub-responses into a pending aggregate.
///
/// `merge` must be associative: sub-responses arrive in arbitrary order.
pub trait ResponseProvider: Send + Sync + 'static {
    /// The sub-response of `request` executed at the local peer.
    fn provide(
        &self,
        request: &RequestMessage,
        local: PeerRef,
        handler: &dyn DataHandler,
    ) -> Aggregate;

    /// Fold `sub` into `acc`.
    fn merge(&self, acc: &mut Aggregate, sub: Aggregate) {
        acc.merge(sub);
    }
}

/// Default provider: executes the request action against the local handler
/// and reports the local peer; merges by union.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnionResponseProvider;

impl ResponseProvider for UnionResponseProvider {
    fn provide(
        &self,
        request: &RequestMessage,
        local: PeerRef,
        handler: &dyn DataHandler,
    ) -> Aggregate {
        let key = request.plan.key();
        let items = match &request.action {
            RequestAction::Store(item) => {
                handler.affect_data_received(item.clone());
                Vec::new()
            }
            RequestAction::Retrieve => {
                if key.is_fully_wildcard() {
                    handler.retrieve_data_in(&local.zone)
                } else {
                    region_filter(handler.retrieve_all_data(), &key)
                }
            }
            RequestAction::Remove => {
                // Items matching the key leave the store; the rest of the
                // local zone is put back untouched.
                let removed = handler.remove_data_in(&local.zone);
                let (matching, kept) = split_by_key(removed, &key);
                for item in kept {
                    handler.affect_data_received(item);
                }
                matching
            }
            RequestAction::Probe => Vec::new(),
        };
        Aggregate {
            items,
            handled_by: vec![local],
        }
    }
}

fn split_by_key(items: Vec<DataItem>, key: &Key) -> (Vec<DataItem>, Vec<DataItem>) {
    items.into_iter().partition(|i| matches_key(i, key))
}

fn matches_key(item: &DataItem, key: &Key) -> bool {
    (0..item.coordinate.dimensions()).all(|d| match key.element(d) {
        Some(element) => item.coordinate.element(d).compare(element) == std::cmp::Ordering::Equal,
        None => true,
    })
}

fn region_filter(items: Vec<DataItem>, key: &Key) -> Vec<DataItem> {
    items.into_iter().filter(|i| matches_key(i, key)).collect()
}

/// Shared handles so the peer task and maintenance tasks see one store.
pub type SharedDataHandler = Arc<dyn DataHandler>;
/// Shared response provider.
pub type SharedResponseProvider = Arc<dyn ResponseProvider>;

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use zonecast_geometry::{Element, SpaceDescriptor};

    use super::*;

    fn point(x: f64, y: f64) -> Coordinate {
        Coordinate::new(vec![Element::Numeric(x), Element::Numeric(y)])
    }

    #[test]
    fn memory_store_partitions_on_remove() {
        let space = SpaceDescriptor::numeric(2);
        let full = Zone::full(&space);
        let (west, east) = full.split(0).unwrap();

        let store = MemoryStore::new();
        store.affect_data_received(DataItem::new(point(0.25, 0.5), "west"));
        store.affect_data_received(DataItem::new(point(0.75, 0.5), "east"));

        let moved = store.remove_data_in(&east);
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].value, "east");
        assert_eq!(store.retrieve_all_data().len(), 1);
        assert_eq!(store.retrieve_data_in(&west)[0].value, "west");
    }

    #[test]
    fn retrieve_in_respects_zone_bounds() {
        let space = SpaceDescriptor::numeric(2);
        let full = Zone::full(&space);
        let store = MemoryStore::new();
        store.affect_data_received(DataItem::new(point(0.1, 0.1), "a"));
        store.affect_data_received(DataItem::new(point(0.9, 0.9), "b"));

        let (_, upper) = full.split(1).unwrap();
        let hits = store.retrieve_data_in(&upper);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].value, "b");
    }
}
