//! Per-peer table of live neighbors, indexed by dimension and direction.

use std::collections::HashMap;

use zonecast_geometry::{Coordinate, Zone};

use crate::peer::Peer;
use crate::types::{MaintenanceId, OverlayId};

/// Side of the local zone a neighbor sits on, for a given dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Direction {
    /// The neighbor abuts the lower bound.
    Inferior,
    /// The neighbor abuts the upper bound.
    Superior,
}

impl Direction {
    /// Both directions, inferior first.
    pub const BOTH: [Direction; 2] = [Direction::Inferior, Direction::Superior];

    /// The opposite side.
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Inferior => Direction::Superior,
            Direction::Superior => Direction::Inferior,
        }
    }

    /// Table index of this direction.
    pub fn index(self) -> usize {
        match self {
            Direction::Inferior => 0,
            Direction::Superior => 1,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Inferior => write!(f, "inferior"),
            Direction::Superior => write!(f, "superior"),
        }
    }
}

/// One neighbor relationship: the neighbor's identity, the last known view
/// of its zone, and the handle used to reach it.
///
/// The handle is a relation, never lifecycle ownership: dropping an entry
/// does not affect the neighbor peer.
#[derive(Debug, Clone)]
pub struct NeighborEntry {
    /// The neighbor's identifier.
    pub id: OverlayId,
    /// The neighbor's zone as last advertised.
    pub zone: Zone,
    /// Remote invocation handle.
    pub handle: Peer,
}

impl NeighborEntry {
    /// Build an entry from a peer handle and its advertised zone.
    pub fn new(id: OverlayId, zone: Zone, handle: Peer) -> Self {
        Self { id, zone, handle }
    }
}

/// Neighbors of one peer, indexed by `(dimension, direction)`.
///
/// Invariant: for each dimension and direction, the projections of the
/// neighbor zones onto the next dimension exactly cover the local zone's
/// extent there, with no gap and no overlap. The check lives in
/// [`crate::diagnostics`].
#[derive(Debug, Clone, Default)]
pub struct NeighborTable {
    // entries[dimension][direction.index()]
    entries: Vec<[HashMap<OverlayId, NeighborEntry>; 2]>,
}

impl NeighborTable {
    /// An empty table for a `dimensions`-dimensional space.
    pub fn new(dimensions: usize) -> Self {
        Self {
            entries: (0..dimensions).map(|_| [HashMap::new(), HashMap::new()]).collect(),
        }
    }

    /// Number of dimensions the table is laid out for.
    pub fn dimensions(&self) -> usize {
        self.entries.len()
    }

    /// Insert `entry` at the given dimension and direction. Tagged with the
    /// maintenance operation that caused the mutation.
    pub fn insert(
        &mut self,
        entry: NeighborEntry,
        dimension: usize,
        direction: Direction,
        maintenance: MaintenanceId,
    ) {
        tracing::trace!(
            neighbor = %entry.id,
            dimension,
            direction = %direction,
            maintenance = %maintenance,
            "adding neighbor",
        );
        self.entries[dimension][direction.index()].insert(entry.id, entry);
    }

    /// Update the zone view of the neighbor identified by `entry.id`,
    /// wherever it sits in the table.
    pub fn update(&mut self, id: OverlayId, zone: Zone, maintenance: MaintenanceId) -> bool {
        for dimension in 0..self.entries.len() {
            for direction in Direction::BOTH {
                if let Some(e) = self.entries[dimension][direction.index()].get_mut(&id) {
                    tracing::trace!(
                        neighbor = %id,
                        maintenance = %maintenance,
                        "updating neighbor zone view",
                    );
                    e.zone = zone;
                    return true;
                }
            }
        }
        false
    }

    /// Remove the neighbor identified by `id`, returning where it was.
    pub fn remove(
        &mut self,
        id: OverlayId,
        maintenance: MaintenanceId,
    ) -> Option<(usize, Direction)> {
        for dimension in 0..self.entries.len() {
            for direction in Direction::BOTH {
                if self.entries[dimension][direction.index()].remove(&id).is_some() {
                    tracing::trace!(
                        neighbor = %id,
                        dimension,
                        direction = %direction,
                        maintenance = %maintenance,
                        "removed neighbor",
                    );
                    return Some((dimension, direction));
                }
            }
        }
        None
    }

    /// The neighbors on `dimension` towards `direction`.
    pub fn neighbors_on(
        &self,
        dimension: usize,
        direction: Direction,
    ) -> impl Iterator<Item = &NeighborEntry> {
        self.entries[dimension][direction.index()].values()
    }

    /// All entries, with their dimension and direction.
    pub fn iter(&self) -> impl Iterator<Item = (usize, Direction, &NeighborEntry)> {
        self.entries.iter().enumerate().flat_map(|(dimension, dirs)| {
            Direction::BOTH.into_iter().flat_map(move |direction| {
                dirs[direction.index()]
                    .values()
                    .map(move |e| (dimension, direction, e))
            })
        })
    }

    /// Look up an entry by peer id.
    pub fn get(&self, id: OverlayId) -> Option<&NeighborEntry> {
        self.iter().find(|(_, _, e)| e.id == id).map(|(_, _, e)| e)
    }

    /// Where the given peer sits in the table, if present.
    pub fn find_dimension_direction(&self, id: OverlayId) -> Option<(usize, Direction)> {
        self.iter()
            .find(|(_, _, e)| e.id == id)
            .map(|(dimension, direction, _)| (dimension, direction))
    }

    /// True when the table holds the given peer.
    pub fn contains(&self, id: OverlayId) -> bool {
        self.get(id).is_some()
    }

    /// A neighbor whose zone can absorb `zone` back into the zone they were
    /// both split from, if one exists.
    pub fn mergeable_neighbor(&self, zone: &Zone) -> Option<&NeighborEntry> {
        self.iter()
            .find(|(dimension, _, e)| zone.can_merge_with(&e.zone, *dimension))
            .map(|(_, _, e)| e)
    }

    /// Drop every entry whose zone no longer neighbors `zone`.
    ///
    /// Run after a topology change updated the local zone or some neighbor
    /// views.
    pub fn remove_outdated(&mut self, zone: &Zone) {
        for dirs in self.entries.iter_mut() {
            for map in dirs.iter_mut() {
                map.retain(|_, e| zone.neighbor_dimension(&e.zone).is_some());
            }
        }
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .map(|dirs| dirs[0].len() + dirs[1].len())
            .sum()
    }

    /// True when the table holds no neighbor at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Classify `zone` against `local` and insert it on the dimension and
    /// direction it actually neighbors on. Returns false when the zones do
    /// not neighbor each other.
    pub fn insert_by_geometry(
        &mut self,
        local: &Zone,
        entry: NeighborEntry,
        maintenance: MaintenanceId,
    ) -> bool {
        match local.neighbor_dimension(&entry.zone) {
            Some(dimension) => {
                // Abutting at the local lower bound means the neighbor sits on
                // the inferior side.
                let direction = if local.abuts(&entry.zone, dimension, true) {
                    Direction::Inferior
                } else {
                    Direction::Superior
                };
                self.insert(entry, dimension, direction, maintenance);
                true
            }
            None => false,
        }
    }
}

/// A read-only view of one neighbor relationship, as exported by snapshots
/// for diagnostics.
#[derive(Debug, Clone)]
pub struct NeighborView {
    /// Neighbor id.
    pub id: OverlayId,
    /// Dimension the neighbor is registered on.
    pub dimension: usize,
    /// Direction the neighbor is registered on.
    pub direction: Direction,
    /// Last known zone of the neighbor.
    pub zone: Zone,
}

impl NeighborView {
    /// The neighbor zone's lower bound, the sort key of the coverage check.
    pub fn lower_bound(&self) -> &Coordinate {
        self.zone.lower_bound()
    }
}
