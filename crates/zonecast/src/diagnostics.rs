//! Read-only consistency checks over peer snapshots.
//!
//! Routing correctness rests on two structural invariants: every peer's
//! neighbor table covers the full surface of its zone, and the zones of all
//! live peers tile the space exactly. Both are checked here from
//! [`PeerSnapshot`]s, so the checks never race the peers they inspect.
//! Operational tooling and the integration tests run them after every
//! topology change.

use zonecast_geometry::{SpaceDescriptor, Zone};

use crate::neighbor::Direction;
use crate::peer::PeerSnapshot;
use crate::types::OverlayId;

const EPSILON: f64 = 1e-9;

/// A defect found in one peer's neighbor table.
#[derive(Debug, Clone, PartialEq)]
pub enum NeighborError {
    /// A stretch of the zone surface on `(dimension, direction)` has no
    /// neighbor covering it. `from`/`to` give the uncovered interval on the
    /// ordering axis, projected onto `[0, 1)`.
    MissingNeighbor {
        /// The peer whose table is defective.
        peer: OverlayId,
        /// Dimension of the uncovered surface.
        dimension: usize,
        /// Direction of the uncovered surface.
        direction: Direction,
        /// Start of the gap.
        from: f64,
        /// End of the gap.
        to: f64,
    },
    /// A table entry whose zone does not actually neighbor the peer's zone
    /// on the dimension and direction it is registered under.
    InvalidNeighbor {
        /// The peer whose table is defective.
        peer: OverlayId,
        /// The offending entry.
        neighbor: OverlayId,
        /// Dimension the entry is registered on.
        dimension: usize,
        /// Direction the entry is registered on.
        direction: Direction,
    },
}

/// Outcome of a per-peer neighborhood check.
#[derive(Debug, Clone, Default)]
pub struct NeighborhoodReport {
    /// Every defect found, in table order.
    pub errors: Vec<NeighborError>,
}

impl NeighborhoodReport {
    /// True when the table satisfies the neighborhood invariant.
    pub fn is_consistent(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Check one peer's neighbor table against its zone.
///
/// For every dimension and direction, the entries registered there must
/// actually abut the zone on that side, and their projections onto the next
/// dimension must cover the zone's extent with no gap. Surfaces flush with
/// the space boundary have no neighbors and are exempt.
pub fn check_neighborhood(space: &SpaceDescriptor, snapshot: &PeerSnapshot) -> NeighborhoodReport {
    let mut report = NeighborhoodReport::default();
    let Some(zone) = &snapshot.zone else {
        return report;
    };
    let full = Zone::full(space);

    for dimension in 0..space.dimensions() {
        for direction in Direction::BOTH {
            let mut views: Vec<_> = snapshot
                .neighbors
                .iter()
                .filter(|v| v.dimension == dimension && v.direction == direction)
                .collect();

            for view in &views {
                let inferior = direction == Direction::Inferior;
                let valid = zone.neighbor_dimension(&view.zone) == Some(dimension)
                    && zone.abuts(&view.zone, dimension, inferior);
                if !valid {
                    report.errors.push(NeighborError::InvalidNeighbor {
                        peer: snapshot.id,
                        neighbor: view.id,
                        dimension,
                        direction,
                    });
                }
            }

            // A surface flush with the space boundary has nobody behind it.
            let at_boundary = match direction {
                Direction::Inferior => {
                    zone.lower(dimension)
                        .compare(full.lower(dimension))
                        .is_eq()
                }
                Direction::Superior => {
                    zone.upper(dimension)
                        .compare(full.upper(dimension))
                        .is_eq()
                }
            };
            if at_boundary {
                continue;
            }

            let axis = space.next_dimension(dimension);
            if axis == dimension {
                // One-dimensional space: coverage degenerates to presence.
                if views.is_empty() {
                    report.errors.push(NeighborError::MissingNeighbor {
                        peer: snapshot.id,
                        dimension,
                        direction,
                        from: zone.lower(dimension).to_fraction(),
                        to: zone.upper(dimension).to_fraction(),
                    });
                }
                continue;
            }

            // Walk the neighbors sorted along the ordering axis and record
            // every stretch of the local extent left uncovered.
            views.sort_by(|a, b| {
                a.zone
                    .lower(axis)
                    .compare(b.zone.lower(axis))
            });
            let mut cursor = zone.lower(axis).to_fraction();
            let end = zone.upper(axis).to_fraction();
            for view in views {
                let lower = view.zone.lower(axis).to_fraction();
                let upper = view.zone.upper(axis).to_fraction();
                if upper <= cursor + EPSILON {
                    continue;
                }
                if lower > cursor + EPSILON {
                    report.errors.push(NeighborError::MissingNeighbor {
                        peer: snapshot.id,
                        dimension,
                        direction,
                        from: cursor,
                        to: lower.min(end),
                    });
                }
                cursor = cursor.max(upper);
                if cursor >= end - EPSILON {
                    break;
                }
            }
            if cursor < end - EPSILON {
                report.errors.push(NeighborError::MissingNeighbor {
                    peer: snapshot.id,
                    dimension,
                    direction,
                    from: cursor,
                    to: end,
                });
            }
        }
    }

    report
}

/// A defect found in the zone tiling of the overlay as a whole.
#[derive(Debug, Clone, PartialEq)]
pub enum TilingError {
    /// Two live peers claim overlapping regions.
    Overlap {
        /// First claimant.
        a: OverlayId,
        /// Second claimant.
        b: OverlayId,
    },
    /// The zone measures do not add up to the measure of the space: some
    /// region is unowned.
    AreaMismatch {
        /// Measure of the full space.
        expected: f64,
        /// Sum of the live zone measures.
        actual: f64,
    },
}

/// Check that the live zones of `snapshots` tile the space exactly.
///
/// Inactive peers (no zone) are skipped; they are legitimate before a join
/// and after a leave.
pub fn check_tiling(space: &SpaceDescriptor, snapshots: &[PeerSnapshot]) -> Vec<TilingError> {
    let mut errors = Vec::new();
    let live: Vec<_> = snapshots
        .iter()
        .filter_map(|s| s.zone.as_ref().map(|z| (s.id, z)))
        .collect();

    for (i, (a_id, a_zone)) in live.iter().enumerate() {
        for (b_id, b_zone) in &live[i + 1..] {
            if a_zone.overlaps(b_zone) {
                errors.push(TilingError::Overlap { a: *a_id, b: *b_id });
            }
        }
    }

    let expected = Zone::full(space).area();
    let actual: f64 = live.iter().map(|(_, z)| z.area()).sum();
    if (expected - actual).abs() > EPSILON {
        errors.push(TilingError::AreaMismatch { expected, actual });
    }

    errors
}
