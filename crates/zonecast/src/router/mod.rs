//! Routing decisions: given the local overlay state and an inbound request,
//! compute where it goes next.
//!
//! Routers are pure with respect to peer state. They never send anything and
//! never touch the response table; the peer task applies the returned
//! [`RoutingDecision`]. This keeps every strategy unit-testable against a
//! bare zone and neighbor table.

pub(crate) mod anycast;
pub(crate) mod broadcast;
pub(crate) mod unicast;

use std::cmp::Ordering;

use rand::Rng;
use zonecast_geometry::{Key, Zone};

use crate::message::{RequestMessage, RoutingPlan};
use crate::neighbor::{Direction, NeighborEntry, NeighborTable};
use crate::peer::Peer;
use crate::types::{OverlayId, ZonecastError, ZonecastResult};

/// Immutable view of the deciding peer.
pub(crate) struct RouterContext<'a> {
    /// The deciding peer's id.
    pub id: OverlayId,
    /// The zone it owns.
    pub zone: &'a Zone,
    /// Its neighbor table.
    pub neighbors: &'a NeighborTable,
}

/// What the peer task must do with the message.
#[derive(Debug, Default)]
pub(crate) struct RoutingDecision {
    /// The local peer is a destination and executes the request action.
    pub deliver_locally: bool,
    /// Copies to forward, each stamped with its propagation state.
    pub forward: Vec<(Peer, RequestMessage)>,
}

impl RoutingDecision {
    fn destination() -> Self {
        Self {
            deliver_locally: true,
            forward: Vec::new(),
        }
    }
}

/// Dispatch on the message's routing plan.
#[tracing::instrument(skip_all, fields(peer = %ctx.id, message = %request.id))]
pub(crate) fn decide(
    ctx: &RouterContext<'_>,
    request: &RequestMessage,
) -> ZonecastResult<RoutingDecision> {
    match &request.plan {
        RoutingPlan::Unicast { target } => unicast::decide(ctx, request, target.clone()),
        RoutingPlan::Anycast { key } => anycast::decide(ctx, request, &key.clone()),
        RoutingPlan::Broadcast { strategy, .. } => broadcast::decide(ctx, request, *strategy),
    }
}

/// The first dimension on which the local zone misses the key, and the side
/// the key lies on. `None` when the zone satisfies the key on every pinned
/// axis.
pub(crate) fn missed_dimension(zone: &Zone, key: &Key) -> Option<(usize, Direction)> {
    for dimension in 0..zone.dimensions() {
        if let Some(element) = key.element(dimension) {
            match zone.contains_on(dimension, element) {
                Ordering::Less => return Some((dimension, Direction::Inferior)),
                Ordering::Greater => return Some((dimension, Direction::Superior)),
                Ordering::Equal => {}
            }
        }
    }
    None
}

/// Geometric distance from `zone` to the region selected by `key`, over the
/// pinned axes only.
fn key_distance(zone: &Zone, key: &Key) -> f64 {
    let mut sum = 0.0;
    for dimension in 0..zone.dimensions() {
        if let Some(element) = key.element(dimension) {
            if zone.contains_on(dimension, element) != Ordering::Equal {
                let d = element
                    .distance(zone.lower(dimension))
                    .min(element.distance(zone.upper(dimension)));
                sum += d * d;
            }
        }
    }
    sum.sqrt()
}

/// The neighbor to take one greedy step towards `key`, out of the neighbors
/// on `(dimension, direction)`.
///
/// Neighbors already satisfying the key on every other dimension are
/// preferred; among equally close candidates one is chosen at random to
/// spread load across equivalent paths.
pub(crate) fn nearest_neighbor<'t>(
    ctx: &RouterContext<'t>,
    key: &Key,
    dimension: usize,
    direction: Direction,
) -> ZonecastResult<&'t NeighborEntry> {
    let all: Vec<&NeighborEntry> = ctx.neighbors.neighbors_on(dimension, direction).collect();
    if all.is_empty() {
        return Err(ZonecastError::routing(format!(
            "no neighbor on dimension {dimension} towards {direction} for key {key}",
        )));
    }

    // Prefer neighbors whose zone already satisfies the key on every
    // dimension but the routing one.
    let verifying: Vec<&NeighborEntry> = all
        .iter()
        .copied()
        .filter(|n| {
            (0..ctx.zone.dimensions()).all(|d| {
                d == dimension
                    || key
                        .element(d)
                        .map(|e| n.zone.contains_on(d, e) == Ordering::Equal)
                        .unwrap_or(true)
            })
        })
        .collect();
    let candidates = if verifying.is_empty() { all } else { verifying };

    let best = candidates
        .iter()
        .map(|n| key_distance(&n.zone, key))
        .fold(f64::INFINITY, f64::min);
    let ranked: Vec<&NeighborEntry> = candidates
        .into_iter()
        .filter(|n| key_distance(&n.zone, key) <= best)
        .collect();

    let pick = rand::thread_rng().gen_range(0..ranked.len());
    Ok(ranked[pick])
}

/// A copy of `request` bound for one neighbor, hop count bumped.
pub(crate) fn copy_for(request: &RequestMessage, plan: RoutingPlan) -> RequestMessage {
    let mut copy = request.clone();
    copy.plan = plan;
    copy.increment_hop_count();
    copy
}

#[cfg(test)]
pub(crate) mod test_support {
    use zonecast_geometry::{Coordinate, Element, SpaceDescriptor, Zone};

    use super::*;
    use crate::config::OverlayConfig;
    use crate::peer::Peer;
    use crate::types::MaintenanceId;

    /// A detached peer handle whose inbox is drained by the returned
    /// receiver. Enough to observe what a router would send.
    pub(crate) fn detached_peer() -> (Peer, crate::peer::InboxReceivers) {
        Peer::detached(&OverlayConfig::numeric(2))
    }

    pub(crate) fn point(x: f64, y: f64) -> Coordinate {
        Coordinate::new(vec![Element::Numeric(x), Element::Numeric(y)])
    }

    /// Split the 2D unit space into four quadrants, returning them in
    /// (south-west, south-east, north-west, north-east) order.
    pub(crate) fn quadrants() -> [Zone; 4] {
        let space = SpaceDescriptor::numeric(2);
        let (west, east) = Zone::full(&space).split(0).unwrap();
        let (sw, nw) = west.split(1).unwrap();
        let (se, ne) = east.split(1).unwrap();
        [sw, se, nw, ne]
    }

    /// A neighbor table for `local` over the given zones.
    pub(crate) fn table_for(local: &Zone, others: &[(OverlayId, Zone, Peer)]) -> NeighborTable {
        let mut table = NeighborTable::new(local.dimensions());
        let maintenance = MaintenanceId::random();
        for (id, zone, peer) in others {
            table.insert_by_geometry(
                local,
                NeighborEntry::new(*id, zone.clone(), peer.clone()),
                maintenance,
            );
        }
        table
    }
}
