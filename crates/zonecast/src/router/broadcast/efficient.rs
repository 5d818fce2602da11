//! Message-count-minimizing dissemination.
//!
//! Every copy carries the set of directions its receiver is responsible
//! for. Dimensions are walked from the highest down; a neighbor picked on
//! dimension `d` inherits the dimensions below `d` plus whatever remains of
//! `d` itself, with the direction pointing back at the sender removed. On
//! dimension 0 a corner constraint keeps only the neighbors whose lower
//! bound the sender's zone contains on every other axis, so each peer is
//! selected by exactly one sender and no copy is ever delivered twice.

use std::cmp::Ordering;

use super::super::{copy_for, RouterContext, RoutingDecision};
use crate::message::{BroadcastState, DirectionPlan, RequestMessage, RoutingPlan};
use crate::neighbor::Direction;
use crate::types::{ZonecastError, ZonecastResult};
use crate::validator;

pub(crate) fn decide(
    ctx: &RouterContext<'_>,
    request: &RequestMessage,
) -> ZonecastResult<RoutingDecision> {
    let RoutingPlan::Broadcast { key, strategy, state } = &request.plan else {
        return Err(ZonecastError::routing("efficient broadcast applied to a non-broadcast plan"));
    };

    let dimensions = ctx.zone.dimensions();
    // The initiator covers the whole space.
    let mut directions = match state {
        Some(s) => s.directions.clone(),
        None => DirectionPlan::full(dimensions),
    };

    let mut forward = Vec::new();
    for dimension in (0..dimensions).rev() {
        for direction in Direction::BOTH {
            if directions.covers(dimension, direction) {
                for neighbor in ctx.neighbors.neighbors_on(dimension, direction) {
                    // Corner constraint: on the lowest dimension, only the
                    // neighbors whose lower corner this zone contains on
                    // every other axis are ours to serve.
                    let selected = dimension != 0
                        || (1..dimensions).all(|axis| {
                            ctx.zone.contains_on(axis, neighbor.zone.lower(axis))
                                == Ordering::Equal
                        });
                    if selected {
                        let plan = RoutingPlan::Broadcast {
                            key: key.clone(),
                            strategy: *strategy,
                            state: Some(BroadcastState {
                                directions: directions.for_neighbor(dimension, direction),
                                plane: None,
                            }),
                        };
                        forward.push((neighbor.handle.clone(), copy_for(request, plan)));
                    }
                }
            }
            // Handed out or empty either way, this direction is covered.
            directions.clear(dimension, direction);
        }
    }

    let deliver_locally = validator::validates(&request.plan, ctx.zone);
    tracing::trace!(
        message = %request.id,
        peer = %ctx.id,
        fan_out = forward.len(),
        deliver_locally,
        "efficient broadcast step",
    );
    Ok(RoutingDecision {
        deliver_locally,
        forward,
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use zonecast_geometry::Key;

    use super::super::super::test_support::{detached_peer, quadrants, table_for};
    use super::*;
    use crate::config::BroadcastStrategy;
    use crate::message::RequestAction;
    use crate::types::OverlayId;

    fn broadcast(state: Option<BroadcastState>) -> RequestMessage {
        RequestMessage::new(
            RoutingPlan::Broadcast {
                key: Key::wildcard(2),
                strategy: BroadcastStrategy::Efficient,
                state,
            },
            RequestAction::Probe,
            true,
        )
    }

    fn state_of(request: &RequestMessage) -> &BroadcastState {
        match &request.plan {
            RoutingPlan::Broadcast { state: Some(s), .. } => s,
            _ => panic!("forwarded copy must carry broadcast state"),
        }
    }

    #[test]
    fn initiator_covers_one_neighbor_per_dimension_in_a_quadrant_grid() {
        let [sw, se, nw, _] = quadrants();
        let (se_peer, _a) = detached_peer();
        let (nw_peer, _b) = detached_peer();
        let neighbors = table_for(
            &sw,
            &[
                (se_peer.id(), se, se_peer.clone()),
                (nw_peer.id(), nw, nw_peer.clone()),
            ],
        );
        let ctx = RouterContext {
            id: OverlayId::random(),
            zone: &sw,
            neighbors: &neighbors,
        };

        let decision = decide(&ctx, &broadcast(None)).unwrap();
        assert!(decision.deliver_locally);
        assert_eq!(decision.forward.len(), 2);

        // The copy crossing dimension 0 keeps only the direction away from
        // the sender on that dimension; dimension 1 is fully cleared.
        let east = decision
            .forward
            .iter()
            .find(|(p, _)| p.id() == se_peer.id())
            .unwrap();
        let dirs = &state_of(&east.1).directions;
        assert!(dirs.covers(0, Direction::Superior));
        assert!(!dirs.covers(0, Direction::Inferior));
        assert!(!dirs.covers(1, Direction::Inferior));
        assert!(!dirs.covers(1, Direction::Superior));

        // The copy crossing dimension 1 still covers all of dimension 0.
        let north = decision
            .forward
            .iter()
            .find(|(p, _)| p.id() == nw_peer.id())
            .unwrap();
        let dirs = &state_of(&north.1).directions;
        assert!(dirs.covers(0, Direction::Inferior));
        assert!(dirs.covers(0, Direction::Superior));
        assert!(dirs.covers(1, Direction::Superior));
        assert!(!dirs.covers(1, Direction::Inferior));
    }

    #[test]
    fn narrowed_copy_does_not_return_to_the_sender_side() {
        let [sw, se, _, ne] = quadrants();
        let (sw_peer, _a) = detached_peer();
        let (ne_peer, _b) = detached_peer();
        // The south-east peer received a copy covering only x-superior.
        let neighbors = table_for(
            &se,
            &[
                (sw_peer.id(), sw, sw_peer),
                (ne_peer.id(), ne, ne_peer),
            ],
        );
        let ctx = RouterContext {
            id: OverlayId::random(),
            zone: &se,
            neighbors: &neighbors,
        };

        let mut directions = DirectionPlan::full(2);
        directions.clear(0, Direction::Inferior);
        directions.clear(1, Direction::Inferior);
        directions.clear(1, Direction::Superior);
        let request = broadcast(Some(BroadcastState {
            directions,
            plane: None,
        }));

        let decision = decide(&ctx, &request).unwrap();
        // No x-superior neighbor exists and every other direction is
        // covered elsewhere: this peer is a leaf of the dissemination tree.
        assert!(decision.deliver_locally);
        assert!(decision.forward.is_empty());
    }
}
