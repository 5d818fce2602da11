//! Latency-minimizing dissemination.
//!
//! Same coverage contract as the efficient strategy, but dimensions are
//! walked from the lowest up so the tree fans out as early as possible,
//! which minimizes the maximum hop distance from the initiator instead of
//! the message count. Copies carry a split plane anchored at the
//! initiator's lower corner: a neighbor is selected only if its zone
//! contains the plane's value on every still-constrained axis, and the
//! constraint of a dimension is lifted once the tree has fanned out along
//! it.

use std::cmp::Ordering;

use super::super::{copy_for, RouterContext, RoutingDecision};
use crate::message::{BroadcastState, DirectionPlan, RequestMessage, RoutingPlan, SplitPlane};
use crate::neighbor::Direction;
use crate::types::{ZonecastError, ZonecastResult};
use crate::validator;

pub(crate) fn decide(
    ctx: &RouterContext<'_>,
    request: &RequestMessage,
) -> ZonecastResult<RoutingDecision> {
    let RoutingPlan::Broadcast { key, strategy, state } = &request.plan else {
        return Err(ZonecastError::routing("optimal broadcast applied to a non-broadcast plan"));
    };

    let dimensions = ctx.zone.dimensions();
    let (mut directions, mut plane) = match state {
        Some(s) => (
            s.directions.clone(),
            s.plane
                .clone()
                .unwrap_or_else(|| SplitPlane::from_zone(ctx.zone)),
        ),
        // Any point of the initiator's zone works as the anchor; the lower
        // corner is the canonical pick.
        None => (DirectionPlan::full(dimensions), SplitPlane::from_zone(ctx.zone)),
    };

    let mut forward = Vec::new();
    for dimension in 0..dimensions {
        // The sender's position on the dimension being crossed is implied
        // by adjacency, not by the plane.
        plane.clear(dimension);

        for direction in Direction::BOTH {
            if directions.covers(dimension, direction) {
                for neighbor in ctx.neighbors.neighbors_on(dimension, direction) {
                    let selected = (0..dimensions).all(|axis| match plane.value(axis) {
                        // Lifted constraint: the corner rule keeps a single
                        // sender per receiver, as on dimension 0 of the
                        // efficient strategy.
                        None => {
                            axis == dimension
                                || ctx.zone.lower(axis).compare(neighbor.zone.lower(axis))
                                    != Ordering::Greater
                        }
                        Some(value) => {
                            neighbor.zone.contains_on(axis, value) == Ordering::Equal
                        }
                    });
                    if selected {
                        let plan = RoutingPlan::Broadcast {
                            key: key.clone(),
                            strategy: *strategy,
                            state: Some(BroadcastState {
                                directions: directions.for_neighbor(dimension, direction),
                                plane: Some(plane.clone()),
                            }),
                        };
                        forward.push((neighbor.handle.clone(), copy_for(request, plan)));
                    }
                }
            }
            directions.clear(dimension, direction);
        }
    }

    let deliver_locally = validator::validates(&request.plan, ctx.zone);
    tracing::trace!(
        message = %request.id,
        peer = %ctx.id,
        fan_out = forward.len(),
        deliver_locally,
        "optimal broadcast step",
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

    fn broadcast() -> RequestMessage {
        RequestMessage::new(
            RoutingPlan::Broadcast {
                key: Key::wildcard(2),
                strategy: BroadcastStrategy::Optimal,
                state: None,
            },
            RequestAction::Probe,
            true,
        )
    }

    #[test]
    fn initiator_fans_out_along_every_dimension() {
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

        let decision = decide(&ctx, &broadcast()).unwrap();
        assert!(decision.deliver_locally);
        let mut targets: Vec<_> = decision.forward.iter().map(|(p, _)| p.id()).collect();
        targets.sort();
        let mut expected = vec![se_peer.id(), nw_peer.id()];
        expected.sort();
        assert_eq!(targets, expected);
    }

    #[test]
    fn plane_constraint_excludes_neighbors_off_the_anchor_row() {
        // The north-west peer received a copy from the south-west initiator.
        // Its eastern neighbor (north-east) sits off the lifted plane rows,
        // so the corner rule decides: nw.lower(1) = 0.5 <= ne.lower(1) = 0.5
        // selects it exactly once.
        let [sw, _, nw, ne] = quadrants();
        let (sw_peer, _a) = detached_peer();
        let (ne_peer, _b) = detached_peer();
        let neighbors = table_for(
            &nw,
            &[
                (sw_peer.id(), sw.clone(), sw_peer),
                (ne_peer.id(), ne, ne_peer.clone()),
            ],
        );
        let ctx = RouterContext {
            id: OverlayId::random(),
            zone: &nw,
            neighbors: &neighbors,
        };

        // State as handed out by the south-west initiator crossing
        // dimension 1: direction back down is cleared, plane anchored at
        // the initiator's lower corner with dimension 1 lifted.
        let mut directions = DirectionPlan::full(2);
        directions.clear(1, Direction::Inferior);
        let mut plane = SplitPlane::from_zone(&sw);
        plane.clear(1);

        let mut request = broadcast();
        request.plan = RoutingPlan::Broadcast {
            key: Key::wildcard(2),
            strategy: BroadcastStrategy::Optimal,
            state: Some(BroadcastState {
                directions,
                plane: Some(plane),
            }),
        };

        let decision = decide(&ctx, &request).unwrap();
        assert_eq!(decision.forward.len(), 1);
        assert_eq!(decision.forward[0].0.id(), ne_peer.id());
    }
}
