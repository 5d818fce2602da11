//! Greedy geometric routing towards the single peer owning a point.
//!
//! Each hop moves the message to the neighbor closest to the target on the
//! first dimension where the local zone misses it. With a consistent
//! neighbor table every hop strictly shrinks the remaining distance, so the
//! walk terminates without duplication.

use zonecast_geometry::{Coordinate, Key};

use super::{copy_for, missed_dimension, nearest_neighbor, RouterContext, RoutingDecision};
use crate::message::{RequestMessage, RoutingPlan};
use crate::types::ZonecastResult;
use crate::validator;

pub(crate) fn decide(
    ctx: &RouterContext<'_>,
    request: &RequestMessage,
    target: Coordinate,
) -> ZonecastResult<RoutingDecision> {
    if validator::validates(&request.plan, ctx.zone) {
        tracing::debug!(
            message = %request.id,
            peer = %ctx.id,
            "unicast reached the peer owning its target",
        );
        return Ok(RoutingDecision::destination());
    }

    let key = Key::from(target.clone());
    let (dimension, direction) = missed_dimension(ctx.zone, &key).ok_or_else(|| {
        // contains() said no but every axis matched: the table and zone
        // disagree, which only a topology violation explains.
        crate::types::ZonecastError::routing(format!(
            "zone {} rejects target {target} without missing it on any dimension",
            ctx.zone,
        ))
    })?;

    let next = nearest_neighbor(ctx, &key, dimension, direction)?;
    tracing::trace!(
        message = %request.id,
        peer = %ctx.id,
        next = %next.id,
        dimension,
        direction = %direction,
        "unicast step",
    );

    let copy = copy_for(request, RoutingPlan::Unicast { target });
    Ok(RoutingDecision {
        deliver_locally: false,
        forward: vec![(next.handle.clone(), copy)],
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::super::test_support::{detached_peer, point, quadrants, table_for};
    use super::*;
    use crate::message::RequestAction;
    use crate::types::OverlayId;

    #[test]
    fn owning_peer_is_destination() {
        let [sw, ..] = quadrants();
        let ctx = RouterContext {
            id: OverlayId::random(),
            zone: &sw,
            neighbors: &crate::neighbor::NeighborTable::new(2),
        };
        let request = RequestMessage::new(
            RoutingPlan::Unicast {
                target: point(0.1, 0.1),
            },
            RequestAction::Probe,
            false,
        );
        let decision = decide(&ctx, &request, point(0.1, 0.1)).unwrap();
        assert!(decision.deliver_locally);
        assert!(decision.forward.is_empty());
    }

    #[test]
    fn steps_towards_the_target_on_the_first_missed_dimension() {
        let [sw, se, nw, _] = quadrants();
        let (se_peer, _se_rx) = detached_peer();
        let (nw_peer, _nw_rx) = detached_peer();
        let neighbors = table_for(
            &sw,
            &[
                (se_peer.id(), se.clone(), se_peer.clone()),
                (nw_peer.id(), nw.clone(), nw_peer),
            ],
        );
        let ctx = RouterContext {
            id: OverlayId::random(),
            zone: &sw,
            neighbors: &neighbors,
        };

        // Target in the south-east quadrant: dimension 0 misses first.
        let request = RequestMessage::new(
            RoutingPlan::Unicast {
                target: point(0.9, 0.1),
            },
            RequestAction::Probe,
            true,
        );
        let decision = decide(&ctx, &request, point(0.9, 0.1)).unwrap();
        assert!(!decision.deliver_locally);
        assert_eq!(decision.forward.len(), 1);
        assert_eq!(decision.forward[0].0.id(), se_peer.id());
        assert_eq!(decision.forward[0].1.hop_count, 1);
    }

    #[test]
    fn missing_neighbor_is_a_routing_error() {
        let [sw, ..] = quadrants();
        let ctx = RouterContext {
            id: OverlayId::random(),
            zone: &sw,
            neighbors: &crate::neighbor::NeighborTable::new(2),
        };
        let request = RequestMessage::new(
            RoutingPlan::Unicast {
                target: point(0.9, 0.9),
            },
            RequestAction::Probe,
            false,
        );
        let err = decide(&ctx, &request, point(0.9, 0.9)).unwrap_err();
        assert!(matches!(err, crate::types::ZonecastError::Routing(_)));
    }
}
