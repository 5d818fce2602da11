//! Baseline dissemination: forward to every matching neighbor not already
//! on the message path.
//!
//! Peers may receive the same broadcast through several paths; the per-peer
//! received set turns repeats into empty responses, so correctness holds at
//! the cost of redundant sends. Kept as the reference the pruned strategies
//! are measured against.

use super::super::{copy_for, RouterContext, RoutingDecision};
use crate::message::{RequestMessage, RoutingPlan};
use crate::types::{ZonecastError, ZonecastResult};
use crate::validator;

pub(crate) fn decide(
    ctx: &RouterContext<'_>,
    request: &RequestMessage,
) -> ZonecastResult<RoutingDecision> {
    let RoutingPlan::Broadcast { key, .. } = &request.plan else {
        return Err(ZonecastError::routing("flooding applied to a non-broadcast plan"));
    };

    let deliver_locally = validator::validates(&request.plan, ctx.zone);
    let forward: Vec<_> = ctx
        .neighbors
        .iter()
        .filter(|(_, _, n)| n.zone.matches_key(key) && !request.visited(n.id))
        .map(|(_, _, n)| (n.handle.clone(), copy_for(request, request.plan.clone())))
        .collect();

    tracing::trace!(
        message = %request.id,
        peer = %ctx.id,
        fan_out = forward.len(),
        deliver_locally,
        "flooding step",
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

    #[test]
    fn forwards_to_every_neighbor_off_the_path() {
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

        let request = RequestMessage::new(
            RoutingPlan::Broadcast {
                key: Key::wildcard(2),
                strategy: BroadcastStrategy::Flooding,
                state: None,
            },
            RequestAction::Probe,
            true,
        );
        let decision = decide(&ctx, &request).unwrap();
        assert!(decision.deliver_locally);
        assert_eq!(decision.forward.len(), 2);

        // A neighbor already on the reverse path is skipped.
        let mut seen = request.clone();
        seen.reverse_path.push(crate::message::ReversePathEntry {
            id: nw_peer.id(),
            zone_lower: sw.lower_bound().clone(),
            stub: nw_peer,
        });
        let decision = decide(&ctx, &seen).unwrap();
        assert_eq!(decision.forward.len(), 1);
        assert_eq!(decision.forward[0].0.id(), se_peer.id());
    }
}
