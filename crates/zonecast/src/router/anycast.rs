//! Region routing: reach the region selected by a key, then fan out inside
//! it to every peer matching the key.
//!
//! Outside the region the message travels like a unicast towards it. Inside,
//! each peer is a destination and forwards to every matching neighbor not
//! already recorded on the message path. Per-peer duplicate suppression is
//! done by the peer task, which answers repeats with an empty response.

use zonecast_geometry::Key;

use super::{copy_for, missed_dimension, nearest_neighbor, RouterContext, RoutingDecision};
use crate::message::{RequestMessage, RoutingPlan};
use crate::types::ZonecastResult;
use crate::validator;

pub(crate) fn decide(
    ctx: &RouterContext<'_>,
    request: &RequestMessage,
    key: &Key,
) -> ZonecastResult<RoutingDecision> {
    if validator::validates(&request.plan, ctx.zone) {
        // Skipping neighbors already on the path avoids a send that would
        // only come back as a duplicate.
        let forward: Vec<_> = ctx
            .neighbors
            .iter()
            .filter(|(_, _, n)| n.zone.matches_key(key) && !request.visited(n.id))
            .map(|(_, _, n)| {
                (
                    n.handle.clone(),
                    copy_for(request, RoutingPlan::Anycast { key: key.clone() }),
                )
            })
            .collect();

        tracing::trace!(
            message = %request.id,
            peer = %ctx.id,
            fan_out = forward.len(),
            "anycast inside target region",
        );
        return Ok(RoutingDecision {
            deliver_locally: true,
            forward,
        });
    }

    // Not in the region yet: greedy step towards it.
    let (dimension, direction) = missed_dimension(ctx.zone, key).ok_or_else(|| {
        crate::types::ZonecastError::routing(format!(
            "zone {} neither matches key {key} nor misses it on any dimension",
            ctx.zone,
        ))
    })?;
    let next = nearest_neighbor(ctx, key, dimension, direction)?;
    tracing::trace!(
        message = %request.id,
        peer = %ctx.id,
        next = %next.id,
        "anycast step towards region",
    );

    let copy = copy_for(request, RoutingPlan::Anycast { key: key.clone() });
    Ok(RoutingDecision {
        deliver_locally: false,
        forward: vec![(next.handle.clone(), copy)],
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use zonecast_geometry::Element;

    use super::super::test_support::{detached_peer, quadrants, table_for};
    use super::*;
    use crate::message::RequestAction;
    use crate::types::OverlayId;

    // Key pinning dimension 1 to 0.25: selects the southern half.
    fn southern_key() -> Key {
        Key::wildcard(2).with_element(1, Element::Numeric(0.25))
    }

    #[test]
    fn fans_out_to_matching_neighbors_only() {
        let [sw, se, nw, _] = quadrants();
        let (se_peer, _a) = detached_peer();
        let (nw_peer, _b) = detached_peer();
        let neighbors = table_for(
            &sw,
            &[
                (se_peer.id(), se, se_peer.clone()),
                (nw_peer.id(), nw, nw_peer),
            ],
        );
        let ctx = RouterContext {
            id: OverlayId::random(),
            zone: &sw,
            neighbors: &neighbors,
        };

        let key = southern_key();
        let request = RequestMessage::new(
            RoutingPlan::Anycast { key: key.clone() },
            RequestAction::Probe,
            true,
        );
        let decision = decide(&ctx, &request, &key).unwrap();
        assert!(decision.deliver_locally);
        // Only the south-east neighbor matches; the northern one is outside
        // the region.
        assert_eq!(decision.forward.len(), 1);
        assert_eq!(decision.forward[0].0.id(), se_peer.id());
    }

    #[test]
    fn routes_towards_the_region_when_outside() {
        let [sw, se, nw, _] = quadrants();
        let (sw_peer, _a) = detached_peer();
        let (se_peer, _b) = detached_peer();
        let neighbors = table_for(
            &nw,
            &[
                (sw_peer.id(), sw, sw_peer.clone()),
                (se_peer.id(), se, se_peer),
            ],
        );
        let ctx = RouterContext {
            id: OverlayId::random(),
            zone: &nw,
            neighbors: &neighbors,
        };

        let key = southern_key();
        let request = RequestMessage::new(
            RoutingPlan::Anycast { key: key.clone() },
            RequestAction::Probe,
            true,
        );
        let decision = decide(&ctx, &request, &key).unwrap();
        assert!(!decision.deliver_locally);
        assert_eq!(decision.forward.len(), 1);
        assert_eq!(decision.forward[0].0.id(), sw_peer.id());
    }
}
