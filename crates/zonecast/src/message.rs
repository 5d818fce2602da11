//! Request, response and control message types exchanged between peers.
//!
//! Messages are in-process values moved over channels. They carry live peer
//! handles rather than addresses, so none of them is serialized.

use zonecast_geometry::{Coordinate, Element, Key, Zone};

use crate::config::BroadcastStrategy;
use crate::handler::DataItem;
use crate::neighbor::Direction;
use crate::peer::{Peer, PeerRef};
use crate::types::{MaintenanceId, MessageId, OverlayId};

/// One hop of the path a request took away from its initiator.
///
/// Responses walk this path in reverse: each entry is popped by the peer it
/// names, which merges the sub-responses it expects before forwarding the
/// aggregate to the next entry down.
#[derive(Debug, Clone)]
pub struct ReversePathEntry {
    /// The peer that forwarded the request.
    pub id: OverlayId,
    /// Lower bound of that peer's zone when it forwarded, for tracing the
    /// path a message took through the space.
    pub zone_lower: Coordinate,
    /// Handle to route the response back through.
    pub stub: Peer,
}

/// What a peer reaching its destination state does with the request.
#[derive(Debug, Clone)]
pub enum RequestAction {
    /// Hand the item to the local data handler.
    Store(DataItem),
    /// Collect the locally stored items matching the request key.
    Retrieve,
    /// Remove and return the locally stored items matching the request key.
    Remove,
    /// Do nothing but report the local peer in the response. Used to probe
    /// reachability and coverage.
    Probe,
}

/// Per-dimension, per-direction flags telling a peer which part of the space
/// it is responsible for covering while propagating a broadcast.
///
/// A cleared flag means some other branch of the dissemination tree already
/// covers that direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectionPlan {
    // flags[dimension][direction.index()]
    flags: Vec<[bool; 2]>,
}

impl DirectionPlan {
    /// The initiator covers every direction of every dimension.
    pub fn full(dimensions: usize) -> Self {
        Self {
            flags: vec![[true, true]; dimensions],
        }
    }

    /// Whether this peer still has to cover the given direction.
    pub fn covers(&self, dimension: usize, direction: Direction) -> bool {
        self.flags[dimension][direction.index()]
    }

    /// Mark a direction as handled.
    pub fn clear(&mut self, dimension: usize, direction: Direction) {
        self.flags[dimension][direction.index()] = false;
    }

    /// A copy with the opposite of `(dimension, direction)` cleared, handed
    /// to a neighbor so it does not send the message back.
    pub fn for_neighbor(&self, dimension: usize, direction: Direction) -> Self {
        let mut plan = self.clone();
        plan.clear(dimension, direction.opposite());
        plan
    }
}

/// Constraint coordinates carried by the latency-optimized broadcast.
///
/// Starts as the initiator's lower bound; each traversed dimension is blanked
/// out as the dissemination tree fans out along it.
#[derive(Debug, Clone)]
pub struct SplitPlane {
    values: Vec<Option<Element>>,
}

impl SplitPlane {
    /// The plane anchored at the initiator's zone.
    pub fn from_zone(zone: &Zone) -> Self {
        Self {
            values: zone.lower_bound().iter().map(|e| Some(e.clone())).collect(),
        }
    }

    /// The constraint on `dimension`, if still active.
    pub fn value(&self, dimension: usize) -> Option<&Element> {
        self.values[dimension].as_ref()
    }

    /// Deactivate the constraint on a traversed dimension.
    pub fn clear(&mut self, dimension: usize) {
        self.values[dimension] = None;
    }
}

/// Broadcast propagation state, absent on the initiator's first step.
#[derive(Debug, Clone)]
pub struct BroadcastState {
    /// Directions this peer must still cover.
    pub directions: DirectionPlan,
    /// Optimal strategy only.
    pub plane: Option<SplitPlane>,
}

/// How a request travels through the overlay.
#[derive(Debug, Clone)]
pub enum RoutingPlan {
    /// Greedy geometric routing towards the single peer owning `target`.
    Unicast {
        /// The point to reach.
        target: Coordinate,
    },
    /// Routed towards the region selected by `key`; forwarded inside it to
    /// every peer matching the key.
    Anycast {
        /// Region selector; wildcard axes impose no constraint.
        key: Key,
    },
    /// One-to-many dissemination over the region selected by `key`.
    Broadcast {
        /// Region selector.
        key: Key,
        /// Strategy stamped by the initiator so every hop fans out the same
        /// way.
        strategy: BroadcastStrategy,
        /// Propagation state. `None` until the initiator computes it.
        state: Option<BroadcastState>,
    },
}

impl RoutingPlan {
    /// The region selector of this plan.
    pub fn key(&self) -> Key {
        match self {
            RoutingPlan::Unicast { target } => Key::from(target.clone()),
            RoutingPlan::Anycast { key } => key.clone(),
            RoutingPlan::Broadcast { key, .. } => key.clone(),
        }
    }
}

/// A routed application request.
#[derive(Debug, Clone)]
pub struct RequestMessage {
    /// Exchange identifier, stable across every hop and copy.
    pub id: MessageId,
    /// How the request travels.
    pub plan: RoutingPlan,
    /// What destination peers do with it.
    pub action: RequestAction,
    /// Whether the initiator waits for a merged response.
    pub expects_response: bool,
    /// Hops taken so far.
    pub hop_count: u32,
    /// Peers that fanned this request out, closest-to-initiator first.
    pub reverse_path: Vec<ReversePathEntry>,
}

impl RequestMessage {
    /// Build a request at its initiator.
    pub fn new(plan: RoutingPlan, action: RequestAction, expects_response: bool) -> Self {
        Self {
            id: MessageId::random(),
            plan,
            action,
            expects_response,
            hop_count: 0,
            reverse_path: Vec::new(),
        }
    }

    /// Record one more hop.
    pub fn increment_hop_count(&mut self) {
        self.hop_count += 1;
    }

    /// Whether `id` already forwarded this request.
    pub fn visited(&self, id: OverlayId) -> bool {
        self.reverse_path.iter().any(|e| e.id == id)
    }
}

/// Partial results folded together while responses travel back to the
/// initiator.
#[derive(Debug, Clone, Default)]
pub struct Aggregate {
    /// Data items collected at destination peers.
    pub items: Vec<DataItem>,
    /// Peers that handled the request at destination.
    pub handled_by: Vec<PeerRef>,
}

impl Aggregate {
    /// The empty aggregate, sent back by peers that only routed the message
    /// or received a duplicate.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Fold `other` into `self`. Union on both components, so the fold is
    /// associative and insensitive to arrival order.
    pub fn merge(&mut self, other: Aggregate) {
        self.items.extend(other.items);
        for peer in other.handled_by {
            if !self.handled_by.iter().any(|existing| existing.id == peer.id) {
                self.handled_by.push(peer);
            }
        }
    }
}

/// A response travelling back along the reverse path of its request.
#[derive(Debug, Clone)]
pub struct ResponseMessage {
    /// Identifier of the request this responds to.
    pub id: MessageId,
    /// Hops taken by the request when it reached the responding peer, plus
    /// the hops taken by the response so far.
    pub hop_count: u32,
    /// Remaining upstream path. The peer named by the last entry pops it and
    /// merges this response.
    pub reverse_path: Vec<ReversePathEntry>,
    /// Merged results so far.
    pub aggregate: Aggregate,
}

impl ResponseMessage {
    /// Record one more hop on the return trip.
    pub fn increment_hop_count(&mut self) {
        self.hop_count += 1;
    }
}

/// Mutual-exclusion protocol messages.
#[derive(Debug, Clone)]
pub enum MutexMessage {
    /// Ask for the critical section guarding `maintenance`.
    Request {
        /// The topology operation the critical section guards.
        maintenance: MaintenanceId,
        /// Requester's logical sequence number.
        sequence: u64,
        /// Requester's identity, the tie-break on equal sequence numbers.
        from: OverlayId,
        /// Where the reply goes.
        reply_to: Peer,
    },
    /// Grant the critical section to the peer this is sent to.
    Reply {
        /// The operation the reply refers to.
        maintenance: MaintenanceId,
        /// Replying peer.
        from: OverlayId,
    },
}
