//! The task behind a peer handle.
//!
//! Owns the zone, the neighbor table and all response bookkeeping; nothing
//! else mutates them. Long-running protocol work (critical-section
//! acquisition, the join handshake) runs in helper tasks that feed their
//! outcome back through the control channel, so the actor itself never
//! suspends on a remote peer while holding its state.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use rand::Rng;
use tokio::sync::oneshot;
use zonecast_geometry::{Coordinate, Element, ElementKind, SpaceDescriptor, StrElement, Zone};

use super::{InboxReceivers, Peer, PeerRef, PeerSnapshot};
use crate::handler::{DataItem, SharedDataHandler, SharedResponseProvider};
use crate::message::{
    Aggregate, MutexMessage, RequestMessage, ResponseMessage, ReversePathEntry, RoutingPlan,
};
use crate::mutex::RicartAgrawala;
use crate::neighbor::{NeighborEntry, NeighborTable, NeighborView};
use crate::reply::{ReplySink, ResponseTable};
use crate::router::{self, RouterContext};
use crate::types::{MaintenanceId, MessageId, OverlayId, ZonecastError, ZonecastResult};

/// Application traffic.
#[derive(Debug)]
pub(crate) enum AppMessage {
    /// A request initiated at this peer by a local caller.
    Initiate {
        request: RequestMessage,
        reply: Option<oneshot::Sender<ZonecastResult<ResponseMessage>>>,
    },
    /// A request routed here by another peer.
    Request(RequestMessage),
    /// A sub-response travelling back up a reverse path.
    Response(ResponseMessage),
}

/// Control traffic, always served before application traffic.
#[derive(Debug)]
pub(crate) enum CtlMessage {
    /// Mutual-exclusion protocol message.
    Mutex(MutexMessage),
    /// Become the first peer of a new overlay.
    Create {
        reply: oneshot::Sender<ZonecastResult<()>>,
    },
    /// Join the overlay `landmark` belongs to.
    Join {
        landmark: Peer,
        reply: oneshot::Sender<ZonecastResult<()>>,
    },
    /// Leave the overlay.
    Leave {
        reply: oneshot::Sender<ZonecastResult<()>>,
    },
    /// A newcomer asks this peer to split its zone and host it.
    JoinIntroduce {
        newcomer: Peer,
        reply: oneshot::Sender<ZonecastResult<Welcome>>,
    },
    /// Critical section granted: perform the split for `newcomer`.
    ApplySplit {
        maintenance: MaintenanceId,
        newcomer: Peer,
        reply: oneshot::Sender<ZonecastResult<Welcome>>,
    },
    /// Adopt the state handed over by the peer that hosted our join.
    ApplyWelcome {
        welcome: Welcome,
        reply: oneshot::Sender<ZonecastResult<()>>,
    },
    /// Critical section granted: donate zone and data and withdraw.
    ApplyLeave {
        maintenance: MaintenanceId,
        reply: oneshot::Sender<ZonecastResult<()>>,
    },
    /// Take over a leaving sibling's zone, data and neighbor relationships.
    Absorb {
        maintenance: MaintenanceId,
        from: OverlayId,
        zone: Zone,
        data: Vec<DataItem>,
        neighbors: Vec<PeerRef>,
    },
    /// A neighbor's zone changed.
    ZoneUpdate {
        maintenance: MaintenanceId,
        peer: PeerRef,
    },
    /// A peer entered the neighborhood.
    NeighborJoined {
        maintenance: MaintenanceId,
        peer: PeerRef,
    },
    /// A neighbor left, replaced by `successor` over its former zone.
    NeighborLeft {
        maintenance: MaintenanceId,
        from: OverlayId,
        successor: PeerRef,
    },
    /// Read-only state snapshot.
    Snapshot {
        reply: oneshot::Sender<PeerSnapshot>,
    },
    /// Drop the pending exchange `id`.
    Abandon { id: MessageId },
    /// Stop the peer task.
    Shutdown,
}

/// Everything a newcomer needs to start serving its half of a split zone.
#[derive(Debug)]
pub(crate) struct Welcome {
    pub(crate) maintenance: MaintenanceId,
    pub(crate) zone: Zone,
    pub(crate) split_history: Vec<usize>,
    pub(crate) neighbors: Vec<PeerRef>,
    pub(crate) data: Vec<DataItem>,
}

pub(crate) fn spawn(
    stub: Peer,
    inbox: InboxReceivers,
    handler: SharedDataHandler,
    provider: SharedResponseProvider,
) {
    let dimensions = stub.config().space.dimensions();
    let actor = PeerActor {
        mutex: Arc::new(RicartAgrawala::new(stub.id())),
        stub,
        zone: None,
        neighbors: NeighborTable::new(dimensions),
        split_history: Vec::new(),
        received: HashSet::new(),
        responses: ResponseTable::new(),
        handler,
        provider,
        maintenance_in_flight: None,
    };
    tokio::spawn(run(actor, inbox));
}

struct PeerActor {
    stub: Peer,
    zone: Option<Zone>,
    neighbors: NeighborTable,
    split_history: Vec<usize>,
    // Ids of non-unicast requests already served. Never evicted: the peer
    // trades memory growth over its lifetime for exact duplicate
    // suppression.
    received: HashSet<MessageId>,
    responses: ResponseTable,
    mutex: Arc<RicartAgrawala>,
    handler: SharedDataHandler,
    provider: SharedResponseProvider,
    maintenance_in_flight: Option<MaintenanceId>,
}

async fn run(mut actor: PeerActor, mut inbox: InboxReceivers) {
    tracing::debug!(peer = %actor.id(), "peer task started");
    loop {
        tokio::select! {
            biased;
            ctl = inbox.ctl.recv() => match ctl {
                Some(CtlMessage::Shutdown) | None => break,
                Some(msg) => actor.handle_ctl(msg).await,
            },
            app = inbox.app.recv() => match app {
                Some(msg) => actor.handle_app(msg).await,
                None => break,
            },
        }
    }
    tracing::debug!(peer = %actor.id(), "peer task stopped");
}

impl PeerActor {
    fn id(&self) -> OverlayId {
        self.stub.id()
    }

    fn peer_ref(&self, zone: &Zone) -> PeerRef {
        PeerRef {
            id: self.id(),
            zone: zone.clone(),
            stub: self.stub.clone(),
        }
    }

    async fn handle_app(&mut self, msg: AppMessage) {
        match msg {
            AppMessage::Initiate { request, mut reply } => {
                let id = request.id;
                if let Err(e) = self.process_request(request, &mut reply).await {
                    match reply.take() {
                        Some(tx) => {
                            let _ = tx.send(Err(e));
                        }
                        None => {
                            tracing::error!(peer = %self.id(), message = %id, error = %e, "failed to initiate request");
                        }
                    }
                }
            }
            AppMessage::Request(request) => {
                let id = request.id;
                if let Err(e) = self.process_request(request, &mut None).await {
                    tracing::error!(peer = %self.id(), message = %id, error = %e, "failed to route request");
                }
            }
            AppMessage::Response(response) => self.handle_response(response).await,
        }
    }

    /// Route one inbound request. `origin` is the local caller's reply slot
    /// when this peer initiated the request.
    async fn process_request(
        &mut self,
        request: RequestMessage,
        origin: &mut Option<oneshot::Sender<ZonecastResult<ResponseMessage>>>,
    ) -> ZonecastResult<()> {
        let zone = self
            .zone
            .clone()
            .ok_or(ZonecastError::PeerNotActive(self.id()))?;

        // Region-routed messages may reach a peer through several paths.
        // The first receipt wins; repeats only feed the sender's reply
        // bookkeeping with an empty sub-response.
        if !matches!(request.plan, RoutingPlan::Unicast { .. })
            && !self.received.insert(request.id)
        {
            tracing::debug!(
                peer = %self.id(),
                message = %request.id,
                "request already received, answering empty",
            );
            if request.expects_response {
                self.route_response_upstream(ResponseMessage {
                    id: request.id,
                    hop_count: request.hop_count,
                    reverse_path: request.reverse_path,
                    aggregate: Aggregate::empty(),
                })
                .await;
            }
            return Ok(());
        }

        let decision = {
            let ctx = RouterContext {
                id: self.id(),
                zone: &zone,
                neighbors: &self.neighbors,
            };
            router::decide(&ctx, &request)?
        };

        let local = if decision.deliver_locally {
            Some(
                self.provider
                    .provide(&request, self.peer_ref(&zone), self.handler.as_ref()),
            )
        } else {
            None
        };

        if decision.forward.is_empty() {
            // Destination leaf: the local contribution is the whole
            // sub-response.
            if request.expects_response {
                let response = ResponseMessage {
                    id: request.id,
                    hop_count: request.hop_count,
                    reverse_path: request.reverse_path,
                    aggregate: local.unwrap_or_else(Aggregate::empty),
                };
                match origin.take() {
                    Some(tx) => {
                        let _ = tx.send(Ok(response));
                    }
                    None => self.route_response_upstream(response).await,
                }
            }
            return Ok(());
        }

        if request.expects_response {
            let entry = ReversePathEntry {
                id: self.id(),
                zone_lower: zone.lower_bound().clone(),
                stub: self.stub.clone(),
            };
            let sink = match origin.take() {
                Some(tx) => ReplySink::Origin(tx),
                None => ReplySink::Upstream,
            };
            self.responses.expect(
                request.id,
                decision.forward.len(),
                local.unwrap_or_else(Aggregate::empty),
                sink,
            );
            for (peer, mut copy) in decision.forward {
                copy.reverse_path.push(entry.clone());
                if let Err(e) = peer.deliver(copy).await {
                    // No automatic retry: the entry stays unsatisfied until
                    // the caller abandons it.
                    tracing::warn!(peer = %self.id(), error = %e, "forwarding step failed");
                }
            }
        } else {
            for (peer, copy) in decision.forward {
                if let Err(e) = peer.deliver(copy).await {
                    tracing::warn!(peer = %self.id(), error = %e, "forwarding step failed");
                }
            }
        }
        Ok(())
    }

    async fn handle_response(&mut self, response: ResponseMessage) {
        if let Some((sink, merged)) = self.responses.merge(&self.provider, response) {
            match sink {
                ReplySink::Origin(tx) => {
                    let _ = tx.send(Ok(merged));
                }
                ReplySink::Upstream => self.route_response_upstream(merged).await,
            }
        }
    }

    /// Send `response` to the last peer on its reverse path.
    async fn route_response_upstream(&self, mut response: ResponseMessage) {
        let Some(entry) = response.reverse_path.pop() else {
            tracing::error!(
                peer = %self.id(),
                message = %response.id,
                "response completed with an empty reverse path and no local origin",
            );
            return;
        };
        response.increment_hop_count();
        if let Err(e) = entry.stub.respond(response).await {
            tracing::warn!(peer = %self.id(), upstream = %entry.id, error = %e, "response return failed");
        }
    }

    async fn handle_ctl(&mut self, msg: CtlMessage) {
        match msg {
            CtlMessage::Mutex(MutexMessage::Request {
                maintenance,
                sequence,
                from,
                reply_to,
            }) => {
                if let Some((peer, reply)) =
                    self.mutex.on_request(maintenance, sequence, from, reply_to)
                {
                    if let Err(e) = peer.control(CtlMessage::Mutex(reply)).await {
                        tracing::warn!(peer = %self.id(), error = %e, "mutex reply failed");
                    }
                }
            }
            CtlMessage::Mutex(MutexMessage::Reply { maintenance, from }) => {
                self.mutex.on_reply(maintenance, from);
            }
            CtlMessage::Create { reply } => {
                let result = if self.zone.is_some() {
                    Err(ZonecastError::other("peer already owns a zone"))
                } else {
                    let zone = Zone::full(&self.stub.config().space);
                    tracing::info!(peer = %self.id(), zone = %zone, "created overlay");
                    self.zone = Some(zone);
                    Ok(())
                };
                let _ = reply.send(result);
            }
            CtlMessage::Join { landmark, reply } => self.start_join(landmark, reply),
            CtlMessage::Leave { reply } => self.start_leave(reply).await,
            CtlMessage::JoinIntroduce { newcomer, reply } => {
                self.start_introduce(newcomer, reply);
            }
            CtlMessage::ApplySplit {
                maintenance,
                newcomer,
                reply,
            } => self.apply_split(maintenance, newcomer, reply).await,
            CtlMessage::ApplyWelcome { welcome, reply } => {
                let _ = reply.send(self.apply_welcome(welcome));
            }
            CtlMessage::ApplyLeave { maintenance, reply } => {
                self.apply_leave(maintenance, reply).await;
            }
            CtlMessage::Absorb {
                maintenance,
                from,
                zone,
                data,
                neighbors,
            } => self.absorb(maintenance, from, zone, data, neighbors).await,
            CtlMessage::ZoneUpdate { maintenance, peer } => {
                self.neighbor_changed(maintenance, peer);
            }
            CtlMessage::NeighborJoined { maintenance, peer } => {
                self.neighbor_changed(maintenance, peer);
            }
            CtlMessage::NeighborLeft {
                maintenance,
                from,
                successor,
            } => {
                self.neighbors.remove(from, maintenance);
                self.neighbor_changed(maintenance, successor);
            }
            CtlMessage::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            CtlMessage::Abandon { id } => {
                self.responses.abandon(id);
            }
            // Shutdown is consumed by the run loop.
            CtlMessage::Shutdown => {}
        }
    }

    /// Record a neighbor's new zone, adding or dropping the relationship as
    /// the geometry dictates.
    fn neighbor_changed(&mut self, maintenance: MaintenanceId, peer: PeerRef) {
        let Some(zone) = self.zone.clone() else {
            return;
        };
        if peer.id == self.id() {
            return;
        }
        if self.neighbors.update(peer.id, peer.zone.clone(), maintenance) {
            self.neighbors.remove_outdated(&zone);
        } else {
            self.neighbors.insert_by_geometry(
                &zone,
                NeighborEntry::new(peer.id, peer.zone, peer.stub),
                maintenance,
            );
        }
    }

    fn snapshot(&self) -> PeerSnapshot {
        PeerSnapshot {
            id: self.id(),
            zone: self.zone.clone(),
            neighbors: self
                .neighbors
                .iter()
                .map(|(dimension, direction, e)| NeighborView {
                    id: e.id,
                    dimension,
                    direction,
                    zone: e.zone.clone(),
                })
                .collect(),
            pending_responses: self.responses.pending(),
            maintenance_in_flight: self.maintenance_in_flight.is_some(),
            split_history: self.split_history.clone(),
        }
    }

    fn start_join(&self, landmark: Peer, reply: oneshot::Sender<ZonecastResult<()>>) {
        if self.zone.is_some() {
            let _ = reply.send(Err(ZonecastError::other("peer already part of an overlay")));
            return;
        }
        let stub = self.stub.clone();
        tokio::spawn(async move {
            let space = stub.config().space.clone();
            let outcome = match join_protocol(&stub, &landmark, &space).await {
                Ok(welcome) => {
                    let (tx, rx) = oneshot::channel();
                    match stub
                        .control(CtlMessage::ApplyWelcome { welcome, reply: tx })
                        .await
                    {
                        Ok(()) => rx
                            .await
                            .unwrap_or_else(|_| Err(ZonecastError::Transport(stub.id()))),
                        Err(e) => Err(e),
                    }
                }
                Err(e) => Err(e),
            };
            let _ = reply.send(outcome);
        });
    }

    fn start_introduce(&mut self, newcomer: Peer, reply: oneshot::Sender<ZonecastResult<Welcome>>) {
        if self.zone.is_none() {
            let _ = reply.send(Err(ZonecastError::PeerNotActive(self.id())));
            return;
        }
        if let Some(inflight) = self.maintenance_in_flight {
            let _ = reply.send(Err(ZonecastError::ConcurrentMaintenance(inflight)));
            return;
        }
        let maintenance = MaintenanceId::random();
        self.maintenance_in_flight = Some(maintenance);
        self.acquire_then(
            maintenance,
            CtlMessage::ApplySplit {
                maintenance,
                newcomer,
                reply,
            },
        );
    }

    async fn start_leave(&mut self, reply: oneshot::Sender<ZonecastResult<()>>) {
        let Some(zone) = self.zone.clone() else {
            let _ = reply.send(Err(ZonecastError::PeerNotActive(self.id())));
            return;
        };
        if let Some(inflight) = self.maintenance_in_flight {
            let _ = reply.send(Err(ZonecastError::ConcurrentMaintenance(inflight)));
            return;
        }
        if self.neighbors.is_empty() {
            // Last peer standing: the overlay dissolves with it.
            tracing::info!(peer = %self.id(), "left as the last peer of the overlay");
            self.zone = None;
            self.split_history.clear();
            let _ = reply.send(Ok(()));
            return;
        }
        if self.neighbors.mergeable_neighbor(&zone).is_none() {
            let _ = reply.send(Err(ZonecastError::NoMergeableNeighbor(Arc::new(zone))));
            return;
        }
        let maintenance = MaintenanceId::random();
        self.maintenance_in_flight = Some(maintenance);
        self.acquire_then(maintenance, CtlMessage::ApplyLeave { maintenance, reply });
    }

    /// Win the critical section against the current neighborhood, then feed
    /// `then` back to the actor.
    fn acquire_then(&self, maintenance: MaintenanceId, then: CtlMessage) {
        let participants: Vec<(OverlayId, Peer)> = self
            .neighbors
            .iter()
            .map(|(_, _, e)| (e.id, e.handle.clone()))
            .collect();
        let mutex = self.mutex.clone();
        let stub = self.stub.clone();
        tokio::spawn(async move {
            for (peer, msg) in mutex.begin_request(maintenance, stub.clone(), &participants) {
                if let Err(e) = peer.control(CtlMessage::Mutex(msg)).await {
                    tracing::warn!(peer = %stub.id(), error = %e, "mutex request failed");
                }
            }
            mutex.wait_granted(maintenance).await;
            if stub.control(then).await.is_err() {
                tracing::warn!(peer = %stub.id(), "peer task gone before maintenance completed");
            }
        });
    }

    /// Release the critical section and flush deferred replies.
    async fn finish_maintenance(&mut self, maintenance: MaintenanceId) {
        self.maintenance_in_flight = None;
        for (peer, msg) in self.mutex.release(maintenance) {
            if let Err(e) = peer.control(CtlMessage::Mutex(msg)).await {
                tracing::warn!(peer = %self.id(), error = %e, "deferred mutex reply failed");
            }
        }
    }

    async fn apply_split(
        &mut self,
        maintenance: MaintenanceId,
        newcomer: Peer,
        reply: oneshot::Sender<ZonecastResult<Welcome>>,
    ) {
        let Some(zone) = self.zone.clone() else {
            let _ = reply.send(Err(ZonecastError::PeerNotActive(self.id())));
            self.finish_maintenance(maintenance).await;
            return;
        };

        let dimension = self.split_history.len() % zone.dimensions();
        let (kept, donated) = match zone.split(dimension) {
            Ok(halves) => halves,
            Err(e) => {
                let _ = reply.send(Err(e.into()));
                self.finish_maintenance(maintenance).await;
                return;
            }
        };
        tracing::info!(
            peer = %self.id(),
            newcomer = %newcomer.id(),
            dimension,
            kept = %kept,
            donated = %donated,
            "splitting zone for a joining peer",
        );

        self.split_history.push(dimension);
        let data = self.handler.remove_data_in(&donated);

        // The newcomer inherits the relationships adjoining its half, plus
        // this peer across the split plane.
        let mut handed_over: Vec<PeerRef> = self
            .neighbors
            .iter()
            .filter(|(_, _, e)| donated.neighbor_dimension(&e.zone).is_some())
            .map(|(_, _, e)| PeerRef {
                id: e.id,
                zone: e.zone.clone(),
                stub: e.handle.clone(),
            })
            .collect();
        handed_over.push(self.peer_ref(&kept));

        let former: Vec<Peer> = self.neighbors.iter().map(|(_, _, e)| e.handle.clone()).collect();

        self.zone = Some(kept.clone());
        self.neighbors.remove_outdated(&kept);
        self.neighbors.insert_by_geometry(
            &kept,
            NeighborEntry::new(newcomer.id(), donated.clone(), newcomer.clone()),
            maintenance,
        );

        let newcomer_ref = PeerRef {
            id: newcomer.id(),
            zone: donated.clone(),
            stub: newcomer,
        };
        let kept_ref = self.peer_ref(&kept);
        join_all(former.into_iter().map(|peer| {
            let update = kept_ref.clone();
            let joined = newcomer_ref.clone();
            async move {
                let _ = peer
                    .control(CtlMessage::ZoneUpdate {
                        maintenance,
                        peer: update,
                    })
                    .await;
                let _ = peer
                    .control(CtlMessage::NeighborJoined {
                        maintenance,
                        peer: joined,
                    })
                    .await;
            }
        }))
        .await;

        let _ = reply.send(Ok(Welcome {
            maintenance,
            zone: donated,
            split_history: self.split_history.clone(),
            neighbors: handed_over,
            data,
        }));
        self.finish_maintenance(maintenance).await;
    }

    fn apply_welcome(&mut self, welcome: Welcome) -> ZonecastResult<()> {
        if self.zone.is_some() {
            return Err(ZonecastError::other("peer already part of an overlay"));
        }
        tracing::info!(
            peer = %self.id(),
            zone = %welcome.zone,
            neighbors = welcome.neighbors.len(),
            items = welcome.data.len(),
            "joined overlay",
        );
        for peer in welcome.neighbors {
            self.neighbors.insert_by_geometry(
                &welcome.zone,
                NeighborEntry::new(peer.id, peer.zone, peer.stub),
                welcome.maintenance,
            );
        }
        for item in welcome.data {
            self.handler.affect_data_received(item);
        }
        self.split_history = welcome.split_history;
        self.zone = Some(welcome.zone);
        Ok(())
    }

    async fn apply_leave(
        &mut self,
        maintenance: MaintenanceId,
        reply: oneshot::Sender<ZonecastResult<()>>,
    ) {
        let Some(zone) = self.zone.clone() else {
            let _ = reply.send(Err(ZonecastError::PeerNotActive(self.id())));
            self.finish_maintenance(maintenance).await;
            return;
        };
        let Some(sibling) = self.neighbors.mergeable_neighbor(&zone).cloned() else {
            // The mergeable sibling found before acquisition is gone; the
            // neighborhood changed under us.
            let _ = reply.send(Err(ZonecastError::NoMergeableNeighbor(Arc::new(zone))));
            self.finish_maintenance(maintenance).await;
            return;
        };
        tracing::info!(
            peer = %self.id(),
            sibling = %sibling.id,
            zone = %zone,
            "leaving overlay, donating zone",
        );

        let data = self.handler.remove_data_in(&zone);
        let others: Vec<(Peer, PeerRef)> = self
            .neighbors
            .iter()
            .filter(|(_, _, e)| e.id != sibling.id)
            .map(|(_, _, e)| {
                (
                    e.handle.clone(),
                    PeerRef {
                        id: e.id,
                        zone: e.zone.clone(),
                        stub: e.handle.clone(),
                    },
                )
            })
            .collect();

        let absorb = CtlMessage::Absorb {
            maintenance,
            from: self.id(),
            zone,
            data,
            neighbors: others.iter().map(|(_, r)| r.clone()).collect(),
        };
        if let Err(e) = sibling.handle.control(absorb).await {
            let _ = reply.send(Err(e));
            self.finish_maintenance(maintenance).await;
            return;
        }

        let successor = PeerRef {
            id: sibling.id,
            zone: sibling.zone.clone(),
            stub: sibling.handle.clone(),
        };
        let from = self.id();
        join_all(others.into_iter().map(|(peer, _)| {
            let successor = successor.clone();
            async move {
                let _ = peer
                    .control(CtlMessage::NeighborLeft {
                        maintenance,
                        from,
                        successor,
                    })
                    .await;
            }
        }))
        .await;

        self.zone = None;
        self.neighbors = NeighborTable::new(self.stub.config().space.dimensions());
        self.split_history.clear();
        self.finish_maintenance(maintenance).await;
        let _ = reply.send(Ok(()));
    }

    async fn absorb(
        &mut self,
        maintenance: MaintenanceId,
        from: OverlayId,
        zone: Zone,
        data: Vec<DataItem>,
        neighbors: Vec<PeerRef>,
    ) {
        let Some(own) = self.zone.clone() else {
            tracing::error!(peer = %self.id(), leaver = %from, "absorb received while inactive");
            return;
        };
        let merged = match own.merge(&zone) {
            Ok(merged) => merged,
            Err(e) => {
                // Never silently ignored: the leaver believed the zones were
                // siblings, so the tables disagree about the topology.
                tracing::error!(
                    peer = %self.id(),
                    leaver = %from,
                    error = %e,
                    "cannot absorb donated zone",
                );
                return;
            }
        };
        tracing::info!(
            peer = %self.id(),
            leaver = %from,
            merged = %merged,
            items = data.len(),
            "absorbed a leaving sibling's zone",
        );

        self.neighbors.remove(from, maintenance);
        self.zone = Some(merged.clone());
        for peer in neighbors {
            self.neighbor_changed(maintenance, peer);
        }
        self.neighbors.remove_outdated(&merged);
        for item in data {
            self.handler.affect_data_received(item);
        }

        let update = self.peer_ref(&merged);
        let targets: Vec<Peer> = self.neighbors.iter().map(|(_, _, e)| e.handle.clone()).collect();
        join_all(targets.into_iter().map(|peer| {
            let update = update.clone();
            async move {
                let _ = peer
                    .control(CtlMessage::ZoneUpdate {
                        maintenance,
                        peer: update,
                    })
                    .await;
            }
        }))
        .await;
    }
}

/// The join handshake run on behalf of a newcomer: locate the owner of a
/// random insertion point, then ask it to split.
async fn join_protocol(
    newcomer: &Peer,
    landmark: &Peer,
    space: &SpaceDescriptor,
) -> ZonecastResult<Welcome> {
    let target = random_point(space);
    tracing::debug!(peer = %newcomer.id(), target = %target, "joining overlay");
    let response = landmark
        .request(
            RoutingPlan::Unicast {
                target: target.clone(),
            },
            crate::message::RequestAction::Probe,
        )
        .await?;
    let owner = response
        .aggregate
        .handled_by
        .into_iter()
        .next()
        .ok_or_else(|| ZonecastError::routing("insertion-point probe produced no owner"))?;

    let (tx, rx) = oneshot::channel();
    owner
        .stub
        .control(CtlMessage::JoinIntroduce {
            newcomer: newcomer.clone(),
            reply: tx,
        })
        .await?;
    rx.await.map_err(|_| ZonecastError::Transport(owner.id))?
}

/// A uniformly random point of the space, used to pick join insertion
/// points.
fn random_point(space: &SpaceDescriptor) -> Coordinate {
    let mut rng = rand::thread_rng();
    Coordinate::new(
        (0..space.dimensions())
            .map(|d| match space.kind(d) {
                ElementKind::Numeric => Element::Numeric(rng.gen_range(0.0..1.0)),
                ElementKind::String => {
                    let alphabet = space.alphabet();
                    // Two digits spread insertion points finely enough even
                    // over small alphabets.
                    let digits = (0..2)
                        .map(|_| rng.gen_range(alphabet.lower..=alphabet.upper))
                        .collect();
                    Element::Str(StrElement::from_digits(digits, alphabet))
                }
            })
            .collect(),
    )
}
