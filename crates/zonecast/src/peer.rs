//! Peer handles and lifecycle.
//!
//! Every peer runs as its own task owning a zone and a neighbor table; all
//! interaction goes through the cloneable [`Peer`] handle. The handle feeds
//! two inboxes: a control channel for topology and protocol traffic, and an
//! application channel for routed requests and responses. The peer task
//! always drains control before application traffic, so a topology change
//! in progress is never starved by a request backlog.

pub(crate) mod actor;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use zonecast_geometry::{Coordinate, Key, Zone};

use crate::config::OverlayConfig;
use crate::handler::{
    DataItem, MemoryStore, SharedDataHandler, SharedResponseProvider, UnionResponseProvider,
};
use crate::message::{RequestAction, RequestMessage, ResponseMessage, RoutingPlan};
use crate::neighbor::NeighborView;
use crate::types::{MessageId, OverlayId, ZonecastError, ZonecastResult};

pub(crate) use actor::{AppMessage, CtlMessage};

/// Handle to a peer task. Cheap to clone; every clone addresses the same
/// peer, and the handle stays valid for the peer's lifetime.
#[derive(Debug, Clone)]
pub struct Peer {
    id: OverlayId,
    config: Arc<OverlayConfig>,
    app_tx: mpsc::Sender<AppMessage>,
    ctl_tx: mpsc::Sender<CtlMessage>,
}

/// A peer as seen from elsewhere in the overlay: identity, a view of its
/// zone, and the handle to reach it.
#[derive(Debug, Clone)]
pub struct PeerRef {
    /// The peer's identifier.
    pub id: OverlayId,
    /// The peer's zone when this reference was taken.
    pub zone: Zone,
    /// Invocation handle.
    pub stub: Peer,
}

/// Read-only view of a peer's state, taken atomically by the peer task.
#[derive(Debug, Clone)]
pub struct PeerSnapshot {
    /// The peer's identifier.
    pub id: OverlayId,
    /// The owned zone, `None` while the peer is not part of an overlay.
    pub zone: Option<Zone>,
    /// Current neighbor relationships.
    pub neighbors: Vec<NeighborView>,
    /// Request exchanges still awaiting sub-responses.
    pub pending_responses: usize,
    /// Whether a topology change is in flight.
    pub maintenance_in_flight: bool,
    /// Dimensions this peer's zone was split on, oldest first.
    pub split_history: Vec<usize>,
}

/// The receiving ends of a peer's inboxes.
pub(crate) struct InboxReceivers {
    pub(crate) app: mpsc::Receiver<AppMessage>,
    pub(crate) ctl: mpsc::Receiver<CtlMessage>,
}

impl Peer {
    /// Spawn a peer task with in-memory storage and union response merging.
    ///
    /// The peer starts outside any overlay: follow up with
    /// [`Peer::create`] or [`Peer::join`].
    pub fn spawn(config: OverlayConfig) -> Peer {
        Self::spawn_with(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(UnionResponseProvider),
        )
    }

    /// Spawn a peer task with the given storage and response shaping.
    pub fn spawn_with(
        config: OverlayConfig,
        handler: SharedDataHandler,
        provider: SharedResponseProvider,
    ) -> Peer {
        let (peer, inbox) = Self::detached(&config);
        actor::spawn(peer.clone(), inbox, handler, provider);
        peer
    }

    /// A handle and its inboxes without a task behind them. The caller
    /// drains the inboxes itself; used by unit tests to observe traffic.
    pub(crate) fn detached(config: &OverlayConfig) -> (Peer, InboxReceivers) {
        let (app_tx, app_rx) = mpsc::channel(config.inbox_capacity);
        let (ctl_tx, ctl_rx) = mpsc::channel(config.inbox_capacity);
        (
            Peer {
                id: OverlayId::random(),
                config: Arc::new(config.clone()),
                app_tx,
                ctl_tx,
            },
            InboxReceivers {
                app: app_rx,
                ctl: ctl_rx,
            },
        )
    }

    /// The peer's identifier.
    pub fn id(&self) -> OverlayId {
        self.id
    }

    /// The configuration the peer was spawned with.
    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    /// Become the first peer of a new overlay, owning the whole space.
    pub async fn create(&self) -> ZonecastResult<()> {
        let (tx, rx) = oneshot::channel();
        self.control(CtlMessage::Create { reply: tx }).await?;
        rx.await.map_err(|_| ZonecastError::Transport(self.id))?
    }

    /// Join the overlay `landmark` belongs to.
    ///
    /// The joining peer is routed to the owner of a random insertion point,
    /// which splits its zone and hands over one half together with the data
    /// and neighbor relationships that fall into it.
    pub async fn join(&self, landmark: &Peer) -> ZonecastResult<()> {
        let (tx, rx) = oneshot::channel();
        self.control(CtlMessage::Join {
            landmark: landmark.clone(),
            reply: tx,
        })
        .await?;
        rx.await.map_err(|_| ZonecastError::Transport(self.id))?
    }

    /// Leave the overlay, donating zone and data to a sibling peer.
    pub async fn leave(&self) -> ZonecastResult<()> {
        let (tx, rx) = oneshot::channel();
        self.control(CtlMessage::Leave { reply: tx }).await?;
        rx.await.map_err(|_| ZonecastError::Transport(self.id))?
    }

    /// Issue a request and suspend until the merged response arrives.
    ///
    /// No timeout is imposed here: a response that can never complete blocks
    /// forever. Callers wanting a deadline race this future against a timer
    /// and call [`Peer::abandon`] on expiry.
    pub async fn request(
        &self,
        plan: RoutingPlan,
        action: RequestAction,
    ) -> ZonecastResult<ResponseMessage> {
        let request = RequestMessage::new(plan, action, true);
        let (tx, rx) = oneshot::channel();
        self.app(AppMessage::Initiate {
            request,
            reply: Some(tx),
        })
        .await?;
        rx.await.map_err(|_| ZonecastError::Transport(self.id))?
    }

    /// Issue a request without waiting for any response.
    pub async fn notify(&self, plan: RoutingPlan, action: RequestAction) -> ZonecastResult<()> {
        let request = RequestMessage::new(plan, action, false);
        self.app(AppMessage::Initiate {
            request,
            reply: None,
        })
        .await
    }

    /// Store an item at the peer owning its coordinate.
    pub async fn store(&self, item: DataItem) -> ZonecastResult<()> {
        let target = item.coordinate.clone();
        self.request(RoutingPlan::Unicast { target }, RequestAction::Store(item))
            .await
            .map(|_| ())
    }

    /// Retrieve every item matching `key` from the peers in its region.
    pub async fn retrieve(&self, key: Key) -> ZonecastResult<Vec<DataItem>> {
        self.request(RoutingPlan::Anycast { key }, RequestAction::Retrieve)
            .await
            .map(|response| response.aggregate.items)
    }

    /// Broadcast `action` to every peer matching `key`, using the strategy
    /// the peer was configured with.
    pub async fn broadcast(
        &self,
        key: Key,
        action: RequestAction,
    ) -> ZonecastResult<ResponseMessage> {
        self.request(
            RoutingPlan::Broadcast {
                key,
                strategy: self.config.broadcast_strategy,
                state: None,
            },
            action,
        )
        .await
    }

    /// Retrieve the single item set at `target`, if the owning peer holds
    /// any.
    pub async fn lookup(&self, target: Coordinate) -> ZonecastResult<Vec<DataItem>> {
        self.request(RoutingPlan::Unicast { target }, RequestAction::Retrieve)
            .await
            .map(|response| response.aggregate.items)
    }

    /// Take a snapshot of the peer's state.
    pub async fn snapshot(&self) -> ZonecastResult<PeerSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.control(CtlMessage::Snapshot { reply: tx }).await?;
        rx.await.map_err(|_| ZonecastError::Transport(self.id))
    }

    /// Give up on a pending exchange, dropping its partial aggregate. Late
    /// sub-responses for it are discarded without corrupting peer state.
    pub async fn abandon(&self, id: MessageId) -> ZonecastResult<()> {
        self.control(CtlMessage::Abandon { id }).await
    }

    /// Stop the peer task. Requests in flight towards this peer are lost.
    pub async fn shutdown(&self) -> ZonecastResult<()> {
        self.control(CtlMessage::Shutdown).await
    }

    /// Route a request to this peer.
    pub(crate) async fn deliver(&self, request: RequestMessage) -> ZonecastResult<()> {
        self.app(AppMessage::Request(request)).await
    }

    /// Route a response to this peer.
    pub(crate) async fn respond(&self, response: ResponseMessage) -> ZonecastResult<()> {
        self.app(AppMessage::Response(response)).await
    }

    /// Send a control message to this peer.
    pub(crate) async fn control(&self, msg: CtlMessage) -> ZonecastResult<()> {
        self.ctl_tx
            .send(msg)
            .await
            .map_err(|_| ZonecastError::Transport(self.id))
    }

    async fn app(&self, msg: AppMessage) -> ZonecastResult<()> {
        self.app_tx
            .send(msg)
            .await
            .map_err(|_| ZonecastError::Transport(self.id))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn detached_handle_transports_messages() {
        let (peer, mut inbox) = Peer::detached(&OverlayConfig::numeric(2));
        let request = RequestMessage::new(
            RoutingPlan::Unicast {
                target: Coordinate::new(vec![
                    zonecast_geometry::Element::Numeric(0.5),
                    zonecast_geometry::Element::Numeric(0.5),
                ]),
            },
            RequestAction::Probe,
            false,
        );
        peer.deliver(request.clone()).await.unwrap();
        match inbox.app.recv().await {
            Some(AppMessage::Request(received)) => assert_eq!(received.id, request.id),
            other => panic!("unexpected inbox message: {other:?}"),
        }

        // Dropping the inbox turns the handle into a dead stub.
        drop(inbox);
        let err = peer.deliver(request).await.unwrap_err();
        assert!(matches!(err, ZonecastError::Transport(id) if id == peer.id()));
    }
}
