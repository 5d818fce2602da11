//! Helpers for wiring in-process overlay networks.

use crate::config::OverlayConfig;
use crate::peer::{Peer, PeerSnapshot};
use crate::types::ZonecastResult;

/// An in-process overlay: one created peer plus `n - 1` peers joined through
/// it. Peers keep running until [`TestNetwork::shutdown`].
pub struct TestNetwork {
    /// The live peers, creation order. Index 0 is the landmark.
    pub peers: Vec<Peer>,
}

impl TestNetwork {
    /// Spawn `n` default peers and assemble them into one overlay.
    pub async fn spawn(n: usize, config: OverlayConfig) -> ZonecastResult<Self> {
        Self::spawn_with(n, config, Peer::spawn).await
    }

    /// Spawn `n` peers built by `make_peer` and assemble them into one
    /// overlay. Joins run sequentially against the first peer, settling the
    /// network between steps so every join sees consistent tables.
    pub async fn spawn_with(
        n: usize,
        config: OverlayConfig,
        mut make_peer: impl FnMut(OverlayConfig) -> Peer,
    ) -> ZonecastResult<Self> {
        assert!(n >= 1, "a network needs at least one peer");
        let first = make_peer(config.clone());
        first.create().await?;

        let mut network = Self { peers: vec![first] };
        for _ in 1..n {
            let peer = make_peer(config.clone());
            peer.join(&network.peers[0]).await?;
            network.peers.push(peer);
            network.settle().await?;
        }
        Ok(network)
    }

    /// Wait until every peer has drained the control traffic sent to it so
    /// far. Snapshot requests queue behind earlier control messages, so a
    /// full snapshot round is a barrier.
    pub async fn settle(&self) -> ZonecastResult<()> {
        for peer in &self.peers {
            peer.snapshot().await?;
        }
        Ok(())
    }

    /// Snapshots of every peer, in creation order.
    pub async fn snapshots(&self) -> ZonecastResult<Vec<PeerSnapshot>> {
        let mut out = Vec::with_capacity(self.peers.len());
        for peer in &self.peers {
            out.push(peer.snapshot().await?);
        }
        Ok(out)
    }

    /// Stop every peer task.
    pub async fn shutdown(self) -> ZonecastResult<()> {
        for peer in &self.peers {
            peer.shutdown().await?;
        }
        Ok(())
    }
}
