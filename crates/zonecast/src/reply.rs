//! Bookkeeping of responses a peer still waits for.
//!
//! Every peer that fans a request out to `k` neighbors records a pending
//! entry expecting `k` sub-responses. Arriving sub-responses are merged into
//! the entry's aggregate; when the last one lands, the merged response moves
//! one step down the reverse path (or completes the initiator's future).

use std::collections::HashMap;

use crate::handler::SharedResponseProvider;
use crate::message::{Aggregate, ResponseMessage};
use crate::types::{MessageId, ZonecastResult};

/// Where a completed aggregate goes.
#[derive(Debug)]
pub enum ReplySink {
    /// Pop the last reverse-path entry of the merged response and forward
    /// there.
    Upstream,
    /// This peer initiated the request; complete the caller's future.
    Origin(tokio::sync::oneshot::Sender<ZonecastResult<ResponseMessage>>),
}

/// One fan-out waiting to be satisfied.
#[derive(Debug)]
pub struct PendingReplyEntry {
    expected: usize,
    received: usize,
    aggregate: Aggregate,
    max_hop_count: u32,
    sink: ReplySink,
}

impl PendingReplyEntry {
    /// Expect `expected` sub-responses on top of the local contribution
    /// `seed`, then hand the merge to `sink`.
    pub fn new(expected: usize, seed: Aggregate, sink: ReplySink) -> Self {
        Self {
            expected,
            received: 0,
            aggregate: seed,
            max_hop_count: 0,
            sink,
        }
    }

    /// Sub-responses still outstanding.
    pub fn outstanding(&self) -> usize {
        self.expected - self.received
    }
}

/// Pending entries of one peer, keyed by exchange id.
#[derive(Debug, Default)]
pub struct ResponseTable {
    entries: HashMap<MessageId, PendingReplyEntry>,
}

impl ResponseTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fan-out of `expected` copies of message `id`. `seed` is
    /// the forwarding peer's own contribution, folded in up front.
    pub fn expect(&mut self, id: MessageId, expected: usize, seed: Aggregate, sink: ReplySink) {
        self.entries
            .insert(id, PendingReplyEntry::new(expected, seed, sink));
    }

    /// Merge one arriving sub-response.
    ///
    /// Returns the completed entry's sink and merged response once every
    /// expected sub-response has arrived, `None` while some are outstanding.
    /// A response with no matching entry is dropped: its entry was abandoned.
    pub fn merge(
        &mut self,
        provider: &SharedResponseProvider,
        response: ResponseMessage,
    ) -> Option<(ReplySink, ResponseMessage)> {
        let id = response.id;
        let Some(entry) = self.entries.get_mut(&id) else {
            tracing::debug!(message = %id, "dropping response for unknown or abandoned exchange");
            return None;
        };

        entry.received += 1;
        entry.max_hop_count = entry.max_hop_count.max(response.hop_count);
        provider.merge(&mut entry.aggregate, response.aggregate);

        if entry.received < entry.expected {
            tracing::trace!(
                message = %id,
                outstanding = entry.outstanding(),
                "merged sub-response, still waiting",
            );
            return None;
        }

        // remove() cannot fail here, the entry was just found.
        let entry = self.entries.remove(&id)?;
        let merged = ResponseMessage {
            id,
            hop_count: entry.max_hop_count,
            reverse_path: response.reverse_path,
            aggregate: entry.aggregate,
        };
        Some((entry.sink, merged))
    }

    /// Abandon the exchange `id`, dropping its partial aggregate.
    ///
    /// Later sub-responses for it are ignored. Used by callers that impose
    /// their own timeout; abandoning never corrupts the table.
    pub fn abandon(&mut self, id: MessageId) -> bool {
        let removed = self.entries.remove(&id).is_some();
        if removed {
            tracing::debug!(message = %id, "abandoned pending exchange");
        }
        removed
    }

    /// Number of exchanges still pending. Zero means the peer is quiescent
    /// with respect to request/response traffic.
    pub fn pending(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use zonecast_geometry::{SpaceDescriptor, Zone};

    use super::*;
    use crate::config::OverlayConfig;
    use crate::handler::UnionResponseProvider;
    use crate::peer::{Peer, PeerRef};

    fn response(id: MessageId, hops: u32, zone: Zone) -> ResponseMessage {
        let (stub, _rx) = Peer::detached(&OverlayConfig::numeric(2));
        ResponseMessage {
            id,
            hop_count: hops,
            reverse_path: Vec::new(),
            aggregate: Aggregate {
                items: Vec::new(),
                handled_by: vec![PeerRef {
                    id: stub.id(),
                    zone,
                    stub,
                }],
            },
        }
    }

    #[test]
    fn completes_after_all_expected_subresponses() {
        let provider: SharedResponseProvider = Arc::new(UnionResponseProvider);
        let space = SpaceDescriptor::numeric(2);
        let zone = Zone::full(&space);
        let id = MessageId::random();

        let (tx, mut rx) = tokio::sync::oneshot::channel();
        let mut table = ResponseTable::new();
        table.expect(id, 3, Aggregate::empty(), ReplySink::Origin(tx));

        assert!(table.merge(&provider, response(id, 1, zone.clone())).is_none());
        assert!(table.merge(&provider, response(id, 4, zone.clone())).is_none());
        assert!(rx.try_recv().is_err());

        let (sink, merged) = table
            .merge(&provider, response(id, 2, zone))
            .expect("third sub-response completes the entry");
        assert!(matches!(sink, ReplySink::Origin(_)));
        assert_eq!(merged.hop_count, 4);
        assert_eq!(merged.aggregate.handled_by.len(), 3);
        assert_eq!(table.pending(), 0);
    }

    #[test]
    fn seed_contribution_survives_the_merge() {
        let provider: SharedResponseProvider = Arc::new(UnionResponseProvider);
        let space = SpaceDescriptor::numeric(2);
        let zone = Zone::full(&space);
        let id = MessageId::random();

        let (tx, _rx) = tokio::sync::oneshot::channel();
        let mut table = ResponseTable::new();
        let seed = response(id, 0, zone.clone()).aggregate;
        table.expect(id, 1, seed, ReplySink::Origin(tx));

        let (_, merged) = table
            .merge(&provider, response(id, 1, zone))
            .expect("single sub-response completes the entry");
        assert_eq!(merged.aggregate.handled_by.len(), 2);
    }

    #[test]
    fn abandoned_entry_swallows_late_responses() {
        let provider: SharedResponseProvider = Arc::new(UnionResponseProvider);
        let space = SpaceDescriptor::numeric(1);
        let zone = Zone::full(&space);
        let id = MessageId::random();

        let (tx, _rx) = tokio::sync::oneshot::channel();
        let mut table = ResponseTable::new();
        table.expect(id, 2, Aggregate::empty(), ReplySink::Origin(tx));

        assert!(table.abandon(id));
        assert!(!table.abandon(id));
        assert!(table.merge(&provider, response(id, 1, zone)).is_none());
    }
}
