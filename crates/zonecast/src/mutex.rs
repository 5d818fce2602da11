//! Ricart-Agrawala mutual exclusion over a dynamic participant set.
//!
//! Guards topology changes: a peer about to split or merge zones first wins
//! the critical section against every affected neighbor, so no neighbor
//! ever observes a half-applied table. Priority is (sequence, peer id)
//! lexicographic with logical sequence numbers, giving a total order over
//! entries; no two peers can hold the section at once and every requester
//! is eventually granted.

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::message::MutexMessage;
use crate::peer::Peer;
use crate::types::{MaintenanceId, OverlayId};

#[derive(Debug, Clone, PartialEq, Eq)]
enum CsState {
    Idle,
    Requesting {
        maintenance: MaintenanceId,
        sequence: u64,
        pending: Vec<OverlayId>,
    },
    InCriticalSection {
        maintenance: MaintenanceId,
    },
}

#[derive(Debug)]
struct Inner {
    sequence: u64,
    highest_seen: u64,
    state: CsState,
    // Requests held back until release, each keyed by the requester's own
    // maintenance id so the flushed grant passes its staleness check.
    deferred: Vec<(OverlayId, MaintenanceId, Peer)>,
}

/// Per-peer protocol instance. Shared between the peer task (which feeds it
/// inbound protocol messages) and maintenance tasks (which acquire and
/// release around topology mutations).
#[derive(Debug)]
pub struct RicartAgrawala {
    id: OverlayId,
    inner: Mutex<Inner>,
    granted: Notify,
}

impl RicartAgrawala {
    /// A manager for the peer `id`, initially idle.
    pub fn new(id: OverlayId) -> Self {
        Self {
            id,
            inner: Mutex::new(Inner {
                sequence: 0,
                highest_seen: 0,
                state: CsState::Idle,
                deferred: Vec::new(),
            }),
            granted: Notify::new(),
        }
    }

    /// Start requesting the critical section for `maintenance` against
    /// `participants`, returning the request messages to send.
    ///
    /// An empty participant set grants immediately. The caller sends the
    /// returned messages, then awaits [`RicartAgrawala::wait_granted`].
    pub fn begin_request(
        &self,
        maintenance: MaintenanceId,
        reply_to: Peer,
        participants: &[(OverlayId, Peer)],
    ) -> Vec<(Peer, MutexMessage)> {
        let mut inner = self.inner.lock();
        debug_assert_eq!(inner.state, CsState::Idle);

        inner.sequence = inner.highest_seen.max(inner.sequence) + 1;
        let sequence = inner.sequence;

        if participants.is_empty() {
            inner.state = CsState::InCriticalSection { maintenance };
            self.granted.notify_one();
            return Vec::new();
        }

        inner.state = CsState::Requesting {
            maintenance,
            sequence,
            pending: participants.iter().map(|(id, _)| *id).collect(),
        };
        tracing::debug!(
            peer = %self.id,
            maintenance = %maintenance,
            sequence,
            participants = participants.len(),
            "requesting critical section",
        );
        participants
            .iter()
            .map(|(_, peer)| {
                (
                    peer.clone(),
                    MutexMessage::Request {
                        maintenance,
                        sequence,
                        from: self.id,
                        reply_to: reply_to.clone(),
                    },
                )
            })
            .collect()
    }

    /// Suspend until the request for `maintenance` has been granted by every
    /// participant. Blocks indefinitely if a participant never replies.
    pub async fn wait_granted(&self, maintenance: MaintenanceId) {
        loop {
            let notified = self.granted.notified();
            if self.holds(maintenance) {
                return;
            }
            notified.await;
        }
    }

    /// Whether the peer currently holds the critical section for
    /// `maintenance`.
    pub fn holds(&self, maintenance: MaintenanceId) -> bool {
        matches!(
            self.inner.lock().state,
            CsState::InCriticalSection { maintenance: m } if m == maintenance
        )
    }

    /// Handle an inbound critical-section request.
    ///
    /// Returns the reply to send immediately, or `None` when the local peer
    /// has priority and defers the reply until its own release.
    pub fn on_request(
        &self,
        maintenance: MaintenanceId,
        sequence: u64,
        from: OverlayId,
        reply_to: Peer,
    ) -> Option<(Peer, MutexMessage)> {
        let mut inner = self.inner.lock();
        inner.highest_seen = inner.highest_seen.max(sequence);

        let local_has_priority = match &inner.state {
            CsState::Idle => false,
            CsState::InCriticalSection { .. } => true,
            // Lower sequence wins; ties break on the smaller peer id.
            CsState::Requesting {
                sequence: local_sequence,
                ..
            } => (*local_sequence, self.id) < (sequence, from),
        };

        if local_has_priority {
            tracing::trace!(
                peer = %self.id,
                requester = %from,
                sequence,
                "deferring critical-section reply",
            );
            inner.deferred.push((from, maintenance, reply_to));
            None
        } else {
            Some((
                reply_to,
                MutexMessage::Reply {
                    maintenance,
                    from: self.id,
                },
            ))
        }
    }

    /// Handle an inbound grant. A reply for anything but the in-flight
    /// request is stale and dropped.
    pub fn on_reply(&self, maintenance: MaintenanceId, from: OverlayId) {
        let mut inner = self.inner.lock();
        let CsState::Requesting {
            maintenance: current,
            pending,
            ..
        } = &mut inner.state
        else {
            tracing::debug!(
                peer = %self.id,
                maintenance = %maintenance,
                from = %from,
                "dropping critical-section reply while not requesting",
            );
            return;
        };
        if *current != maintenance {
            tracing::debug!(
                peer = %self.id,
                maintenance = %maintenance,
                expected = %current,
                "dropping critical-section reply for expired maintenance",
            );
            return;
        }

        pending.retain(|id| *id != from);
        if pending.is_empty() {
            inner.state = CsState::InCriticalSection { maintenance };
            tracing::debug!(peer = %self.id, maintenance = %maintenance, "critical section granted");
            self.granted.notify_one();
        }
    }

    /// Leave the critical section, returning the deferred replies to send.
    /// Each reply is stamped with the maintenance id of the request it
    /// grants, not with the released one.
    pub fn release(&self, maintenance: MaintenanceId) -> Vec<(Peer, MutexMessage)> {
        let mut inner = self.inner.lock();
        if !matches!(
            inner.state,
            CsState::InCriticalSection { maintenance: m } if m == maintenance
        ) {
            tracing::debug!(
                peer = %self.id,
                maintenance = %maintenance,
                "release for a critical section not held, ignoring",
            );
            return Vec::new();
        }

        inner.state = CsState::Idle;
        let deferred = std::mem::take(&mut inner.deferred);
        tracing::debug!(
            peer = %self.id,
            maintenance = %maintenance,
            flushed = deferred.len(),
            "released critical section",
        );
        deferred
            .into_iter()
            .map(|(_, requested, peer)| {
                (
                    peer,
                    MutexMessage::Reply {
                        maintenance: requested,
                        from: self.id,
                    },
                )
            })
            .collect()
    }

    /// Highest sequence number observed, for diagnostics.
    pub fn highest_seen(&self) -> u64 {
        self.inner.lock().highest_seen
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::OverlayConfig;

    fn stub() -> Peer {
        Peer::detached(&OverlayConfig::numeric(2)).0
    }

    #[test]
    fn empty_participant_set_grants_immediately() {
        let manager = RicartAgrawala::new(OverlayId::random());
        let maintenance = MaintenanceId::random();
        let sends = manager.begin_request(maintenance, stub(), &[]);
        assert!(sends.is_empty());
        assert!(manager.holds(maintenance));
    }

    #[test]
    fn grants_after_all_replies() {
        let manager = RicartAgrawala::new(OverlayId::random());
        let maintenance = MaintenanceId::random();
        let a = OverlayId::random();
        let b = OverlayId::random();
        let sends =
            manager.begin_request(maintenance, stub(), &[(a, stub()), (b, stub())]);
        assert_eq!(sends.len(), 2);

        manager.on_reply(maintenance, a);
        assert!(!manager.holds(maintenance));
        manager.on_reply(maintenance, b);
        assert!(manager.holds(maintenance));
    }

    #[test]
    fn lower_sequence_defers_the_higher_one() {
        let manager = RicartAgrawala::new(OverlayId::random());
        let maintenance = MaintenanceId::random();
        let rival = OverlayId::random();
        let _ = manager.begin_request(maintenance, stub(), &[(rival, stub())]);

        // Local request has sequence 1; the rival arrives with sequence 2
        // and must wait for our release.
        let deferred = manager.on_request(MaintenanceId::random(), 2, rival, stub());
        assert!(deferred.is_none());

        manager.on_reply(maintenance, rival);
        assert!(manager.holds(maintenance));
        let flushed = manager.release(maintenance);
        assert_eq!(flushed.len(), 1);
        assert!(!manager.holds(maintenance));
    }

    #[test]
    fn flushed_reply_grants_the_deferred_requester() {
        let low = OverlayId::from(uuid::Uuid::from_u128(1));
        let high = OverlayId::from(uuid::Uuid::from_u128(2));
        let winner = RicartAgrawala::new(low);
        let loser = RicartAgrawala::new(high);
        let winner_op = MaintenanceId::random();
        let loser_op = MaintenanceId::random();

        // Both request concurrently with sequence 1; the smaller id wins the
        // tie, defers the rival and gets an immediate grant back.
        let _ = winner.begin_request(winner_op, stub(), &[(high, stub())]);
        let _ = loser.begin_request(loser_op, stub(), &[(low, stub())]);
        assert!(winner.on_request(loser_op, 1, high, stub()).is_none());
        assert!(loser.on_request(winner_op, 1, low, stub()).is_some());

        winner.on_reply(winner_op, high);
        assert!(winner.holds(winner_op));

        // The flushed grant must carry the loser's maintenance id, or the
        // loser drops it as stale and waits forever.
        let flushed = winner.release(winner_op);
        assert_eq!(flushed.len(), 1);
        let MutexMessage::Reply { maintenance, from } = &flushed[0].1 else {
            panic!("release flushed a non-reply message");
        };
        assert_eq!(*maintenance, loser_op);
        assert_eq!(*from, low);

        loser.on_reply(*maintenance, *from);
        assert!(loser.holds(loser_op));
    }

    #[test]
    fn equal_sequences_break_ties_on_peer_id() {
        let low = OverlayId::from(uuid::Uuid::from_u128(1));
        let high = OverlayId::from(uuid::Uuid::from_u128(2));

        let manager = RicartAgrawala::new(low);
        let maintenance = MaintenanceId::random();
        let _ = manager.begin_request(maintenance, stub(), &[(high, stub())]);

        // Same sequence number: the smaller id wins, so the rival's request
        // is deferred.
        let decision = manager.on_request(MaintenanceId::random(), 1, high, stub());
        assert!(decision.is_none());

        // The mirror image: a manager with the larger id replies at once.
        let manager = RicartAgrawala::new(high);
        let maintenance = MaintenanceId::random();
        let _ = manager.begin_request(maintenance, stub(), &[(low, stub())]);
        let decision = manager.on_request(MaintenanceId::random(), 1, low, stub());
        assert!(decision.is_some());
    }

    #[test]
    fn stale_reply_is_dropped() {
        let manager = RicartAgrawala::new(OverlayId::random());
        let maintenance = MaintenanceId::random();
        let a = OverlayId::random();
        let _ = manager.begin_request(maintenance, stub(), &[(a, stub())]);

        manager.on_reply(MaintenanceId::random(), a);
        assert!(!manager.holds(maintenance));
        manager.on_reply(maintenance, a);
        assert!(manager.holds(maintenance));
    }

    #[test]
    fn sequence_numbers_advance_past_observed_traffic() {
        let manager = RicartAgrawala::new(OverlayId::random());
        let _ = manager.on_request(MaintenanceId::random(), 41, OverlayId::random(), stub());
        assert_eq!(manager.highest_seen(), 41);

        let maintenance = MaintenanceId::random();
        let rival = OverlayId::random();
        let _ = manager.begin_request(maintenance, stub(), &[(rival, stub())]);
        // Next local request must outrank everything seen so far.
        let decision = manager.on_request(MaintenanceId::random(), 41, rival, stub());
        assert!(decision.is_some(), "sequence 42 loses to the rival's 41");
    }
}
