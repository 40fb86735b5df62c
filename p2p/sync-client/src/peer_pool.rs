//! # Peer Pool
//!
//! The set of peers a sync client may fetch from.
//!
//! Peers are added by the embedder through [`SyncClient::add_peer`](crate::SyncClient::add_peer)
//! and removed again once they fail too many requests in a row. Fetch workers that have
//! run out of peers to try park in [`PeerPool::wait_for_candidate`] until a new peer is added.
use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
};

use dashmap::{mapref::entry::Entry, DashMap};
use rand::{seq::IteratorRandom, thread_rng};
use tokio::sync::Notify;

use cadence_types::PeerId;

/// A peer handed out by [`PeerPool::wait_for_candidate`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub peer: PeerId,
    /// Which time this peer was added to the pool.
    ///
    /// A peer that is removed and then added again gets a new registration, so work that
    /// gave up on the old one can try it again.
    registration: u64,
}

/// The peers a fetch worker has already tried and given up on.
#[derive(Debug, Default)]
pub(crate) struct TriedPeers(HashMap<PeerId, u64>);

impl TriedPeers {
    /// Marks this registration of a peer as tried.
    pub(crate) fn insert(&mut self, candidate: Candidate) {
        self.0.insert(candidate.peer, candidate.registration);
    }

    /// Returns `true` if the peer has been tried since it was last added to the pool.
    pub(crate) fn contains(&self, peer: &PeerId, registration: u64) -> bool {
        self.0.get(peer).is_some_and(|tried| *tried == registration)
    }
}

#[derive(Debug)]
struct PeerEntry {
    registration: u64,
    consecutive_failures: usize,
}

/// The peer pool.
#[derive(Debug, Default)]
pub struct PeerPool {
    peers: DashMap<PeerId, PeerEntry>,
    next_registration: AtomicU64,
    /// Notified whenever a peer is added.
    peer_added: Notify,
    /// Set when the owning sync client shuts down, no peers can be added after this.
    closed: AtomicBool,
}

impl PeerPool {
    /// Returns a new, empty peer pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a peer to the pool.
    ///
    /// Returns `true` if the peer was added and `false` if it was already in the pool
    /// or the pool is closed. Anyone waiting for a peer is woken up either way.
    pub fn add_peer(&self, peer: PeerId) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }

        let added = match self.peers.entry(peer) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(PeerEntry {
                    registration: self.next_registration.fetch_add(1, Ordering::Relaxed),
                    consecutive_failures: 0,
                });
                true
            }
        };

        if added {
            tracing::debug!(%peer, "Peer added to sync peer pool.");
        }

        self.peer_added.notify_waiters();
        added
    }

    /// Removes a peer from the pool, returning `true` if it was in the pool.
    pub fn remove_peer(&self, peer: &PeerId) -> bool {
        self.peers.remove(peer).is_some()
    }

    /// Returns `true` if the peer is in the pool.
    pub fn contains_peer(&self, peer: &PeerId) -> bool {
        self.peers.contains_key(peer)
    }

    /// Returns the amount of peers in the pool.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Returns `true` if there are no peers in the pool.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Stops any more peers from being added.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Waits for a peer that `is_excluded` does not reject.
    ///
    /// If there are multiple candidates, a random one is chosen. This waits forever if no
    /// candidate is ever added, so callers should race it against cancellation.
    pub async fn wait_for_candidate<F>(&self, is_excluded: F) -> Candidate
    where
        F: Fn(&PeerId, u64) -> bool,
    {
        loop {
            let notified = self.peer_added.notified();
            tokio::pin!(notified);
            // Register for the notification before looking at the pool, so a peer added
            // between the check and the await still wakes us.
            notified.as_mut().enable();

            if let Some(candidate) = self.random_candidate(&is_excluded) {
                return candidate;
            }

            notified.await;
        }
    }

    fn random_candidate<F>(&self, is_excluded: &F) -> Option<Candidate>
    where
        F: Fn(&PeerId, u64) -> bool,
    {
        self.peers
            .iter()
            .filter(|entry| !is_excluded(entry.key(), entry.registration))
            .map(|entry| Candidate {
                peer: *entry.key(),
                registration: entry.registration,
            })
            .choose(&mut thread_rng())
    }

    /// Records a successful request to a peer, resetting its failure count.
    pub(crate) fn record_success(&self, candidate: &Candidate) {
        if let Some(mut entry) = self.peers.get_mut(&candidate.peer) {
            if entry.registration == candidate.registration {
                entry.consecutive_failures = 0;
            }
        }
    }

    /// Records a failed request to a peer.
    ///
    /// Returns `true` if this removed the peer from the pool.
    pub(crate) fn record_failure(&self, candidate: &Candidate, max_failures: usize) -> bool {
        let removed = self
            .peers
            .remove_if_mut(&candidate.peer, |_, entry| {
                if entry.registration != candidate.registration {
                    return false;
                }

                entry.consecutive_failures += 1;
                entry.consecutive_failures >= max_failures
            })
            .is_some();

        if removed {
            tracing::debug!(peer = %candidate.peer, "Removing peer from sync peer pool after repeated failures.");
        }

        removed
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;
    use tokio_test::{assert_pending, assert_ready, task};

    use super::*;

    fn peer(n: u8) -> PeerId {
        PeerId([n; 32])
    }

    #[test]
    fn add_peer_reports_new_peers() {
        let pool = PeerPool::new();

        assert!(pool.add_peer(peer(1)));
        assert!(!pool.add_peer(peer(1)));
        assert!(pool.add_peer(peer(2)));
        assert_eq!(pool.len(), 2);

        assert!(pool.remove_peer(&peer(1)));
        assert!(!pool.remove_peer(&peer(1)));
        assert!(pool.add_peer(peer(1)));
    }

    #[test]
    fn closed_pool_rejects_peers() {
        let pool = PeerPool::new();
        pool.close();

        assert!(!pool.add_peer(peer(1)));
        assert!(pool.is_empty());
    }

    #[test]
    fn waiter_is_woken_by_add_peer() {
        let pool = PeerPool::new();

        let mut waiter = task::spawn(pool.wait_for_candidate(|_, _| false));
        assert_pending!(waiter.poll());

        pool.add_peer(peer(7));
        assert!(waiter.is_woken());

        let candidate = assert_ready!(waiter.poll());
        assert_eq!(candidate.peer, peer(7));
    }

    #[test]
    fn waiter_ignores_excluded_peers() {
        let pool = PeerPool::new();

        let mut waiter = task::spawn(pool.wait_for_candidate(|p, _| *p == peer(1)));
        assert_pending!(waiter.poll());

        pool.add_peer(peer(1));
        assert_pending!(waiter.poll());

        pool.add_peer(peer(2));
        assert_eq!(assert_ready!(waiter.poll()).peer, peer(2));
    }

    #[tokio::test]
    async fn excluded_peers_are_skipped() {
        let pool = PeerPool::new();
        pool.add_peer(peer(1));
        pool.add_peer(peer(2));

        let mut tried = TriedPeers::default();
        let first = pool.wait_for_candidate(|p, r| tried.contains(p, r)).await;
        tried.insert(first);

        let second = pool.wait_for_candidate(|p, r| tried.contains(p, r)).await;
        assert_ne!(first.peer, second.peer);
        tried.insert(second);

        let third = timeout(
            Duration::from_millis(50),
            pool.wait_for_candidate(|p, r| tried.contains(p, r)),
        )
        .await;
        assert!(third.is_err());
    }

    #[tokio::test]
    async fn re_added_peer_is_a_new_candidate() {
        let pool = PeerPool::new();
        pool.add_peer(peer(1));

        let mut tried = TriedPeers::default();
        tried.insert(pool.wait_for_candidate(|_, _| false).await);

        pool.remove_peer(&peer(1));
        pool.add_peer(peer(1));

        let candidate = timeout(
            Duration::from_millis(50),
            pool.wait_for_candidate(|p, r| tried.contains(p, r)),
        )
        .await
        .unwrap();
        assert_eq!(candidate.peer, peer(1));
    }

    #[tokio::test]
    async fn failures_remove_peer() {
        let pool = PeerPool::new();
        pool.add_peer(peer(1));
        let candidate = pool.wait_for_candidate(|_, _| false).await;

        assert!(!pool.record_failure(&candidate, 3));
        assert!(!pool.record_failure(&candidate, 3));
        pool.record_success(&candidate);
        assert!(!pool.record_failure(&candidate, 3));
        assert!(!pool.record_failure(&candidate, 3));
        assert!(pool.record_failure(&candidate, 3));

        assert!(!pool.contains_peer(&peer(1)));
    }

    #[tokio::test]
    async fn stale_candidate_does_not_touch_new_registration() {
        let pool = PeerPool::new();
        pool.add_peer(peer(1));
        let stale = pool.wait_for_candidate(|_, _| false).await;

        pool.remove_peer(&peer(1));
        pool.add_peer(peer(1));

        assert!(!pool.record_failure(&stale, 1));
        assert!(pool.contains_peer(&peer(1)));
    }
}
