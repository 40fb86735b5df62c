use std::{cmp::Ordering, collections::BinaryHeap};

use cadence_types::{CommittedHeader, Height};

/// A fetched header in the replay queue, waiting for the heights before it to be replayed.
///
/// The [`Eq`] and [`Ord`] impl on this type only take into account the `height`, a sync client
/// only ever fetches a height once so no 2 entries can have the same height.
///
/// Also, the [`Ord`] impl is reversed so lower heights come first in a [`BinaryHeap`].
#[derive(Debug, Clone)]
pub(crate) struct ReadyHeader {
    pub height: Height,
    pub committed: CommittedHeader,
}

impl Eq for ReadyHeader {}

impl PartialEq<Self> for ReadyHeader {
    fn eq(&self, other: &Self) -> bool {
        self.height.eq(&other.height)
    }
}

impl PartialOrd<Self> for ReadyHeader {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReadyHeader {
    fn cmp(&self, other: &Self) -> Ordering {
        // reverse the ordering so lower heights come first in a [`BinaryHeap`]
        self.height.cmp(&other.height).reverse()
    }
}

/// Fetched headers, held until every height before them has been replayed.
#[derive(Debug, Default)]
pub(crate) struct ReplayQueue {
    ready: BinaryHeap<ReadyHeader>,
}

impl ReplayQueue {
    pub(crate) fn push(&mut self, height: Height, committed: CommittedHeader) {
        self.ready.push(ReadyHeader { height, committed });
    }

    /// Takes the header at `next_height` out of the queue, if it has been fetched.
    ///
    /// Entries below `next_height` are stale and dropped.
    pub(crate) fn pop_next(&mut self, next_height: Height) -> Option<CommittedHeader> {
        while let Some(lowest) = self.ready.peek() {
            match lowest.height.cmp(&next_height) {
                Ordering::Less => drop(self.ready.pop()),
                Ordering::Equal => return self.ready.pop().map(|ready| ready.committed),
                Ordering::Greater => return None,
            }
        }

        None
    }

    pub(crate) fn len(&self) -> usize {
        self.ready.len()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use proptest::{collection::btree_set, prelude::*};

    use cadence_types::{BlockHeader, CommitProof, DataId};

    use super::*;

    fn committed(height: Height) -> CommittedHeader {
        CommittedHeader {
            header: BlockHeader {
                hash: [0; 32],
                prev_block_hash: [0; 32],
                height,
                prev_commit_proof: CommitProof::default(),
                validator_set_hash: [0; 32],
                next_validator_set_hash: [0; 32],
                data_id: DataId::EMPTY,
                prev_app_state_hash: [0; 32],
            },
            proof: CommitProof::default(),
        }
    }

    proptest! {
        #[test]
        fn headers_come_out_in_order(heights in btree_set(0_u64..1_000, 1..50)) {
            let mut queue = ReplayQueue::default();
            for height in heights.iter().rev() {
                queue.push(*height, committed(*height));
            }

            let mut popped = BTreeSet::new();
            for height in &heights {
                let next = queue.pop_next(*height).unwrap();
                prop_assert_eq!(next.header.height, *height);
                popped.insert(*height);
            }

            prop_assert_eq!(popped, heights);
            prop_assert_eq!(queue.len(), 0);
        }
    }

    #[test]
    fn gap_blocks_later_heights() {
        let mut queue = ReplayQueue::default();
        queue.push(6, committed(6));
        queue.push(7, committed(7));

        assert!(queue.pop_next(5).is_none());
        assert_eq!(queue.len(), 2);

        queue.push(5, committed(5));
        assert_eq!(queue.pop_next(5).unwrap().header.height, 5);
        assert_eq!(queue.pop_next(6).unwrap().header.height, 6);
    }

    #[test]
    fn stale_heights_are_dropped() {
        let mut queue = ReplayQueue::default();
        queue.push(2, committed(2));
        queue.push(4, committed(4));

        assert_eq!(queue.pop_next(4).unwrap().header.height, 4);
        assert_eq!(queue.len(), 0);
    }
}
