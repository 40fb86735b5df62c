//! # Request Cache
//!
//! Block data fetched by a sync client, keyed by [`DataId`].
//!
//! The cache makes sure a [`DataId`] is only fetched once at a time, even across sync clients
//! sharing the same cache. The first caller of [`RequestCache::get_or_create`] gets a
//! [`RecordWriter`] and is responsible for filling the record in, everyone after that gets the
//! [`BlockDataRecord`] itself and can wait for it to become ready.
//!
//! If the writer is dropped without completing the record, the record is removed from the cache
//! and everyone waiting on it is told, so one of them can take over the fetch.
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use dashmap::{mapref::entry::Entry, DashMap};
use tokio::sync::{futures::Notified, watch, Notify};

use cadence_types::DataId;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum RecordStatus {
    Pending,
    Ready,
    Abandoned,
}

#[derive(Debug)]
struct ReadyData<T> {
    transactions: Vec<T>,
    encoded: Bytes,
}

/// The block data for a single [`DataId`].
///
/// A record starts out pending and becomes ready exactly once, after which its contents never
/// change.
#[derive(Debug)]
pub struct BlockDataRecord<T> {
    data_id: DataId,
    data: OnceLock<ReadyData<T>>,
    status: watch::Sender<RecordStatus>,
}

impl<T> BlockDataRecord<T> {
    fn new(data_id: DataId) -> Self {
        Self {
            data_id,
            data: OnceLock::new(),
            status: watch::channel(RecordStatus::Pending).0,
        }
    }

    pub const fn data_id(&self) -> &DataId {
        &self.data_id
    }

    /// Returns `true` if the record has its data.
    pub fn is_ready(&self) -> bool {
        self.data.get().is_some()
    }

    /// The decoded transactions, in block order, if the record is ready.
    pub fn transactions(&self) -> Option<&[T]> {
        self.data.get().map(|data| data.transactions.as_slice())
    }

    /// The encoded block data, exactly as it was received, if the record is ready.
    pub fn encoded_transactions(&self) -> Option<&Bytes> {
        self.data.get().map(|data| &data.encoded)
    }

    /// Waits for the record to stop being pending.
    ///
    /// Returns `true` if the record is ready and `false` if its writer gave up on it, in which
    /// case the record is no longer in the cache.
    pub async fn wait_ready(&self) -> bool {
        let mut rx = self.status.subscribe();

        // The sender lives as long as `self`, so this can't fail.
        let Ok(status) = rx.wait_for(|status| *status != RecordStatus::Pending).await else {
            return false;
        };

        *status == RecordStatus::Ready
    }
}

/// The result of [`RequestCache::get_or_create`].
#[derive(Debug)]
pub enum CacheLookup<T> {
    /// The record did not exist, the caller must fill it in.
    Created(RecordWriter<T>),
    /// The record already existed, it may still be pending.
    Existing(Arc<BlockDataRecord<T>>),
}

/// Exclusive permission to fill in a pending [`BlockDataRecord`].
///
/// Dropping this without calling [`RecordWriter::complete`] removes the record from the cache
/// and wakes anyone waiting on it.
#[derive(Debug)]
pub struct RecordWriter<T> {
    cache: Arc<RequestCache<T>>,
    /// [`None`] once the record has been completed.
    record: Option<Arc<BlockDataRecord<T>>>,
}

impl<T> RecordWriter<T> {
    /// The record being written.
    pub fn record(&self) -> &Arc<BlockDataRecord<T>> {
        self.record
            .as_ref()
            .expect("the record is only taken when the writer is consumed")
    }

    /// Fills in the record, making it ready.
    pub fn complete(mut self, transactions: Vec<T>, encoded: Bytes) -> Arc<BlockDataRecord<T>> {
        let record = self
            .record
            .take()
            .expect("the record is only taken when the writer is consumed");

        if record
            .data
            .set(ReadyData {
                transactions,
                encoded,
            })
            .is_err()
        {
            unreachable!("only the writer fills in a record");
        }
        record.status.send_replace(RecordStatus::Ready);

        record
    }
}

impl<T> Drop for RecordWriter<T> {
    fn drop(&mut self) {
        let Some(record) = self.record.take() else {
            return;
        };

        // Remove the record before telling the waiters, so they don't find it again.
        self.cache
            .records
            .remove_if(&record.data_id, |_, current| Arc::ptr_eq(current, &record));
        record.status.send_replace(RecordStatus::Abandoned);
    }
}

/// A cache of [`BlockDataRecord`]s, shared between fetch workers and any number of sync clients.
#[derive(Debug)]
pub struct RequestCache<T> {
    records: DashMap<DataId, Arc<BlockDataRecord<T>>>,
    /// Notified every time a new record is created.
    record_created: Notify,
}

impl<T> RequestCache<T> {
    /// Returns a new, empty cache.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            records: DashMap::new(),
            record_created: Notify::new(),
        })
    }

    /// Gets the record for `data_id`, creating a pending one if it doesn't exist.
    ///
    /// Returns [`None`] for [`DataId::EMPTY`], nothing is ever stored for it.
    pub fn get_or_create(self: &Arc<Self>, data_id: &DataId) -> Option<CacheLookup<T>> {
        if data_id.is_empty() {
            return None;
        }

        let lookup = match self.records.entry(data_id.clone()) {
            Entry::Occupied(entry) => CacheLookup::Existing(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let record = Arc::new(BlockDataRecord::new(data_id.clone()));
                entry.insert(Arc::clone(&record));

                CacheLookup::Created(RecordWriter {
                    cache: Arc::clone(self),
                    record: Some(record),
                })
            }
        };

        if matches!(lookup, CacheLookup::Created(_)) {
            self.record_created.notify_waiters();
        }

        Some(lookup)
    }

    /// Returns a future that completes the next time a record is created.
    ///
    /// Like [`Notify::notified`], the future only sees records created after it is polled or
    /// [`Notified::enable`]d.
    pub fn record_created(&self) -> Notified<'_> {
        self.record_created.notified()
    }

    /// Gets the record for `data_id`, pending or ready.
    pub fn get(&self, data_id: &DataId) -> Option<Arc<BlockDataRecord<T>>> {
        self.records
            .get(data_id)
            .map(|record| Arc::clone(record.value()))
    }

    /// Removes a ready record from the cache, returning `true` if one was removed.
    ///
    /// Pending records belong to their writer and are left alone.
    pub fn evict(&self, data_id: &DataId) -> bool {
        self.records
            .remove_if(data_id, |_, record| record.is_ready())
            .is_some()
    }

    /// Returns the amount of records in the cache, pending or ready.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the cache holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use tokio::time::timeout;
    use tokio_test::{assert_pending, assert_ready, task};

    use super::*;

    fn id(n: u8) -> DataId {
        DataId::from_bytes(vec![n; 4])
    }

    fn created(lookup: Option<CacheLookup<u32>>) -> RecordWriter<u32> {
        match lookup {
            Some(CacheLookup::Created(writer)) => writer,
            other => panic!("expected a new record, got {other:?}"),
        }
    }

    fn existing(lookup: Option<CacheLookup<u32>>) -> Arc<BlockDataRecord<u32>> {
        match lookup {
            Some(CacheLookup::Existing(record)) => record,
            other => panic!("expected an existing record, got {other:?}"),
        }
    }

    #[test]
    fn empty_id_is_never_stored() {
        let cache = RequestCache::<u32>::new();

        assert!(cache.get_or_create(&DataId::EMPTY).is_none());
        assert!(cache.get(&DataId::EMPTY).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn only_the_first_caller_creates() {
        let cache = RequestCache::<u32>::new();

        let writer = created(cache.get_or_create(&id(1)));
        let record = existing(cache.get_or_create(&id(1)));

        assert!(Arc::ptr_eq(writer.record(), &record));
        assert!(!record.is_ready());
        assert!(record.transactions().is_none());
        assert!(cache.get(&id(1)).is_some());

        // A different ID gets its own record.
        let _other = created(cache.get_or_create(&id(2)));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn complete_makes_record_ready() {
        let cache = RequestCache::<u32>::new();

        let writer = created(cache.get_or_create(&id(1)));
        writer.complete(vec![1, 2, 3], Bytes::from_static(b"abc"));

        let record = cache.get(&id(1)).unwrap();
        assert!(record.is_ready());
        assert_eq!(record.transactions(), Some(&[1, 2, 3][..]));
        assert_eq!(record.encoded_transactions().unwrap().as_ref(), b"abc");

        let again = existing(cache.get_or_create(&id(1)));
        assert!(Arc::ptr_eq(&record, &again));
    }

    #[test]
    fn dropped_writer_removes_record() {
        let cache = RequestCache::<u32>::new();

        drop(created(cache.get_or_create(&id(1))));
        assert!(cache.get(&id(1)).is_none());

        // The next caller becomes the writer.
        let _writer = created(cache.get_or_create(&id(1)));
    }

    #[tokio::test]
    async fn waiters_see_completion() {
        let cache = RequestCache::<u32>::new();

        let writer = created(cache.get_or_create(&id(1)));
        let record = existing(cache.get_or_create(&id(1)));

        let waiter = tokio::spawn(async move { record.wait_ready().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        writer.complete(vec![9], Bytes::from_static(b"x"));

        assert!(timeout(Duration::from_secs(2), waiter).await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn waiters_see_abandonment() {
        let cache = RequestCache::<u32>::new();

        let writer = created(cache.get_or_create(&id(1)));
        let record = existing(cache.get_or_create(&id(1)));

        let waiter = tokio::spawn(async move { record.wait_ready().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(writer);

        assert!(!timeout(Duration::from_secs(2), waiter).await.unwrap().unwrap());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn ready_record_does_not_block() {
        let cache = RequestCache::<u32>::new();
        let record = created(cache.get_or_create(&id(1))).complete(vec![], Bytes::new());

        assert!(record.wait_ready().await);
    }

    #[test]
    fn creating_a_record_wakes_waiters() {
        let cache = RequestCache::<u32>::new();

        let mut created_1 = task::spawn(cache.record_created());
        assert_pending!(created_1.poll());

        let writer = created(cache.get_or_create(&id(1)));
        assert!(created_1.is_woken());
        assert_ready!(created_1.poll());

        let mut created_2 = task::spawn(cache.record_created());
        assert_pending!(created_2.poll());
        // Looking up an existing record is not a new record.
        let _record = existing(cache.get_or_create(&id(1)));
        assert!(!created_2.is_woken());

        drop(writer);
        let _writer = created(cache.get_or_create(&id(1)));
        assert!(created_2.is_woken());
        assert_ready!(created_2.poll());
    }

    #[test]
    fn evict_only_removes_ready_records() {
        let cache = RequestCache::<u32>::new();

        let writer = created(cache.get_or_create(&id(1)));
        assert!(!cache.evict(&id(1)));

        writer.complete(vec![1], Bytes::from_static(b"1"));
        assert!(cache.evict(&id(1)));
        assert!(cache.is_empty());
    }
}
