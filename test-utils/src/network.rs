//! A mock peer-to-peer network.
//!
//! [`MockNetwork`] is a [`tower::Service`] that answers sync requests from in-memory
//! [`MockHost`]s, one per [`PeerId`].
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    task::{Context, Poll},
    time::Duration,
};

use bytes::Bytes;
use dashmap::DashMap;
use futures::{future::BoxFuture, FutureExt};
use tower::Service;

use cadence_types::{
    BorshCodec, CommittedHeader, DataId, Height, Marshaler, PeerId, SyncRequest, SyncResponse,
};

use crate::chain::MockBlock;

/// A single peer on a [`MockNetwork`].
///
/// Headers are served [`BorshCodec`] encoded.
#[derive(Debug, Default)]
pub struct MockHost {
    headers: DashMap<Height, CommittedHeader>,
    block_data: DashMap<DataId, Bytes>,

    unreachable: AtomicBool,
    response_delay_ms: AtomicU64,

    header_requests: AtomicUsize,
    block_data_requests: AtomicUsize,
}

impl MockHost {
    /// Stores a committed header, to be served at its height.
    pub fn save_committed_header(&self, committed: CommittedHeader) {
        self.headers.insert(committed.header.height, committed);
    }

    /// Stores block data, to be served for `data_id`.
    ///
    /// Nothing checks `block_data` actually matches `data_id`.
    pub fn save_block_data(&self, data_id: DataId, block_data: Bytes) {
        self.block_data.insert(data_id, block_data);
    }

    /// Stores a block's header and, if it has any, its data.
    pub fn save_block(&self, block: &MockBlock) {
        self.save_committed_header(block.committed.clone());

        if !block.data_id().is_empty() {
            self.save_block_data(block.data_id().clone(), block.encoded.clone());
        }
    }

    /// Makes every request to this host fail with a transport error.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::Release);
    }

    /// Delays every response from this host.
    pub fn set_response_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.response_delay_ms.store(millis, Ordering::Release);
    }

    /// The amount of header requests this host has received.
    pub fn header_requests(&self) -> usize {
        self.header_requests.load(Ordering::Acquire)
    }

    /// The amount of block data requests this host has received.
    pub fn block_data_requests(&self) -> usize {
        self.block_data_requests.load(Ordering::Acquire)
    }

    async fn handle(&self, req: SyncRequest) -> Result<SyncResponse, tower::BoxError> {
        let counter = match req {
            SyncRequest::CommittedHeader { .. } => &self.header_requests,
            SyncRequest::BlockData { .. } => &self.block_data_requests,
        };
        counter.fetch_add(1, Ordering::AcqRel);

        let delay = self.response_delay_ms.load(Ordering::Acquire);
        if delay != 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.unreachable.load(Ordering::Acquire) {
            return Err("peer unreachable".into());
        }

        let res = match req {
            SyncRequest::CommittedHeader { height, .. } => {
                self.headers.get(&height).map_or(SyncResponse::NotFound, |committed| {
                    SyncResponse::CommittedHeader(
                        BorshCodec.marshal_committed_header(&committed).into(),
                    )
                })
            }
            SyncRequest::BlockData { data_id, .. } => self
                .block_data
                .get(&data_id)
                .map_or(SyncResponse::NotFound, |data| {
                    SyncResponse::BlockData(data.value().clone())
                }),
        };

        Ok(res)
    }
}

/// A mock network of [`MockHost`]s.
///
/// Requests to a peer with no host fail with a transport error.
#[derive(Debug, Clone, Default)]
pub struct MockNetwork {
    hosts: Arc<DashMap<PeerId, Arc<MockHost>>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a new, empty host for `peer`, replacing any existing one.
    pub fn add_host(&self, peer: PeerId) -> Arc<MockHost> {
        let host = Arc::new(MockHost::default());
        self.hosts.insert(peer, Arc::clone(&host));
        host
    }

    /// Returns the host for `peer`.
    pub fn host(&self, peer: &PeerId) -> Option<Arc<MockHost>> {
        self.hosts.get(peer).map(|host| Arc::clone(host.value()))
    }
}

impl Service<SyncRequest> for MockNetwork {
    type Response = SyncResponse;
    type Error = tower::BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: SyncRequest) -> Self::Future {
        let host = self.host(&req.peer());

        async move {
            let Some(host) = host else {
                return Err("unknown peer".into());
            };

            host.handle(req).await
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    use cadence_types::Unmarshaler;

    use super::*;
    use crate::{chain::ChainFixture, transactions::MockTransaction};

    #[tokio::test]
    async fn serves_saved_blocks() {
        let network = MockNetwork::new();
        let host = network.add_host(PeerId([1; 32]));

        let block = ChainFixture::new(1).next_block(&[MockTransaction::new(1)]);
        host.save_block(&block);

        let res = network
            .clone()
            .oneshot(SyncRequest::CommittedHeader {
                peer: PeerId([1; 32]),
                height: 1,
            })
            .await
            .unwrap();
        let SyncResponse::CommittedHeader(bytes) = res else {
            panic!("unexpected response: {res:?}");
        };
        assert_eq!(
            BorshCodec.unmarshal_committed_header(&bytes).unwrap(),
            block.committed
        );

        let res = network
            .clone()
            .oneshot(SyncRequest::BlockData {
                peer: PeerId([1; 32]),
                height: 1,
                data_id: block.data_id().clone(),
            })
            .await
            .unwrap();
        assert_eq!(res, SyncResponse::BlockData(block.encoded.clone()));

        assert_eq!(host.header_requests(), 1);
        assert_eq!(host.block_data_requests(), 1);
    }

    #[tokio::test]
    async fn missing_data_is_not_found() {
        let network = MockNetwork::new();
        network.add_host(PeerId([1; 32]));

        let res = network
            .oneshot(SyncRequest::CommittedHeader {
                peer: PeerId([1; 32]),
                height: 9,
            })
            .await
            .unwrap();
        assert_eq!(res, SyncResponse::NotFound);
    }

    #[tokio::test]
    async fn unknown_and_unreachable_peers_error() {
        let network = MockNetwork::new();
        let host = network.add_host(PeerId([1; 32]));
        host.set_unreachable(true);

        for peer in [PeerId([1; 32]), PeerId([2; 32])] {
            let res = network
                .clone()
                .oneshot(SyncRequest::CommittedHeader { peer, height: 1 })
                .await;
            assert!(res.is_err());
        }
    }
}
