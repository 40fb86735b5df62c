use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::Span;

use cadence_types::{Height, PeerId, ReplayedHeaderRequest, TxDecoder, Unmarshaler};

use crate::{
    fetch::FetchShared,
    peer_pool::PeerPool,
    request_cache::RequestCache,
    sync_task::{SyncCommand, SyncTask},
    transport::SyncTransport,
    SyncClientBuildError, SyncClientConfig,
};

/// A handle to a running sync client.
///
/// The sync client fetches committed headers and their block data from peers and hands the
/// headers to the consensus engine, one height at a time in ascending order. It does nothing
/// until it has both a range of heights, from [`SyncClient::resume_fetching`], and at least one
/// peer, from [`SyncClient::add_peer`].
///
/// The client runs until the [`CancellationToken`] it was built with is cancelled.
#[derive(Debug)]
pub struct SyncClient {
    command_tx: mpsc::Sender<SyncCommand>,
    peer_pool: Arc<PeerPool>,
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl SyncClient {
    /// Asks the client to fetch and replay the heights `[start, stop)`.
    ///
    /// Returns `true` once the range has been registered with the client. Returns `false` if the
    /// range is empty, leaves a gap after the range currently being synced, or the client has
    /// shut down.
    ///
    /// Dropping the returned future abandons the request, the range may or may not have been
    /// registered in that case.
    pub async fn resume_fetching(&self, start: Height, stop: Height) -> bool {
        if start >= stop {
            tracing::debug!(start, stop, "Ignoring empty fetch range.");
            return false;
        }

        if self.cancellation_token.is_cancelled() {
            return false;
        }

        let (resp, resp_rx) = oneshot::channel();
        if self
            .command_tx
            .send(SyncCommand::ResumeFetching { start, stop, resp })
            .await
            .is_err()
        {
            return false;
        }

        resp_rx.await.unwrap_or(false)
    }

    /// Adds a peer the client may fetch from.
    ///
    /// Returns `false` if the peer was already known or the client has shut down.
    pub fn add_peer(&self, peer: PeerId) -> bool {
        if self.cancellation_token.is_cancelled() {
            return false;
        }

        self.peer_pool.add_peer(peer)
    }

    /// The client's peer pool.
    pub const fn peer_pool(&self) -> &Arc<PeerPool> {
        &self.peer_pool
    }

    /// Waits for every task of this client to exit.
    ///
    /// This does not stop the client, cancel the [`CancellationToken`] the client was built
    /// with first.
    pub async fn wait(self) {
        self.task_tracker.close();
        self.task_tracker.wait().await;
    }
}

/// A [`SyncClient`] builder.
///
/// Every collaborator is required, only the parent span is optional.
#[derive(Debug)]
pub struct SyncClientBuilder<T, U, D: TxDecoder> {
    config: SyncClientConfig,
    transport: Option<T>,
    unmarshaler: Option<U>,
    tx_decoder: Option<D>,
    request_cache: Option<Arc<RequestCache<D::Tx>>>,
    replayed_headers_out: Option<mpsc::Sender<ReplayedHeaderRequest>>,
    parent_span: Option<Span>,
}

impl<T, U, D: TxDecoder> Default for SyncClientBuilder<T, U, D> {
    fn default() -> Self {
        Self::new(SyncClientConfig::default())
    }
}

impl<T, U, D: TxDecoder> SyncClientBuilder<T, U, D> {
    /// Creates a new builder with the given config.
    pub const fn new(config: SyncClientConfig) -> Self {
        Self {
            config,
            transport: None,
            unmarshaler: None,
            tx_decoder: None,
            request_cache: None,
            replayed_headers_out: None,
            parent_span: None,
        }
    }

    /// Sets the peer-to-peer transport requests are sent over.
    #[must_use]
    pub fn with_transport(mut self, transport: T) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the decoder for wire-encoded committed headers.
    #[must_use]
    pub fn with_unmarshaler(mut self, unmarshaler: U) -> Self {
        self.unmarshaler = Some(unmarshaler);
        self
    }

    /// Sets the decoder for the transactions in block data.
    #[must_use]
    pub fn with_tx_decoder(mut self, tx_decoder: D) -> Self {
        self.tx_decoder = Some(tx_decoder);
        self
    }

    /// Sets the request cache fetched block data is stored in.
    ///
    /// Sync clients sharing a cache never fetch the same data at the same time.
    #[must_use]
    pub fn with_request_cache(mut self, request_cache: Arc<RequestCache<D::Tx>>) -> Self {
        self.request_cache = Some(request_cache);
        self
    }

    /// Sets the channel replayed headers are sent to the consensus engine on.
    #[must_use]
    pub fn with_replayed_headers_out(
        mut self,
        replayed_headers_out: mpsc::Sender<ReplayedHeaderRequest>,
    ) -> Self {
        self.replayed_headers_out = Some(replayed_headers_out);
        self
    }

    /// Sets the span the client's task spans are children of.
    ///
    /// Defaults to the span current when [`SyncClientBuilder::build`] is called.
    #[must_use]
    pub fn with_parent_span(mut self, parent_span: Span) -> Self {
        self.parent_span = Some(parent_span);
        self
    }
}

impl<T, U, D> SyncClientBuilder<T, U, D>
where
    T: SyncTransport,
    U: Unmarshaler,
    D: TxDecoder,
{
    /// Builds and starts the sync client.
    ///
    /// The client stops once `cancellation_token` is cancelled.
    ///
    /// # Panics
    ///
    /// This must be called from inside a tokio runtime.
    pub fn build(
        self,
        cancellation_token: CancellationToken,
    ) -> Result<SyncClient, SyncClientBuildError> {
        let transport = self
            .transport
            .ok_or(SyncClientBuildError::Missing("transport"))?;
        let unmarshaler = self
            .unmarshaler
            .ok_or(SyncClientBuildError::Missing("unmarshaler"))?;
        let tx_decoder = self
            .tx_decoder
            .ok_or(SyncClientBuildError::Missing("transaction decoder"))?;
        let replayed_headers_out = self
            .replayed_headers_out
            .ok_or(SyncClientBuildError::Missing("replayed headers channel"))?;
        let request_cache = self
            .request_cache
            .ok_or(SyncClientBuildError::Missing("request cache"))?;

        let peer_pool = Arc::new(PeerPool::new());

        let shared = Arc::new(FetchShared {
            unmarshaler,
            tx_decoder: Arc::new(tx_decoder),
            peer_pool: Arc::clone(&peer_pool),
            request_cache,
            bad_data_sources: DashMap::new(),
            config: self.config,
            cancellation_token: cancellation_token.clone(),
        });

        let (command_tx, command_rx) = mpsc::channel(self.config.command_buffer.max(1));

        let task = SyncTask::new(shared, transport, replayed_headers_out, command_rx);

        let span = self.parent_span.unwrap_or_else(Span::current);
        let task_tracker = TaskTracker::new();
        task_tracker.spawn(span.in_scope(|| task.run()));

        Ok(SyncClient {
            command_tx,
            peer_pool,
            task_tracker,
            cancellation_token,
        })
    }
}
