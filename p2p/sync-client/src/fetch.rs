//! # Fetch Workers
//!
//! A fetch worker gets a single height ready to be replayed: it fetches and decodes the
//! committed header, then makes sure the block's data is in the [`RequestCache`].
//!
//! A worker never gives up on its height. Peers that fail are skipped and, once there are no
//! peers left to try, the worker waits for new peers to be added. The only way a worker stops
//! without a result is the sync client shutting down.
use std::{collections::HashSet, sync::Arc, time::Duration};

use bytes::Bytes;
use dashmap::DashMap;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tower::{Service, ServiceExt};
use tracing::instrument;

use cadence_block_data::{data_id, decode_block_data, parse_data_id};
use cadence_helper::asynch::{rayon_spawn_async, until_cancelled};
use cadence_types::{
    BlockHeader, CommittedHeader, DataId, Height, PeerId, SyncRequest, SyncResponse, TxDecoder,
    Unmarshaler,
};

use crate::{
    error::FetchError,
    peer_pool::{Candidate, PeerPool, TriedPeers},
    request_cache::{CacheLookup, RequestCache},
    transport::SyncTransport,
    SyncClientConfig,
};

/// State shared by every fetch worker of a sync client.
pub(crate) struct FetchShared<U, D: TxDecoder> {
    pub(crate) unmarshaler: U,
    pub(crate) tx_decoder: Arc<D>,
    pub(crate) peer_pool: Arc<PeerPool>,
    pub(crate) request_cache: Arc<RequestCache<D::Tx>>,
    /// Peers that served data not matching a [`DataId`], they are never asked for that ID again.
    pub(crate) bad_data_sources: DashMap<DataId, HashSet<PeerId>>,
    pub(crate) config: SyncClientConfig,
    pub(crate) cancellation_token: CancellationToken,
}

impl<U, D: TxDecoder> FetchShared<U, D> {
    fn is_bad_data_source(&self, data_id: &DataId, peer: &PeerId) -> bool {
        self.bad_data_sources
            .get(data_id)
            .is_some_and(|peers| peers.contains(peer))
    }

    /// Applies the consequences of a failed request to the peer that caused it.
    fn handle_peer_failure(&self, candidate: &Candidate, data_id: Option<&DataId>, err: &FetchError) {
        if let Some(data_id) = data_id.filter(|_| err.is_integrity_failure()) {
            tracing::warn!(peer = %candidate.peer, %data_id, "Peer served block data not matching its data ID.");
            self.bad_data_sources
                .entry(data_id.clone())
                .or_default()
                .insert(candidate.peer);
        }

        if err.counts_against_peer() {
            self.peer_pool
                .record_failure(candidate, self.config.max_peer_failures);
        }
    }
}

/// A height that is ready to be replayed.
#[derive(Debug)]
pub(crate) struct FetchedHeight {
    pub(crate) height: Height,
    pub(crate) committed: CommittedHeader,
}

/// Fetches everything needed to replay `height`.
///
/// Returns [`None`] if the sync client was shut down first.
#[instrument(level = "debug", name = "fetch_height", skip_all, fields(height = height))]
pub(crate) async fn fetch_height<T, U, D>(
    shared: Arc<FetchShared<U, D>>,
    mut transport: T,
    height: Height,
) -> Option<FetchedHeight>
where
    T: SyncTransport,
    U: Unmarshaler,
    D: TxDecoder,
{
    until_cancelled(&shared.cancellation_token, async {
        let committed = fetch_committed_header(&shared, &mut transport, height).await;
        fetch_block_data(&shared, &mut transport, &committed.header).await;

        tracing::debug!("Height ready to replay.");
        FetchedHeight { height, committed }
    })
    .await
}

/// Sends a single request, with the configured timeout.
async fn call_peer<T: SyncTransport>(
    transport: &mut T,
    request_timeout: Duration,
    req: SyncRequest,
) -> Result<SyncResponse, FetchError> {
    timeout(request_timeout, async {
        transport.ready().await?.call(req).await
    })
    .await
    .map_err(|_| FetchError::TimedOut)?
    .map_err(FetchError::Transport)
}

/// Fetches the committed header at `height`, trying peers until one serves a valid one.
async fn fetch_committed_header<T, U, D>(
    shared: &FetchShared<U, D>,
    transport: &mut T,
    height: Height,
) -> CommittedHeader
where
    T: SyncTransport,
    U: Unmarshaler,
    D: TxDecoder,
{
    let mut tried = TriedPeers::default();

    loop {
        let candidate = shared
            .peer_pool
            .wait_for_candidate(|peer, registration| tried.contains(peer, registration))
            .await;

        match request_committed_header(shared, transport, candidate.peer, height).await {
            Ok(committed) => {
                shared.peer_pool.record_success(&candidate);
                return committed;
            }
            Err(e) => {
                tracing::debug!(peer = %candidate.peer, "Failed to fetch committed header: {e}");
                shared.handle_peer_failure(&candidate, None, &e);
                tried.insert(candidate);
            }
        }
    }
}

async fn request_committed_header<T, U, D>(
    shared: &FetchShared<U, D>,
    transport: &mut T,
    peer: PeerId,
    height: Height,
) -> Result<CommittedHeader, FetchError>
where
    T: SyncTransport,
    U: Unmarshaler,
    D: TxDecoder,
{
    let res = call_peer(
        transport,
        shared.config.request_timeout,
        SyncRequest::CommittedHeader { peer, height },
    )
    .await?;

    let bytes = match res {
        SyncResponse::CommittedHeader(bytes) => bytes,
        SyncResponse::NotFound => return Err(FetchError::NotFound),
        SyncResponse::BlockData(_) => return Err(FetchError::UnexpectedResponse),
    };

    let committed = shared.unmarshaler.unmarshal_committed_header(&bytes)?;
    check_header(&committed.header, height)?;

    Ok(committed)
}

/// Checks a header is for the height it was requested at.
fn check_header(header: &BlockHeader, height: Height) -> Result<(), FetchError> {
    if header.height != height {
        return Err(FetchError::HeightMismatch {
            expected: height,
            got: header.height,
        });
    }

    if header.data_id.is_empty() {
        return Ok(());
    }

    // No block data can ever match a data ID for another height, so a header carrying one is
    // as bad as a header for the wrong height.
    let parts = parse_data_id(&header.data_id)?;
    if parts.height != height {
        return Err(FetchError::DataIdHeightMismatch {
            expected: height,
            got: parts.height,
        });
    }

    Ok(())
}

/// Makes sure the block data for `header` is ready in the request cache.
///
/// If another worker, or another sync client sharing the cache, is already fetching the same
/// data this waits for it instead, taking over if it gives up.
async fn fetch_block_data<T, U, D>(
    shared: &FetchShared<U, D>,
    transport: &mut T,
    header: &BlockHeader,
) where
    T: SyncTransport,
    U: Unmarshaler,
    D: TxDecoder,
{
    let data_id = &header.data_id;
    if data_id.is_empty() {
        tracing::trace!("Block has no data to fetch.");
        return;
    }

    let mut tried = TriedPeers::default();

    loop {
        let record_created = shared.request_cache.record_created();
        tokio::pin!(record_created);
        // Register before looking in the cache, so a record created while we wait for a peer
        // still wakes us.
        record_created.as_mut().enable();

        if let Some(record) = shared.request_cache.get(data_id) {
            if record.wait_ready().await {
                return;
            }
            // The writer gave up, look again.
            continue;
        }

        let candidate = tokio::select! {
            biased;
            () = &mut record_created => continue,
            candidate = shared.peer_pool.wait_for_candidate(|peer, registration| {
                tried.contains(peer, registration) || shared.is_bad_data_source(data_id, peer)
            }) => candidate,
        };

        // Only hold the writer while actually fetching, so a worker waiting for peers never
        // leaves a pending record behind.
        let writer = match shared.request_cache.get_or_create(data_id) {
            Some(CacheLookup::Created(writer)) => writer,
            Some(CacheLookup::Existing(_)) => continue,
            None => return,
        };

        match request_block_data(shared, transport, candidate.peer, header).await {
            Ok((transactions, encoded)) => {
                writer.complete(transactions, encoded);
                // The record is ready now, nobody asks a peer for this ID again.
                shared.bad_data_sources.remove(data_id);
                shared.peer_pool.record_success(&candidate);
                return;
            }
            Err(e) => {
                drop(writer);
                tracing::debug!(peer = %candidate.peer, "Failed to fetch block data: {e}");
                shared.handle_peer_failure(&candidate, Some(data_id), &e);
                tried.insert(candidate);
            }
        }
    }
}

async fn request_block_data<T, U, D>(
    shared: &FetchShared<U, D>,
    transport: &mut T,
    peer: PeerId,
    header: &BlockHeader,
) -> Result<(Vec<D::Tx>, Bytes), FetchError>
where
    T: SyncTransport,
    U: Unmarshaler,
    D: TxDecoder,
{
    let res = call_peer(
        transport,
        shared.config.request_timeout,
        SyncRequest::BlockData {
            peer,
            height: header.height,
            data_id: header.data_id.clone(),
        },
    )
    .await?;

    let encoded = match res {
        SyncResponse::BlockData(bytes) => bytes,
        SyncResponse::NotFound => return Err(FetchError::NotFound),
        SyncResponse::CommittedHeader(_) => return Err(FetchError::UnexpectedResponse),
    };

    let tx_decoder = Arc::clone(&shared.tx_decoder);
    let expected = header.data_id.clone();

    rayon_spawn_async(move || -> Result<_, FetchError> {
        let transactions = verify_block_data(tx_decoder.as_ref(), &expected, &encoded)?;
        Ok((transactions, encoded))
    })
    .await
}

/// Decodes block data and checks it is the data `expected` identifies.
fn verify_block_data<D: TxDecoder>(
    tx_decoder: &D,
    expected: &DataId,
    encoded: &[u8],
) -> Result<Vec<D::Tx>, FetchError> {
    let parts = parse_data_id(expected)?;

    let Ok(data_size) = u32::try_from(encoded.len()) else {
        return Err(FetchError::DataIdMismatch);
    };
    if data_size != parts.data_size {
        return Err(FetchError::DataIdMismatch);
    }

    let transactions = decode_block_data(tx_decoder, encoded)?;

    if data_id(parts.height, parts.round, data_size, &transactions) != *expected {
        return Err(FetchError::DataIdMismatch);
    }

    Ok(transactions)
}
