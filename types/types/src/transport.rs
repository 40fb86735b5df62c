//! Requests the sync client makes over the peer-to-peer transport.
//!
//! The transport is a `tower::Service` taking a [`SyncRequest`] and returning a
//! [`SyncResponse`], with errors as `tower::BoxError`. An error means the exchange
//! itself failed (the peer was unreachable, the stream broke, ...); a peer that
//! is reachable but simply doesn't have the data answers [`SyncResponse::NotFound`].
use bytes::Bytes;

use crate::{DataId, Height, PeerId};

/// A request to a single peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncRequest {
    /// Request the committed header, and its proof, at a height.
    ///
    /// Must be answered with [`SyncResponse::CommittedHeader`] or [`SyncResponse::NotFound`].
    CommittedHeader { peer: PeerId, height: Height },
    /// Request a block's encoded data.
    ///
    /// Must be answered with [`SyncResponse::BlockData`] or [`SyncResponse::NotFound`].
    BlockData {
        peer: PeerId,
        height: Height,
        data_id: DataId,
    },
}

impl SyncRequest {
    /// The peer this request is for.
    pub const fn peer(&self) -> PeerId {
        match self {
            Self::CommittedHeader { peer, .. } | Self::BlockData { peer, .. } => *peer,
        }
    }
}

/// A peer's response to a [`SyncRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncResponse {
    /// A wire-encoded [`CommittedHeader`](crate::CommittedHeader).
    CommittedHeader(Bytes),
    /// Encoded block data, exactly as it was stored.
    BlockData(Bytes),
    /// The peer does not have what was asked for.
    NotFound,
}
