//! # Cadence Sync Client
//!
//! This crate catches a Cadence node up to the rest of the network. The consensus engine tells
//! the [`SyncClient`] which heights it is missing and the client:
//!
//! 1. Fetches the committed header for each height from a peer.
//! 2. Fetches the block's data, if it has any, and checks it against the header's
//!    [`DataId`](cadence_types::DataId) before storing it in the [`RequestCache`].
//! 3. Hands the header and its commit proof back to the engine as a
//!    [`ReplayedHeaderRequest`](cadence_types::ReplayedHeaderRequest), in height order, waiting
//!    for the engine to answer before moving on to the next height.
//!
//! Several heights are fetched at once, see [`SyncClientConfig::max_in_flight_heights`], but
//! replays are always sent one at a time.
//!
//! ## Peers
//!
//! The client only talks to peers given to it with [`SyncClient::add_peer`], through the
//! [`SyncTransport`]. A peer that fails too many requests in a row is removed from the
//! [`PeerPool`], a peer that serves block data not matching its data ID is never asked for that
//! data ID again. When there is no peer left to try the client waits for new peers.
//!
//! ## Shutdown
//!
//! A client runs until the [`CancellationToken`](tokio_util::sync::CancellationToken) it was
//! built with is cancelled, [`SyncClient::wait`] then waits for all of its tasks to exit.
mod client;
mod config;
mod constants;
mod error;
mod fetch;
mod peer_pool;
mod replay_queue;
mod request_cache;
mod sync_task;
mod transport;

pub use client::{SyncClient, SyncClientBuilder};
pub use config::SyncClientConfig;
pub use error::SyncClientBuildError;
pub use peer_pool::{Candidate, PeerPool};
pub use request_cache::{BlockDataRecord, CacheLookup, RecordWriter, RequestCache};
pub use transport::SyncTransport;

