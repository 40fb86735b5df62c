use std::time::Duration;

use crate::constants::{
    DEFAULT_COMMAND_BUFFER, DEFAULT_MAX_IN_FLIGHT_HEIGHTS, DEFAULT_MAX_PEER_FAILURES,
    DEFAULT_REQUEST_TIMEOUT,
};

/// The sync client config.
///
/// This only holds tunables, the collaborators a sync client needs are passed to the
/// [`SyncClientBuilder`](crate::SyncClientBuilder).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(deny_unknown_fields, default))]
pub struct SyncClientConfig {
    /// The timeout for a single request to a peer.
    pub request_timeout: Duration,
    /// The maximum amount of heights being fetched at once, including the next height to replay.
    ///
    /// `1` fetches heights strictly one after another, `0` is treated as `1`.
    pub max_in_flight_heights: u64,
    /// The amount of consecutive failed requests to a peer before it is removed from the peer pool.
    pub max_peer_failures: usize,
    /// The capacity of the channel between the [`SyncClient`](crate::SyncClient) handle and its task.
    pub command_buffer: usize,
}

impl SyncClientConfig {
    /// Returns [`Self::max_in_flight_heights`], with `0` mapped to `1`.
    pub(crate) fn in_flight_heights(&self) -> u64 {
        self.max_in_flight_heights.max(1)
    }
}

impl Default for SyncClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_in_flight_heights: DEFAULT_MAX_IN_FLIGHT_HEIGHTS,
            max_peer_failures: DEFAULT_MAX_PEER_FAILURES,
            command_buffer: DEFAULT_COMMAND_BUFFER,
        }
    }
}
