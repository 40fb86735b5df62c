use std::time::Duration;

/// The default timeout for a single header or block data request.
pub(crate) const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The default amount of heights that can be fetched at once.
pub(crate) const DEFAULT_MAX_IN_FLIGHT_HEIGHTS: u64 = 4;

/// The default amount of consecutive failed requests before a peer is removed from the peer pool.
pub(crate) const DEFAULT_MAX_PEER_FAILURES: usize = 3;

/// The default capacity of the channel carrying requests from a [`SyncClient`](crate::SyncClient)
/// handle to its supervisor task.
pub(crate) const DEFAULT_COMMAND_BUFFER: usize = 16;
