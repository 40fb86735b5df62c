use cadence_block_data::{BlockDataError, DataIdError};
use cadence_types::{Height, UnmarshalError};

/// An error building a [`SyncClient`](crate::SyncClient).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SyncClientBuildError {
    #[error("The sync client is missing a required {0}.")]
    Missing(&'static str),
}

/// An error fetching a header or block data from a single peer.
///
/// None of these are fatal, they only decide what happens to the peer that caused them.
#[derive(Debug, thiserror::Error)]
pub(crate) enum FetchError {
    #[error("A request to a peer timed out.")]
    TimedOut,
    #[error("Transport error: {0}")]
    Transport(#[from] tower::BoxError),
    #[error("The peer did not have the requested data.")]
    NotFound,
    #[error("The peer sent a response of the wrong type.")]
    UnexpectedResponse,
    #[error(transparent)]
    Unmarshal(#[from] UnmarshalError),
    #[error("The peer sent a header at height {got}, expected {expected}.")]
    HeightMismatch { expected: Height, got: Height },
    #[error("The header carried an invalid data ID: {0}")]
    InvalidDataId(#[from] DataIdError),
    #[error("The header's data ID is for height {got}, expected {expected}.")]
    DataIdHeightMismatch { expected: Height, got: Height },
    #[error("The block data was malformed: {0}")]
    MalformedBlockData(#[from] BlockDataError),
    #[error("The block data did not match its data ID.")]
    DataIdMismatch,
}

impl FetchError {
    /// Returns `true` if the peer sent well-formed data that doesn't match what it was asked for.
    ///
    /// A peer that does this is never asked for the same data ID again.
    pub(crate) const fn is_integrity_failure(&self) -> bool {
        matches!(self, Self::DataIdMismatch)
    }

    /// Returns `true` if this error should count against the peer's health in the peer pool.
    ///
    /// Not having some data is normal, everything else is not.
    pub(crate) const fn counts_against_peer(&self) -> bool {
        !matches!(self, Self::NotFound | Self::DataIdMismatch)
    }
}
