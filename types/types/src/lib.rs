//! Cadence shared data types.
//!
//! This crate holds the types passed between the sync client, the peer-to-peer
//! transport and the consensus engine, along with the small traits that let
//! those collaborators be plugged in:
//!
//! - [`Transaction`] / [`TxDecoder`]: the application's transaction format.
//! - [`Unmarshaler`]: the wire format of [`CommittedHeader`]s.
//!
//! Nothing in here does any I/O.

mod block;
mod codec;
mod data_id;
mod peer;
mod replay;
mod transaction;
mod transport;

pub use block::{BlockHeader, CommitProof, CommittedHeader, SignatureProof};
pub use codec::{BorshCodec, Marshaler, UnmarshalError, Unmarshaler};
pub use data_id::DataId;
pub use peer::PeerId;
pub use replay::{ReplayedHeaderError, ReplayedHeaderRequest, ReplayedHeaderResponse};
pub use transaction::{Transaction, TxDecodeError, TxDecoder};
pub use transport::{SyncRequest, SyncResponse};

/// A block height.
pub type Height = u64;

/// A consensus round within a height.
pub type Round = u32;
