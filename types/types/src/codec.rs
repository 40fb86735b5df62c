//! Wire format for [`CommittedHeader`]s.
//!
//! The sync client only ever needs to go from bytes to a [`CommittedHeader`], so
//! that is all [`Unmarshaler`] asks for. [`BorshCodec`] is the format the node uses
//! by default and is also what the test host serves.
use crate::CommittedHeader;

/// An error unmarshalling a [`CommittedHeader`].
#[derive(Debug, thiserror::Error)]
#[error("Failed to unmarshal committed header: {0}")]
pub struct UnmarshalError(#[from] std::io::Error);

/// Decodes wire-format [`CommittedHeader`]s.
pub trait Unmarshaler: Send + Sync + 'static {
    fn unmarshal_committed_header(&self, bytes: &[u8]) -> Result<CommittedHeader, UnmarshalError>;
}

/// Encodes [`CommittedHeader`]s into their wire format.
pub trait Marshaler: Send + Sync + 'static {
    fn marshal_committed_header(&self, header: &CommittedHeader) -> Vec<u8>;
}

/// A [`borsh`] based header codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct BorshCodec;

impl Unmarshaler for BorshCodec {
    fn unmarshal_committed_header(&self, bytes: &[u8]) -> Result<CommittedHeader, UnmarshalError> {
        Ok(borsh::from_slice(bytes)?)
    }
}

impl Marshaler for BorshCodec {
    fn marshal_committed_header(&self, header: &CommittedHeader) -> Vec<u8> {
        borsh::to_vec(header).expect("Writing to a Vec can not fail")
    }
}
