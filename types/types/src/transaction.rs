use std::fmt::Debug;

/// A transaction, as far as block data is concerned.
///
/// The sync client never looks inside a transaction, it only needs the bytes to
/// encode a block's data and the hash to bind the transaction into a
/// [`DataId`](crate::DataId).
pub trait Transaction: Clone + Debug + Send + Sync + 'static {
    /// The transaction's hash.
    fn hash(&self) -> [u8; 32];

    /// The transaction's raw bytes, exactly as they are decoded by a [`TxDecoder`].
    fn bytes(&self) -> &[u8];
}

/// Turns raw transaction bytes back into a [`Transaction`].
///
/// Decoding must be deterministic: the same bytes must always decode to a
/// transaction with the same hash.
pub trait TxDecoder: Send + Sync + 'static {
    type Tx: Transaction;

    fn decode(&self, bytes: &[u8]) -> Result<Self::Tx, TxDecodeError>;
}

/// An error decoding a transaction.
#[derive(Debug, thiserror::Error)]
pub enum TxDecodeError {
    #[error("The transaction bytes were empty.")]
    Empty,
    #[error("The transaction was invalid: {0}")]
    Invalid(String),
}
