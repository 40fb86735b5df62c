//! # Block Data
//!
//! This crate contains the canonical encoding of a block's transactions and the
//! [`DataId`] derived from them.
//!
//! ## Encoding
//!
//! Block data is the ordered list of a block's transactions:
//!
//! ```text
//! varint(tx count) || for each tx: varint(tx len) || tx bytes
//! ```
//!
//! A block with no transactions encodes to zero bytes.
//!
//! ## Data IDs
//!
//! A [`DataId`] commits to the height and round the data was proposed at, the
//! number of transactions, the size of the encoded data and the ordered list of
//! transaction hashes. See [`data_id`] for the layout.
//!
//! Reordering transactions keeps the encoded size the same but changes the ID,
//! which is what lets a receiver detect a peer serving the right transactions in
//! the wrong order.
use bytes::{Buf, BufMut};

use cadence_types::{DataId, Height, Round, Transaction};

mod codec;
mod varint;

pub use codec::{decode_block_data, encode_block_data, BlockDataError, MAX_TRANSACTION_SIZE};

/// The length of a non-empty [`DataId`].
pub const DATA_ID_LEN: usize = 8 + 4 + 8 + 4 + 32;

/// The fields of a non-empty [`DataId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataIdParts {
    pub height: Height,
    pub round: Round,
    pub tx_count: u64,
    /// The size of the encoded block data, in bytes.
    pub data_size: u32,
    /// The hash over every transaction hash, in order.
    pub tx_set_hash: [u8; 32],
}

/// An error parsing a [`DataId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DataIdError {
    #[error("The data ID is the empty data ID.")]
    Empty,
    #[error("The data ID had an invalid length: {0}.")]
    InvalidLength(usize),
}

/// Builds the [`DataId`] of a block's data.
///
/// `data_size` must be the size returned from [`encode_block_data`] for `txs`.
///
/// If `txs` is empty this always returns [`DataId::EMPTY`].
///
/// Layout (big endian):
///
/// ```text
/// height (8) || round (4) || tx count (8) || data size (4) || blake3(tx hashes) (32)
/// ```
pub fn data_id<T: Transaction>(height: Height, round: Round, data_size: u32, txs: &[T]) -> DataId {
    if txs.is_empty() {
        return DataId::EMPTY;
    }

    let mut hasher = blake3::Hasher::new();
    for tx in txs {
        hasher.update(&tx.hash());
    }

    let mut id = Vec::with_capacity(DATA_ID_LEN);
    id.put_u64(height);
    id.put_u32(round);
    id.put_u64(txs.len() as u64);
    id.put_u32(data_size);
    id.put_slice(hasher.finalize().as_bytes());

    DataId::from_bytes(id)
}

/// Splits a [`DataId`] back into its fields.
pub fn parse_data_id(id: &DataId) -> Result<DataIdParts, DataIdError> {
    if id.is_empty() {
        return Err(DataIdError::Empty);
    }

    let bytes = id.as_bytes();
    if bytes.len() != DATA_ID_LEN {
        return Err(DataIdError::InvalidLength(bytes.len()));
    }

    let mut bytes = bytes;
    let height = bytes.get_u64();
    let round = bytes.get_u32();
    let tx_count = bytes.get_u64();
    let data_size = bytes.get_u32();
    let mut tx_set_hash = [0; 32];
    bytes.copy_to_slice(&mut tx_set_hash);

    Ok(DataIdParts {
        height,
        round,
        tx_count,
        data_size,
        tx_set_hash,
    })
}

#[cfg(test)]
pub(crate) mod test_tx {
    use cadence_types::{Transaction, TxDecodeError, TxDecoder};

    /// A transaction that is just its bytes, hashed with blake3.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) struct BytesTx(pub(crate) Vec<u8>);

    impl Transaction for BytesTx {
        fn hash(&self) -> [u8; 32] {
            *blake3::hash(&self.0).as_bytes()
        }

        fn bytes(&self) -> &[u8] {
            &self.0
        }
    }

    pub(crate) struct BytesTxDecoder;

    impl TxDecoder for BytesTxDecoder {
        type Tx = BytesTx;

        fn decode(&self, bytes: &[u8]) -> Result<BytesTx, TxDecodeError> {
            if bytes.is_empty() {
                return Err(TxDecodeError::Empty);
            }

            Ok(BytesTx(bytes.to_vec()))
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use proptest::{collection::vec, prelude::*};

    use super::{test_tx::BytesTx, *};

    fn txs(raw: &[&[u8]]) -> Vec<BytesTx> {
        raw.iter().map(|tx| BytesTx(tx.to_vec())).collect()
    }

    #[test]
    fn no_transactions_is_the_empty_id() {
        let none: &[BytesTx] = &[];

        assert_eq!(data_id(1, 0, 0, none), DataId::EMPTY);
        assert_eq!(data_id(500, 7, 0, none), DataId::EMPTY);
        assert_eq!(parse_data_id(&DataId::EMPTY), Err(DataIdError::Empty));
    }

    #[test]
    fn reordered_transactions_keep_size_but_change_id() {
        let txs_12 = txs(&[b"tx one", b"tx two"]);
        let txs_21 = txs(&[b"tx two", b"tx one"]);

        let (_, size_12) = encode_block_data(&txs_12);
        let (_, size_21) = encode_block_data(&txs_21);
        assert_eq!(size_12, size_21);

        let size = u32::try_from(size_12).unwrap();
        assert_ne!(data_id(1, 0, size, &txs_12), data_id(1, 0, size, &txs_21));
    }

    #[test]
    fn every_input_is_bound_into_the_id() {
        let abc = txs(&[b"abc"]);
        let id = data_id(3, 1, 5, &abc);

        assert_eq!(id, data_id(3, 1, 5, &abc));
        assert_ne!(id, data_id(4, 1, 5, &abc));
        assert_ne!(id, data_id(3, 2, 5, &abc));
        assert_ne!(id, data_id(3, 1, 6, &abc));
        assert_ne!(id, data_id(3, 1, 5, &txs(&[b"abd"])));
    }

    #[test]
    fn parse_recovers_fields() {
        let txs = txs(&[b"a", b"b", b"c"]);
        let id = data_id(42, 3, 10, &txs);

        let parts = parse_data_id(&id).unwrap();
        assert_eq!(parts.height, 42);
        assert_eq!(parts.round, 3);
        assert_eq!(parts.tx_count, 3);
        assert_eq!(parts.data_size, 10);
        assert_eq!(&id.as_bytes()[DATA_ID_LEN - 32..], &parts.tx_set_hash);
    }

    #[test]
    fn parse_rejects_bad_length() {
        assert_eq!(
            parse_data_id(&DataId::from_bytes([0_u8; 10])),
            Err(DataIdError::InvalidLength(10))
        );
    }

    proptest! {
        #[test]
        fn ids_differ_when_transactions_differ(
            a in vec(vec(any::<u8>(), 1..32), 1..8),
            b in vec(vec(any::<u8>(), 1..32), 1..8),
        ) {
            prop_assume!(a != b);

            let a = a.into_iter().map(BytesTx).collect::<Vec<_>>();
            let b = b.into_iter().map(BytesTx).collect::<Vec<_>>();

            prop_assert_ne!(data_id(1, 0, 100, &a), data_id(1, 0, 100, &b));
        }
    }
}
