use bytes::{BufMut, Bytes};

use cadence_types::{Transaction, TxDecodeError, TxDecoder};

use crate::varint::{read_varint, varint_len, write_varint};

/// The maximum size of a single encoded transaction.
///
/// This is a sanity limit so a bogus length prefix can't make us treat the rest
/// of a response as one transaction.
pub const MAX_TRANSACTION_SIZE: usize = 16 * 1024 * 1024;

/// An error decoding block data.
#[derive(Debug, thiserror::Error)]
pub enum BlockDataError {
    #[error("The block data ended early.")]
    Truncated,
    #[error("A length prefix was not minimally encoded.")]
    NonCanonicalLength,
    #[error("Non-empty block data declared zero transactions.")]
    ZeroTransactions,
    #[error("A transaction was larger than the maximum size: {0} bytes.")]
    TransactionTooLarge(u64),
    #[error("{0} bytes remained after the last transaction.")]
    TrailingBytes(usize),
    #[error("Failed to decode a transaction: {0}")]
    Transaction(#[from] TxDecodeError),
}

/// Encodes a block's transactions, returning the encoded bytes and their length.
///
/// The encoding keeps the order of `txs`. No transactions encode to no bytes.
///
/// Every transaction must be at most [`MAX_TRANSACTION_SIZE`] bytes, [`decode_block_data`]
/// rejects block data holding a larger one.
pub fn encode_block_data<T: Transaction>(txs: &[T]) -> (Bytes, usize) {
    if txs.is_empty() {
        return (Bytes::new(), 0);
    }

    debug_assert!(
        txs.iter().all(|tx| tx.bytes().len() <= MAX_TRANSACTION_SIZE),
        "transaction larger than MAX_TRANSACTION_SIZE"
    );

    let size = varint_len(txs.len() as u64)
        + txs
            .iter()
            .map(|tx| varint_len(tx.bytes().len() as u64) + tx.bytes().len())
            .sum::<usize>();

    let mut buf = Vec::with_capacity(size);

    write_varint(&mut buf, txs.len() as u64);
    for tx in txs {
        let tx = tx.bytes();

        write_varint(&mut buf, tx.len() as u64);
        buf.put_slice(tx);
    }

    debug_assert_eq!(buf.len(), size);

    (Bytes::from(buf), size)
}

/// Decodes block data produced by [`encode_block_data`], using `decoder` for each
/// transaction.
///
/// The whole input must be consumed.
pub fn decode_block_data<D: TxDecoder>(
    decoder: &D,
    mut bytes: &[u8],
) -> Result<Vec<D::Tx>, BlockDataError> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }

    let tx_count = read_varint(&mut bytes)?;
    if tx_count == 0 {
        return Err(BlockDataError::ZeroTransactions);
    }

    // Don't trust the count for the allocation, every transaction needs at least a 1 byte prefix.
    let mut txs = Vec::with_capacity(usize::try_from(tx_count).unwrap_or(usize::MAX).min(bytes.len()));

    for _ in 0..tx_count {
        let len = read_varint(&mut bytes)?;
        let len = usize::try_from(len)
            .ok()
            .filter(|len| *len <= MAX_TRANSACTION_SIZE)
            .ok_or(BlockDataError::TransactionTooLarge(len))?;

        if bytes.len() < len {
            return Err(BlockDataError::Truncated);
        }

        let (tx, rest) = bytes.split_at(len);
        txs.push(decoder.decode(tx)?);
        bytes = rest;
    }

    if !bytes.is_empty() {
        return Err(BlockDataError::TrailingBytes(bytes.len()));
    }

    Ok(txs)
}
