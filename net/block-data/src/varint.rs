//! Length prefixes used by the block data encoding.
//!
//! The low 2 bits of the first byte give the width of the prefix (1, 2, 4 or 8
//! bytes, little endian), the value is stored in the remaining bits. Only the
//! shortest width that fits a value is accepted when reading, so every value has
//! exactly one encoding.
use bytes::{Buf, BufMut};

use crate::BlockDataError;

const FITS_IN_ONE_BYTE: u64 = (1 << 6) - 1;
const FITS_IN_TWO_BYTES: u64 = (1 << 14) - 1;
const FITS_IN_FOUR_BYTES: u64 = (1 << 30) - 1;

/// The maximum value that can be written.
pub(crate) const MAX_VARINT: u64 = (1 << 62) - 1;

/// Returns the amount of bytes [`write_varint`] will use for `number`.
pub(crate) const fn varint_len(number: u64) -> usize {
    if number <= FITS_IN_ONE_BYTE {
        1
    } else if number <= FITS_IN_TWO_BYTES {
        2
    } else if number <= FITS_IN_FOUR_BYTES {
        4
    } else {
        8
    }
}

/// Writes `number` to `w`.
///
/// # Panics
/// This panics if `number` is more than [`MAX_VARINT`].
pub(crate) fn write_varint<B: BufMut>(w: &mut B, number: u64) {
    assert!(number <= MAX_VARINT, "varint out of range");

    let len = varint_len(number);
    let marked = (number << 2) | u64::from(len.trailing_zeros());

    w.put_uint_le(marked, len);
}

/// Reads a varint from `r`.
pub(crate) fn read_varint<B: Buf>(r: &mut B) -> Result<u64, BlockDataError> {
    if !r.has_remaining() {
        return Err(BlockDataError::Truncated);
    }

    let len = 1_usize << (r.chunk()[0] & 0b11);
    if r.remaining() < len {
        return Err(BlockDataError::Truncated);
    }

    let number = r.get_uint_le(len) >> 2;

    if varint_len(number) != len {
        return Err(BlockDataError::NonCanonicalLength);
    }

    Ok(number)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn written(number: u64) -> Vec<u8> {
        let mut w = Vec::new();
        write_varint(&mut w, number);
        w
    }

    #[test]
    fn widths() {
        assert_eq!(written(0), [0]);
        assert_eq!(written(FITS_IN_ONE_BYTE), [252]);
        assert_eq!(written(FITS_IN_ONE_BYTE + 1).len(), 2);
        assert_eq!(written(FITS_IN_TWO_BYTES).len(), 2);
        assert_eq!(written(FITS_IN_TWO_BYTES + 1).len(), 4);
        assert_eq!(written(FITS_IN_FOUR_BYTES).len(), 4);
        assert_eq!(written(FITS_IN_FOUR_BYTES + 1).len(), 8);
        assert_eq!(written(MAX_VARINT).len(), 8);

        for number in [0, 1, 63, 64, 16_383, 16_384, FITS_IN_FOUR_BYTES + 1, MAX_VARINT] {
            assert_eq!(written(number).len(), varint_len(number));
            assert_eq!(read_varint(&mut written(number).as_slice()).unwrap(), number);
        }
    }

    #[test]
    fn truncated_varint() {
        assert!(matches!(
            read_varint(&mut &[0_u8; 0][..]),
            Err(BlockDataError::Truncated)
        ));
        // Says it's 4 bytes wide but only has 2.
        assert!(matches!(
            read_varint(&mut [0b10_u8, 0].as_slice()),
            Err(BlockDataError::Truncated)
        ));
    }

    #[test]
    fn non_minimal_varint_is_rejected() {
        // 1, written with a 2 byte prefix.
        assert!(matches!(
            read_varint(&mut [0b0000_0101_u8, 0].as_slice()),
            Err(BlockDataError::NonCanonicalLength)
        ));
    }
}
