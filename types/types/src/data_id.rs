use std::fmt::{Debug, Display, Formatter};

use borsh::{BorshDeserialize, BorshSerialize};

/// A content-derived identifier for a block's data.
///
/// The identifier binds a block's height, round, encoded data size and ordered
/// transaction set. Building one is the job of `cadence-block-data`, this type only
/// carries the bytes around.
///
/// A block with no transactions always has [`DataId::EMPTY`], regardless of its
/// height or round, and there is nothing to fetch for it.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, BorshSerialize, BorshDeserialize)]
pub struct DataId(Vec<u8>);

impl DataId {
    /// The identifier of a block with no data.
    pub const EMPTY: Self = Self(Vec::new());

    /// Wraps raw identifier bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns `true` if this is [`DataId::EMPTY`].
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for DataId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Display for DataId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return f.write_str("<empty>");
        }

        f.write_str(&hex::encode(&self.0))
    }
}

impl Debug for DataId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "DataId({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_id_is_default() {
        assert!(DataId::EMPTY.is_empty());
        assert_eq!(DataId::default(), DataId::EMPTY);
        assert_eq!(DataId::from_bytes(Vec::new()), DataId::EMPTY);
        assert!(!DataId::from_bytes([1_u8]).is_empty());
    }

    #[test]
    fn display_is_hex() {
        assert_eq!(DataId::from_bytes([0xab_u8, 0x01]).to_string(), "ab01");
        assert_eq!(DataId::EMPTY.to_string(), "<empty>");
    }
}
