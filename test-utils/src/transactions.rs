//! Mock transactions.
use cadence_types::{Transaction, TxDecodeError, TxDecoder};

/// A transaction that is just its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockTransaction {
    bytes: Vec<u8>,
    hash: [u8; 32],
}

impl MockTransaction {
    /// Returns a transaction with unique bytes for every `n`.
    pub fn new(n: u64) -> Self {
        Self::from_bytes(format!("tx-{n}").into_bytes())
    }

    /// Returns a transaction with the given bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let hash = blake3::hash(&bytes).into();
        Self { bytes, hash }
    }
}

impl Transaction for MockTransaction {
    fn hash(&self) -> [u8; 32] {
        self.hash
    }

    fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Decodes [`MockTransaction`]s, rejecting empty ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockTxDecoder;

impl TxDecoder for MockTxDecoder {
    type Tx = MockTransaction;

    fn decode(&self, bytes: &[u8]) -> Result<Self::Tx, TxDecodeError> {
        if bytes.is_empty() {
            return Err(TxDecodeError::Empty);
        }

        Ok(MockTransaction::from_bytes(bytes.to_vec()))
    }
}
