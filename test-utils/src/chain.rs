//! A mock chain of committed blocks.
use bytes::Bytes;

use cadence_block_data::{data_id, encode_block_data};
use cadence_types::{
    BlockHeader, CommitProof, CommittedHeader, DataId, Height, Round, SignatureProof,
};

use crate::transactions::MockTransaction;

/// A committed block, with its encoded block data.
#[derive(Debug, Clone)]
pub struct MockBlock {
    pub committed: CommittedHeader,
    pub transactions: Vec<MockTransaction>,
    /// The block data, empty if the block has no transactions.
    pub encoded: Bytes,
}

impl MockBlock {
    pub const fn height(&self) -> Height {
        self.committed.header.height
    }

    pub const fn data_id(&self) -> &DataId {
        &self.committed.header.data_id
    }
}

/// Builds a chain of [`MockBlock`]s, each linked to the one before it.
///
/// The proofs are not real signatures, they only need to be unique per block.
#[derive(Debug, Clone)]
pub struct ChainFixture {
    next_height: Height,
    round: Round,
    prev_block_hash: [u8; 32],
    prev_commit_proof: CommitProof,
}

impl ChainFixture {
    /// Returns a chain whose first block is at `initial_height`.
    pub fn new(initial_height: Height) -> Self {
        Self {
            next_height: initial_height,
            round: 0,
            prev_block_hash: [0; 32],
            prev_commit_proof: CommitProof::default(),
        }
    }

    /// Sets the round the next blocks are committed in.
    #[must_use]
    pub fn with_round(mut self, round: Round) -> Self {
        self.round = round;
        self
    }

    /// Returns the height of the next block.
    pub const fn next_height(&self) -> Height {
        self.next_height
    }

    /// Commits the next block, with `transactions` as its data.
    pub fn next_block(&mut self, transactions: &[MockTransaction]) -> MockBlock {
        let height = self.next_height;
        let (encoded, data_size) = encode_block_data(transactions);
        let data_size = u32::try_from(data_size).expect("mock block data is small");
        let data_id = data_id(height, self.round, data_size, transactions);

        let mut hasher = blake3::Hasher::new();
        hasher.update(&height.to_be_bytes());
        hasher.update(&self.prev_block_hash);
        hasher.update(data_id.as_bytes());
        let hash: [u8; 32] = hasher.finalize().into();

        let header = BlockHeader {
            hash,
            prev_block_hash: self.prev_block_hash,
            height,
            prev_commit_proof: self.prev_commit_proof.clone(),
            validator_set_hash: [1; 32],
            next_validator_set_hash: [1; 32],
            data_id,
            prev_app_state_hash: [2; 32],
        };

        let proof = CommitProof {
            round: self.round,
            pub_key_hash: vec![3; 32],
            proofs: vec![SignatureProof {
                block_hash: hash.to_vec(),
                signer_bits: vec![0b1111],
                signature: blake3::hash(&hash).as_bytes().to_vec(),
            }],
        };

        self.next_height += 1;
        self.prev_block_hash = hash;
        self.prev_commit_proof = proof.clone();

        MockBlock {
            committed: CommittedHeader { header, proof },
            transactions: transactions.to_vec(),
            encoded,
        }
    }

    /// Commits `n` blocks, each with `height % 3` transactions.
    pub fn next_blocks(&mut self, n: usize) -> Vec<MockBlock> {
        (0..n)
            .map(|_| {
                let height = self.next_height;
                let txs = (0..height % 3)
                    .map(|i| MockTransaction::new(height * 10 + i))
                    .collect::<Vec<_>>();
                self.next_block(&txs)
            })
            .collect()
    }
}
