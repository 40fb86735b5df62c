use borsh::{BorshDeserialize, BorshSerialize};

use crate::{DataId, Height, Round};

/// A finalized block header.
///
/// The sync client treats everything except [`BlockHeader::height`] and
/// [`BlockHeader::data_id`] as opaque, it is the consensus engine that checks the
/// header chains onto what it already has.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct BlockHeader {
    /// The hash of this header.
    pub hash: [u8; 32],
    /// The hash of the header at `height - 1`.
    pub prev_block_hash: [u8; 32],
    pub height: Height,
    /// The proof that committed the previous block.
    pub prev_commit_proof: CommitProof,
    pub validator_set_hash: [u8; 32],
    pub next_validator_set_hash: [u8; 32],
    /// The identifier of this block's data.
    ///
    /// [`DataId::EMPTY`] means the block carries no transactions.
    pub data_id: DataId,
    pub prev_app_state_hash: [u8; 32],
}

/// A set of signatures over a single block hash (or over nil).
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SignatureProof {
    /// The block hash that was signed, empty for a nil vote.
    pub block_hash: Vec<u8>,
    /// A bit set of the validators whose signatures are aggregated in [`Self::signature`].
    pub signer_bits: Vec<u8>,
    pub signature: Vec<u8>,
}

/// The precommit proof that finalized a block.
#[derive(Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct CommitProof {
    /// The round the block was committed in.
    pub round: Round,
    /// The hash of the validator public keys the proofs are made against.
    pub pub_key_hash: Vec<u8>,
    pub proofs: Vec<SignatureProof>,
}

/// A [`BlockHeader`] together with the [`CommitProof`] that finalized it.
///
/// Proofs are carried by the block that follows, so the proof here is the
/// `prev_commit_proof` of the header at `height + 1`. A header can only be
/// replayed once this proof is known.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct CommittedHeader {
    pub header: BlockHeader,
    pub proof: CommitProof,
}
