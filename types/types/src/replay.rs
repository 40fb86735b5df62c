use tokio::sync::oneshot;

use crate::{BlockHeader, CommitProof};

/// A request for the consensus engine to replay an already committed header.
///
/// Exactly one of these is sent per height the sync client verifies, in ascending
/// height order. The engine must answer on [`Self::resp`] and the sync client will
/// not move past this height until it does.
#[derive(Debug)]
pub struct ReplayedHeaderRequest {
    pub header: BlockHeader,
    /// The proof that committed [`Self::header`].
    pub proof: CommitProof,
    pub resp: oneshot::Sender<ReplayedHeaderResponse>,
}

/// The consensus engine's answer to a [`ReplayedHeaderRequest`].
///
/// The sync client moves on to the next height whatever the answer is, an error
/// is only logged.
#[derive(Debug, Default)]
pub struct ReplayedHeaderResponse {
    pub err: Option<ReplayedHeaderError>,
}

/// Why the consensus engine could not replay a header.
#[derive(Debug, thiserror::Error)]
pub enum ReplayedHeaderError {
    #[error("The header's commit proof was invalid.")]
    InvalidProof,
    #[error("The header does not follow the engine's current chain.")]
    OutOfOrder,
    #[error("Internal engine error: {0}")]
    Internal(String),
}
