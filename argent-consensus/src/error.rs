//! Error types for the consensus engine.
//!
//! Every rejection carries a [`RejectionKind`] so callers can distinguish
//! malformed garbage from rule violations, from data we simply do not have
//! yet, from corruption of our own state. The `dos_score` hint feeds the
//! (external) peer-banning layer.

use thiserror::Error;

use argent_masternode::MasternodeError;
use argent_types::{Amount, OutPoint};
use argent_veil::VeilError;

/// Coarse classification of a consensus rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    /// Structurally invalid on its own, independent of chain state.
    Malformed,
    /// Well-formed but breaking a consensus rule.
    ConsensusViolation,
    /// Cannot be judged yet; retry when the missing context arrives.
    TransientUnavailable,
    /// Our own committed state is inconsistent. Chain mutation must halt.
    FatalCorruption,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConsensusError {
    // Structural.
    #[error("transaction has no inputs or outputs")]
    EmptyTransaction,
    #[error("transaction size {size} exceeds limit {limit}")]
    TransactionTooLarge { size: usize, limit: usize },
    #[error("block size {size} exceeds limit {limit}")]
    BlockTooLarge { size: usize, limit: usize },
    #[error("block has no transactions")]
    EmptyBlock,
    #[error("duplicate input {0}")]
    DuplicateInput(OutPoint),
    #[error("output value out of range")]
    ValueOutOfRange,
    #[error("bad coinbase: {0}")]
    BadCoinbase(String),
    #[error("bad coinstake: {0}")]
    BadCoinstake(String),
    #[error("mint value {0} is not an active denomination")]
    BadMintDenomination(Amount),
    #[error("bad veil payload: {0}")]
    BadVeilPayload(String),
    #[error("merkle root does not commit to the block's transactions")]
    BadMerkleRoot,
    #[error("duplicate txid in block: {0}")]
    DuplicateTxId(String),
    #[error("serialization failed: {0}")]
    Serialization(String),

    // Contextual rule violations.
    #[error("referenced output {0} is missing or already spent")]
    MissingUtxo(OutPoint),
    #[error("spend of {outpoint} at depth {depth}, {required} confirmations required")]
    ImmatureSpend { outpoint: OutPoint, depth: u64, required: u64 },
    #[error("script verification failed for input {0}")]
    ScriptVerificationFailed(OutPoint),
    #[error("outputs {outputs} exceed inputs {inputs}")]
    Overspend { inputs: Amount, outputs: Amount },
    #[error("fee {fee} below required minimum {required}")]
    InsufficientFee { fee: Amount, required: Amount },
    #[error("claimed reward {claimed} exceeds allowed {allowed}")]
    BadSubsidy { claimed: Amount, allowed: Amount },
    #[error("invalid proof of stake: {0}")]
    InvalidProofOfStake(String),
    #[error("block signature does not verify under the staker's key")]
    BadBlockSignature,
    #[error("block does not pay the masternode winner correctly")]
    BadMasternodePayment,
    #[error("invalid header: {0}")]
    InvalidHeader(String),
    #[error("block builds on an invalid chain")]
    InvalidAncestor,
    #[error(transparent)]
    Veil(#[from] VeilError),
    #[error(transparent)]
    Masternode(#[from] MasternodeError),

    // Mempool policy.
    #[error("outpoint {0} is already claimed by a mempool transaction")]
    MempoolConflict(OutPoint),
    #[error("transaction {0} is already in the mempool")]
    AlreadyInMempool(String),

    // Missing context.
    #[error("parent block {0} is unknown, queued as orphan")]
    OrphanBlock(String),
    #[error("block {0} is unknown")]
    UnknownBlock(String),

    // Our own state.
    #[error("undo log does not match committed state: {0}")]
    UndoMismatch(String),
    #[error("corrupt chain state: {0}")]
    CorruptState(String),
    #[error("duplicate utxo creation for {0}")]
    DuplicateUtxo(OutPoint),
    #[error("i/o failure: {0}")]
    Io(String),
}

impl ConsensusError {
    pub fn kind(&self) -> RejectionKind {
        use ConsensusError::*;
        match self {
            EmptyTransaction
            | TransactionTooLarge { .. }
            | BlockTooLarge { .. }
            | EmptyBlock
            | DuplicateInput(_)
            | ValueOutOfRange
            | BadCoinbase(_)
            | BadCoinstake(_)
            | BadMintDenomination(_)
            | BadVeilPayload(_)
            | BadMerkleRoot
            | DuplicateTxId(_)
            | Serialization(_) => RejectionKind::Malformed,

            MissingUtxo(_)
            | ImmatureSpend { .. }
            | ScriptVerificationFailed(_)
            | Overspend { .. }
            | InsufficientFee { .. }
            | BadSubsidy { .. }
            | InvalidProofOfStake(_)
            | BadBlockSignature
            | BadMasternodePayment
            | InvalidHeader(_)
            | InvalidAncestor
            | MempoolConflict(_)
            | AlreadyInMempool(_)
            | Masternode(_) => RejectionKind::ConsensusViolation,

            Veil(inner) => match inner {
                VeilError::CheckpointMismatch { .. } | VeilError::Serialization(_) => {
                    RejectionKind::FatalCorruption
                }
                _ => RejectionKind::ConsensusViolation,
            },

            OrphanBlock(_) | UnknownBlock(_) | Io(_) => RejectionKind::TransientUnavailable,

            UndoMismatch(_) | CorruptState(_) | DuplicateUtxo(_) => {
                RejectionKind::FatalCorruption
            }
        }
    }

    /// Misbehavior score hint for the peer that relayed the rejected data.
    /// Policy-only rejections and our own failures score zero.
    pub fn dos_score(&self) -> u32 {
        use ConsensusError::*;
        match self {
            InsufficientFee { .. } | MempoolConflict(_) | AlreadyInMempool(_) => 0,
            _ => match self.kind() {
                RejectionKind::Malformed => 100,
                RejectionKind::ConsensusViolation => 100,
                RejectionKind::TransientUnavailable => 0,
                RejectionKind::FatalCorruption => 0,
            },
        }
    }
}

impl From<Box<bincode::ErrorKind>> for ConsensusError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        ConsensusError::Serialization(err.to_string())
    }
}
