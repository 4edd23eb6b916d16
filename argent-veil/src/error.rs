use thiserror::Error;

use argent_types::veil::VeilDenomination;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VeilError {
    #[error("denomination {0} is not active on this network")]
    UnsupportedDenomination(VeilDenomination),
    #[error("serial {0} has already been consumed")]
    SerialAlreadySpent(String),
    #[error("serial {0} is not in the consumed set")]
    UnknownSerial(String),
    #[error("no accumulator checkpoint at height {0}")]
    UnknownCheckpoint(u64),
    #[error("spend member does not correspond to any recorded mint")]
    UnknownMember,
    #[error("mint at height {mint_height} is not mature at reference height {reference_height}")]
    ImmatureMint { mint_height: u64, reference_height: u64 },
    #[error("only {have} later mints of the denomination, {need} required")]
    InsufficientSubsequentMints { have: u64, need: u64 },
    #[error("membership witness does not open the checkpointed accumulator")]
    BadWitness,
    #[error("accumulator modulus is not valid hex: {0}")]
    BadModulus(String),
    #[error("stored checkpoint at height {height} for denomination {denomination} does not match recompute")]
    CheckpointMismatch { height: u64, denomination: VeilDenomination },
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl From<Box<bincode::ErrorKind>> for VeilError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        VeilError::Serialization(err.to_string())
    }
}
