use thiserror::Error;

use crate::registry::MasternodeId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MasternodeError {
    #[error("masternode {0} not found")]
    NotFound(MasternodeId),
    #[error("masternode {0} already registered")]
    AlreadyRegistered(MasternodeId),
    #[error("invalid announce signature for {0}")]
    BadAnnounceSignature(MasternodeId),
    #[error("invalid ping signature for {0}")]
    BadPingSignature(MasternodeId),
    #[error("collateral value {got} does not match required {required}")]
    WrongCollateral { got: u64, required: u64 },
    #[error("ping at {0} is not newer than the last seen ping")]
    StalePing(u64),
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl From<Box<bincode::ErrorKind>> for MasternodeError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        MasternodeError::Serialization(err.to_string())
    }
}
