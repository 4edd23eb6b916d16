//! Masternode registry and deterministic payment consensus.
//!
//! Masternodes are collateral-backed service nodes. The registry tracks the
//! active set; the payments module ranks eligible nodes deterministically so
//! every validator agrees on the payment winner for each block height.

pub mod error;
pub mod payments;
pub mod registry;

pub use error::MasternodeError;
pub use payments::{ranking_score, validate_payment, winner_for_height};
pub use registry::{MasternodeAnnounce, MasternodeEntry, MasternodeId, MasternodePing, MasternodeRegistry};
